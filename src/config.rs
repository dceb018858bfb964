use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of one splice run, plus the structural conventions of the document.
///
/// Only `target_id`, `remove_name` and `new_id` are required in a config file.
/// The element and attribute names default to the mondial layout:
///
/// ```toml
/// target_id = "E"
/// remove_name = "Catalonia"
/// new_id = "CAT"
///
/// # defaults
/// target_element = "country"
/// candidate_element = "province"
/// name_element = "name"
/// id_attribute = "car_code"
/// carried_attribute = "memberships"
/// write_declaration = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpliceOptions {
    /// Identifying attribute value of the target element.
    pub target_id: String,
    /// Trimmed text of the `name_element` that marks a candidate for removal.
    pub remove_name: String,
    /// Identifying attribute value of the spliced element.
    pub new_id: String,
    #[serde(default = "default_target_element")]
    pub target_element: String,
    #[serde(default = "default_candidate_element")]
    pub candidate_element: String,
    #[serde(default = "default_name_element")]
    pub name_element: String,
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,
    /// Attribute copied from the target to the spliced element. `None` (or `""`
    /// in a config file) copies nothing.
    #[serde(default = "default_carried_attribute")]
    pub carried_attribute: Option<String>,
    #[serde(default)]
    pub write_declaration: bool,
}

fn default_target_element() -> String {
    "country".to_string()
}

fn default_candidate_element() -> String {
    "province".to_string()
}

fn default_name_element() -> String {
    "name".to_string()
}

fn default_id_attribute() -> String {
    "car_code".to_string()
}

fn default_carried_attribute() -> Option<String> {
    Some("memberships".to_string())
}

impl SpliceOptions {
    pub fn new<S: Into<String>>(target_id: S, remove_name: S, new_id: S) -> SpliceOptions {
        SpliceOptions {
            target_id: target_id.into(),
            remove_name: remove_name.into(),
            new_id: new_id.into(),
            target_element: default_target_element(),
            candidate_element: default_candidate_element(),
            name_element: default_name_element(),
            id_attribute: default_id_attribute(),
            carried_attribute: default_carried_attribute(),
            write_declaration: false,
        }
    }

    pub fn from_toml_str(toml: &str) -> Result<SpliceOptions> {
        let mut options: SpliceOptions = toml::from_str(toml)?;
        // toml has no null, so an empty name switches carrying off.
        if options.carried_attribute.as_deref() == Some("") {
            options.carried_attribute = None;
        }
        options.validate()?;
        Ok(options)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SpliceOptions> {
        let content = std::fs::read_to_string(path)?;
        SpliceOptions::from_toml_str(&content)
    }

    /// Names and identifiers can't be empty. The trimmed `remove_name` can't be
    /// empty either, since it is compared against trimmed text.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("target_id", &self.target_id),
            ("new_id", &self.new_id),
            ("target_element", &self.target_element),
            ("candidate_element", &self.candidate_element),
            ("name_element", &self.name_element),
            ("id_attribute", &self.id_attribute),
        ];
        for (field, value) in required.iter() {
            if value.is_empty() {
                return Err(Error::Config(format!("`{}` is empty", field)));
            }
        }
        if self.remove_name.trim().is_empty() {
            return Err(Error::Config("`remove_name` is blank".to_string()));
        }
        if self.target_element == self.candidate_element {
            return Err(Error::Config(format!(
                "target and candidate element are both `{}`",
                self.target_element
            )));
        }
        if let Some(carried) = &self.carried_attribute {
            if carried == &self.id_attribute {
                return Err(Error::Config(format!(
                    "`{}` can't be both the id and the carried attribute",
                    carried
                )));
            }
        }
        Ok(())
    }
}
