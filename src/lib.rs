//! Rewrite a large xml document in one streaming pass.
//!
//! The rewriter finds one target element by its identifying attribute, drops
//! the candidate subtrees below it whose `name` holds a given text, and
//! splices a flattened replacement document in right after the target closes.
//! Only the replacement is held in memory, along with one candidate subtree at a time.
//!
//! # Examples
//! ```
//! use xml_splice::{rewrite, EventReader, ReplacementTree, SpliceOptions};
//! use std::str::FromStr;
//!
//! let replacement = ReplacementTree::from_str(
//!     "<country><region><city>Barcelona</city></region></country>",
//! )
//! .unwrap()
//! .normalized();
//! let options = SpliceOptions::new("E", "Catalonia", "CAT");
//! let xml = r#"<mondial><country car_code="E">
//!     <province><name>Catalonia</name></province>
//! </country></mondial>"#;
//!
//! let mut out = Vec::new();
//! let report = rewrite(EventReader::from_str(xml), &replacement, &options, &mut out).unwrap();
//! assert_eq!(report.candidates_removed, 1);
//! assert!(String::from_utf8(out).unwrap().contains(r#"<country car_code="CAT">"#));
//! ```

mod config;
mod decode;
mod error;
mod event;
mod replacement;
mod rewrite;
mod writer;

pub use crate::config::SpliceOptions;
pub use crate::decode::DecodeReader;
pub use crate::error::{Error, Result};
pub use crate::event::{Event, EventReader};
pub use crate::replacement::{ElementNode, Node, ReplacementTree};
pub use crate::rewrite::{rewrite, RewriteReport, RewriteState, Rewriter, Step};
pub use crate::writer::{escape_markup, Escape, IndentWriter};

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Loads and flattens `replacement`, then rewrites `input` into `output`.
///
/// The output file is created up front and flushed at the end. On error it is
/// left incomplete, and the caller should not use it.
pub fn splice_files<I, R, O>(
    input: I,
    replacement: R,
    output: O,
    options: &SpliceOptions,
) -> Result<RewriteReport>
where
    I: AsRef<Path>,
    R: AsRef<Path>,
    O: AsRef<Path>,
{
    options.validate()?;
    let replacement = ReplacementTree::load(replacement)?.normalized();
    let events = EventReader::from_file(input.as_ref())?;
    let sink = BufWriter::new(File::create(output.as_ref())?);
    tracing::info!(
        input = %input.as_ref().display(),
        output = %output.as_ref().display(),
        "rewriting"
    );
    rewrite(events, &replacement, options, sink)
}
