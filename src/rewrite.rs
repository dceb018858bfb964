use crate::config::SpliceOptions;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::replacement::ReplacementTree;
use crate::writer::{Escape, IndentWriter};
use std::io::Write;

/// What has to happen with the event that was just read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Write the event.
    Emit(Event),
    /// Write the target's closing event, then splice the replacement after it.
    EmitThenSplice(Event),
    /// The event went into the candidate buffer.
    Buffered,
    /// A candidate closed without the removal trigger. Write all of its events.
    Flush(Vec<Event>),
    /// A candidate closed with the removal trigger. Its events were dropped.
    Discard(usize),
}

/// A candidate subtree held back until its keep or drop decision.
#[derive(Debug)]
struct Candidate {
    // Names of the elements open inside the candidate, the candidate itself first.
    open: Vec<String>,
    buffer: Vec<Event>,
    remove: bool,
}

impl Candidate {
    fn open(event: Event, name: String) -> Candidate {
        Candidate {
            open: vec![name],
            buffer: vec![event],
            remove: false,
        }
    }

    /// Buffers `event` and returns whether the candidate closed with it.
    fn push(&mut self, event: Event, options: &SpliceOptions) -> Result<bool> {
        match &event {
            Event::Start { name, .. } => self.open.push(name.clone()),
            Event::End { name } => match self.open.pop() {
                Some(open) if &open == name => {}
                open => {
                    return Err(Error::Unbalanced(format!(
                        "Closing tag {} inside candidate, expected {}",
                        name,
                        open.unwrap_or_default()
                    )))
                }
            },
            Event::Text { content } => {
                let in_name = self.open.last() == Some(&options.name_element);
                if in_name && content.trim() == options.remove_name {
                    self.remove = true;
                }
            }
        }
        self.buffer.push(event);
        Ok(self.open.is_empty())
    }

    fn id<'c>(&'c self, options: &SpliceOptions) -> Option<&'c str> {
        self.buffer
            .first()
            .and_then(|start| start.attribute(&options.id_attribute))
    }

    fn finish(self) -> Step {
        if self.remove {
            Step::Discard(self.buffer.len())
        } else {
            Step::Flush(self.buffer)
        }
    }
}

/// Cursor of the stream rewriter.
///
/// [`advance`](RewriteState::advance) is the whole state machine: each event
/// maps to one [`Step`], depending only on the state and the event.
#[derive(Debug)]
pub struct RewriteState<'o> {
    options: &'o SpliceOptions,
    depth: usize,
    in_target: bool,
    // Depth outside of the target element. The target closes when it is reached again.
    target_depth: usize,
    target_matched: bool,
    carried: Option<String>,
    candidate: Option<Candidate>,
}

impl<'o> RewriteState<'o> {
    pub fn new(options: &'o SpliceOptions) -> RewriteState<'o> {
        RewriteState {
            options,
            depth: 0,
            in_target: false,
            target_depth: 0,
            target_matched: false,
            carried: None,
            candidate: None,
        }
    }

    pub fn options(&self) -> &'o SpliceOptions {
        self.options
    }

    /// Number of open elements in the input.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn in_target(&self) -> bool {
        self.in_target
    }

    /// Whether the target element was seen.
    pub fn target_matched(&self) -> bool {
        self.target_matched
    }

    pub fn in_candidate(&self) -> bool {
        self.candidate.is_some()
    }

    /// Value of the carried attribute on the target, once the target was entered.
    pub fn carried(&self) -> Option<&str> {
        self.carried.as_deref()
    }

    pub fn advance(&mut self, event: Event) -> Result<Step> {
        if let Some(mut candidate) = self.candidate.take() {
            self.track_depth(&event)?;
            if !candidate.push(event, self.options)? {
                self.candidate = Some(candidate);
                return Ok(Step::Buffered);
            }
            tracing::debug!(
                id = candidate.id(self.options).unwrap_or_default(),
                events = candidate.buffer.len(),
                remove = candidate.remove,
                "candidate closed"
            );
            return Ok(candidate.finish());
        }
        if self.in_target {
            self.advance_in_target(event)
        } else {
            self.advance_outside(event)
        }
    }

    fn advance_outside(&mut self, event: Event) -> Result<Step> {
        if self.is_target(&event) {
            if self.target_matched {
                tracing::warn!(
                    id = %self.options.target_id,
                    "target matched again, passing it through unchanged"
                );
            } else {
                self.in_target = true;
                self.target_matched = true;
                self.target_depth = self.depth;
                self.carried = self
                    .options
                    .carried_attribute
                    .as_ref()
                    .and_then(|key| event.attribute(key))
                    .map(str::to_string);
                tracing::debug!(
                    id = %self.options.target_id,
                    depth = self.depth,
                    "entered target"
                );
            }
        }
        self.track_depth(&event)?;
        Ok(Step::Emit(event))
    }

    fn advance_in_target(&mut self, event: Event) -> Result<Step> {
        self.track_depth(&event)?;
        match &event {
            Event::Start { name, .. } if name == &self.options.candidate_element => {
                let name = name.clone();
                self.candidate = Some(Candidate::open(event, name));
                Ok(Step::Buffered)
            }
            Event::End { .. } if self.depth == self.target_depth => {
                self.in_target = false;
                tracing::debug!(id = %self.options.target_id, "left target");
                Ok(Step::EmitThenSplice(event))
            }
            _ => Ok(Step::Emit(event)),
        }
    }

    fn is_target(&self, event: &Event) -> bool {
        event.name() == Some(self.options.target_element.as_str())
            && event.attribute(&self.options.id_attribute) == Some(self.options.target_id.as_str())
    }

    fn track_depth(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::Start { .. } => self.depth += 1,
            Event::End { name } => {
                self.depth = self.depth.checked_sub(1).ok_or_else(|| {
                    Error::Unbalanced(format!("Closing tag {} has no opening tag", name))
                })?
            }
            Event::Text { .. } => {}
        }
        Ok(())
    }

    /// Checks that the input ended with everything closed.
    pub fn finish(&self) -> Result<()> {
        if let Some(candidate) = &self.candidate {
            return Err(Error::Unbalanced(format!(
                "Input ended inside <{}>",
                candidate.open.first().map(String::as_str).unwrap_or_default()
            )));
        }
        if self.in_target || self.depth != 0 {
            return Err(Error::Unbalanced(format!(
                "Input ended with {} element(s) open",
                self.depth
            )));
        }
        Ok(())
    }
}

/// Counts of one rewrite run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub events_read: usize,
    pub target_found: bool,
    pub candidates_kept: usize,
    pub candidates_removed: usize,
    pub spliced: bool,
}

/// Applies [`Step`]s to an [`IndentWriter`].
///
/// Source events are written with [`Escape::Markup`], the spliced replacement with
/// [`Escape::Full`].
pub struct Rewriter<'a, W: Write> {
    state: RewriteState<'a>,
    replacement: &'a ReplacementTree,
    writer: IndentWriter<W>,
    report: RewriteReport,
}

impl<'a, W: Write> Rewriter<'a, W> {
    pub fn new(
        replacement: &'a ReplacementTree,
        options: &'a SpliceOptions,
        sink: W,
    ) -> Rewriter<'a, W> {
        Rewriter {
            state: RewriteState::new(options),
            replacement,
            writer: IndentWriter::new(sink),
            report: RewriteReport::default(),
        }
    }

    pub fn write_declaration(&mut self) -> Result<()> {
        self.writer.write_declaration()
    }

    pub fn process(&mut self, event: Event) -> Result<()> {
        self.report.events_read += 1;
        match self.state.advance(event)? {
            Step::Emit(event) => self.writer.write_event(&event, Escape::Markup)?,
            Step::EmitThenSplice(event) => {
                self.writer.write_event(&event, Escape::Markup)?;
                self.splice()?;
            }
            Step::Buffered => {}
            Step::Flush(events) => {
                self.report.candidates_kept += 1;
                for event in &events {
                    self.writer.write_event(event, Escape::Markup)?;
                }
            }
            Step::Discard(_) => self.report.candidates_removed += 1,
        }
        Ok(())
    }

    fn splice(&mut self) -> Result<()> {
        let options = self.state.options();
        let mut attributes = vec![(options.id_attribute.clone(), options.new_id.clone())];
        if let (Some(key), Some(value)) = (&options.carried_attribute, self.state.carried()) {
            attributes.push((key.clone(), value.to_string()));
        }
        self.writer
            .write_start(&options.target_element, &attributes, Escape::Full)?;
        self.replacement.write_children(&mut self.writer)?;
        self.writer.write_end(&options.target_element)?;
        self.report.spliced = true;
        tracing::debug!(id = %options.new_id, "spliced replacement");
        Ok(())
    }

    /// Checks the input was complete, flushes, and hands back the sink.
    pub fn finish(mut self) -> Result<(W, RewriteReport)> {
        self.state.finish()?;
        self.writer.flush()?;
        self.report.target_found = self.state.target_matched();
        Ok((self.writer.into_inner(), self.report))
    }
}

/// Streams `events` to `sink`, dropping the candidates of the target that hold
/// `options.remove_name` and splicing `replacement` after the target.
///
/// `replacement` is written as it is. Call [`ReplacementTree::normalize`] first to flatten it.
pub fn rewrite<I, W>(
    events: I,
    replacement: &ReplacementTree,
    options: &SpliceOptions,
    sink: W,
) -> Result<RewriteReport>
where
    I: IntoIterator<Item = Result<Event>>,
    W: Write,
{
    options.validate()?;
    let mut rewriter = Rewriter::new(replacement, options, sink);
    if options.write_declaration {
        rewriter.write_declaration()?;
    }
    for event in events {
        rewriter.process(event?)?;
    }
    let (_, report) = rewriter.finish()?;
    if !report.target_found {
        tracing::warn!(id = %options.target_id, "target not found, nothing spliced");
    }
    tracing::info!(
        events = report.events_read,
        kept = report.candidates_kept,
        removed = report.candidates_removed,
        spliced = report.spliced,
        "rewrite finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventReader;
    use std::str::FromStr;

    const MONDIAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mondial>
<country car_code="E" memberships="EU NATO">
<name>Spain</name>
<province id="prov-cat"><name>Catalonia</name><city><name>Barcelona</name></city></province>
<province id="prov-gal"><name> Galicia </name></province>
</country>
<country car_code="F"><name>France</name></country>
</mondial>"#;

    const CATDATA: &str = "<country><region><city>Barcelona</city></region></country>";

    fn run(xml: &str, options: &SpliceOptions) -> Result<(String, RewriteReport)> {
        let replacement = ReplacementTree::from_str(CATDATA)?.normalized();
        let mut out = Vec::new();
        let report = rewrite(EventReader::from_str(xml), &replacement, options, &mut out)?;
        Ok((String::from_utf8(out).unwrap(), report))
    }

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn catalonia_becomes_its_own_country() {
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let (out, report) = run(MONDIAL, &options).unwrap();
        let expected = concat!(
            "\n<mondial>",
            "\n    <country car_code=\"E\" memberships=\"EU NATO\">",
            "\n        <name>Spain",
            "\n        </name>",
            "\n        <province id=\"prov-gal\">",
            "\n            <name> Galicia ",
            "\n            </name>",
            "\n        </province>",
            "\n    </country>",
            "\n    <country car_code=\"CAT\" memberships=\"EU NATO\">",
            "\n        <city>Barcelona",
            "\n        </city>",
            "\n    </country>",
            "\n    <country car_code=\"F\">",
            "\n        <name>France",
            "\n        </name>",
            "\n    </country>",
            "\n</mondial>",
        );
        assert_eq!(out, expected);
        assert_eq!(
            report,
            RewriteReport {
                events_read: EventReader::from_str(MONDIAL).count(),
                target_found: true,
                candidates_kept: 1,
                candidates_removed: 1,
                spliced: true,
            }
        );
    }

    #[test]
    fn no_match_keeps_every_province() {
        let options = SpliceOptions::new("E", "Andalusia", "AND");
        let (out, report) = run(MONDIAL, &options).unwrap();
        assert!(out.contains("<province id=\"prov-cat\">"));
        assert!(out.contains("<province id=\"prov-gal\">"));
        assert!(out.contains("<country car_code=\"AND\" memberships=\"EU NATO\">"));
        assert_eq!(report.candidates_kept, 2);
        assert_eq!(report.candidates_removed, 0);
    }

    #[test]
    fn unknown_target_rewrites_unchanged() {
        let options = SpliceOptions::new("XX", "Catalonia", "CAT");
        let (out, report) = run(MONDIAL, &options).unwrap();
        assert!(!report.target_found);
        assert!(!report.spliced);
        assert!(out.contains("<province id=\"prov-cat\">"));
        assert!(!out.contains("CAT"));
        let relisted: Vec<Event> = EventReader::from_str(&out)
            .collect::<Result<_>>()
            .unwrap();
        let original: Vec<Event> = EventReader::from_str(MONDIAL)
            .collect::<Result<_>>()
            .unwrap();
        let non_blank = |events: Vec<Event>| -> Vec<Event> {
            events
                .into_iter()
                .filter(|e| !matches!(e, Event::Text { content } if content.trim().is_empty()))
                .map(|e| match e {
                    Event::Text { content } => Event::text(content.trim()),
                    e => e,
                })
                .collect()
        };
        assert_eq!(non_blank(relisted), non_blank(original));
    }

    #[test]
    fn every_matching_candidate_is_removed() {
        let xml = r#"<c car_code="E">
            <province><name>Catalonia</name></province>
            <province><name>Galicia</name></province>
            <province><name>Catalonia</name><area>1</area></province>
        </c>"#;
        let mut options = SpliceOptions::new("E", "Catalonia", "CAT");
        options.target_element = "c".to_string();
        let (out, report) = run(xml, &options).unwrap();
        assert_eq!(report.candidates_removed, 2);
        assert_eq!(report.candidates_kept, 1);
        assert!(!out.contains("Catalonia"));
        assert!(out.contains("Galicia"));
    }

    #[test]
    fn trigger_text_must_sit_in_a_name() {
        let xml = r#"<country car_code="E">
            <province><capital>Catalonia</capital></province>
        </country>"#;
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let (out, report) = run(xml, &options).unwrap();
        assert_eq!(report.candidates_removed, 0);
        assert!(out.contains("<capital>Catalonia"));
    }

    #[test]
    fn nested_same_name_elements_stay_in_candidate() {
        let xml = r#"<country car_code="E">
            <province><province><name>Inner</name></province><name>Catalonia</name></province>
            <name>Spain</name>
        </country>"#;
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let (out, report) = run(xml, &options).unwrap();
        assert_eq!(report.candidates_removed, 1);
        assert!(!out.contains("Inner"));
        assert!(out.contains("<name>Spain"));
    }

    #[test]
    fn splice_comes_right_after_target_close() {
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let (out, _) = run(MONDIAL, &options).unwrap();
        let target_close = out.find("\n    </country>").unwrap();
        let spliced = out.find("car_code=\"CAT\"").unwrap();
        let france = out.find("car_code=\"F\"").unwrap();
        assert!(target_close < spliced && spliced < france);
        assert_eq!(out.matches("car_code=\"CAT\"").count(), 1);
    }

    #[test]
    fn only_first_target_is_used() {
        let xml = r#"<m><country car_code="E"><name>A</name></country><country car_code="E"><name>B</name></country></m>"#;
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let (out, report) = run(xml, &options).unwrap();
        assert!(report.spliced);
        assert_eq!(out.matches("car_code=\"CAT\"").count(), 1);
        assert!(out.find("car_code=\"CAT\"").unwrap() < out.find("<name>B").unwrap());
    }

    #[test]
    fn carried_attribute_is_optional_and_escaped() {
        let xml = r#"<m><country car_code="E"/><country car_code="F" memberships="a&quot;b"/></m>"#;
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let (out, _) = run(xml, &options).unwrap();
        assert!(out.contains("\n    <country car_code=\"CAT\">\n"));

        let options = SpliceOptions::new("F", "Catalonia", "COR");
        let (out, _) = run(xml, &options).unwrap();
        // source attributes keep their quotes, generated ones are escaped
        assert!(out.contains("<country car_code=\"F\" memberships=\"a\"b\">"));
        assert!(out.contains("<country car_code=\"COR\" memberships=\"a&quot;b\">"));
    }

    #[test]
    fn cdata_is_escaped_once() {
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let (out, report) = run("<a><![CDATA[x < y & z]]></a>", &options).unwrap();
        assert_eq!(out, "\n<a>x &lt; y &amp; z\n</a>");
        assert_eq!(report.events_read, 3);
    }

    #[test]
    fn events_read_counts_only_real_events() {
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let (_, report) = run("<a><b/><c/></a>", &options).unwrap();
        assert_eq!(report.events_read, 6);
    }

    #[test]
    fn second_root_is_rejected_before_splicing() {
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let result = run(r#"<m/><country car_code="E"/>"#, &options);
        assert!(matches!(result, Err(Error::MalformedXML(_))));
        assert!(matches!(run("", &options), Err(Error::MalformedXML(_))));
    }

    #[test]
    fn declaration_on_request() {
        let mut options = SpliceOptions::new("E", "Catalonia", "CAT");
        options.write_declaration = true;
        let (out, _) = run("<m/>", &options).unwrap();
        assert_eq!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<m>\n</m>");
    }

    #[test]
    fn state_steps() {
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let mut state = RewriteState::new(&options);
        let country = Event::start("country", attrs(&[("car_code", "E")]));
        assert_eq!(state.advance(country.clone()).unwrap(), Step::Emit(country));
        assert!(state.in_target());

        let province = Event::start("province", vec![]);
        assert_eq!(state.advance(province.clone()).unwrap(), Step::Buffered);
        assert!(state.in_candidate());
        let name = Event::start("name", vec![]);
        assert_eq!(state.advance(name.clone()).unwrap(), Step::Buffered);
        let text = Event::text("  Galicia\n");
        assert_eq!(state.advance(text.clone()).unwrap(), Step::Buffered);
        assert_eq!(state.advance(Event::end("name")).unwrap(), Step::Buffered);
        assert_eq!(
            state.advance(Event::end("province")).unwrap(),
            Step::Flush(vec![
                province.clone(),
                name.clone(),
                text,
                Event::end("name"),
                Event::end("province"),
            ])
        );

        state.advance(province).unwrap();
        state.advance(name).unwrap();
        state.advance(Event::text(" Catalonia ")).unwrap();
        state.advance(Event::end("name")).unwrap();
        assert_eq!(
            state.advance(Event::end("province")).unwrap(),
            Step::Discard(5)
        );

        assert_eq!(
            state.advance(Event::end("country")).unwrap(),
            Step::EmitThenSplice(Event::end("country"))
        );
        assert!(!state.in_target());
        assert!(state.finish().is_ok());
    }

    #[test]
    fn target_without_id_attribute_is_ordinary() {
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let mut state = RewriteState::new(&options);
        let country = Event::start("country", attrs(&[("name", "E")]));
        state.advance(country).unwrap();
        assert!(!state.in_target());
        let province = Event::start("province", vec![]);
        assert_eq!(state.advance(province.clone()).unwrap(), Step::Emit(province));
    }

    #[test]
    fn unbalanced_events_are_fatal() {
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let mut state = RewriteState::new(&options);
        assert!(matches!(
            state.advance(Event::end("country")),
            Err(Error::Unbalanced(_))
        ));

        let mut state = RewriteState::new(&options);
        state
            .advance(Event::start("country", attrs(&[("car_code", "E")])))
            .unwrap();
        state.advance(Event::start("province", vec![])).unwrap();
        assert!(matches!(
            state.advance(Event::end("city")),
            Err(Error::Unbalanced(_))
        ));

        let mut state = RewriteState::new(&options);
        state
            .advance(Event::start("country", attrs(&[("car_code", "E")])))
            .unwrap();
        state.advance(Event::start("province", vec![])).unwrap();
        assert!(matches!(state.finish(), Err(Error::Unbalanced(_))));
    }

    #[test]
    fn truncated_stream_writes_no_splice() {
        let options = SpliceOptions::new("E", "Catalonia", "CAT");
        let replacement = ReplacementTree::from_str(CATDATA).unwrap().normalized();
        let mut out = Vec::new();
        let result = rewrite(
            EventReader::from_str(r#"<m><country car_code="E"><province>"#),
            &replacement,
            &options,
            &mut out,
        );
        assert!(matches!(result, Err(Error::Unbalanced(_))));
        assert!(!String::from_utf8(out).unwrap().contains("CAT"));
    }
}
