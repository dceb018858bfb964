use crate::decode::DecodeReader;
use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, Read};
use std::path::Path;

/// One structural occurrence in a document, in document order.
///
/// Attribute and text values are held unescaped. Attributes keep their source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Text {
        content: String,
    },
}

impl Event {
    pub fn start<S: Into<String>>(name: S, attributes: Vec<(String, String)>) -> Event {
        Event::Start {
            name: name.into(),
            attributes,
        }
    }

    pub fn end<S: Into<String>>(name: S) -> Event {
        Event::End { name: name.into() }
    }

    pub fn text<S: Into<String>>(content: S) -> Event {
        Event::Text {
            content: content.into(),
        }
    }

    /// Element name of `Start` and `End` events.
    pub fn name(&self) -> Option<&str> {
        match self {
            Event::Start { name, .. } | Event::End { name } => Some(name),
            Event::Text { .. } => None,
        }
    }

    /// First attribute named `key` of a `Start` event.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            Event::Start { attributes, .. } => attributes
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

}

/// Pull-based event source over a quick-xml [`Reader`].
///
/// Yields `Result<Event>` until the document ends. Empty elements come out as a
/// `Start` followed by an `End`, and adjacent text and CDATA is joined into one `Text`.
/// Comments, processing instructions, the declaration and DOCTYPE are skipped.
///
/// The document must hold exactly one root element. Once an error is
/// returned the reader is finished.
pub struct EventReader<B: BufRead> {
    reader: Reader<B>,
    buf: Vec<u8>,
    open: Vec<String>,
    peeked: Option<Event>,
    seen_root: bool,
    finished: bool,
}

impl<'a> EventReader<&'a [u8]> {
    /// Read events from an already decoded string.
    pub fn from_str(xml: &'a str) -> EventReader<&'a [u8]> {
        EventReader::new(Reader::from_str(xml))
    }
}

impl<R: Read> EventReader<DecodeReader<R>> {
    /// Read events from a byte source, in any encoding `encoding_rs` knows.
    pub fn from_reader(reader: R) -> Result<EventReader<DecodeReader<R>>> {
        let decoded = DecodeReader::sniff(reader)?;
        Ok(EventReader::new(Reader::from_reader(decoded)))
    }
}

impl EventReader<DecodeReader<File>> {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<EventReader<DecodeReader<File>>> {
        EventReader::from_reader(File::open(path)?)
    }
}

impl<B: BufRead> EventReader<B> {
    fn new(mut reader: Reader<B>) -> EventReader<B> {
        reader
            .trim_text(false)
            .expand_empty_elements(true)
            .check_end_names(true);
        EventReader {
            reader,
            buf: Vec::with_capacity(200),
            open: Vec::new(),
            peeked: None,
            seen_root: false,
            finished: false,
        }
    }

    /// Number of elements currently open.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// `Ok(None)` is the end of the document.
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        let event = match self.peeked.take() {
            Some(event) => Some(event),
            None => self.read_raw()?,
        };
        match event {
            Some(Event::Text { mut content }) => {
                loop {
                    match self.read_raw()? {
                        Some(Event::Text { content: more }) => content.push_str(&more),
                        other => {
                            self.peeked = other;
                            break;
                        }
                    }
                }
                Ok(Some(Event::Text { content }))
            }
            other => Ok(other),
        }
    }

    fn read_raw(&mut self) -> Result<Option<Event>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            self.buf.clear();
            let ev = self.reader.read_event(&mut self.buf)?;
            tracing::trace!(event = ?ev, "xml event");
            match ev {
                XmlEvent::Start(ref start) | XmlEvent::Empty(ref start) => {
                    let event = to_start_event(start)?;
                    if let Event::Start { name, .. } = &event {
                        if self.open.is_empty() && self.seen_root {
                            return Err(Error::MalformedXML(format!(
                                "Second root element <{}>",
                                name
                            )));
                        }
                        self.seen_root = true;
                        self.open.push(name.clone());
                    }
                    return Ok(Some(event));
                }
                XmlEvent::End(ref end) => {
                    let name = String::from_utf8(end.name().to_vec())?;
                    match self.open.pop() {
                        Some(open) if open == name => return Ok(Some(Event::End { name })),
                        Some(open) => {
                            return Err(Error::Unbalanced(format!(
                                "Closing tag mismatch. Expected {}, found {}",
                                open, name
                            )))
                        }
                        None => {
                            return Err(Error::Unbalanced(format!(
                                "Closing tag {} has no opening tag",
                                name
                            )))
                        }
                    }
                }
                XmlEvent::Text(ref text) => {
                    // Zero-length text sits between adjacent tags.
                    if text.is_empty() {
                        continue;
                    }
                    let content = String::from_utf8(text.unescaped()?.to_vec())?;
                    if self.open.is_empty() {
                        if content.trim().is_empty() {
                            continue;
                        }
                        return Err(Error::MalformedXML(
                            "Text outside of the root element".to_string(),
                        ));
                    }
                    return Ok(Some(Event::Text { content }));
                }
                // quick-xml hands CDATA over escaped.
                XmlEvent::CData(ref text) => {
                    if text.is_empty() {
                        continue;
                    }
                    let content = String::from_utf8(text.unescaped()?.to_vec())?;
                    return Ok(Some(Event::Text { content }));
                }
                XmlEvent::Comment(_)
                | XmlEvent::PI(_)
                | XmlEvent::Decl(_)
                | XmlEvent::DocType(_) => continue,
                XmlEvent::Eof => {
                    self.finished = true;
                    if let Some(open) = self.open.last() {
                        return Err(Error::Unbalanced(format!(
                            "Document ended with {} element(s) open, innermost <{}>",
                            self.open.len(),
                            open
                        )));
                    }
                    if !self.seen_root {
                        return Err(Error::MalformedXML(
                            "Document has no root element".to_string(),
                        ));
                    }
                    return Ok(None);
                }
            }
        }
    }
}

fn to_start_event(start: &BytesStart) -> Result<Event> {
    let name = String::from_utf8(start.name().to_vec())?;
    let mut attributes = Vec::new();
    let mut attrs = start.attributes();
    attrs.with_checks(false);
    for attr in attrs {
        let attr = attr?;
        let key = String::from_utf8(attr.key.to_vec())?;
        let value = String::from_utf8(attr.unescaped_value()?.to_vec())?;
        attributes.push((key, value));
    }
    Ok(Event::Start { name, attributes })
}

impl<B: BufRead> Iterator for EventReader<B> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Result<Event>> {
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(err) => {
                self.finished = true;
                self.peeked = None;
                Some(Err(err))
            }
        }
    }
}
