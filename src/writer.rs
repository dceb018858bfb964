use crate::error::{Error, Result};
use crate::event::Event;
use std::borrow::Cow;
use std::io::Write;

const INDENT: &[u8] = b"    ";

/// Which characters are replaced by entity references on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// `&`, `<` and `>` only. Used when re-emitting the source document, so
    /// values keep the source's quoting convention.
    Markup,
    /// `&`, `<`, `>`, `"` and `'`. Used for generated content.
    Full,
}

impl Escape {
    pub fn apply<'a>(self, raw: &'a str) -> Cow<'a, str> {
        match self {
            Escape::Markup => escape_markup(raw),
            Escape::Full => match quick_xml::escape::escape(raw.as_bytes()) {
                Cow::Borrowed(_) => Cow::Borrowed(raw),
                // Only ascii bytes were replaced, so it is still utf-8.
                Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
            },
        }
    }
}

/// Escape `&`, `<`, `>`. Returns the input untouched if there is nothing to replace.
pub fn escape_markup(raw: &str) -> Cow<str> {
    if !raw.contains(|c: char| c == '&' || c == '<' || c == '>') {
        return Cow::Borrowed(raw);
    }
    let mut escaped = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Serializes events with four spaces of indentation per open element.
///
/// Every start and end tag is put on a new line. Text goes right after the
/// preceding tag, and whitespace-only text is never written.
pub struct IndentWriter<W: Write> {
    inner: W,
    depth: usize,
}

impl<W: Write> IndentWriter<W> {
    pub fn new(inner: W) -> IndentWriter<W> {
        IndentWriter { inner, depth: 0 }
    }

    /// Writer whose first tag is indented as if `depth` elements were open.
    pub fn with_depth(inner: W, depth: usize) -> IndentWriter<W> {
        IndentWriter { inner, depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn write_declaration(&mut self) -> Result<()> {
        self.inner
            .write_all(br#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        Ok(())
    }

    fn write_indent(&mut self) -> Result<()> {
        self.inner.write_all(b"\n")?;
        for _ in 0..self.depth {
            self.inner.write_all(INDENT)?;
        }
        Ok(())
    }

    pub fn write_start(
        &mut self,
        name: &str,
        attributes: &[(String, String)],
        escape: Escape,
    ) -> Result<()> {
        self.write_indent()?;
        write!(self.inner, "<{}", name)?;
        for (key, value) in attributes {
            write!(self.inner, " {}=\"{}\"", key, escape.apply(value))?;
        }
        self.inner.write_all(b">")?;
        self.depth += 1;
        Ok(())
    }

    pub fn write_end(&mut self, name: &str) -> Result<()> {
        self.depth = self.depth.checked_sub(1).ok_or_else(|| {
            Error::Unbalanced(format!("Closing tag {} written with no open element", name))
        })?;
        self.write_indent()?;
        write!(self.inner, "</{}>", name)?;
        Ok(())
    }

    pub fn write_text(&mut self, content: &str, escape: Escape) -> Result<()> {
        if content.trim().is_empty() {
            return Ok(());
        }
        self.inner.write_all(escape.apply(content).as_bytes())?;
        Ok(())
    }

    pub fn write_event(&mut self, event: &Event, escape: Escape) -> Result<()> {
        match event {
            Event::Start { name, attributes } => self.write_start(name, attributes, escape),
            Event::End { name } => self.write_end(name),
            Event::Text { content } => self.write_text(content, escape),
        }
    }
}
