use crate::error::{Error, Result};
use encoding_rs::{CoderResult, Decoder, Encoding, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{BufRead, Read};

const RAW_CAPACITY: usize = 8192;
// UTF-8 output of one raw chunk never needs more than 3 bytes per input byte.
const DECODED_CAPACITY: usize = RAW_CAPACITY * 3;

/// Presents a byte source in any encoding supported by `encoding_rs` as UTF-8.
///
/// Without a decoder the bytes are passed through untouched.
pub struct DecodeReader<R: Read> {
    inner: R,
    decoder: Option<Decoder>,
    raw: Box<[u8]>,
    raw_pos: usize,
    raw_len: usize,
    decoded: Box<[u8]>,
    decoded_pos: usize,
    decoded_len: usize,
    eof: bool,
    finished: bool,
}

impl<R: Read> DecodeReader<R> {
    fn new(inner: R) -> DecodeReader<R> {
        DecodeReader {
            inner,
            decoder: None,
            raw: vec![0; RAW_CAPACITY].into_boxed_slice(),
            raw_pos: 0,
            raw_len: 0,
            decoded: vec![0; DECODED_CAPACITY].into_boxed_slice(),
            decoded_pos: 0,
            decoded_len: 0,
            eof: false,
            finished: false,
        }
    }

    /// Look at the first bytes of `inner` and pick the decoder.
    ///
    /// A byte order mark wins. Then the `<?` pattern of UTF-16 without BOM.
    /// Otherwise the document is ASCII compatible, and the `encoding` of its
    /// XML declaration (if any) is used.
    pub fn sniff(inner: R) -> Result<DecodeReader<R>> {
        let mut reader = DecodeReader::new(inner);
        let head = reader.fill_raw()?;
        let (encoding, bom_len) = match Encoding::for_bom(head) {
            Some((encoding, bom_len)) => (Some(encoding), bom_len),
            None => match head {
                [0x00, 0x3c, 0x00, 0x3f, ..] => (Some(UTF_16BE), 0),
                [0x3c, 0x00, 0x3f, 0x00, ..] => (Some(UTF_16LE), 0),
                _ => (declared_encoding(head)?, 0),
            },
        };
        reader.raw_pos += bom_len;
        reader.decoder = encoding
            .filter(|encoding| *encoding != UTF_8)
            .map(|encoding| encoding.new_decoder_without_bom_handling());
        Ok(reader)
    }

    fn fill_raw(&mut self) -> std::io::Result<&[u8]> {
        if self.raw_pos >= self.raw_len && !self.eof {
            self.raw_len = self.inner.read(&mut self.raw)?;
            self.raw_pos = 0;
            self.eof = self.raw_len == 0;
        }
        Ok(&self.raw[self.raw_pos..self.raw_len])
    }

    fn fill_decoded(&mut self) -> std::io::Result<()> {
        while self.decoded_pos >= self.decoded_len && !self.finished {
            if self.raw_pos >= self.raw_len && !self.eof {
                self.fill_raw()?;
            }
            let last = self.eof;
            let decoder = match self.decoder.as_mut() {
                Some(decoder) => decoder,
                None => return Ok(()),
            };
            let (result, read, written, _replaced) = decoder.decode_to_utf8(
                &self.raw[self.raw_pos..self.raw_len],
                &mut self.decoded,
                last,
            );
            self.raw_pos += read;
            self.decoded_pos = 0;
            self.decoded_len = written;
            if last && result == CoderResult::InputEmpty {
                self.finished = true;
            }
        }
        Ok(())
    }
}

// The declaration has to fit in the first chunk, which it always does in practice.
fn declared_encoding(head: &[u8]) -> Result<Option<&'static Encoding>> {
    if !head.starts_with(b"<?xml") {
        return Ok(None);
    }
    let mut reader = Reader::from_reader(head);
    reader.trim_text(true);
    let mut buf = Vec::with_capacity(64);
    let label = loop {
        buf.clear();
        match reader.read_event(&mut buf) {
            Ok(Event::Decl(decl)) => match decl.encoding() {
                Some(label) => break label?.into_owned(),
                None => return Ok(None),
            },
            Ok(Event::Text(_)) => continue,
            _ => return Ok(None),
        }
    };
    let encoding = Encoding::for_label(&label).ok_or(Error::CannotDecode)?;
    // The bytes are ASCII compatible, so a UTF-16 label can't be right.
    if encoding == UTF_16LE || encoding == UTF_16BE {
        return Ok(None);
    }
    Ok(Some(encoding))
}

impl<R: Read> Read for DecodeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let available = self.fill_buf()?;
        let amt = std::cmp::min(available.len(), buf.len());
        buf[..amt].copy_from_slice(&available[..amt]);
        self.consume(amt);
        Ok(amt)
    }
}

impl<R: Read> BufRead for DecodeReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.decoder.is_none() {
            return self.fill_raw();
        }
        self.fill_decoded()?;
        Ok(&self.decoded[self.decoded_pos..self.decoded_len])
    }

    fn consume(&mut self, amt: usize) {
        if self.decoder.is_none() {
            self.raw_pos = std::cmp::min(self.raw_pos + amt, self.raw_len);
        } else {
            self.decoded_pos = std::cmp::min(self.decoded_pos + amt, self.decoded_len);
        }
    }
}
