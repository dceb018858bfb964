use quick_xml::Error as XMLError;
use std::{str::Utf8Error, string::FromUtf8Error};

/// Wrapper around `std::Result`
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug)]
pub enum Error {
    /// [`std::io`] related error, on either the input or the output side.
    Io(std::io::Error),
    /// Decoding related error.
    /// The XML declaration names an encoding that isn't recognized,
    /// or the bytes aren't valid in the document's encoding.
    CannotDecode,
    /// Assorted errors while parsing XML.
    MalformedXML(String),
    /// Start and end events don't pair up: a closing tag without its opening tag,
    /// a closing tag with the wrong name, or input that ends with elements still open.
    Unbalanced(String),
    /// Invalid or incomplete run options.
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO Error: {}", err),
            Error::CannotDecode => write!(f, "Cannot decode XML"),
            Error::MalformedXML(err) => write!(f, "Malformed XML: {}", err),
            Error::Unbalanced(err) => write!(f, "Unbalanced XML: {}", err),
            Error::Config(err) => write!(f, "Invalid options: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<XMLError> for Error {
    fn from(err: XMLError) -> Error {
        match err {
            XMLError::EndEventMismatch { expected, found } if expected.is_empty() => {
                Error::Unbalanced(format!("Closing tag {} has no opening tag", found))
            }
            XMLError::EndEventMismatch { expected, found } => Error::Unbalanced(format!(
                "Closing tag mismatch. Expected {}, found {}",
                expected, found,
            )),
            XMLError::Io(err) => Error::Io(err),
            XMLError::Utf8(_) => Error::CannotDecode,
            err => Error::MalformedXML(err.to_string()),
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_: FromUtf8Error) -> Error {
        Error::CannotDecode
    }
}

impl From<Utf8Error> for Error {
    fn from(_: Utf8Error) -> Error {
        Error::CannotDecode
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Error {
        Error::Config(err.to_string())
    }
}
