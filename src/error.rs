use std::io;

use thiserror::Error;

/// A field of an [`FmInstrument`](crate::FmInstrument) that is outside its range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} out of range: {value} (max {max})")]
    OutOfRange {
        field: String,
        value: u8,
        max: u8,
    },
}

/// Errors produced by the instrument codecs and the format registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Buffer is structurally broken: bad length, offsets or chunk sizes.
    #[error("file corruption error: {0}")]
    DataCorruption(String),

    /// A required magic marker is missing.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Valid container, but for a chip or system we do not handle.
    #[error("unsupported file: {0}")]
    UnsupportedFormat(String),

    /// Valid container holding a non-FM instrument.
    #[error("unsupported instrument type: {0}")]
    UnsupportedInstrumentType(String),

    #[error("text parse error: {0}")]
    TextParse(String),

    #[error("invalid instrument: {0}")]
    InvalidInstrument(#[from] ValidationError),

    #[error("invalid instrument name: {0}")]
    InvalidName(String),

    #[error("not loadable file: {0}")]
    NotLoadable(String),

    #[error("format is not writable: {0}")]
    NotWritable(String),

    #[error("unknown format: {0}")]
    UnknownFormat(String),
}

impl FormatError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        FormatError::DataCorruption(message.into())
    }
}

// Every read goes through a Cursor over the input slice, so the only io
// failure that can surface is a short read.
impl From<io::Error> for FormatError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => FormatError::corrupt("unexpected end of data"),
            _ => FormatError::corrupt(e.to_string()),
        }
    }
}

impl From<bincode::Error> for FormatError {
    fn from(e: bincode::Error) -> Self {
        FormatError::corrupt(e.to_string())
    }
}
