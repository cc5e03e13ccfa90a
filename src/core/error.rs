use thiserror::Error;

/// Universal error type for PDF operations.
///
/// This error type covers everything that can go wrong while tokenizing,
/// parsing and resolving a PDF byte stream. The validator maps each error to a
/// report message of the appropriate severity at the phase boundary, so none of
/// these ever escape a validation run as a panic.
#[derive(Debug, Clone, Error)]
pub enum PDFError {
    /// End of stream reached unexpectedly
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    /// Invalid byte range requested
    #[error("invalid byte range: {begin}..{end}")]
    InvalidByteRange { begin: usize, end: usize },

    /// Invalid stream position
    #[error("invalid position {pos} for stream of length {length}")]
    InvalidPosition { pos: usize, length: usize },

    /// Lexical or grammatical violation at a byte offset
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// Decoded stream data grew past the configured ceiling
    #[error("{filter} output exceeds {limit} bytes")]
    DecodeLimit { filter: String, limit: usize },

    /// Object number outside [0, Size)
    #[error("object number {num} outside declared size {size}")]
    ObjectOutOfRange { num: u32, size: usize },

    /// A recursion or iteration ceiling was hit
    #[error("recursion limit of {limit} exceeded while {context}")]
    RecursionLimit { limit: usize, context: &'static str },

    /// Stream filter failure
    #[error("{filter} error: {message}")]
    Decode { filter: String, message: String },

    /// Construct that is recognised but deliberately not handled
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    /// Cross-reference or trailer structure is unusable
    #[error("malformed cross-reference data: {0}")]
    XRef(String),

    /// Underlying I/O failure while reading the byte source
    #[error("i/o error: {0}")]
    Io(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

impl PDFError {
    /// Convenience constructor for syntax errors.
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        PDFError::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Returns the byte offset the error refers to, when it has one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            PDFError::Syntax { offset, .. } => Some(*offset),
            PDFError::InvalidPosition { pos, .. } => Some(*pos),
            PDFError::InvalidByteRange { begin, .. } => Some(*begin),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PDFError {
    fn from(err: std::io::Error) -> Self {
        PDFError::Io(err.to_string())
    }
}

/// Result type alias for PDF operations
pub type PDFResult<T> = Result<T, PDFError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_carries_offset() {
        let err = PDFError::syntax(42, "bad token");
        assert_eq!(err.offset(), Some(42));
        assert_eq!(err.to_string(), "syntax error at offset 42: bad token");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PDFError = io.into();
        assert!(matches!(err, PDFError::Io(_)));
        assert_eq!(err.offset(), None);
    }
}
