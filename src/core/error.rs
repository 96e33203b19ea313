use thiserror::Error;

#[derive(Error, Debug)]
pub enum SealError {
    #[error("Required parameter was not provided: {0}")]
    NullParameter(&'static str),

    #[error("Unable to parse key material: {0}")]
    ParseError(String),

    #[error("Leaf id is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Target buffer too small: {required} bytes required, {available} available")]
    BufferTooSmall { required: u64, available: u64 },

    #[error(
        "Leaf '{id}' changed size since it was added: expected {expected} bytes, found {found}"
    )]
    LeafSizeChanged { id: String, expected: u64, found: u64 },

    #[error("Invalid magic sequence in header: {0:02x?}")]
    InvalidMagic([u8; 8]),

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u16),

    #[error("Malformed archive source: {0}")]
    Malformed(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Archive has been closed")]
    ArchiveClosed,

    #[error("Unable to continue, missing capability: {0}")]
    MissingFeature(&'static str),

    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    #[error("Leaf id too long: {length} bytes (max {max})")]
    LeafIdTooLong { length: usize, max: usize },

    #[error("A leaf with id '{0}' already exists")]
    DuplicateLeafId(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Manifest error: {0}")]
    Manifest(String),
}

/// Coarse classification of [`SealError`], stable across releases.
///
/// Host bindings translate failures through [`ErrorKind::code`] instead of
/// matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NullParameter,
    ParseError,
    InvalidUtf8,
    GenericIoError,
    MalformedArchiveSource,
    ResourceNotFound,
    Unknown,
    MissingFeature,
    CryptoError,
    LeafIdTooLong,
    DuplicateLeafId,
}

impl ErrorKind {
    /// Negative error code for this kind. Zero is never returned.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::NullParameter => -1,
            ErrorKind::ParseError => -2,
            ErrorKind::InvalidUtf8 => -3,
            ErrorKind::GenericIoError => -4,
            ErrorKind::MalformedArchiveSource => -5,
            ErrorKind::ResourceNotFound => -6,
            ErrorKind::Unknown => -7,
            ErrorKind::MissingFeature => -8,
            ErrorKind::CryptoError => -9,
            ErrorKind::LeafIdTooLong => -10,
            ErrorKind::DuplicateLeafId => -11,
        }
    }
}

impl SealError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SealError::NullParameter(_) => ErrorKind::NullParameter,
            SealError::ParseError(_) => ErrorKind::ParseError,
            SealError::InvalidUtf8(_) => ErrorKind::InvalidUtf8,
            SealError::Io(_)
            | SealError::BufferTooSmall { .. }
            | SealError::LeafSizeChanged { .. } => ErrorKind::GenericIoError,
            SealError::InvalidMagic(_)
            | SealError::UnsupportedVersion(_)
            | SealError::Malformed(_) => ErrorKind::MalformedArchiveSource,
            SealError::ResourceNotFound(_) | SealError::ArchiveClosed => {
                ErrorKind::ResourceNotFound
            }
            SealError::MissingFeature(_) => ErrorKind::MissingFeature,
            SealError::Crypto(_) => ErrorKind::CryptoError,
            SealError::LeafIdTooLong { .. } => ErrorKind::LeafIdTooLong,
            SealError::DuplicateLeafId(_) => ErrorKind::DuplicateLeafId,
            SealError::Compression(_) | SealError::Manifest(_) => ErrorKind::Unknown,
        }
    }

    /// Shorthand for [`ErrorKind::code`] of this error.
    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    /// Build a [`SealError::Malformed`] from anything displayable
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        SealError::Malformed(reason.into())
    }
}

impl From<std::convert::Infallible> for SealError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

pub type Result<T> = std::result::Result<T, SealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_negative() {
        let kinds = [
            ErrorKind::NullParameter,
            ErrorKind::ParseError,
            ErrorKind::InvalidUtf8,
            ErrorKind::GenericIoError,
            ErrorKind::MalformedArchiveSource,
            ErrorKind::ResourceNotFound,
            ErrorKind::Unknown,
            ErrorKind::MissingFeature,
            ErrorKind::CryptoError,
            ErrorKind::LeafIdTooLong,
            ErrorKind::DuplicateLeafId,
        ];

        let mut codes: Vec<i32> = kinds.iter().map(|k| k.code()).collect();
        assert!(codes.iter().all(|&c| c < 0));

        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            SealError::BufferTooSmall {
                required: 10,
                available: 5
            }
            .kind(),
            ErrorKind::GenericIoError
        );
        assert_eq!(
            SealError::InvalidMagic(*b"NOTSPAK!").kind(),
            ErrorKind::MalformedArchiveSource
        );
        assert_eq!(SealError::ArchiveClosed.kind(), ErrorKind::ResourceNotFound);
        assert_eq!(SealError::Crypto("bad".into()).code(), -9);
    }
}
