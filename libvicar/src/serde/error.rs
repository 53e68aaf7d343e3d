use thiserror::Error;

/// Errors raised while reading or parsing a VICAR label
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The stream does not start with `LBLSIZE=<n>`
    #[error("LBLSIZE not found in label")]
    MissingLabelSize,
    /// Fewer bytes than `LBLSIZE` announced could be read
    #[error("label is truncated: expected {expected} bytes, read {read}")]
    TruncatedLabel {
        /// announced label size
        expected: u64,
        /// bytes available
        read: u64,
    },
    /// An item starts with `=` instead of a name
    #[error("missing item name at byte {0}")]
    MissingName(usize),
    /// An item name is not followed by `=`
    #[error("missing '=' after item name {name} at byte {offset}")]
    MissingEquals {
        /// item name
        name: String,
        /// byte offset of the name in the label text
        offset: usize,
    },
    /// An item has `=` but no value
    #[error("missing value for item {name} at byte {offset}")]
    MissingValue {
        /// item name
        name: String,
        /// byte offset of the value in the label text
        offset: usize,
    },
    /// A quoted string runs to the end of the label
    #[error("unterminated string for item {name} at byte {offset}")]
    UnterminatedString {
        /// item name
        name: String,
        /// byte offset of the value in the label text
        offset: usize,
    },
    /// A parenthesized list runs to the end of the label
    #[error("unterminated array for item {name} at byte {offset}")]
    UnterminatedArray {
        /// item name
        name: String,
        /// byte offset of the value in the label text
        offset: usize,
    },
    /// A required item is absent
    #[error("required item {0} not found in label")]
    MissingItem(&'static str),
    /// `EOL=1` but no label could be found at the computed offset
    #[error("end-of-dataset label not found at offset {0}")]
    MissingSecondaryLabel(u64),
}
