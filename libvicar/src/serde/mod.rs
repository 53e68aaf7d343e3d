//! Reading and writing of the VICAR label text
//!
//! A label is a sequence of `NAME=VALUE` items separated by whitespace and
//! padded with NUL bytes. `PROPERTY=` and `TASK=` items open a group that the
//! following items belong to.

pub(crate) mod error;
mod field;
mod record;
mod utils;

use regex::Regex;
use std::sync::LazyLock;

pub use error::Error;
pub use field::sanitize_item_name;
pub(crate) use field::LBLSIZE_FIELD_WIDTH;

use crate::label::Label;

static LBLSIZE_REGEX: LazyLock<regex::bytes::Regex> = LazyLock::new(|| {
    regex::bytes::Regex::new(r"LBLSIZE\s*=\s*(\d+)").expect("LBLSIZE regex is valid")
});
static INTEGER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+$").expect("integer regex is valid"));
static REAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eEdD][+-]?\d+)?$").expect("real regex is valid")
});
// how non-finite reals are written back
static NON_FINITE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(NaN|[+-]?inf)$").expect("non-finite regex is valid"));

/// Minimum number of bytes that can hold `LBLSIZE=` and its size field
pub(crate) const MIN_LABEL_PROBE: usize = 31;
/// Number of bytes inspected to locate `LBLSIZE=`
pub(crate) const LABEL_PROBE: usize = 64;

/// Finds the value of `LBLSIZE` in the first bytes of a label
pub(crate) fn find_label_size(probe: &[u8]) -> Option<u64> {
    let captures = LBLSIZE_REGEX.captures(probe)?;
    std::str::from_utf8(captures.get(1)?.as_bytes())
        .ok()?
        .parse()
        .ok()
}

/// Parses a complete primary label
///
/// # Errors
///
/// Returns an [`Error`] when an item cannot be tokenized
pub fn parse_label(text: &[u8]) -> Result<Label, Error> {
    let mut label = Label::new();
    record::parse_into(&mut label, &String::from_utf8_lossy(text), false)?;
    Ok(label)
}

/// Merges an end-of-dataset label into an already parsed primary label
pub(crate) fn parse_continuation(label: &mut Label, text: &[u8]) -> Result<(), Error> {
    record::parse_into(label, &String::from_utf8_lossy(text), true)
}
