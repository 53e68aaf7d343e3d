use core::fmt::Write;
use tracing::warn;

use crate::label::{Label, Value};

/// Width of the `LBLSIZE` value field, so the label size can be patched in
/// place once the label length is known
pub const LBLSIZE_FIELD_WIDTH: usize = 10;

const LBLSIZE_PREFIX: &str = "LBLSIZE=";
const MAX_ITEM_NAME_LEN: usize = 32;

/// Turns an arbitrary string into a valid label item name
///
/// Names are cut to 32 characters and upper cased. They must start with a
/// letter from `A` to `Z`, anything else being replaced by `X`, and may only
/// hold `A`-`Z`, digits and `_`.
pub fn sanitize_item_name(name: &str) -> String {
    if name.is_empty() {
        warn!("Empty label item name replaced by UNNAMED");
        return "UNNAMED".to_owned();
    }
    let sanitized: String = name
        .chars()
        .take(MAX_ITEM_NAME_LEN)
        .enumerate()
        .map(|(i, c)| match c {
            c if i == 0 && !c.is_ascii_uppercase() => 'X',
            c if c.is_ascii_alphanumeric() || c == '_' => c.to_ascii_uppercase(),
            _ => '_',
        })
        .collect();
    if sanitized != name {
        warn!("Label item name {name} has been sanitized to {sanitized}");
    }
    sanitized
}

/// Where an item is written, each place reserving its own names
#[derive(Clone, Copy)]
enum Section {
    TopLevel,
    Property,
    Task,
}

impl Section {
    // Names that would open a group, or be taken for the task stamp, when
    // read back
    const fn reserved(self) -> &'static [&'static str] {
        match self {
            Self::TopLevel => &["PROPERTY", "TASK", "USER", "DAT_TIM"],
            Self::Property => &["LBLSIZE", "PROPERTY", "TASK", "USER", "DAT_TIM"],
            Self::Task => &["LBLSIZE", "PROPERTY", "TASK"],
        }
    }
}

fn item_name(name: &str, section: Section) -> String {
    let mut name = sanitize_item_name(name);
    if section.reserved().contains(&name.as_str()) {
        name.push('_');
    }
    name
}

fn write_item(buf: &mut String, name: &str, value: &Value, section: Section) {
    let _ = write!(buf, " {}={value}", item_name(name, section));
}

impl Label {
    /// Serializes the label to its on-disk form
    ///
    /// The output starts with `LBLSIZE=` and a 10 character size field, lists
    /// top-level items, then property sets, then history tasks (`USER` and
    /// `DAT_TIM` first), and is NUL padded to a multiple of `RECSIZE`.
    ///
    /// Item names go through [`sanitize_item_name`]; names that would be
    /// misread as a group marker or a task stamp get a trailing `_`.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut body = String::new();
        for (name, value) in self.entries().filter(|(name, _)| *name != "LBLSIZE") {
            write_item(&mut body, name, value, Section::TopLevel);
        }
        for property in self.properties() {
            let _ = write!(body, " PROPERTY={}", Value::from(property.name()));
            for (name, value) in property.entries() {
                write_item(&mut body, name, value, Section::Property);
            }
        }
        for task in self.tasks() {
            let _ = write!(body, " TASK={}", Value::from(task.name()));
            for key in ["USER", "DAT_TIM"] {
                if let Some(value) = task.get(key) {
                    write_item(&mut body, key, value, Section::Task);
                }
            }
            for (name, value) in task
                .entries()
                .filter(|(name, _)| !matches!(*name, "USER" | "DAT_TIM"))
            {
                write_item(&mut body, name, value, Section::Task);
            }
        }

        let record_size = self
            .get("RECSIZE")
            .and_then(Value::as_i64)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);
        let unpadded = LBLSIZE_PREFIX.len() + LBLSIZE_FIELD_WIDTH + body.len();
        let label_size = unpadded.div_ceil(record_size) * record_size;

        let mut out = format!("{LBLSIZE_PREFIX}{label_size:<LBLSIZE_FIELD_WIDTH$}");
        out.push_str(&body);
        let mut bytes = out.into_bytes();
        bytes.resize(label_size, 0);
        bytes
    }
}
