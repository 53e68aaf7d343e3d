use tracing::{instrument, trace};

use super::error::Error;
use super::utils::{equals, item_name, skip_separators, value as item_value};
use crate::label::Label;

/// Group the next items are attached to
#[derive(Debug, Clone, Copy)]
enum Scope {
    Top,
    Property(usize),
    Task(usize),
}

/// Parses label text into `label`
///
/// A continuation is the end-of-dataset label: its own `LBLSIZE` is skipped
/// and its items start again at top level.
#[instrument(skip(label, text), level = "trace")]
pub fn parse_into(label: &mut Label, text: &str, continuation: bool) -> Result<(), Error> {
    let offset_of = |rest: &str| text.len() - rest.len();
    let mut input = text;
    let mut scope = Scope::Top;
    loop {
        input = skip_separators(input);
        if input.is_empty() {
            break;
        }
        let name_offset = offset_of(input);
        let (rest, name) = item_name(input).map_err(|_| Error::MissingName(name_offset))?;
        let rest = skip_separators(rest);
        let (rest, _) = equals(rest).map_err(|_| Error::MissingEquals {
            name: name.to_owned(),
            offset: name_offset,
        })?;
        let rest = skip_separators(rest);
        let value_offset = offset_of(rest);
        let (rest, value) = item_value(rest).map_err(|_| {
            let name = name.to_owned();
            let offset = value_offset;
            match rest.chars().next() {
                Some('\'') => Error::UnterminatedString { name, offset },
                Some('(') => Error::UnterminatedArray { name, offset },
                _ => Error::MissingValue { name, offset },
            }
        })?;
        input = rest;

        if name.eq_ignore_ascii_case("PROPERTY") {
            scope = Scope::Property(label.push_property_group(value.to_text()));
            continue;
        }
        if name.eq_ignore_ascii_case("TASK") {
            scope = Scope::Task(label.push_task_group(value.to_text()));
            continue;
        }
        match scope {
            Scope::Top if continuation && name == "LBLSIZE" => {
                trace!("skipping LBLSIZE={value} of the end-of-dataset label");
            }
            Scope::Top => label.set(name, value),
            Scope::Property(i) => label.property_at_mut(i).set(name, value),
            Scope::Task(i) => label.task_at_mut(i).set(name, value),
        }
    }
    Ok(())
}
