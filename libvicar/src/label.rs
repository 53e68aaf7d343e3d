use chrono::NaiveDateTime;
use itertools::Itertools;
use std::fmt::{self, Display};

/// Format of the `DAT_TIM` item of history tasks, e.g. `Tue Mar  5 14:02:11 2024`
pub const DAT_TIM_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// A single label item value
///
/// VICAR labels only know integers, reals, strings and flat lists of those.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer item, e.g. `NL=512`
    Integer(i64),
    /// Real item, e.g. `MAP_SCALE=0.25`
    Real(f64),
    /// String item, e.g. `FORMAT='BYTE'`
    String(String),
    /// List of values, e.g. `CENTER=(1.5,2.25)`
    Array(Vec<Value>),
}

impl Value {
    /// Returns the value as an integer
    ///
    /// Strings holding an integer literal are converted as well, since
    /// some writers quote numeric items.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::String(s) => s.trim().parse().ok(),
            Self::Real(_) | Self::Array(_) => None,
        }
    }

    /// Returns the value as a real
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(i) => Some(*i as f64),
            Self::Real(f) => Some(*f),
            Self::String(s) => s.trim().parse().ok(),
            Self::Array(_) => None,
        }
    }

    /// Returns the content of a string value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements of an array value
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Textual form of the value: strings unquoted, everything else as it
    /// would appear in the label
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Display for Value {
    /// Writes the value the way it is stored in a label
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            // Debug keeps a '.' or an exponent, so reals never read back as
            // integers, and spells non-finite values NaN, inf and -inf
            Self::Real(r) => write!(f, "{r:?}"),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''").replace('\n', "\\n")),
            Self::Array(values) => write!(f, "({})", values.iter().join(",")),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        i64::try_from(value).map_or(Self::Real(value as f64), Self::Integer)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::from(value as u64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Self>> for Value {
    fn from(value: Vec<Self>) -> Self {
        Self::Array(value)
    }
}

fn lookup<'a>(entries: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

// Replaces in place so that re-setting an item keeps its position in the label
fn upsert(entries: &mut Vec<(String, Value)>, key: String, value: Value) {
    if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
        slot.1 = value;
    } else {
        entries.push((key, value));
    }
}

/// A named set of items: a `PROPERTY` set or a `TASK` history entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Group {
    name: String,
    entries: Vec<(String, Value)>,
}

impl Group {
    /// Creates an empty group
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Returns the group name (the value following `PROPERTY=` or `TASK=`)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of an item of this group
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        lookup(&self.entries, key)
    }

    /// Sets an item of this group, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        upsert(&mut self.entries, key.into(), value.into());
    }

    /// Iterates over the items of this group in label order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of items in the group
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the group holds no item
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the `USER` item of a task
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.get("USER").and_then(Value::as_str)
    }

    /// Parses the `DAT_TIM` item of a task
    #[must_use]
    pub fn date_time(&self) -> Option<NaiveDateTime> {
        let text = self.get("DAT_TIM")?.as_str()?;
        NaiveDateTime::parse_from_str(text.trim(), DAT_TIM_FORMAT).ok()
    }
}

/// A parsed VICAR label
///
/// Top-level items are kept in label order. Items that follow a `PROPERTY=`
/// or `TASK=` item belong to that group and are reachable through the dotted
/// path `GROUP.ITEM` with [`Label::get`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Label {
    entries: Vec<(String, Value)>,
    properties: Vec<Group>,
    tasks: Vec<Group>,
}

impl Label {
    /// Creates an empty label
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an item by path
    ///
    /// A plain name addresses a top-level item, `GROUP.ITEM` an item of a
    /// property set or task. When several groups share a name the most
    /// recent one holding the item wins.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        if let Some(value) = lookup(&self.entries, path) {
            return Some(value);
        }
        let (group, key) = path.split_once('.')?;
        self.tasks
            .iter()
            .rev()
            .chain(self.properties.iter().rev())
            .filter(|g| g.name == group)
            .find_map(|g| g.get(key))
    }

    /// Sets a top-level item, replacing any previous value in place
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        upsert(&mut self.entries, key.into(), value.into());
    }

    /// Removes a top-level item
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Iterates over the top-level items in label order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over every item with its full path: top-level items first,
    /// then property sets, then tasks
    pub fn iter_flat(&self) -> impl Iterator<Item = (String, &Value)> {
        let top = self.entries.iter().map(|(k, v)| (k.clone(), v));
        let grouped = self
            .properties
            .iter()
            .chain(self.tasks.iter())
            .flat_map(|g| g.entries.iter().map(|(k, v)| (format!("{}.{k}", g.name), v)));
        top.chain(grouped)
    }

    /// Returns the property sets
    #[must_use]
    pub fn properties(&self) -> &[Group] {
        &self.properties
    }

    /// Returns the property set with the given name
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Group> {
        self.properties.iter().find(|g| g.name == name)
    }

    /// Returns the property set with the given name, creating it if needed
    pub fn property_mut(&mut self, name: &str) -> &mut Group {
        let position = match self.properties.iter().position(|g| g.name == name) {
            Some(position) => position,
            None => {
                self.properties.push(Group::new(name));
                self.properties.len() - 1
            }
        };
        &mut self.properties[position]
    }

    /// Removes a property set
    pub fn remove_property(&mut self, name: &str) -> Option<Group> {
        let position = self.properties.iter().position(|g| g.name == name)?;
        Some(self.properties.remove(position))
    }

    /// Returns the history tasks, oldest first
    #[must_use]
    pub fn tasks(&self) -> &[Group] {
        &self.tasks
    }

    /// Returns the most recent task with the given name
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&Group> {
        self.tasks.iter().rev().find(|g| g.name == name)
    }

    /// Appends a history task stamped with `USER` and `DAT_TIM`
    pub fn push_task(
        &mut self,
        name: impl Into<String>,
        user: impl Into<String>,
        at: NaiveDateTime,
    ) -> &mut Group {
        let mut task = Group::new(name);
        task.set("USER", user.into());
        task.set("DAT_TIM", at.format(DAT_TIM_FORMAT).to_string());
        self.tasks.push(task);
        let last = self.tasks.len() - 1;
        &mut self.tasks[last]
    }

    /// Returns the `LBLSIZE` item
    #[must_use]
    pub fn label_size(&self) -> Option<u64> {
        self.get("LBLSIZE")
            .and_then(Value::as_i64)
            .and_then(|n| u64::try_from(n).ok())
    }

    /// Returns the textual form of an item (strings unquoted)
    #[must_use]
    pub fn get_text(&self, path: &str) -> Option<String> {
        self.get(path).map(Value::to_text)
    }

    pub(crate) fn push_property_group(&mut self, name: String) -> usize {
        if let Some(position) = self.properties.iter().position(|g| g.name == name) {
            return position;
        }
        self.properties.push(Group::new(name));
        self.properties.len() - 1
    }

    pub(crate) fn push_task_group(&mut self, name: String) -> usize {
        self.tasks.push(Group::new(name));
        self.tasks.len() - 1
    }

    pub(crate) fn property_at_mut(&mut self, index: usize) -> &mut Group {
        &mut self.properties[index]
    }

    pub(crate) fn task_at_mut(&mut self, index: usize) -> &mut Group {
        &mut self.tasks[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn dotted_paths_reach_groups() {
        let mut label = Label::new();
        label.set("NL", 10);
        label.property_mut("MAP").set("MAP_SCALE", 0.5);
        label.push_task_group("COPY".to_owned());
        label.task_at_mut(0).set("NL", 3);

        assert_eq!(label.get("NL"), Some(&Value::Integer(10)));
        assert_eq!(label.get("MAP.MAP_SCALE"), Some(&Value::Real(0.5)));
        assert_eq!(label.get("COPY.NL"), Some(&Value::Integer(3)));
        assert_eq!(label.get("MAP.NL"), None);
        assert_eq!(label.get("MISSING.NL"), None);
    }

    #[test]
    fn set_keeps_position() {
        let mut label = Label::new();
        label.set("A", 1);
        label.set("B", 2);
        label.set("A", "x");
        let keys: Vec<_> = label.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, ["A", "B"]);
        assert_eq!(label.get_text("A").as_deref(), Some("x"));
    }

    #[test]
    fn latest_task_wins() {
        let mut label = Label::new();
        let i = label.push_task_group("COPY".to_owned());
        label.task_at_mut(i).set("NS", 1);
        let i = label.push_task_group("COPY".to_owned());
        label.task_at_mut(i).set("NS", 2);
        assert_eq!(label.get("COPY.NS"), Some(&Value::Integer(2)));
        assert_eq!(label.tasks().len(), 2);
    }

    #[test]
    fn task_timestamp_round_trips() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 2, 11)
            .unwrap();
        let mut label = Label::new();
        label.push_task("VICR", "tester", at);
        let task = label.task("VICR").unwrap();
        assert_eq!(task.user(), Some("tester"));
        assert_eq!(
            task.get("DAT_TIM").and_then(Value::as_str),
            Some("Tue Mar  5 14:02:11 2024")
        );
        assert_eq!(task.date_time(), Some(at));
    }

    #[test]
    fn values_display_as_label_text() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(2.0).to_string(), "2.0");
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
        assert_eq!(
            Value::from(vec![Value::from(1), Value::from(2.5), Value::from("a")]).to_string(),
            "(1,2.5,'a')"
        );
        assert_eq!(Value::from(u64::MAX).as_i64(), None);
    }
}
