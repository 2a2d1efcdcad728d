//! What gets reported about each split of a fetched dataset

use super::Record;
use crate::{truncate_for_display, TEXT_PREVIEW_LENGTH};
use serde_json::Value;
use std::fmt::{self, Display};

/// Kind of value found in a record field
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum FieldKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    List,
    Struct,
    /// Values of different kinds were seen
    Mixed,
}
//
impl FieldKind {
    /// Kind of a single value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_f64() => Self::Float,
            Value::Number(_) => Self::Int,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::List,
            Value::Object(_) => Self::Struct,
        }
    }

    /// Kind of a field that held values of both kinds
    ///
    /// Nulls do not tell anything about a field, and integers widen to
    /// floats.
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Null, kind) | (kind, Self::Null) => kind,
            (a, b) if a == b => a,
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => Self::Float,
            _ => Self::Mixed,
        }
    }
}
//
impl Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int64",
            Self::Float => "float64",
            Self::String => "string",
            Self::List => "list",
            Self::Struct => "struct",
            Self::Mixed => "mixed",
        })
    }
}

/// Summary of one split, built as its records stream by
#[derive(Clone, Debug, PartialEq)]
pub struct SplitSummary {
    /// Name of the split
    name: Box<str>,

    /// Fields in order of first appearance, with the kind of their values
    features: Vec<(String, FieldKind)>,

    /// Number of records
    num_rows: u64,

    /// First record of the split
    example: Option<Record>,
}
//
impl SplitSummary {
    /// Start summarizing a split
    pub fn new(name: impl Into<Box<str>>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
            num_rows: 0,
            example: None,
        }
    }

    /// Account for one more record
    pub fn observe(&mut self, record: &Record) {
        self.num_rows += 1;
        for (field, value) in record {
            let kind = FieldKind::of(value);
            match self.features.iter_mut().find(|(name, _)| name == field) {
                Some((_, known)) => *known = known.merge(kind),
                None => self.features.push((field.clone(), kind)),
            }
        }
        if self.example.is_none() {
            self.example = Some(record.clone());
        }
    }

    /// Name of the split
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records seen so far
    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    /// Fields seen so far, with the kind of their values
    pub fn features(&self) -> &[(String, FieldKind)] {
        &self.features
    }
}
//
impl Display for SplitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} split:", self.name)?;
        write!(f, "Features: {{")?;
        for (idx, (name, kind)) in self.features.iter().enumerate() {
            let separator = if idx == 0 { "" } else { ", " };
            write!(f, "{separator}{name:?}: {kind}")?;
        }
        writeln!(f, "}}")?;
        writeln!(f, "Size: {}", self.num_rows)?;
        match &self.example {
            Some(example) => write!(f, "Example: {}", display_record(example)),
            None => write!(f, "Example: none, the split is empty"),
        }
    }
}

/// Render a record on one line, shortening long strings
pub fn display_record(record: &Record) -> String {
    let shortened = record
        .iter()
        .map(|(field, value)| (field.clone(), shorten(value)))
        .collect::<Record>();
    Value::Object(shortened).to_string()
}

/// Shorten the strings inside of a value
fn shorten(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            Value::String(truncate_for_display(s, TEXT_PREVIEW_LENGTH).into_owned())
        }
        Value::Array(values) => Value::Array(values.iter().map(shorten).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(field, value)| (field.clone(), shorten(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("{other} is not an object"),
        }
    }

    #[test]
    fn kinds_merge() {
        assert_eq!(FieldKind::Null.merge(FieldKind::String), FieldKind::String);
        assert_eq!(FieldKind::Int.merge(FieldKind::Null), FieldKind::Int);
        assert_eq!(FieldKind::Int.merge(FieldKind::Float), FieldKind::Float);
        assert_eq!(FieldKind::Bool.merge(FieldKind::String), FieldKind::Mixed);
        assert_eq!(FieldKind::of(&json!(1.5)), FieldKind::Float);
        assert_eq!(FieldKind::of(&json!(-3)), FieldKind::Int);
    }

    #[test]
    fn split_summary() {
        let mut summary = SplitSummary::new("train");
        summary.observe(&record(json!({"text": "first", "score": null})));
        summary.observe(&record(json!({"text": "second", "score": 2, "meta": {"a": 1}})));
        summary.observe(&record(json!({"text": "third", "score": 0.5})));
        assert_eq!(summary.num_rows(), 3);
        assert_eq!(
            summary.features(),
            [
                ("text".to_owned(), FieldKind::String),
                ("score".to_owned(), FieldKind::Float),
                ("meta".to_owned(), FieldKind::Struct),
            ]
        );
        assert_eq!(
            summary.to_string(),
            "train split:\n\
             Features: {\"text\": string, \"score\": float64, \"meta\": struct}\n\
             Size: 3\n\
             Example: {\"text\":\"first\",\"score\":null}"
        );
    }

    #[test]
    fn empty_split() {
        let summary = SplitSummary::new("test");
        assert_eq!(
            summary.to_string(),
            "test split:\nFeatures: {}\nSize: 0\nExample: none, the split is empty"
        );
    }

    #[test]
    fn long_strings_are_shortened() {
        let long = "x".repeat(150);
        let shown = display_record(&record(json!({"text": long, "tags": [long]})));
        let expected = format!("{}...", "x".repeat(TEXT_PREVIEW_LENGTH));
        assert_eq!(shown, format!("{{\"text\":\"{expected}\",\"tags\":[\"{expected}\"]}}"));
    }
}
