use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::ids::FieldId;

/// One schema violation found while validating a submission. Every variant
/// names the field it is about.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("Required field '{label}' is missing.")]
    MissingRequiredField { field_id: FieldId, label: String },

    #[error("Form field with ID '{field_id}' does not exist.")]
    UnknownField { field_id: String },

    #[error("Invalid value type for field '{label}' ({field_id}): expected {expected}.")]
    TypeMismatch {
        field_id: FieldId,
        label: String,
        expected: &'static str,
    },

    #[error("Choice with ID '{choice}' does not exist for field '{label}' ({field_id}).")]
    InvalidChoice {
        field_id: FieldId,
        label: String,
        choice: String,
    },

    #[error(
        "Invalid date '{value}' for field '{label}' ({field_id}). Expected 'DD-MM-YYYY', 'DD/MM/YYYY', or 'YYYY-MM-DD'."
    )]
    InvalidDateFormat {
        field_id: FieldId,
        label: String,
        value: String,
    },

    #[error("Value for field '{label}' ({field_id}) exceeds {max_chars} characters.")]
    TextTooLong {
        field_id: FieldId,
        label: String,
        max_chars: usize,
    },
}

impl Violation {
    /// The submitted key this violation is about.
    pub fn field_key(&self) -> String {
        match self {
            Violation::UnknownField { field_id } => field_id.clone(),
            Violation::MissingRequiredField { field_id, .. }
            | Violation::TypeMismatch { field_id, .. }
            | Violation::InvalidChoice { field_id, .. }
            | Violation::InvalidDateFormat { field_id, .. }
            | Violation::TextTooLong { field_id, .. } => field_id.to_string(),
        }
    }
}

/// All violations of one submission, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<Violation>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    /// Violations grouped by submitted key, for field-addressable error bodies.
    pub fn by_field(&self) -> std::collections::BTreeMap<String, Vec<String>> {
        let mut map: std::collections::BTreeMap<String, Vec<String>> = Default::default();
        for v in &self.0 {
            map.entry(v.field_key()).or_default().push(v.to_string());
        }
        map
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
