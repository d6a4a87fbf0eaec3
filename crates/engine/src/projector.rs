//! Reassembles a stored response into per-field values, in field order.

use serde::Serialize;
use serde_json::{Value, json};

use formstack_core::{AnswerValue, ContentRef, FieldType, ids::*};
use formstack_storage::{FieldRecord, ResponseRecord, Storage};

use crate::error::{EngineError, Subject};

/// A projected answer. Serializes without a tag: text, list of texts,
/// boolean, ISO date or content reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProjectedValue {
    Text(String),
    Texts(Vec<String>),
    Boolean(bool),
    Date(chrono::NaiveDate),
    Content(ContentRef),
}

impl ProjectedValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ProjectedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_texts(&self) -> Option<&[String]> {
        match self {
            ProjectedValue::Texts(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedField {
    pub field_id: FieldId,
    pub label: String,
    pub field_type: FieldType,
    pub order: u32,
    /// `None` when the response has no answer for this field.
    pub value: Option<ProjectedValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseView {
    pub response_id: ResponseId,
    pub form_id: FormId,
    pub submitted_at: i64,
    pub form_fields: Vec<ProjectedField>,
}

impl ResponseView {
    pub fn value_of(&self, field_id: FieldId) -> Option<&ProjectedValue> {
        self.form_fields
            .iter()
            .find(|f| f.field_id == field_id)
            .and_then(|f| f.value.as_ref())
    }

    /// `(field type, value)` pairs in field order.
    pub fn pairs(&self) -> Vec<(FieldType, Option<&ProjectedValue>)> {
        self.form_fields
            .iter()
            .map(|f| (f.field_type, f.value.as_ref()))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        let fields: Vec<Value> = self
            .form_fields
            .iter()
            .map(|f| json!([f.field_type.as_str(), f.value]))
            .collect();
        json!({
            "id": self.response_id.to_string(),
            "form": self.form_id.to_string(),
            "form_fields": fields,
        })
    }
}

pub fn project(storage: &impl Storage, response_id: ResponseId) -> Result<ResponseView, EngineError> {
    let response = storage
        .get_response(response_id)?
        .ok_or(EngineError::NotFound(Subject::Response(response_id)))?;
    project_record(storage, &response)
}

pub(crate) fn project_record(
    storage: &impl Storage,
    response: &ResponseRecord,
) -> Result<ResponseView, EngineError> {
    let fields = storage.get_fields(response.form_id)?;
    let mut form_fields = Vec::with_capacity(fields.len());
    for field in fields {
        let value = project_field(storage, response.response_id, &field)?;
        form_fields.push(ProjectedField {
            field_id: field.field_id,
            label: field.label,
            field_type: field.field_type,
            order: field.order,
            value,
        });
    }
    Ok(ResponseView {
        response_id: response.response_id,
        form_id: response.form_id,
        submitted_at: response.submitted_at,
        form_fields,
    })
}

fn project_field(
    storage: &impl Storage,
    response_id: ResponseId,
    field: &FieldRecord,
) -> Result<Option<ProjectedValue>, EngineError> {
    let spec = field.field_type.spec();
    let rows = storage.get_answers(response_id, field.field_id, spec.answer)?;
    if rows.is_empty() {
        return Ok(None);
    }

    if spec.multi_valued {
        let texts = rows
            .iter()
            .filter_map(|row| row.value.as_text().map(str::to_string))
            .collect();
        return Ok(Some(ProjectedValue::Texts(texts)));
    }

    let value = match &rows[0].value {
        AnswerValue::ShortText(s) | AnswerValue::LongText(s) | AnswerValue::Choice(s) => {
            ProjectedValue::Text(s.clone())
        }
        AnswerValue::CheckBox(b) => ProjectedValue::Boolean(*b),
        AnswerValue::Date(d) => ProjectedValue::Date(*d),
        AnswerValue::File(r) | AnswerValue::PaymentProof(r) => ProjectedValue::Content(r.clone()),
    };
    Ok(Some(value))
}
