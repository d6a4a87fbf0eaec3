//! Submission payloads: `{ form: <form id>, form_fields: { <field id>: <value> } }`.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::content::Upload;
use crate::error::CoreError;

const FORM_FIELDS_PREFIX: &str = "form_fields[";

/// A value submitted for one field: inline JSON, or an uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmittedValue {
    Json(Value),
    Upload(Upload),
}

impl SubmittedValue {
    pub fn text(s: impl Into<String>) -> Self {
        SubmittedValue::Json(Value::String(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        SubmittedValue::Json(Value::Bool(b))
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SubmittedValue::Json(Value::Array(
            items.into_iter().map(|s| Value::String(s.into())).collect(),
        ))
    }

    /// Human description of the value's kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmittedValue::Upload(_) => "upload",
            SubmittedValue::Json(Value::Null) => "null",
            SubmittedValue::Json(Value::Bool(_)) => "boolean",
            SubmittedValue::Json(Value::Number(_)) => "number",
            SubmittedValue::Json(Value::String(_)) => "string",
            SubmittedValue::Json(Value::Array(_)) => "list",
            SubmittedValue::Json(Value::Object(_)) => "object",
        }
    }
}

impl From<Upload> for SubmittedValue {
    fn from(upload: Upload) -> Self {
        SubmittedValue::Upload(upload)
    }
}

/// One part of a multipart form body.
#[derive(Debug, Clone)]
pub enum FormPart {
    Text(String),
    File(Upload),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionPayload {
    /// Form id exactly as submitted; resolved by the submission pipeline.
    pub form: String,
    /// Values keyed by field id exactly as submitted.
    pub form_fields: BTreeMap<String, SubmittedValue>,
}

impl SubmissionPayload {
    pub fn new(form: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            form_fields: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, field_id: impl ToString, value: SubmittedValue) -> Self {
        self.form_fields.insert(field_id.to_string(), value);
        self
    }

    /// Parse a JSON body. Uploads cannot be expressed in JSON, so every value
    /// comes through as [`SubmittedValue::Json`].
    pub fn from_json(body: &Value) -> Result<Self, CoreError> {
        let obj = body
            .as_object()
            .ok_or_else(|| CoreError::InvalidData("submission must be a JSON object".into()))?;
        let form = obj
            .get("form")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::InvalidData("missing form id".into()))?
            .to_string();
        let fields = match obj.get("form_fields") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), SubmittedValue::Json(v.clone())))
                .collect(),
            Some(_) => {
                return Err(CoreError::InvalidData("form_fields must be an object".into()));
            }
            None => return Err(CoreError::InvalidData("missing form_fields".into())),
        };
        Ok(Self {
            form,
            form_fields: fields,
        })
    }

    pub fn from_json_str(body: &str) -> Result<Self, CoreError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| CoreError::Serialization(e.to_string()))?;
        Self::from_json(&value)
    }

    /// Build a payload from flattened multipart parts keyed `form` and
    /// `form_fields[<field id>]`. Other keys are ignored.
    ///
    /// Text parts are coerced: `true`/`false` in any case become booleans,
    /// text wrapped in `[` and `]` that parses as JSON becomes a list, and
    /// anything else stays text.
    pub fn from_form_parts<I>(parts: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (String, FormPart)>,
    {
        let mut form = None;
        let mut fields = BTreeMap::new();
        for (key, part) in parts {
            if key == "form" {
                match part {
                    FormPart::Text(id) => form = Some(id),
                    FormPart::File(_) => {
                        return Err(CoreError::InvalidData("form id must be text".into()));
                    }
                }
                continue;
            }
            let Some(field_id) = key
                .strip_prefix(FORM_FIELDS_PREFIX)
                .and_then(|rest| rest.strip_suffix(']'))
            else {
                continue;
            };
            let value = match part {
                FormPart::File(upload) => SubmittedValue::Upload(upload),
                FormPart::Text(text) => SubmittedValue::Json(coerce_text(text)),
            };
            fields.insert(field_id.to_string(), value);
        }
        let form = form.ok_or_else(|| CoreError::InvalidData("missing form id".into()))?;
        Ok(Self {
            form,
            form_fields: fields,
        })
    }
}

fn coerce_text(text: String) -> Value {
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if text.starts_with('[')
        && text.ends_with(']')
        && let Ok(list @ Value::Array(_)) = serde_json::from_str::<Value>(&text)
    {
        return list;
    }
    Value::String(text)
}
