use serde_json::{Map, Value, json};

use formstack_core::ids::*;
use formstack_storage::{
    ChoiceRecord, FieldRecord, FormRecord, PaymentConfig, Storage, StorageError,
};

/// One field of a form together with its auxiliary schema data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub field: FieldRecord,
    pub choices: Vec<ChoiceRecord>,
    pub payment: Option<PaymentConfig>,
}

impl FieldSchema {
    pub fn choice(&self, choice_id: ChoiceId) -> Option<&ChoiceRecord> {
        self.choices.iter().find(|c| c.choice_id == choice_id)
    }
}

/// A form's live schema, read fresh for every operation that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSchema {
    pub form: FormRecord,
    pub fields: Vec<FieldSchema>,
}

impl FormSchema {
    pub fn load(storage: &impl Storage, form: FormRecord) -> Result<Self, StorageError> {
        let mut fields = Vec::new();
        for field in storage.get_fields(form.form_id)? {
            let choices = if field.field_type.has_choices() {
                storage.get_choices(field.field_id)?
            } else {
                Vec::new()
            };
            let payment = if field.field_type.has_payment() {
                storage
                    .get_payment_request(field.field_id)?
                    .map(|record| record.config)
            } else {
                None
            };
            fields.push(FieldSchema {
                field,
                choices,
                payment,
            });
        }
        Ok(Self { form, fields })
    }

    pub fn field(&self, field_id: FieldId) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.field.field_id == field_id)
    }

    /// Client-facing rendering. The owner is left out.
    pub fn to_json(&self) -> Value {
        let fields: Vec<Value> = self.fields.iter().map(field_json).collect();
        json!({
            "id": self.form.form_id.to_string(),
            "title": self.form.title,
            "description": self.form.description,
            "form_fields": fields,
        })
    }
}

fn field_json(schema: &FieldSchema) -> Value {
    let field = &schema.field;
    let mut obj = Map::new();
    obj.insert("id".into(), json!(field.field_id.to_string()));
    obj.insert("type".into(), json!(field.field_type));
    obj.insert("label".into(), json!(field.label));
    obj.insert("is_required".into(), json!(field.required));
    obj.insert("order".into(), json!(field.order));
    if field.field_type.has_choices() {
        let choices: Vec<Value> = schema
            .choices
            .iter()
            .map(|c| json!({ "id": c.choice_id.to_string(), "text": c.text }))
            .collect();
        obj.insert("choices".into(), Value::Array(choices));
    }
    if field.field_type.has_payment() {
        let (upi_id, amount, qr_code) = match &schema.payment {
            Some(p) => (
                json!(p.handle),
                json!(p.amount),
                p.qr_code
                    .as_ref()
                    .map_or(Value::Null, |r| json!(r.as_str())),
            ),
            None => (Value::Null, json!(0), Value::Null),
        };
        obj.insert("upi_id".into(), upi_id);
        obj.insert("amount".into(), amount);
        obj.insert("qr_code".into(), qr_code);
    }
    Value::Object(obj)
}
