//! Schema validation of a submission against a form's live field set.
//!
//! Validation collects every violation instead of stopping at the first one.
//! Violations come out in a fixed order: missing required fields, then
//! per-field problems in field order, then keys that name no field.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use formstack_core::{
    SubmittedValue, Upload, ValidationErrors, ValueShape, Violation, date::parse_date, ids::*,
};
use formstack_storage::FieldRecord;

use crate::schema::{FieldSchema, FormSchema};

/// A submitted value that passed validation, reduced to what the answer
/// store needs.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckedInput {
    Text(String),
    /// Display texts of the selected choices, in submission order.
    Choices(Vec<String>),
    Boolean(bool),
    Date(NaiveDate),
    Upload(Upload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckedValue {
    pub field: FieldRecord,
    pub input: CheckedInput,
}

pub fn validate(
    schema: &FormSchema,
    submitted: BTreeMap<String, SubmittedValue>,
) -> Result<Vec<CheckedValue>, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut by_field: HashMap<FieldId, SubmittedValue> = HashMap::new();
    let mut unknown = Vec::new();

    for (key, value) in submitted {
        match key.trim().parse::<FieldId>() {
            Ok(field_id) if schema.field(field_id).is_some() => {
                by_field.insert(field_id, value);
            }
            _ => unknown.push(key),
        }
    }

    for field in &schema.fields {
        let spec = field.field.field_type.spec();
        if field.field.required && spec.enforces_required && !by_field.contains_key(&field.field.field_id) {
            errors.push(Violation::MissingRequiredField {
                field_id: field.field.field_id,
                label: field.field.label.clone(),
            });
        }
    }

    let mut checked = Vec::with_capacity(by_field.len());
    for field in &schema.fields {
        let Some(value) = by_field.remove(&field.field.field_id) else {
            continue;
        };
        match check_value(field, value) {
            Ok(input) => checked.push(CheckedValue {
                field: field.field.clone(),
                input,
            }),
            Err(violations) => {
                for v in violations {
                    errors.push(v);
                }
            }
        }
    }

    for key in unknown {
        errors.push(Violation::UnknownField { field_id: key });
    }

    if errors.is_empty() {
        Ok(checked)
    } else {
        Err(errors)
    }
}

fn check_value(schema: &FieldSchema, value: SubmittedValue) -> Result<CheckedInput, Vec<Violation>> {
    let field = &schema.field;
    let accepts = field.field_type.spec().accepts;
    let got = value.kind();
    let type_mismatch = |expected: &'static str| {
        debug!(field = %field.field_id, got, expected, "submitted value has wrong type");
        vec![Violation::TypeMismatch {
            field_id: field.field_id,
            label: field.label.clone(),
            expected,
        }]
    };

    if matches!(value, SubmittedValue::Json(Value::Null)) {
        return Err(type_mismatch(expected(accepts)));
    }

    match (accepts, value) {
        (ValueShape::SingleChoice, SubmittedValue::Json(Value::String(id))) => {
            resolve_choice(schema, &id).map(|text| CheckedInput::Choices(vec![text])).map_err(|v| vec![v])
        }
        (ValueShape::SingleChoice, other) => Err(vec![invalid_choice(schema, describe(&other))]),

        (ValueShape::ChoiceList, SubmittedValue::Json(Value::String(id))) => {
            resolve_choice(schema, &id).map(|text| CheckedInput::Choices(vec![text])).map_err(|v| vec![v])
        }
        (ValueShape::ChoiceList, SubmittedValue::Json(Value::Array(items))) => {
            let mut texts = Vec::with_capacity(items.len());
            let mut violations = Vec::new();
            for item in items {
                let resolved = match &item {
                    Value::String(id) => resolve_choice(schema, id),
                    other => Err(invalid_choice(schema, other.to_string())),
                };
                match resolved {
                    Ok(text) => texts.push(text),
                    Err(v) => violations.push(v),
                }
            }
            if violations.is_empty() {
                Ok(CheckedInput::Choices(texts))
            } else {
                Err(violations)
            }
        }
        (ValueShape::ChoiceList, other) => Err(vec![invalid_choice(schema, describe(&other))]),

        (ValueShape::Boolean, SubmittedValue::Json(Value::Bool(b))) => Ok(CheckedInput::Boolean(b)),
        (ValueShape::Boolean, _) => Err(type_mismatch(expected(accepts))),

        (ValueShape::Date, SubmittedValue::Json(Value::String(s))) => match parse_date(&s) {
            Some(date) => Ok(CheckedInput::Date(date)),
            None => Err(vec![Violation::InvalidDateFormat {
                field_id: field.field_id,
                label: field.label.clone(),
                value: s,
            }]),
        },
        (ValueShape::Date, _) => Err(type_mismatch(expected(accepts))),

        (ValueShape::Text { max_chars }, SubmittedValue::Json(Value::String(s))) => match max_chars {
            Some(max) if s.chars().count() > max => Err(vec![Violation::TextTooLong {
                field_id: field.field_id,
                label: field.label.clone(),
                max_chars: max,
            }]),
            _ => Ok(CheckedInput::Text(s)),
        },
        (ValueShape::Text { .. }, _) => Err(type_mismatch(expected(accepts))),

        (ValueShape::Upload, SubmittedValue::Upload(upload)) => Ok(CheckedInput::Upload(upload)),
        (ValueShape::Upload, _) => Err(type_mismatch(expected(accepts))),
    }
}

fn expected(shape: ValueShape) -> &'static str {
    match shape {
        ValueShape::SingleChoice => "a choice id",
        ValueShape::ChoiceList => "a choice id or a list of choice ids",
        ValueShape::Boolean => "a boolean",
        ValueShape::Date => "a date string",
        ValueShape::Text { .. } => "text",
        ValueShape::Upload => "an uploaded file",
    }
}

fn resolve_choice(schema: &FieldSchema, id: &str) -> Result<String, Violation> {
    id.trim()
        .parse::<ChoiceId>()
        .ok()
        .and_then(|choice_id| schema.choice(choice_id))
        .map(|choice| choice.text.clone())
        .ok_or_else(|| invalid_choice(schema, id.to_string()))
}

fn invalid_choice(schema: &FieldSchema, choice: String) -> Violation {
    Violation::InvalidChoice {
        field_id: schema.field.field_id,
        label: schema.field.label.clone(),
        choice,
    }
}

fn describe(value: &SubmittedValue) -> String {
    match value {
        SubmittedValue::Json(v) => v.to_string(),
        SubmittedValue::Upload(upload) => format!("upload {:?}", upload.file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstack_core::FieldType;
    use formstack_storage::{ChoiceRecord, FormRecord};

    fn field(field_type: FieldType, label: &str, required: bool, order: u32) -> FieldSchema {
        FieldSchema {
            field: FieldRecord {
                field_id: FieldId::new(),
                form_id: FormId::new(),
                field_type,
                label: label.into(),
                required,
                order,
            },
            choices: Vec::new(),
            payment: None,
        }
    }

    fn with_choices(mut schema: FieldSchema, texts: &[&str]) -> FieldSchema {
        schema.choices = texts
            .iter()
            .map(|t| ChoiceRecord {
                choice_id: ChoiceId::new(),
                field_id: schema.field.field_id,
                text: t.to_string(),
            })
            .collect();
        schema
    }

    fn form(fields: Vec<FieldSchema>) -> FormSchema {
        FormSchema {
            form: FormRecord {
                form_id: FormId::new(),
                owner: OwnerId::new("owner"),
                title: "t".into(),
                description: None,
                created_at: 0,
            },
            fields,
        }
    }

    fn submit(pairs: Vec<(String, SubmittedValue)>) -> BTreeMap<String, SubmittedValue> {
        pairs.into_iter().collect()
    }

    #[test]
    fn missing_required_field_names_label() {
        let schema = form(vec![field(FieldType::ShortAnswer, "Name", true, 0)]);
        let errors = validate(&schema, BTreeMap::new()).unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors.violations()[0] {
            Violation::MissingRequiredField { label, .. } => assert_eq!(label, "Name"),
            other => panic!("expected MissingRequiredField, got {other:?}"),
        }
    }

    #[test]
    fn optional_fields_may_be_skipped() {
        let schema = form(vec![field(FieldType::LongAnswer, "Notes", false, 0)]);
        assert!(validate(&schema, BTreeMap::new()).unwrap().is_empty());
    }

    #[test]
    fn unknown_and_malformed_keys_reported() {
        let schema = form(vec![field(FieldType::Checkbox, "Agree", false, 0)]);
        let stranger = FieldId::new().to_string();
        let errors = validate(
            &schema,
            submit(vec![
                (stranger.clone(), SubmittedValue::boolean(true)),
                ("garbage".into(), SubmittedValue::boolean(true)),
            ]),
        )
        .unwrap_err();
        let keys: Vec<_> = errors.iter().map(Violation::field_key).collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&stranger));
        assert!(keys.contains(&"garbage".to_string()));
        assert!(errors.iter().all(|v| matches!(v, Violation::UnknownField { .. })));
    }

    #[test]
    fn single_choice_resolves_display_text() {
        let radio = with_choices(field(FieldType::RadioButton, "Coffee?", true, 0), &["Yes", "No"]);
        let yes = radio.choices[0].choice_id.to_string();
        let id = radio.field.field_id.to_string();
        let schema = form(vec![radio]);
        let checked = validate(&schema, submit(vec![(id, SubmittedValue::text(yes))])).unwrap();
        assert_eq!(checked[0].input, CheckedInput::Choices(vec!["Yes".into()]));
    }

    #[test]
    fn choice_of_another_field_rejected() {
        let a = with_choices(field(FieldType::Dropdown, "A", false, 0), &["x"]);
        let b = with_choices(field(FieldType::Dropdown, "B", false, 1), &["y"]);
        let foreign = b.choices[0].choice_id.to_string();
        let a_id = a.field.field_id.to_string();
        let schema = form(vec![a, b]);
        let errors = validate(&schema, submit(vec![(a_id, SubmittedValue::text(foreign))])).unwrap_err();
        assert!(matches!(errors.violations()[0], Violation::InvalidChoice { .. }));
    }

    #[test]
    fn single_choice_rejects_list() {
        let radio = with_choices(field(FieldType::RadioButton, "R", false, 0), &["x"]);
        let choice = radio.choices[0].choice_id.to_string();
        let id = radio.field.field_id.to_string();
        let schema = form(vec![radio]);
        let errors = validate(&schema, submit(vec![(id, SubmittedValue::list([choice]))])).unwrap_err();
        assert!(matches!(errors.violations()[0], Violation::InvalidChoice { .. }));
    }

    #[test]
    fn multiple_choice_accepts_string_or_list() {
        let multi = with_choices(field(FieldType::MultipleChoice, "Pick", false, 0), &["a", "b", "c"]);
        let ids: Vec<String> = multi.choices.iter().map(|c| c.choice_id.to_string()).collect();
        let field_id = multi.field.field_id.to_string();
        let schema = form(vec![multi]);

        let checked = validate(
            &schema,
            submit(vec![(field_id.clone(), SubmittedValue::list([ids[2].clone(), ids[0].clone()]))]),
        )
        .unwrap();
        assert_eq!(checked[0].input, CheckedInput::Choices(vec!["c".into(), "a".into()]));

        let checked = validate(&schema, submit(vec![(field_id.clone(), SubmittedValue::text(ids[1].clone()))])).unwrap();
        assert_eq!(checked[0].input, CheckedInput::Choices(vec!["b".into()]));

        let errors = validate(
            &schema,
            submit(vec![(field_id, SubmittedValue::list([ids[0].clone(), "nope".to_string()]))]),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors.violations()[0] {
            Violation::InvalidChoice { choice, .. } => assert_eq!(choice, "nope"),
            other => panic!("expected InvalidChoice, got {other:?}"),
        }
    }

    #[test]
    fn checkbox_requires_boolean() {
        let cb = field(FieldType::Checkbox, "Agree", false, 0);
        let id = cb.field.field_id.to_string();
        let schema = form(vec![cb]);
        let errors = validate(&schema, submit(vec![(id.clone(), SubmittedValue::text("yes"))])).unwrap_err();
        assert!(matches!(errors.violations()[0], Violation::TypeMismatch { expected: "a boolean", .. }));
        let checked = validate(&schema, submit(vec![(id, SubmittedValue::boolean(false))])).unwrap();
        assert_eq!(checked[0].input, CheckedInput::Boolean(false));
    }

    #[test]
    fn date_formats() {
        let date = field(FieldType::Date, "When", false, 0);
        let id = date.field.field_id.to_string();
        let schema = form(vec![date]);
        let expected = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        for input in ["31-12-2024", "31/12/2024", "2024-12-31"] {
            let checked = validate(&schema, submit(vec![(id.clone(), SubmittedValue::text(input))])).unwrap();
            assert_eq!(checked[0].input, CheckedInput::Date(expected), "{input}");
        }
        for bad in ["2024-13-40", "31-12-24", "24-12-31", "+2024-12-31"] {
            let errors = validate(&schema, submit(vec![(id.clone(), SubmittedValue::text(bad))])).unwrap_err();
            match &errors.violations()[0] {
                Violation::InvalidDateFormat { value, .. } => assert_eq!(value, bad),
                other => panic!("expected InvalidDateFormat for {bad}, got {other:?}"),
            }
        }
    }

    #[test]
    fn short_answer_length_bounded() {
        let short = field(FieldType::ShortAnswer, "Name", false, 0);
        let long = field(FieldType::LongAnswer, "Essay", false, 1);
        let short_id = short.field.field_id.to_string();
        let long_id = long.field.field_id.to_string();
        let schema = form(vec![short, long]);
        let text = "x".repeat(256);
        let errors = validate(
            &schema,
            submit(vec![
                (short_id, SubmittedValue::text(text.clone())),
                (long_id, SubmittedValue::text(text)),
            ]),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors.violations()[0], Violation::TextTooLong { max_chars: 255, .. }));
    }

    #[test]
    fn upload_fields_reject_inline_text() {
        let file = field(FieldType::FileUpload, "CV", false, 0);
        let pay = field(FieldType::UpiPayment, "Fee", false, 1);
        let file_id = file.field.field_id.to_string();
        let pay_id = pay.field.field_id.to_string();
        let schema = form(vec![file, pay]);
        let errors = validate(
            &schema,
            submit(vec![
                (file_id.clone(), SubmittedValue::text("cv.pdf")),
                (pay_id, SubmittedValue::Upload(Upload::new("proof.png", vec![1]))),
            ]),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.violations()[0].field_key(), file_id);
    }

    #[test]
    fn null_is_type_mismatch_for_choice_fields() {
        let radio = with_choices(field(FieldType::RadioButton, "R", false, 0), &["x"]);
        let id = radio.field.field_id.to_string();
        let schema = form(vec![radio]);
        let errors = validate(&schema, submit(vec![(id, SubmittedValue::Json(Value::Null))])).unwrap_err();
        assert!(matches!(errors.violations()[0], Violation::TypeMismatch { expected: "a choice id", .. }));
    }

    #[test]
    fn violations_accumulate_in_field_order() {
        let name = field(FieldType::ShortAnswer, "Name", true, 0);
        let agree = field(FieldType::Checkbox, "Agree", false, 1);
        let when = field(FieldType::Date, "When", false, 2);
        let agree_id = agree.field.field_id.to_string();
        let when_id = when.field.field_id.to_string();
        let schema = form(vec![name, agree, when]);
        let errors = validate(
            &schema,
            submit(vec![
                (when_id, SubmittedValue::text("soon")),
                (agree_id, SubmittedValue::Json(Value::Null)),
                ("extra".into(), SubmittedValue::text("?")),
            ]),
        )
        .unwrap_err();
        let kinds: Vec<_> = errors
            .iter()
            .map(|v| match v {
                Violation::MissingRequiredField { .. } => "missing",
                Violation::TypeMismatch { .. } => "type",
                Violation::InvalidDateFormat { .. } => "date",
                Violation::UnknownField { .. } => "unknown",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, ["missing", "type", "date", "unknown"]);
    }
}
