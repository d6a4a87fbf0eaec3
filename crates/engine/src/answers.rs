//! Routes validated values to the answer shape their field type stores.

use formstack_core::{AnswerShape, AnswerValue};
use formstack_storage::NewAnswer;
use tracing::debug;

use crate::content::ContentStore;
use crate::error::EngineError;
use crate::validator::{CheckedInput, CheckedValue};

/// Turn validated values into answer rows. Uploads are written to the
/// content store here, before any database write happens.
pub fn build_answers(
    checked: Vec<CheckedValue>,
    content: &mut dyn ContentStore,
) -> Result<Vec<NewAnswer>, EngineError> {
    let mut answers = Vec::with_capacity(checked.len());
    for CheckedValue { field, input } in checked {
        let shape = field.field_type.spec().answer;
        let values = match (shape, input) {
            (AnswerShape::ShortText, CheckedInput::Text(text)) => vec![AnswerValue::ShortText(text)],
            (AnswerShape::LongText, CheckedInput::Text(text)) => vec![AnswerValue::LongText(text)],
            (AnswerShape::Choice, CheckedInput::Choices(texts)) => {
                texts.into_iter().map(AnswerValue::Choice).collect()
            }
            (AnswerShape::CheckBox, CheckedInput::Boolean(b)) => vec![AnswerValue::CheckBox(b)],
            (AnswerShape::Date, CheckedInput::Date(date)) => vec![AnswerValue::Date(date)],
            (AnswerShape::File, CheckedInput::Upload(upload)) => {
                let reference = content.put(&upload)?;
                debug!(field = %field.field_id, %reference, "stored uploaded file");
                vec![AnswerValue::File(reference)]
            }
            (AnswerShape::PaymentProof, CheckedInput::Upload(upload)) => {
                let reference = content.put(&upload)?;
                debug!(field = %field.field_id, %reference, "stored payment proof");
                vec![AnswerValue::PaymentProof(reference)]
            }
            (shape, input) => {
                return Err(EngineError::Consistency(format!(
                    "field {} of type {} cannot store {input:?} as {shape:?}",
                    field.field_id, field.field_type
                )));
            }
        };
        answers.extend(values.into_iter().map(|value| NewAnswer {
            field_id: field.field_id,
            value,
        }));
    }
    Ok(answers)
}
