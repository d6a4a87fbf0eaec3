use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::content::ContentRef;
use crate::field_type::AnswerShape;

/// A single stored answer value, one variant per answer table.
///
/// Choice answers hold the choice's display text at submission time, not the
/// choice id, so later edits to the choice leave the answer intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerValue {
    ShortText(String),
    LongText(String),
    Choice(String),
    CheckBox(bool),
    Date(NaiveDate),
    File(ContentRef),
    PaymentProof(ContentRef),
}

impl AnswerValue {
    pub fn shape(&self) -> AnswerShape {
        match self {
            AnswerValue::ShortText(_) => AnswerShape::ShortText,
            AnswerValue::LongText(_) => AnswerShape::LongText,
            AnswerValue::Choice(_) => AnswerShape::Choice,
            AnswerValue::CheckBox(_) => AnswerShape::CheckBox,
            AnswerValue::Date(_) => AnswerShape::Date,
            AnswerValue::File(_) => AnswerShape::File,
            AnswerValue::PaymentProof(_) => AnswerShape::PaymentProof,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::ShortText(s) | AnswerValue::LongText(s) | AnswerValue::Choice(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AnswerValue::CheckBox(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            AnswerValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_content_ref(&self) -> Option<&ContentRef> {
        match self {
            AnswerValue::File(r) | AnswerValue::PaymentProof(r) => Some(r),
            _ => None,
        }
    }
}
