//! The closed set of field types and the table describing how each one is
//! validated, stored and projected.
//!
//! Every component that needs to branch on a field's type looks up its
//! [`FieldTypeSpec`] here instead of matching on the tag itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

pub const SHORT_ANSWER_MAX_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    ShortAnswer,
    LongAnswer,
    RadioButton,
    MultipleChoice,
    Checkbox,
    Dropdown,
    Date,
    FileUpload,
    UpiPayment,
}

/// What a submitted value must look like for a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// A single choice id owned by the field.
    SingleChoice,
    /// A choice id or a list of choice ids owned by the field.
    ChoiceList,
    Boolean,
    /// A date string in one of the accepted formats.
    Date,
    /// Inline text, optionally bounded in characters.
    Text { max_chars: Option<usize> },
    /// An uploaded file, never inline text.
    Upload,
}

/// Auxiliary schema data a field of this type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxSchema {
    None,
    Choices,
    Payment,
}

/// Storage shape of an answer. Each shape has its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerShape {
    ShortText,
    LongText,
    Choice,
    CheckBox,
    Date,
    File,
    PaymentProof,
}

impl AnswerShape {
    pub const ALL: [AnswerShape; 7] = [
        AnswerShape::ShortText,
        AnswerShape::LongText,
        AnswerShape::Choice,
        AnswerShape::CheckBox,
        AnswerShape::Date,
        AnswerShape::File,
        AnswerShape::PaymentProof,
    ];
}

#[derive(Debug)]
pub struct FieldTypeSpec {
    pub field_type: FieldType,
    pub tag: &'static str,
    pub accepts: ValueShape,
    pub aux: AuxSchema,
    pub answer: AnswerShape,
    /// Whether one (response, field) pair may hold several answer rows.
    pub multi_valued: bool,
    /// Whether a required field of this type must appear in a submission.
    pub enforces_required: bool,
}

// Indexed by `FieldType as usize`.
static REGISTRY: [FieldTypeSpec; 9] = [
    FieldTypeSpec {
        field_type: FieldType::ShortAnswer,
        tag: "short_answer",
        accepts: ValueShape::Text {
            max_chars: Some(SHORT_ANSWER_MAX_CHARS),
        },
        aux: AuxSchema::None,
        answer: AnswerShape::ShortText,
        multi_valued: false,
        enforces_required: true,
    },
    FieldTypeSpec {
        field_type: FieldType::LongAnswer,
        tag: "long_answer",
        accepts: ValueShape::Text { max_chars: None },
        aux: AuxSchema::None,
        answer: AnswerShape::LongText,
        multi_valued: false,
        enforces_required: true,
    },
    FieldTypeSpec {
        field_type: FieldType::RadioButton,
        tag: "radio_button",
        accepts: ValueShape::SingleChoice,
        aux: AuxSchema::Choices,
        answer: AnswerShape::Choice,
        multi_valued: false,
        enforces_required: true,
    },
    FieldTypeSpec {
        field_type: FieldType::MultipleChoice,
        tag: "multiple_choice",
        accepts: ValueShape::ChoiceList,
        aux: AuxSchema::Choices,
        answer: AnswerShape::Choice,
        multi_valued: true,
        enforces_required: true,
    },
    FieldTypeSpec {
        field_type: FieldType::Checkbox,
        tag: "checkbox",
        accepts: ValueShape::Boolean,
        aux: AuxSchema::None,
        answer: AnswerShape::CheckBox,
        multi_valued: false,
        enforces_required: true,
    },
    FieldTypeSpec {
        field_type: FieldType::Dropdown,
        tag: "dropdown",
        accepts: ValueShape::SingleChoice,
        aux: AuxSchema::Choices,
        answer: AnswerShape::Choice,
        multi_valued: false,
        enforces_required: true,
    },
    FieldTypeSpec {
        field_type: FieldType::Date,
        tag: "date",
        accepts: ValueShape::Date,
        aux: AuxSchema::None,
        answer: AnswerShape::Date,
        multi_valued: false,
        enforces_required: true,
    },
    FieldTypeSpec {
        field_type: FieldType::FileUpload,
        tag: "file_upload",
        accepts: ValueShape::Upload,
        aux: AuxSchema::None,
        answer: AnswerShape::File,
        multi_valued: false,
        enforces_required: true,
    },
    FieldTypeSpec {
        field_type: FieldType::UpiPayment,
        tag: "upi_payment",
        accepts: ValueShape::Upload,
        aux: AuxSchema::Payment,
        answer: AnswerShape::PaymentProof,
        multi_valued: false,
        enforces_required: true,
    },
];

impl FieldType {
    pub const ALL: [FieldType; 9] = [
        FieldType::ShortAnswer,
        FieldType::LongAnswer,
        FieldType::RadioButton,
        FieldType::MultipleChoice,
        FieldType::Checkbox,
        FieldType::Dropdown,
        FieldType::Date,
        FieldType::FileUpload,
        FieldType::UpiPayment,
    ];

    pub fn spec(self) -> &'static FieldTypeSpec {
        &REGISTRY[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.spec().tag
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        REGISTRY
            .iter()
            .find(|spec| spec.tag == s)
            .map(|spec| spec.field_type)
            .ok_or_else(|| CoreError::UnknownFieldType(s.to_string()))
    }

    pub fn has_choices(self) -> bool {
        self.spec().aux == AuxSchema::Choices
    }

    pub fn has_payment(self) -> bool {
        self.spec().aux == AuxSchema::Payment
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
