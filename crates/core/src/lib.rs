pub mod answer;
pub mod content;
pub mod date;
pub mod error;
pub mod field_type;
pub mod ids;
pub mod payload;
pub mod violation;

pub use answer::AnswerValue;
pub use content::{ContentRef, Upload};
pub use error::CoreError;
pub use field_type::{
    AnswerShape, AuxSchema, FieldType, FieldTypeSpec, SHORT_ANSWER_MAX_CHARS, ValueShape,
};
pub use ids::*;
pub use payload::{FormPart, SubmissionPayload, SubmittedValue};
pub use violation::{ValidationErrors, Violation};
