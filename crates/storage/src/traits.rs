use formstack_core::{
    AnswerShape, AnswerValue, ContentRef, FieldType,
    ids::*,
};

use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRecord {
    pub form_id: FormId,
    pub owner: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    pub field_id: FieldId,
    pub form_id: FormId,
    pub field_type: FieldType,
    pub label: String,
    pub required: bool,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceRecord {
    pub choice_id: ChoiceId,
    pub field_id: FieldId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    pub handle: String,
    pub amount: i64,
    pub qr_code: Option<ContentRef>,
}

impl PaymentConfig {
    /// Handle, a positive amount and a QR code are all present.
    pub fn is_complete(&self) -> bool {
        !self.handle.trim().is_empty() && self.amount > 0 && self.qr_code.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequestRecord {
    pub payment_id: PaymentRequestId,
    pub field_id: FieldId,
    pub config: PaymentConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub response_id: ResponseId,
    pub form_id: FormId,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub answer_id: AnswerId,
    pub response_id: ResponseId,
    pub field_id: FieldId,
    pub value: AnswerValue,
}

/// A field to insert. `order: None` appends after the last field.
#[derive(Debug, Clone)]
pub struct NewField {
    pub field_type: FieldType,
    pub label: String,
    pub required: bool,
    pub order: Option<u32>,
    /// Stored only for choice-family types.
    pub choices: Vec<String>,
    /// Stored only for payment fields.
    pub payment: Option<PaymentConfig>,
}

impl NewField {
    pub fn new(field_type: FieldType, label: impl Into<String>) -> Self {
        Self {
            field_type,
            label: label.into(),
            required: false,
            order: None,
            choices: Vec::new(),
            payment: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PaymentEdit {
    #[default]
    Keep,
    Set(PaymentConfig),
    Clear,
}

/// Partial update of a field. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct FieldEdit {
    pub label: Option<String>,
    pub field_type: Option<FieldType>,
    pub required: Option<bool>,
    /// Replaces every existing choice when given.
    pub choices: Option<Vec<String>>,
    pub payment: PaymentEdit,
}

/// One answer row to write during a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnswer {
    pub field_id: FieldId,
    pub value: AnswerValue,
}

pub trait Storage {
    fn insert_form(&mut self, owner: &OwnerId, title: &str, description: Option<&str>)
    -> Result<FormRecord, StorageError>;

    fn get_form(&self, form_id: FormId) -> Result<Option<FormRecord>, StorageError>;

    fn get_forms_by_owner(&self, owner: &OwnerId) -> Result<Vec<FormRecord>, StorageError>;

    fn update_form(
        &mut self,
        form_id: FormId,
        title: &str,
        description: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Delete a form with its fields, choices, payment requests, responses
    /// and answers. Returns false if the form did not exist.
    fn delete_form(&mut self, form_id: FormId) -> Result<bool, StorageError>;

    /// Insert a field, shifting later fields to make room for an explicit order.
    fn insert_field(&mut self, form_id: FormId, field: &NewField)
    -> Result<FieldRecord, StorageError>;

    fn get_field(&self, field_id: FieldId) -> Result<Option<FieldRecord>, StorageError>;

    /// Fields of a form in order.
    fn get_fields(&self, form_id: FormId) -> Result<Vec<FieldRecord>, StorageError>;

    fn update_field(
        &mut self,
        form_id: FormId,
        field_id: FieldId,
        edit: &FieldEdit,
    ) -> Result<FieldRecord, StorageError>;

    fn move_field(
        &mut self,
        form_id: FormId,
        field_id: FieldId,
        new_order: u32,
    ) -> Result<FieldRecord, StorageError>;

    fn delete_field(&mut self, form_id: FormId, field_id: FieldId) -> Result<(), StorageError>;

    fn get_choices(&self, field_id: FieldId) -> Result<Vec<ChoiceRecord>, StorageError>;

    fn get_choice(&self, choice_id: ChoiceId) -> Result<Option<ChoiceRecord>, StorageError>;

    fn delete_choice(&mut self, choice_id: ChoiceId) -> Result<bool, StorageError>;

    fn get_payment_request(
        &self,
        field_id: FieldId,
    ) -> Result<Option<PaymentRequestRecord>, StorageError>;

    /// Write a response and all of its answers in one transaction under the
    /// caller's id. Nothing is left behind if any answer fails to write.
    fn insert_response(
        &mut self,
        response_id: ResponseId,
        form_id: FormId,
        answers: &[NewAnswer],
    ) -> Result<(ResponseRecord, Vec<AnswerRecord>), StorageError>;

    fn get_response(&self, response_id: ResponseId)
    -> Result<Option<ResponseRecord>, StorageError>;

    /// Responses of a form, oldest first.
    fn get_responses_for_form(&self, form_id: FormId)
    -> Result<Vec<ResponseRecord>, StorageError>;

    /// Answers stored for one (response, field) pair in the given shape's table.
    fn get_answers(
        &self,
        response_id: ResponseId,
        field_id: FieldId,
        shape: AnswerShape,
    ) -> Result<Vec<AnswerRecord>, StorageError>;

    fn count_responses(&self, form_id: FormId) -> Result<u64, StorageError>;
}
