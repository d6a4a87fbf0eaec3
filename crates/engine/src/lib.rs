pub mod answers;
pub mod config;
pub mod content;
pub mod error;
pub mod projector;
pub mod schema;
pub mod validator;

pub use config::{ContentConfig, EngineConfig};
pub use content::{ContentError, ContentStore, DirContentStore, MemoryContentStore};
pub use error::{EngineError, PublicError, Subject};
pub use projector::{ProjectedField, ProjectedValue, ResponseView};
pub use schema::{FieldSchema, FormSchema};

use serde_json::Value;
use tracing::{debug, info, warn};

use formstack_core::{ContentRef, SubmissionPayload, Upload, ids::*};
use formstack_storage::{
    AnswerRecord, FieldEdit, FieldRecord, FormRecord, NewField, PaymentEdit, ResponseRecord,
    SqliteStorage, Storage,
};

pub const DEFAULT_FORM_TITLE: &str = "Untitled-form";

/// Partial update of a form. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct FormEdit {
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

/// An accepted submission: the response row and every answer written for it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub response: ResponseRecord,
    pub answers: Vec<AnswerRecord>,
}

pub struct Engine {
    storage: SqliteStorage,
    content: Box<dyn ContentStore>,
}

impl Engine {
    pub fn new(storage: SqliteStorage, content: Box<dyn ContentStore>) -> Self {
        Self { storage, content }
    }

    /// In-memory database and content store.
    pub fn in_memory() -> Result<Self, EngineError> {
        let storage = SqliteStorage::open_in_memory()?;
        Ok(Self::new(storage, Box::new(MemoryContentStore::new())))
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let storage = SqliteStorage::open_with(&config.storage)?;
        let content: Box<dyn ContentStore> = match &config.content.dir {
            Some(dir) => Box::new(DirContentStore::open(dir)?),
            None => Box::new(MemoryContentStore::new()),
        };
        Ok(Self::new(storage, content))
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    pub fn content(&self) -> &dyn ContentStore {
        self.content.as_ref()
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Load a form the owner is allowed to manage. A form owned by someone
    /// else is reported as Unauthorized, which callers see as not-found.
    fn owned_form(&self, owner: &OwnerId, form_id: FormId) -> Result<FormRecord, EngineError> {
        let form = self
            .storage
            .get_form(form_id)?
            .ok_or(EngineError::NotFound(Subject::Form(form_id)))?;
        if form.owner != *owner {
            warn!(%owner, form = %form_id, "form ownership check failed");
            return Err(EngineError::Unauthorized(Subject::Form(form_id)));
        }
        Ok(form)
    }

    /// Load a field of an owned form.
    fn owned_field(
        &self,
        owner: &OwnerId,
        form_id: FormId,
        field_id: FieldId,
    ) -> Result<FieldRecord, EngineError> {
        self.owned_form(owner, form_id)?;
        let field = self
            .storage
            .get_field(field_id)?
            .ok_or(EngineError::NotFound(Subject::Field(field_id)))?;
        self.check_field_parent(owner, form_id, &field)?;
        Ok(field)
    }

    fn check_field_parent(
        &self,
        owner: &OwnerId,
        form_id: FormId,
        field: &FieldRecord,
    ) -> Result<(), EngineError> {
        if field.form_id == form_id {
            return Ok(());
        }
        let parent = self.storage.get_form(field.form_id)?;
        match parent {
            Some(parent) if parent.owner != *owner => {
                warn!(%owner, field = %field.field_id, "field ownership check failed");
                Err(EngineError::Unauthorized(Subject::Field(field.field_id)))
            }
            _ => Err(EngineError::Consistency(format!(
                "field {} belongs to form {}, not {form_id}",
                field.field_id, field.form_id
            ))),
        }
    }

    // ========================================================================
    // Forms
    // ========================================================================

    /// Create a form. A missing or blank title becomes "Untitled-form".
    pub fn create_form(
        &mut self,
        owner: &OwnerId,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<FormRecord, EngineError> {
        let title = match title.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_FORM_TITLE,
        };
        let form = self.storage.insert_form(owner, title, description)?;
        debug!(%owner, form = %form.form_id, "created form");
        Ok(form)
    }

    pub fn list_forms(&self, owner: &OwnerId) -> Result<Vec<FormRecord>, EngineError> {
        Ok(self.storage.get_forms_by_owner(owner)?)
    }

    pub fn get_form(&self, owner: &OwnerId, form_id: FormId) -> Result<FormSchema, EngineError> {
        let form = self.owned_form(owner, form_id)?;
        Ok(FormSchema::load(&self.storage, form)?)
    }

    /// The schema a respondent sees. No ownership check.
    pub fn public_form(&self, form_id: FormId) -> Result<FormSchema, EngineError> {
        let form = self
            .storage
            .get_form(form_id)?
            .ok_or(EngineError::NotFound(Subject::Form(form_id)))?;
        Ok(FormSchema::load(&self.storage, form)?)
    }

    pub fn update_form(
        &mut self,
        owner: &OwnerId,
        form_id: FormId,
        edit: &FormEdit,
    ) -> Result<FormRecord, EngineError> {
        let form = self.owned_form(owner, form_id)?;
        let title = edit.title.as_deref().unwrap_or(form.title.as_str());
        let description = match &edit.description {
            Some(d) => d.as_deref(),
            None => form.description.as_deref(),
        };
        self.storage.update_form(form_id, title, description)?;
        debug!(form = %form_id, "updated form");
        self.storage
            .get_form(form_id)?
            .ok_or(EngineError::NotFound(Subject::Form(form_id)))
    }

    /// Delete a form with everything hanging off it, responses included.
    pub fn delete_form(&mut self, owner: &OwnerId, form_id: FormId) -> Result<(), EngineError> {
        self.owned_form(owner, form_id)?;
        self.storage.delete_form(form_id)?;
        debug!(form = %form_id, "deleted form");
        Ok(())
    }

    // ========================================================================
    // Fields
    // ========================================================================

    /// Add a field. Choices are kept only for choice types and payment
    /// details only for payment fields whose config is complete.
    pub fn add_field(
        &mut self,
        owner: &OwnerId,
        form_id: FormId,
        field: &NewField,
    ) -> Result<FieldRecord, EngineError> {
        self.owned_form(owner, form_id)?;
        let record = if field.payment.as_ref().is_some_and(|p| !p.is_complete()) {
            let mut field = field.clone();
            field.payment = None;
            self.storage.insert_field(form_id, &field)?
        } else {
            self.storage.insert_field(form_id, field)?
        };
        debug!(form = %form_id, field = %record.field_id, order = record.order, "added field");
        Ok(record)
    }

    /// Apply a partial edit. Setting an incomplete payment config removes
    /// the field's existing one.
    pub fn edit_field(
        &mut self,
        owner: &OwnerId,
        form_id: FormId,
        field_id: FieldId,
        edit: &FieldEdit,
    ) -> Result<FieldRecord, EngineError> {
        self.owned_field(owner, form_id, field_id)?;
        let record = match &edit.payment {
            PaymentEdit::Set(p) if !p.is_complete() => {
                let mut edit = edit.clone();
                edit.payment = PaymentEdit::Clear;
                self.storage.update_field(form_id, field_id, &edit)?
            }
            _ => self.storage.update_field(form_id, field_id, edit)?,
        };
        debug!(form = %form_id, field = %field_id, "edited field");
        Ok(record)
    }

    /// Move a field to `new_order`, shifting the fields in between.
    pub fn move_field(
        &mut self,
        owner: &OwnerId,
        form_id: FormId,
        field_id: FieldId,
        new_order: u32,
    ) -> Result<FieldRecord, EngineError> {
        self.owned_field(owner, form_id, field_id)?;
        let record = self.storage.move_field(form_id, field_id, new_order)?;
        debug!(form = %form_id, field = %field_id, order = new_order, "moved field");
        Ok(record)
    }

    pub fn delete_field(
        &mut self,
        owner: &OwnerId,
        form_id: FormId,
        field_id: FieldId,
    ) -> Result<(), EngineError> {
        self.owned_field(owner, form_id, field_id)?;
        self.storage.delete_field(form_id, field_id)?;
        debug!(form = %form_id, field = %field_id, "deleted field");
        Ok(())
    }

    /// Remove one choice. Answers that selected it keep their stored text.
    pub fn delete_choice(
        &mut self,
        owner: &OwnerId,
        form_id: FormId,
        choice_id: ChoiceId,
    ) -> Result<(), EngineError> {
        self.owned_form(owner, form_id)?;
        let choice = self
            .storage
            .get_choice(choice_id)?
            .ok_or(EngineError::NotFound(Subject::Choice(choice_id)))?;
        let field = self
            .storage
            .get_field(choice.field_id)?
            .ok_or(EngineError::NotFound(Subject::Choice(choice_id)))?;
        self.check_field_parent(owner, form_id, &field)?;
        self.storage.delete_choice(choice_id)?;
        debug!(field = %field.field_id, choice = %choice_id, "deleted choice");
        Ok(())
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Store a file outside of any submission, e.g. a payment QR code.
    pub fn store_content(&mut self, upload: &Upload) -> Result<ContentRef, EngineError> {
        Ok(self.content.put(upload)?)
    }

    pub fn content_url(&self, reference: &ContentRef) -> Option<String> {
        self.content.url(reference)
    }

    // ========================================================================
    // Submissions
    // ========================================================================

    /// Validate a submission against the form's current fields and store it.
    ///
    /// Uploads go to the content store first. The response row and all of its
    /// answers are then written in a single transaction; if any write fails
    /// nothing of the response remains.
    pub fn submit(&mut self, payload: SubmissionPayload) -> Result<Submission, EngineError> {
        let form_id = payload
            .form
            .trim()
            .parse::<FormId>()
            .map_err(|_| EngineError::NotFound(Subject::FormRef(payload.form.clone())))?;
        let form = self
            .storage
            .get_form(form_id)?
            .ok_or(EngineError::NotFound(Subject::Form(form_id)))?;
        let schema = FormSchema::load(&self.storage, form)?;

        let checked = validator::validate(&schema, payload.form_fields).inspect_err(|errors| {
            debug!(form = %form_id, violations = errors.len(), "submission rejected");
        })?;

        let answers = answers::build_answers(checked, self.content.as_mut())?;
        let response_id = ResponseId::new();
        let (response, answers) = self
            .storage
            .insert_response(response_id, form_id, &answers)
            .inspect_err(|e| {
                warn!(form = %form_id, response = %response_id, error = %e, "submission rolled back")
            })?;

        info!(
            form = %form_id,
            response = %response.response_id,
            answers = answers.len(),
            "submission accepted"
        );
        Ok(Submission { response, answers })
    }

    /// Submit a JSON body of the form `{ "form": .., "form_fields": {..} }`.
    pub fn submit_json(&mut self, body: &Value) -> Result<Submission, EngineError> {
        let payload = SubmissionPayload::from_json(body)?;
        self.submit(payload)
    }

    // ========================================================================
    // Responses
    // ========================================================================

    pub fn project(&self, response_id: ResponseId) -> Result<ResponseView, EngineError> {
        projector::project(&self.storage, response_id)
    }

    /// Every response of an owned form, oldest first.
    pub fn responses_for_form(
        &self,
        owner: &OwnerId,
        form_id: FormId,
    ) -> Result<Vec<ResponseView>, EngineError> {
        self.owned_form(owner, form_id)?;
        self.storage
            .get_responses_for_form(form_id)?
            .iter()
            .map(|response| projector::project_record(&self.storage, response))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstack_core::{FieldType, SubmittedValue};

    fn owner() -> OwnerId {
        OwnerId::new("alice")
    }

    #[test]
    fn blank_title_gets_default() -> Result<(), Box<dyn std::error::Error>> {
        let mut engine = Engine::in_memory()?;
        let form = engine.create_form(&owner(), Some("   "), None)?;
        assert_eq!(form.title, DEFAULT_FORM_TITLE);
        let form = engine.create_form(&owner(), Some("Survey"), None)?;
        assert_eq!(form.title, "Survey");
        Ok(())
    }

    #[test]
    fn foreign_owner_is_unauthorized_but_public_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let mut engine = Engine::in_memory()?;
        let form = engine.create_form(&owner(), None, None)?;
        let err = engine.get_form(&OwnerId::new("mallory"), form.form_id).unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));

        let missing = engine.get_form(&owner(), FormId::new()).unwrap_err();
        assert!(missing.is_not_found());
        assert_eq!(err.public(), missing.public());
        Ok(())
    }

    #[test]
    fn payment_config_kept_only_when_complete() -> Result<(), Box<dyn std::error::Error>> {
        use formstack_storage::PaymentConfig;

        let mut engine = Engine::in_memory()?;
        let form = engine.create_form(&owner(), None, None)?;
        let qr = engine.store_content(&Upload::new("qr.png", b"qr".to_vec()))?;
        let complete = PaymentConfig {
            handle: "shop@upi".into(),
            amount: 100,
            qr_code: Some(qr),
        };
        let incomplete = [
            PaymentConfig { handle: " ".into(), ..complete.clone() },
            PaymentConfig { amount: 0, ..complete.clone() },
            PaymentConfig { qr_code: None, ..complete.clone() },
        ];

        for config in &incomplete {
            let mut field = NewField::new(FieldType::UpiPayment, "Fee");
            field.payment = Some(config.clone());
            let record = engine.add_field(&owner(), form.form_id, &field)?;
            assert!(engine.storage().get_payment_request(record.field_id)?.is_none(), "{config:?}");
        }

        let mut field = NewField::new(FieldType::UpiPayment, "Fee");
        field.payment = Some(complete.clone());
        let record = engine.add_field(&owner(), form.form_id, &field)?;
        let stored = engine.storage().get_payment_request(record.field_id)?;
        assert_eq!(stored.map(|r| r.config), Some(complete));

        let edit = FieldEdit {
            payment: PaymentEdit::Set(incomplete[2].clone()),
            ..FieldEdit::default()
        };
        engine.edit_field(&owner(), form.form_id, record.field_id, &edit)?;
        assert!(engine.storage().get_payment_request(record.field_id)?.is_none());
        Ok(())
    }

    #[test]
    fn unparseable_form_id_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let mut engine = Engine::in_memory()?;
        let err = engine
            .submit(SubmissionPayload::new("not-a-form").with_value("x", SubmittedValue::text("y")))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(Subject::FormRef(_))));
        Ok(())
    }
}
