use formstack_core::{ContentRef, FieldType, SubmissionPayload, SubmittedValue, Upload, ids::*};
use formstack_engine::{Engine, EngineConfig, EngineError, Submission};
use formstack_storage::{FieldRecord, NewField, PaymentConfig, Storage};
use tempfile::TempDir;

use crate::init_tracing;

/// An engine plus a default owner, for tests that drive the public API.
pub struct TestApp {
    pub engine: Engine,
    pub owner: OwnerId,
    // Keeps a file-backed database alive for the fixture's lifetime.
    tempdir: Option<TempDir>,
}

impl TestApp {
    pub fn new() -> Result<Self, EngineError> {
        init_tracing();
        Ok(Self {
            engine: Engine::in_memory()?,
            owner: OwnerId::new("owner@example.com"),
            tempdir: None,
        })
    }

    /// Database and uploads under a fresh temporary directory.
    pub fn file_backed() -> Result<Self, Box<dyn std::error::Error>> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let config = EngineConfig::from_toml_str(&format!(
            "[storage]\npath = {:?}\n\n[content]\ndir = {:?}\n",
            dir.path().join("forms.db"),
            dir.path().join("content"),
        ))?;
        Ok(Self {
            engine: Engine::from_config(&config)?,
            owner: OwnerId::new("owner@example.com"),
            tempdir: Some(dir),
        })
    }

    pub fn dir(&self) -> Option<&std::path::Path> {
        self.tempdir.as_ref().map(TempDir::path)
    }

    /// Store a stand-in QR code image.
    pub fn qr_code(&mut self, label: &str) -> Result<ContentRef, EngineError> {
        self.engine
            .store_content(&Upload::new(format!("{label}.png"), label.as_bytes().to_vec()))
    }

    pub fn form(&mut self, title: &str) -> Result<FormId, EngineError> {
        Ok(self.engine.create_form(&self.owner, Some(title), None)?.form_id)
    }

    pub fn add(&mut self, form_id: FormId, field: FieldBuilder) -> Result<FieldRecord, EngineError> {
        self.engine.add_field(&self.owner, form_id, &field.build())
    }

    /// Field orders of a form, sorted.
    pub fn orders(&self, form_id: FormId) -> Result<Vec<u32>, EngineError> {
        let mut orders: Vec<u32> = self
            .engine
            .storage()
            .get_fields(form_id)?
            .iter()
            .map(|f| f.order)
            .collect();
        orders.sort_unstable();
        Ok(orders)
    }

    /// Field labels in field order.
    pub fn labels(&self, form_id: FormId) -> Result<Vec<String>, EngineError> {
        Ok(self
            .engine
            .storage()
            .get_fields(form_id)?
            .into_iter()
            .map(|f| f.label)
            .collect())
    }

    pub fn choice_id(&self, field_id: FieldId, text: &str) -> Result<ChoiceId, EngineError> {
        self.engine
            .storage()
            .get_choices(field_id)?
            .into_iter()
            .find(|c| c.text == text)
            .map(|c| c.choice_id)
            .ok_or_else(|| EngineError::Consistency(format!("no choice {text:?} on {field_id}")))
    }

    pub fn submit(
        &mut self,
        form_id: FormId,
        values: Vec<(FieldId, SubmittedValue)>,
    ) -> Result<Submission, EngineError> {
        let payload = values
            .into_iter()
            .fold(SubmissionPayload::new(form_id.to_string()), |p, (id, v)| p.with_value(id, v));
        self.engine.submit(payload)
    }
}

/// Builder over [`NewField`].
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    field: NewField,
}

impl FieldBuilder {
    pub fn new(field_type: FieldType, label: &str) -> Self {
        Self {
            field: NewField::new(field_type, label),
        }
    }

    pub fn required(mut self) -> Self {
        self.field.required = true;
        self
    }

    pub fn at(mut self, order: u32) -> Self {
        self.field.order = Some(order);
        self
    }

    pub fn choices(mut self, texts: &[&str]) -> Self {
        self.field.choices = texts.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn payment(mut self, handle: &str, amount: i64, qr_code: ContentRef) -> Self {
        self.field.payment = Some(PaymentConfig {
            handle: handle.into(),
            amount,
            qr_code: Some(qr_code),
        });
        self
    }

    pub fn build(self) -> NewField {
        self.field
    }
}
