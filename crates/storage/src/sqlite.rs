use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, warn};

use formstack_core::{AnswerShape, ContentRef, FieldType, ids::*};

use crate::answers::{read_answers, record_answer};
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::ordering::FieldOrdering;
use crate::traits::*;

/// Convert Vec<u8> to fixed-size array with proper error handling.
pub(crate) fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::open_with(&StorageConfig {
            path: Some(path.into()),
            ..StorageConfig::default()
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open_with(&StorageConfig::default())
    }

    pub fn open_with(config: &StorageConfig) -> Result<Self, StorageError> {
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        crate::schema::init_schema(&conn, config.busy_timeout())?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Writers take the database write lock up front, so two mutations of the
    /// same form's fields can never interleave their order shifts.
    fn write_tx(&mut self) -> Result<Transaction<'_>, StorageError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

type RawField = (Vec<u8>, Vec<u8>, String, String, bool, i64);

const FIELD_COLUMNS: &str = "field_id, form_id, field_type, label, is_required, field_order";

fn raw_field(row: &rusqlite::Row) -> rusqlite::Result<RawField> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn field_from_raw(raw: RawField) -> Result<FieldRecord, StorageError> {
    let (field_bytes, form_bytes, field_type, label, required, order) = raw;
    Ok(FieldRecord {
        field_id: FieldId::from_bytes(to_array::<16>(field_bytes, "field_id")?),
        form_id: FormId::from_bytes(to_array::<16>(form_bytes, "form_id")?),
        field_type: FieldType::parse(&field_type)?,
        label,
        required,
        order: order as u32,
    })
}

fn read_field(conn: &Connection, field_id: FieldId) -> Result<Option<FieldRecord>, StorageError> {
    let sql = format!("SELECT {FIELD_COLUMNS} FROM fields WHERE field_id = ?1");
    let raw = conn
        .query_row(&sql, params![field_id.as_bytes().as_slice()], raw_field)
        .optional()?;
    raw.map(field_from_raw).transpose()
}

fn read_form(conn: &Connection, form_id: FormId) -> Result<Option<FormRecord>, StorageError> {
    let raw = conn
        .query_row(
            "SELECT owner_id, title, description, created_at FROM forms WHERE form_id = ?1",
            params![form_id.as_bytes().as_slice()],
            |row| {
                let owner: String = row.get(0)?;
                let title: String = row.get(1)?;
                let description: Option<String> = row.get(2)?;
                let created_at: i64 = row.get(3)?;
                Ok((owner, title, description, created_at))
            },
        )
        .optional()?;
    Ok(raw.map(|(owner, title, description, created_at)| FormRecord {
        form_id,
        owner: OwnerId::new(owner),
        title,
        description,
        created_at,
    }))
}

fn require_form(tx: &Transaction, form_id: FormId) -> Result<(), StorageError> {
    match read_form(tx, form_id)? {
        Some(_) => Ok(()),
        None => Err(StorageError::NotFound(format!("form {form_id}"))),
    }
}

fn insert_choices(
    tx: &Transaction,
    field_id: FieldId,
    texts: &[String],
) -> Result<(), StorageError> {
    for (position, text) in texts.iter().enumerate() {
        tx.execute(
            "INSERT INTO choices (choice_id, field_id, text, position) VALUES (?1, ?2, ?3, ?4)",
            params![
                ChoiceId::new().as_bytes().as_slice(),
                field_id.as_bytes().as_slice(),
                text,
                position as i64,
            ],
        )?;
    }
    Ok(())
}

fn upsert_payment(
    tx: &Transaction,
    field_id: FieldId,
    config: &PaymentConfig,
) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO payment_requests (payment_id, field_id, handle, amount, qr_code) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(field_id) DO UPDATE SET handle = excluded.handle, amount = excluded.amount, qr_code = excluded.qr_code",
        params![
            PaymentRequestId::new().as_bytes().as_slice(),
            field_id.as_bytes().as_slice(),
            config.handle,
            config.amount,
            config.qr_code.as_ref().map(ContentRef::as_str),
        ],
    )?;
    Ok(())
}

fn delete_choices(tx: &Transaction, field_id: FieldId) -> Result<usize, StorageError> {
    Ok(tx.execute(
        "DELETE FROM choices WHERE field_id = ?1",
        params![field_id.as_bytes().as_slice()],
    )?)
}

fn delete_payment(tx: &Transaction, field_id: FieldId) -> Result<usize, StorageError> {
    Ok(tx.execute(
        "DELETE FROM payment_requests WHERE field_id = ?1",
        params![field_id.as_bytes().as_slice()],
    )?)
}

impl Storage for SqliteStorage {
    fn insert_form(
        &mut self,
        owner: &OwnerId,
        title: &str,
        description: Option<&str>,
    ) -> Result<FormRecord, StorageError> {
        let form_id = FormId::new();
        let tx = self.write_tx()?;
        tx.execute(
            "INSERT INTO forms (form_id, owner_id, title, description) VALUES (?1, ?2, ?3, ?4)",
            params![form_id.as_bytes().as_slice(), owner.as_str(), title, description],
        )?;
        let record = read_form(&tx, form_id)?
            .ok_or_else(|| StorageError::NotFound(format!("form {form_id}")))?;
        tx.commit()?;
        Ok(record)
    }

    fn get_form(&self, form_id: FormId) -> Result<Option<FormRecord>, StorageError> {
        read_form(&self.conn, form_id)
    }

    fn get_forms_by_owner(&self, owner: &OwnerId) -> Result<Vec<FormRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT form_id, title, description, created_at FROM forms WHERE owner_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![owner.as_str()], |row| {
            let form_bytes: Vec<u8> = row.get(0)?;
            let title: String = row.get(1)?;
            let description: Option<String> = row.get(2)?;
            let created_at: i64 = row.get(3)?;
            Ok((form_bytes, title, description, created_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (form_bytes, title, description, created_at) = row?;
            result.push(FormRecord {
                form_id: FormId::from_bytes(to_array::<16>(form_bytes, "form_id")?),
                owner: owner.clone(),
                title,
                description,
                created_at,
            });
        }
        Ok(result)
    }

    fn update_form(
        &mut self,
        form_id: FormId,
        title: &str,
        description: Option<&str>,
    ) -> Result<(), StorageError> {
        let updated = self.conn.execute(
            "UPDATE forms SET title = ?1, description = ?2 WHERE form_id = ?3",
            params![title, description, form_id.as_bytes().as_slice()],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("form {form_id}")));
        }
        Ok(())
    }

    fn delete_form(&mut self, form_id: FormId) -> Result<bool, StorageError> {
        let deleted = self.conn.execute(
            "DELETE FROM forms WHERE form_id = ?1",
            params![form_id.as_bytes().as_slice()],
        )?;
        Ok(deleted > 0)
    }

    fn insert_field(
        &mut self,
        form_id: FormId,
        field: &NewField,
    ) -> Result<FieldRecord, StorageError> {
        let field_id = FieldId::new();
        let tx = self.write_tx()?;
        require_form(&tx, form_id)?;
        let record = {
            let ordering = FieldOrdering::new(&tx, form_id);
            let order = ordering.insert(field.order)?;
            tx.execute(
                "INSERT INTO fields (field_id, form_id, field_type, label, is_required, field_order) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    field_id.as_bytes().as_slice(),
                    form_id.as_bytes().as_slice(),
                    field.field_type.as_str(),
                    field.label,
                    field.required,
                    order,
                ],
            )?;
            if field.field_type.has_choices() {
                insert_choices(&tx, field_id, &field.choices)?;
            }
            if field.field_type.has_payment()
                && let Some(payment) = &field.payment
            {
                upsert_payment(&tx, field_id, payment)?;
            }
            ordering.verify()?;
            FieldRecord {
                field_id,
                form_id,
                field_type: field.field_type,
                label: field.label.clone(),
                required: field.required,
                order,
            }
        };
        tx.commit()?;
        debug!(%form_id, %field_id, order = record.order, field_type = %record.field_type, "inserted field");
        Ok(record)
    }

    fn get_field(&self, field_id: FieldId) -> Result<Option<FieldRecord>, StorageError> {
        read_field(&self.conn, field_id)
    }

    fn get_fields(&self, form_id: FormId) -> Result<Vec<FieldRecord>, StorageError> {
        let sql = format!("SELECT {FIELD_COLUMNS} FROM fields WHERE form_id = ?1 ORDER BY field_order");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![form_id.as_bytes().as_slice()], raw_field)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(field_from_raw(row?)?);
        }
        Ok(result)
    }

    fn update_field(
        &mut self,
        form_id: FormId,
        field_id: FieldId,
        edit: &FieldEdit,
    ) -> Result<FieldRecord, StorageError> {
        let tx = self.write_tx()?;
        FieldOrdering::new(&tx, form_id).current_order(field_id)?;
        let current = read_field(&tx, field_id)?
            .ok_or_else(|| StorageError::NotFound(format!("field {field_id}")))?;

        let updated = FieldRecord {
            field_type: edit.field_type.unwrap_or(current.field_type),
            label: edit.label.clone().unwrap_or_else(|| current.label.clone()),
            required: edit.required.unwrap_or(current.required),
            ..current
        };
        tx.execute(
            "UPDATE fields SET field_type = ?1, label = ?2, is_required = ?3 WHERE field_id = ?4",
            params![
                updated.field_type.as_str(),
                updated.label,
                updated.required,
                field_id.as_bytes().as_slice(),
            ],
        )?;

        if updated.field_type.has_choices() {
            if let Some(choices) = &edit.choices {
                delete_choices(&tx, field_id)?;
                insert_choices(&tx, field_id, choices)?;
            }
        } else {
            delete_choices(&tx, field_id)?;
        }

        if updated.field_type.has_payment() {
            match &edit.payment {
                PaymentEdit::Keep => {}
                PaymentEdit::Set(config) => upsert_payment(&tx, field_id, config)?,
                PaymentEdit::Clear => {
                    delete_payment(&tx, field_id)?;
                }
            }
        } else {
            delete_payment(&tx, field_id)?;
        }

        tx.commit()?;
        debug!(%form_id, %field_id, field_type = %updated.field_type, "updated field");
        Ok(updated)
    }

    fn move_field(
        &mut self,
        form_id: FormId,
        field_id: FieldId,
        new_order: u32,
    ) -> Result<FieldRecord, StorageError> {
        let tx = self.write_tx()?;
        {
            let ordering = FieldOrdering::new(&tx, form_id);
            ordering.move_to(field_id, new_order)?;
            ordering.verify()?;
        }
        let record = read_field(&tx, field_id)?
            .ok_or_else(|| StorageError::NotFound(format!("field {field_id}")))?;
        tx.commit()?;
        Ok(record)
    }

    fn delete_field(&mut self, form_id: FormId, field_id: FieldId) -> Result<(), StorageError> {
        let tx = self.write_tx()?;
        {
            let ordering = FieldOrdering::new(&tx, form_id);
            ordering.remove(field_id)?;
            ordering.verify()?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_choices(&self, field_id: FieldId) -> Result<Vec<ChoiceRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT choice_id, text FROM choices WHERE field_id = ?1 ORDER BY position, rowid",
        )?;
        let rows = stmt.query_map(params![field_id.as_bytes().as_slice()], |row| {
            let choice_bytes: Vec<u8> = row.get(0)?;
            let text: String = row.get(1)?;
            Ok((choice_bytes, text))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (choice_bytes, text) = row?;
            result.push(ChoiceRecord {
                choice_id: ChoiceId::from_bytes(to_array::<16>(choice_bytes, "choice_id")?),
                field_id,
                text,
            });
        }
        Ok(result)
    }

    fn get_choice(&self, choice_id: ChoiceId) -> Result<Option<ChoiceRecord>, StorageError> {
        let raw = self
            .conn
            .query_row(
                "SELECT field_id, text FROM choices WHERE choice_id = ?1",
                params![choice_id.as_bytes().as_slice()],
                |row| {
                    let field_bytes: Vec<u8> = row.get(0)?;
                    let text: String = row.get(1)?;
                    Ok((field_bytes, text))
                },
            )
            .optional()?;
        match raw {
            Some((field_bytes, text)) => Ok(Some(ChoiceRecord {
                choice_id,
                field_id: FieldId::from_bytes(to_array::<16>(field_bytes, "field_id")?),
                text,
            })),
            None => Ok(None),
        }
    }

    fn delete_choice(&mut self, choice_id: ChoiceId) -> Result<bool, StorageError> {
        let deleted = self.conn.execute(
            "DELETE FROM choices WHERE choice_id = ?1",
            params![choice_id.as_bytes().as_slice()],
        )?;
        Ok(deleted > 0)
    }

    fn get_payment_request(
        &self,
        field_id: FieldId,
    ) -> Result<Option<PaymentRequestRecord>, StorageError> {
        let raw = self
            .conn
            .query_row(
                "SELECT payment_id, handle, amount, qr_code FROM payment_requests WHERE field_id = ?1",
                params![field_id.as_bytes().as_slice()],
                |row| {
                    let payment_bytes: Vec<u8> = row.get(0)?;
                    let handle: String = row.get(1)?;
                    let amount: i64 = row.get(2)?;
                    let qr_code: Option<String> = row.get(3)?;
                    Ok((payment_bytes, handle, amount, qr_code))
                },
            )
            .optional()?;
        match raw {
            Some((payment_bytes, handle, amount, qr_code)) => Ok(Some(PaymentRequestRecord {
                payment_id: PaymentRequestId::from_bytes(to_array::<16>(
                    payment_bytes,
                    "payment_id",
                )?),
                field_id,
                config: PaymentConfig {
                    handle,
                    amount,
                    qr_code: qr_code.map(ContentRef::new),
                },
            })),
            None => Ok(None),
        }
    }

    fn insert_response(
        &mut self,
        response_id: ResponseId,
        form_id: FormId,
        answers: &[NewAnswer],
    ) -> Result<(ResponseRecord, Vec<AnswerRecord>), StorageError> {
        // Dropping the transaction on any early return rolls back the
        // response row together with the answers written so far.
        let tx = self.write_tx()?;
        require_form(&tx, form_id)?;
        tx.execute(
            "INSERT INTO responses (response_id, form_id) VALUES (?1, ?2)",
            params![response_id.as_bytes().as_slice(), form_id.as_bytes().as_slice()],
        )?;

        let mut single_valued_seen = HashSet::new();
        let mut records = Vec::with_capacity(answers.len());
        for answer in answers {
            let field = read_field(&tx, answer.field_id)?.ok_or_else(|| {
                StorageError::Consistency(format!("field {} no longer exists", answer.field_id))
            })?;
            if field.form_id != form_id {
                warn!(%form_id, field_id = %field.field_id, "answer for field of another form");
                return Err(StorageError::Consistency(format!(
                    "field {} belongs to form {}, not {form_id}",
                    field.field_id, field.form_id
                )));
            }
            if !field.field_type.spec().multi_valued && !single_valued_seen.insert(field.field_id) {
                return Err(StorageError::Consistency(format!(
                    "more than one answer for {} field {}",
                    field.field_type, field.field_id
                )));
            }
            records.push(record_answer(&tx, response_id, &field, &answer.value)?);
        }

        let submitted_at: i64 = tx.query_row(
            "SELECT submitted_at FROM responses WHERE response_id = ?1",
            params![response_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        tx.commit()?;
        debug!(%form_id, %response_id, answers = records.len(), "inserted response");
        Ok((
            ResponseRecord {
                response_id,
                form_id,
                submitted_at,
            },
            records,
        ))
    }

    fn get_response(
        &self,
        response_id: ResponseId,
    ) -> Result<Option<ResponseRecord>, StorageError> {
        let raw = self
            .conn
            .query_row(
                "SELECT form_id, submitted_at FROM responses WHERE response_id = ?1",
                params![response_id.as_bytes().as_slice()],
                |row| {
                    let form_bytes: Vec<u8> = row.get(0)?;
                    let submitted_at: i64 = row.get(1)?;
                    Ok((form_bytes, submitted_at))
                },
            )
            .optional()?;
        match raw {
            Some((form_bytes, submitted_at)) => Ok(Some(ResponseRecord {
                response_id,
                form_id: FormId::from_bytes(to_array::<16>(form_bytes, "form_id")?),
                submitted_at,
            })),
            None => Ok(None),
        }
    }

    fn get_responses_for_form(
        &self,
        form_id: FormId,
    ) -> Result<Vec<ResponseRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT response_id, submitted_at FROM responses WHERE form_id = ?1 ORDER BY submitted_at, rowid",
        )?;
        let rows = stmt.query_map(params![form_id.as_bytes().as_slice()], |row| {
            let response_bytes: Vec<u8> = row.get(0)?;
            let submitted_at: i64 = row.get(1)?;
            Ok((response_bytes, submitted_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (response_bytes, submitted_at) = row?;
            result.push(ResponseRecord {
                response_id: ResponseId::from_bytes(to_array::<16>(response_bytes, "response_id")?),
                form_id,
                submitted_at,
            });
        }
        Ok(result)
    }

    fn get_answers(
        &self,
        response_id: ResponseId,
        field_id: FieldId,
        shape: AnswerShape,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        read_answers(&self.conn, response_id, field_id, shape)
    }

    fn count_responses(&self, form_id: FormId) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM responses WHERE form_id = ?1",
            params![form_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstack_core::AnswerValue;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn owner() -> OwnerId {
        OwnerId::new("user-1")
    }

    fn form_with_fields(
        storage: &mut SqliteStorage,
        labels: &[&str],
    ) -> Result<(FormId, Vec<FieldId>), StorageError> {
        let form = storage.insert_form(&owner(), "Survey", None)?;
        let mut ids = Vec::new();
        for label in labels {
            let field = storage.insert_field(form.form_id, &NewField::new(FieldType::ShortAnswer, *label))?;
            ids.push(field.field_id);
        }
        Ok((form.form_id, ids))
    }

    fn labels_in_order(storage: &SqliteStorage, form_id: FormId) -> Result<Vec<String>, StorageError> {
        let fields = storage.get_fields(form_id)?;
        for (i, f) in fields.iter().enumerate() {
            assert_eq!(f.order as usize, i, "order not dense: {fields:?}");
        }
        Ok(fields.into_iter().map(|f| f.label).collect())
    }

    #[test]
    fn append_assigns_next_order() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, _) = form_with_fields(&mut storage, &["a", "b", "c"])?;
        assert_eq!(labels_in_order(&storage, form_id)?, ["a", "b", "c"]);
        Ok(())
    }

    #[test]
    fn insert_at_position_shifts_later_fields() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, _) = form_with_fields(&mut storage, &["a", "b", "c"])?;
        let mut field = NewField::new(FieldType::LongAnswer, "x");
        field.order = Some(1);
        let inserted = storage.insert_field(form_id, &field)?;
        assert_eq!(inserted.order, 1);
        assert_eq!(labels_in_order(&storage, form_id)?, ["a", "x", "b", "c"]);

        field.order = Some(4);
        storage.insert_field(form_id, &NewField { label: "end".into(), ..field.clone() })?;
        assert_eq!(labels_in_order(&storage, form_id)?, ["a", "x", "b", "c", "end"]);
        Ok(())
    }

    #[test]
    fn insert_past_end_rejected() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, _) = form_with_fields(&mut storage, &["a"])?;
        let mut field = NewField::new(FieldType::Date, "late");
        field.order = Some(2);
        let result = storage.insert_field(form_id, &field);
        assert!(matches!(result, Err(StorageError::Consistency(_))));
        assert_eq!(labels_in_order(&storage, form_id)?, ["a"]);
        Ok(())
    }

    #[test]
    fn move_up_and_down() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, ids) = form_with_fields(&mut storage, &["a", "b", "c", "d"])?;

        storage.move_field(form_id, ids[3], 1)?;
        assert_eq!(labels_in_order(&storage, form_id)?, ["a", "d", "b", "c"]);

        storage.move_field(form_id, ids[0], 3)?;
        assert_eq!(labels_in_order(&storage, form_id)?, ["d", "b", "c", "a"]);
        Ok(())
    }

    #[test]
    fn move_to_same_order_changes_nothing() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, ids) = form_with_fields(&mut storage, &["a", "b", "c"])?;
        let before = storage.get_fields(form_id)?;
        let moved = storage.move_field(form_id, ids[1], 1)?;
        assert_eq!(moved.order, 1);
        assert_eq!(storage.get_fields(form_id)?, before);
        Ok(())
    }

    #[test]
    fn move_out_of_range_rolls_back() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, ids) = form_with_fields(&mut storage, &["a", "b"])?;
        let result = storage.move_field(form_id, ids[0], 2);
        assert!(matches!(result, Err(StorageError::Consistency(_))));
        assert_eq!(labels_in_order(&storage, form_id)?, ["a", "b"]);
        Ok(())
    }

    #[test]
    fn delete_closes_gap() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, ids) = form_with_fields(&mut storage, &["a", "b", "c", "d"])?;
        storage.delete_field(form_id, ids[1])?;
        assert_eq!(labels_in_order(&storage, form_id)?, ["a", "c", "d"]);
        storage.delete_field(form_id, ids[0])?;
        assert_eq!(labels_in_order(&storage, form_id)?, ["c", "d"]);
        Ok(())
    }

    #[test]
    fn field_of_other_form_rejected() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_a, ids_a) = form_with_fields(&mut storage, &["a1", "a2"])?;
        let (form_b, _) = form_with_fields(&mut storage, &["b1", "b2"])?;

        let moved = storage.move_field(form_b, ids_a[0], 1);
        assert!(matches!(moved, Err(StorageError::Consistency(_))));
        let deleted = storage.delete_field(form_b, ids_a[1]);
        assert!(matches!(deleted, Err(StorageError::Consistency(_))));

        assert_eq!(labels_in_order(&storage, form_a)?, ["a1", "a2"]);
        assert_eq!(labels_in_order(&storage, form_b)?, ["b1", "b2"]);
        Ok(())
    }

    #[test]
    fn choices_only_kept_for_choice_types() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let form = storage.insert_form(&owner(), "Poll", Some("pick one"))?;
        let mut radio = NewField::new(FieldType::RadioButton, "Coffee?");
        radio.choices = vec!["Yes".into(), "No".into()];
        let radio = storage.insert_field(form.form_id, &radio)?;
        let texts: Vec<_> = storage.get_choices(radio.field_id)?.into_iter().map(|c| c.text).collect();
        assert_eq!(texts, ["Yes", "No"]);

        let mut text = NewField::new(FieldType::ShortAnswer, "Name");
        text.choices = vec!["ignored".into()];
        let text = storage.insert_field(form.form_id, &text)?;
        assert!(storage.get_choices(text.field_id)?.is_empty());

        let edit = FieldEdit {
            field_type: Some(FieldType::LongAnswer),
            ..FieldEdit::default()
        };
        storage.update_field(form.form_id, radio.field_id, &edit)?;
        assert!(storage.get_choices(radio.field_id)?.is_empty());
        Ok(())
    }

    #[test]
    fn choice_edit_replaces_list() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let form = storage.insert_form(&owner(), "Poll", None)?;
        let mut field = NewField::new(FieldType::Dropdown, "Size");
        field.choices = vec!["S".into(), "M".into()];
        let field = storage.insert_field(form.form_id, &field)?;
        let edit = FieldEdit {
            label: Some("T-shirt size".into()),
            choices: Some(vec!["M".into(), "L".into(), "XL".into()]),
            ..FieldEdit::default()
        };
        let updated = storage.update_field(form.form_id, field.field_id, &edit)?;
        assert_eq!(updated.label, "T-shirt size");
        assert_eq!(updated.order, field.order);
        let texts: Vec<_> = storage.get_choices(field.field_id)?.into_iter().map(|c| c.text).collect();
        assert_eq!(texts, ["M", "L", "XL"]);
        Ok(())
    }

    #[test]
    fn payment_config_upserted_and_cleared() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let form = storage.insert_form(&owner(), "Fees", None)?;
        let mut field = NewField::new(FieldType::UpiPayment, "Entry fee");
        field.payment = Some(PaymentConfig {
            handle: "club@upi".into(),
            amount: 250,
            qr_code: Some(ContentRef::new("formfiles/qr.png")),
        });
        let field = storage.insert_field(form.form_id, &field)?;
        let payment = storage.get_payment_request(field.field_id)?.ok_or("missing payment")?;
        assert_eq!(payment.config.amount, 250);

        let edit = FieldEdit {
            payment: PaymentEdit::Set(PaymentConfig {
                handle: "club@upi".into(),
                amount: 300,
                qr_code: None,
            }),
            ..FieldEdit::default()
        };
        storage.update_field(form.form_id, field.field_id, &edit)?;
        let payment = storage.get_payment_request(field.field_id)?.ok_or("missing payment")?;
        assert_eq!(payment.config.amount, 300);
        assert_eq!(payment.config.qr_code, None);

        let edit = FieldEdit {
            payment: PaymentEdit::Clear,
            ..FieldEdit::default()
        };
        storage.update_field(form.form_id, field.field_id, &edit)?;
        assert!(storage.get_payment_request(field.field_id)?.is_none());
        Ok(())
    }

    #[test]
    fn response_with_bad_answer_rolls_back() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, ids) = form_with_fields(&mut storage, &["Name", "Bio"])?;
        let answers = vec![
            NewAnswer {
                field_id: ids[0],
                value: AnswerValue::ShortText("Alice".into()),
            },
            NewAnswer {
                field_id: ids[1],
                value: AnswerValue::CheckBox(true),
            },
        ];
        let attempt = ResponseId::new();
        let result = storage.insert_response(attempt, form_id, &answers);
        assert!(matches!(result, Err(StorageError::Consistency(_))));
        assert_eq!(storage.count_responses(form_id)?, 0);
        assert!(storage.get_response(attempt)?.is_none());
        let short_rows: i64 =
            storage.conn().query_row("SELECT COUNT(*) FROM short_answers", [], |row| row.get(0))?;
        assert_eq!(short_rows, 0);
        Ok(())
    }

    #[test]
    fn duplicate_single_valued_answer_rejected() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, ids) = form_with_fields(&mut storage, &["Name"])?;
        let answer = NewAnswer {
            field_id: ids[0],
            value: AnswerValue::ShortText("Alice".into()),
        };
        let result = storage.insert_response(ResponseId::new(), form_id, &[answer.clone(), answer]);
        assert!(matches!(result, Err(StorageError::Consistency(_))));
        assert_eq!(storage.count_responses(form_id)?, 0);
        Ok(())
    }

    #[test]
    fn multi_choice_rows_share_response_and_field() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let form = storage.insert_form(&owner(), "Toppings", None)?;
        let mut field = NewField::new(FieldType::MultipleChoice, "Toppings");
        field.choices = vec!["Cheese".into(), "Olives".into()];
        let field = storage.insert_field(form.form_id, &field)?;
        let answers: Vec<_> = ["Cheese", "Olives"]
            .into_iter()
            .map(|t| NewAnswer {
                field_id: field.field_id,
                value: AnswerValue::Choice(t.into()),
            })
            .collect();
        let (response, written) = storage.insert_response(ResponseId::new(), form.form_id, &answers)?;
        assert_eq!(written.len(), 2);

        let stored = storage.get_answers(response.response_id, field.field_id, AnswerShape::Choice)?;
        let texts: Vec<_> = stored.iter().filter_map(|a| a.value.as_text()).collect();
        assert_eq!(texts, ["Cheese", "Olives"]);
        assert!(stored.iter().all(|a| a.response_id == response.response_id));
        Ok(())
    }

    #[test]
    fn deleting_form_cascades() -> TestResult {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (form_id, ids) = form_with_fields(&mut storage, &["Name"])?;
        let (response, _) = storage.insert_response(
            ResponseId::new(),
            form_id,
            &[NewAnswer {
                field_id: ids[0],
                value: AnswerValue::ShortText("Bob".into()),
            }],
        )?;
        assert!(storage.delete_form(form_id)?);
        assert!(storage.get_field(ids[0])?.is_none());
        assert!(storage.get_response(response.response_id)?.is_none());
        let rows: i64 =
            storage.conn().query_row("SELECT COUNT(*) FROM short_answers", [], |row| row.get(0))?;
        assert_eq!(rows, 0);
        assert!(!storage.delete_form(form_id)?);
        Ok(())
    }

    #[test]
    fn file_backed_database_persists() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("forms.db");
        let path = path.to_str().ok_or("non-utf8 temp path")?;
        let form_id = {
            let mut storage = SqliteStorage::open(path)?;
            form_with_fields(&mut storage, &["a", "b"])?.0
        };
        let storage = SqliteStorage::open(path)?;
        assert_eq!(labels_in_order(&storage, form_id)?, ["a", "b"]);
        assert_eq!(storage.get_forms_by_owner(&owner())?.len(), 1);
        Ok(())
    }

    #[test]
    fn concurrent_writers_keep_orders_dense() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("forms.db");
        let path = path.to_str().ok_or("non-utf8 temp path")?;
        let mut first = SqliteStorage::open(path)?;
        let (form_id, _) = form_with_fields(&mut first, &["seed"])?;
        let second = SqliteStorage::open(path)?;

        // Each connection inserts at the front and moves the new field to the
        // back. Overlapping shifts would leave gaps or duplicate orders.
        const ROUNDS: usize = 25;
        let writer = |mut storage: SqliteStorage, name: &'static str| -> Result<(), StorageError> {
            for i in 0..ROUNDS {
                let mut new = NewField::new(FieldType::ShortAnswer, format!("{name}-{i}"));
                new.order = Some(0);
                let field = storage.insert_field(form_id, &new)?;
                let last = storage.get_fields(form_id)?.len() as u32 - 1;
                storage.move_field(form_id, field.field_id, last)?;
            }
            Ok(())
        };
        let writer = &writer;
        std::thread::scope(|scope| -> Result<(), StorageError> {
            let a = scope.spawn(move || writer(first, "a"));
            let b = scope.spawn(move || writer(second, "b"));
            for handle in [a, b] {
                handle.join().map_err(|_| StorageError::Consistency("writer panicked".into()))??;
            }
            Ok(())
        })?;

        let storage = SqliteStorage::open(path)?;
        let labels = labels_in_order(&storage, form_id)?;
        assert_eq!(labels.len(), 1 + 2 * ROUNDS);
        for name in ["a", "b"] {
            let mine: Vec<_> = labels.iter().filter(|l| l.starts_with(&format!("{name}-"))).collect();
            assert_eq!(mine.len(), ROUNDS);
        }
        Ok(())
    }
}
