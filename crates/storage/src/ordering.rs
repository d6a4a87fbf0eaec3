//! Dense, zero-based field ordering within a form.
//!
//! Every method runs against an open transaction. Callers finish with
//! [`FieldOrdering::verify`] before committing, so a form's order values are
//! always exactly `0..N` once the transaction is visible.

use rusqlite::{OptionalExtension, Transaction, params};
use tracing::debug;

use formstack_core::ids::*;

use crate::error::StorageError;
use crate::sqlite::to_array;

pub struct FieldOrdering<'a> {
    tx: &'a Transaction<'a>,
    form_id: FormId,
}

impl<'a> FieldOrdering<'a> {
    pub fn new(tx: &'a Transaction<'a>, form_id: FormId) -> Self {
        Self { tx, form_id }
    }

    pub fn len(&self) -> Result<u32, StorageError> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM fields WHERE form_id = ?1",
            params![self.form_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Reserve the slot for a new field and return the order it must take.
    /// Without a desired order the field goes after the current last one;
    /// otherwise every field at or after `desired` moves up by one.
    pub fn insert(&self, desired: Option<u32>) -> Result<u32, StorageError> {
        let Some(order) = desired else {
            let next: i64 = self.tx.query_row(
                "SELECT COALESCE(MAX(field_order) + 1, 0) FROM fields WHERE form_id = ?1",
                params![self.form_id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            return Ok(next as u32);
        };
        let count = self.len()?;
        if order > count {
            return Err(StorageError::Consistency(format!(
                "order {order} out of range 0..={count} for form {}",
                self.form_id
            )));
        }
        let shifted = self.tx.execute(
            "UPDATE fields SET field_order = field_order + 1 WHERE form_id = ?1 AND field_order >= ?2",
            params![self.form_id.as_bytes().as_slice(), order],
        )?;
        debug!(form_id = %self.form_id, order, shifted, "opened field slot");
        Ok(order)
    }

    /// Current order of a field, rejecting fields that belong to another form.
    pub fn current_order(&self, field_id: FieldId) -> Result<u32, StorageError> {
        let row: Option<(Vec<u8>, i64)> = self
            .tx
            .query_row(
                "SELECT form_id, field_order FROM fields WHERE field_id = ?1",
                params![field_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((form_bytes, order)) = row else {
            return Err(StorageError::NotFound(format!("field {field_id}")));
        };
        let parent = FormId::from_bytes(to_array::<16>(form_bytes, "form_id")?);
        if parent != self.form_id {
            return Err(StorageError::Consistency(format!(
                "field {field_id} belongs to form {parent}, not {}",
                self.form_id
            )));
        }
        Ok(order as u32)
    }

    /// Move a field to `new_order`, shifting the fields in between by one.
    /// Returns the field's previous order. Moving to the current order
    /// touches nothing.
    pub fn move_to(&self, field_id: FieldId, new_order: u32) -> Result<u32, StorageError> {
        let current = self.current_order(field_id)?;
        let count = self.len()?;
        if new_order >= count {
            return Err(StorageError::Consistency(format!(
                "order {new_order} out of range 0..{count} for form {}",
                self.form_id
            )));
        }
        if new_order == current {
            return Ok(current);
        }

        let form = self.form_id.as_bytes().as_slice();
        let field = field_id.as_bytes().as_slice();
        let shifted = if new_order < current {
            self.tx.execute(
                "UPDATE fields SET field_order = field_order + 1
                 WHERE form_id = ?1 AND field_id != ?2 AND field_order >= ?3 AND field_order < ?4",
                params![form, field, new_order, current],
            )?
        } else {
            self.tx.execute(
                "UPDATE fields SET field_order = field_order - 1
                 WHERE form_id = ?1 AND field_id != ?2 AND field_order > ?3 AND field_order <= ?4",
                params![form, field, current, new_order],
            )?
        };
        self.tx.execute(
            "UPDATE fields SET field_order = ?1 WHERE field_id = ?2",
            params![new_order, field],
        )?;
        debug!(form_id = %self.form_id, %field_id, from = current, to = new_order, shifted, "moved field");
        Ok(current)
    }

    /// Delete a field and close the gap it leaves. Returns its former order.
    pub fn remove(&self, field_id: FieldId) -> Result<u32, StorageError> {
        let order = self.current_order(field_id)?;
        self.tx.execute(
            "DELETE FROM fields WHERE field_id = ?1",
            params![field_id.as_bytes().as_slice()],
        )?;
        self.tx.execute(
            "UPDATE fields SET field_order = field_order - 1 WHERE form_id = ?1 AND field_order > ?2",
            params![self.form_id.as_bytes().as_slice(), order],
        )?;
        debug!(form_id = %self.form_id, %field_id, order, "removed field");
        Ok(order)
    }

    /// Check the order set is exactly `0..N` with no duplicates.
    pub fn verify(&self) -> Result<(), StorageError> {
        let (count, distinct, min, max): (i64, i64, i64, i64) = self.tx.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT field_order),
                    COALESCE(MIN(field_order), 0), COALESCE(MAX(field_order), -1)
             FROM fields WHERE form_id = ?1",
            params![self.form_id.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let dense = count == distinct && (count == 0 || (min == 0 && max == count - 1));
        if !dense {
            return Err(StorageError::Consistency(format!(
                "field order of form {} is not dense: {count} fields, {distinct} distinct, range {min}..={max}",
                self.form_id
            )));
        }
        Ok(())
    }
}
