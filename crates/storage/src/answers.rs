//! Per-shape answer tables.

use rusqlite::{Connection, Transaction, params, types::Value};

use formstack_core::{
    AnswerShape, AnswerValue, ContentRef,
    date::{format_date, parse_date},
    ids::*,
};

use crate::error::StorageError;
use crate::schema::answer_table;
use crate::sqlite::to_array;
use crate::traits::{AnswerRecord, FieldRecord};

/// Write one answer row for `field` in the table of its type's answer shape.
pub fn record_answer(
    tx: &Transaction,
    response_id: ResponseId,
    field: &FieldRecord,
    value: &AnswerValue,
) -> Result<AnswerRecord, StorageError> {
    let expected = field.field_type.spec().answer;
    if value.shape() != expected {
        return Err(StorageError::Consistency(format!(
            "{:?} answer cannot be stored for {} field {}",
            value.shape(),
            field.field_type,
            field.field_id
        )));
    }
    let answer_id = AnswerId::new();
    let sql = format!(
        "INSERT INTO {} (answer_id, response_id, field_id, value) VALUES (?1, ?2, ?3, ?4)",
        answer_table(expected)
    );
    tx.execute(
        &sql,
        params![
            answer_id.as_bytes().as_slice(),
            response_id.as_bytes().as_slice(),
            field.field_id.as_bytes().as_slice(),
            encode_value(value),
        ],
    )?;
    Ok(AnswerRecord {
        answer_id,
        response_id,
        field_id: field.field_id,
        value: value.clone(),
    })
}

/// Answers of one (response, field) pair, in the order they were written.
pub fn read_answers(
    conn: &Connection,
    response_id: ResponseId,
    field_id: FieldId,
    shape: AnswerShape,
) -> Result<Vec<AnswerRecord>, StorageError> {
    let sql = format!(
        "SELECT answer_id, value FROM {} WHERE response_id = ?1 AND field_id = ?2 ORDER BY rowid",
        answer_table(shape)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![response_id.as_bytes().as_slice(), field_id.as_bytes().as_slice()],
        |row| {
            let id_bytes: Vec<u8> = row.get(0)?;
            let raw: Value = row.get(1)?;
            Ok((id_bytes, raw))
        },
    )?;

    let mut result = Vec::new();
    for row in rows {
        let (id_bytes, raw) = row?;
        result.push(AnswerRecord {
            answer_id: AnswerId::from_bytes(to_array::<16>(id_bytes, "answer_id")?),
            response_id,
            field_id,
            value: decode_value(shape, raw)?,
        });
    }
    Ok(result)
}

fn encode_value(value: &AnswerValue) -> Value {
    match value {
        AnswerValue::ShortText(s) | AnswerValue::LongText(s) | AnswerValue::Choice(s) => {
            Value::Text(s.clone())
        }
        AnswerValue::CheckBox(b) => Value::Integer(i64::from(*b)),
        AnswerValue::Date(d) => Value::Text(format_date(*d)),
        AnswerValue::File(r) | AnswerValue::PaymentProof(r) => Value::Text(r.as_str().to_string()),
    }
}

fn decode_value(shape: AnswerShape, raw: Value) -> Result<AnswerValue, StorageError> {
    let value = match (shape, raw) {
        (AnswerShape::ShortText, Value::Text(s)) => AnswerValue::ShortText(s),
        (AnswerShape::LongText, Value::Text(s)) => AnswerValue::LongText(s),
        (AnswerShape::Choice, Value::Text(s)) => AnswerValue::Choice(s),
        (AnswerShape::CheckBox, Value::Integer(n)) => AnswerValue::CheckBox(n != 0),
        (AnswerShape::Date, Value::Text(s)) => AnswerValue::Date(
            parse_date(&s)
                .ok_or_else(|| StorageError::Serialization(format!("invalid stored date: {s}")))?,
        ),
        (AnswerShape::File, Value::Text(s)) => AnswerValue::File(ContentRef::new(s)),
        (AnswerShape::PaymentProof, Value::Text(s)) => AnswerValue::PaymentProof(ContentRef::new(s)),
        (shape, other) => {
            return Err(StorageError::Serialization(format!(
                "unexpected {:?} value in {} table",
                other.data_type(),
                answer_table(shape)
            )));
        }
    };
    Ok(value)
}
