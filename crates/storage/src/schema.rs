use std::time::Duration;

use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection, busy_timeout: Duration) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
    ",
    )?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, unixepoch())",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

/// Table holding the answers of one shape. Every answer table has the same
/// `(answer_id, response_id, field_id, value)` layout.
pub fn answer_table(shape: formstack_core::AnswerShape) -> &'static str {
    use formstack_core::AnswerShape;
    match shape {
        AnswerShape::ShortText => "short_answers",
        AnswerShape::LongText => "long_answers",
        AnswerShape::Choice => "choice_answers",
        AnswerShape::CheckBox => "checkbox_answers",
        AnswerShape::Date => "date_answers",
        AnswerShape::File => "file_answers",
        AnswerShape::PaymentProof => "payment_proofs",
    }
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS forms (
    form_id BLOB PRIMARY KEY CHECK (length(form_id) = 16),
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    created_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);
CREATE INDEX IF NOT EXISTS idx_forms_owner ON forms (owner_id);

-- field_order is kept dense (0..N-1) per form by the ordering manager and
-- checked before every commit; no UNIQUE index so shifts can run as
-- single UPDATE statements.
CREATE TABLE IF NOT EXISTS fields (
    field_id BLOB PRIMARY KEY CHECK (length(field_id) = 16),
    form_id BLOB NOT NULL REFERENCES forms (form_id) ON DELETE CASCADE,
    field_type TEXT NOT NULL,
    label TEXT NOT NULL,
    is_required INTEGER NOT NULL DEFAULT 0,
    field_order INTEGER NOT NULL CHECK (field_order >= 0)
);
CREATE INDEX IF NOT EXISTS idx_fields_form_order ON fields (form_id, field_order);

CREATE TABLE IF NOT EXISTS choices (
    choice_id BLOB PRIMARY KEY CHECK (length(choice_id) = 16),
    field_id BLOB NOT NULL REFERENCES fields (field_id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    position INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_choices_field ON choices (field_id, position);

CREATE TABLE IF NOT EXISTS payment_requests (
    payment_id BLOB PRIMARY KEY CHECK (length(payment_id) = 16),
    field_id BLOB NOT NULL UNIQUE REFERENCES fields (field_id) ON DELETE CASCADE,
    handle TEXT NOT NULL,
    amount INTEGER NOT NULL DEFAULT 0,
    qr_code TEXT
);

CREATE TABLE IF NOT EXISTS responses (
    response_id BLOB PRIMARY KEY CHECK (length(response_id) = 16),
    form_id BLOB NOT NULL REFERENCES forms (form_id) ON DELETE CASCADE,
    submitted_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);
CREATE INDEX IF NOT EXISTS idx_responses_form ON responses (form_id, submitted_at);

CREATE TABLE IF NOT EXISTS short_answers (
    answer_id BLOB PRIMARY KEY CHECK (length(answer_id) = 16),
    response_id BLOB NOT NULL REFERENCES responses (response_id) ON DELETE CASCADE,
    field_id BLOB NOT NULL REFERENCES fields (field_id) ON DELETE CASCADE,
    value TEXT NOT NULL CHECK (length(value) <= 255)
);
CREATE INDEX IF NOT EXISTS idx_short_answers ON short_answers (response_id, field_id);

CREATE TABLE IF NOT EXISTS long_answers (
    answer_id BLOB PRIMARY KEY CHECK (length(answer_id) = 16),
    response_id BLOB NOT NULL REFERENCES responses (response_id) ON DELETE CASCADE,
    field_id BLOB NOT NULL REFERENCES fields (field_id) ON DELETE CASCADE,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_long_answers ON long_answers (response_id, field_id);

CREATE TABLE IF NOT EXISTS choice_answers (
    answer_id BLOB PRIMARY KEY CHECK (length(answer_id) = 16),
    response_id BLOB NOT NULL REFERENCES responses (response_id) ON DELETE CASCADE,
    field_id BLOB NOT NULL REFERENCES fields (field_id) ON DELETE CASCADE,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_choice_answers ON choice_answers (response_id, field_id);

CREATE TABLE IF NOT EXISTS checkbox_answers (
    answer_id BLOB PRIMARY KEY CHECK (length(answer_id) = 16),
    response_id BLOB NOT NULL REFERENCES responses (response_id) ON DELETE CASCADE,
    field_id BLOB NOT NULL REFERENCES fields (field_id) ON DELETE CASCADE,
    value INTEGER NOT NULL CHECK (value IN (0, 1))
);
CREATE INDEX IF NOT EXISTS idx_checkbox_answers ON checkbox_answers (response_id, field_id);

CREATE TABLE IF NOT EXISTS date_answers (
    answer_id BLOB PRIMARY KEY CHECK (length(answer_id) = 16),
    response_id BLOB NOT NULL REFERENCES responses (response_id) ON DELETE CASCADE,
    field_id BLOB NOT NULL REFERENCES fields (field_id) ON DELETE CASCADE,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_date_answers ON date_answers (response_id, field_id);

CREATE TABLE IF NOT EXISTS file_answers (
    answer_id BLOB PRIMARY KEY CHECK (length(answer_id) = 16),
    response_id BLOB NOT NULL REFERENCES responses (response_id) ON DELETE CASCADE,
    field_id BLOB NOT NULL REFERENCES fields (field_id) ON DELETE CASCADE,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_answers ON file_answers (response_id, field_id);

CREATE TABLE IF NOT EXISTS payment_proofs (
    answer_id BLOB PRIMARY KEY CHECK (length(answer_id) = 16),
    response_id BLOB NOT NULL REFERENCES responses (response_id) ON DELETE CASCADE,
    field_id BLOB NOT NULL REFERENCES fields (field_id) ON DELETE CASCADE,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_payment_proofs ON payment_proofs (response_id, field_id);
";
