use anyhow::Context;
use chrono::NaiveDate;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::Ledger;

/// Create or upgrade the storage schema. The ledger is stored as a single
/// JSONB document keyed by session id; `records` is the append-only
/// check-in audit log.
pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query("CREATE SCHEMA IF NOT EXISTS attendance_ledger")
        .execute(pool)
        .await
        .context("failed to create schema")?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance_ledger.sessions (
            session_id TEXT PRIMARY KEY,
            ledger JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create sessions table")?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance_ledger.records (
            id UUID PRIMARY KEY,
            session_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date DATE NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create records table")?;
    Ok(())
}

pub async fn find_by_session_id(
    pool: &PgPool,
    session_id: &str,
) -> anyhow::Result<Option<Ledger>> {
    let row = sqlx::query("SELECT ledger FROM attendance_ledger.sessions WHERE session_id = $1")
        .bind(session_id)
        .fetch_optional(pool)
        .await
        .context("failed to read session")?;
    match row {
        Some(row) => {
            let Json(ledger): Json<Ledger> = row
                .try_get("ledger")
                .context("failed to decode stored ledger")?;
            Ok(Some(ledger))
        }
        None => Ok(None),
    }
}

pub async fn insert_ledger(pool: &PgPool, ledger: &Ledger) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO attendance_ledger.sessions (session_id, ledger, active) VALUES ($1, $2, $3)",
    )
    .bind(&ledger.session_id)
    .bind(Json(ledger))
    .bind(ledger.active)
    .execute(pool)
    .await
    .context("failed to insert session")?;
    Ok(())
}

/// Replace the stored ledger document. Last write wins; there is no
/// optimistic-concurrency token.
pub async fn replace_ledger(pool: &PgPool, ledger: &Ledger) -> anyhow::Result<()> {
    let result = sqlx::query(
        "UPDATE attendance_ledger.sessions SET ledger = $2, active = $3 WHERE session_id = $1",
    )
    .bind(&ledger.session_id)
    .bind(Json(ledger))
    .bind(ledger.active)
    .execute(pool)
    .await
    .context("failed to update session")?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::CourseNotFound(ledger.session_id.clone()).into());
    }
    Ok(())
}

/// Remove the session and its audit records; the terminal step of an export.
pub async fn delete_ledger(pool: &PgPool, session_id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM attendance_ledger.sessions WHERE session_id = $1")
        .bind(session_id)
        .execute(pool)
        .await
        .context("failed to delete session")?;
    sqlx::query("DELETE FROM attendance_ledger.records WHERE session_id = $1")
        .bind(session_id)
        .execute(pool)
        .await
        .context("failed to delete attendance records")?;
    Ok(())
}

/// Fire-and-forget audit append for the live check-in path; not required
/// for reconciliation correctness.
pub async fn insert_attendance_record(
    pool: &PgPool,
    session_id: &str,
    student_id: &str,
    date: NaiveDate,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance_ledger.records (id, session_id, student_id, date)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(student_id)
    .bind(date)
    .execute(pool)
    .await
    .context("failed to append attendance record")?;
    Ok(())
}
