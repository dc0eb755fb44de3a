//! # Patient Repository
//!
//! Patients are optional on orders; the Order Engine only needs to know
//! whether a reference resolves.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use optica_core::validation::validate_text;
use optica_core::Patient;

use crate::error::DbResult;

/// Repository for patient database operations.
#[derive(Debug, Clone)]
pub struct PatientRepository {
    pool: SqlitePool,
}

impl PatientRepository {
    /// Creates a new PatientRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PatientRepository { pool }
    }

    /// Registers a patient.
    pub async fn insert(&self, full_name: &str, phone: Option<&str>) -> DbResult<Patient> {
        validate_text("full_name", full_name, 200)?;

        let patient = Patient {
            id: Uuid::new_v4().to_string(),
            full_name: full_name.trim().to_string(),
            phone: phone.map(str::trim).filter(|p| !p.is_empty()).map(String::from),
            created_at: Utc::now(),
        };

        debug!(id = %patient.id, "Inserting patient");

        sqlx::query("INSERT INTO patients (id, full_name, phone, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&patient.id)
            .bind(&patient.full_name)
            .bind(&patient.phone)
            .bind(patient.created_at)
            .execute(&self.pool)
            .await?;

        Ok(patient)
    }

    /// Gets a patient by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Patient>> {
        let patient = sqlx::query_as::<_, Patient>(
            "SELECT id, full_name, phone, created_at FROM patients WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(patient)
    }

    /// Whether a patient with this ID exists.
    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        exists_in(&mut conn, id).await
    }
}

/// Same as [`PatientRepository::exists`] inside an open transaction.
pub(crate) async fn exists_in(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM patients WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}
