//! SQLite-backed model record store.
//!
//! # Storage layout
//!
//! A single table `site_models` is created (if it does not already exist)
//! with the following columns:
//!
//! | column        | type | description                                   |
//! |---------------|------|-----------------------------------------------|
//! | id            | TEXT | UUID v4 primary key                           |
//! | file_name     | TEXT | Original upload file name                     |
//! | object_id     | TEXT | Storage object identifier (unique)            |
//! | urn           | TEXT | Derivative URN of the translated model        |
//! | status        | TEXT | `processing` / `success` / `failed`           |
//! | progress      | TEXT | Translation progress string, if any           |
//! | error         | TEXT | Translation failure detail, if any            |
//! | model_unit    | TEXT | Native length unit label (`mm`, `ft`, ...)    |
//! | ref_model_*   | REAL | Reference point, model side (x, y, z)         |
//! | ref_gps_*     | REAL | Reference point, GPS side (lat, lon, elev)    |
//! | created_at    | TEXT | RFC-3339 creation time (UTC)                  |
//! | updated_at    | TEXT | RFC-3339 last-update time (UTC)               |
//!
//! The six reference columns are nullable as a group: a row where any of
//! them is NULL has no usable reference point and GPS calibration for that
//! model fails closed.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use sitelink_types::{CalibrationConfig, GpsFix, ModelPoint, ReferencePoint};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from model registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Model not found: {0}")]
    NotFound(String),
    #[error("Invalid model record: {0}")]
    InvalidRecord(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// TranslationStatus
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of the third-party translation job for a model.
///
/// The pipeline itself lives outside this system; only its polled outcome is
/// recorded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStatus {
    Processing,
    Success,
    Failed,
}

impl TranslationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationStatus::Processing => "processing",
            TranslationStatus::Success => "success",
            TranslationStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self, RegistryError> {
        match s {
            "processing" => Ok(TranslationStatus::Processing),
            "success" => Ok(TranslationStatus::Success),
            "failed" => Ok(TranslationStatus::Failed),
            other => Err(RegistryError::InvalidRecord(format!(
                "unknown translation status '{other}'"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ModelRecord
// ─────────────────────────────────────────────────────────────────────────────

/// A registered building model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub file_name: String,
    pub object_id: String,
    pub urn: String,
    pub status: TranslationStatus,
    pub progress: Option<String>,
    pub error: Option<String>,
    /// Native length unit reported by the translation pipeline.
    pub model_unit: Option<String>,
    /// Operator-set GPS↔model calibration pair, if configured.
    pub reference_point: Option<ReferencePoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ModelStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed store of [`ModelRecord`]s.
pub struct ModelStore {
    conn: Connection,
}

impl ModelStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, RegistryError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), RegistryError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS site_models (
                id            TEXT PRIMARY KEY,
                file_name     TEXT NOT NULL,
                object_id     TEXT UNIQUE NOT NULL,
                urn           TEXT NOT NULL,
                status        TEXT NOT NULL DEFAULT 'processing',
                progress      TEXT,
                error         TEXT,
                model_unit    TEXT,
                ref_model_x   REAL,
                ref_model_y   REAL,
                ref_model_z   REAL,
                ref_gps_lat   REAL,
                ref_gps_lon   REAL,
                ref_gps_elev  REAL,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_site_models_urn ON site_models(urn);",
        )?;
        Ok(())
    }

    /// Register a newly uploaded model. Translation starts in `processing`.
    pub fn insert(
        &self,
        file_name: &str,
        object_id: &str,
        urn: &str,
    ) -> Result<ModelRecord, RegistryError> {
        let now = Utc::now();
        let record = ModelRecord {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            object_id: object_id.to_string(),
            urn: urn.to_string(),
            status: TranslationStatus::Processing,
            progress: None,
            error: None,
            model_unit: None,
            reference_point: None,
            created_at: now,
            updated_at: now,
        };
        self.conn.execute(
            "INSERT INTO site_models (id, file_name, object_id, urn, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.file_name,
                record.object_id,
                record.urn,
                record.status.as_str(),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        debug!(model_id = %record.id, file_name = %record.file_name, "model row created");
        Ok(record)
    }

    /// Fetch one model by id.
    pub fn get(&self, model_id: &str) -> Result<ModelRecord, RegistryError> {
        self.conn
            .query_row(
                "SELECT id, file_name, object_id, urn, status, progress, error, model_unit,
                        ref_model_x, ref_model_y, ref_model_z,
                        ref_gps_lat, ref_gps_lon, ref_gps_elev,
                        created_at, updated_at
                 FROM site_models WHERE id = ?1",
                params![model_id],
                row_to_record,
            )
            .optional()?
            .ok_or_else(|| RegistryError::NotFound(model_id.to_string()))
    }

    /// All registered models, newest first.
    pub fn list(&self) -> Result<Vec<ModelRecord>, RegistryError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_name, object_id, urn, status, progress, error, model_unit,
                    ref_model_x, ref_model_y, ref_model_z,
                    ref_gps_lat, ref_gps_lon, ref_gps_elev,
                    created_at, updated_at
             FROM site_models ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Record the model's native length unit.
    pub fn set_unit(&self, model_id: &str, unit: &str) -> Result<(), RegistryError> {
        let changed = self.conn.execute(
            "UPDATE site_models SET model_unit = ?2, updated_at = ?3 WHERE id = ?1",
            params![model_id, unit, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(RegistryError::NotFound(model_id.to_string()));
        }
        Ok(())
    }

    /// Set the model's GPS↔model reference point. All six scalars are written
    /// in one statement so the row can never hold a partial pair.
    pub fn set_reference_point(
        &self,
        model_id: &str,
        reference: &ReferencePoint,
    ) -> Result<(), RegistryError> {
        let changed = self.conn.execute(
            "UPDATE site_models
             SET ref_model_x = ?2, ref_model_y = ?3, ref_model_z = ?4,
                 ref_gps_lat = ?5, ref_gps_lon = ?6, ref_gps_elev = ?7,
                 updated_at = ?8
             WHERE id = ?1",
            params![
                model_id,
                reference.model.x,
                reference.model.y,
                reference.model.z,
                reference.gps.lat,
                reference.gps.lon,
                reference.gps.elev,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(RegistryError::NotFound(model_id.to_string()));
        }
        Ok(())
    }

    /// Record the polled outcome of the translation job.
    pub fn set_translation_status(
        &self,
        model_id: &str,
        status: TranslationStatus,
        progress: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), RegistryError> {
        let changed = self.conn.execute(
            "UPDATE site_models
             SET status = ?2, progress = ?3, error = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                model_id,
                status.as_str(),
                progress,
                error,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(RegistryError::NotFound(model_id.to_string()));
        }
        Ok(())
    }

    /// The calibration inputs for one model: unit label plus reference point.
    ///
    /// The reference point is `None` unless all six columns are populated.
    pub fn calibration_config(&self, model_id: &str) -> Result<CalibrationConfig, RegistryError> {
        let record = self.get(model_id)?;
        Ok(CalibrationConfig {
            unit_label: record.model_unit,
            reference_point: record.reference_point,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ModelRecord> {
    let status_raw: String = row.get(4)?;
    let created_raw: String = row.get(14)?;
    let updated_raw: String = row.get(15)?;

    let ref_model_x: Option<f64> = row.get(8)?;
    let ref_model_y: Option<f64> = row.get(9)?;
    let ref_model_z: Option<f64> = row.get(10)?;
    let ref_gps_lat: Option<f64> = row.get(11)?;
    let ref_gps_lon: Option<f64> = row.get(12)?;
    let ref_gps_elev: Option<f64> = row.get(13)?;

    // A usable reference point needs every one of the six scalars.
    let reference_point = match (
        ref_model_x,
        ref_model_y,
        ref_model_z,
        ref_gps_lat,
        ref_gps_lon,
        ref_gps_elev,
    ) {
        (Some(x), Some(y), Some(z), Some(lat), Some(lon), Some(elev)) => Some(ReferencePoint {
            gps: GpsFix { lat, lon, elev },
            model: ModelPoint { x, y, z },
        }),
        _ => None,
    };

    Ok(ModelRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        object_id: row.get(2)?,
        urn: row.get(3)?,
        status: TranslationStatus::parse(&status_raw)
            .map_err(|e| rusqlite::Error::InvalidColumnName(e.to_string()))?,
        progress: row.get(5)?,
        error: row.get(6)?,
        model_unit: row.get(7)?,
        reference_point,
        created_at: parse_timestamp(&created_raw)?,
        updated_at: parse_timestamp(&updated_raw)?,
    })
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::InvalidColumnName(format!("bad timestamp '{raw}': {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
