//! The narrow collaborator interface between the registry and the ingest
//! path.
//!
//! Ingest never sees the store or its schema – it asks a [`CalibrationSource`]
//! for one model's [`CalibrationConfig`] per call, which keeps the
//! ingest/calibration logic testable against [`MemoryCalibrationSource`]
//! without a database.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sitelink_types::CalibrationConfig;

use crate::store::{ModelStore, RegistryError};

/// Async lookup of a model's calibration inputs.
///
/// Implementations must treat every call as fresh: the registry is the
/// source of truth and may change between calls, so results are never cached
/// on this side of the boundary.
#[async_trait]
pub trait CalibrationSource: Send + Sync {
    /// Fetch the calibration config for `model_id`.
    ///
    /// Returns [`RegistryError::NotFound`] for unknown keys; any other error
    /// means the registry itself is unhealthy.
    async fn calibration_config(&self, model_id: &str) -> Result<CalibrationConfig, RegistryError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite-backed source
// ─────────────────────────────────────────────────────────────────────────────

/// [`CalibrationSource`] over a shared [`ModelStore`].
///
/// The store's connection is not `Sync`, so it sits behind a tokio mutex;
/// lookups are single indexed-row reads and hold the lock briefly.
#[derive(Clone)]
pub struct SqliteCalibrationSource {
    store: Arc<tokio::sync::Mutex<ModelStore>>,
}

impl SqliteCalibrationSource {
    pub fn new(store: Arc<tokio::sync::Mutex<ModelStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CalibrationSource for SqliteCalibrationSource {
    async fn calibration_config(&self, model_id: &str) -> Result<CalibrationConfig, RegistryError> {
        let store = self.store.lock().await;
        store.calibration_config(model_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory source
// ─────────────────────────────────────────────────────────────────────────────

/// HashMap-backed [`CalibrationSource`] for tests and demos.
///
/// Counts lookups so tests can assert that rejected reports never reach the
/// registry.
#[derive(Default)]
pub struct MemoryCalibrationSource {
    models: std::sync::Mutex<HashMap<String, CalibrationConfig>>,
    lookups: AtomicUsize,
}

impl MemoryCalibrationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a model's calibration config.
    pub fn insert(&self, model_id: &str, config: CalibrationConfig) {
        self.models
            .lock()
            .expect("calibration map poisoned")
            .insert(model_id.to_string(), config);
    }

    /// Number of `calibration_config` calls made so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalibrationSource for MemoryCalibrationSource {
    async fn calibration_config(&self, model_id: &str) -> Result<CalibrationConfig, RegistryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.models
            .lock()
            .expect("calibration map poisoned")
            .get(model_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(model_id.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sitelink_types::{GpsFix, ModelPoint, ReferencePoint};

    fn configured() -> CalibrationConfig {
        CalibrationConfig {
            unit_label: Some("mm".to_string()),
            reference_point: Some(ReferencePoint {
                gps: GpsFix {
                    lat: 46.9,
                    lon: -96.8,
                    elev: 300.0,
                },
                model: ModelPoint {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                },
            }),
        }
    }

    #[tokio::test]
    async fn memory_source_returns_inserted_config() {
        let source = MemoryCalibrationSource::new();
        source.insert("model-1", configured());

        let cfg = source.calibration_config("model-1").await.unwrap();
        assert_eq!(cfg.unit_label.as_deref(), Some("mm"));
        assert_eq!(source.lookup_count(), 1);
    }

    #[tokio::test]
    async fn memory_source_unknown_model_is_not_found() {
        let source = MemoryCalibrationSource::new();
        assert!(matches!(
            source.calibration_config("ghost").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sqlite_source_reads_live_store_state() {
        let store = ModelStore::open_in_memory().unwrap();
        let record = store.insert("tower.rvt", "obj-1", "urn-1").unwrap();
        let store = Arc::new(tokio::sync::Mutex::new(store));
        let source = SqliteCalibrationSource::new(Arc::clone(&store));

        // Unset before the operator acts.
        let cfg = source.calibration_config(&record.id).await.unwrap();
        assert!(cfg.reference_point.is_none());

        // A registry update is visible on the very next lookup: nothing is
        // cached on the source side.
        {
            let store = store.lock().await;
            store.set_unit(&record.id, "mm").unwrap();
        }
        let cfg = source.calibration_config(&record.id).await.unwrap();
        assert_eq!(cfg.unit_label.as_deref(), Some("mm"));
    }
}
