//! Model registry for SiteLink.
//!
//! One row per uploaded building model: file identity, translation status,
//! the model's native length unit, and the operator-set GPS↔model reference
//! point. Backed by a local SQLite database ([`store`]).
//!
//! The ingest path never touches the store directly – it consumes the narrow
//! async [`CalibrationSource`] trait ([`source`]), which also ships an
//! in-memory implementation for tests.

pub mod source;
pub mod store;

pub use source::{CalibrationSource, MemoryCalibrationSource, SqliteCalibrationSource};
pub use store::{ModelRecord, ModelStore, RegistryError, TranslationStatus};
