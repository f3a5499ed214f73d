//! Sensor-report ingest for SiteLink.
//!
//! Turns a raw inbound sensor report into a canonical, broadcast-ready
//! [`sitelink_types::PoseEvent`]: classifies the report (GPS form vs. model
//! form), calibrates GPS fixes into the target model's frame, and routes the
//! actor identity to its visual asset.

pub mod pipeline;
pub mod router;

pub use pipeline::{DEFAULT_ACTOR_ID, IngestPipeline, SensorReport};
pub use router::ActorRouter;
