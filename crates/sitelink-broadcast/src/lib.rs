//! Live pose fan-out for SiteLink.
//!
//! [`PoseHub`] distributes every accepted pose event to all currently
//! connected viewer subscribers without letting any single subscriber slow
//! down publication or the ingest path.

pub mod hub;

pub use hub::{DEFAULT_CAPACITY, PoseHub, PoseReceiver};
