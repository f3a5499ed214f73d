//! Geodetic calibration for SiteLink.
//!
//! Maps raw GPS fixes into a model's local coordinate frame using a single
//! operator-set reference point ([`calibrate`]) and resolves a model's stored
//! unit label to a meters→model-unit multiplier ([`units`]).
//!
//! Everything in this crate is a pure function: no I/O, no state, no clock.

pub mod calibrate;
pub mod units;

pub use calibrate::{METERS_PER_DEGREE_LAT, meters_per_degree_lon, to_model_space};
pub use units::resolve_scale;
