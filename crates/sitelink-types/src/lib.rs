use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A raw GPS fix: WGS-84 latitude/longitude in decimal degrees, elevation in
/// meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    pub elev: f64,
}

/// A point in a model's local coordinate frame, expressed in the model's
/// native length unit (mm, ft, ... – whatever the registry records).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Calibration pair binding one GPS fix to one model-space point.
///
/// Acts as the origin of the tangent-plane GPS→model conversion. Both
/// sub-points are fully populated by construction; a model without a usable
/// pair carries `None` in [`CalibrationConfig::reference_point`] instead.
/// Set only by an explicit operator action, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub gps: GpsFix,
    pub model: ModelPoint,
}

/// Per-model calibration inputs, fetched from the registry on every GPS-form
/// ingest call. Transient: the registry is the source of truth and may change
/// between calls, so this is never cached.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Stored unit label (`"mm"`, `"ft"`, ...). `None` falls back to meters.
    pub unit_label: Option<String>,
    /// `None` when any of the six reference scalars is missing in the
    /// registry row; calibration fails closed in that case.
    pub reference_point: Option<ReferencePoint>,
}

/// Where a pose's coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Converted from a GPS fix via the model's reference point.
    Gps,
    /// Supplied directly in model coordinates.
    Model,
}

/// The normalized, broadcast-ready position/orientation record for one actor
/// at one instant.
///
/// Produced exactly once per accepted sensor report, immutable afterwards,
/// and never persisted – the last event per actor lives only in client-side
/// render state. Serialized as-is onto the WebSocket boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseEvent {
    pub actor_id: String,
    /// Visual asset the viewer should render for this actor,
    /// e.g. `"/models/excavator.glb"`.
    pub model_asset_ref: String,
    /// Milliseconds since the Unix epoch, stamped at ingest time.
    pub timestamp_ms: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rotation_deg: f64,
    pub source_type: SourceType,
    /// Original GPS triple for GPS-sourced poses, kept for observability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_origin: Option<GpsFix>,
}

impl PoseEvent {
    /// Build a pose event stamped with the current wall-clock time.
    pub fn new(
        actor_id: String,
        model_asset_ref: String,
        position: ModelPoint,
        rotation_deg: f64,
        source_type: SourceType,
        gps_origin: Option<GpsFix>,
    ) -> Self {
        Self {
            actor_id,
            model_asset_ref,
            timestamp_ms: Utc::now().timestamp_millis(),
            x: position.x,
            y: position.y,
            z: position.z,
            rotation_deg,
            source_type,
            gps_origin,
        }
    }
}

/// Failures on the sensor-ingest path.
///
/// The gateway converts each variant into a structured JSON error response;
/// nothing on this path is retried by the server (retry, if any, is a client
/// concern). The variants deliberately distinguish "fix your payload" from
/// "fix the configuration" from "retry later".
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Missing coordinates (provide either lat/lon/elev or x/y/z)")]
    MalformedInput,

    #[error("Missing modelId (required for GPS coordinates)")]
    MissingModelReference,

    #[error("Reference point not configured. Please set a reference point for this model first.")]
    ReferencePointNotConfigured,

    #[error("Failed to fetch model configuration: {0}")]
    ConfigLookupFailed(String),
}

impl IngestError {
    /// HTTP status the gateway responds with for this failure.
    ///
    /// Client/config errors are 400; a registry that is unreachable or timing
    /// out is transient and maps to 503 so sensors know to retry later.
    pub fn http_status(&self) -> u16 {
        match self {
            IngestError::MalformedInput
            | IngestError::MissingModelReference
            | IngestError::ReferencePointNotConfigured => 400,
            IngestError::ConfigLookupFailed(_) => 503,
        }
    }
}
