//! The pose ingest pipeline.
//!
//! One call per inbound sensor report, no cross-call state:
//!
//! 1. **Classify** – GPS form (`lat`/`lon`/`elev`) or model form
//!    (`x`/`y`/`z`); anything else is rejected before any registry traffic.
//! 2. **GPS path** – fetch the model's calibration config through the
//!    [`CalibrationSource`] (bounded by the configured timeout), resolve the
//!    unit scale, calibrate into model space.
//! 3. **Model path** – coordinates pass through verbatim.
//! 4. **Finalize** – default the actor id, route the visual asset, stamp the
//!    timestamp, attach the source type and (GPS path) the original fix.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sitelink_geo::{resolve_scale, to_model_space};
use sitelink_registry::{CalibrationSource, RegistryError};
use sitelink_types::{GpsFix, IngestError, ModelPoint, PoseEvent, SourceType};
use tracing::{debug, instrument};

use crate::router::ActorRouter;

/// Actor id assumed when a report doesn't carry one.
pub const DEFAULT_ACTOR_ID: &str = "worker_1";

/// A raw inbound sensor report, as posted to the ingest endpoint.
///
/// Either the GPS triple or the model triple must be fully present; partial
/// triples are malformed. Extra fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReport {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub elev: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    /// Registry key of the target model; required for GPS-form reports.
    pub model_id: Option<String>,
    pub actor_id: Option<String>,
    /// Heading in degrees; defaults to 0.
    pub rotation: Option<f64>,
}

enum Classified {
    Gps(GpsFix),
    Model(ModelPoint),
}

/// Classify a report, GPS form first – a report carrying both triples is
/// treated as GPS.
fn classify(report: &SensorReport) -> Result<Classified, IngestError> {
    if let (Some(lat), Some(lon), Some(elev)) = (report.lat, report.lon, report.elev) {
        return Ok(Classified::Gps(GpsFix { lat, lon, elev }));
    }
    if let (Some(x), Some(y), Some(z)) = (report.x, report.y, report.z) {
        return Ok(Classified::Model(ModelPoint { x, y, z }));
    }
    Err(IngestError::MalformedInput)
}

/// Validates and normalizes sensor reports into canonical pose events.
///
/// Stateless apart from the router's memo table; one instance is built at
/// startup and shared across all concurrent ingest requests.
pub struct IngestPipeline {
    source: Arc<dyn CalibrationSource>,
    router: ActorRouter,
    lookup_timeout: Duration,
}

impl IngestPipeline {
    pub fn new(source: Arc<dyn CalibrationSource>, lookup_timeout: Duration) -> Self {
        Self {
            source,
            router: ActorRouter::new(),
            lookup_timeout,
        }
    }

    /// Process one sensor report into a broadcast-ready [`PoseEvent`].
    ///
    /// The registry lookup is the only suspending call; dropping the returned
    /// future (an aborted request) cancels an in-flight lookup.
    #[instrument(skip(self, report), fields(actor_id = report.actor_id.as_deref()))]
    pub async fn ingest(&self, report: SensorReport) -> Result<PoseEvent, IngestError> {
        let position;
        let source_type;
        let gps_origin;

        match classify(&report)? {
            Classified::Gps(fix) => {
                let model_id = report
                    .model_id
                    .as_deref()
                    .ok_or(IngestError::MissingModelReference)?;
                let config = self.lookup_config(model_id).await?;
                let reference = config
                    .reference_point
                    .ok_or(IngestError::ReferencePointNotConfigured)?;
                let scale = resolve_scale(config.unit_label.as_deref());
                position = to_model_space(&fix, scale, &reference);
                source_type = SourceType::Gps;
                gps_origin = Some(fix);
                debug!(model_id, scale, "calibrated GPS fix into model space");
            }
            Classified::Model(point) => {
                position = point;
                source_type = SourceType::Model;
                gps_origin = None;
            }
        }

        let actor_id = report
            .actor_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_ACTOR_ID.to_string());
        let asset = self.router.resolve_asset(&actor_id);

        Ok(PoseEvent::new(
            actor_id,
            asset,
            position,
            report.rotation.unwrap_or(0.0),
            source_type,
            gps_origin,
        ))
    }

    async fn lookup_config(
        &self,
        model_id: &str,
    ) -> Result<sitelink_types::CalibrationConfig, IngestError> {
        let lookup = self.source.calibration_config(model_id);
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(config)) => Ok(config),
            // An absent model row and a row without reference columns are the
            // same operator problem: the model isn't calibrated yet.
            Ok(Err(RegistryError::NotFound(_))) => Err(IngestError::ReferencePointNotConfigured),
            Ok(Err(other)) => Err(IngestError::ConfigLookupFailed(other.to_string())),
            Err(_) => Err(IngestError::ConfigLookupFailed(format!(
                "registry lookup timed out after {:?}",
                self.lookup_timeout
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sitelink_registry::MemoryCalibrationSource;
    use sitelink_types::{CalibrationConfig, ReferencePoint};

    const LOOKUP_TIMEOUT: Duration = Duration::from_millis(200);

    fn fargo_config(unit: Option<&str>) -> CalibrationConfig {
        CalibrationConfig {
            unit_label: unit.map(str::to_string),
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

    fn pipeline_with(source: MemoryCalibrationSource) -> (IngestPipeline, Arc<MemoryCalibrationSource>) {
        let source = Arc::new(source);
        (
            IngestPipeline::new(Arc::clone(&source) as Arc<dyn CalibrationSource>, LOOKUP_TIMEOUT),
            source,
        )
    }

    fn gps_report(model_id: Option<&str>) -> SensorReport {
        SensorReport {
            lat: Some(46.9009),
            lon: Some(-96.8),
            elev: Some(300.0),
            model_id: model_id.map(str::to_string),
            ..SensorReport::default()
        }
    }

    #[test]
    fn sensor_report_parses_camel_case_wire_keys() {
        let report: SensorReport = serde_json::from_str(
            r#"{"lat":46.9,"lon":-96.8,"elev":300,"modelId":"m-1","actorId":"truck_5","rotation":90}"#,
        )
        .unwrap();
        assert_eq!(report.model_id.as_deref(), Some("m-1"));
        assert_eq!(report.actor_id.as_deref(), Some("truck_5"));
        assert_eq!(report.rotation, Some(90.0));
    }

    #[tokio::test]
    async fn empty_report_is_malformed_and_never_hits_the_registry() {
        let (pipeline, source) = pipeline_with(MemoryCalibrationSource::new());

        let err = pipeline.ingest(SensorReport::default()).await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput));
        assert_eq!(source.lookup_count(), 0);
    }

    #[tokio::test]
    async fn partial_triples_are_malformed() {
        let (pipeline, source) = pipeline_with(MemoryCalibrationSource::new());

        let report = SensorReport {
            lat: Some(46.9),
            x: Some(1.0),
            y: Some(2.0),
            ..SensorReport::default()
        };
        let err = pipeline.ingest(report).await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput));
        assert_eq!(source.lookup_count(), 0);
    }

    #[tokio::test]
    async fn gps_without_model_id_is_missing_model_reference() {
        let (pipeline, source) = pipeline_with(MemoryCalibrationSource::new());

        let err = pipeline.ingest(gps_report(None)).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingModelReference));
        assert_eq!(source.lookup_count(), 0);
    }

    #[tokio::test]
    async fn unknown_model_reads_as_unconfigured_reference() {
        let (pipeline, _) = pipeline_with(MemoryCalibrationSource::new());

        let err = pipeline.ingest(gps_report(Some("ghost"))).await.unwrap_err();
        assert!(matches!(err, IngestError::ReferencePointNotConfigured));
    }

    #[tokio::test]
    async fn unset_reference_point_fails_closed() {
        let source = MemoryCalibrationSource::new();
        source.insert(
            "m-1",
            CalibrationConfig {
                unit_label: Some("mm".to_string()),
                reference_point: None,
            },
        );
        let (pipeline, _) = pipeline_with(source);

        let err = pipeline.ingest(gps_report(Some("m-1"))).await.unwrap_err();
        assert!(matches!(err, IngestError::ReferencePointNotConfigured));
    }

    #[tokio::test]
    async fn gps_fix_is_calibrated_into_model_units() {
        // Δlat = 0.0009° → 99.9 m → 99 900 mm.
        let source = MemoryCalibrationSource::new();
        source.insert("m-1", fargo_config(Some("mm")));
        let (pipeline, _) = pipeline_with(source);

        let event = pipeline.ingest(gps_report(Some("m-1"))).await.unwrap();
        assert!((event.y - 99_900.0).abs() < 1.0, "y={}", event.y);
        assert!(event.x.abs() < 1.0);
        assert!(event.z.abs() < 1e-6);
        assert_eq!(event.source_type, SourceType::Gps);
        let origin = event.gps_origin.expect("GPS origin attached");
        assert!((origin.lat - 46.9009).abs() < 1e-12);
    }

    #[tokio::test]
    async fn absent_unit_label_defaults_to_meters() {
        let source = MemoryCalibrationSource::new();
        source.insert("m-1", fargo_config(None));
        let (pipeline, _) = pipeline_with(source);

        let event = pipeline.ingest(gps_report(Some("m-1"))).await.unwrap();
        assert!((event.y - 99.9).abs() < 0.001, "y={}", event.y);
    }

    #[tokio::test]
    async fn model_form_passes_through_verbatim() {
        let (pipeline, source) = pipeline_with(MemoryCalibrationSource::new());

        let report = SensorReport {
            x: Some(1.0),
            y: Some(2.0),
            z: Some(3.0),
            actor_id: Some("truck_5".to_string()),
            ..SensorReport::default()
        };
        let event = pipeline.ingest(report).await.unwrap();
        assert_eq!(event.source_type, SourceType::Model);
        assert_eq!((event.x, event.y, event.z), (1.0, 2.0, 3.0));
        assert_eq!(event.model_asset_ref, "/models/truck.glb");
        assert!(event.gps_origin.is_none());
        // Model form needs no calibration.
        assert_eq!(source.lookup_count(), 0);
    }

    #[tokio::test]
    async fn actor_id_defaults_to_worker_1() {
        let (pipeline, _) = pipeline_with(MemoryCalibrationSource::new());

        let report = SensorReport {
            x: Some(0.0),
            y: Some(0.0),
            z: Some(0.0),
            ..SensorReport::default()
        };
        let event = pipeline.ingest(report).await.unwrap();
        assert_eq!(event.actor_id, DEFAULT_ACTOR_ID);
        assert_eq!(event.model_asset_ref, "/models/worker.glb");
        assert_eq!(event.rotation_deg, 0.0);
    }

    #[tokio::test]
    async fn rotation_passes_through_when_present() {
        let (pipeline, _) = pipeline_with(MemoryCalibrationSource::new());

        let report = SensorReport {
            x: Some(0.0),
            y: Some(0.0),
            z: Some(0.0),
            rotation: Some(270.0),
            ..SensorReport::default()
        };
        let event = pipeline.ingest(report).await.unwrap();
        assert_eq!(event.rotation_deg, 270.0);
    }

    // ── Registry failure modes ──────────────────────────────────────────────

    struct SlowSource;

    #[async_trait]
    impl CalibrationSource for SlowSource {
        async fn calibration_config(
            &self,
            _model_id: &str,
        ) -> Result<CalibrationConfig, RegistryError> {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok(CalibrationConfig::default())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl CalibrationSource for BrokenSource {
        async fn calibration_config(
            &self,
            _model_id: &str,
        ) -> Result<CalibrationConfig, RegistryError> {
            Err(RegistryError::InvalidRecord("corrupt row".to_string()))
        }
    }

    #[tokio::test]
    async fn slow_registry_times_out_as_config_lookup_failed() {
        let pipeline = IngestPipeline::new(Arc::new(SlowSource), Duration::from_millis(20));

        let err = pipeline.ingest(gps_report(Some("m-1"))).await.unwrap_err();
        match err {
            IngestError::ConfigLookupFailed(detail) => {
                assert!(detail.contains("timed out"), "detail: {detail}")
            }
            other => panic!("expected ConfigLookupFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn registry_error_surfaces_as_config_lookup_failed() {
        let pipeline = IngestPipeline::new(Arc::new(BrokenSource), LOOKUP_TIMEOUT);

        let err = pipeline.ingest(gps_report(Some("m-1"))).await.unwrap_err();
        match err {
            IngestError::ConfigLookupFailed(detail) => {
                assert!(detail.contains("corrupt row"), "detail: {detail}")
            }
            other => panic!("expected ConfigLookupFailed, got {other:?}"),
        }
    }
}
