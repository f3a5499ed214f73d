//! Tangent-plane GPS → model-space conversion.
//!
//! The reference point acts as the origin of a locally-flat approximation:
//! degree deltas from the reference become meter deltas, meter deltas become
//! model-unit deltas, and the result is offset by the reference's model-space
//! point.
//!
//! Axis mapping:
//!
//! | GPS | Model |
//! |---|---|
//! | Longitude (east) | X |
//! | Latitude (north) | Y |
//! | Elevation | Z |
//!
//! # Example
//!
//! ```rust
//! use sitelink_geo::calibrate::to_model_space;
//! use sitelink_types::{GpsFix, ModelPoint, ReferencePoint};
//!
//! let reference = ReferencePoint {
//!     gps: GpsFix { lat: 46.9, lon: -96.8, elev: 300.0 },
//!     model: ModelPoint { x: 0.0, y: 0.0, z: 0.0 },
//! };
//!
//! // 0.0009° north of the reference, model in millimeters.
//! let fix = GpsFix { lat: 46.9009, lon: -96.8, elev: 300.0 };
//! let p = to_model_space(&fix, 1000.0, &reference);
//! assert!((p.y - 99_900.0).abs() < 1.0);
//! ```

use sitelink_types::{GpsFix, ModelPoint, ReferencePoint};

/// Meters in one degree of latitude. Treated as constant over the globe;
/// fine at building scale.
pub const METERS_PER_DEGREE_LAT: f64 = 111_000.0;

/// Meters in one degree of longitude at the given latitude.
///
/// Evaluated at the *incoming fix's* latitude, not the reference point's.
/// On sites spanning more than a few hundred meters this introduces a
/// latitude-dependent skew; the behavior is kept because changing it would
/// shift numeric output for every existing calibration. Degrades near the
/// poles (cos → 0), which building-scale deployments never reach.
pub fn meters_per_degree_lon(latitude_deg: f64) -> f64 {
    METERS_PER_DEGREE_LAT * latitude_deg.to_radians().cos()
}

/// Convert a GPS fix to model coordinates.
///
/// `unit_scale` is the meters→model-unit multiplier (1000 for mm, 1 for m,
/// 3.28084 for ft). The reference point is required by signature: callers
/// holding only an optional reference must fail closed before getting here –
/// calibration never silently defaults to an arbitrary origin.
///
/// Closed-form and deterministic: no iteration, no trigonometric inverse.
pub fn to_model_space(fix: &GpsFix, unit_scale: f64, reference: &ReferencePoint) -> ModelPoint {
    let delta_lat = fix.lat - reference.gps.lat;
    let delta_lon = fix.lon - reference.gps.lon;
    let delta_elev = fix.elev - reference.gps.elev; // both in meters

    let delta_x_meters = delta_lon * meters_per_degree_lon(fix.lat);
    let delta_y_meters = delta_lat * METERS_PER_DEGREE_LAT;
    let delta_z_meters = delta_elev;

    ModelPoint {
        x: reference.model.x + delta_x_meters * unit_scale,
        y: reference.model.y + delta_y_meters * unit_scale,
        z: reference.model.z + delta_z_meters * unit_scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fargo_reference() -> ReferencePoint {
        ReferencePoint {
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
        }
    }

    #[test]
    fn reference_point_maps_to_itself() {
        let reference = fargo_reference();
        for scale in [1.0, 100.0, 1000.0, 3.28084] {
            let p = to_model_space(&reference.gps, scale, &reference);
            assert!(p.x.abs() < 1e-9, "x={} at scale {scale}", p.x);
            assert!(p.y.abs() < 1e-9, "y={} at scale {scale}", p.y);
            assert!(p.z.abs() < 1e-9, "z={} at scale {scale}", p.z);
        }
    }

    #[test]
    fn reference_with_nonzero_model_origin_maps_to_that_origin() {
        let reference = ReferencePoint {
            gps: GpsFix {
                lat: 46.9,
                lon: -96.8,
                elev: 300.0,
            },
            model: ModelPoint {
                x: -4544.3,
                y: 8019.0,
                z: 1000.0,
            },
        };
        let p = to_model_space(&reference.gps, 1000.0, &reference);
        assert!((p.x - -4544.3).abs() < 1e-9);
        assert!((p.y - 8019.0).abs() < 1e-9);
        assert!((p.z - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn northward_delta_lands_on_y_in_model_units() {
        // Δlat = 0.0009° → 99.9 m → 99 900 mm.
        let reference = fargo_reference();
        let fix = GpsFix {
            lat: 46.9009,
            lon: -96.8,
            elev: 300.0,
        };
        let p = to_model_space(&fix, 1000.0, &reference);
        assert!((p.y - 99_900.0).abs() < 1.0, "y={}", p.y);
        assert!(p.x.abs() < 1.0, "x={}", p.x);
        assert!(p.z.abs() < 1e-6, "z={}", p.z);
    }

    #[test]
    fn eastward_delta_lands_on_x_scaled_by_cos_lat() {
        let reference = fargo_reference();
        let fix = GpsFix {
            lat: 46.9,
            lon: -96.799,
            elev: 300.0,
        };
        let p = to_model_space(&fix, 1.0, &reference);
        let expected = 0.001 * meters_per_degree_lon(46.9);
        assert!((p.x - expected).abs() < 1e-6, "x={} expected={expected}", p.x);
        assert!(p.y.abs() < 1e-6);
    }

    #[test]
    fn elevation_delta_lands_on_z() {
        let reference = fargo_reference();
        let fix = GpsFix {
            lat: 46.9,
            lon: -96.8,
            elev: 302.5,
        };
        let p = to_model_space(&fix, 1000.0, &reference);
        assert!((p.z - 2500.0).abs() < 1e-6, "z={}", p.z);
    }

    #[test]
    fn conversion_is_locally_affine_in_lat_deltas() {
        // Doubling Δlat doubles the model-space Y delta. Longitude is held at
        // the reference so the cos(lat) term cannot bend the comparison.
        let reference = fargo_reference();
        let single = GpsFix {
            lat: 46.9 + 0.0004,
            lon: -96.8,
            elev: 300.0,
        };
        let double = GpsFix {
            lat: 46.9 + 0.0008,
            lon: -96.8,
            elev: 300.0,
        };
        let p1 = to_model_space(&single, 1.0, &reference);
        let p2 = to_model_space(&double, 1.0, &reference);
        assert!((p2.y - 2.0 * p1.y).abs() < 1e-6);
    }

    #[test]
    fn lon_scale_uses_fix_latitude_not_reference_latitude() {
        // Two fixes with the same Δlon but different latitudes must produce
        // different X deltas, because the meters-per-degree-longitude factor
        // is evaluated at each fix's own latitude.
        let reference = fargo_reference();
        let near = GpsFix {
            lat: 46.9,
            lon: -96.79,
            elev: 300.0,
        };
        let far_north = GpsFix {
            lat: 60.0,
            lon: -96.79,
            elev: 300.0,
        };
        let px_near = to_model_space(&near, 1.0, &reference).x;
        let px_north = to_model_space(&far_north, 1.0, &reference).x;
        assert!(
            (px_near - px_north).abs() > 1.0,
            "expected latitude-dependent X: near={px_near} north={px_north}"
        );
        let expected_north = 0.01 * meters_per_degree_lon(60.0);
        assert!((px_north - expected_north).abs() < 1e-6);
    }

    #[test]
    fn meters_per_degree_lon_shrinks_with_latitude() {
        assert!((meters_per_degree_lon(0.0) - METERS_PER_DEGREE_LAT).abs() < 1e-9);
        assert!(meters_per_degree_lon(46.9) < meters_per_degree_lon(10.0));
        assert!(meters_per_degree_lon(89.9) < 500.0);
    }
}
