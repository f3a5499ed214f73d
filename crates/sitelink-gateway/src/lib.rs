//! HTTP + WebSocket front door for SiteLink.
//!
//! One listener serves three kinds of traffic: sensor `POST`s into the ingest
//! pipeline, operator calibration `PUT`s into the model registry, and
//! WebSocket upgrades for viewer clients subscribing to the live pose stream.

pub mod server;

pub use server::{DEFAULT_PORT, GatewayError, GatewayServer, GatewayState};
