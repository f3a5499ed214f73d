//! Actor identity → visual asset routing.
//!
//! Actor ids follow a naming convention: the token before the first `_`
//! names the actor class (`excavator_7` → `excavator`), and each class maps
//! to a glTF asset at `/models/<class>.glb`. Ids that don't fit the
//! convention render as the generic worker avatar.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// Class used when an actor id carries no usable class token.
pub const FALLBACK_CLASS: &str = "worker";

/// Deterministic, memoizing actor→asset resolver.
///
/// The route cache is populated on first sight of an actor id and never
/// invalidated or evicted for the life of the process: the first resolution
/// for a given id is authoritative, even if a later report for the same id
/// would imply a different class. Constructed once at startup and shared by
/// handle; the memo table is the only state and sits behind a mutex.
#[derive(Debug, Default)]
pub struct ActorRouter {
    routes: Mutex<HashMap<String, String>>,
}

impl ActorRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the visual asset for `actor_id`.
    ///
    /// Total: every id resolves to *some* asset, falling back to the worker
    /// class for empty or malformed ids.
    pub fn resolve_asset(&self, actor_id: &str) -> String {
        let mut routes = self.routes.lock().expect("route cache poisoned");
        if let Some(asset) = routes.get(actor_id) {
            return asset.clone();
        }
        let asset = format!("/models/{}.glb", actor_class(actor_id));
        debug!(actor_id, %asset, "routed new actor");
        routes.insert(actor_id.to_string(), asset.clone());
        asset
    }

    /// Number of distinct actor ids routed so far.
    pub fn cached_routes(&self) -> usize {
        self.routes.lock().expect("route cache poisoned").len()
    }
}

/// Derive the actor class from an id.
///
/// The class is the token before the first `_`; an id without a separator is
/// its own class token. Empty tokens and tokens with non-alphanumeric
/// characters fall back to [`FALLBACK_CLASS`].
fn actor_class(actor_id: &str) -> String {
    let token = actor_id.trim().split('_').next().unwrap_or_default();
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return FALLBACK_CLASS.to_string();
    }
    token.to_ascii_lowercase()
}
