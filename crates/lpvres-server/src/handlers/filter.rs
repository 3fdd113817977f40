use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use lpvres_predicate::{ExtenderArgs, ExtenderFilterResult};
use std::sync::Arc;
use tracing::warn;

/// POST /filter/lpvReservedResource
///
/// Always answers 200: the scheduler expects failures in the `error` field
/// of the result, including bodies that cannot be decoded.
pub async fn filter(State(state): State<Arc<AppState>>, body: Bytes) -> Json<ExtenderFilterResult> {
    let args: ExtenderArgs = match serde_json::from_slice(&body) {
        Ok(args) => args,
        Err(e) => {
            warn!("Failed to decode filter request body: {}", e);
            return Json(ExtenderFilterResult::from_error(format!(
                "failed to decode request body: {}",
                e
            )));
        }
    };

    if args.candidate_node_names().is_empty() {
        return Json(ExtenderFilterResult::empty());
    }

    if !state.cache.has_synced() {
        warn!("Rejecting filter request before the first cache sync");
        return Json(ExtenderFilterResult::from_error(
            "cluster cache has not synced yet",
        ));
    }

    let snapshot = state.cache.current();
    Json(state.engine.filter(snapshot.as_ref(), &args))
}
