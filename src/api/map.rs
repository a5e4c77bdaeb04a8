// Map payload endpoint

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{domain::MapPayload, maps::ConfigProvider};

/// GET /api/map
///
/// Only reached once the rate limit middleware has admitted the request.
#[tracing::instrument(skip(provider))]
pub async fn get_map(State(provider): State<Arc<ConfigProvider>>) -> Json<MapPayload> {
    let payload = provider.payload();

    tracing::info!(locations = payload.locations.len(), "Serving map payload");

    Json(payload)
}
