use crate::gatherers::{GathererRegistry, GathererStatus};
use axum::{extract::Extension, response::Json};

/// Every known gatherer with its schedule and last outcome.
pub async fn gatherers(
    Extension(registry): Extension<GathererRegistry>,
) -> Json<Vec<GathererStatus>> {
    Json(registry.snapshot())
}
