use super::ApiResult;
use crate::auth::Identity;
use crate::http::{ApiResponse, AppState, Params};
use crate::services::patients::{self, RosterFilter};
use axum::extract::{Path, State};

pub async fn roster(
    State(state): State<AppState>,
    identity: Identity,
    Params(filter): Params<RosterFilter>,
) -> ApiResult {
    let roster = patients::roster(state.store.as_ref(), &identity, filter).await?;

    ApiResponse::data(&roster.patients)?.with("total", &roster.total)
}

pub async fn history(State(state): State<AppState>, identity: Identity, Path(id): Path<String>) -> ApiResult {
    let history = patients::history(state.store.as_ref(), &identity, &id).await?;

    ApiResponse::data(&history)
}
