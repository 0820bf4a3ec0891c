use super::ApiResult;
use crate::auth::Identity;
use crate::http::{ApiResponse, AppState, Body, Params};
use crate::services::appointments::{self, AppointmentFilter, NewAppointment, NewPrescription};
use axum::extract::{Path, State};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    #[serde(default)]
    status: String,
}

pub async fn create(
    State(state): State<AppState>,
    identity: Identity,
    Body(request): Body<NewAppointment>,
) -> ApiResult {
    let appointment = appointments::create(state.store.as_ref(), &identity, request).await?;

    Ok(ApiResponse::data(&appointment)?
        .message("Appointment booked successfully")
        .created())
}

pub async fn list_mine(
    State(state): State<AppState>,
    identity: Identity,
    Params(filter): Params<AppointmentFilter>,
) -> ApiResult {
    let appointments = appointments::list_mine(state.store.as_ref(), &identity, filter).await?;

    ApiResponse::data(&appointments)
}

pub async fn get(State(state): State<AppState>, identity: Identity, Path(id): Path<String>) -> ApiResult {
    let appointment = appointments::get(state.store.as_ref(), &identity, &id).await?;

    ApiResponse::data(&appointment)
}

pub async fn update_status(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Body(change): Body<StatusChange>,
) -> ApiResult {
    let status =
        appointments::update_status(state.store.as_ref(), &identity, &id, &change.status).await?;

    Ok(ApiResponse::ok().message(format!("Appointment {status} successfully")))
}

pub async fn cancel(State(state): State<AppState>, identity: Identity, Path(id): Path<String>) -> ApiResult {
    appointments::cancel(state.store.as_ref(), &identity, &id).await?;

    Ok(ApiResponse::ok().message("Appointment cancelled successfully"))
}

pub async fn add_prescription(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Body(request): Body<NewPrescription>,
) -> ApiResult {
    let prescription =
        appointments::add_prescription(state.store.as_ref(), &identity, &id, request).await?;

    Ok(ApiResponse::data(&prescription)?
        .message("Prescription added successfully")
        .created())
}
