use super::ApiResult;
use crate::auth::Identity;
use crate::http::{ApiResponse, AppState, Params};
use crate::services::admin::{
    self, AppointmentListFilter, DoctorListFilter, PatientListFilter, Verification,
};
use crate::services::contact;
use crate::error::Error;
use axum::body::Bytes;
use axum::extract::{Path, State};

pub async fn stats(State(state): State<AppState>, identity: Identity) -> ApiResult {
    let stats = admin::stats(state.store.as_ref(), &identity).await?;

    ApiResponse::data(&stats)
}

pub async fn doctors(
    State(state): State<AppState>,
    identity: Identity,
    Params(filter): Params<DoctorListFilter>,
) -> ApiResult {
    let doctors = admin::list_doctors(state.store.as_ref(), &identity, filter).await?;

    ApiResponse::data(&doctors)
}

pub async fn patients(
    State(state): State<AppState>,
    identity: Identity,
    Params(filter): Params<PatientListFilter>,
) -> ApiResult {
    let patients = admin::list_patients(state.store.as_ref(), &identity, filter).await?;

    ApiResponse::data(&patients)
}

pub async fn appointments(
    State(state): State<AppState>,
    identity: Identity,
    Params(filter): Params<AppointmentListFilter>,
) -> ApiResult {
    let appointments = admin::list_appointments(state.store.as_ref(), &identity, filter).await?;

    ApiResponse::data(&appointments)
}

pub async fn messages(State(state): State<AppState>, identity: Identity) -> ApiResult {
    let messages = contact::list(state.store.as_ref(), &identity).await?;

    ApiResponse::data(&messages)
}

///
/// An empty body verifies the doctor
///
pub async fn verify_doctor(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let verification = if body.is_empty() {
        Verification::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| Error::invalid_argument(err.to_string()))?
    };
    let verified = admin::verify_doctor(state.store.as_ref(), &identity, &id, verification).await?;

    let message = if verified {
        "Doctor verified successfully"
    } else {
        "Doctor verification revoked"
    };
    Ok(ApiResponse::ok().message(message))
}

pub async fn delete_user(State(state): State<AppState>, identity: Identity, Path(id): Path<String>) -> ApiResult {
    admin::delete_user(state.store.as_ref(), state.identity.as_ref(), &identity, &id).await?;

    Ok(ApiResponse::ok().message("User deleted successfully"))
}
