use super::ApiResult;
use crate::auth::Identity;
use crate::http::{ApiResponse, AppState, Body, Params};
use crate::models::Schedule;
use crate::services::directory::{self, DoctorFilter, DoctorProfileUpdate, NewReview};
use axum::extract::{Path, State};

pub async fn list(State(state): State<AppState>, Params(filter): Params<DoctorFilter>) -> ApiResult {
    let page = directory::list_doctors(state.store.as_ref(), filter).await?;

    ApiResponse::data(&page.doctors)?.with("pagination", &page.pagination)
}

pub async fn detail(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let doctor = directory::get_doctor(state.store.as_ref(), &id).await?;

    ApiResponse::data(&doctor)
}

pub async fn update_profile(
    State(state): State<AppState>,
    identity: Identity,
    Body(update): Body<DoctorProfileUpdate>,
) -> ApiResult {
    directory::update_profile(state.store.as_ref(), &identity, update).await?;

    Ok(ApiResponse::ok().message("Doctor profile updated successfully"))
}

pub async fn set_schedule(
    State(state): State<AppState>,
    identity: Identity,
    Body(schedule): Body<Schedule>,
) -> ApiResult {
    directory::set_schedule(state.store.as_ref(), &identity, schedule).await?;

    Ok(ApiResponse::ok().message("Schedule updated successfully"))
}

pub async fn schedule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let schedule = directory::get_schedule(state.store.as_ref(), &id).await?;

    ApiResponse::data(&schedule)
}

pub async fn add_review(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Body(review): Body<NewReview>,
) -> ApiResult {
    let review = directory::add_review(state.store.as_ref(), &identity, &id, review).await?;

    Ok(ApiResponse::data(&review)?
        .message("Review added successfully")
        .created())
}
