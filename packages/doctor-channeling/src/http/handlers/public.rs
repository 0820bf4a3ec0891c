use super::ApiResult;
use crate::http::{ApiResponse, AppState, Body};
use crate::services::contact::{self, ContactForm};
use crate::VERSION;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "OK",
        "message": "Doctor Channeling API is running",
        "timestamp": Utc::now(),
        "version": VERSION,
    }))
}

pub async fn submit_contact(State(state): State<AppState>, Body(form): Body<ContactForm>) -> ApiResult {
    let message = contact::submit(state.store.as_ref(), form).await?;

    Ok(ApiResponse::data(&message)?
        .message("Message sent successfully")
        .created())
}
