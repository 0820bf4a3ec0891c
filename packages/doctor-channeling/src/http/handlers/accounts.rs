use super::ApiResult;
use crate::auth::Identity;
use crate::http::{ApiResponse, AppState, Body};
use crate::services::accounts::{self, Credentials, ProfileUpdate, Registration, RoleAssignment};
use axum::extract::State;

pub async fn register(State(state): State<AppState>, Body(registration): Body<Registration>) -> ApiResult {
    let signed_in =
        accounts::register(state.store.as_ref(), state.identity.as_ref(), registration).await?;

    Ok(ApiResponse::data(&signed_in)?
        .message("Account created successfully")
        .created())
}

pub async fn login(State(state): State<AppState>, Body(credentials): Body<Credentials>) -> ApiResult {
    let signed_in =
        accounts::sign_in(state.store.as_ref(), state.identity.as_ref(), credentials).await?;

    ApiResponse::data(&signed_in)
}

pub async fn me(State(state): State<AppState>, identity: Identity) -> ApiResult {
    let user = accounts::me(state.store.as_ref(), &identity).await?;

    let mut data = serde_json::to_value(&user)?;
    if let Some(object) = data.as_object_mut() {
        object.insert("uid".to_string(), user.id.clone().into());
    }
    ApiResponse::data(&data)
}

pub async fn update_me(
    State(state): State<AppState>,
    identity: Identity,
    Body(update): Body<ProfileUpdate>,
) -> ApiResult {
    let user = accounts::update_me(state.store.as_ref(), &identity, update).await?;

    Ok(ApiResponse::data(&user)?.message("Profile updated successfully"))
}

pub async fn set_role(
    State(state): State<AppState>,
    identity: Identity,
    Body(assignment): Body<RoleAssignment>,
) -> ApiResult {
    let role = accounts::set_role(
        state.store.as_ref(),
        state.identity.as_ref(),
        &identity,
        assignment,
    )
    .await?;

    Ok(ApiResponse::ok().message(format!("Role set to {role} successfully")))
}
