mod extract;
mod handlers;
mod response;

pub use extract::{Body, Params};
pub use response::{status_for, ApiResponse};

use crate::config::ServerConfig;
use crate::identity::IdentityProvider;
use crate::log::SERVER;
use crate::store::DocumentStore;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Response;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

///
/// Shared handles for request handlers
///
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        AppState { store, identity }
    }
}

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::public::health))
        .route("/contact", post(handlers::public::submit_contact))
        // Accounts
        .route("/auth/register", post(handlers::accounts::register))
        .route("/auth/login", post(handlers::accounts::login))
        .route(
            "/auth/me",
            get(handlers::accounts::me).put(handlers::accounts::update_me),
        )
        .route("/auth/set-role", post(handlers::accounts::set_role))
        // Directory
        .route("/doctors", get(handlers::directory::list))
        .route("/doctors/profile", put(handlers::directory::update_profile))
        .route("/doctors/schedule", put(handlers::directory::set_schedule))
        .route("/doctors/{id}", get(handlers::directory::detail))
        .route("/doctors/{id}/schedule", get(handlers::directory::schedule))
        .route("/doctors/{id}/reviews", post(handlers::directory::add_review))
        // Appointments
        .route("/appointments", post(handlers::appointments::create))
        .route("/appointments/my", get(handlers::appointments::list_mine))
        .route("/appointments/{id}", get(handlers::appointments::get))
        .route(
            "/appointments/{id}/status",
            put(handlers::appointments::update_status),
        )
        .route("/appointments/{id}/cancel", put(handlers::appointments::cancel))
        .route(
            "/appointments/{id}/prescription",
            post(handlers::appointments::add_prescription),
        )
        // Patients
        .route("/patients", get(handlers::patients::roster))
        .route("/patients/{id}/history", get(handlers::patients::history))
        // Admin
        .route("/admin/stats", get(handlers::admin::stats))
        .route("/admin/doctors", get(handlers::admin::doctors))
        .route("/admin/patients", get(handlers::admin::patients))
        .route("/admin/appointments", get(handlers::admin::appointments))
        .route("/admin/messages", get(handlers::admin::messages))
        .route("/admin/doctors/{id}/verify", put(handlers::admin::verify_doctor))
        .route("/admin/users/{id}", delete(handlers::admin::delete_user))
        .method_not_allowed_fallback(method_not_allowed);

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(cors(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> Response {
    response::failure(StatusCode::NOT_FOUND, "Endpoint not found")
}

async fn method_not_allowed() -> Response {
    response::failure(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

fn cors(config: &ServerConfig) -> CorsLayer {
    let origins = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(target: SERVER, msg = "Ignoring invalid CORS origin", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}
