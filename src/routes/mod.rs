use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod activity;
pub mod auth;
pub mod health;
pub mod milestones;
pub mod payments;
pub mod projects;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let projects_routes = Router::new()
        .route("/", get(projects::list_my_projects))
        .route("/accept/:proposal_id", post(projects::accept_proposal))
        .route("/activity/recent", get(activity::my_recent_activity))
        .route("/:id", get(projects::get_project))
        .route("/:id/progress", get(projects::get_progress))
        .route("/:id/status", put(projects::update_status))
        .route("/:id/submit-for-review", post(projects::submit_for_review))
        .route("/:id/request-revision", post(projects::request_revision))
        .route("/:id/complete", post(projects::complete_project))
        .route("/:id/cancel", post(projects::cancel_project))
        .route("/:id/hold", post(projects::put_on_hold))
        .route("/:id/resume", post(projects::resume_project))
        .route("/:id/activity", get(activity::project_activity))
        .route(
            "/:id/activity/summary",
            get(activity::project_activity_summary),
        )
        .route(
            "/:id/milestones",
            get(milestones::list_project_milestones).post(milestones::create_milestone),
        )
        .route(
            "/:id/milestones/defaults",
            post(milestones::create_default_milestones),
        )
        .route("/:id/milestones/reorder", put(milestones::reorder_milestones));

    let milestones_routes = Router::new()
        .route("/overdue", get(milestones::overdue_milestones))
        .route("/upcoming", get(milestones::upcoming_milestones))
        .route(
            "/:id",
            get(milestones::get_milestone)
                .put(milestones::update_milestone)
                .delete(milestones::delete_milestone),
        )
        .route("/:id/complete", post(milestones::complete_milestone));

    let payments_routes = Router::new()
        .route("/", post(payments::create_payment))
        .route("/my", get(payments::my_payments))
        .route("/stats", get(payments::payment_stats))
        .route("/wallet", get(payments::wallet_balance))
        .route("/wallet/transactions", get(payments::wallet_history))
        .route("/wallet/add-funds", post(payments::add_funds))
        .route("/project/:id", get(payments::project_payments))
        .route("/:id", get(payments::get_payment))
        .route("/:id/process", post(payments::process_payment))
        .route("/:id/refund", post(payments::refund_payment));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/projects", projects_routes)
        .nest("/api/milestones", milestones_routes)
        .nest("/api/payments", payments_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
}
