// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{areas, assignments, audit_responses, audit_templates, auth, companies, users},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// * Public auth routes, member routes behind `auth_middleware`, and
///   `/api/admin` behind both auth and admin checks.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, audit type registry).
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let member_routes = Router::new()
        .route(
            "/users/me",
            get(users::me).patch(users::update_me).delete(users::delete_me),
        )
        .route("/users/me/password", patch(users::change_password))
        .route("/audit-types", get(audit_templates::list_audit_types))
        .route("/audit-templates", get(audit_templates::list_templates))
        .route("/audit-templates/{id}", get(audit_templates::get_template))
        .route(
            "/audit-templates/{id}/questions",
            get(audit_templates::list_template_questions),
        )
        .route(
            "/audit-templates/{id}/questions/{question_id}",
            get(audit_templates::get_template_question),
        )
        .route("/companies/{id}", get(companies::get_company))
        .route("/companies/{id}/areas", get(areas::list_company_areas))
        .route("/areas/{id}", get(areas::get_area))
        .route("/audit-assignments", get(assignments::list_assignments))
        .route(
            "/audit-assignments/company/{company_id}",
            get(assignments::list_company_assignments),
        )
        .route("/audit-assignments/{id}", get(assignments::get_assignment))
        .route(
            "/audit-assignments/{id}/questions",
            get(assignments::list_assignment_questions),
        )
        .route(
            "/audit-assignments/{id}/questions/{question_id}",
            get(assignments::get_assigned_question),
        )
        .route(
            "/audit-assignments/{id}/responses",
            get(audit_responses::list_responses).post(audit_responses::create_response),
        )
        .route(
            "/audit-assignments/{id}/responses/{response_id}",
            get(audit_responses::get_response).put(audit_responses::update_response),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/users/{id}/areas/{area_id}",
            post(users::assign_area).delete(users::unassign_area),
        )
        .route(
            "/companies",
            get(companies::list_companies).post(companies::create_company),
        )
        .route(
            "/companies/{id}",
            put(companies::update_company).delete(companies::delete_company),
        )
        .route("/companies/{id}/areas", post(areas::create_area))
        .route("/areas/{id}", put(areas::update_area).delete(areas::delete_area))
        .route("/audit-templates", post(audit_templates::create_template))
        .route(
            "/audit-templates/{id}",
            put(audit_templates::update_template).delete(audit_templates::delete_template),
        )
        .route(
            "/audit-templates/{id}/questions",
            post(audit_templates::create_question),
        )
        .route(
            "/audit-templates/{id}/questions/{question_id}",
            put(audit_templates::update_question).delete(audit_templates::delete_question),
        )
        .route(
            "/audit-assignments",
            get(assignments::list_all_assignments).post(assignments::create_assignment),
        )
        .route(
            "/audit-assignments/{id}",
            put(assignments::update_assignment).delete(assignments::delete_assignment),
        )
        .route(
            "/audit-assignments/{id}/questions/{question_id}",
            put(assignments::update_assigned_question)
                .delete(assignments::delete_assigned_question),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api", member_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_origins)),
        )
        .with_state(state)
}
