use std::sync::Arc;

use crate::{audit_types::AuditTypeRegistry, config::Config};
use axum::extract::FromRef;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub registry: Arc<AuditTypeRegistry>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self {
            pool,
            config,
            registry: Arc::new(AuditTypeRegistry::builtin()),
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<AuditTypeRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}
