// src/handlers/mod.rs

pub mod areas;
pub mod assignments;
pub mod audit_responses;
pub mod audit_templates;
pub mod auth;
pub mod companies;
pub mod users;
