//! REST control surface: scheduler, proxy pool and notification endpoints.

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;
