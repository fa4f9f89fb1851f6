//! HTTP surface for the wallet processor.
//!
//! Provider-facing seamless callbacks plus the authenticated admin
//! back-office endpoints, served by axum.

pub mod admin;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
