//! HTTP transport.

pub mod routes;
mod server;

pub use routes::{ExecuteRequest, StatusResponse, routes};
pub use server::{ServerConfig, serve};
