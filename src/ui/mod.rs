//! HTTP dispatcher and status pages

pub mod handlers;
pub mod server;

pub use server::{router, serve_until_shutdown, AppState, WebServer};
