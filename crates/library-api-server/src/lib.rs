pub mod cache;
pub mod config;
pub mod download;
pub mod handlers;
pub mod library;
pub mod logging;
pub mod routes;
pub mod security;
pub mod session;
pub mod state;
pub mod utils;
