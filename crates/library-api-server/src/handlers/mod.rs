pub mod auth;
pub mod cover;
pub mod download;
pub mod health;
