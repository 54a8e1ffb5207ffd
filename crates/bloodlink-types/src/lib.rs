pub mod api;
pub mod auth_error;
pub mod events;
pub mod models;
