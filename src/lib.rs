//! Blog API authentication service: registration, login and logout over
//! Postgres-backed user records, with stateless JWT sessions in an HTTP-only cookie.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod state;

pub use app::build_app;
pub use config::AppConfig;
pub use error::AppError;
pub use state::AppState;
