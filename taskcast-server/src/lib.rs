pub mod app;
pub mod auth;
pub mod error;
pub mod routes;
pub mod webhook;

pub use app::{create_app, AppState};
pub use auth::{AuthContext, AuthMode, JwtConfig, TaskIdAccess, check_scope};
pub use error::AppError;
pub use webhook::WebhookDelivery;
