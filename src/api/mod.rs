mod auth;
mod handlers;
mod middleware;
mod openapi;
mod routes;

pub use auth::require_auth;
pub use handlers::AppError;
pub use openapi::ApiDoc;
pub use routes::*;
