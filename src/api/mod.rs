pub mod dto;
pub mod rate_limiter;
pub mod routes;

pub use routes::{create_router, AppState, ApiDoc};
