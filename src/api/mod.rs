pub mod docs;
pub mod dto;
pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{create_router, AppState};
