pub mod health;
pub mod map;
pub mod routes;

pub use routes::{create_router, AppState};
