pub mod limiter;
pub mod middleware;
pub mod sliding_window;

pub use limiter::RateLimiter;
pub use middleware::{extract_identifier, rate_limit_middleware};
pub use sliding_window::{Decision, Policy};
