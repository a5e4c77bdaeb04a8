pub mod location;
pub mod record;

pub use location::{Location, MapPayload};
pub use record::RateLimitRecord;
