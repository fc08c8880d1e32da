/// HTTP middleware: API-key authentication, rate limiting, request tracking.

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::ApiKeyAuth;
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use request_id::RequestId;
