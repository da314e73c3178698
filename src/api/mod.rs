pub mod auth;
pub mod client;
pub mod rate_limit;
pub mod retry;
pub mod types;

pub use auth::{AuthorizationPrompt, TokenManager};
pub use client::MeliClient;
pub use rate_limit::RateLimiter;
pub use retry::{RetryHandler, RetryPolicy};
