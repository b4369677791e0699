pub mod cookies;
pub mod jwt;
pub mod retry;

pub use jwt::*;
pub use retry::RetryPolicy;
