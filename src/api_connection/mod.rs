pub mod connection;
pub mod endpoints;
pub mod retry;

pub use connection::{ApiConnectionError, Generator, TextGenerator};
pub use endpoints::{GenerateOptions, GenerateRequest, GenerateResponse, Provider};
pub use retry::RetryPolicy;
