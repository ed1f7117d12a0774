//! Claims sync adapters.
//!
//! - `HttpClaimsSync` - identity provider admin API
//! - `RecordingClaimsSync` - tests only

mod http;
mod recording;

pub use http::{ClaimsApiConfig, HttpClaimsSync};
pub use recording::RecordingClaimsSync;
