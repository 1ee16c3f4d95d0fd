//! Utility modules
//!
//! Contains clocks, timeout handling, and string helpers.

pub mod clock;
pub mod string;
pub mod timeout;

pub use clock::{Clock, ManualClock, SystemClock};
pub use string::{redact_token, truncate_str};
pub use timeout::{with_timeout, TimeoutConfig, TimeoutError};
