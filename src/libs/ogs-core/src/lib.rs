//! NextGCore Core Utilities Library
//!
//! Shared building blocks for the NextGCore network functions.

pub mod cancel;       // Advisory cancellation token
pub mod id_generator; // Bounded sequential ID generator
pub mod log;          // Logging initialisation
pub mod rand;         // Random number generation
pub mod timer;        // Bounded-retry timer wheel

pub use cancel::CancelToken;
pub use id_generator::{IdError, SequentialIdGenerator};
pub use self::log::{ogs_log_init, OgsLogLevel};
pub use timer::{RetryTimer, TimerEvent, TimerHandle, TimerWheel};
