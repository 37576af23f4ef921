//! Drive Mode: plays nearby drivecards while the user is moving.
//!
//! ```text
//! LocationFix → DriveMode ─┬─ Activation (enable / auto-disable timer)
//!                          └─ Poller → ProximityScanner → PlaybackManager
//!                                         (ContentStore)    (MediaBackend)
//! ```
//!
//! A host builds one [`DriveMode`] per user with its [`Collaborators`], feeds
//! it location fixes, and listens on [`DriveMode::subscribe`] for triggers,
//! playback changes and recovered failures.

pub mod activation;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod playback;
pub mod poller;
pub mod scanner;
mod service;

pub use activation::{ActivationState, DisableReason};
pub use config::EngineConfig;
pub use error::{DriveError, Result};
pub use events::{DriveEvent, EventBus};
pub use playback::{PlaybackManager, PlaybackStats};
pub use poller::CycleOutcome;
pub use scanner::{Candidate, ProximityScanner};
pub use service::{Collaborators, DriveMode};
