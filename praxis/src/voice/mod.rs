//! Microphone arbitration for voice dictation.
//!
//! Speech capture is exclusive per signed-in session: only one dictation widget may hold the
//! microphone at a time. [`RecordingCoordinator`] enforces that for one session and
//! [`RecordingRegistry`] hands out one coordinator per profile.

pub mod coordinator;
pub mod registry;

pub use coordinator::{ActiveRecording, ContentionPolicy, RecorderId, RecordingCoordinator, RecordingGrant, StopCallback};
pub use registry::RecordingRegistry;
