//! API request/response models for microphone arbitration.

use crate::voice::{ActiveRecording, RecorderId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordingRequest {
    /// Identifies the dictation widget asking for the microphone
    pub recorder_id: RecorderId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordingResponse {
    pub granted: bool,
    /// Recorder that was stopped to make room, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preempted: Option<RecorderId>,
    /// Who holds the microphone after the request
    pub active: Option<ActiveRecording>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReleaseResponse {
    pub released: bool,
}
