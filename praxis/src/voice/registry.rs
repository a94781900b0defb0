use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;

use super::coordinator::{ActiveRecording, ContentionPolicy, RecordingCoordinator};
use crate::types::ProfileId;

/// One [`RecordingCoordinator`] per profile, created on first request and dropped once released.
#[derive(Debug, Clone, Default)]
pub struct RecordingRegistry {
    coordinators: Arc<DashMap<ProfileId, RecordingCoordinator>>,
    policy: ContentionPolicy,
}

impl RecordingRegistry {
    pub fn new(policy: ContentionPolicy) -> Self {
        Self {
            coordinators: Arc::default(),
            policy,
        }
    }

    pub fn coordinator_for(&self, profile_id: ProfileId) -> RecordingCoordinator {
        self.coordinators
            .entry(profile_id)
            .or_insert_with(|| RecordingCoordinator::new(self.policy))
            .clone()
    }

    /// The profile's current recording, without creating a coordinator.
    pub fn current(&self, profile_id: ProfileId) -> Option<ActiveRecording> {
        self.coordinators.get(&profile_id).and_then(|c| c.current())
    }

    /// Release on behalf of `recorder_id`, dropping the coordinator if it is left idle.
    pub fn release(&self, profile_id: ProfileId, recorder_id: &str) -> bool {
        // The entry guard blocks coordinator_for, so no new handle can appear before the removal
        let Entry::Occupied(entry) = self.coordinators.entry(profile_id) else {
            return false;
        };
        let released = entry.get().release_recording(recorder_id);
        if entry.get().is_disposable() {
            entry.remove();
        }
        released
    }
}
