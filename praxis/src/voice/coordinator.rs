use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};
use utoipa::ToSchema;

pub type RecorderId = String;

/// Invoked once to make a recorder give up the microphone.
pub type StopCallback = Box<dyn FnOnce() + Send + 'static>;

/// What to do when a recorder asks for a microphone someone else holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentionPolicy {
    /// Stop the current holder and hand the microphone over.
    #[default]
    Preempt,
    /// Refuse the request and leave the current holder recording.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingGrant {
    pub granted: bool,
    /// The recorder that was stopped to make room, if any.
    pub preempted: Option<RecorderId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActiveRecording {
    pub recorder_id: RecorderId,
    pub since: DateTime<Utc>,
}

struct Holder {
    id: RecorderId,
    stop: Option<StopCallback>,
    since: DateTime<Utc>,
}

/// Single-owner token for the microphone.
///
/// Clones share state. Stop callbacks run after the internal lock is released, so a callback may
/// call back into the coordinator (typically to release).
#[derive(Clone, Default)]
pub struct RecordingCoordinator {
    holder: Arc<Mutex<Option<Holder>>>,
    policy: ContentionPolicy,
}

impl std::fmt::Debug for RecordingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingCoordinator")
            .field("active_recorder", &self.active_recorder())
            .field("policy", &self.policy)
            .finish()
    }
}

impl RecordingCoordinator {
    pub fn new(policy: ContentionPolicy) -> Self {
        Self {
            holder: Arc::default(),
            policy,
        }
    }

    pub fn policy(&self) -> ContentionPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Option<Holder>> {
        // A panicking stop callback never runs under the lock, so the state is always consistent
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for the microphone. Returns whether it was granted.
    pub fn request_recording(&self, id: impl Into<RecorderId>, stop: Option<StopCallback>) -> bool {
        self.request(id, stop).granted
    }

    /// Like [`Self::request_recording`], also reporting which recorder was stopped.
    ///
    /// Under [`ContentionPolicy::Preempt`] the holder's stop callback runs while it still holds
    /// the microphone, so it can release cleanly. The newcomer is installed afterwards.
    pub fn request(&self, id: impl Into<RecorderId>, stop: Option<StopCallback>) -> RecordingGrant {
        let id = id.into();
        let mut preempted: Option<RecorderId> = None;

        loop {
            let (holder_id, holder_stop) = {
                let mut holder = self.lock();
                match holder.as_mut() {
                    Some(current) if current.id == id => {
                        trace!(recorder_id = %id, "Recorder already holds the microphone, refreshing stop callback");
                        current.stop = stop;
                        return RecordingGrant { granted: true, preempted };
                    }
                    Some(current) if self.policy == ContentionPolicy::Reject => {
                        debug!(recorder_id = %id, holder = %current.id, "Microphone busy, rejecting request");
                        return RecordingGrant {
                            granted: false,
                            preempted: None,
                        };
                    }
                    Some(current) => match current.stop.take() {
                        Some(holder_stop) => (current.id.clone(), holder_stop),
                        None => {
                            // No callback, or it already ran without releasing: force the handover
                            trace!(preempted = %current.id, "Replacing recorder without a stop callback");
                            preempted.get_or_insert_with(|| current.id.clone());
                            *holder = Some(Holder {
                                id: id.clone(),
                                stop,
                                since: Utc::now(),
                            });
                            return RecordingGrant { granted: true, preempted };
                        }
                    },
                    None => {
                        *holder = Some(Holder {
                            id: id.clone(),
                            stop,
                            since: Utc::now(),
                        });
                        return RecordingGrant { granted: true, preempted };
                    }
                }
            };

            debug!(recorder_id = %id, preempted = %holder_id, "Stopping current recorder");
            preempted.get_or_insert(holder_id);
            holder_stop();
        }
    }

    /// Release the microphone. Only the current holder can release; returns whether it did.
    pub fn release_recording(&self, id: &str) -> bool {
        let mut holder = self.lock();
        match holder.as_ref() {
            Some(current) if current.id == id => {
                *holder = None;
                true
            }
            _ => {
                trace!(recorder_id = %id, "Ignoring release from a recorder that does not hold the microphone");
                false
            }
        }
    }

    /// Nobody records and no other handle to this coordinator exists.
    pub(super) fn is_disposable(&self) -> bool {
        Arc::strong_count(&self.holder) == 1 && self.lock().is_none()
    }

    pub fn active_recorder(&self) -> Option<RecorderId> {
        self.lock().as_ref().map(|h| h.id.clone())
    }

    pub fn current(&self) -> Option<ActiveRecording> {
        self.lock().as_ref().map(|h| ActiveRecording {
            recorder_id: h.id.clone(),
            since: h.since,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_stop(counter: &Arc<AtomicUsize>) -> Option<StopCallback> {
        let counter = counter.clone();
        Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_first_request_is_granted() {
        let coordinator = RecordingCoordinator::default();
        assert!(coordinator.request_recording("notes", None));
        assert_eq!(coordinator.active_recorder().as_deref(), Some("notes"));
    }

    #[test]
    fn test_preempt_invokes_previous_stop_exactly_once() {
        let coordinator = RecordingCoordinator::new(ContentionPolicy::Preempt);
        let first_stops = Arc::new(AtomicUsize::new(0));
        let second_stops = Arc::new(AtomicUsize::new(0));

        assert!(coordinator.request_recording("notes", counting_stop(&first_stops)));
        let grant = coordinator.request("diagnosis", counting_stop(&second_stops));

        assert!(grant.granted);
        assert_eq!(grant.preempted.as_deref(), Some("notes"));
        assert_eq!(first_stops.load(Ordering::SeqCst), 1);
        assert_eq!(second_stops.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.active_recorder().as_deref(), Some("diagnosis"));

        // The old callback is gone: a further handover only stops the second recorder
        assert!(coordinator.request_recording("notes", None));
        assert_eq!(first_stops.load(Ordering::SeqCst), 1);
        assert_eq!(second_stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_holder_refreshes_without_stopping() {
        let coordinator = RecordingCoordinator::default();
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));

        coordinator.request_recording("notes", counting_stop(&old));
        assert!(coordinator.request_recording("notes", counting_stop(&new)));
        assert_eq!(old.load(Ordering::SeqCst), 0);

        coordinator.request_recording("diagnosis", None);
        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_release_is_noop() {
        let coordinator = RecordingCoordinator::default();
        coordinator.request_recording("notes", None);
        coordinator.request_recording("diagnosis", None);

        assert!(!coordinator.release_recording("notes"));
        assert_eq!(coordinator.active_recorder().as_deref(), Some("diagnosis"));

        assert!(coordinator.release_recording("diagnosis"));
        assert_eq!(coordinator.active_recorder(), None);
        assert!(!coordinator.release_recording("diagnosis"));
    }

    #[test]
    fn test_missing_stop_callback_still_hands_over() {
        let coordinator = RecordingCoordinator::default();
        coordinator.request_recording("notes", None);
        assert!(coordinator.request_recording("diagnosis", None));
        assert_eq!(coordinator.active_recorder().as_deref(), Some("diagnosis"));
    }

    #[test]
    fn test_reject_policy_leaves_holder_untouched() {
        let coordinator = RecordingCoordinator::new(ContentionPolicy::Reject);
        let stops = Arc::new(AtomicUsize::new(0));

        assert!(coordinator.request_recording("notes", counting_stop(&stops)));
        assert!(!coordinator.request_recording("diagnosis", None));
        assert_eq!(stops.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.active_recorder().as_deref(), Some("notes"));

        coordinator.release_recording("notes");
        assert!(coordinator.request_recording("diagnosis", None));
    }

    #[test]
    fn test_stop_callback_runs_before_handover() {
        let coordinator = RecordingCoordinator::default();
        let inner = coordinator.clone();
        let seen = Arc::new(Mutex::new(None));
        let seen_in_callback = seen.clone();
        coordinator.request_recording(
            "notes",
            Some(Box::new(move || {
                // Still the holder here, and releasing from inside the callback must not deadlock
                let observed = (inner.active_recorder(), inner.release_recording("notes"));
                *seen_in_callback.lock().unwrap() = Some(observed);
            })),
        );

        let grant = coordinator.request("diagnosis", None);
        assert!(grant.granted);
        assert_eq!(grant.preempted.as_deref(), Some("notes"));
        assert_eq!(*seen.lock().unwrap(), Some((Some("notes".to_string()), true)));
        assert_eq!(coordinator.active_recorder().as_deref(), Some("diagnosis"));
    }

    #[test]
    fn test_stop_callback_that_keeps_recording_is_forced_out() {
        let coordinator = RecordingCoordinator::default();
        let stops = Arc::new(AtomicUsize::new(0));
        coordinator.request_recording("notes", counting_stop(&stops));

        let grant = coordinator.request("diagnosis", None);
        assert_eq!(grant.preempted.as_deref(), Some("notes"));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.active_recorder().as_deref(), Some("diagnosis"));
        assert!(!coordinator.release_recording("notes"));
    }

    #[test]
    fn test_clones_share_state() {
        let coordinator = RecordingCoordinator::default();
        let other = coordinator.clone();
        coordinator.request_recording("notes", None);
        assert_eq!(other.active_recorder().as_deref(), Some("notes"));
        assert_eq!(other.current().map(|c| c.recorder_id).as_deref(), Some("notes"));
    }
}
