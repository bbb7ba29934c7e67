use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Submission ids with an evaluation currently running.
#[derive(Debug, Clone, Default)]
pub(super) struct InFlightSet {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    /// `None` when the submission is already being evaluated.
    pub(super) fn try_acquire(&self, submission_id: &str) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(submission_id.to_string()) {
            return None;
        }
        Some(InFlightGuard { ids: Arc::clone(&self.ids), submission_id: submission_id.to_string() })
    }

    #[cfg(test)]
    pub(super) fn contains(&self, submission_id: &str) -> bool {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).contains(submission_id)
    }
}

/// Releases the submission id when dropped, on every exit path.
#[derive(Debug)]
pub(super) struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    submission_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.submission_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let set = InFlightSet::default();
        let guard = set.try_acquire("sub-1").expect("first");
        assert!(set.try_acquire("sub-1").is_none());
        assert!(set.try_acquire("sub-2").is_some());

        drop(guard);
        assert!(!set.contains("sub-1"));
        assert!(set.try_acquire("sub-1").is_some());
    }
}
