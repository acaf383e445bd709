//! Single-use latches for one-take capture and exactly-once submission.

/// Allows at most one recording per attempt.
///
/// Lock only after the device has been acquired: a denied permission request
/// must not use up the attempt's single take.
#[derive(Debug, Default)]
pub struct CaptureGuard {
    locked: bool,
}

impl CaptureGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_capture(&self) -> bool {
        !self.locked
    }

    /// Returns `true` if this call performed the lock.
    pub fn lock(&mut self) -> bool {
        if self.locked {
            return false;
        }
        self.locked = true;
        true
    }
}

/// Lets exactly one submission request through.
#[derive(Debug, Default)]
pub struct SubmissionGuard {
    fired: bool,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the first caller only.
    pub fn try_submit(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Re-arm after a failed submission so the user can retry.
    pub fn reset(&mut self) {
        self.fired = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_guard_locks_once() {
        let mut guard = CaptureGuard::new();
        assert!(guard.can_capture());
        assert!(guard.lock());
        assert!(!guard.can_capture());
        assert!(!guard.lock());
        assert!(!guard.can_capture());
    }

    #[test]
    fn only_first_submit_wins() {
        let mut guard = SubmissionGuard::new();
        let winners = (0..10).filter(|_| guard.try_submit()).count();
        assert_eq!(winners, 1);
        assert!(guard.has_fired());
    }

    #[test]
    fn reset_allows_one_more_submit() {
        let mut guard = SubmissionGuard::new();
        assert!(guard.try_submit());
        guard.reset();
        assert!(!guard.has_fired());
        assert!(guard.try_submit());
        assert!(!guard.try_submit());
    }
}
