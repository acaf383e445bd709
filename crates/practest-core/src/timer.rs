//! Per-phase countdown clock.
//!
//! A [`Countdown`] is bound to the [`PhaseToken`] of the phase that started
//! it. Ticks carry the token they were scheduled for; a tick for any other
//! token, or after the countdown expired or was cancelled, changes nothing.

/// Identity of one timed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PhaseToken(u64);

impl PhaseToken {
    /// The token for the phase after this one.
    pub fn next(self) -> Self {
        PhaseToken(self.0.wrapping_add(1))
    }
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still counting; seconds left.
    Running(u32),
    /// Reached zero on this tick. Returned once per countdown.
    Expired,
    /// Stale token, cancelled, or already expired.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Expired,
    Cancelled,
}

/// Whole-second countdown for one phase.
#[derive(Debug, Clone)]
pub struct Countdown {
    token: PhaseToken,
    duration: u32,
    remaining: u32,
    status: Status,
}

impl Countdown {
    pub fn start(token: PhaseToken, seconds: u32) -> Self {
        Self {
            token,
            duration: seconds,
            remaining: seconds,
            status: Status::Active,
        }
    }

    pub fn token(&self) -> PhaseToken {
        self.token
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    pub fn is_expired(&self) -> bool {
        self.status == Status::Expired
    }

    /// Advance by one second.
    pub fn tick(&mut self, token: PhaseToken) -> Tick {
        if token != self.token || self.status != Status::Active {
            return Tick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.status = Status::Expired;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    /// Stop counting. Safe to call any number of times.
    pub fn cancel(&mut self) {
        if self.status == Status::Active {
            self.status = Status::Cancelled;
        }
    }
}

/// Render seconds as `mm:ss`, or `h:mm:ss` from one hour upward.
pub fn format_clock(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_and_expires_once() {
        let token = PhaseToken::default().next();
        let mut countdown = Countdown::start(token, 3);

        assert_eq!(countdown.tick(token), Tick::Running(2));
        assert_eq!(countdown.tick(token), Tick::Running(1));
        assert_eq!(countdown.tick(token), Tick::Expired);
        assert!(countdown.is_expired());

        for _ in 0..5 {
            assert_eq!(countdown.tick(token), Tick::Idle);
        }
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn zero_duration_expires_on_first_tick() {
        let token = PhaseToken::default();
        let mut countdown = Countdown::start(token, 0);
        assert_eq!(countdown.tick(token), Tick::Expired);
        assert_eq!(countdown.tick(token), Tick::Idle);
    }

    #[test]
    fn stale_token_is_ignored() {
        let old = PhaseToken::default();
        let current = old.next();
        let mut countdown = Countdown::start(current, 10);

        assert_eq!(countdown.tick(old), Tick::Idle);
        assert_eq!(countdown.remaining(), 10);
        assert_eq!(countdown.tick(current), Tick::Running(9));
    }

    #[test]
    fn cancel_stops_decrementing_and_is_idempotent() {
        let token = PhaseToken::default();
        let mut countdown = Countdown::start(token, 5);
        countdown.tick(token);
        countdown.cancel();
        countdown.cancel();

        assert!(!countdown.is_active());
        assert!(!countdown.is_expired());
        assert_eq!(countdown.tick(token), Tick::Idle);
        assert_eq!(countdown.remaining(), 4);
    }

    #[test]
    fn cancel_after_expiry_keeps_expired() {
        let token = PhaseToken::default();
        let mut countdown = Countdown::start(token, 1);
        assert_eq!(countdown.tick(token), Tick::Expired);
        countdown.cancel();
        assert!(countdown.is_expired());
    }

    #[test]
    fn new_phase_starts_from_its_own_duration() {
        let prep = PhaseToken::default();
        let mut countdown = Countdown::start(prep, 60);
        countdown.tick(prep);
        countdown.cancel();

        let speak = prep.next();
        let countdown = Countdown::start(speak, 120);
        assert_eq!(countdown.remaining(), 120);
        assert_eq!(countdown.duration(), 120);
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(3599), "59:59");
        assert_eq!(format_clock(3600), "1:00:00");
        assert_eq!(format_clock(3725), "1:02:05");
    }
}
