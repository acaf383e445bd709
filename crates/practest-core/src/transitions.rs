//! Current-state cell with legal-transition checks and a transition log.
//!
//! Both attempt controllers keep their phase in a [`StateCell`]. Every change
//! goes through [`StateCell::advance`], which rejects edges missing from the
//! state's transition table and records the ones it accepts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A controller phase with a fixed transition table.
pub trait AttemptState: Copy + Eq + fmt::Debug + fmt::Display {
    /// No further transitions are allowed.
    fn is_terminal(self) -> bool;

    fn can_transition(self, to: Self) -> bool;
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord<S> {
    pub from: S,
    pub to: S,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StateCell<S> {
    current: S,
    history: Vec<TransitionRecord<S>>,
}

impl<S: AttemptState> StateCell<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn history(&self) -> &[TransitionRecord<S>] {
        &self.history
    }

    /// How many times the cell has entered `state`.
    pub fn entries_into(&self, state: S) -> usize {
        self.history.iter().filter(|r| r.to == state).count()
    }

    /// Move to `to` if the edge is legal. Returns whether the move happened.
    pub fn advance(&mut self, to: S) -> bool {
        let from = self.current;
        if !from.can_transition(to) {
            tracing::warn!(%from, %to, "illegal attempt transition rejected");
            return false;
        }
        self.current = to;
        self.history.push(TransitionRecord {
            from,
            to,
            at: Utc::now(),
        });
        tracing::info!(%from, %to, "attempt state changed");
        true
    }
}
