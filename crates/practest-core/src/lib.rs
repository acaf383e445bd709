//! practest-core: timed exam attempt engine.
//!
//! This crate holds the data model, collaborator traits, and the state
//! machines that sequence a single Writing or Speaking attempt from session
//! creation through exactly-once submission.

pub mod driver;
pub mod error;
pub mod guard;
pub mod handoff;
pub mod model;
pub mod speaking;
pub mod timer;
pub mod traits;
pub mod transitions;
pub mod writing;

pub use error::{ApiError, AttemptError, FailureStage};
pub use handoff::{ResultHandoff, TabStorage};
pub use speaking::{SpeakingController, SpeakingState};
pub use writing::{WritingController, WritingState};
