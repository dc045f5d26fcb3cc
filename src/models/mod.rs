pub mod action;
pub mod classification;
pub mod context;
pub mod observation;
pub mod state;

pub use action::{Action, ActionKind, InterventionType, Priority};
pub use classification::{Category, Classification};
pub use context::DecisionContext;
pub use observation::Observation;
pub use state::{HistoryEntry, SupervisorState, SupervisorStatus};
