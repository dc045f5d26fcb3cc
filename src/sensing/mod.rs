//! The supervision loop and the collaborators it talks to.

mod capture;
mod controller;
mod delivery;
mod loop_worker;
mod target_probe;

pub use capture::{CaptureSource, FileCapture};
pub use controller::SupervisorController;
pub use delivery::{DeliverySink, FileDelivery};
pub use loop_worker::{CycleOutcome, LoopExit, LoopPhase, SupervisorLoop};
pub use target_probe::TargetProbe;
