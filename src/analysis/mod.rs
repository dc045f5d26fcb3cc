pub mod classifier;
pub mod fingerprint;
pub mod signals;

pub use classifier::ContentAnalyzer;
pub use fingerprint::{fingerprint, normalize};
