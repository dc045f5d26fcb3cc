pub mod advisor;
pub mod chat_advisor;
pub mod generator;
pub mod templates;

pub use advisor::{Advisor, AdvisorPrompt};
pub use chat_advisor::ChatCompletionsAdvisor;
pub use generator::InstructionGenerator;
pub use templates::{DevStage, ProjectKind};
