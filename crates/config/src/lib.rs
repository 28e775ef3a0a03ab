// Configuration loading

pub mod ai;
pub mod settings;

pub use ai::ResolvedAIConfig;
pub use settings::{AIProvider, AISettings, Settings};
