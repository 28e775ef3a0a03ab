// Reasoning-service integration: the chat client, prompt builders, the
// structured-result extractor and the task functions tying them together.

pub mod client;
pub mod extract;
pub mod prompts;
pub mod tasks;

pub use client::{ChatClient, ChatRequest, ReasoningService, ServiceError};
pub use extract::{extract, extract_code_block, ExtractionResult, Markers, Strategy};
pub use tasks::{generate_chart_code, generate_report, run_transform, TransformTask};
