pub mod agent;
pub mod cancel;
pub mod errors;
pub mod finalizer;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompt_template;
pub mod providers;
pub mod synthesizer;
