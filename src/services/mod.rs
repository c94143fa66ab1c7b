pub mod capability;
pub mod llm;
