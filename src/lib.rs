pub mod adk;
pub mod callflow;
