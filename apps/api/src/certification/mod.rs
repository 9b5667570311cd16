//! Certification scoring core: answer scoring, session progression and rollups.

pub mod decode;
pub mod enhanced;
pub mod handlers;
pub mod hybrid;
pub mod models;
pub mod progress;
pub mod progression;
pub mod prompts;
pub mod rollup;
