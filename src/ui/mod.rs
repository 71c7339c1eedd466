//! Terminal presentation: progress bars and prompts

pub mod prompt;
pub mod view;
