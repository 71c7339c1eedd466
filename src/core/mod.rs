//! Core modules: tool invocation, progress parsing and orchestration

pub mod batch;
pub mod command;
pub mod orchestrator;
pub mod playlist;
pub mod progress;
pub mod runner;
pub mod tools;
pub mod updater;
