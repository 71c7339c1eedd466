//! Utility modules: paths, logging, desktop integration

pub mod desktop;
pub mod logging;
pub mod paths;
