//! Presentation hooks for build diagnostics.
//! The builder and the build command report through a [`Console`] so callers decide
//! whether warnings are printed, logged or suppressed.

use crate::warning::ToolkitWarning;
use log::{info, warn};
use std::path::Path;

/// Trait for presenting build progress and warnings to the user.
pub trait Console {
    /// Reports the warnings raised for one file, or for no file in particular.
    fn warn_group(&self, source: Option<&Path>, warnings: &[&ToolkitWarning]);

    /// Reports a progress or hint message.
    fn info(&self, message: &str);
}

/// Console that writes through the `log` facade.
#[derive(Debug, Default)]
pub struct LogConsole;

impl LogConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for LogConsole {
    fn warn_group(&self, source: Option<&Path>, warnings: &[&ToolkitWarning]) {
        if warnings.is_empty() {
            return;
        }
        match source {
            Some(source) => warn!("WARNING [{}]:", source.display()),
            None => warn!("WARNING:"),
        }
        for warning in warnings {
            warn!("    [{}] {}", warning.severity(), warning);
        }
    }

    fn info(&self, message: &str) {
        info!("{}", message);
    }
}

/// Console that discards everything; the warnings are still returned to the caller.
#[derive(Debug, Default)]
pub struct QuietConsole;

impl Console for QuietConsole {
    fn warn_group(&self, _source: Option<&Path>, _warnings: &[&ToolkitWarning]) {}

    fn info(&self, _message: &str) {}
}
