//! Usage text rendering.

use std::io::{self, Write};

use clap::CommandFactory;

use crate::cli::LaunchCommand;

/// Renders human-readable usage text on launch failure.
pub trait UsageRenderer: Send + Sync {
    /// Writes the usage banner to `out`.
    fn render(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Stock renderer backed by the clap command definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClapUsageRenderer;

impl UsageRenderer for ClapUsageRenderer {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut command = LaunchCommand::command();
        let help = command.render_help();
        write!(out, "{help}")
    }
}
