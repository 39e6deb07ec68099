//! Shell command names.

use strum_macros::{Display, EnumString};

/// Top-level commands accepted at the shell prompt.
///
/// The string forms are the kebab-case command words the user types
/// (`initialize`, `screen`, `scheduler-start`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Command {
    /// `initialize [path]`: load a configuration and start the engine.
    Initialize,
    /// `screen -s|-r|-ls …`: create, attach to, or list processes.
    Screen,
    /// `scheduler-start`: begin batch process generation.
    SchedulerStart,
    /// `scheduler-stop`: end batch process generation.
    SchedulerStop,
    /// `report-util`: write the CPU report to `csopesy-log.txt`.
    ReportUtil,
    /// `clear`: clear the screen and reprint the banner.
    Clear,
    /// `exit`: shut down and leave the shell.
    Exit,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
