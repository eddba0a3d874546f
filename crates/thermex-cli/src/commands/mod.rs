//! Command implementations for the CLI.

mod config;
mod control;
mod delayed_off;
mod diagnostics;
mod runtime;
mod status;
mod watch;

use std::path::PathBuf;

use crate::config::Config;
use crate::format::FormatOptions;

pub use config::cmd_config;
pub use control::{cmd_deco, cmd_fan, cmd_light};
pub use delayed_off::cmd_delayed_off;
pub use diagnostics::cmd_diagnostics;
pub use runtime::cmd_runtime;
pub use status::cmd_status;
pub use watch::cmd_watch;

/// Settings shared by every command that talks to the hood.
pub struct CommandContext<'a> {
    pub config: &'a Config,
    pub output: Option<&'a PathBuf>,
    pub opts: FormatOptions,
    pub quiet: bool,
}
