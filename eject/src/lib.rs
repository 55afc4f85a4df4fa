pub mod args;
pub mod config;
pub mod drive;
pub mod eject;
pub mod error;
pub mod mtab;
pub mod partition;
pub mod resolve;
pub mod run;
pub mod umount;

// re-export selected public API
pub use args::{Cli, EjectOptions, TrayAction};
pub use error::{EjectError, Result};
pub use run::{Outcome, System, run};
