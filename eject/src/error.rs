use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EjectError>;

#[derive(Debug, Error)]
pub enum EjectError {
    #[error("unable to find or open device for: '{0}'")]
    DeviceNotFound(String),

    #[error("maximum symbolic link depth exceeded: '{}'", .0.display())]
    LinkDepthExceeded(PathBuf),

    #[error("{}: open failed", path.display())]
    MountTableOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: open failed", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unmount of '{0}' failed")]
    UnmountFailed(String),

    #[error("unmount of '{0}' did not exit normally: {1}")]
    UnmountAbnormal(String, String),

    #[error("unable to run {}", program.display())]
    Spawn { program: PathBuf, source: Errno },

    #[error("{what} failed")]
    CommandFailed {
        what: &'static str,
        #[source]
        source: Errno,
    },

    #[error("unable to eject, last error: {0}")]
    EjectFailed(Errno),

    #[error("invalid device pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl EjectError {
    pub fn command(what: &'static str, source: Errno) -> Self {
        EjectError::CommandFailed { what, source }
    }
}
