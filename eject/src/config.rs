use once_cell::sync::Lazy;
use std::{path::PathBuf, time::Duration};

pub static SYSTEM_PATHS: Lazy<SystemPaths> = Lazy::new(SystemPaths::default);

pub static DEFAULT_DEVICE: &str = "/dev/cdrom";
pub static DEV_DIR: &str = "/dev";
pub static MTAB: &str = "/etc/mtab";
pub static PROC_MOUNTS: &str = "/proc/mounts";
pub static UMOUNT_HELPER: &str = "/bin/umount";

/// How many symbolic links are followed before giving up.
pub const MAX_LINK_DEPTH: usize = 6;

/// If opening the tray takes less than this, it was most likely open already.
pub const TRAY_ALREADY_OPEN: Duration = Duration::from_millis(200);

/// Which file the mount table is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MountTableSource {
    #[default]
    Mtab,
    Proc,
}

/// Filesystem locations the pipeline touches.
#[derive(Debug, Clone)]
pub struct SystemPaths {
    pub dev_dir: PathBuf,
    pub mtab: PathBuf,
    pub proc_mounts: PathBuf,
    pub umount_helper: PathBuf,
    pub default_device: String,
}

impl SystemPaths {
    pub fn mount_table(&self, source: MountTableSource) -> &PathBuf {
        match source {
            MountTableSource::Mtab => &self.mtab,
            MountTableSource::Proc => &self.proc_mounts,
        }
    }
}

impl Default for SystemPaths {
    fn default() -> Self {
        SystemPaths {
            dev_dir: PathBuf::from(DEV_DIR),
            mtab: PathBuf::from(MTAB),
            proc_mounts: PathBuf::from(PROC_MOUNTS),
            umount_helper: PathBuf::from(UMOUNT_HELPER),
            default_device: String::from(DEFAULT_DEVICE),
        }
    }
}
