use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use eject::config::SystemPaths;
use eject::drive::{Drive, DriveOpener};
use eject::mtab::{DeviceId, DeviceIdentity};
use eject::umount::{CommandRunner, ExitOutcome};
use nix::errno::Errno;
use tempfile::TempDir;

/// Shared call log, so the test can look at what happened after the run.
pub type Calls = Rc<RefCell<Vec<String>>>;

/// A scratch root with `dev/`, `etc/mtab` and `proc/mounts`.
pub struct Sandbox {
    pub root: TempDir,
    pub paths: SystemPaths,
}

#[allow(dead_code)]
impl Sandbox {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        for dir in ["dev", "etc", "proc", "media"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        let paths = SystemPaths {
            dev_dir: root.path().join("dev"),
            mtab: root.path().join("etc/mtab"),
            proc_mounts: root.path().join("proc/mounts"),
            umount_helper: PathBuf::from("/bin/umount"),
            default_device: root.path().join("dev/cdrom").display().to_string(),
        };
        fs::write(&paths.mtab, "").unwrap();
        fs::write(&paths.proc_mounts, "").unwrap();
        Sandbox { root, paths }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    /// Creates a stand-in device node under `dev/`.
    pub fn device(&self, name: &str) -> PathBuf {
        let path = self.paths.dev_dir.join(name);
        File::create(&path).unwrap();
        path
    }

    pub fn mount_point(&self, name: &str) -> PathBuf {
        let path = self.path("media").join(name);
        fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn write_mtab(&self, content: &str) {
        fs::write(&self.paths.mtab, content).unwrap();
    }

    pub fn write_proc_mounts(&self, content: &str) {
        fs::write(&self.paths.proc_mounts, content).unwrap();
    }
}

/// Drive whose commands succeed or fail as configured, logging each call.
pub struct MockDrive {
    calls: Calls,
    results: HashMap<&'static str, Errno>,
}

impl MockDrive {
    fn call(&self, name: &'static str) -> nix::Result<()> {
        self.calls.borrow_mut().push(name.to_string());
        match self.results.get(name) {
            Some(errno) => Err(*errno),
            None => Ok(()),
        }
    }
}

impl Drive for MockDrive {
    fn cdrom_eject(&self) -> nix::Result<()> {
        self.call("cdrom")
    }
    fn scsi_eject(&self) -> nix::Result<()> {
        self.call("scsi")
    }
    fn floppy_eject(&self) -> nix::Result<()> {
        self.call("floppy")
    }
    fn tape_offline(&self) -> nix::Result<()> {
        self.call("tape")
    }
    fn set_auto_eject(&self, on: bool) -> nix::Result<()> {
        self.call(if on { "auto-on" } else { "auto-off" })
    }
    fn select_disc(&self, _slot: i32) -> nix::Result<()> {
        self.call("select-disc")
    }
    fn close_tray(&self) -> nix::Result<()> {
        self.call("close")
    }
    fn select_speed(&self, _speed: i32) -> nix::Result<()> {
        self.call("speed")
    }
}

#[derive(Default)]
pub struct MockOpener {
    pub calls: Calls,
    failures: HashMap<&'static str, Errno>,
}

#[allow(dead_code)]
impl MockOpener {
    /// Makes the named drive command fail with `errno`.
    pub fn failing(mut self, command: &'static str, errno: Errno) -> Self {
        self.failures.insert(command, errno);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl DriveOpener for MockOpener {
    fn open(&self, path: &Path) -> eject::Result<Box<dyn Drive>> {
        self.calls
            .borrow_mut()
            .push(format!("open {}", path.display()));
        Ok(Box::new(MockDrive {
            calls: Rc::clone(&self.calls),
            results: self.failures.clone(),
        }))
    }
}

/// Records every command line and answers with a fixed outcome, unless the
/// first argument has an outcome of its own.
pub struct MockRunner {
    pub commands: RefCell<Vec<Vec<String>>>,
    outcome: ExitOutcome,
    per_device: HashMap<String, ExitOutcome>,
}

#[allow(dead_code)]
impl MockRunner {
    pub fn exiting(code: i32) -> Self {
        Self::with(ExitOutcome::Exited(code))
    }

    pub fn with(outcome: ExitOutcome) -> Self {
        MockRunner {
            commands: RefCell::new(Vec::new()),
            outcome,
            per_device: HashMap::new(),
        }
    }

    pub fn failing_on(mut self, device: &str, outcome: ExitOutcome) -> Self {
        self.per_device.insert(device.to_string(), outcome);
        self
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.borrow().clone()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &Path, args: &[String]) -> eject::Result<ExitOutcome> {
        let mut line = vec![program.display().to_string()];
        line.extend(args.iter().cloned());
        self.commands.borrow_mut().push(line);
        let outcome = args
            .first()
            .and_then(|device| self.per_device.get(device))
            .unwrap_or(&self.outcome);
        Ok(outcome.clone())
    }
}

/// Device identities by path; anything not listed is not a block device.
#[derive(Default)]
pub struct MockIdentity {
    ids: HashMap<String, DeviceId>,
}

#[allow(dead_code)]
impl MockIdentity {
    pub fn with(mut self, path: impl AsRef<Path>, major: u64, minor: u64) -> Self {
        self.ids.insert(
            path.as_ref().display().to_string(),
            DeviceId { major, minor },
        );
        self
    }
}

impl DeviceIdentity for MockIdentity {
    fn device_id(&self, path: &str) -> Option<DeviceId> {
        self.ids.get(path).copied()
    }
}
