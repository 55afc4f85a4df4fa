use std::fmt;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use tracing::{info, warn};

use crate::drive::Drive;
use crate::error::{EjectError, Result};

/// The ways a medium can be released, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EjectMethod {
    Cdrom,
    Scsi,
    Floppy,
    Tape,
}

impl EjectMethod {
    pub const SEQUENCE: [EjectMethod; 4] = [
        EjectMethod::Cdrom,
        EjectMethod::Scsi,
        EjectMethod::Floppy,
        EjectMethod::Tape,
    ];

    pub fn attempt(self, drive: &dyn Drive) -> nix::Result<()> {
        match self {
            EjectMethod::Cdrom => drive.cdrom_eject(),
            EjectMethod::Scsi => drive.scsi_eject(),
            EjectMethod::Floppy => drive.floppy_eject(),
            EjectMethod::Tape => drive.tape_offline(),
        }
    }

    fn command(self) -> &'static str {
        match self {
            EjectMethod::Cdrom => "CD-ROM eject command",
            EjectMethod::Scsi => "SCSI commands",
            EjectMethod::Floppy => "floppy eject command",
            EjectMethod::Tape => "tape offline command",
        }
    }
}

impl fmt::Display for EjectMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EjectMethod::Cdrom => "CD-ROM",
            EjectMethod::Scsi => "SCSI",
            EjectMethod::Floppy => "floppy",
            EjectMethod::Tape => "tape",
        };
        f.write_str(name)
    }
}

/// The subset of [`EjectMethod::SEQUENCE`] the user asked for. Empty means all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodSet {
    pub cdrom: bool,
    pub scsi: bool,
    pub floppy: bool,
    pub tape: bool,
}

impl MethodSet {
    pub fn is_empty(&self) -> bool {
        !(self.cdrom || self.scsi || self.floppy || self.tape)
    }

    pub fn contains(&self, method: EjectMethod) -> bool {
        if self.is_empty() {
            return true;
        }
        match method {
            EjectMethod::Cdrom => self.cdrom,
            EjectMethod::Scsi => self.scsi,
            EjectMethod::Floppy => self.floppy,
            EjectMethod::Tape => self.tape,
        }
    }
}

type Predicate<'a> = Box<dyn Fn() -> bool + 'a>;
type Action<'a> = Box<dyn Fn() -> nix::Result<()> + 'a>;

/// Runs `steps` in order until one succeeds, returning its label.
fn first_success<'a, L: Copy + fmt::Display>(
    steps: Vec<(L, Predicate<'a>, Action<'a>)>,
) -> std::result::Result<L, Option<Errno>> {
    let mut last_error = None;
    for (label, predicate, action) in steps {
        if !predicate() {
            continue;
        }
        match action() {
            Ok(()) => {
                info!("{label} eject succeeded");
                return Ok(label);
            }
            Err(e) => {
                info!("{label} eject failed: {e}");
                last_error = Some(e);
            }
        }
    }
    Err(last_error)
}

/// Tries the selected methods in their fixed order and stops at the first
/// one that works.
pub fn eject(drive: &dyn Drive, device: &str, methods: MethodSet) -> Result<EjectMethod> {
    let steps = EjectMethod::SEQUENCE
        .iter()
        .map(|&method| {
            let predicate: Predicate = Box::new(move || methods.contains(method));
            let action: Action = Box::new(move || {
                info!("trying to eject '{device}' using {}", method.command());
                method.attempt(drive)
            });
            (method, predicate, action)
        })
        .collect();

    first_success(steps)
        .map_err(|last| EjectError::EjectFailed(last.unwrap_or(Errno::UnknownErrno)))
}

/// Commands older kernels lack fail with `ENOSYS`; that is only worth a warning.
fn tolerate_unsupported(
    result: nix::Result<()>,
    what: &'static str,
    unsupported: &str,
) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(Errno::ENOSYS) => {
            warn!("{unsupported}");
            Ok(())
        }
        Err(e) => Err(EjectError::command(what, e)),
    }
}

pub fn auto_eject(drive: &dyn Drive, on: bool) -> Result<()> {
    drive
        .set_auto_eject(on)
        .map_err(|e| EjectError::command("CD-ROM auto-eject command", e))
}

pub fn select_disc(drive: &dyn Drive, slot: i32) -> Result<()> {
    tolerate_unsupported(
        drive.select_disc(slot),
        "CD-ROM select disc command",
        "IDE/ATAPI CD-ROM changer not supported by this kernel",
    )
}

pub fn close_tray(drive: &dyn Drive) -> Result<()> {
    tolerate_unsupported(
        drive.close_tray(),
        "CD-ROM tray close command",
        "CD-ROM tray close command not supported by this kernel",
    )
}

pub fn select_speed(drive: &dyn Drive, speed: i32) -> Result<()> {
    tolerate_unsupported(
        drive.select_speed(speed),
        "CD-ROM select speed command",
        "CD-ROM select speed command not supported by this kernel",
    )
}

/// Opens the tray, or closes it if it turns out to be open already.
///
/// A closed tray takes well over a second to open; an open one answers the
/// eject request almost at once. Returns whether the tray was closed.
pub fn toggle_tray(drive: &dyn Drive, threshold: Duration) -> Result<bool> {
    let start = Instant::now();
    drive
        .cdrom_eject()
        .map_err(|e| EjectError::command("CD-ROM eject command", e))?;
    let elapsed = start.elapsed();

    if elapsed < threshold {
        info!("tray opened in {elapsed:?}, it was already open; closing it");
        close_tray(drive)?;
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<&'static str>>,
        close_error: Option<Errno>,
    }

    impl Recorder {
        fn record(&self, call: &'static str) -> nix::Result<()> {
            self.calls.borrow_mut().push(call);
            Err(Errno::EINVAL)
        }
    }

    impl Drive for Recorder {
        fn cdrom_eject(&self) -> nix::Result<()> {
            self.calls.borrow_mut().push("cdrom");
            Ok(())
        }
        fn scsi_eject(&self) -> nix::Result<()> {
            self.record("scsi")
        }
        fn floppy_eject(&self) -> nix::Result<()> {
            self.record("floppy")
        }
        fn tape_offline(&self) -> nix::Result<()> {
            self.record("tape")
        }
        fn set_auto_eject(&self, _on: bool) -> nix::Result<()> {
            self.record("auto")
        }
        fn select_disc(&self, _slot: i32) -> nix::Result<()> {
            Err(Errno::ENOSYS)
        }
        fn close_tray(&self) -> nix::Result<()> {
            self.calls.borrow_mut().push("close");
            match self.close_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
        fn select_speed(&self, _speed: i32) -> nix::Result<()> {
            Err(Errno::EIO)
        }
    }

    #[test]
    fn test_method_set_defaults_to_all() {
        let none = MethodSet::default();
        assert!(none.is_empty());
        for method in EjectMethod::SEQUENCE {
            assert!(none.contains(method));
        }

        let tape_only = MethodSet {
            tape: true,
            ..Default::default()
        };
        assert!(tape_only.contains(EjectMethod::Tape));
        assert!(!tape_only.contains(EjectMethod::Cdrom));
    }

    #[test]
    fn test_only_selected_methods_run() {
        let drive = Recorder::default();
        let methods = MethodSet {
            scsi: true,
            floppy: true,
            ..Default::default()
        };

        let err = eject(&drive, "/dev/sda", methods).unwrap_err();
        assert!(matches!(err, EjectError::EjectFailed(Errno::EINVAL)));
        assert_eq!(*drive.calls.borrow(), vec!["scsi", "floppy"]);
    }

    #[test]
    fn test_unsupported_is_a_warning() {
        let drive = Recorder::default();
        select_disc(&drive, 2).unwrap();

        let err = select_speed(&drive, 4).unwrap_err();
        assert_eq!(err.to_string(), "CD-ROM select speed command failed");

        assert!(auto_eject(&drive, true).is_err());
    }

    #[test]
    fn test_toggle_closes_open_tray() {
        let drive = Recorder::default();
        assert!(toggle_tray(&drive, Duration::from_secs(60)).unwrap());
        assert_eq!(*drive.calls.borrow(), vec!["cdrom", "close"]);
    }

    #[test]
    fn test_toggle_leaves_opened_tray() {
        let drive = Recorder::default();
        assert!(!toggle_tray(&drive, Duration::ZERO).unwrap());
        assert_eq!(*drive.calls.borrow(), vec!["cdrom"]);
    }

    #[test]
    fn test_toggle_close_failure() {
        let drive = Recorder {
            close_error: Some(Errno::EIO),
            ..Default::default()
        };
        let err = toggle_tray(&drive, Duration::from_secs(60)).unwrap_err();
        assert!(matches!(
            err,
            EjectError::CommandFailed {
                what: "CD-ROM tray close command",
                source: Errno::EIO
            }
        ));
    }
}
