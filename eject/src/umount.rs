use std::collections::HashSet;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::{
    errno::Errno,
    sys::wait::{WaitStatus, waitpid},
    unistd::{ForkResult, execv, fork, getgid, getuid, setgid, setuid},
};
use regex::Regex;
use tracing::{debug, info};

use crate::config::MountTableSource;
use crate::error::{EjectError, Result};
use crate::mtab::MountTable;

/// How an external command finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    /// Killed by a signal, stopped, or anything else that is not a normal exit.
    Abnormal(String),
}

pub trait CommandRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<ExitOutcome>;
}

/// Runs commands in a forked child that gives up any setuid/setgid
/// privileges before exec.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkRunner;

impl CommandRunner for ForkRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<ExitOutcome> {
        let spawn_err = |source: Errno| EjectError::Spawn {
            program: program.to_path_buf(),
            source,
        };

        // Build everything before forking; the child only execs.
        let file = CString::new(program.as_os_str().as_bytes())
            .map_err(|_| spawn_err(Errno::EINVAL))?;
        let mut argv = vec![file.clone()];
        for arg in args {
            argv.push(CString::new(arg.as_str()).map_err(|_| spawn_err(Errno::EINVAL))?);
        }

        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => match waitpid(child, None).map_err(spawn_err)? {
                WaitStatus::Exited(_, status) => Ok(ExitOutcome::Exited(status)),
                status => Ok(ExitOutcome::Abnormal(format!("{status:?}"))),
            },
            Ok(ForkResult::Child) => {
                if let Err(e) = setgid(getgid()) {
                    eprintln!("eject: cannot set group id: {e}");
                    std::process::exit(1);
                }
                if let Err(e) = setuid(getuid()) {
                    eprintln!("eject: cannot set user id: {e}");
                    std::process::exit(1);
                }
                let Err(e) = execv(&file, &argv);
                eprintln!("eject: unable to exec {}: {e}", program.display());
                std::process::exit(1);
            }
            Err(e) => Err(spawn_err(e)),
        }
    }
}

/// Unmounts one device or mount point with the external helper.
pub fn unmount_one(
    runner: &dyn CommandRunner,
    helper: &Path,
    name: &str,
    source: MountTableSource,
) -> Result<()> {
    let mut args = vec![name.to_string()];
    // mtab is not authoritative in this mode; keep the helper away from it
    if source == MountTableSource::Proc {
        args.push("-n".to_string());
    }

    debug!("running {} {:?}", helper.display(), args);
    match runner.run(helper, &args)? {
        ExitOutcome::Exited(0) => Ok(()),
        ExitOutcome::Exited(code) => {
            debug!("{} exited with {code}", helper.display());
            Err(EjectError::UnmountFailed(name.to_string()))
        }
        ExitOutcome::Abnormal(status) => {
            Err(EjectError::UnmountAbnormal(name.to_string(), status))
        }
    }
}

/// Unmounts every mounted device matching `pattern`. Devices in `done` are
/// skipped and every device unmounted here is added to it.
pub fn unmount_matching(
    runner: &dyn CommandRunner,
    helper: &Path,
    table: &MountTable,
    pattern: &Regex,
    source: MountTableSource,
    done: &mut HashSet<String>,
) -> Result<()> {
    for entry in table.matching(pattern) {
        if done.contains(&entry.device) {
            continue;
        }
        info!("unmounting '{}'", entry.device);
        unmount_one(runner, helper, &entry.device, source)?;
        done.insert(entry.device.clone());
    }
    Ok(())
}
