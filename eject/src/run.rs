//! One invocation of the utility, from the parsed options to the eject.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::info;

use crate::args::{EjectOptions, TrayAction};
use crate::config::{MAX_LINK_DEPTH, SystemPaths, TRAY_ALREADY_OPEN};
use crate::drive::{Drive, DriveOpener};
use crate::eject::{self, EjectMethod};
use crate::error::Result;
use crate::mtab::{DeviceIdentity, MountEntry, MountTable};
use crate::partition::sibling_pattern;
use crate::resolve::{resolve_device, strip_trailing_slash};
use crate::umount::{CommandRunner, unmount_matching, unmount_one};

/// The outside world as seen by a run.
pub struct System<'a> {
    pub paths: &'a SystemPaths,
    pub drives: &'a dyn DriveOpener,
    pub runner: &'a dyn CommandRunner,
    pub identity: &'a dyn DeviceIdentity,
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `--default`: nothing was touched.
    DefaultDevice(String),
    /// `--noop`: the device that would have been ejected.
    Found(PathBuf),
    AutoEject(bool),
    Tray(TrayAction),
    Speed(i32),
    ChangerSlot(i32),
    Ejected(EjectMethod),
}

pub fn run(opts: &EjectOptions, sys: &System) -> Result<Outcome> {
    if opts.show_default {
        return Ok(Outcome::DefaultDevice(sys.paths.default_device.clone()));
    }

    let device = match &opts.device {
        Some(device) => device.as_str(),
        None => {
            info!("using default device '{}'", sys.paths.default_device);
            sys.paths.default_device.as_str()
        }
    };
    let device = strip_trailing_slash(device);
    info!("device name is '{device}'");

    let full_name = resolve_device(device, &sys.paths.dev_dir, MAX_LINK_DEPTH)?;
    let table_path = sys.paths.mount_table(opts.mount_table);
    let mounted = find_mount(table_path, &full_name, sys.identity)?;
    let device_name = match &mounted {
        Some(entry) => PathBuf::from(&entry.device),
        None => full_name,
    };

    if opts.noop {
        info!("exiting due to -n/--noop option");
        return Ok(Outcome::Found(device_name));
    }

    if let Some(outcome) = run_drive_settings(opts, sys, &device_name)? {
        return Ok(outcome);
    }

    // detected even with -m so -v still reports it
    let siblings = sibling_pattern(&device_name.to_string_lossy())?;
    if !opts.no_unmount {
        unmount_device(opts, sys, mounted.as_ref(), siblings.as_ref())?;
    }

    if let Some(slot) = opts.changer_slot {
        info!("selecting CD-ROM disc #{slot}");
        let drive = sys.drives.open(&device_name)?;
        eject::select_disc(drive.as_ref(), slot)?;
        apply_speed(drive.as_ref(), opts.speed)?;
        return Ok(Outcome::ChangerSlot(slot));
    }

    let drive = sys.drives.open(&device_name)?;
    let method = eject::eject(
        drive.as_ref(),
        &device_name.to_string_lossy(),
        opts.methods,
    )?;
    Ok(Outcome::Ejected(method))
}

fn find_mount(
    table_path: &Path,
    full_name: &Path,
    identity: &dyn DeviceIdentity,
) -> Result<Option<MountEntry>> {
    let table = MountTable::read(table_path)?;
    let name = full_name.to_string_lossy();
    let entry = table.find(&name, identity).cloned();
    match &entry {
        Some(entry) => info!("'{}' is mounted at '{}'", entry.device, entry.mount_point),
        None => info!("'{name}' is not mounted"),
    }
    Ok(entry)
}

/// Auto-eject, tray and speed settings end the run without unmounting.
fn run_drive_settings(
    opts: &EjectOptions,
    sys: &System,
    device_name: &Path,
) -> Result<Option<Outcome>> {
    if let Some(on) = opts.auto_eject {
        let state = if on { "enabling" } else { "disabling" };
        info!("{state} auto-eject mode for '{}'", device_name.display());
        let drive = sys.drives.open(device_name)?;
        eject::auto_eject(drive.as_ref(), on)?;
        return Ok(Some(Outcome::AutoEject(on)));
    }

    if let Some(tray) = opts.tray {
        let drive = sys.drives.open(device_name)?;
        match tray {
            TrayAction::Close => {
                info!("closing tray");
                eject::close_tray(drive.as_ref())?;
            }
            TrayAction::Toggle => {
                info!("toggling tray");
                eject::toggle_tray(drive.as_ref(), TRAY_ALREADY_OPEN)?;
            }
        }
        apply_speed(drive.as_ref(), opts.speed)?;
        return Ok(Some(Outcome::Tray(tray)));
    }

    // with -c the speed is set after the disc is selected
    if opts.changer_slot.is_none()
        && let Some(speed) = opts.speed
    {
        let drive = sys.drives.open(device_name)?;
        apply_speed(drive.as_ref(), Some(speed))?;
        return Ok(Some(Outcome::Speed(speed)));
    }

    Ok(None)
}

fn apply_speed(drive: &dyn Drive, speed: Option<i32>) -> Result<()> {
    let Some(speed) = speed else {
        return Ok(());
    };
    if speed == 0 {
        info!("setting CD-ROM speed to auto");
    } else {
        info!("setting CD-ROM speed to {speed}X");
    }
    eject::select_speed(drive, speed)
}

/// Unmounts the device itself, then any other mounted partition of the
/// same disk.
fn unmount_device(
    opts: &EjectOptions,
    sys: &System,
    mounted: Option<&MountEntry>,
    siblings: Option<&Regex>,
) -> Result<()> {
    let helper = &sys.paths.umount_helper;
    let mut done = HashSet::new();

    if let Some(entry) = mounted {
        info!("unmounting '{}'", entry.device);
        unmount_one(sys.runner, helper, &entry.device, opts.mount_table)?;
        done.insert(entry.device.clone());
    }

    let Some(pattern) = siblings else {
        return Ok(());
    };
    // read again: the table has changed if something was unmounted above
    let table = MountTable::read(sys.paths.mount_table(opts.mount_table))?;
    unmount_matching(
        sys.runner,
        helper,
        &table,
        pattern,
        opts.mount_table,
        &mut done,
    )
}
