use clap::Parser;

use crate::config::MountTableSource;
use crate::eject::MethodSet;

#[derive(Parser, Debug, Default)]
#[command(
    name = "eject",
    version,
    about = "Eject removable media",
    after_help = "By default tries -r, -s, -f, and -q in order until success."
)]
pub struct Cli {
    /// Device or mount point
    #[arg(value_name = "DEVICE|MOUNTPOINT")]
    pub device: Option<String>,

    /// Display default device
    #[arg(short, long)]
    pub default: bool,

    /// Turn auto-eject feature on or off
    #[arg(short, long = "auto", value_name = "on|off", value_parser = parse_switch)]
    pub auto: Option<bool>,

    /// Switch discs on a CD-ROM changer
    #[arg(short, long = "changerslot", value_name = "SLOT")]
    pub changer_slot: Option<u32>,

    /// Close tray
    #[arg(short = 't', long = "trayclose")]
    pub tray_close: bool,

    /// Toggle tray
    #[arg(short = 'T', long = "traytoggle")]
    pub tray_toggle: bool,

    /// Set CD-ROM max speed (0 is auto)
    #[arg(short = 'x', long = "cdspeed", value_name = "SPEED")]
    pub cd_speed: Option<u32>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Don't eject, just show device found
    #[arg(short, long)]
    pub noop: bool,

    /// Eject CD-ROM
    #[arg(short = 'r', long)]
    pub cdrom: bool,

    /// Eject SCSI device
    #[arg(short, long)]
    pub scsi: bool,

    /// Eject floppy
    #[arg(short, long)]
    pub floppy: bool,

    /// Eject tape
    #[arg(short = 'q', long)]
    pub tape: bool,

    /// Use /proc/mounts instead of /etc/mtab
    #[arg(short, long)]
    pub proc: bool,

    /// Do not unmount device even if it is mounted
    #[arg(short = 'm', long = "no-unmount")]
    pub no_unmount: bool,
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "1" | "on" => Ok(true),
        "0" | "off" => Ok(false),
        _ => Err(format!("invalid argument to --auto/-a option: '{value}'")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    Close,
    Toggle,
}

/// Everything a run needs to know, fixed once the command line is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EjectOptions {
    pub device: Option<String>,
    pub show_default: bool,
    pub auto_eject: Option<bool>,
    pub changer_slot: Option<i32>,
    pub tray: Option<TrayAction>,
    pub speed: Option<i32>,
    pub verbose: bool,
    pub noop: bool,
    pub methods: MethodSet,
    pub mount_table: MountTableSource,
    pub no_unmount: bool,
}

impl From<&Cli> for EjectOptions {
    fn from(cli: &Cli) -> Self {
        // closing wins when both tray flags are given
        let tray = if cli.tray_close {
            Some(TrayAction::Close)
        } else if cli.tray_toggle {
            Some(TrayAction::Toggle)
        } else {
            None
        };

        EjectOptions {
            device: cli.device.clone(),
            show_default: cli.default,
            auto_eject: cli.auto,
            changer_slot: cli.changer_slot.map(clamp_int),
            tray,
            speed: cli.cd_speed.map(clamp_int),
            verbose: cli.verbose,
            noop: cli.noop,
            methods: MethodSet {
                cdrom: cli.cdrom,
                scsi: cli.scsi,
                floppy: cli.floppy,
                tape: cli.tape,
            },
            mount_table: if cli.proc {
                MountTableSource::Proc
            } else {
                MountTableSource::Mtab
            },
            no_unmount: cli.no_unmount,
        }
    }
}

fn clamp_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
