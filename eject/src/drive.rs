//! Device commands for removable-media drives.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use tracing::trace;

use crate::error::{EjectError, Result};

/// The commands a removable-media drive may understand. Each one is a single
/// request to the driver; which of them actually work depends on the device.
pub trait Drive {
    fn cdrom_eject(&self) -> nix::Result<()>;
    fn scsi_eject(&self) -> nix::Result<()>;
    fn floppy_eject(&self) -> nix::Result<()>;
    fn tape_offline(&self) -> nix::Result<()>;
    fn set_auto_eject(&self, on: bool) -> nix::Result<()>;
    fn select_disc(&self, slot: i32) -> nix::Result<()>;
    fn close_tray(&self) -> nix::Result<()>;
    fn select_speed(&self, speed: i32) -> nix::Result<()>;
}

pub trait DriveOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn Drive>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BlockDeviceOpener;

impl DriveOpener for BlockDeviceOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn Drive>> {
        Ok(Box::new(BlockDevice::open(path)?))
    }
}

mod ioctl {
    // linux/cdrom.h
    const CDROMEJECT: u32 = 0x5309;
    const CDROMEJECT_SW: u32 = 0x530f;
    const CDROMCLOSETRAY: u32 = 0x5319;
    const CDROM_SELECT_SPEED: u32 = 0x5322;
    const CDROM_SELECT_DISC: u32 = 0x5323;
    // scsi/scsi_ioctl.h
    const SCSI_IOCTL_SEND_COMMAND: u32 = 1;

    pub const SCSI_CMD_LEN: usize = 256;

    /// `struct scsi_ioctl_command` with room for the command block.
    #[repr(C)]
    pub struct ScsiIoctlCommand {
        pub inlen: libc::c_uint,
        pub outlen: libc::c_uint,
        pub data: [u8; SCSI_CMD_LEN],
    }

    /// `struct mtop` from sys/mtio.h.
    #[repr(C)]
    pub struct MtOp {
        pub mt_op: libc::c_short,
        pub mt_count: libc::c_int,
    }

    nix::ioctl_none_bad!(cdrom_eject, CDROMEJECT);
    nix::ioctl_write_int_bad!(cdrom_eject_sw, CDROMEJECT_SW);
    nix::ioctl_none_bad!(cdrom_close_tray, CDROMCLOSETRAY);
    nix::ioctl_write_int_bad!(cdrom_select_speed, CDROM_SELECT_SPEED);
    nix::ioctl_write_int_bad!(cdrom_select_disc, CDROM_SELECT_DISC);
    nix::ioctl_readwrite_bad!(scsi_send_command, SCSI_IOCTL_SEND_COMMAND, ScsiIoctlCommand);
    // BLKRRPART = _IO(0x12, 95)
    nix::ioctl_none!(blk_rrpart, 0x12, 95);
    // FDEJECT = _IO(2, 0x5a)
    nix::ioctl_none!(fd_eject, 2, 0x5a);
    // MTIOCTOP = _IOW('m', 1, struct mtop)
    nix::ioctl_write_ptr!(mt_ioctop, b'm', 1, MtOp);
}

// SCSI opcodes
const ALLOW_MEDIUM_REMOVAL: u8 = 0x1e;
const START_STOP: u8 = 0x1b;
// START STOP UNIT byte 4: start the unit, then load/eject
const START_STOP_START: u8 = 0x01;
const START_STOP_EJECT: u8 = 0x02;

const MTOFFL: libc::c_short = 7;

/// An opened device node. The descriptor is non-blocking so a drive without
/// media can still be opened.
#[derive(Debug)]
pub struct BlockDevice {
    file: File,
}

impl BlockDevice {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| EjectError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        trace!("opened {}", path.display());
        Ok(BlockDevice { file })
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn send_scsi(&self, cdb: [u8; 6]) -> nix::Result<()> {
        let mut cmd = ioctl::ScsiIoctlCommand {
            inlen: 0,
            outlen: 0,
            data: [0; ioctl::SCSI_CMD_LEN],
        };
        cmd.data[..cdb.len()].copy_from_slice(&cdb);
        unsafe { ioctl::scsi_send_command(self.fd(), &mut cmd) }.map(drop)
    }
}

impl Drive for BlockDevice {
    fn cdrom_eject(&self) -> nix::Result<()> {
        unsafe { ioctl::cdrom_eject(self.fd()) }.map(drop)
    }

    fn scsi_eject(&self) -> nix::Result<()> {
        self.send_scsi([ALLOW_MEDIUM_REMOVAL, 0, 0, 0, 0, 0])?;
        self.send_scsi([START_STOP, 0, 0, 0, START_STOP_START, 0])?;
        self.send_scsi([START_STOP, 0, 0, 0, START_STOP_EJECT, 0])?;
        // make the kernel reread the partition table when a new disc goes in
        unsafe { ioctl::blk_rrpart(self.fd()) }.map(drop)
    }

    fn floppy_eject(&self) -> nix::Result<()> {
        unsafe { ioctl::fd_eject(self.fd()) }.map(drop)
    }

    fn tape_offline(&self) -> nix::Result<()> {
        let op = ioctl::MtOp {
            mt_op: MTOFFL,
            mt_count: 0,
        };
        unsafe { ioctl::mt_ioctop(self.fd(), &op) }.map(drop)
    }

    fn set_auto_eject(&self, on: bool) -> nix::Result<()> {
        unsafe { ioctl::cdrom_eject_sw(self.fd(), libc::c_int::from(on)) }.map(drop)
    }

    fn select_disc(&self, slot: i32) -> nix::Result<()> {
        unsafe { ioctl::cdrom_select_disc(self.fd(), slot) }.map(drop)
    }

    fn close_tray(&self) -> nix::Result<()> {
        unsafe { ioctl::cdrom_close_tray(self.fd()) }.map(drop)
    }

    fn select_speed(&self, speed: i32) -> nix::Result<()> {
        unsafe { ioctl::cdrom_select_speed(self.fd(), speed) }.map(drop)
    }
}
