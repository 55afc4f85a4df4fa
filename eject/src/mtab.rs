//! Mount table reading and lookup.
//!
//! Both `/etc/mtab` and `/proc/mounts` use the same line format: the
//! mounted device, the mount point, then fields we do not care about.
//! Whitespace inside a field is written as an octal escape (`\040`).

use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use nix::sys::stat::{major, minor};
use regex::Regex;
use tracing::trace;

use crate::error::{EjectError, Result};

/// Kernel identity of a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub major: u64,
    pub minor: u64,
}

pub trait DeviceIdentity {
    /// `None` unless `path` names a block device.
    fn device_id(&self, path: &str) -> Option<DeviceId>;
}

/// Identifies devices with `stat(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatIdentity;

impl DeviceIdentity for StatIdentity {
    fn device_id(&self, path: &str) -> Option<DeviceId> {
        let metadata = fs::metadata(path).ok()?;
        if !metadata.file_type().is_block_device() {
            return None;
        }
        let rdev = metadata.rdev();
        Some(DeviceId {
            major: major(rdev),
            minor: minor(rdev),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
}

#[derive(Debug, Clone, Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| EjectError::MountTableOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let device = fields.next()?;
                let mount_point = fields.next()?;
                Some(MountEntry {
                    device: unescape(device),
                    mount_point: unescape(mount_point),
                })
            })
            .collect();
        MountTable { entries }
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// Finds the entry for `name`, which may be either the device or the
    /// mount point. A device mounted under another alias is matched by its
    /// major/minor pair.
    pub fn find(&self, name: &str, identity: &dyn DeviceIdentity) -> Option<&MountEntry> {
        let wanted = identity.device_id(name);
        self.entries.iter().find(|entry| {
            if entry.device == name || entry.mount_point == name {
                return true;
            }
            match wanted {
                Some(id) => identity.device_id(&entry.device) == Some(id),
                None => false,
            }
        })
    }

    pub fn matching<'a>(&'a self, pattern: &'a Regex) -> impl Iterator<Item = &'a MountEntry> {
        self.entries.iter().filter(move |entry| {
            let hit = pattern.is_match(&entry.device);
            trace!("{} ~ {}: {hit}", entry.device, pattern);
            hit
        })
    }
}

/// Decodes `\ooo` octal escapes; anything malformed is kept verbatim.
fn unescape(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_string();
    }

    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
