//! Turning whatever the user typed into a path naming a real file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{EjectError, Result};

/// Looks `name` up literally when it looks like a path, otherwise under `dev_dir`.
pub fn find_device(name: &str, dev_dir: &Path) -> Option<PathBuf> {
    // joining "" would name the device directory itself
    if name.is_empty() {
        return None;
    }

    if name.starts_with('.') || name.starts_with('/') {
        let path = PathBuf::from(name);
        return path.exists().then_some(path);
    }

    let path = dev_dir.join(name);
    debug!("trying {}", path.display());
    path.exists().then_some(path)
}

/// `/mnt/cdrom/` from shell completion means `/mnt/cdrom`. A bare `/` becomes
/// empty and therefore names nothing.
pub fn strip_trailing_slash(name: &str) -> &str {
    name.strip_suffix('/').unwrap_or(name)
}

/// Follows a chain of symbolic links, at most `max_depth` hops long.
pub fn follow_links(path: &Path, max_depth: usize) -> Result<PathBuf> {
    let mut current = path.to_path_buf();
    let mut hops = 0;

    while let Ok(target) = fs::read_link(&current) {
        if hops == max_depth {
            return Err(EjectError::LinkDepthExceeded(current));
        }

        let next = if target.is_absolute() {
            target
        } else {
            match current.parent() {
                Some(parent) => parent.join(&target),
                None => target,
            }
        };
        info!("'{}' is a link to '{}'", current.display(), next.display());

        current = next;
        hops += 1;
    }

    Ok(current)
}

pub fn resolve_device(name: &str, dev_dir: &Path, max_depth: usize) -> Result<PathBuf> {
    let full_name =
        find_device(name, dev_dir).ok_or_else(|| EjectError::DeviceNotFound(name.to_string()))?;
    info!("expanded name is '{}'", full_name.display());

    follow_links(&full_name, max_depth)
}
