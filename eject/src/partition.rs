use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::error::Result;

/// Base names of devices that can carry several partitions.
pub static PARTITION_DEVICES: [&str; 9] =
    ["hd", "sd", "xd", "dos_hd", "mfm", "ad", "ed", "ftl", "pd"];

// e.g. /dev/hda or /dev/hda1
static PARTITIONED_NAME: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    PARTITION_DEVICES
        .iter()
        .filter_map(|prefix| {
            let pattern = format!("^/dev/{}([a-z])([0-9]?[0-9])?$", regex::escape(prefix));
            Regex::new(&pattern).ok().map(|re| (*prefix, re))
        })
        .collect()
});

/// If `device` is a disk (or a partition of one) whose siblings may be
/// mounted too, builds a pattern matching the whole disk and all of its
/// partitions.
pub fn sibling_pattern(device: &str) -> Result<Option<Regex>> {
    for (prefix, re) in PARTITIONED_NAME.iter() {
        let Some(caps) = re.captures(device) else {
            continue;
        };
        info!("'{device}' is a multipartition device");
        let pattern = format!(
            "^/dev/{}{}([0-9]?[0-9])?$",
            regex::escape(prefix),
            &caps[1]
        );
        return Ok(Some(Regex::new(&pattern)?));
    }

    info!("'{device}' is not a multipartition device");
    Ok(None)
}
