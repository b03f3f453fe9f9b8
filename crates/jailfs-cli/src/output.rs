//! Formatted output helpers for CLI commands.
//!
//! Provides the mount table layout, per-record details, mount option
//! names, and human-readable byte formatting.

use std::fmt::Write;

use jailfs_common::types::{MountFlags, StatsRecord};
use serde::Serialize;

/// Option names for the visible mount flags, in display order.
const FLAG_NAMES: [(MountFlags, &str); 11] = [
    (MountFlags::SYNCHRONOUS, "sync"),
    (MountFlags::NOEXEC, "noexec"),
    (MountFlags::NOSUID, "nosuid"),
    (MountFlags::NODEV, "nodev"),
    (MountFlags::UNION, "union"),
    (MountFlags::ASYNC, "async"),
    (MountFlags::LOCAL, "local"),
    (MountFlags::QUOTA, "quota"),
    (MountFlags::ROOTFS, "rootfs"),
    (MountFlags::USER, "user"),
    (MountFlags::NOATIME, "noatime"),
];

/// Formats a byte count into a human-readable string (e.g., "128 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Comma-separated mount options, `ro` or `rw` first.
#[must_use]
pub fn format_flags(flags: MountFlags) -> String {
    let mode = if flags.contains(MountFlags::RDONLY) {
        "ro"
    } else {
        "rw"
    };
    std::iter::once(mode)
        .chain(
            FLAG_NAMES
                .iter()
                .filter(|(flag, _)| flags.contains(*flag))
                .map(|(_, name)| *name),
        )
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders records as a `df`-style table.
#[must_use]
pub fn mount_table(records: &[StatsRecord]) -> String {
    let mut out = format!(
        "{:<24} {:<20} {:<8} {:>10} {:>10} {:>10}  {}\n",
        "FILESYSTEM", "MOUNTED ON", "TYPE", "SIZE", "USED", "AVAIL", "OPTIONS"
    );
    for r in records {
        let used = r.blocks.saturating_sub(r.blocks_free);
        let _ = writeln!(
            out,
            "{:<24} {:<20} {:<8} {:>10} {:>10} {:>10}  {}",
            r.mount_from_name,
            r.mount_on_name,
            r.fs_type,
            format_bytes(r.blocks.saturating_mul(r.block_size)),
            format_bytes(used.saturating_mul(r.block_size)),
            format_bytes(r.blocks_avail.saturating_mul(r.block_size)),
            format_flags(r.flags),
        );
    }
    out
}

/// Renders one record as `key: value` lines.
#[must_use]
pub fn record_details(r: &StatsRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "mounted on:  {}", r.mount_on_name);
    let _ = writeln!(out, "mounted from: {}", r.mount_from_name);
    let _ = writeln!(out, "type:        {}", r.fs_type);
    let _ = writeln!(out, "options:     {}", format_flags(r.flags));
    let _ = writeln!(out, "block size:  {}", r.block_size);
    let _ = writeln!(
        out,
        "blocks:      {} total, {} free, {} available",
        r.blocks, r.blocks_free, r.blocks_avail
    );
    let _ = writeln!(out, "files:       {} total, {} free", r.files, r.files_free);
    let _ = writeln!(out, "fsid:        {:#x}:{:#x}", r.fsid[0], r.fsid[1]);
    out
}

/// Pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(on: &str) -> StatsRecord {
        let mut r = StatsRecord {
            block_size: 4096,
            blocks: 1024,
            blocks_free: 256,
            blocks_avail: 200,
            flags: MountFlags::RDONLY | MountFlags::LOCAL,
            ..StatsRecord::default()
        };
        r.set_mount_on_name(on);
        r.set_mount_from_name("/dev/ad0s1a");
        r.set_fs_type("ufs");
        r
    }

    #[test]
    fn format_bytes_displays_bytes() {
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn format_bytes_displays_kib() {
        assert_eq!(format_bytes(2048), "2.0 KiB");
    }

    #[test]
    fn format_bytes_displays_mib() {
        assert_eq!(format_bytes(134_217_728), "128.0 MiB");
    }

    #[test]
    fn format_bytes_displays_gib() {
        assert_eq!(format_bytes(2_147_483_648), "2.0 GiB");
    }

    #[test]
    fn format_flags_lists_mode_first() {
        assert_eq!(format_flags(MountFlags::default()), "rw");
        assert_eq!(
            format_flags(MountFlags::RDONLY | MountFlags::NOSUID | MountFlags::LOCAL),
            "ro,nosuid,local"
        );
    }

    #[test]
    fn mount_table_has_header_and_one_row_per_record() {
        let table = mount_table(&[record("/"), record("/tmp")]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("FILESYSTEM"));
        assert!(lines[2].contains("/tmp"));
        assert!(lines[1].contains("4.0 MiB"));
        assert!(lines[1].contains("3.0 MiB"));
        assert!(lines[1].ends_with("ro,local"));
    }

    #[test]
    fn record_details_shows_displayed_path() {
        let details = record_details(&record("/var/log"));
        assert!(details.starts_with("mounted on:  /var/log\n"));
        assert!(details.contains("ufs"));
    }

    #[test]
    fn json_output_round_trips_the_path() {
        let json = to_json(&record("/")).expect("serializable");
        let back: StatsRecord = serde_json::from_str(&json).expect("parse");
        assert_eq!(back.mount_on_name, "/");
    }
}
