// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Slot reconciliation of array members
//!
//! The driver only reports a logical slot (`raid_disk`) for disks the
//! superblock actively tracks. Faulty or removed disks lose it, so the slot
//! they used to occupy has to be inferred:
//!
//! 1. A disk with `raid_disk >= 0` owns that slot.
//! 2. A disk without one, queried at a superblock number below the array's
//!    disk count, is assumed to still sit at that number.
//! 3. Any other disk is ambiguous. Each unowned slot is handed to the most
//!    recently scanned ambiguous disk still waiting for one.
//! 4. Slots nobody claims are reported as removed, unknown drives.
//!
//! Step 3 is a heuristic. With more than one ambiguous disk pending there is
//! no way to tell which disk held which slot.

use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use serde::Serialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::{state::DiskState, Backend, Error, MD_SB_DISKS};

/// Drive name reported when a device number cannot be resolved
pub const UNKNOWN_DRIVE: &str = "unknown";

/// One slot of an md array
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveRow {
    pub md_device_name: String,
    pub drive_name: String,
    pub state: String,
    #[serde_as(as = "DisplayFromStr")]
    pub slot: u32,
}

impl DriveRow {
    fn removed(array: &str, slot: u32) -> Self {
        Self {
            md_device_name: array.to_owned(),
            drive_name: UNKNOWN_DRIVE.to_owned(),
            state: "removed".to_owned(),
            slot,
        }
    }
}

/// A live disk found while scanning the superblock numbers
#[derive(Debug)]
struct Member {
    drive_name: String,
    state: String,
    /// `None` while ambiguous
    slot: Option<u32>,
}

fn array_path<B: Backend + ?Sized>(backend: &B, array: &str) -> Result<PathBuf, Error> {
    backend
        .path_by_dev_name(array)
        .ok_or_else(|| Error::NoDevice(array.to_owned()))
}

/// Scans every superblock number of `path` and collects the live disks
fn scan<B: Backend + ?Sized>(backend: &B, array: &str, path: &Path, raid_disks: i32) -> Vec<Member> {
    let mut members = Vec::new();

    for number in 0..MD_SB_DISKS {
        let disk = match backend.disk_info(path, number) {
            Ok(disk) => disk,
            Err(e) => {
                warn!("Skipping disk {} of {}: {}", number, array, e);
                continue;
            }
        };

        // No device node behind this number
        if disk.major <= 0 {
            continue;
        }

        let slot = if disk.raid_disk >= 0 {
            Some(disk.raid_disk as u32)
        } else if number < raid_disks {
            Some(number as u32)
        } else {
            None
        };

        let drive_name = backend
            .dev_name(disk.major, disk.minor)
            .unwrap_or_else(|| UNKNOWN_DRIVE.to_owned());
        debug!(
            "{}: disk {} ({}:{}) -> {} slot {:?}",
            array, number, disk.major, disk.minor, drive_name, slot
        );

        members.push(Member {
            drive_name,
            state: DiskState(disk.state).to_string(),
            slot,
        });
    }

    members
}

/// Appends one row per slot of `array` to `rows`.
///
/// Nothing is appended if the array's device node cannot be resolved or the
/// driver refuses to describe the array.
pub fn for_array<B: Backend + ?Sized>(backend: &B, array: &str, rows: &mut Vec<DriveRow>) {
    let path = match array_path(backend, array) {
        Ok(path) => path,
        Err(e) => {
            error!("Could not get file path for {}: {}", array, e);
            return;
        }
    };

    let info = match backend.array_info(&path) {
        Ok(info) => info,
        Err(e) => {
            error!("Could not query array {}: {}", array, e);
            return;
        }
    };

    let mut members = scan(backend, array, &path, info.raid_disks);
    let mut removed = Vec::new();

    for slot in 0..info.raid_disks.max(0) as u32 {
        if members.iter().any(|m| m.slot == Some(slot)) {
            continue;
        }

        // Last seen wins, see module docs
        if let Some(member) = members.iter_mut().rev().find(|m| m.slot.is_none()) {
            debug!("{}: assigning slot {} to ambiguous {}", array, slot, member.drive_name);
            member.slot = Some(slot);
        } else {
            removed.push(DriveRow::removed(array, slot));
        }
    }

    for member in members {
        match member.slot {
            Some(slot) => rows.push(DriveRow {
                md_device_name: array.to_owned(),
                drive_name: member.drive_name,
                state: member.state,
                slot,
            }),
            None => warn!(
                "{}: no free slot left for {} ({}), dropping it",
                array, member.drive_name, member.state
            ),
        }
    }
    rows.extend(removed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mock::MockBackend, DiskInfo};
    use test_log::test;

    const ACTIVE_SYNC: u32 = 6;
    const FAULTY: u32 = 1;

    fn disk(number: i32, raid_disk: i32, state: u32) -> DiskInfo {
        DiskInfo {
            number,
            raid_disk,
            state,
            // unique device numbers per superblock number
            major: 8,
            minor: 100 + number,
        }
    }

    /// Runs `for_array` on md0 with `raid_disks` slots and the given disks,
    /// each resolving to `/dev/sda<number>`
    fn harness(raid_disks: i32, disks: &[DiskInfo]) -> Vec<DriveRow> {
        let mut md = MockBackend::new();
        md.add_array("md0", raid_disks);
        for d in disks {
            md.add_disk("md0", *d);
            md.add_device(d.major, d.minor, format!("/dev/sda{}", d.number));
        }

        let mut rows = Vec::new();
        for_array(&md, "md0", &mut rows);
        rows
    }

    fn row(drive: &str, state: &str, slot: u32) -> DriveRow {
        DriveRow {
            md_device_name: "md0".to_owned(),
            drive_name: drive.to_owned(),
            state: state.to_owned(),
            slot,
        }
    }

    fn sorted_slots(rows: &[DriveRow]) -> Vec<u32> {
        let mut slots = rows.iter().map(|r| r.slot).collect::<Vec<_>>();
        slots.sort();
        slots
    }

    #[test]
    fn test_all_drives_healthy() {
        let disks = (0..6).map(|i| disk(i, i, ACTIVE_SYNC)).collect::<Vec<_>>();
        let rows = harness(6, &disks);

        let expected = (0..6)
            .map(|i| row(&format!("/dev/sda{i}"), "active sync", i))
            .collect::<Vec<_>>();
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_all_drives_removed() {
        let rows = harness(6, &[]);
        let expected = (0..6).map(|i| row("unknown", "removed", i)).collect::<Vec<_>>();
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_all_disk_queries_fail() {
        let mut md = MockBackend::new();
        md.add_array("md0", 4);
        for number in 0..MD_SB_DISKS {
            md.fail_disk("md0", number);
        }

        let mut rows = Vec::new();
        for_array(&md, "md0", &mut rows);
        let expected = (0..4).map(|i| row("unknown", "removed", i)).collect::<Vec<_>>();
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_all_drives_faulty() {
        let disks = (0..6).map(|i| disk(i, i, FAULTY)).collect::<Vec<_>>();
        let rows = harness(6, &disks);

        let expected = (0..6)
            .map(|i| row(&format!("/dev/sda{i}"), "faulty", i))
            .collect::<Vec<_>>();
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_every_other_drive_faulty() {
        // faulty disks lost their slot but sit below the disk count
        let disks = [
            disk(0, -1, FAULTY),
            disk(1, 1, ACTIVE_SYNC),
            disk(2, -1, FAULTY),
            disk(3, 3, ACTIVE_SYNC),
            disk(4, -1, FAULTY),
            disk(5, 5, ACTIVE_SYNC),
        ];
        let rows = harness(6, &disks);

        let expected = vec![
            row("/dev/sda0", "faulty", 0),
            row("/dev/sda1", "active sync", 1),
            row("/dev/sda2", "faulty", 2),
            row("/dev/sda3", "active sync", 3),
            row("/dev/sda4", "faulty", 4),
            row("/dev/sda5", "active sync", 5),
        ];
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_some_drives_removed() {
        let disks = [disk(1, 1, ACTIVE_SYNC), disk(3, 3, ACTIVE_SYNC), disk(5, 5, ACTIVE_SYNC)];
        let rows = harness(6, &disks);

        let expected = vec![
            row("/dev/sda1", "active sync", 1),
            row("/dev/sda3", "active sync", 3),
            row("/dev/sda5", "active sync", 5),
            row("unknown", "removed", 0),
            row("unknown", "removed", 2),
            row("unknown", "removed", 4),
        ];
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_replacement_shares_slot_with_faulty() {
        // disk 6 took over slot 0 while faulty disk 0 is still attached
        let disks = [
            disk(0, -1, FAULTY),
            disk(1, 1, ACTIVE_SYNC),
            disk(3, 3, ACTIVE_SYNC),
            disk(4, 4, ACTIVE_SYNC),
            disk(5, -1, FAULTY),
            disk(6, 0, ACTIVE_SYNC),
        ];
        let rows = harness(6, &disks);

        let expected = vec![
            row("/dev/sda0", "faulty", 0),
            row("/dev/sda1", "active sync", 1),
            row("/dev/sda3", "active sync", 3),
            row("/dev/sda4", "active sync", 4),
            row("/dev/sda5", "faulty", 5),
            row("/dev/sda6", "active sync", 0),
            row("unknown", "removed", 2),
        ];
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_single_ambiguous_drive() {
        let disks = [
            disk(0, 0, ACTIVE_SYNC),
            disk(1, 1, ACTIVE_SYNC),
            disk(2, 2, ACTIVE_SYNC),
            disk(12, -1, FAULTY),
        ];
        let rows = harness(6, &disks);

        assert_eq!(rows.len(), 6);
        assert_eq!(sorted_slots(&rows), vec![0, 1, 2, 3, 4, 5]);
        // the ambiguous disk takes the first free slot
        assert_eq!(rows[3], row("/dev/sda12", "faulty", 3));
    }

    #[test]
    fn test_scattered_faulty_and_removed() {
        // two ambiguous disks: the one scanned last claims the first free slot
        let disks = [
            disk(1, 1, ACTIVE_SYNC),
            disk(3, 3, ACTIVE_SYNC),
            disk(5, 5, ACTIVE_SYNC),
            disk(9, -1, FAULTY),
            disk(17, -1, FAULTY),
        ];
        let rows = harness(6, &disks);

        let expected = vec![
            row("/dev/sda1", "active sync", 1),
            row("/dev/sda3", "active sync", 3),
            row("/dev/sda5", "active sync", 5),
            row("/dev/sda9", "faulty", 2),
            row("/dev/sda17", "faulty", 0),
            row("unknown", "removed", 4),
        ];
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_surplus_ambiguous_drive_is_dropped() {
        let disks = [disk(0, 0, ACTIVE_SYNC), disk(1, 1, ACTIVE_SYNC), disk(20, -1, FAULTY)];
        let rows = harness(2, &disks);
        assert_eq!(
            rows,
            vec![row("/dev/sda0", "active sync", 0), row("/dev/sda1", "active sync", 1)]
        );
    }

    #[test]
    fn test_unresolved_device_and_recovering_state() {
        let mut md = MockBackend::new();
        md.add_array("md0", 2);
        md.add_disk("md0", disk(0, 0, ACTIVE_SYNC));
        md.add_disk("md0", disk(1, 1, 0));

        let mut rows = Vec::new();
        for_array(&md, "md0", &mut rows);
        assert_eq!(
            rows,
            vec![row("unknown", "active sync", 0), row("unknown", "recovering", 1)]
        );
    }

    #[test]
    fn test_array_info_error() {
        let mut md = MockBackend::new();
        md.add_failing_array("md0");

        let mut rows = Vec::new();
        for_array(&md, "md0", &mut rows);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_unknown_array_path() {
        let md = MockBackend::new();
        let mut rows = vec![row("/dev/sdz", "active sync", 0)];
        for_array(&md, "md7", &mut rows);
        // existing rows are left alone
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_rows_accumulate() {
        let mut md = MockBackend::new();
        md.add_array("md0", 1);
        md.add_array("md1", 2);

        let mut rows = Vec::new();
        for_array(&md, "md0", &mut rows);
        for_array(&md, "md1", &mut rows);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].md_device_name, "md1");
    }

    #[test]
    fn test_serialize_slot_as_string() {
        let json = serde_json::to_value(row("/dev/sda1", "active sync", 3)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "md_device_name": "md0",
                "drive_name": "/dev/sda1",
                "state": "active sync",
                "slot": "3",
            })
        );
    }
}
