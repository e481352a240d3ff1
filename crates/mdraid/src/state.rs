// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Disk state bits of the md superblock (`MD_DISK_*` in `linux/raid/md_p.h`)

use std::fmt;

/// Bit positions of the disk state flags
pub const MD_DISK_FAULTY: u32 = 0;
pub const MD_DISK_ACTIVE: u32 = 1;
pub const MD_DISK_SYNC: u32 = 2;
pub const MD_DISK_REMOVED: u32 = 3;
pub const MD_DISK_CLUSTER_ADD: u32 = 4;
pub const MD_DISK_CANDIDATE: u32 = 5;
pub const MD_DISK_WRITEMOSTLY: u32 = 9;
pub const MD_DISK_FAILFAST: u32 = 10;
pub const MD_DISK_JOURNAL: u32 = 18;

/// Rendering order and labels of the known flags
const LABELS: [(u32, &str); 9] = [
    (MD_DISK_FAULTY, "faulty"),
    (MD_DISK_ACTIVE, "active"),
    (MD_DISK_SYNC, "sync"),
    (MD_DISK_REMOVED, "removed"),
    (MD_DISK_WRITEMOSTLY, "writemostly"),
    (MD_DISK_FAILFAST, "failfast"),
    (MD_DISK_JOURNAL, "journal"),
    (MD_DISK_CANDIDATE, "spare"),
    (MD_DISK_CLUSTER_ADD, "clusteradd"),
];

/// The state bitmask of a disk as reported by `GET_DISK_INFO`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskState(pub u32);

impl DiskState {
    /// Whether the flag at bit position `bit` is set
    pub fn has(&self, bit: u32) -> bool {
        self.0 & (1 << bit) != 0
    }

    /// Labels of the set flags, in rendering order
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        LABELS
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, label)| *label)
    }
}

impl fmt::Display for DiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The driver leaves the state empty while a disk is being rebuilt
        if self.0 == 0 {
            return f.write_str("recovering");
        }

        let labels = self.labels().collect::<Vec<_>>();
        f.write_str(&labels.join(" "))
    }
}
