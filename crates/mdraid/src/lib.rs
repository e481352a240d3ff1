// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Linux software RAID (md) status reporting
//!
//! The crate reads `/proc/mdstat`, queries the md driver for per-disk
//! superblock information and reconciles both into a slot indexed view of
//! every array's drives.
//!
//! All kernel access goes through the [`Backend`] trait so the reconciliation
//! logic can be driven by [`mock::MockBackend`] in tests. [`Kernel`] is the
//! implementation talking to the running system.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use blockdev::DevNum;
use thiserror::Error;

pub mod drives;
mod ioctl;
pub mod mdstat;
pub mod mock;
pub mod state;
pub mod tables;

pub use drives::DriveRow;
pub use tables::{DeviceRow, PersonalityRow};

/// Number of superblock disk slots the driver can report (`MD_SB_DISKS`)
pub const MD_SB_DISKS: i32 = 27;

const MDSTAT_PATH: &str = "proc/mdstat";

/// Errors that can occur while talking to the md driver
#[derive(Debug, Error)]
pub enum Error {
    /// Reading a status file failed
    #[error("io: {0}")]
    IO(#[from] io::Error),

    /// The array node could not be opened
    #[error("cannot open {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },

    /// The driver rejected a control request
    #[error("ioctl {request} on {path:?} failed: {source}")]
    Ioctl {
        request: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// No block device node is registered for the array
    #[error("no device node for {0}")]
    NoDevice(String),
}

/// Array wide metadata reported by the md driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrayInfo {
    /// RAID level (-1 linear, 0, 1, 4, 5, 6, 10)
    pub level: i32,
    /// Number of disks known to the superblock
    pub nr_disks: i32,
    /// Number of logical slots in the array
    pub raid_disks: i32,
    pub active_disks: i32,
    pub working_disks: i32,
    pub failed_disks: i32,
    pub spare_disks: i32,
}

/// Metadata for one superblock disk slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskInfo {
    /// Superblock slot number that was queried
    pub number: i32,
    /// Current logical slot, negative when the disk holds none
    pub raid_disk: i32,
    /// `MD_DISK_*` state bits
    pub state: u32,
    pub major: i32,
    pub minor: i32,
}

/// Access to the md driver and the block device registry.
///
/// Implementations carry no state between calls; every method reflects the
/// system as it is at the time of the call.
pub trait Backend {
    /// Returns the raw contents of the md status file
    fn read_mdstat(&self) -> Result<String, Error>;

    /// Queries array wide information for the array node at `path`
    fn array_info(&self, path: &Path) -> Result<ArrayInfo, Error>;

    /// Queries superblock slot `number` of the array node at `path`
    fn disk_info(&self, path: &Path, number: i32) -> Result<DiskInfo, Error>;

    /// Resolves a short device name (e.g. `md0`) to its device node
    fn path_by_dev_name(&self, name: &str) -> Option<PathBuf>;

    /// Resolves a device number to a device name (e.g. `/dev/sda1`)
    fn dev_name(&self, major: i32, minor: i32) -> Option<String>;
}

/// [`Backend`] for the running system, rooted at a sysroot.
#[derive(Debug, Clone)]
pub struct Kernel {
    sysroot: PathBuf,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Creates a backend for the host system
    pub fn new() -> Self {
        Self::with_sysroot("/")
    }

    /// Creates a backend reading `proc` and `sys` below `sysroot`
    pub fn with_sysroot(sysroot: impl Into<PathBuf>) -> Self {
        Self {
            sysroot: sysroot.into(),
        }
    }

    /// Returns the sysroot this backend reads from
    pub fn sysroot(&self) -> &Path {
        &self.sysroot
    }
}

impl Backend for Kernel {
    fn read_mdstat(&self) -> Result<String, Error> {
        Ok(fs::read_to_string(self.sysroot.join(MDSTAT_PATH))?)
    }

    fn array_info(&self, path: &Path) -> Result<ArrayInfo, Error> {
        ioctl::get_array_info(path)
    }

    fn disk_info(&self, path: &Path, number: i32) -> Result<DiskInfo, Error> {
        ioctl::get_disk_info(path, number)
    }

    fn path_by_dev_name(&self, name: &str) -> Option<PathBuf> {
        blockdev::find_by_name(&self.sysroot, name).map(|d| d.device_path().to_owned())
    }

    fn dev_name(&self, major: i32, minor: i32) -> Option<String> {
        let devnum = DevNum::new(major.try_into().ok()?, minor.try_into().ok()?);
        blockdev::find_by_devnum(&self.sysroot, devnum).map(|d| d.device_path().display().to_string())
    }
}
