// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mock md backend for testing.
//!
//! This module provides a [`Backend`] whose arrays, disks and device names are
//! set up by hand, so reconciliation can be tested without real md arrays.

use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::{Path, PathBuf},
};

use crate::{state::MD_DISK_REMOVED, ArrayInfo, Backend, DiskInfo, Error};

/// A hand-configured array
#[derive(Debug, Clone, Default)]
struct MockArray {
    /// `None` makes `array_info` fail
    info: Option<ArrayInfo>,
    /// `None` entries make `disk_info` fail for that number
    disks: BTreeMap<i32, Option<DiskInfo>>,
}

/// Represents a mock md driver and block device registry.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    mdstat: Option<String>,
    paths: HashMap<String, PathBuf>,
    arrays: HashMap<PathBuf, MockArray>,
    devices: HashMap<(i32, i32), String>,
}

fn ioctl_error(request: &'static str, path: &Path) -> Error {
    Error::Ioctl {
        request,
        path: path.to_owned(),
        source: io::Error::from(io::ErrorKind::Unsupported),
    }
}

impl MockBackend {
    /// Creates an empty backend: no status file, no arrays, no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the text returned as the status file
    pub fn with_mdstat(mut self, text: impl Into<String>) -> Self {
        self.mdstat = Some(text.into());
        self
    }

    /// Registers array `name` at `/dev/<name>` with `raid_disks` slots
    pub fn add_array(&mut self, name: &str, raid_disks: i32) {
        let info = ArrayInfo {
            raid_disks,
            ..Default::default()
        };
        self.insert_array(name, Some(info));
    }

    /// Registers array `name` whose `GET_ARRAY_INFO` request fails
    pub fn add_failing_array(&mut self, name: &str) {
        self.insert_array(name, None);
    }

    fn insert_array(&mut self, name: &str, info: Option<ArrayInfo>) {
        let path = PathBuf::from("/dev").join(name);
        self.paths.insert(name.to_owned(), path.clone());
        self.arrays.insert(
            path,
            MockArray {
                info,
                ..Default::default()
            },
        );
    }

    /// Sets the disk reported for superblock number `disk.number`.
    ///
    /// Numbers without a disk report an empty, removed slot.
    pub fn add_disk(&mut self, array: &str, disk: DiskInfo) {
        if let Some(mock) = self.array_mut(array) {
            mock.disks.insert(disk.number, Some(disk));
        }
    }

    /// Makes `GET_DISK_INFO` fail for superblock number `number`
    pub fn fail_disk(&mut self, array: &str, number: i32) {
        if let Some(mock) = self.array_mut(array) {
            mock.disks.insert(number, None);
        }
    }

    /// Registers a device name for a device number
    pub fn add_device(&mut self, major: i32, minor: i32, name: impl Into<String>) {
        self.devices.insert((major, minor), name.into());
    }

    fn array_mut(&mut self, name: &str) -> Option<&mut MockArray> {
        let path = self.paths.get(name)?;
        self.arrays.get_mut(path)
    }
}

impl Backend for MockBackend {
    fn read_mdstat(&self) -> Result<String, Error> {
        self.mdstat
            .clone()
            .ok_or_else(|| Error::IO(io::Error::from(io::ErrorKind::NotFound)))
    }

    fn array_info(&self, path: &Path) -> Result<ArrayInfo, Error> {
        self.arrays
            .get(path)
            .and_then(|a| a.info)
            .ok_or_else(|| ioctl_error("GET_ARRAY_INFO", path))
    }

    fn disk_info(&self, path: &Path, number: i32) -> Result<DiskInfo, Error> {
        let array = self.arrays.get(path).ok_or_else(|| ioctl_error("GET_DISK_INFO", path))?;
        match array.disks.get(&number) {
            Some(Some(disk)) => Ok(*disk),
            Some(None) => Err(ioctl_error("GET_DISK_INFO", path)),
            None => Ok(DiskInfo {
                number,
                raid_disk: -1,
                state: 1 << MD_DISK_REMOVED,
                major: 0,
                minor: 0,
            }),
        }
    }

    fn path_by_dev_name(&self, name: &str) -> Option<PathBuf> {
        self.paths.get(name).cloned()
    }

    fn dev_name(&self, major: i32, minor: i32) -> Option<String> {
        self.devices.get(&(major, minor)).cloned()
    }
}
