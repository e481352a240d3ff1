// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Block device registry lookups.
//!
//! Walks `/sys/class/block` to translate between short device names,
//! `/dev` paths and `(major, minor)` device numbers.

use std::{
    fmt, fs, io,
    num::ParseIntError,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::{debug, warn};

mod sysfs;

const SYSFS_DIR: &str = "sys/class/block";
const DEVFS_DIR: &str = "/dev";

/// A `(major, minor)` device number pair as found in sysfs `dev` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevNum {
    pub major: u32,
    pub minor: u32,
}

impl DevNum {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DevNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Error raised when a `major:minor` string cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDevNumError;

impl fmt::Display for ParseDevNumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected device number in the form major:minor")
    }
}

impl std::error::Error for ParseDevNumError {}

impl From<ParseIntError> for ParseDevNumError {
    fn from(_: ParseIntError) -> Self {
        Self
    }
}

impl FromStr for DevNum {
    type Err = ParseDevNumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s.trim().split_once(':').ok_or(ParseDevNumError)?;
        Ok(Self {
            major: major.parse()?,
            minor: minor.parse()?,
        })
    }
}

/// A block device registered with the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Name of the sysfs node (e.g. sda1, md0)
    name: String,
    /// Device number
    devnum: DevNum,
    /// Path to the device in /dev
    device: PathBuf,
}

impl BlockDevice {
    /// Creates a device from its sysfs node.
    ///
    /// # Arguments
    ///
    /// * `sysfs_dir` - The `class/block` directory, already rooted in the sysroot
    /// * `name` - The name of the node inside that directory
    ///
    /// # Returns
    ///
    /// `None` when the node has no readable `dev` attribute
    pub fn from_sysfs_path(sysfs_dir: &Path, name: &str) -> Option<Self> {
        let node = sysfs_dir.join(name);
        let devnum = sysfs::read::<DevNum>(&node, "dev")?;

        // DEVNAME may carry a subdirectory (e.g. "md/home"), prefer it to the node name
        let devname = sysfs::uevent(&node, "DEVNAME").unwrap_or_else(|| name.to_owned());

        Some(Self {
            name: name.to_owned(),
            devnum,
            device: PathBuf::from(DEVFS_DIR).join(devname),
        })
    }

    /// Discovers all block devices present in the system.
    pub fn discover() -> io::Result<Vec<BlockDevice>> {
        Self::discover_in_sysroot("/")
    }

    /// Discovers block devices in a specified sysroot directory.
    ///
    /// # Arguments
    ///
    /// * `sysroot` - Path to the system root directory
    ///
    /// # Returns
    ///
    /// A vector of discovered block devices or an IO error if the registry
    /// directory cannot be listed.
    pub fn discover_in_sysroot(sysroot: impl AsRef<Path>) -> io::Result<Vec<BlockDevice>> {
        let sysfs_dir = sysroot.as_ref().join(SYSFS_DIR);

        let mut devices = fs::read_dir(&sysfs_dir)?
            .filter_map(Result::ok)
            .filter_map(|e| Some(e.file_name().to_str()?.to_owned()))
            .filter_map(|name| Self::from_sysfs_path(&sysfs_dir, &name))
            .collect::<Vec<_>>();
        devices.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Discovered {} block devices in {:?}", devices.len(), sysfs_dir);
        Ok(devices)
    }

    /// Returns the sysfs name of the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the device number.
    pub fn devnum(&self) -> DevNum {
        self.devnum
    }

    /// Returns the path to the device in dev.
    pub fn device_path(&self) -> &Path {
        &self.device
    }

    /// Whether `name` identifies this device, either as its sysfs name or as
    /// a trailing component sequence of its dev path ("md0", "md/home", "/dev/sda").
    pub fn matches_name(&self, name: &str) -> bool {
        !name.is_empty() && (self.name == name || self.device.ends_with(name))
    }
}

/// Finds the device registered under `devnum` in the given sysroot.
pub fn find_by_devnum(sysroot: impl AsRef<Path>, devnum: DevNum) -> Option<BlockDevice> {
    discover_or_warn(sysroot.as_ref())
        .into_iter()
        .find(|d| d.devnum == devnum)
}

/// Finds the device known by `name` in the given sysroot.
pub fn find_by_name(sysroot: impl AsRef<Path>, name: &str) -> Option<BlockDevice> {
    discover_or_warn(sysroot.as_ref())
        .into_iter()
        .find(|d| d.matches_name(name))
}

fn discover_or_warn(sysroot: &Path) -> Vec<BlockDevice> {
    BlockDevice::discover_in_sysroot(sysroot).unwrap_or_else(|err| {
        warn!("Unable to list block devices under {:?}: {}", sysroot, err);
        Vec::new()
    })
}
