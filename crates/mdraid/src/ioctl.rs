// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Raw md driver ioctls.
//!
//! Mirrors of `mdu_array_info_t` and `mdu_disk_info_t` from `linux/raid/md_u.h`
//! and the two read-only requests issued against an array node. Every
//! `unsafe` call in the crate lives here.

use std::{fs::File, io, mem::size_of, os::fd::AsRawFd, path::Path};

use log::{debug, error};
use nix::libc;
use zerocopy::{FromBytes, FromZeros};

use crate::{ArrayInfo, DiskInfo, Error};

/// Major number of md devices (`MD_MAJOR` in `linux/major.h`)
const MD_MAJOR: u8 = 9;

const GET_ARRAY_INFO_NR: u8 = 0x11;
const GET_DISK_INFO_NR: u8 = 0x12;

/// Array wide information as returned by `GET_ARRAY_INFO`
#[derive(Debug, FromBytes)]
#[repr(C)]
struct MduArrayInfo {
    // generic constant information
    major_version: i32,
    minor_version: i32,
    patch_version: i32,
    ctime: u32,
    level: i32,
    size: i32,
    nr_disks: i32,
    raid_disks: i32,
    md_minor: i32,
    not_persistent: i32,
    // generic state information
    utime: u32,
    state: i32,
    active_disks: i32,
    working_disks: i32,
    failed_disks: i32,
    spare_disks: i32,
    // personality information
    layout: i32,
    chunk_size: i32,
}

/// Per-disk information as exchanged with `GET_DISK_INFO`
#[derive(Debug, FromBytes)]
#[repr(C)]
struct MduDiskInfo {
    number: i32,
    major: i32,
    minor: i32,
    raid_disk: i32,
    state: i32,
}

impl From<MduArrayInfo> for ArrayInfo {
    fn from(raw: MduArrayInfo) -> Self {
        Self {
            level: raw.level,
            nr_disks: raw.nr_disks,
            raid_disks: raw.raid_disks,
            active_disks: raw.active_disks,
            working_disks: raw.working_disks,
            failed_disks: raw.failed_disks,
            spare_disks: raw.spare_disks,
        }
    }
}

impl From<MduDiskInfo> for DiskInfo {
    fn from(raw: MduDiskInfo) -> Self {
        Self {
            number: raw.number,
            raid_disk: raw.raid_disk,
            state: raw.state as u32,
            major: raw.major,
            minor: raw.minor,
        }
    }
}

fn open(path: &Path) -> Result<File, Error> {
    File::open(path).map_err(|source| Error::Open {
        path: path.to_owned(),
        source,
    })
}

/// Issues `GET_ARRAY_INFO` against the array node at `path`
///
/// # Arguments
/// * `path` - Path to the md array device (e.g. `/dev/md0`)
///
/// # Returns
/// The array information, or an error if the node cannot be opened or the
/// driver rejects the request
pub(crate) fn get_array_info(path: &Path) -> Result<ArrayInfo, Error> {
    let file = open(path)?;
    let mut info = MduArrayInfo::new_zeroed();
    let request = nix::request_code_read!(MD_MAJOR, GET_ARRAY_INFO_NR, size_of::<MduArrayInfo>());

    let res = unsafe { libc::ioctl(file.as_raw_fd(), request as _, &mut info) };
    if res < 0 {
        let source = io::Error::last_os_error();
        error!("GET_ARRAY_INFO for {:?} failed: {}", path, source);
        return Err(Error::Ioctl {
            request: "GET_ARRAY_INFO",
            path: path.to_owned(),
            source,
        });
    }

    debug!(
        "{:?}: level {} with {} raid disks ({} active)",
        path, info.level, info.raid_disks, info.active_disks
    );
    Ok(info.into())
}

/// Issues `GET_DISK_INFO` for superblock slot `number` of the array at `path`
///
/// # Arguments
/// * `path` - Path to the md array device
/// * `number` - Superblock slot number to query, in `0..MD_SB_DISKS`
pub(crate) fn get_disk_info(path: &Path, number: i32) -> Result<DiskInfo, Error> {
    let file = open(path)?;
    let mut info = MduDiskInfo::new_zeroed();
    info.number = number;
    let request = nix::request_code_read!(MD_MAJOR, GET_DISK_INFO_NR, size_of::<MduDiskInfo>());

    let res = unsafe { libc::ioctl(file.as_raw_fd(), request as _, &mut info) };
    if res < 0 {
        let source = io::Error::last_os_error();
        debug!("GET_DISK_INFO {} for {:?} failed: {}", number, path, source);
        return Err(Error::Ioctl {
            request: "GET_DISK_INFO",
            path: path.to_owned(),
            source,
        });
    }

    Ok(info.into())
}
