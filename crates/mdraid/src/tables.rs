// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Row generators for md arrays, their drives and the loaded personalities
//!
//! Every generator reads the status file afresh through the [`Backend`].
//! Failures are logged and produce fewer (or no) rows; nothing here returns
//! an error.

use log::{error, warn};
use serde::Serialize;
use serde_with::with_prefix;

use crate::{
    drives::{self, DriveRow},
    mdstat::{self, Array, Status},
    Backend,
};

with_prefix!(prefix_recovery "recovery_");
with_prefix!(prefix_resync "resync_");
with_prefix!(prefix_reshape "reshape_");
with_prefix!(prefix_check_array "check_array_");
with_prefix!(prefix_bitmap "bitmap_");

/// Progress of a recovery, resync, reshape or check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    /// e.g. `12.3% (100/800)`
    pub progress: String,
    /// Estimated time left, e.g. `1.2min`
    pub finish: String,
    /// e.g. `900K/sec`
    pub speed: String,
}

impl SyncProgress {
    /// Parses `<pct> (<done>/<total>) finish=<time> speed=<rate>`
    pub fn parse(line: &str) -> Option<Self> {
        let pieces = line.split_whitespace().collect::<Vec<_>>();
        let [percent, blocks, finish, speed] = pieces.as_slice() else {
            warn!("Unexpected recovery/resync line format: {}", line);
            return None;
        };

        Some(Self {
            progress: format!("{percent} {blocks}"),
            finish: finish.strip_prefix("finish=").unwrap_or(finish).to_owned(),
            speed: speed.strip_prefix("speed=").unwrap_or(speed).to_owned(),
        })
    }
}

/// Write-intent bitmap summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bitmap {
    /// e.g. `1/8 pages [4KB]`
    pub on_mem: String,
    /// e.g. `65536KB chunk`
    pub chunk_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_file: Option<String>,
}

impl Bitmap {
    /// Parses `<pages> [<mem>], <chunk>[, file: <path>]`
    pub fn parse(line: &str) -> Option<Self> {
        let parts = line.split(',').map(str::trim).collect::<Vec<_>>();
        if parts.len() < 2 {
            warn!("Unexpected bitmap line structure: {}", line);
            return None;
        }

        let external_file = parts
            .get(2)
            .and_then(|p| p.find("file:").map(|pos| p[pos + "file:".len()..].trim().to_owned()));

        Some(Self {
            on_mem: parts[0].to_owned(),
            chunk_size: parts[1].to_owned(),
            external_file,
        })
    }
}

/// Summary of one md array
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRow {
    pub device_name: String,
    pub status: String,
    pub raid_level: String,
    pub healthy_drives: String,
    pub usable_size: String,
    pub unused_devices: String,
    #[serde(flatten, with = "prefix_recovery")]
    pub recovery: Option<SyncProgress>,
    #[serde(flatten, with = "prefix_resync")]
    pub resync: Option<SyncProgress>,
    #[serde(flatten, with = "prefix_reshape")]
    pub reshape: Option<SyncProgress>,
    #[serde(flatten, with = "prefix_check_array")]
    pub check_array: Option<SyncProgress>,
    #[serde(flatten, with = "prefix_bitmap")]
    pub bitmap: Option<Bitmap>,
}

impl DeviceRow {
    /// Builds the summary of `array`; `unused` is the report wide unused device list
    pub fn new(array: &Array, unused: &str) -> Self {
        Self {
            device_name: array.name.clone(),
            status: array.status.clone(),
            raid_level: array.raid_level.clone(),
            healthy_drives: array.healthy_drives.clone(),
            usable_size: array.usable_size.clone(),
            unused_devices: unused.to_owned(),
            recovery: array.recovery.as_deref().and_then(SyncProgress::parse),
            resync: array.resync.as_deref().and_then(SyncProgress::parse),
            reshape: array.reshape.as_deref().and_then(SyncProgress::parse),
            check_array: array.check_array.as_deref().and_then(SyncProgress::parse),
            bitmap: array.bitmap.as_deref().and_then(Bitmap::parse),
        }
    }
}

/// A loaded RAID personality
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonalityRow {
    pub name: String,
}

/// Every row kind, produced from a single read of the status file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub devices: Vec<DeviceRow>,
    pub drives: Vec<DriveRow>,
    pub personalities: Vec<PersonalityRow>,
}

fn read_status<B: Backend + ?Sized>(backend: &B) -> Option<Status> {
    match backend.read_mdstat() {
        Ok(text) => Some(mdstat::parse(&text)),
        Err(e) => {
            error!("Unable to read mdstat: {}", e);
            None
        }
    }
}

fn devices_of(status: &Status) -> Vec<DeviceRow> {
    status
        .arrays
        .iter()
        .map(|array| DeviceRow::new(array, &status.unused))
        .collect()
}

fn drives_of<B: Backend + ?Sized>(backend: &B, status: &Status) -> Vec<DriveRow> {
    let mut rows = Vec::new();
    for array in &status.arrays {
        drives::for_array(backend, &array.name, &mut rows);
    }
    rows
}

fn personalities_of(status: &Status) -> Vec<PersonalityRow> {
    status
        .personality_names()
        .map(|name| PersonalityRow { name: name.to_owned() })
        .collect()
}

/// One row per array
pub fn md_devices<B: Backend + ?Sized>(backend: &B) -> Vec<DeviceRow> {
    read_status(backend).map(|s| devices_of(&s)).unwrap_or_default()
}

/// One row per slot of every array
pub fn md_drives<B: Backend + ?Sized>(backend: &B) -> Vec<DriveRow> {
    read_status(backend)
        .map(|s| drives_of(backend, &s))
        .unwrap_or_default()
}

/// One row per loaded personality
pub fn md_personalities<B: Backend + ?Sized>(backend: &B) -> Vec<PersonalityRow> {
    read_status(backend).map(|s| personalities_of(&s)).unwrap_or_default()
}

/// All rows from a single pass over the status file
pub fn report<B: Backend + ?Sized>(backend: &B) -> Report {
    let Some(status) = read_status(backend) else {
        return Report::default();
    };

    Report {
        devices: devices_of(&status),
        drives: drives_of(backend, &status),
        personalities: personalities_of(&status),
    }
}
