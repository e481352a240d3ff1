// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `/proc/mdstat` parsing
//!
//! The status file is line oriented:
//!
//! ```text
//! Personalities : [raid1] [raid6] [raid5] [raid4]
//! md0 : active raid1 sdb1[1] sda1[0]
//!       976630464 blocks super 1.2 [2/2] [UU]
//!       [=>..................]  recovery = 8.5% (83064/976630) finish=1.2min speed=900K/sec
//!       bitmap: 1/8 pages [4KB], 65536KB chunk
//!
//! unused devices: <none>
//! ```
//!
//! Parsing never fails. Lines that do not fit the expected structure are
//! logged and skipped, and whatever could be extracted is returned.

use std::{convert::Infallible, fs, path::Path, str::FromStr};

use log::{debug, warn};

use crate::Error;

const PERSONALITIES: &str = "Personalities :";
const UNUSED_DEVICES: &str = "unused devices:";

/// A member device token from an array line, e.g. `sdb1[1]` or `sdc1[2](F)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drive {
    /// Device name without the position suffix
    pub name: String,
    /// Position inside the brackets
    pub position: usize,
    /// Marked `(F)`
    pub faulty: bool,
    /// Marked `(S)`
    pub spare: bool,
}

impl Drive {
    /// Parses a `name[position]` token.
    ///
    /// Tokens without a usable position are kept verbatim with position 0.
    pub fn parse(token: &str) -> Self {
        let faulty = token.ends_with("(F)");
        let spare = token.ends_with("(S)");

        let position = token
            .find('[')
            .and_then(|start| Some((start, start + token[start..].find(']')?)));
        let Some((start, end)) = position else {
            warn!("Unexpected drive name format: {}", token);
            return Self {
                name: token.to_owned(),
                faulty,
                spare,
                ..Default::default()
            };
        };

        let position = match token[start + 1..end].parse() {
            Ok(position) => position,
            Err(e) => {
                warn!("Unexpected drive position in {}: {}", token, e);
                return Self {
                    name: token.to_owned(),
                    faulty,
                    spare,
                    ..Default::default()
                };
            }
        };

        Self {
            name: token[..start].to_owned(),
            position,
            faulty,
            spare,
        }
    }
}

/// An md array block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Array {
    pub name: String,
    /// e.g. `active`, `inactive`
    pub status: String,
    /// e.g. `raid1`
    pub raid_level: String,
    pub drives: Vec<Drive>,
    /// Size and unit, e.g. `976630464 blocks`
    pub usable_size: String,
    /// Everything between the size and the drive counts, space prefixed
    pub other: String,
    /// e.g. `[2/2]`
    pub healthy_drives: String,
    /// e.g. `[UU]`
    pub drive_statuses: String,
    pub recovery: Option<String>,
    pub resync: Option<String>,
    pub reshape: Option<String>,
    pub check_array: Option<String>,
    pub bitmap: Option<String>,
}

/// Markers of the optional lines that can follow an array's config line
const CONTINUATIONS: [&str; 5] = ["recovery =", "resync =", "reshape =", "check =", "bitmap:"];

impl Array {
    fn apply_config(&mut self, line: &str) {
        let config = line.split_whitespace().collect::<Vec<_>>();
        if config.len() < 4 {
            warn!("Unexpected md device config: {}", line);
            return;
        }

        let last = config.len() - 1;
        self.usable_size = format!("{} {}", config[0], config[1]);
        self.healthy_drives = config[last - 1].to_owned();
        self.drive_statuses = config[last].to_owned();
        self.other = config[2..last - 1].iter().map(|c| format!(" {c}")).collect();
    }

    /// Stores the line if it is a progress or bitmap line of this array.
    ///
    /// Returns false if the line carries none of the known markers.
    fn apply_continuation(&mut self, line: &str) -> bool {
        let Some((index, value)) = CONTINUATIONS
            .iter()
            .enumerate()
            .find_map(|(i, marker)| Some((i, line[line.find(marker)? + marker.len()..].trim())))
        else {
            return false;
        };

        let field = match index {
            0 => &mut self.recovery,
            1 => &mut self.resync,
            2 => &mut self.reshape,
            3 => &mut self.check_array,
            _ => &mut self.bitmap,
        };
        *field = Some(value.to_owned());
        true
    }

    /// Per-slot health decoded from the drive status bitmap (`[UU_]`).
    ///
    /// Empty when the bitmap is not bracketed.
    pub fn slot_health(&self) -> Vec<bool> {
        self.drive_statuses
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .map(|s| s.chars().map(|c| c == 'U').collect())
            .unwrap_or_default()
    }

    /// Whether any slot in the drive status bitmap is down
    pub fn is_degraded(&self) -> bool {
        self.slot_health().contains(&false)
    }
}

/// Parsed contents of the status file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Raw personality list, e.g. `[raid1] [raid6]`
    pub personalities: String,
    pub arrays: Vec<Array>,
    /// Raw unused devices list, e.g. `<none>`
    pub unused: String,
}

impl Status {
    /// Names of the loaded personalities, without brackets
    pub fn personality_names(&self) -> impl Iterator<Item = &str> {
        self.personalities.split_whitespace().map(|p| {
            p.strip_prefix('[')
                .and_then(|p| p.strip_suffix(']'))
                .unwrap_or(p)
        })
    }
}

impl FromStr for Status {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse(s))
    }
}

/// Returns the trimmed, non-blank lines of `text`
pub fn lines(text: &str) -> Vec<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

/// Reads and parses the status file at `path`
pub fn read(path: impl AsRef<Path>) -> Result<Status, Error> {
    let text = fs::read_to_string(path)?;
    Ok(parse(&text))
}

/// Parses the text of the status file
pub fn parse(text: &str) -> Status {
    let lines = lines(text);
    let mut status = Status::default();
    let Some(first) = lines.first() else {
        return status;
    };

    let mut n = 0;
    match first.strip_prefix(PERSONALITIES) {
        Some(rest) => {
            status.personalities = rest.trim().to_owned();
            n = 1;
        }
        None => warn!("mdstat Personalities not found at line 0: {}", first),
    }

    while n < lines.len() {
        let line = lines[n];
        if line.starts_with("md") {
            let (array, last) = parse_array(&lines, n);
            if let Some(array) = array {
                debug!("Parsed md array {} ({} drives)", array.name, array.drives.len());
                status.arrays.push(array);
            }
            n = last;
        } else if line.starts_with("un") {
            match line.strip_prefix(UNUSED_DEVICES) {
                Some(rest) => status.unused = rest.trim().to_owned(),
                None => warn!("Unexpected mdstat line: {}", line),
            }
        } else {
            warn!("Unexpected mdstat line: {}", line);
        }
        n += 1;
    }

    status
}

/// Parses the array block starting at line `n`.
///
/// Returns the array, if any, and the index of the last line consumed.
fn parse_array(lines: &[&str], n: usize) -> (Option<Array>, usize) {
    let Some((name, settings)) = lines[n].split_once(':') else {
        warn!("Unexpected md device line structure: {}", lines[n]);
        return (None, n);
    };

    let mut array = Array {
        name: name.trim().to_owned(),
        ..Default::default()
    };

    // status and level always lead, member drives follow
    let settings = settings.split_whitespace().collect::<Vec<_>>();
    if let [status, raid_level, drives @ ..] = settings.as_slice() {
        array.status = (*status).to_owned();
        array.raid_level = (*raid_level).to_owned();
        array.drives = drives.iter().map(|d| Drive::parse(d)).collect();
    } else {
        warn!("Unexpected md device settings: {}", lines[n]);
    }

    match lines.get(n + 1) {
        Some(config) => array.apply_config(config),
        None => warn!("Missing config line for md device {}", array.name),
    }

    let mut last = n + 1;
    while let Some(line) = lines.get(last + 1) {
        if !array.apply_continuation(line) {
            break;
        }
        last += 1;
    }

    (Some(array), last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const RECOVERY: &str = include_str!("../tests/fixtures/recovery.mdstat");
    const BUSY: &str = include_str!("../tests/fixtures/busy.mdstat");

    fn drive(name: &str, position: usize) -> Drive {
        Drive {
            name: name.to_owned(),
            position,
            ..Default::default()
        }
    }

    #[test]
    fn test_recovery_fixture() {
        let status = parse(RECOVERY);
        assert_eq!(status.personalities, "[raid1] [raid6] [raid5] [raid4]");
        assert_eq!(status.unused, "<none>");
        assert_eq!(status.arrays.len(), 1);

        let md0 = &status.arrays[0];
        assert_eq!(md0.name, "md0");
        assert_eq!(md0.status, "active");
        assert_eq!(md0.raid_level, "raid5");
        assert_eq!(md0.drives, vec![drive("sdc1", 2), drive("sdb1", 1), drive("sda1", 0)]);
        assert_eq!(md0.usable_size, "1953260544 blocks");
        assert_eq!(md0.other, " super 1.2 level 5, 512k chunk, algorithm 2");
        assert_eq!(md0.healthy_drives, "[3/2]");
        assert_eq!(md0.drive_statuses, "[UU_]");
        assert_eq!(
            md0.recovery.as_deref(),
            Some("12.3% (100/800) finish=1.2min speed=900K/sec")
        );
        assert_eq!(md0.bitmap.as_deref(), Some("1/8 pages [4KB], 65536KB chunk"));
        assert_eq!(md0.resync, None);
        assert_eq!(md0.reshape, None);
        assert_eq!(md0.check_array, None);
        assert_eq!(md0.slot_health(), vec![true, true, false]);
        assert!(md0.is_degraded());
    }

    #[test]
    fn test_busy_fixture() {
        let status: Status = BUSY.parse().unwrap();
        let names = status.arrays.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["md1", "md2", "md3", "md4"]);
        assert_eq!(status.unused, "sdk1 sdl1");

        let md1 = &status.arrays[0];
        assert_eq!(md1.raid_level, "raid1");
        assert_eq!(md1.other, " super 1.2");
        assert!(md1.resync.as_deref().unwrap().starts_with("0.5% "));
        assert!(!md1.is_degraded());

        let md2 = &status.arrays[1];
        assert_eq!(md2.drives.len(), 4);
        assert!(md2.drives[3].faulty);
        assert_eq!(md2.drives[3].name, "sdf1");
        assert_eq!(md2.drives[3].position, 3);
        assert_eq!(md2.check_array.as_deref(), Some("5.3% (5198/97663) finish=75.1min speed=205088K/sec"));
        assert_eq!(
            md2.bitmap.as_deref(),
            Some("0/1 pages [0KB], 65536KB chunk, file: /var/md/md2-bitmap")
        );

        let md3 = &status.arrays[2];
        assert_eq!(md3.reshape.as_deref(), Some("17.6% (172236/976630) finish=3.1min speed=4096K/sec"));
        assert!(md3.drives[2].spare);

        // no continuation lines
        let md4 = &status.arrays[3];
        assert_eq!(md4.raid_level, "raid0");
        assert_eq!(md4.recovery, None);
        assert_eq!(md4.bitmap, None);
    }

    #[test]
    fn test_missing_personalities() {
        let status = parse("md0 : active raid1 sda1[0] sdb1[1]\n  1024 blocks [2/2] [UU]\n");
        assert_eq!(status.personalities, "");
        assert_eq!(status.arrays.len(), 1);
        assert_eq!(status.arrays[0].healthy_drives, "[2/2]");
    }

    #[test]
    fn test_drive_without_usable_position() {
        assert_eq!(Drive::parse("sdb1[-1]"), drive("sdb1[-1]", 0));

        let failed = Drive::parse("sdd1[](F)");
        assert_eq!(failed.name, "sdd1[](F)");
        assert_eq!(failed.position, 0);
        assert!(failed.faulty);
    }

    #[test]
    fn test_read_file() {
        let status = read(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/busy.mdstat")).unwrap();
        assert_eq!(status.arrays.len(), 4);
        assert_eq!(status.unused, "sdk1 sdl1");

        let missing = read(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/missing.mdstat"));
        assert!(matches!(missing, Err(Error::IO(_))));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let text = "\
Personalities : [raid1]
garbage here
md9 active raid1 without colon
md0 : active raid1 sda1 sdb1[x] sdc1[2]
      12 blocks
unused devices: <none>
";
        let status = parse(text);
        assert_eq!(status.arrays.len(), 1);

        let md0 = &status.arrays[0];
        assert_eq!(md0.drives[0], drive("sda1", 0));
        assert_eq!(md0.drives[1], drive("sdb1[x]", 0));
        assert_eq!(md0.drives[2], drive("sdc1", 2));
        // short config line leaves fields empty
        assert_eq!(md0.usable_size, "");
        assert_eq!(md0.drive_statuses, "");
        assert!(md0.slot_health().is_empty());
        assert_eq!(status.unused, "<none>");
    }

    #[test]
    fn test_truncated_input() {
        let status = parse("Personalities : [raid1]\nmd0 : active raid1 sda1[0]");
        assert_eq!(status.arrays.len(), 1);
        assert_eq!(status.arrays[0].usable_size, "");

        let status = parse("Personalities : [raid1]\nmd0 : inactive\n   8 blocks x [1/1] [U]");
        assert_eq!(status.arrays[0].status, "");
        assert_eq!(status.arrays[0].usable_size, "8 blocks");
        assert_eq!(status.arrays[0].other, " x");

        assert_eq!(parse(""), Status::default());
        assert_eq!(parse("\n   \n\t\n"), Status::default());
    }

    #[test]
    fn test_personality_names() {
        let status = parse("Personalities : [linear] [raid0] multipath\n");
        let names = status.personality_names().collect::<Vec<_>>();
        assert_eq!(names, vec!["linear", "raid0", "multipath"]);
    }
}
