// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::time::Duration;

use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

pub const DEV_ROOT: &str = "/dev";
pub const SYS_ROOT: &str = "/sys";

/// A directory of device nodes or of symlinks to device nodes.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SearchDir {
    Root,
    ByUuid,
    ByLabel,
    ByPartuuid,
    ByPath,
    Mapper,
}

impl SearchDir {
    /// Location of the directory relative to the device root.
    pub fn relative_path(self) -> &'static str {
        match self {
            SearchDir::Root => "",
            SearchDir::ByUuid => "disk/by-uuid",
            SearchDir::ByLabel => "disk/by-label",
            SearchDir::ByPartuuid => "disk/by-partuuid",
            SearchDir::ByPath => "disk/by-path",
            SearchDir::Mapper => "mapper",
        }
    }
}

/// Directories consulted, in priority order, when a reference containing a
/// separator may name an entry of one of them.
pub const DISK_DIRS: [SearchDir; 4] = [
    SearchDir::Root,
    SearchDir::ByUuid,
    SearchDir::ByLabel,
    SearchDir::ByPartuuid,
];

/// Directories searched, in priority order, for a bare device name.
pub const NAME_SEARCH_DIRS: [SearchDir; 5] = [
    SearchDir::Root,
    SearchDir::ByUuid,
    SearchDir::ByLabel,
    SearchDir::ByPartuuid,
    SearchDir::Mapper,
];

/// Directories scanned for symlinks when describing a device.
pub const LINK_DIRS: [SearchDir; 6] = [
    SearchDir::Root,
    SearchDir::ByUuid,
    SearchDir::ByLabel,
    SearchDir::ByPartuuid,
    SearchDir::ByPath,
    SearchDir::Mapper,
];

// Limit on symlink hops, matching the kernel's MAXSYMLINKS.
pub const MAX_SYMLINK_HOPS: usize = 40;

// sysfs attribute file names
pub const SYSFS_PARTITION: &str = "partition";
pub const SYSFS_REMOVABLE: &str = "removable";
pub const SYSFS_SIZE: &str = "size";
pub const SYSFS_DEV: &str = "dev";

/// sysfs reports sizes in units of 512 byte sectors regardless of the
/// logical block size of the device.
pub const SYSFS_SECTOR_SIZE: u64 = 512;

/// Block major number of SCSI disks.
pub const SCSI_DISK_MAJOR: u32 = 8;

/// Prefix of the device-mapper name given to an opened LUKS device.
pub const DM_NAME_PREFIX: &str = "_dev_";

/// Closing a mapping immediately after it was formatted or opened can fail
/// spuriously, so luksClose is always preceded by this delay.
pub const LUKS_CLOSE_DELAY: Duration = Duration::from_millis(500);
