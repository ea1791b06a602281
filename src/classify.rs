// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Predicates and attribute readers which classify a block device.
//!
//! Every function here reads the current state of sysfs, the device
//! directories, or blkid output, and changes nothing. A missing or
//! unparseable attribute means false, zero, or None; it is never an error.
//! Each predicate logs its decision at debug level together with the
//! inputs that it used.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde_derive::Serialize;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
    cmd::{blkid_attr, CommandRunner},
    config::DevTree,
    consts::{
        SCSI_DISK_MAJOR, SYSFS_DEV, SYSFS_PARTITION, SYSFS_REMOVABLE, SYSFS_SECTOR_SIZE,
        SYSFS_SIZE,
    },
    links::{
        describe, display_name, fs_label, fs_uuid, hardware_path, leaf_name, mapper_name,
        partuuid,
    },
};

/// What the content of a device is used for, as blkid sees it.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, AsRefStr, Display, EnumIter, EnumString, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FsUsage {
    Filesystem,
    Crypto,
}

fn decision(predicate: &str, dev: &Path, inputs: fmt::Arguments<'_>, result: bool) -> bool {
    debug!(
        "{}: device {}, {} -> {}",
        predicate,
        dev.display(),
        inputs,
        result
    );
    result
}

/// Read a sysfs attribute, trimmed of surrounding whitespace.
fn read_attr(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_owned())
}

/// Return true if the device is a partition of some disk.
pub fn is_partition(tree: &DevTree, dev: &Path) -> bool {
    let attr = tree.class_block(&leaf_name(dev)).join(SYSFS_PARTITION);
    let exists = attr.exists();
    decision(
        "is_partition",
        dev,
        format_args!("{} exists: {}", attr.display(), exists),
        exists,
    )
}

/// The kernel name of the disk which holds the device if the device is a
/// partition, otherwise the kernel name of the device itself.
pub fn disk_leaf_name(tree: &DevTree, dev: &Path) -> String {
    let leaf = leaf_name(dev);
    if !is_partition(tree, dev) {
        return leaf;
    }

    let sys_block = tree.sys_block();
    let mut disks = match fs::read_dir(&sys_block) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect::<Vec<_>>(),
        Err(err) => {
            warn!("Unable to read directory {}: {}", sys_block.display(), err);
            Vec::new()
        }
    };
    disks.sort();

    match disks.iter().find(|disk| disk.join(&leaf).exists()) {
        Some(disk) => {
            let disk = leaf_name(disk);
            debug!(
                "disk_leaf_name: partition {} belongs to disk {}",
                dev.display(),
                disk
            );
            disk
        }
        None => {
            debug!(
                "disk_leaf_name: no disk in {} holds partition {}",
                sys_block.display(),
                dev.display()
            );
            leaf
        }
    }
}

/// Return true if the disk holding the device has removable media. For a
/// partition the attribute of its disk is used, since partitions always
/// report 0.
pub fn is_removable(tree: &DevTree, dev: &Path) -> bool {
    let disk = disk_leaf_name(tree, dev);
    let attr = tree.sys_block().join(&disk).join(SYSFS_REMOVABLE);
    let value = read_attr(&attr);
    let removable = value
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
        .is_some_and(|v| v != 0);
    decision(
        "is_removable",
        dev,
        format_args!("disk {}, {}: {:?}", disk, attr.display(), value),
        removable,
    )
}

/// Parse the block major number from the "major:minor" text of a sysfs
/// dev attribute.
fn parse_major(dev_attr: &str) -> Option<u32> {
    dev_attr.split(':').next().and_then(|m| m.trim().parse().ok())
}

/// Return true if the device is a whole SCSI disk, which includes SATA
/// and USB mass storage. Optical drives, device-mapper nodes, and
/// partitions are not disks.
pub fn is_disk_device(tree: &DevTree, dev: &Path) -> bool {
    let attr = tree.sys_block().join(leaf_name(dev)).join(SYSFS_DEV);
    let value = read_attr(&attr);
    let major = value.as_deref().and_then(parse_major);
    decision(
        "is_disk_device",
        dev,
        format_args!("{}: {:?}, major {:?}", attr.display(), value, major),
        major == Some(SCSI_DISK_MAJOR),
    )
}

/// Return true if some entry in the mapper directory names the device.
pub fn is_device_mapper_node(tree: &DevTree, dev: &Path) -> bool {
    let name = mapper_name(tree, dev);
    let result = name.is_some();
    decision(
        "is_device_mapper_node",
        dev,
        format_args!("mapper name {:?}", name),
        result,
    )
}

/// The filesystem type blkid reports for the device, e.g., "ext4" or
/// "crypto_LUKS".
pub fn filesystem_type<R>(runner: &R, dev: &Path) -> Option<String>
where
    R: CommandRunner + ?Sized,
{
    blkid_attr(runner, dev, "TYPE")
}

/// The partition table UUID blkid reports for a disk.
pub fn partition_table_uuid<R>(runner: &R, dev: &Path) -> Option<String>
where
    R: CommandRunner + ?Sized,
{
    blkid_attr(runner, dev, "PTUUID")
}

/// Classify a filesystem type string.
pub fn usage_of_type(fs_type: Option<&str>) -> Option<FsUsage> {
    match fs_type {
        Some(t) if t.contains("crypto") => Some(FsUsage::Crypto),
        Some(t) if !t.is_empty() => Some(FsUsage::Filesystem),
        _ => None,
    }
}

/// What the content of the device is used for, or None if blkid finds
/// no recognizable content.
pub fn filesystem_usage<R>(runner: &R, dev: &Path) -> Option<FsUsage>
where
    R: CommandRunner + ?Sized,
{
    let fs_type = filesystem_type(runner, dev);
    let usage = usage_of_type(fs_type.as_deref());
    debug!(
        "filesystem_usage: device {}, type {:?} -> {:?}",
        dev.display(),
        fs_type,
        usage
    );
    usage
}

/// Return true if the device holds LUKS encrypted content. An open
/// mapping is not itself encrypted; what blkid reports for it is the type
/// of the decrypted content.
pub fn is_encrypted<R>(tree: &DevTree, runner: &R, dev: &Path) -> bool
where
    R: CommandRunner + ?Sized,
{
    let usage = filesystem_usage(runner, dev);
    // The mapper directory is only consulted for crypto content.
    let is_dm = (usage == Some(FsUsage::Crypto)).then(|| is_device_mapper_node(tree, dev));
    decision(
        "is_encrypted",
        dev,
        format_args!("usage {:?}, device-mapper node {:?}", usage, is_dm),
        is_dm == Some(false),
    )
}

/// Return true if the device holds a filesystem or encrypted content.
pub fn is_filesystem<R>(runner: &R, dev: &Path) -> bool
where
    R: CommandRunner + ?Sized,
{
    let usage = filesystem_usage(runner, dev);
    decision(
        "is_filesystem",
        dev,
        format_args!("usage {:?}", usage),
        usage.is_some(),
    )
}

/// Return true if the hardware path of the device passes through USB.
pub fn is_usb_connected(tree: &DevTree, dev: &Path) -> bool {
    let path = hardware_path(tree, dev);
    let usb = path
        .as_deref()
        .is_some_and(|p| p.to_ascii_lowercase().contains("usb"));
    decision(
        "is_usb_connected",
        dev,
        format_args!("hardware path {:?}", path),
        usb,
    )
}

/// The size of the device in bytes, or 0 if sysfs does not report it.
pub fn size_bytes(tree: &DevTree, dev: &Path) -> u64 {
    read_attr(&tree.class_block(&leaf_name(dev)).join(SYSFS_SIZE))
        .and_then(|s| s.parse::<u64>().ok())
        .and_then(|sectors| sectors.checked_mul(SYSFS_SECTOR_SIZE))
        .unwrap_or(0)
}

/// Everything that is known about a device, gathered at one moment.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeviceDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub label: Option<String>,
    pub uuid: Option<String>,
    pub partuuid: Option<String>,
    pub partition_table_uuid: Option<String>,
    pub fs_type: Option<String>,
    pub usage: Option<FsUsage>,
    pub size: u64,
    pub is_partition: bool,
    pub is_disk: bool,
    pub is_removable: bool,
    pub is_dm: bool,
    pub is_encrypted: bool,
    pub is_usb: bool,
}

impl DeviceDescriptor {
    /// Gather a descriptor for the device at the canonical path dev.
    pub fn probe<R>(tree: &DevTree, runner: &R, dev: &Path) -> DeviceDescriptor
    where
        R: CommandRunner + ?Sized,
    {
        let fs_type = filesystem_type(runner, dev);
        let usage = usage_of_type(fs_type.as_deref());
        let is_dm = is_device_mapper_node(tree, dev);
        let partition = is_partition(tree, dev);
        DeviceDescriptor {
            path: dev.to_path_buf(),
            name: leaf_name(dev),
            display_name: display_name(tree, dev),
            description: describe(tree, dev),
            label: fs_label(tree, dev),
            uuid: fs_uuid(tree, dev),
            partuuid: partuuid(tree, dev),
            partition_table_uuid: if partition {
                None
            } else {
                partition_table_uuid(runner, dev)
            },
            fs_type,
            usage,
            size: size_bytes(tree, dev),
            is_partition: partition,
            is_disk: is_disk_device(tree, dev),
            is_removable: is_removable(tree, dev),
            is_dm,
            is_encrypted: usage == Some(FsUsage::Crypto) && !is_dm,
            is_usb: is_usb_connected(tree, dev),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::{
        consts::SearchDir,
        tests::{logger::init_logger, runner::FakeRunner, tree::TestTree},
    };

    use super::*;

    /// A removable USB disk sdb with two partitions, a fixed disk sda, an
    /// optical drive sr0, and an open mapping of sdb1 at dm-0.
    fn sample_tree() -> TestTree {
        init_logger();
        let tt = TestTree::new();
        tt.add_disk("sda", "8:0", false);
        tt.add_disk("sdb", "8:16", true);
        tt.add_partition("sdb", "sdb1", 1);
        tt.add_partition("sdb", "sdb2", 2);
        tt.add_disk("sr0", "11:0", true);
        tt.add_disk("dm-0", "254:0", false);
        tt.link(&tt.tree.mapper_dir(), "_dev_sdb1", "../dm-0");
        tt.link(
            &tt.tree.dir(SearchDir::ByPath),
            "pci-0000:00:14.0-USB-0:2:1.0-scsi-0:0:0:0",
            "../../sdb",
        );
        tt.link(
            &tt.tree.dir(SearchDir::ByPath),
            "pci-0000:00:14.0-usb-0:2:1.0-scsi-0:0:0:0-part1",
            "../../sdb1",
        );
        tt.link(
            &tt.tree.dir(SearchDir::ByPath),
            "pci-0000:00:17.0-ata-1",
            "../../sda",
        );
        tt
    }

    #[test]
    fn test_is_partition() {
        let tt = sample_tree();
        assert!(is_partition(&tt.tree, &tt.dev("sdb1")));
        assert!(!is_partition(&tt.tree, &tt.dev("sdb")));
        assert!(!is_partition(&tt.tree, &tt.dev("nonexistent")));
    }

    #[test]
    // Both partitions of sdb belong to sdb and take its removable flag.
    fn test_disk_leaf_name_and_removable() {
        let tt = sample_tree();
        assert_eq!(disk_leaf_name(&tt.tree, &tt.dev("sdb1")), "sdb");
        assert_eq!(disk_leaf_name(&tt.tree, &tt.dev("sdb2")), "sdb");
        assert_eq!(disk_leaf_name(&tt.tree, &tt.dev("sda")), "sda");

        assert!(is_removable(&tt.tree, &tt.dev("sdb")));
        assert!(is_removable(&tt.tree, &tt.dev("sdb1")));
        assert!(is_removable(&tt.tree, &tt.dev("sdb2")));
        assert!(!is_removable(&tt.tree, &tt.dev("sda")));
        assert!(!is_removable(&tt.tree, &tt.dev("nonexistent")));
    }

    #[test]
    fn test_is_disk_device() {
        let tt = sample_tree();
        assert!(is_disk_device(&tt.tree, &tt.dev("sda")));
        assert!(is_disk_device(&tt.tree, &tt.dev("sdb")));
        assert!(!is_disk_device(&tt.tree, &tt.dev("sdb1")));
        assert!(!is_disk_device(&tt.tree, &tt.dev("sr0")));
        assert!(!is_disk_device(&tt.tree, &tt.dev("dm-0")));
        assert!(!is_disk_device(&tt.tree, &tt.dev("nonexistent")));
    }

    #[test]
    fn test_parse_major() {
        assert_eq!(parse_major("8:0"), Some(8));
        assert_eq!(parse_major("254:3"), Some(254));
        assert_eq!(parse_major("garbage"), None);
        assert_eq!(parse_major(""), None);
    }

    #[test]
    fn test_filesystem_usage() {
        let runner = FakeRunner::new()
            .with_blkid("/dev/sdb1", "TYPE", "crypto_LUKS\n")
            .with_blkid("/dev/sdb2", "TYPE", "ext4\n")
            .with_blkid("/dev/sdc", "TYPE", "");
        assert_eq!(
            filesystem_usage(&runner, Path::new("/dev/sdb1")),
            Some(FsUsage::Crypto)
        );
        assert_eq!(
            filesystem_usage(&runner, Path::new("/dev/sdb2")),
            Some(FsUsage::Filesystem)
        );
        assert_eq!(filesystem_usage(&runner, Path::new("/dev/sdc")), None);
        assert!(is_filesystem(&runner, Path::new("/dev/sdb1")));
        assert!(is_filesystem(&runner, Path::new("/dev/sdb2")));
        assert!(!is_filesystem(&runner, Path::new("/dev/sdc")));
    }

    #[test]
    fn test_fs_usage_strings() {
        assert_eq!(FsUsage::Crypto.to_string(), "crypto");
        assert_eq!(FsUsage::Filesystem.as_ref(), "filesystem");
        assert_eq!(FsUsage::from_str("crypto").unwrap(), FsUsage::Crypto);
    }

    #[test]
    // An open mapping is never reported as encrypted, even if its content
    // is itself LUKS.
    fn test_is_encrypted() {
        let tt = sample_tree();
        let sdb1 = tt.dev("sdb1");
        let dm0 = tt.dev("dm-0");
        let runner = FakeRunner::new()
            .with_blkid(&sdb1.display().to_string(), "TYPE", "crypto_LUKS")
            .with_blkid(&dm0.display().to_string(), "TYPE", "crypto_LUKS");
        assert!(is_device_mapper_node(&tt.tree, &dm0));
        assert!(!is_device_mapper_node(&tt.tree, &sdb1));
        assert!(is_encrypted(&tt.tree, &runner, &sdb1));
        assert!(!is_encrypted(&tt.tree, &runner, &dm0));
        assert!(!is_encrypted(&tt.tree, &runner, &tt.dev("sda")));

        // Decrypted content of a mapping is never encrypted either.
        let runner = FakeRunner::new().with_blkid(&dm0.display().to_string(), "TYPE", "ext4");
        assert!(!is_encrypted(&tt.tree, &runner, &dm0));
    }

    #[test]
    fn test_is_usb_connected() {
        let tt = sample_tree();
        assert!(is_usb_connected(&tt.tree, &tt.dev("sdb")));
        assert!(is_usb_connected(&tt.tree, &tt.dev("sdb1")));
        assert!(!is_usb_connected(&tt.tree, &tt.dev("sda")));
        assert!(!is_usb_connected(&tt.tree, &tt.dev("sdb2")));
    }

    #[test]
    fn test_size_bytes() {
        let tt = sample_tree();
        tt.set_size("sdb1", 2048);
        assert_eq!(size_bytes(&tt.tree, &tt.dev("sdb1")), 1_048_576);
        assert_eq!(size_bytes(&tt.tree, &tt.dev("sdb2")), 0);
    }

    #[test]
    fn test_probe() {
        let tt = sample_tree();
        let sdb1 = tt.dev("sdb1");
        let sdb = tt.dev("sdb");
        tt.set_size("sdb1", 4096);
        tt.link(&tt.tree.dir(SearchDir::ByLabel), "vault", "../../sdb1");
        tt.link(&tt.tree.dir(SearchDir::ByUuid), "0c1d-77", "../../sdb1");
        let runner = FakeRunner::new()
            .with_blkid(&sdb1.display().to_string(), "TYPE", "crypto_LUKS")
            .with_blkid(&sdb.display().to_string(), "PTUUID", "5f3e0a2b");

        let descriptor = DeviceDescriptor::probe(&tt.tree, &runner, &sdb1);
        assert_eq!(descriptor.name, "sdb1");
        assert_eq!(descriptor.display_name, "vault");
        assert_eq!(descriptor.label.as_deref(), Some("vault"));
        assert_eq!(descriptor.uuid.as_deref(), Some("0c1d-77"));
        assert_eq!(descriptor.fs_type.as_deref(), Some("crypto_LUKS"));
        assert_eq!(descriptor.usage, Some(FsUsage::Crypto));
        assert_eq!(descriptor.size, 2_097_152);
        assert_eq!(descriptor.partition_table_uuid, None);
        assert!(descriptor.description.starts_with("sdb1 ("));
        assert!(descriptor.description.ends_with("label vault uuid 0c1d-77"));
        assert!(descriptor.is_partition);
        assert!(!descriptor.is_disk);
        assert!(descriptor.is_removable);
        assert!(!descriptor.is_dm);
        assert!(descriptor.is_encrypted);
        assert!(descriptor.is_usb);

        let disk = DeviceDescriptor::probe(&tt.tree, &runner, &sdb);
        assert_eq!(disk.partition_table_uuid.as_deref(), Some("5f3e0a2b"));
        assert!(disk.is_disk);
        assert_eq!(disk.usage, None);
    }

    #[test]
    // A whole disk which is not a SCSI disk still reports its partition
    // table.
    fn test_probe_virtio_disk() {
        let tt = sample_tree();
        let vda = tt.add_disk("vda", "252:0", false);
        let runner =
            FakeRunner::new().with_blkid(&vda.display().to_string(), "PTUUID", "77aa01ee");

        let descriptor = DeviceDescriptor::probe(&tt.tree, &runner, &vda);
        assert!(!descriptor.is_disk);
        assert!(!descriptor.is_partition);
        assert_eq!(descriptor.partition_table_uuid.as_deref(), Some("77aa01ee"));
    }
}
