// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Functions for finding the symlinks which udev maintains for a device and
// for following symlinks to the device nodes they name.

use std::{
    env, fs, io,
    path::{Component, Path, PathBuf},
};

use itertools::Itertools;

use crate::{
    config::DevTree,
    consts::{SearchDir, LINK_DIRS, MAX_SYMLINK_HOPS},
};

/// The last component of the path, or the empty string if there is none.
pub fn leaf_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Normalize a path lexically: drop "." segments, apply ".." segments to
/// the preceding component, drop redundant and trailing separators.
/// ".." at the root stays at the root. The file system is not consulted.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                normalized.push(component.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
        }
    }
    normalized
}

/// Make the path absolute, relative to the current directory, and
/// normalize it.
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&env::current_dir()?.join(path)))
    }
}

/// Read a single symlink. A relative target is interpreted relative to the
/// directory containing the link. The result is normalized.
pub fn read_link_absolute(link: &Path) -> io::Result<PathBuf> {
    let target = fs::read_link(link)?;
    let dir = link.parent().unwrap_or_else(|| Path::new("/"));
    Ok(normalize(&dir.join(target)))
}

/// Follow the chain of symlinks starting at path until reaching something
/// that is not a symlink. The result is absolute and normalized. The result
/// may name a file which does not exist if the chain ends in a dangling
/// link; it is up to the caller to check.
pub fn resolve_symlinks(path: &Path) -> io::Result<PathBuf> {
    let mut current = absolute(path)?;
    for _ in 0..MAX_SYMLINK_HOPS {
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                current = read_link_absolute(&current)?;
            }
            _ => return Ok(current),
        }
    }
    Err(io::Error::other(format!(
        "Too many levels of symbolic links resolving {}",
        path.display()
    )))
}

/// All symlinks directly inside dir, sorted by name. A directory that does
/// not exist has no links; on systems without, e.g., partition UUIDs the
/// corresponding directory is simply absent.
pub fn list_symlinks(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("Unable to read directory {}: {}", dir.display(), err);
            }
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_symlink()))
        .map(|entry| entry.path())
        .sorted()
        .collect()
}

/// Find every symlink in dirs which resolves to canonical. Links are
/// returned grouped by directory, in the order of dirs, and sorted by name
/// within each directory.
pub fn find_links(tree: &DevTree, canonical: &Path, dirs: &[SearchDir]) -> Vec<PathBuf> {
    dirs.iter()
        .flat_map(|dir| list_symlinks(&tree.dir(*dir)))
        .filter(|link| {
            resolve_symlinks(link)
                .map(|target| target == canonical)
                .unwrap_or(false)
        })
        .collect()
}

/// Find every symlink in the default set of directories which resolves to
/// canonical.
pub fn find_all_links(tree: &DevTree, canonical: &Path) -> Vec<PathBuf> {
    find_links(tree, canonical, &LINK_DIRS)
}

/// The lexicographically least link to canonical among those in dirs.
pub fn primary_link(tree: &DevTree, canonical: &Path, dirs: &[SearchDir]) -> Option<PathBuf> {
    find_links(tree, canonical, dirs).into_iter().min()
}

/// Return the name of the first link in dir whose target has the same leaf
/// name as dev. Only leaf names are compared, so dev may be given by any
/// path that ends in the kernel name of the device.
pub fn link_name_in(tree: &DevTree, dir: SearchDir, dev: &Path) -> Option<String> {
    let dev_leaf = leaf_name(dev);
    if dev_leaf.is_empty() {
        return None;
    }
    let name = list_symlinks(&tree.dir(dir))
        .into_iter()
        .find(|link| {
            resolve_symlinks(link)
                .map(|target| leaf_name(&target) == dev_leaf)
                .unwrap_or(false)
        })
        .map(|link| leaf_name(&link));
    debug!(
        "link_name_in: dir {}, device {}, found {:?}",
        dir,
        dev.display(),
        name
    );
    name
}

/// Decode the \xHH escapes which udev uses in link names for bytes that
/// are unsafe in a file name, e.g., "My\x20Disk" for "My Disk".
pub fn decode_udev_escapes(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') {
            if let Some(byte) = bytes
                .get(i + 2..i + 4)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                decoded.push(byte);
                i += 4;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// The filesystem label of the device, if it has one.
pub fn fs_label(tree: &DevTree, dev: &Path) -> Option<String> {
    link_name_in(tree, SearchDir::ByLabel, dev).map(|name| decode_udev_escapes(&name))
}

/// The filesystem UUID of the device, if it has one.
pub fn fs_uuid(tree: &DevTree, dev: &Path) -> Option<String> {
    link_name_in(tree, SearchDir::ByUuid, dev)
}

/// The GPT partition UUID of the device, if it has one.
pub fn partuuid(tree: &DevTree, dev: &Path) -> Option<String> {
    link_name_in(tree, SearchDir::ByPartuuid, dev)
}

/// The name udev derives from the hardware path of the device, e.g.,
/// "pci-0000:00:14.0-usb-0:2:1.0-scsi-0:0:0:0".
pub fn hardware_path(tree: &DevTree, dev: &Path) -> Option<String> {
    link_name_in(tree, SearchDir::ByPath, dev)
}

/// The device-mapper name of the device, if it is a device-mapper node.
pub fn mapper_name(tree: &DevTree, dev: &Path) -> Option<String> {
    link_name_in(tree, SearchDir::Mapper, dev)
}

/// The label of the device if it has one, otherwise its name.
pub fn display_name(tree: &DevTree, dev: &Path) -> String {
    fs_label(tree, dev).unwrap_or_else(|| leaf_name(dev))
}

/// A one line description of a device which includes every link to it,
/// its label, and its UUID, e.g.,
/// "sdb1 (/dev/disk/by-label/data, /dev/disk/by-uuid/1234) label data uuid 1234".
pub fn describe(tree: &DevTree, canonical: &Path) -> String {
    let mut description = leaf_name(canonical);
    let links = find_all_links(tree, canonical);
    if !links.is_empty() {
        description.push_str(&format!(
            " ({})",
            links.iter().map(|l| l.display()).join(", ")
        ));
    }
    if let Some(label) = fs_label(tree, canonical) {
        description.push_str(&format!(" label {}", label));
    }
    if let Some(uuid) = fs_uuid(tree, canonical) {
        description.push_str(&format!(" uuid {}", uuid));
    }
    description
}
