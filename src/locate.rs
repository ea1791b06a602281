// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Functions for resolving a user supplied device reference to the one
// canonical path of the device node it denotes.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use crate::{
    config::DevTree,
    consts::{DISK_DIRS, NAME_SEARCH_DIRS},
    errors::{Candidate, DevError, DevResult},
    links::{describe, normalize, resolve_symlinks},
};

fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// A bare name must be a single ordinary path component; "", "." and ".."
/// would otherwise name the search directories themselves.
fn is_valid_bare_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// If the relative path names an entry of one of the disk directories,
/// return that entry, otherwise the path unchanged. This makes, e.g.,
/// "disk/by-label/data" behave like the bare name "data". An entry must lie
/// strictly below the directory; ".." segments may not leave it.
fn substitute_disk_entry(tree: &DevTree, path: &Path) -> PathBuf {
    if path.is_relative() {
        if let Some(entry) = DISK_DIRS
            .iter()
            .map(|dir| {
                let dir = tree.dir(*dir);
                (normalize(&dir.join(path)), dir)
            })
            .filter(|(entry, dir)| entry != dir && entry.starts_with(dir))
            .map(|(entry, _)| entry)
            .find(|entry| entry_exists(entry))
        {
            return entry;
        }
    }
    path.to_path_buf()
}

/// Resolve start to a canonical path. Fail with NoSuchDevice if what the
/// chain of links ends in does not exist or is a directory.
fn canonicalize_entry(reference: &str, start: &Path) -> DevResult<PathBuf> {
    let canonical = resolve_symlinks(start)?;
    match fs::metadata(&canonical) {
        Ok(meta) if !meta.is_dir() => {
            debug!(
                "Resolved device reference {} via {} to {}",
                reference,
                start.display(),
                canonical.display()
            );
            Ok(canonical)
        }
        _ => Err(DevError::no_such_device(reference)),
    }
}

/// Resolve a device reference to the canonical path of the device.
///
/// A reference containing a separator is a path, possibly relative to one
/// of the disk directories. A bare name is looked for in each of the name
/// search directories in order and the first entry found is used.
pub fn resolve_canonical_path(tree: &DevTree, reference: &str) -> DevResult<PathBuf> {
    let start = if reference.contains('/') {
        substitute_disk_entry(tree, Path::new(reference))
    } else {
        if !is_valid_bare_name(reference) {
            return Err(DevError::no_such_device(reference));
        }
        NAME_SEARCH_DIRS
            .iter()
            .map(|dir| tree.dir(*dir).join(reference))
            .find(|entry| entry_exists(entry))
            .ok_or_else(|| DevError::no_such_device(reference))?
    };
    canonicalize_entry(reference, &start)
}

/// Resolve a device reference like resolve_canonical_path, but refuse to
/// guess: a bare name found in more than one of the name search
/// directories is an error which lists every candidate.
pub fn search_dev_path(tree: &DevTree, reference: &str) -> DevResult<PathBuf> {
    if reference.contains('/') {
        return resolve_canonical_path(tree, reference);
    }
    if !is_valid_bare_name(reference) {
        return Err(DevError::no_such_device(reference));
    }

    let mut matches = NAME_SEARCH_DIRS
        .iter()
        .map(|dir| tree.dir(*dir).join(reference))
        .filter(|entry| entry_exists(entry))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(DevError::no_such_device(reference)),
        1 => canonicalize_entry(reference, &matches.remove(0)),
        _ => {
            let candidates = matches
                .into_iter()
                .map(|path| {
                    let description = match resolve_symlinks(&path) {
                        Ok(canonical) => describe(tree, &canonical),
                        Err(err) => format!("unresolvable: {}", err),
                    };
                    Candidate { path, description }
                })
                .collect::<Vec<_>>();
            warn!(
                "Device reference {} matches {} devices",
                reference,
                candidates.len()
            );
            Err(DevError::TooManyDevices {
                reference: reference.to_owned(),
                candidates,
            })
        }
    }
}

/// Return true if both references denote the same device.
pub fn same_device(tree: &DevTree, first: &str, second: &str) -> DevResult<bool> {
    Ok(resolve_canonical_path(tree, first)? == resolve_canonical_path(tree, second)?)
}
