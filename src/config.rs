// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use crate::consts::{SearchDir, DEV_ROOT, SYS_ROOT};

/// The roots of the device and sysfs hierarchies. Every directory consulted
/// is computed from these two, so a synthetic tree may stand in for the
/// real one.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DevTree {
    pub dev_root: PathBuf,
    pub sys_root: PathBuf,
}

impl Default for DevTree {
    fn default() -> DevTree {
        DevTree::new(DEV_ROOT, SYS_ROOT)
    }
}

impl DevTree {
    pub fn new<P, Q>(dev_root: P, sys_root: Q) -> DevTree
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        DevTree {
            dev_root: dev_root.into(),
            sys_root: sys_root.into(),
        }
    }

    pub fn dir(&self, dir: SearchDir) -> PathBuf {
        match dir {
            SearchDir::Root => self.dev_root.clone(),
            _ => self.dev_root.join(dir.relative_path()),
        }
    }

    pub fn mapper_dir(&self) -> PathBuf {
        self.dir(SearchDir::Mapper)
    }

    /// The directory of all block devices, disks and partitions alike,
    /// i.e., /sys/class/block/<leaf>.
    pub fn class_block(&self, leaf: &str) -> PathBuf {
        self.sys_root.join("class").join("block").join(leaf)
    }

    /// The directory of whole disks, i.e., /sys/block.
    pub fn sys_block(&self) -> PathBuf {
        self.sys_root.join("block")
    }
}

/// Settings threaded through every operation that needs them.
#[derive(Debug, Clone, Default)]
pub struct DevConfig {
    pub tree: DevTree,
    /// File holding the LUKS passphrase. If None, cryptsetup prompts.
    pub passphrase_file: Option<PathBuf>,
    /// Log cryptsetup invocations rather than executing them.
    pub dry_run: bool,
}

impl DevConfig {
    pub fn with_tree(mut self, tree: DevTree) -> DevConfig {
        self.tree = tree;
        self
    }

    pub fn with_passphrase_file(mut self, path: &Path) -> DevConfig {
        self.passphrase_file = Some(path.to_path_buf());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> DevConfig {
        self.dry_run = dry_run;
        self
    }
}
