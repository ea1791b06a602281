// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    fs,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::{config::DevTree, consts::LINK_DIRS};

/// A throwaway /dev and /sys hierarchy populated with regular files in
/// place of device nodes and sysfs attributes.
pub struct TestTree {
    _dir: TempDir,
    pub tree: DevTree,
}

impl TestTree {
    pub fn new() -> TestTree {
        let dir = tempfile::Builder::new()
            .prefix("devlocate")
            .tempdir()
            .unwrap();
        let tree = DevTree::new(dir.path().join("dev"), dir.path().join("sys"));
        for search_dir in LINK_DIRS {
            fs::create_dir_all(tree.dir(search_dir)).unwrap();
        }
        fs::create_dir_all(tree.sys_block()).unwrap();
        fs::create_dir_all(tree.class_block("")).unwrap();
        TestTree { _dir: dir, tree }
    }

    /// The path of an entry directly in the device root.
    pub fn dev(&self, name: &str) -> PathBuf {
        self.tree.dev_root.join(name)
    }

    /// Add a device node with no sysfs presence.
    pub fn add_node(&self, name: &str) -> PathBuf {
        let path = self.dev(name);
        fs::write(&path, b"").unwrap();
        path
    }

    /// Add a whole disk with the given "major:minor" and removable flag.
    pub fn add_disk(&self, name: &str, major_minor: &str, removable: bool) -> PathBuf {
        let path = self.add_node(name);
        let sys = self.tree.sys_block().join(name);
        fs::create_dir_all(&sys).unwrap();
        fs::write(sys.join("dev"), format!("{}\n", major_minor)).unwrap();
        fs::write(
            sys.join("removable"),
            if removable { "1\n" } else { "0\n" },
        )
        .unwrap();
        fs::create_dir_all(self.tree.class_block(name)).unwrap();
        path
    }

    /// Add a partition of an existing disk.
    pub fn add_partition(&self, disk: &str, name: &str, number: u32) -> PathBuf {
        let path = self.add_node(name);
        fs::create_dir_all(self.tree.sys_block().join(disk).join(name)).unwrap();
        let class = self.tree.class_block(name);
        fs::create_dir_all(&class).unwrap();
        fs::write(class.join("partition"), format!("{}\n", number)).unwrap();
        // Partitions carry their own removable attribute, which is always 0.
        fs::write(class.join("removable"), "0\n").unwrap();
        path
    }

    pub fn set_size(&self, name: &str, sectors: u64) {
        let class = self.tree.class_block(name);
        fs::create_dir_all(&class).unwrap();
        fs::write(class.join("size"), format!("{}\n", sectors)).unwrap();
    }

    /// Create a symlink named `name` in `dir` with the literal target.
    pub fn link(&self, dir: &Path, name: &str, target: &str) -> PathBuf {
        let path = dir.join(name);
        symlink(target, &path).unwrap();
        path
    }
}
