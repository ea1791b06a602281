// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Code to format, open, and close LUKS devices by means of cryptsetup, and
// to pair an encrypted device with the device-mapper node of its open
// mapping.

use std::{
    ffi::OsString,
    fs::{self, File},
    path::{Path, PathBuf},
    thread,
};

use crate::{
    classify::{is_device_mapper_node, is_encrypted},
    cmd::{format_cmd, os_args, CommandRunner, CRYPTSETUP},
    config::{DevConfig, DevTree},
    consts::{DM_NAME_PREFIX, LUKS_CLOSE_DELAY},
    errors::{CmdError, DevError, DevResult},
    links::{leaf_name, mapper_name, resolve_symlinks},
    locate::resolve_canonical_path,
};

/// An open passphrase file. The size passed to cryptsetup is read from the
/// open handle, so it is the size of the file that cryptsetup is told to
/// read, even if the file was replaced since.
#[derive(Debug)]
pub struct KeyFile {
    file: File,
    path: PathBuf,
}

impl KeyFile {
    pub fn open(path: &Path) -> DevResult<KeyFile> {
        let file = File::open(path)?;
        Ok(KeyFile {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the key in bytes.
    pub fn size(&self) -> DevResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// The arguments which make cryptsetup read the key from this file.
    pub fn key_args(&self) -> DevResult<Vec<OsString>> {
        Ok(vec![
            OsString::from("--key-file"),
            self.path.as_os_str().to_owned(),
            OsString::from("--keyfile-size"),
            OsString::from(self.size()?.to_string()),
        ])
    }
}

/// Unwrap the command error inside err and wrap it with context; any
/// other error passes through unchanged.
fn with_cmd_context<F>(err: DevError, wrap: F) -> DevError
where
    F: FnOnce(CmdError) -> DevError,
{
    match err {
        DevError::Cmd(cause) => wrap(cause),
        other => other,
    }
}

/// The name under which an opened device appears in the mapper directory:
/// the prefix "_dev_" followed by the kernel name of the raw device.
pub fn dm_mapping_name(tree: &DevTree, raw: &str) -> DevResult<String> {
    let canonical = resolve_canonical_path(tree, raw)?;
    Ok(format!("{}{}", DM_NAME_PREFIX, leaf_name(&canonical)))
}

/// Formats, opens, and closes LUKS devices.
pub struct LuksMapper<'a, R>
where
    R: CommandRunner + ?Sized,
{
    config: &'a DevConfig,
    runner: &'a R,
}

impl<'a, R> LuksMapper<'a, R>
where
    R: CommandRunner + ?Sized,
{
    pub fn new(config: &'a DevConfig, runner: &'a R) -> LuksMapper<'a, R> {
        LuksMapper { config, runner }
    }

    /// Key arguments for the configured passphrase file, or none, in which
    /// case cryptsetup prompts for the passphrase.
    fn configured_key_args(&self) -> DevResult<Vec<OsString>> {
        match self.config.passphrase_file {
            Some(ref path) => KeyFile::open(path)?.key_args(),
            None => Ok(Vec::new()),
        }
    }

    fn cryptsetup(&self, args: &[OsString]) -> DevResult<()> {
        if self.config.dry_run {
            info!(
                "Dry run, not executing: {}",
                format_cmd(CRYPTSETUP, args)
            );
            return Ok(());
        }
        self.runner.run(CRYPTSETUP, args).map(|_| ())
    }

    /// Write a LUKS header to the device. Return the canonical path of the
    /// device which was formatted.
    pub fn format(&self, device: &str) -> DevResult<PathBuf> {
        let canonical = resolve_canonical_path(&self.config.tree, device)?;

        let mut args = os_args(["luksFormat"]);
        args.extend(self.configured_key_args()?);
        args.push(canonical.as_os_str().to_owned());

        info!("Formatting {} as a LUKS device", canonical.display());
        self.cryptsetup(&args).map_err(|err| {
            with_cmd_context(err, |cause| DevError::Luks {
                action: "luksFormat",
                target: canonical.display().to_string(),
                cause,
            })
        })?;
        Ok(canonical)
    }

    /// Open the LUKS device under the mapping name. The key is read from
    /// key if given, otherwise from the configured passphrase file.
    /// Return the path of the new node in the mapper directory.
    pub fn open(&self, device: &str, key: Option<&KeyFile>, name: &str) -> DevResult<PathBuf> {
        let canonical = resolve_canonical_path(&self.config.tree, device)?;

        let mut args = os_args(["luksOpen"]);
        args.extend(match key {
            Some(key) => key.key_args()?,
            None => self.configured_key_args()?,
        });
        args.push(canonical.as_os_str().to_owned());
        args.push(OsString::from(name));

        info!(
            "Opening LUKS device {} as mapping {}",
            canonical.display(),
            name
        );
        self.cryptsetup(&args).map_err(|err| {
            with_cmd_context(err, |cause| DevError::LuksMappingFailed {
                name: name.to_owned(),
                cause: Some(cause),
            })
        })?;

        let mapper = self.config.tree.mapper_dir().join(name);
        if !self.config.dry_run && !self.is_mapped(name) {
            return Err(DevError::LuksMappingFailed {
                name: name.to_owned(),
                cause: None,
            });
        }
        Ok(mapper)
    }

    /// Close the mapping with the given name.
    pub fn close(&self, name: &str) -> DevResult<()> {
        debug!(
            "Waiting {:?} before closing LUKS mapping {}",
            LUKS_CLOSE_DELAY,
            name
        );
        thread::sleep(LUKS_CLOSE_DELAY);

        info!("Closing LUKS mapping {}", name);
        self.cryptsetup(&os_args(["luksClose", name]))
            .map_err(|err| {
                with_cmd_context(err, |cause| DevError::Luks {
                    action: "luksClose",
                    target: name.to_owned(),
                    cause,
                })
            })
    }

    /// Return true if a node with the given name exists in the mapper
    /// directory.
    pub fn is_mapped(&self, name: &str) -> bool {
        fs::symlink_metadata(self.config.tree.mapper_dir().join(name)).is_ok()
    }
}

/// An encrypted device paired with the node of its open mapping. Either
/// side may be absent.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct MappingCorrelation {
    pub mapped: Option<PathBuf>,
    pub encrypted: Option<PathBuf>,
}

/// Find the raw device in the device root whose mapping name is name. If
/// several entries qualify the last one in name order is taken.
fn raw_device_for_mapping(tree: &DevTree, name: &str) -> DevResult<Option<PathBuf>> {
    let mut entries = fs::read_dir(&tree.dev_root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| !t.is_dir()))
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    entries.sort();

    Ok(entries
        .iter()
        .rev()
        .filter_map(|entry| resolve_symlinks(entry).ok())
        .find(|canonical| format!("{}{}", DM_NAME_PREFIX, leaf_name(canonical)) == name))
}

/// Pair the device given by reference disk with its counterpart.
///
/// For an encrypted device the counterpart is the node of its open mapping,
/// if it is open. For a device-mapper node it is the raw device whose
/// mapping name is the node's name. Any other device has no counterpart and
/// is returned as the mapped side.
pub fn correlate<R>(config: &DevConfig, runner: &R, disk: &str) -> DevResult<MappingCorrelation>
where
    R: CommandRunner + ?Sized,
{
    let tree = &config.tree;
    let canonical = resolve_canonical_path(tree, disk)?;

    let correlation = if is_encrypted(tree, runner, &canonical) {
        let name = format!("{}{}", DM_NAME_PREFIX, leaf_name(&canonical));
        let entry = tree.mapper_dir().join(&name);
        let mapped = if fs::symlink_metadata(&entry).is_ok() {
            let target = resolve_symlinks(&entry)?;
            if target.exists() {
                Some(target)
            } else {
                None
            }
        } else {
            None
        };
        MappingCorrelation {
            mapped,
            encrypted: Some(canonical),
        }
    } else if is_device_mapper_node(tree, &canonical) {
        let encrypted = match mapper_name(tree, &canonical) {
            Some(name) => raw_device_for_mapping(tree, &name)?,
            None => None,
        };
        MappingCorrelation {
            mapped: Some(canonical),
            encrypted,
        }
    } else {
        MappingCorrelation {
            mapped: Some(canonical),
            encrypted: None,
        }
    };

    debug!(
        "correlate: {} -> mapped {:?}, encrypted {:?}",
        disk, correlation.mapped, correlation.encrypted
    );
    Ok(correlation)
}
