// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    error::Error,
    fmt, io,
    path::{Path, PathBuf},
};

use itertools::Itertools;

pub type DevResult<T> = Result<T, DevError>;

/// The way in which an external command failed.
#[derive(Debug)]
pub enum CmdFailure {
    /// The command could not be started at all.
    Spawn(io::Error),
    /// The command ran and exited unsuccessfully. The code is None if the
    /// process was terminated by a signal.
    Status { code: Option<i32>, stderr: String },
}

/// An external command invocation that did not succeed. Records the full
/// command line so that the failure can be reproduced by hand.
#[derive(Debug)]
pub struct CmdError {
    pub cmd: String,
    pub failure: CmdFailure,
}

impl CmdError {
    pub fn spawn(cmd: String, err: io::Error) -> CmdError {
        CmdError {
            cmd,
            failure: CmdFailure::Spawn(err),
        }
    }

    pub fn status(cmd: String, code: Option<i32>, stderr: String) -> CmdError {
        CmdError {
            cmd,
            failure: CmdFailure::Status { code, stderr },
        }
    }

    /// The exit code of the command, if it ran and exited normally.
    pub fn code(&self) -> Option<i32> {
        match self.failure {
            CmdFailure::Status { code, .. } => code,
            CmdFailure::Spawn(_) => None,
        }
    }

    /// Captured standard error output; empty if the command never ran.
    pub fn stderr(&self) -> &str {
        match self.failure {
            CmdFailure::Status { ref stderr, .. } => stderr,
            CmdFailure::Spawn(_) => "",
        }
    }
}

impl fmt::Display for CmdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failure {
            CmdFailure::Spawn(ref err) => {
                write!(f, "failed to execute command \"{}\": {}", self.cmd, err)
            }
            CmdFailure::Status { code, ref stderr } => {
                match code {
                    Some(code) => write!(f, "command \"{}\" exited with status {}", self.cmd, code)?,
                    None => write!(f, "command \"{}\" was terminated by a signal", self.cmd)?,
                }
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    Ok(())
                } else {
                    write!(f, ": {}", stderr)
                }
            }
        }
    }
}

impl Error for CmdError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self.failure {
            CmdFailure::Spawn(ref err) => Some(err),
            CmdFailure::Status { .. } => None,
        }
    }
}

/// One of several devices that matched a single reference.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Candidate {
    pub path: PathBuf,
    pub description: String,
}

#[derive(Debug)]
pub enum DevError {
    /// No device matched the reference.
    NoSuchDevice { reference: String },
    /// More than one device matched the reference.
    TooManyDevices {
        reference: String,
        candidates: Vec<Candidate>,
    },
    /// Devices which were expected not to be mounted are mounted.
    MountedDevice { devices: Vec<PathBuf> },
    /// Opening a LUKS mapping did not produce the mapper node. The cause is
    /// present if cryptsetup itself failed.
    LuksMappingFailed {
        name: String,
        cause: Option<CmdError>,
    },
    /// Any other cryptsetup failure.
    Luks {
        action: &'static str,
        target: String,
        cause: CmdError,
    },
    Cmd(CmdError),
    Io(io::Error),
    Msg(String),
}

impl DevError {
    pub fn no_such_device(reference: &str) -> DevError {
        DevError::NoSuchDevice {
            reference: reference.to_owned(),
        }
    }

    pub fn mounted(devices: &[&Path]) -> DevError {
        DevError::MountedDevice {
            devices: devices.iter().map(|d| d.to_path_buf()).collect(),
        }
    }
}

impl fmt::Display for DevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DevError::NoSuchDevice { ref reference } => {
                write!(f, "No device matches \"{}\"", reference)
            }
            DevError::TooManyDevices {
                ref reference,
                ref candidates,
            } => write!(
                f,
                "Device reference \"{}\" is ambiguous; it matches: {}",
                reference,
                candidates
                    .iter()
                    .map(|c| format!("{} [{}]", c.path.display(), c.description))
                    .join(", ")
            ),
            DevError::MountedDevice { ref devices } => write!(
                f,
                "Devices are mounted: {}",
                devices.iter().map(|d| d.display()).join(", ")
            ),
            DevError::LuksMappingFailed {
                ref name,
                cause: Some(ref cause),
            } => write!(f, "Failed to open LUKS mapping {}: {}", name, cause),
            DevError::LuksMappingFailed {
                ref name,
                cause: None,
            } => write!(
                f,
                "LUKS mapping {} was not created: cryptsetup reported success but the mapper node does not exist",
                name
            ),
            DevError::Luks {
                action,
                ref target,
                ref cause,
            } => write!(f, "cryptsetup {} failed for {}: {}", action, target, cause),
            DevError::Cmd(ref err) => write!(f, "Command error: {}", err),
            DevError::Io(ref err) => write!(f, "IO error: {}", err),
            DevError::Msg(ref s) => write!(f, "Error: {}", s),
        }
    }
}

impl Error for DevError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            DevError::NoSuchDevice { .. }
            | DevError::TooManyDevices { .. }
            | DevError::MountedDevice { .. }
            | DevError::LuksMappingFailed { cause: None, .. }
            | DevError::Msg(_) => None,
            DevError::LuksMappingFailed {
                cause: Some(ref cause),
                ..
            } => Some(cause),
            DevError::Luks { ref cause, .. } => Some(cause),
            DevError::Cmd(ref err) => Some(err),
            DevError::Io(ref err) => Some(err),
        }
    }
}

impl From<io::Error> for DevError {
    fn from(err: io::Error) -> DevError {
        DevError::Io(err)
    }
}

impl From<CmdError> for DevError {
    fn from(err: CmdError) -> DevError {
        DevError::Cmd(err)
    }
}
