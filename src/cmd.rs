// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Handles invoking external binaries.
// The binaries are looked up in an explicit list of directories, not in
// the user's PATH, since the tool may be run with a minimal environment by
// a privileged helper. The lookup is done once; the existence of the file is
// not re-checked before each invocation, instead a failure to spawn is
// reported as a command error.

use std::{
    borrow::Cow,
    collections::HashMap,
    ffi::{OsStr, OsString},
    iter,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::LazyLock,
};

use itertools::Itertools;

use crate::errors::{CmdError, DevError, DevResult};

const BINARIES_PATHS: [&str; 4] = ["/usr/sbin", "/sbin", "/usr/bin", "/bin"];

// These are the external binaries that may be invoked.
// Any change in this list requires a corresponding change to BINARIES,
// and vice-versa.
pub const BLKID: &str = "blkid";
pub const CRYPTSETUP: &str = "cryptsetup";

/// Find the binary with the given name by looking in likely locations.
/// Return None if no binary was found.
fn find_binary(name: &str) -> Option<PathBuf> {
    BINARIES_PATHS
        .iter()
        .map(|pre| [pre, name].iter().collect::<PathBuf>())
        .find(|path| path.exists())
}

static BINARIES: LazyLock<HashMap<&'static str, Option<PathBuf>>> = LazyLock::new(|| {
    [BLKID, CRYPTSETUP]
        .iter()
        .map(|name| (*name, find_binary(name)))
        .collect()
});

/// Verify that all binaries that might be invoked are available at some
/// path. Return an error naming every missing binary.
pub fn verify_binaries() -> DevResult<()> {
    let missing = BINARIES
        .iter()
        .filter(|(_, path)| path.is_none())
        .map(|(name, _)| *name)
        .sorted()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DevError::Msg(format!(
            "Executables {} could not be found in any of {}",
            missing.join(", "),
            BINARIES_PATHS.join(", ")
        )))
    }
}

/// Get an absolute path for the executable with the given name.
fn get_executable(name: &str) -> DevResult<&'static Path> {
    BINARIES
        .get(name)
        .and_then(|path| path.as_deref())
        .ok_or_else(|| {
            DevError::Msg(format!(
                "Executable {} could not be found in any of {}",
                name,
                BINARIES_PATHS.join(", ")
            ))
        })
}

/// Render a command line for messages and logs.
pub fn format_cmd(program: &str, args: &[OsString]) -> String {
    iter::once(Cow::Borrowed(program))
        .chain(args.iter().map(|arg| arg.to_string_lossy()))
        .join(" ")
}

/// Captured output of a command which exited successfully.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs to completion, blocking the caller.
pub trait CommandRunner {
    /// Run the program named by `program` with `args`. Return the captured
    /// output if it exits successfully, otherwise a command error carrying
    /// the exit status and the captured standard error.
    fn run(&self, program: &str, args: &[OsString]) -> DevResult<CmdOutput>;
}

/// Runs the real binaries found in BINARIES_PATHS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[OsString]) -> DevResult<CmdOutput> {
        let executable = get_executable(program)?;
        let mut cmd = Command::new(executable.as_os_str());
        cmd.args(args);
        set_stdio(&mut cmd, is_interactive(program));
        execute_cmd(&mut cmd, format_cmd(program, args))
    }
}

/// cryptsetup prompts for a passphrase and for the luksFormat confirmation.
fn is_interactive(program: &str) -> bool {
    program == CRYPTSETUP
}

/// An interactive command reads from the caller's terminal and writes its
/// prompts to it; only its stderr is captured. Any other command reads
/// nothing and has its stdout and stderr captured.
fn set_stdio(cmd: &mut Command, interactive: bool) {
    cmd.stderr(Stdio::piped());
    if interactive {
        cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit());
    } else {
        cmd.stdin(Stdio::null()).stdout(Stdio::piped());
    }
}

/// Invoke the specified command. Return an error if invoking the command
/// fails or if the command itself fails.
fn execute_cmd(cmd: &mut Command, cmd_line: String) -> DevResult<CmdOutput> {
    debug!("Executing command: {}", cmd_line);
    match cmd.output() {
        Err(err) => Err(DevError::Cmd(CmdError::spawn(cmd_line, err))),
        Ok(result) => {
            let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
            if result.status.success() {
                Ok(CmdOutput { stdout, stderr })
            } else {
                Err(DevError::Cmd(CmdError::status(
                    cmd_line,
                    result.status.code(),
                    stderr,
                )))
            }
        }
    }
}

/// Look up a single blkid attribute, e.g., TYPE, for the device.
/// A failure of blkid or an empty value both mean the attribute is absent;
/// neither is an error.
pub fn blkid_attr<R>(runner: &R, device: &Path, attr: &str) -> Option<String>
where
    R: CommandRunner + ?Sized,
{
    let args = [
        OsString::from("-s"),
        OsString::from(attr),
        OsString::from("-o"),
        OsString::from("value"),
        device.as_os_str().to_owned(),
    ];
    match runner.run(BLKID, &args) {
        Ok(output) => {
            let value = output.stdout.trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_owned())
            }
        }
        Err(err) => {
            debug!(
                "blkid attribute {} unavailable for {}: {}",
                attr,
                device.display(),
                err
            );
            None
        }
    }
}

/// Convenience for building argument lists from mixed strings and paths.
pub fn os_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    args.into_iter().map(|a| a.as_ref().to_owned()).collect()
}
