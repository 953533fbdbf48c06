// src/system/command.rs

use std::fmt;
use std::path::{Path, PathBuf};

/// An external invocation: which executable, where, with which arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    executable: PathBuf,
    work_dir: PathBuf,
    args: Vec<String>,
}

impl Command {
    pub fn new(executable: impl Into<PathBuf>, work_dir: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            work_dir: work_dir.into(),
            args,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The command line as a user would type it in a shell.
    pub fn to_user_output(&self) -> String {
        let exe = self.executable.to_string_lossy();
        let parts = std::iter::once(exe.as_ref()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(parts).unwrap_or_else(|_| {
            std::iter::once(exe.to_string())
                .chain(self.args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_user_output())
    }
}
