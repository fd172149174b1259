//! Description of a process to start.

use crate::environment::Environment;
use std::path::{Path, PathBuf};
use std::time::Duration;
use verdict_common::{Condition, ExecutionMode};

/// Everything needed to launch one process.
///
/// Optional fields left unset are filled in by whoever starts the process
/// (normally the test owner) from its own defaults.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: PathBuf,
    pub args: Vec<String>,
    /// `None` means the minimal default environment.
    pub environment: Option<Environment>,
    pub working_dir: Option<PathBuf>,
    pub mode: ExecutionMode,
    /// Foreground only.
    pub timeout: Option<Duration>,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    pub display_name: Option<String>,
    pub abort_on_error: Option<bool>,
    pub ignore_exit_status: Option<bool>,
    /// Foreground exit statuses considered successful.
    pub expected_exit_status: Condition,
}

impl ProcessSpec {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            environment: None,
            working_dir: None,
            mode: ExecutionMode::Foreground,
            timeout: None,
            stdout: None,
            stderr: None,
            display_name: None,
            abort_on_error: None,
            ignore_exit_status: None,
            expected_exit_status: Condition::exactly(0),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn environment(mut self, env: Environment) -> Self {
        self.environment = Some(env);
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn foreground(mut self) -> Self {
        self.mode = ExecutionMode::Foreground;
        self
    }

    pub fn background(mut self) -> Self {
        self.mode = ExecutionMode::Background;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    /// Sets both output paths from one base name: `<base>.out` and `<base>.err`.
    pub fn stdouterr(self, base: impl AsRef<Path>) -> Self {
        let base = base.as_ref().display().to_string();
        self.stdout(format!("{}.out", base)).stderr(format!("{}.err", base))
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = Some(abort);
        self
    }

    pub fn ignore_exit_status(mut self, ignore: bool) -> Self {
        self.ignore_exit_status = Some(ignore);
        self
    }

    pub fn expected_exit_status(mut self, condition: Condition) -> Self {
        self.expected_exit_status = condition;
        self
    }

    /// Display name to use when none was given.
    ///
    /// The stdout base name usually says what the process is for, so it is
    /// used when known, prefixed with the command (`cmd<stem>`) unless one
    /// already contains the other. Otherwise the command's file name.
    pub fn default_display_name(&self) -> String {
        if let Some(name) = &self.display_name {
            return name.clone();
        }
        let from_stdout = self
            .stdout
            .as_deref()
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned());
        let command = self
            .command
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.command.display().to_string());
        match from_stdout {
            Some(out) if out.contains(&command) || command.contains(&out) => out,
            Some(out) => format!("{}<{}>", command, out),
            None => command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let spec = ProcessSpec::new("/bin/echo")
            .arg("hello")
            .args(["big", "world"])
            .background()
            .timeout(Duration::from_secs(5));
        assert_eq!(spec.args, vec!["hello", "big", "world"]);
        assert_eq!(spec.mode, ExecutionMode::Background);
        assert_eq!(spec.timeout, Some(Duration::from_secs(5)));
        assert_eq!(spec.expected_exit_status, Condition::exactly(0));
    }

    #[test]
    fn test_default_display_name() {
        assert_eq!(ProcessSpec::new("/usr/bin/server").default_display_name(), "server");
        assert_eq!(
            ProcessSpec::new("/bin/sh").stdouterr("out/loader").default_display_name(),
            "sh<loader>"
        );
        assert_eq!(
            ProcessSpec::new("/usr/bin/server").stdouterr("out/server.1").default_display_name(),
            "server.1"
        );
        assert_eq!(
            ProcessSpec::new("server").display_name("primary").default_display_name(),
            "primary"
        );
    }
}
