//! Child process environment construction.
//!
//! Children never silently inherit the whole parent environment. A process
//! started without an explicit mapping gets [`default_environment`]; one
//! started with a mapping gets exactly that mapping plus the few variables
//! the platform cannot do without ([`with_mandatory_variables`]).

use std::collections::BTreeMap;
use std::path::Path;

/// Environment variables passed to a child.
pub type Environment = BTreeMap<String, String>;

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

#[cfg(not(windows))]
const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Variable used to locate shared libraries.
#[cfg(windows)]
pub const LIBRARY_PATH_VAR: &str = "PATH";
#[cfg(target_os = "macos")]
pub const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(all(unix, not(target_os = "macos")))]
pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Parent variables that are safe to pass on to every child.
#[cfg(windows)]
const INHERITED: &[&str] = &[
    "ComSpec",
    "OS",
    "PATHEXT",
    "SystemRoot",
    "SystemDrive",
    "windir",
    "NUMBER_OF_PROCESSORS",
    "PROCESSOR_ARCHITECTURE",
    "COMMONPROGRAMFILES",
    "COMMONPROGRAMFILES(X86)",
    "PROGRAMFILES",
    "PROGRAMFILES(X86)",
];
#[cfg(not(windows))]
const INHERITED: &[&str] = &[];

/// Variables a child cannot run without, copied from the parent when set.
#[cfg(windows)]
const MANDATORY: &[&str] = &["SystemRoot"];
#[cfg(target_os = "macos")]
const MANDATORY: &[&str] = &["DYLD_LIBRARY_PATH"];
#[cfg(all(unix, not(target_os = "macos")))]
const MANDATORY: &[&str] = &["LD_LIBRARY_PATH"];

/// A minimal environment that does not identify the current user.
pub fn default_environment() -> Environment {
    let mut env = Environment::new();
    for name in INHERITED {
        if let Ok(value) = std::env::var(name) {
            env.insert(name.to_string(), value);
        }
    }

    #[cfg(windows)]
    {
        let root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
        env.insert("PATH".to_string(), format!(r"{root}\system32;{root}", root = root));
    }
    #[cfg(not(windows))]
    {
        env.insert("PATH".to_string(), DEFAULT_PATH.to_string());
    }

    with_mandatory_variables(env)
}

/// Adds platform-mandatory variables the caller did not set.
pub fn with_mandatory_variables(mut env: Environment) -> Environment {
    for name in MANDATORY {
        if env.keys().any(|k| k.eq_ignore_ascii_case(name)) {
            continue;
        }
        if let Ok(value) = std::env::var(name) {
            if !value.is_empty() {
                env.insert(name.to_string(), value);
            }
        }
    }
    env
}

/// The environment a child actually receives.
pub fn resolve_environment(explicit: Option<&Environment>) -> Environment {
    match explicit {
        Some(env) => with_mandatory_variables(env.clone()),
        None => default_environment(),
    }
}

/// Builds a customized environment on top of the default one.
///
/// ```
/// use verdict_process::EnvironmentBuilder;
///
/// let env = EnvironmentBuilder::new()
///     .set("APP_MODE", "test")
///     .add_to_exe_path("/opt/app/bin")
///     .build();
/// assert_eq!(env["APP_MODE"], "test");
/// assert!(env["PATH"].starts_with("/opt/app/bin"));
/// ```
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    vars: Environment,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentBuilder {
    /// Starts from [`default_environment`].
    pub fn new() -> Self {
        Self {
            vars: default_environment(),
        }
    }

    /// Starts from nothing at all.
    pub fn empty() -> Self {
        Self {
            vars: Environment::new(),
        }
    }

    /// Starts from a full copy of this process's environment.
    pub fn inherit_all() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.vars.remove(name);
        self
    }

    /// Points the platform's temp-directory variables at `dir`.
    pub fn temp_dir(self, dir: &Path) -> Self {
        let dir = dir.display().to_string();
        if cfg!(windows) {
            self.set("TEMP", dir.clone()).set("TMP", dir)
        } else {
            self.set("TMPDIR", dir)
        }
    }

    /// Prepends `dir` to the shared-library search path.
    pub fn add_to_lib_path(self, dir: impl AsRef<Path>) -> Self {
        self.prepend(LIBRARY_PATH_VAR, dir.as_ref())
    }

    /// Prepends `dir` to `PATH`.
    pub fn add_to_exe_path(self, dir: impl AsRef<Path>) -> Self {
        self.prepend("PATH", dir.as_ref())
    }

    fn prepend(mut self, name: &str, dir: &Path) -> Self {
        let dir = dir.display().to_string();
        let value = match self.vars.get(name) {
            Some(existing) if !existing.is_empty() => format!("{}{}{}", dir, PATH_SEPARATOR, existing),
            _ => dir,
        };
        self.vars.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> Environment {
        self.vars
    }
}
