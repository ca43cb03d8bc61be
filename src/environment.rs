//! Target Python environment discovery.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use pep508_rs::MarkerEnvironment;
use serde::Deserialize;

use crate::pep508::MarkerEnvironmentBuilder;

#[derive(Debug)]
/// Errors raised while probing an interpreter.
pub enum Error {
    /// Running the interpreter failed.
    Io(std::io::Error),
    /// The interpreter ran but the probe exited with a failure.
    Probe {
        /// The probe's exit status.
        status: ExitStatus,
        /// Captured standard error.
        stderr: String,
    },
    /// The probe output was not the expected JSON document.
    InvalidOutput(serde_json::Error),
    /// The probe output did not form a valid marker environment.
    InvalidMarkers(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "failed to run interpreter: {}", e),
            Error::Probe { status, stderr } => {
                write!(f, "interpreter probe exited with {}: {}", status, stderr)
            }
            Error::InvalidOutput(e) => write!(f, "invalid interpreter probe output: {}", e),
            Error::InvalidMarkers(e) => write!(f, "invalid marker environment: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Inline script printing the PEP 508 marker variables of an interpreter,
/// plus its executable path, as a JSON document.
const PROBE_SCRIPT: &str = r#"
import json, os, platform, sys

def format_full_version(info):
    version = "{0.major}.{0.minor}.{0.micro}".format(info)
    kind = info.releaselevel
    if kind != "final":
        version += kind[0] + str(info.serial)
    return version

print(json.dumps({
    "executable": sys.executable,
    "implementation_name": sys.implementation.name,
    "implementation_version": format_full_version(sys.implementation.version),
    "os_name": os.name,
    "platform_machine": platform.machine(),
    "platform_python_implementation": platform.python_implementation(),
    "platform_release": platform.release(),
    "platform_system": platform.system(),
    "platform_version": platform.version(),
    "python_full_version": platform.python_version(),
    "python_version": ".".join(platform.python_version_tuple()[:2]),
    "sys_platform": sys.platform,
}))
"#;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    executable: PathBuf,
    implementation_name: String,
    implementation_version: String,
    os_name: String,
    platform_machine: String,
    platform_python_implementation: String,
    platform_release: String,
    platform_system: String,
    platform_version: String,
    python_full_version: String,
    python_version: String,
    sys_platform: String,
}

/// A Python environment that dependencies can be installed into.
#[derive(Debug, Clone)]
pub struct PythonEnvironment {
    /// Path to the interpreter, used as the pip invocation prefix.
    pub executable: PathBuf,
    /// The interpreter version, e.g. `3.11.4`.
    pub version: String,
    /// The PEP 508 marker context of the interpreter.
    pub pep508: MarkerEnvironment,
}

impl PythonEnvironment {
    /// Discover the environment of an interpreter by running it with a
    /// probe script that prints the marker variables as JSON.
    ///
    /// # Arguments
    /// * `interpreter` - Path to the Python executable to probe
    ///
    /// # Returns
    /// The discovered environment, or an error if the probe could not be
    /// run or produced unusable output.
    pub fn of(interpreter: &Path) -> Result<Self, Error> {
        let output = Command::new(interpreter)
            .arg("-c")
            .arg(PROBE_SCRIPT)
            .output()?;
        if !output.status.success() {
            return Err(Error::Probe {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let probe: ProbeOutput =
            serde_json::from_slice(&output.stdout).map_err(Error::InvalidOutput)?;
        Self::from_probe(probe)
    }

    fn from_probe(probe: ProbeOutput) -> Result<Self, Error> {
        let pep508 = MarkerEnvironment::try_from(MarkerEnvironmentBuilder {
            implementation_name: &probe.implementation_name,
            implementation_version: &probe.implementation_version,
            os_name: &probe.os_name,
            platform_machine: &probe.platform_machine,
            platform_python_implementation: &probe.platform_python_implementation,
            platform_release: &probe.platform_release,
            platform_system: &probe.platform_system,
            platform_version: &probe.platform_version,
            python_full_version: &probe.python_full_version,
            python_version: &probe.python_version,
            sys_platform: &probe.sys_platform,
        })
        .map_err(|e| Error::InvalidMarkers(e.to_string()))?;
        Ok(PythonEnvironment {
            executable: probe.executable,
            version: probe.python_full_version,
            pep508,
        })
    }
}
