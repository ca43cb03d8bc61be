//! Dependency installation via pip.
//!
//! The installer turns a flattened dependency list plus a target environment
//! into a single pip invocation: dependencies that do not apply to the
//! environment are dropped, multi dependencies are expanded into whichever
//! alternative matches, linked path dependencies are replaced by their own
//! dependencies and symlinked afterwards, and index configuration is turned
//! into `--index-url`/`--extra-index-url` arguments.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::dependency::{Dependency, PypiDependency};
use crate::environment::PythonEnvironment;
use crate::pep508::{filter_dependencies, test_dependency};

#[derive(Debug)]
/// Errors that can occur while planning or running an installation.
pub enum Error {
    /// The installer is not configured for the requested operation.
    Configuration(String),
    /// A dependency reached a site its variant must never reach; indicates
    /// an expansion bug.
    InvariantViolation(String),
    /// Spawning the package manager failed.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "{}", msg),
            Error::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
            Error::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// A configuration of package indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Indexes {
    /// The name of the default index in `urls`.
    pub default: Option<String>,
    /// Index name to index URL.
    ///
    /// `default`, if set, must have an entry here by the time arguments are
    /// assembled; this is checked at use, not at combination.
    pub urls: BTreeMap<String, String>,
}

impl Indexes {
    /// Merge `other` into `self`.
    ///
    /// The receiver wins: an already-set default is kept (a differing
    /// incoming default is logged and dropped), and on URL name collisions
    /// the receiver's URL is kept. Folding projects in closest-first order
    /// therefore gives the closest project precedence.
    pub fn combine_with(&mut self, other: &Indexes) {
        match (&self.default, &other.default) {
            (Some(current), Some(theirs)) if current != theirs => {
                log::warn!(
                    "Conflicting default index between projects in repository: {:?} (current), {:?}",
                    current,
                    theirs
                );
            }
            (None, Some(theirs)) => self.default = Some(theirs.clone()),
            _ => {}
        }
        for (name, url) in &other.urls {
            self.urls
                .entry(name.clone())
                .or_insert_with(|| url.clone());
        }
    }
}

/// Combine the index configuration of every project into one, processing
/// projects in the order given (normally topological dependency order).
pub fn get_indexes_for_projects(
    projects: &[crate::project::Project],
) -> Result<Indexes, crate::project::Error> {
    let mut indexes = Indexes::default();
    for project in projects {
        indexes.combine_with(&project.dependencies()?.indexes);
    }
    Ok(indexes)
}

/// Options for a single install invocation.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// The merged index configuration.
    pub indexes: Indexes,
    /// Pass `-q` to pip.
    pub quiet: bool,
    /// Pass `--upgrade` to pip.
    pub upgrade: bool,
}

/// An installer for dependencies into a Python environment.
pub trait Installer {
    /// Install `dependencies` into `target`, returning the package
    /// manager's exit status.
    fn install(
        &self,
        dependencies: &[Dependency],
        target: &PythonEnvironment,
        options: &InstallOptions,
    ) -> Result<i32, Error>;
}

/// Introspects a project for its own dependencies and symlinks it in place.
///
/// Needed when a path dependency with `link` enabled is encountered. Not
/// configuring one is valid; processing a linked dependency without one is
/// a configuration error.
pub trait SymlinkHelper {
    /// The dependencies declared by the project at `project`.
    fn get_dependencies_for_project(&self, project: &Path) -> Result<Vec<Dependency>, Error>;

    /// Symlink the project at `project` into the environment.
    fn link_project(&self, project: &Path) -> Result<(), Error>;
}

/// The subprocess boundary: runs an assembled command, returning its exit
/// code.
pub trait CommandRunner {
    /// Run `command`, blocking until it terminates.
    fn run(&self, command: &[String]) -> Result<i32, Error>;
}

/// Runs commands as plain subprocesses.
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &[String]) -> Result<i32, Error> {
        let (program, args) = command.split_first().ok_or_else(|| {
            Error::InvariantViolation("attempted to run an empty command".to_string())
        })?;
        let status = Command::new(program).args(args).status()?;
        // A signal-terminated subprocess has no code; report it as -1.
        Ok(status.code().unwrap_or(-1))
    }
}

/// Installs dependencies via pip.
pub struct PipInstaller<'a> {
    symlink_helper: Option<&'a dyn SymlinkHelper>,
    runner: Box<dyn CommandRunner + 'a>,
}

impl<'a> PipInstaller<'a> {
    /// Create a pip installer.
    ///
    /// # Arguments
    /// * `symlink_helper` - Implements linked path dependencies when they
    ///   are encountered. If not specified, an error is raised when a path
    ///   dependency that needs to be linked is passed.
    pub fn new(symlink_helper: Option<&'a dyn SymlinkHelper>) -> Self {
        PipInstaller {
            symlink_helper,
            runner: Box::new(ProcessRunner),
        }
    }

    /// Replace the subprocess boundary.
    pub fn with_runner(mut self, runner: Box<dyn CommandRunner + 'a>) -> Self {
        self.runner = runner;
        self
    }
}

impl Installer for PipInstaller<'_> {
    fn install(
        &self,
        dependencies: &[Dependency],
        target: &PythonEnvironment,
        options: &InstallOptions,
    ) -> Result<i32, Error> {
        // Work queue: popped from the back, so the last declared dependency
        // is resolved first. Multi expansion pushes alternatives to the
        // front; linked-project dependencies are appended to the back.
        let mut queue: VecDeque<Dependency> = dependencies.iter().cloned().collect();
        let mut unsupported_hashes: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        let mut link_projects: Vec<PathBuf> = Vec::new();
        let mut pip_arguments: Vec<String> = Vec::new();
        let mut used_indexes: BTreeSet<String> = BTreeSet::new();

        while let Some(dependency) = queue.pop_back() {
            if !test_dependency(&dependency, &target.pep508, &[]) {
                continue;
            }

            // Only index and URL dependencies can carry hash pins into pip
            // arguments; collect the rest for the report below.
            if !dependency.hashes().is_empty()
                && !matches!(dependency, Dependency::Pypi(_) | Dependency::Url(_))
            {
                unsupported_hashes
                    .entry(dependency.kind())
                    .or_default()
                    .push(
                        dependency
                            .name()
                            .map(|name| name.to_string())
                            .unwrap_or_else(|| dependency.kind().to_string()),
                    );
            }

            match dependency {
                Dependency::Path(dependency) if dependency.link => {
                    let Some(helper) = self.symlink_helper else {
                        return Err(Error::Configuration(format!(
                            "unable to install linked project {} because no symlink helper is available in this context",
                            dependency.path.display()
                        )));
                    };
                    log::info!(
                        "Collecting recursive dependencies for project {}",
                        dependency.path.display()
                    );
                    queue.extend(filter_dependencies(
                        helper.get_dependencies_for_project(&dependency.path)?,
                        &target.pep508,
                        &dependency.extras,
                    ));
                    link_projects.push(dependency.path);
                }
                Dependency::Multi(multi) => {
                    for sub_dependency in multi.dependencies {
                        if test_dependency(&sub_dependency, &target.pep508, &[]) {
                            queue.push_front(sub_dependency);
                        }
                    }
                }
                dependency => {
                    if let Dependency::Pypi(PypiDependency {
                        source: Some(source),
                        ..
                    }) = &dependency
                    {
                        used_indexes.insert(source.clone());
                    }
                    pip_arguments.extend(dependency_to_pip_arguments(&dependency)?);
                }
            }
        }

        for (kind, names) in &unsupported_hashes {
            log::warn!(
                "Hashes are not supported for {} dependencies, ignoring: {}",
                kind,
                names.join(", ")
            );
        }

        if let Some(default) = &options.indexes.default {
            pip_arguments.push("--index-url".to_string());
            pip_arguments.push(index_url(&options.indexes, default)?);
        }
        for index_name in &used_indexes {
            if options.indexes.default.as_deref() == Some(index_name.as_str()) {
                continue;
            }
            pip_arguments.push("--extra-index-url".to_string());
            pip_arguments.push(index_url(&options.indexes, index_name)?);
        }

        let mut pip_command = vec![
            target.executable.display().to_string(),
            "-m".to_string(),
            "pip".to_string(),
            "install".to_string(),
        ];
        pip_command.extend(pip_arguments);
        if options.quiet {
            pip_command.push("-q".to_string());
        }
        if options.upgrade {
            pip_command.push("--upgrade".to_string());
        }

        log::info!(
            "Installing with pip using command $ {}",
            quote_command(&pip_command)
        );
        let status = self.runner.run(&pip_command)?;
        if status != 0 {
            return Ok(status);
        }

        if !link_projects.is_empty() {
            let helper = self.symlink_helper.ok_or_else(|| {
                Error::InvariantViolation(
                    "link requests were recorded without a symlink helper".to_string(),
                )
            })?;
            for project_path in &link_projects {
                helper.link_project(project_path)?;
            }
        }

        Ok(0)
    }
}

fn index_url(indexes: &Indexes, name: &str) -> Result<String, Error> {
    indexes.urls.get(name).cloned().ok_or_else(|| {
        Error::Configuration(format!("PyPI index {:?} is not configured", name))
    })
}

fn quote_command(command: &[String]) -> String {
    command
        .iter()
        .map(|argument| {
            shlex::try_quote(argument)
                .map(|quoted| quoted.to_string())
                .unwrap_or_else(|_| argument.clone())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert a dependency to pip command-line arguments.
///
/// # Arguments
/// * `dependency` - The dependency to convert. Must be a Pypi, Git, Url or
///   non-linked Path dependency; a Multi dependency is not supported by
///   this function and must be expanded by the caller.
///
/// # Returns
/// One or more argument tokens for the pip command line.
pub fn dependency_to_pip_arguments(dependency: &Dependency) -> Result<Vec<String>, Error> {
    let extras = format_extras(dependency);
    let hashes = dependency
        .hashes()
        .iter()
        .map(|hash| format!("--hash={}", hash))
        .collect::<Vec<_>>()
        .join(" ");

    match dependency {
        Dependency::Git(dependency) => {
            if dependency
                .branch
                .iter()
                .chain(dependency.rev.iter())
                .chain(dependency.tag.iter())
                .count()
                > 1
            {
                log::warn!(
                    "More than one of branch/rev/tag is set for {}; only an install from the default branch is supported",
                    dependency.name
                );
            }
            Ok(vec![format!(
                "{}{} @ git+{}",
                dependency.name, extras, dependency.url
            )])
        }
        Dependency::Path(dependency) => {
            if dependency.link {
                return Err(Error::InvariantViolation(format!(
                    "linked path dependency {} must be expanded before argument conversion",
                    dependency.name
                )));
            }
            let mut arguments = Vec::new();
            if dependency.develop {
                arguments.push("-e".to_string());
            }
            arguments.push(format!("{}{}", display_path(&dependency.path), extras));
            Ok(arguments)
        }
        Dependency::Pypi(dependency) => Ok(vec![format!(
            "{}{} {} {}",
            dependency.name,
            extras,
            dependency.version.to_pep_508(),
            hashes
        )
        .trim_end()
        .to_string()]),
        Dependency::Url(dependency) => Ok(vec![format!(
            "{}{} @ {} {}",
            dependency.name, extras, dependency.url, hashes
        )
        .trim_end()
        .to_string()]),
        Dependency::Multi(_) => Err(Error::InvariantViolation(
            "a multi dependency cannot be converted to pip arguments".to_string(),
        )),
    }
}

fn format_extras(dependency: &Dependency) -> String {
    let extras = dependency.extras();
    if extras.is_empty() {
        String::new()
    } else {
        format!(
            "[{}]",
            extras
                .iter()
                .map(|extra| extra.to_string())
                .collect::<Vec<_>>()
                .join(",")
        )
    }
}

fn display_path(path: &Path) -> String {
    if path.is_absolute() {
        path.display().to_string()
    } else {
        format!("./{}", path.strip_prefix(".").unwrap_or(path).display())
    }
}
