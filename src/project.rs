//! Project configuration loading.
//!
//! A project is a directory with a `pyproject.toml`. Dependency declarations
//! come from the PEP 621 `[project]` tables and from the `[tool.pylot]`
//! table, which additionally supports structured declarations (Git, URL,
//! path and multi dependencies) and index configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use pyproject_toml::PyProjectToml;
use serde::Deserialize;

use crate::dependency::{
    parse_dependencies, Dependency, DependencyDecl, ParseError, PypiDependency, VersionSpec,
};
use crate::installer::Indexes;

#[derive(Debug)]
/// Errors raised while loading a project.
pub enum Error {
    /// Reading the configuration file failed.
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying error.
        error: std::io::Error,
    },
    /// The configuration file is not valid TOML or has an invalid shape.
    Toml {
        /// The file that could not be parsed.
        path: PathBuf,
        /// The underlying error.
        error: toml::de::Error,
    },
    /// A dependency declaration could not be parsed.
    Parse(ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, error } => write!(f, "{}: {}", path.display(), error),
            Error::Toml { path, error } => write!(f, "{}: {}", path.display(), error),
            Error::Parse(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

/// The `[tool.pylot]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct ToolConfig {
    /// Structured run dependencies, appended to `[project] dependencies`.
    dependencies: Vec<DependencyDecl>,
    /// Development dependencies.
    dev_dependencies: Vec<DependencyDecl>,
    /// Extra-gated dependency groups, merged into
    /// `[project] optional-dependencies`.
    extras: BTreeMap<String, Vec<DependencyDecl>>,
    /// Package index configuration.
    indexes: Indexes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolSection {
    pylot: Option<ToolConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolDocument {
    tool: ToolSection,
}

/// The dependencies of a project, grouped the way installation consumes
/// them.
#[derive(Debug, Clone)]
pub struct Dependencies {
    /// Constraint on the Python version, from `requires-python`.
    pub python: Option<VersionSpec>,
    /// Run dependencies, in declaration order.
    pub run: Vec<Dependency>,
    /// Development dependencies.
    pub dev: Vec<Dependency>,
    /// Extra-gated dependency groups.
    pub extra: BTreeMap<String, Vec<Dependency>>,
    /// Build-system requirements.
    pub build: Vec<PypiDependency>,
    /// Package index configuration.
    pub indexes: Indexes,
}

/// One Python project, loaded from its `pyproject.toml`.
pub struct Project {
    /// The project directory.
    pub directory: PathBuf,
    pyproject: PyProjectToml,
    tool: ToolConfig,
}

impl Project {
    /// Load the project at `directory`.
    pub fn discover(directory: &Path) -> Result<Self, Error> {
        let path = directory.join("pyproject.toml");
        let text = fs::read_to_string(&path).map_err(|error| Error::Io {
            path: path.clone(),
            error,
        })?;
        let pyproject: PyProjectToml = toml::from_str(&text).map_err(|error| Error::Toml {
            path: path.clone(),
            error,
        })?;
        let tool: ToolDocument = toml::from_str(&text).map_err(|error| Error::Toml { path, error })?;
        Ok(Project {
            directory: directory.to_path_buf(),
            pyproject,
            tool: tool.tool.pylot.unwrap_or_default(),
        })
    }

    /// The distribution name, if `[project]` declares one.
    pub fn name(&self) -> Option<&str> {
        self.pyproject
            .project
            .as_ref()
            .map(|project| project.name.as_str())
    }

    /// Collect the project's dependencies.
    pub fn dependencies(&self) -> Result<Dependencies, Error> {
        let mut run = Vec::new();
        let mut extra: BTreeMap<String, Vec<Dependency>> = BTreeMap::new();
        let mut python = None;

        if let Some(project) = &self.pyproject.project {
            for requirement in project.dependencies.iter().flatten() {
                run.push(Dependency::from_requirement(requirement.clone()));
            }
            for (extra_name, requirements) in project.optional_dependencies.iter().flatten() {
                extra.insert(
                    extra_name.clone(),
                    requirements
                        .iter()
                        .map(|requirement| Dependency::from_requirement(requirement.clone()))
                        .collect(),
                );
            }
            python = project.requires_python.clone().map(VersionSpec::from);
        }
        run.extend(parse_dependencies(&self.tool.dependencies, &self.directory)?);

        let dev = parse_dependencies(&self.tool.dev_dependencies, &self.directory)?;

        for (extra_name, declarations) in &self.tool.extras {
            extra
                .entry(extra_name.clone())
                .or_default()
                .extend(parse_dependencies(declarations, &self.directory)?);
        }

        let build = match &self.pyproject.build_system {
            Some(build_system) => PypiDependency::parse_list(
                &build_system
                    .requires
                    .iter()
                    .map(|requirement| requirement.to_string())
                    .collect::<Vec<_>>(),
            )?,
            None => Vec::new(),
        };

        Ok(Dependencies {
            python,
            run,
            dev,
            extra,
            build,
            indexes: self.tool.indexes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with(content: &str) -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pyproject.toml"), content).unwrap();
        let project = Project::discover(dir.path()).unwrap();
        (dir, project)
    }

    #[test]
    fn test_discover_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Project::discover(dir.path()),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn test_discover_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pyproject.toml"), "project = [").unwrap();
        assert!(matches!(
            Project::discover(dir.path()),
            Err(Error::Toml { .. })
        ));
    }

    #[test]
    fn test_dependencies_from_pep_621() {
        let (_dir, project) = project_with(
            r#"
            [build-system]
            requires = ["setuptools >= 40.8.0"]
            build-backend = "setuptools.build_meta"

            [project]
            name = "app"
            version = "1.0"
            requires-python = ">=3.8"
            dependencies = ["requests >=2.0", "tomli ; python_version < '3.11'"]

            [project.optional-dependencies]
            docs = ["sphinx >=7"]
            "#,
        );
        assert_eq!(project.name(), Some("app"));
        let dependencies = project.dependencies().unwrap();
        assert_eq!(dependencies.run.len(), 2);
        assert_eq!(
            dependencies.run[0].name().unwrap().to_string(),
            "requests"
        );
        assert_eq!(dependencies.extra["docs"].len(), 1);
        assert_eq!(dependencies.build.len(), 1);
        assert_eq!(dependencies.build[0].name.to_string(), "setuptools");
        assert_eq!(
            dependencies.python,
            Some(VersionSpec::parse(">=3.8").unwrap())
        );
    }

    #[test]
    fn test_dependencies_from_tool_table() {
        let (_dir, project) = project_with(
            r#"
            [project]
            name = "app"
            version = "1.0"
            dependencies = ["requests >=2.0"]

            [tool.pylot]
            dependencies = [
                { name = "helper", path = "helper", develop = true },
            ]
            dev-dependencies = ["pytest >=8"]

            [tool.pylot.indexes]
            default = "internal"

            [tool.pylot.indexes.urls]
            internal = "https://pypi.internal/simple"
            "#,
        );
        let dependencies = project.dependencies().unwrap();
        // PEP 621 dependencies come first, tool declarations after.
        assert_eq!(dependencies.run.len(), 2);
        assert_eq!(dependencies.run[0].kind(), "pypi");
        assert_eq!(dependencies.run[1].kind(), "path");
        match &dependencies.run[1] {
            Dependency::Path(dependency) => {
                assert_eq!(dependency.path, project.directory.join("helper"));
                assert!(dependency.develop);
            }
            other => panic!("expected a path dependency, got {:?}", other),
        }
        assert_eq!(dependencies.dev.len(), 1);
        assert_eq!(dependencies.indexes.default.as_deref(), Some("internal"));
        assert_eq!(
            dependencies.indexes.urls["internal"],
            "https://pypi.internal/simple"
        );
    }

    #[test]
    fn test_tool_extras_merge_into_optional_dependencies() {
        let (_dir, project) = project_with(
            r#"
            [project]
            name = "app"
            version = "1.0"

            [project.optional-dependencies]
            docs = ["sphinx >=7"]

            [tool.pylot.extras]
            docs = ["sphinx-rtd-theme"]
            cli = ["click >=8"]
            "#,
        );
        let dependencies = project.dependencies().unwrap();
        assert_eq!(dependencies.extra["docs"].len(), 2);
        assert_eq!(dependencies.extra["cli"].len(), 1);
    }

    #[test]
    fn test_unknown_tool_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            r#"
            [project]
            name = "app"
            version = "1.0"

            [tool.pylot]
            dependencis = []
            "#,
        )
        .unwrap();
        assert!(matches!(
            Project::discover(dir.path()),
            Err(Error::Toml { .. })
        ));
    }

    #[test]
    fn test_other_tool_tables_are_ignored() {
        let (_dir, project) = project_with(
            r#"
            [project]
            name = "app"
            version = "1.0"

            [tool.black]
            line-length = 100
            "#,
        );
        let dependencies = project.dependencies().unwrap();
        assert!(dependencies.run.is_empty());
        assert!(dependencies.indexes.default.is_none());
    }
}
