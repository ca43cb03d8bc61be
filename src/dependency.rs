//! Python dependency declarations.
//!
//! This module provides the model for dependency declarations as they appear
//! in project configuration: packages resolved from an index, Git remotes,
//! direct URLs, local paths, and ordered lists of alternatives. Declarations
//! are parsed once per invocation and not mutated afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pep440_rs::{Version, VersionSpecifiers};
use pep508_rs::{ExtraName, MarkerTree, PackageName, Requirement, VersionOrUrl};
use serde::Deserialize;
use url::Url;

#[derive(Debug)]
/// Errors raised while parsing dependency declarations.
pub enum ParseError {
    /// A requirement string that does not parse as PEP 508.
    Pep508(pep508_rs::Pep508Error),
    /// A marker expression that does not parse.
    MarkerSyntax(pep508_rs::Pep508Error),
    /// A version constraint that does not normalize to PEP 440.
    Version {
        /// The offending constraint expression.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A package or extra name that fails normalization.
    InvalidName {
        /// The offending name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
    /// An URL field that does not parse.
    InvalidUrl {
        /// The dependency the URL belongs to.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A declaration entry that matches none of the recognized shapes.
    UnrecognizedShape {
        /// The dependency name, if one could be determined.
        name: String,
        /// What was wrong with the entry.
        reason: String,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Pep508(e) => write!(f, "{}", e),
            ParseError::MarkerSyntax(e) => write!(f, "invalid marker expression: {}", e),
            ParseError::Version { spec, reason } => {
                write!(f, "invalid version constraint {:?}: {}", spec, reason)
            }
            ParseError::InvalidName { name, reason } => {
                write!(f, "invalid name {:?}: {}", name, reason)
            }
            ParseError::InvalidUrl { name, reason } => {
                write!(f, "invalid URL for dependency {:?}: {}", name, reason)
            }
            ParseError::UnrecognizedShape { name, reason } => {
                write!(f, "unrecognized declaration for dependency {:?}: {}", name, reason)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<pep508_rs::Pep508Error> for ParseError {
    fn from(e: pep508_rs::Pep508Error) -> Self {
        ParseError::Pep508(e)
    }
}

/// A version constraint in the loose syntax accepted by project
/// configuration.
///
/// Besides PEP 440 clause lists (`>=1.0,<2.0`), the constructor accepts the
/// any-version wildcard `*`, caret (`^1.2.3`) and tilde (`~1.2.3`)
/// shorthands, wildcard clauses (`1.2.*`) and bare versions (exact match),
/// all normalized to PEP 440 specifiers. Equality compares the normalized
/// specifiers, not the raw text.
#[derive(Debug, Clone)]
pub struct VersionSpec {
    raw: String,
    specifiers: VersionSpecifiers,
}

impl VersionSpec {
    /// Parse and normalize a constraint expression.
    pub fn parse(spec: &str) -> Result<Self, ParseError> {
        let normalized = normalize_constraints(spec)?;
        let specifiers =
            VersionSpecifiers::from_str(&normalized).map_err(|e| ParseError::Version {
                spec: spec.to_string(),
                reason: e.to_string(),
            })?;
        Ok(VersionSpec {
            raw: spec.trim().to_string(),
            specifiers,
        })
    }

    /// The constraint that matches any version.
    pub fn any() -> Self {
        VersionSpec {
            raw: "*".to_string(),
            specifiers: VersionSpecifiers::empty(),
        }
    }

    /// Whether this constraint matches any version.
    pub fn is_any(&self) -> bool {
        self.specifiers.is_empty()
    }

    /// The constraint expression as declared.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The normalized PEP 440 specifiers.
    pub fn specifiers(&self) -> &VersionSpecifiers {
        &self.specifiers
    }

    /// Render the constraint in the PEP 508 specifier syntax.
    ///
    /// The any-version constraint renders as the empty string.
    pub fn to_pep_508(&self) -> String {
        self.specifiers.to_string()
    }
}

impl PartialEq for VersionSpec {
    fn eq(&self, other: &Self) -> bool {
        self.specifiers == other.specifiers
    }
}

impl Eq for VersionSpec {}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for VersionSpec {
    type Err = ParseError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        VersionSpec::parse(spec)
    }
}

impl From<VersionSpecifiers> for VersionSpec {
    fn from(specifiers: VersionSpecifiers) -> Self {
        VersionSpec {
            raw: specifiers.to_string(),
            specifiers,
        }
    }
}

/// Rewrite the shorthand clauses of a constraint expression into PEP 440.
fn normalize_constraints(spec: &str) -> Result<String, ParseError> {
    let mut clauses = Vec::new();
    for clause in spec.split(',') {
        let clause = clause.trim();
        if clause.is_empty() || clause == "*" {
            continue;
        }
        if let Some(version) = clause.strip_prefix('^') {
            clauses.push(caret_bounds(version.trim(), spec)?);
        } else if clause.starts_with('~') && !clause.starts_with("~=") {
            clauses.push(tilde_bounds(clause[1..].trim(), spec)?);
        } else if clause.starts_with(|c: char| c.is_ascii_digit()) {
            // Bare versions are exact; `1.2.*` becomes an equal-star clause.
            clauses.push(format!("=={}", clause));
        } else {
            clauses.push(clause.to_string());
        }
    }
    Ok(clauses.join(","))
}

/// `^1.2.3` allows everything up to the next release of the leftmost
/// non-zero component.
fn caret_bounds(version: &str, spec: &str) -> Result<String, ParseError> {
    let release = release_of(version, spec)?;
    let bump = release
        .iter()
        .position(|part| *part != 0)
        .unwrap_or(release.len() - 1);
    let mut upper = release[..=bump].to_vec();
    upper[bump] += 1;
    Ok(format!(">={},<{}", version, format_release(&upper)))
}

/// `~1.2.3` allows patch-level changes; `~1` allows minor-level changes.
fn tilde_bounds(version: &str, spec: &str) -> Result<String, ParseError> {
    let release = release_of(version, spec)?;
    let upper = if release.len() == 1 {
        vec![release[0] + 1]
    } else {
        let mut upper = release[..2].to_vec();
        upper[1] += 1;
        upper
    };
    Ok(format!(">={},<{}", version, format_release(&upper)))
}

fn release_of(version: &str, spec: &str) -> Result<Vec<u64>, ParseError> {
    let version = Version::from_str(version).map_err(|e| ParseError::Version {
        spec: spec.to_string(),
        reason: e.to_string(),
    })?;
    Ok(version.release().to_vec())
}

fn format_release(parts: &[u64]) -> String {
    parts
        .iter()
        .map(|part| part.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// A dependency on a package resolved from a package index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PypiDependency {
    /// The distribution name.
    pub name: PackageName,
    /// The version constraint.
    pub version: VersionSpec,
    /// Requested extras.
    pub extras: Vec<ExtraName>,
    /// Pip `--hash` pins.
    pub hashes: Vec<String>,
    /// Name of the index to resolve from, if not the default.
    pub source: Option<String>,
    /// Environment marker gating the dependency.
    pub markers: Option<MarkerTree>,
}

impl PypiDependency {
    /// Parse a flat list of PEP 508 requirement strings, as found in
    /// `[build-system] requires`.
    ///
    /// No marker or extra filtering is applied. Requirement strings whose
    /// version is a direct URL are rejected; build requirements are
    /// expected to be index-resolvable.
    pub fn parse_list<S: AsRef<str>>(requirements: &[S]) -> Result<Vec<PypiDependency>, ParseError> {
        requirements
            .iter()
            .map(|requirement| match Dependency::from_requirement_str(requirement.as_ref())? {
                Dependency::Pypi(dependency) => Ok(dependency),
                other => Err(ParseError::UnrecognizedShape {
                    name: other
                        .name()
                        .map(|name| name.to_string())
                        .unwrap_or_default(),
                    reason: "URL requirements are not supported here".to_string(),
                }),
            })
            .collect()
    }
}

/// A dependency on a package resolved from a Git remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitDependency {
    /// The distribution name.
    pub name: PackageName,
    /// The clone URL, without a `git+` prefix.
    pub url: String,
    /// Branch to install from. At most one of branch/rev/tag is honored.
    pub branch: Option<String>,
    /// Revision to install.
    pub rev: Option<String>,
    /// Tag to install.
    pub tag: Option<String>,
    /// Requested extras.
    pub extras: Vec<ExtraName>,
    /// Pip `--hash` pins. Not supported by the argument builder; kept so
    /// the installer can diagnose them.
    pub hashes: Vec<String>,
    /// Environment marker gating the dependency.
    pub markers: Option<MarkerTree>,
}

/// A dependency on a package resolved from a direct URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlDependency {
    /// The distribution name.
    pub name: PackageName,
    /// The artifact URL.
    pub url: Url,
    /// Requested extras.
    pub extras: Vec<ExtraName>,
    /// Pip `--hash` pins.
    pub hashes: Vec<String>,
    /// Environment marker gating the dependency.
    pub markers: Option<MarkerTree>,
}

/// A dependency on a project at a local filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDependency {
    /// The distribution name.
    pub name: PackageName,
    /// The project directory or archive.
    pub path: PathBuf,
    /// Requested extras.
    pub extras: Vec<ExtraName>,
    /// Install in editable mode.
    pub develop: bool,
    /// Install the project's own dependencies and symlink the project in
    /// place instead of copying it.
    pub link: bool,
    /// Pip `--hash` pins. Not supported by the argument builder; kept so
    /// the installer can diagnose them.
    pub hashes: Vec<String>,
    /// Environment marker gating the dependency.
    pub markers: Option<MarkerTree>,
}

/// An ordered list of alternatives; whichever alternative matches the
/// current environment is installed, nearest declared first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiDependency {
    /// The alternatives, in declaration order.
    pub dependencies: Vec<Dependency>,
}

/// A dependency declaration.
///
/// Exactly one concrete installable form is chosen per leaf dependency at
/// install time; a [`MultiDependency`] is always expanded before argument
/// conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Resolve from a package index.
    Pypi(PypiDependency),
    /// Resolve from a Git remote.
    Git(GitDependency),
    /// Resolve from a direct URL.
    Url(UrlDependency),
    /// Resolve from a local path.
    Path(PathDependency),
    /// Alternatives tried in declaration order.
    Multi(MultiDependency),
}

impl Dependency {
    /// Short tag naming the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Dependency::Pypi(_) => "pypi",
            Dependency::Git(_) => "git",
            Dependency::Url(_) => "url",
            Dependency::Path(_) => "path",
            Dependency::Multi(_) => "multi",
        }
    }

    /// The distribution name, if the variant has one.
    pub fn name(&self) -> Option<&PackageName> {
        match self {
            Dependency::Pypi(d) => Some(&d.name),
            Dependency::Git(d) => Some(&d.name),
            Dependency::Url(d) => Some(&d.name),
            Dependency::Path(d) => Some(&d.name),
            Dependency::Multi(_) => None,
        }
    }

    /// The requested extras.
    pub fn extras(&self) -> &[ExtraName] {
        match self {
            Dependency::Pypi(d) => &d.extras,
            Dependency::Git(d) => &d.extras,
            Dependency::Url(d) => &d.extras,
            Dependency::Path(d) => &d.extras,
            Dependency::Multi(_) => &[],
        }
    }

    /// The declared hash pins.
    pub fn hashes(&self) -> &[String] {
        match self {
            Dependency::Pypi(d) => &d.hashes,
            Dependency::Git(d) => &d.hashes,
            Dependency::Url(d) => &d.hashes,
            Dependency::Path(d) => &d.hashes,
            Dependency::Multi(_) => &[],
        }
    }

    /// The environment marker gating the dependency, if any.
    ///
    /// A multi dependency carries no marker of its own; its alternatives
    /// are tested individually when it is expanded.
    pub fn markers(&self) -> Option<&MarkerTree> {
        match self {
            Dependency::Pypi(d) => d.markers.as_ref(),
            Dependency::Git(d) => d.markers.as_ref(),
            Dependency::Url(d) => d.markers.as_ref(),
            Dependency::Path(d) => d.markers.as_ref(),
            Dependency::Multi(_) => None,
        }
    }
}

/// One entry in a dependency declaration list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependencyDecl {
    /// A PEP 508 requirement string.
    Spec(String),
    /// A structured declaration table.
    Table(DependencyTable),
    /// An array of tables declaring alternatives.
    Alternatives(Vec<DependencyTable>),
}

/// A structured dependency declaration, as written in configuration.
///
/// Exactly one of the source fields (`version`/`source`, `git`, `url`,
/// `path`) selects the shape; the remaining fields qualify it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DependencyTable {
    /// The distribution name.
    pub name: String,
    /// Version constraint for an index-resolved dependency.
    pub version: Option<String>,
    /// Requested extras.
    pub extras: Vec<String>,
    /// Environment marker expression.
    pub markers: Option<String>,
    /// Name of the index to resolve from.
    pub source: Option<String>,
    /// Pip `--hash` pins.
    pub hashes: Vec<String>,
    /// Git clone URL.
    pub git: Option<String>,
    /// Git branch.
    pub branch: Option<String>,
    /// Git revision.
    pub rev: Option<String>,
    /// Git tag.
    pub tag: Option<String>,
    /// Direct artifact URL.
    pub url: Option<String>,
    /// Local project path.
    pub path: Option<PathBuf>,
    /// Install the path dependency in editable mode.
    pub develop: bool,
    /// Symlink the path dependency and install its own dependencies.
    pub link: bool,
}

/// Parse an ordered list of dependency declarations, preserving order.
///
/// `context` is the project directory; relative `path` declarations are
/// resolved against it.
pub fn parse_dependencies(
    declarations: &[DependencyDecl],
    context: &Path,
) -> Result<Vec<Dependency>, ParseError> {
    declarations
        .iter()
        .map(|declaration| parse_declaration(declaration, context))
        .collect()
}

fn parse_declaration(
    declaration: &DependencyDecl,
    context: &Path,
) -> Result<Dependency, ParseError> {
    match declaration {
        DependencyDecl::Spec(spec) => Dependency::from_requirement_str(spec),
        DependencyDecl::Table(table) => parse_table(table, context),
        DependencyDecl::Alternatives(tables) => {
            let dependencies = tables
                .iter()
                .map(|table| parse_table(table, context))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Dependency::Multi(MultiDependency { dependencies }))
        }
    }
}

impl Dependency {
    /// Convert a parsed PEP 508 requirement into a dependency.
    ///
    /// `name @ git+<url>` requirements become Git dependencies, other URL
    /// requirements become URL dependencies.
    pub fn from_requirement(requirement: Requirement) -> Dependency {
        let Requirement {
            name,
            extras,
            version_or_url,
            marker,
            ..
        } = requirement;
        let markers = marker;
        match version_or_url {
            None => Dependency::Pypi(PypiDependency {
                name,
                version: VersionSpec::any(),
                extras,
                hashes: Vec::new(),
                source: None,
                markers,
            }),
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => Dependency::Pypi(PypiDependency {
                name,
                version: VersionSpec::from(specifiers),
                extras,
                hashes: Vec::new(),
                source: None,
                markers,
            }),
            Some(VersionOrUrl::Url(url)) => {
                let url = url.to_url();
                if let Some(git_url) = url.as_str().strip_prefix("git+") {
                    Dependency::Git(GitDependency {
                        name,
                        url: git_url.to_string(),
                        branch: None,
                        rev: None,
                        tag: None,
                        extras,
                        hashes: Vec::new(),
                        markers,
                    })
                } else {
                    Dependency::Url(UrlDependency {
                        name,
                        url,
                        extras,
                        hashes: Vec::new(),
                        markers,
                    })
                }
            }
        }
    }

    /// Parse a PEP 508 requirement string into a dependency.
    pub fn from_requirement_str(spec: &str) -> Result<Dependency, ParseError> {
        Ok(Dependency::from_requirement(Requirement::from_str(spec)?))
    }
}

fn parse_table(table: &DependencyTable, context: &Path) -> Result<Dependency, ParseError> {
    let name = package_name(&table.name)?;
    let extras = parse_extras(&table.extras)?;
    let markers = table
        .markers
        .as_deref()
        .map(|expression| MarkerTree::from_str(expression).map_err(ParseError::MarkerSyntax))
        .transpose()?;

    let mut sources = Vec::new();
    if table.version.is_some() || table.source.is_some() {
        sources.push("version");
    }
    if table.git.is_some() {
        sources.push("git");
    }
    if table.url.is_some() {
        sources.push("url");
    }
    if table.path.is_some() {
        sources.push("path");
    }
    if sources.len() > 1 {
        return Err(ParseError::UnrecognizedShape {
            name: table.name.clone(),
            reason: format!("mutually exclusive source fields: {}", sources.join(", ")),
        });
    }
    if table.git.is_none() && (table.branch.is_some() || table.rev.is_some() || table.tag.is_some())
    {
        return Err(ParseError::UnrecognizedShape {
            name: table.name.clone(),
            reason: "branch/rev/tag require a git source".to_string(),
        });
    }
    if table.path.is_none() && (table.develop || table.link) {
        return Err(ParseError::UnrecognizedShape {
            name: table.name.clone(),
            reason: "develop/link require a path source".to_string(),
        });
    }

    if let Some(git) = &table.git {
        // More than one of branch/rev/tag is permitted here; the argument
        // builder warns and installs from the default branch.
        Ok(Dependency::Git(GitDependency {
            name,
            url: git.clone(),
            branch: table.branch.clone(),
            rev: table.rev.clone(),
            tag: table.tag.clone(),
            extras,
            hashes: table.hashes.clone(),
            markers,
        }))
    } else if let Some(url) = &table.url {
        let url = Url::parse(url).map_err(|e| ParseError::InvalidUrl {
            name: table.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Dependency::Url(UrlDependency {
            name,
            url,
            extras,
            hashes: table.hashes.clone(),
            markers,
        }))
    } else if let Some(path) = &table.path {
        let path = if path.is_absolute() {
            path.clone()
        } else {
            context.join(path)
        };
        Ok(Dependency::Path(PathDependency {
            name,
            path,
            extras,
            develop: table.develop,
            link: table.link,
            hashes: table.hashes.clone(),
            markers,
        }))
    } else {
        let version = match &table.version {
            Some(version) => VersionSpec::parse(version)?,
            None => VersionSpec::any(),
        };
        Ok(Dependency::Pypi(PypiDependency {
            name,
            version,
            extras,
            hashes: table.hashes.clone(),
            source: table.source.clone(),
            markers,
        }))
    }
}

fn package_name(name: &str) -> Result<PackageName, ParseError> {
    PackageName::new(name.to_string()).map_err(|e| ParseError::InvalidName {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn parse_extras(extras: &[String]) -> Result<Vec<ExtraName>, ParseError> {
    let mut parsed: Vec<ExtraName> = Vec::with_capacity(extras.len());
    for extra in extras {
        let extra = ExtraName::from_str(extra).map_err(|e| ParseError::InvalidName {
            name: extra.clone(),
            reason: e.to_string(),
        })?;
        if !parsed.contains(&extra) {
            parsed.push(extra);
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> DependencyTable {
        DependencyTable {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_version_spec_passthrough() {
        let spec = VersionSpec::parse(">=1.0,<2.0").unwrap();
        assert_eq!(spec.to_pep_508(), ">=1.0, <2.0");
        assert!(!spec.is_any());
    }

    #[test]
    fn test_version_spec_any() {
        assert!(VersionSpec::parse("*").unwrap().is_any());
        assert_eq!(VersionSpec::parse("*").unwrap().to_pep_508(), "");
        assert_eq!(VersionSpec::any(), VersionSpec::parse("*").unwrap());
    }

    #[test]
    fn test_version_spec_caret() {
        assert_eq!(
            VersionSpec::parse("^1.2.3").unwrap(),
            VersionSpec::parse(">=1.2.3,<2").unwrap()
        );
        assert_eq!(
            VersionSpec::parse("^0.2.3").unwrap(),
            VersionSpec::parse(">=0.2.3,<0.3").unwrap()
        );
        assert_eq!(
            VersionSpec::parse("^0.0.3").unwrap(),
            VersionSpec::parse(">=0.0.3,<0.0.4").unwrap()
        );
        assert_eq!(
            VersionSpec::parse("^0").unwrap(),
            VersionSpec::parse(">=0,<1").unwrap()
        );
    }

    #[test]
    fn test_version_spec_tilde() {
        assert_eq!(
            VersionSpec::parse("~1.2.3").unwrap(),
            VersionSpec::parse(">=1.2.3,<1.3").unwrap()
        );
        assert_eq!(
            VersionSpec::parse("~1").unwrap(),
            VersionSpec::parse(">=1,<2").unwrap()
        );
    }

    #[test]
    fn test_version_spec_exact_and_wildcard() {
        assert_eq!(
            VersionSpec::parse("1.2.3").unwrap(),
            VersionSpec::parse("==1.2.3").unwrap()
        );
        assert_eq!(
            VersionSpec::parse("1.2.*").unwrap(),
            VersionSpec::parse("==1.2.*").unwrap()
        );
    }

    #[test]
    fn test_version_spec_compatible_release_is_not_tilde() {
        // `~=` is already PEP 440 and passes through untouched.
        assert_eq!(VersionSpec::parse("~=1.2").unwrap().to_pep_508(), "~=1.2");
    }

    #[test]
    fn test_version_spec_round_trip() {
        let spec = VersionSpec::parse(">=1.0,<2.0").unwrap();
        let reparsed = VersionSpec::parse(&spec.to_pep_508()).unwrap();
        assert_eq!(spec, reparsed);
    }

    #[test]
    fn test_version_spec_invalid() {
        assert!(matches!(
            VersionSpec::parse("^one.two"),
            Err(ParseError::Version { .. })
        ));
        assert!(matches!(
            VersionSpec::parse(">="),
            Err(ParseError::Version { .. })
        ));
    }

    #[test]
    fn test_parse_requirement_pypi() {
        let dependency = Dependency::from_requirement_str("requests[security] >=2.8.1 ; python_version > '3.8'")
            .unwrap();
        match &dependency {
            Dependency::Pypi(dependency) => {
                assert_eq!(dependency.name.to_string(), "requests");
                assert_eq!(dependency.version, VersionSpec::parse(">=2.8.1").unwrap());
                assert_eq!(dependency.extras.len(), 1);
                assert!(dependency.markers.is_some());
            }
            other => panic!("expected a pypi dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_requirement_without_marker_has_none() {
        let dependency = Dependency::from_requirement_str("requests >=2.0").unwrap();
        assert!(dependency.markers().is_none());
    }

    #[test]
    fn test_parse_requirement_url() {
        let dependency =
            Dependency::from_requirement_str("pip @ https://github.com/pypa/pip/archive/1.3.1.zip").unwrap();
        match &dependency {
            Dependency::Url(dependency) => {
                assert_eq!(dependency.name.to_string(), "pip");
                assert_eq!(
                    dependency.url.as_str(),
                    "https://github.com/pypa/pip/archive/1.3.1.zip"
                );
            }
            other => panic!("expected an url dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_requirement_git_url() {
        let dependency = Dependency::from_requirement_str("pylot @ git+https://example.com/pylot.git").unwrap();
        match &dependency {
            Dependency::Git(dependency) => {
                assert_eq!(dependency.url, "https://example.com/pylot.git");
                assert!(dependency.branch.is_none());
            }
            other => panic!("expected a git dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_requirement_invalid() {
        assert!(matches!(
            Dependency::from_requirement_str("requests >="),
            Err(ParseError::Pep508(_))
        ));
    }

    #[test]
    fn test_parse_table_pypi_defaults_to_any_version() {
        let dependency = parse_table(&table("requests"), Path::new(".")).unwrap();
        match dependency {
            Dependency::Pypi(dependency) => assert!(dependency.version.is_any()),
            other => panic!("expected a pypi dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_table_git_with_refs() {
        let declaration = DependencyTable {
            git: Some("https://example.com/pylot.git".to_string()),
            branch: Some("main".to_string()),
            tag: Some("v1".to_string()),
            ..table("pylot")
        };
        // Conflicting refs are permitted at parse time; the argument
        // builder warns about them later.
        let dependency = parse_table(&declaration, Path::new(".")).unwrap();
        assert_eq!(dependency.kind(), "git");
    }

    #[test]
    fn test_parse_table_path_resolves_relative_to_context() {
        let declaration = DependencyTable {
            path: Some(PathBuf::from("lib/helper")),
            develop: true,
            ..table("helper")
        };
        let dependency = parse_table(&declaration, Path::new("/repo/app")).unwrap();
        match dependency {
            Dependency::Path(dependency) => {
                assert_eq!(dependency.path, PathBuf::from("/repo/app/lib/helper"));
                assert!(dependency.develop);
                assert!(!dependency.link);
            }
            other => panic!("expected a path dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_table_rejects_conflicting_sources() {
        let declaration = DependencyTable {
            git: Some("https://example.com/pylot.git".to_string()),
            path: Some(PathBuf::from("./pylot")),
            ..table("pylot")
        };
        assert!(matches!(
            parse_table(&declaration, Path::new(".")),
            Err(ParseError::UnrecognizedShape { .. })
        ));
    }

    #[test]
    fn test_parse_table_rejects_refs_without_git() {
        let declaration = DependencyTable {
            branch: Some("main".to_string()),
            ..table("pylot")
        };
        assert!(matches!(
            parse_table(&declaration, Path::new(".")),
            Err(ParseError::UnrecognizedShape { .. })
        ));
    }

    #[test]
    fn test_parse_table_rejects_link_without_path() {
        let declaration = DependencyTable {
            link: true,
            ..table("pylot")
        };
        assert!(matches!(
            parse_table(&declaration, Path::new(".")),
            Err(ParseError::UnrecognizedShape { .. })
        ));
    }

    #[test]
    fn test_parse_table_bad_marker_is_marker_syntax() {
        let declaration = DependencyTable {
            markers: Some("python_version >".to_string()),
            ..table("requests")
        };
        assert!(matches!(
            parse_table(&declaration, Path::new(".")),
            Err(ParseError::MarkerSyntax(_))
        ));
    }

    #[test]
    fn test_parse_dependencies_preserves_order() {
        let declarations = vec![
            DependencyDecl::Spec("b >=1.0".to_string()),
            DependencyDecl::Spec("a >=1.0".to_string()),
            DependencyDecl::Table(DependencyTable {
                path: Some(PathBuf::from("./c")),
                ..table("c")
            }),
        ];
        let names = parse_dependencies(&declarations, Path::new("."))
            .unwrap()
            .iter()
            .map(|dependency| dependency.name().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_parse_alternatives() {
        let declarations = vec![DependencyDecl::Alternatives(vec![
            DependencyTable {
                version: Some("<=1.9".to_string()),
                markers: Some("python_version < '3.8'".to_string()),
                ..table("tomli")
            },
            DependencyTable {
                version: Some("^2.0".to_string()),
                markers: Some("python_version >= '3.8'".to_string()),
                ..table("tomli")
            },
        ])];
        let parsed = parse_dependencies(&declarations, Path::new(".")).unwrap();
        match &parsed[0] {
            Dependency::Multi(multi) => {
                assert_eq!(multi.dependencies.len(), 2);
                assert_eq!(multi.dependencies[0].kind(), "pypi");
            }
            other => panic!("expected a multi dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_declaration_tables_from_toml() {
        #[derive(Deserialize)]
        struct Decls {
            dependencies: Vec<DependencyDecl>,
        }
        let decls: Decls = toml::from_str(
            r#"
            dependencies = [
                "requests >=2.0",
                { name = "helper", path = "helper", develop = true },
                [
                    { name = "tomli", version = "<=1.9", markers = "python_version < '3.8'" },
                    { name = "tomli", version = "^2.0" },
                ],
            ]
            "#,
        )
        .unwrap();
        let parsed = parse_dependencies(&decls.dependencies, Path::new("/repo")).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].kind(), "pypi");
        assert_eq!(parsed[1].kind(), "path");
        assert_eq!(parsed[2].kind(), "multi");
    }

    #[test]
    fn test_parse_list() {
        let build = PypiDependency::parse_list(&["setuptools >= 40.8.0", "wheel"]).unwrap();
        assert_eq!(build.len(), 2);
        assert_eq!(build[0].name.to_string(), "setuptools");
        assert!(build[1].version.is_any());
    }

    #[test]
    fn test_parse_list_rejects_urls() {
        assert!(matches!(
            PypiDependency::parse_list(&["pip @ https://example.com/pip.zip"]),
            Err(ParseError::UnrecognizedShape { .. })
        ));
    }

    #[test]
    fn test_extras_are_deduplicated_in_order() {
        let extras = parse_extras(&[
            "cli".to_string(),
            "docs".to_string(),
            "cli".to_string(),
        ])
        .unwrap();
        assert_eq!(
            extras.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            vec!["cli", "docs"]
        );
    }
}
