//! Environment-marker evaluation for dependencies.
//!
//! Decides whether a dependency applies to a target environment, given the
//! set of extras the caller requested. Marker expressions are parsed when
//! the dependency is parsed; evaluation itself cannot fail.

use std::str::FromStr;

use pep508_rs::{ExtraName, MarkerEnvironment, StringVersion};

use crate::dependency::Dependency;

/// Crate-local re-creation of pep508_rs's `MarkerEnvironmentBuilder`, which is
/// not exposed by the pinned 0.6.1 release. Mirrors the upstream builder so a
/// [`MarkerEnvironment`] can be constructed from string fields, parsing the
/// three version fields and surfacing a parse error as the builder did.
pub(crate) struct MarkerEnvironmentBuilder<'a> {
    pub implementation_name: &'a str,
    pub implementation_version: &'a str,
    pub os_name: &'a str,
    pub platform_machine: &'a str,
    pub platform_python_implementation: &'a str,
    pub platform_release: &'a str,
    pub platform_system: &'a str,
    pub platform_version: &'a str,
    pub python_full_version: &'a str,
    pub python_version: &'a str,
    pub sys_platform: &'a str,
}

impl TryFrom<MarkerEnvironmentBuilder<'_>> for MarkerEnvironment {
    type Error = String;

    fn try_from(builder: MarkerEnvironmentBuilder<'_>) -> Result<Self, Self::Error> {
        Ok(MarkerEnvironment {
            implementation_name: builder.implementation_name.to_string(),
            implementation_version: StringVersion::from_str(builder.implementation_version)?,
            os_name: builder.os_name.to_string(),
            platform_machine: builder.platform_machine.to_string(),
            platform_python_implementation: builder.platform_python_implementation.to_string(),
            platform_release: builder.platform_release.to_string(),
            platform_system: builder.platform_system.to_string(),
            platform_version: builder.platform_version.to_string(),
            python_full_version: StringVersion::from_str(builder.python_full_version)?,
            python_version: StringVersion::from_str(builder.python_version)?,
            sys_platform: builder.sys_platform.to_string(),
        })
    }
}

/// Whether `dependency` is active in `env` given the requested `extras`.
///
/// A dependency without a marker is always active. Extras-conditioned
/// dependencies (`; extra == "foo"`) are active only if `foo` is in
/// `extras`. A multi dependency always passes; its alternatives are tested
/// individually when it is expanded.
pub fn test_dependency(
    dependency: &Dependency,
    env: &MarkerEnvironment,
    extras: &[ExtraName],
) -> bool {
    match dependency.markers() {
        Some(markers) => markers.evaluate(env, extras),
        None => true,
    }
}

/// Filter `dependencies` down to the ones active in `env`, preserving their
/// relative order.
pub fn filter_dependencies(
    dependencies: Vec<Dependency>,
    env: &MarkerEnvironment,
    extras: &[ExtraName],
) -> Vec<Dependency> {
    dependencies
        .into_iter()
        .filter(|dependency| test_dependency(dependency, env, extras))
        .collect()
}
