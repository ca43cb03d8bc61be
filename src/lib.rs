//! Resolve and install dependencies for Python project repositories.

pub mod dependency;
pub mod environment;
pub mod installer;
pub mod pep508;
pub mod project;
