use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pylot::dependency::Dependency;
use pylot::environment::PythonEnvironment;
use pylot::installer::{
    get_indexes_for_projects, InstallOptions, Installer, PipInstaller,
};
use pylot::project::Project;

#[derive(Parser)]
struct InstallArgs {
    #[clap(long, env = "PYLOT_PYTHON", default_value = "python3")]
    /// Interpreter of the environment to install into
    python: PathBuf,

    #[clap(long)]
    /// Also install development dependencies
    dev: bool,

    #[clap(long, use_value_delimiter = true)]
    /// Extra dependency groups to install
    extras: Vec<String>,

    #[clap(long, short)]
    /// Pass -q to pip
    quiet: bool,

    #[clap(long)]
    /// Pass --upgrade to pip
    upgrade: bool,
}

#[derive(Subcommand)]
enum Command {
    #[clap(name = "install")]
    Install(InstallArgs),
    #[clap(name = "info")]
    Info,
}

#[derive(Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    #[clap(long, short, default_value = ".")]
    directory: PathBuf,

    #[clap(long)]
    /// Print more verbose output
    debug: bool,
}

fn describe(dependency: &Dependency) -> String {
    match dependency {
        Dependency::Multi(multi) => {
            format!("{} alternatives (multi)", multi.dependencies.len())
        }
        other => match other.name() {
            Some(name) => format!("{} ({})", name, other.kind()),
            None => other.kind().to_string(),
        },
    }
}

fn main() -> Result<(), i32> {
    let args = Args::parse();

    env_logger::builder()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter(
            None,
            if args.debug {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .init();

    let project = match Project::discover(&args.directory) {
        Ok(project) => project,
        Err(e) => {
            log::error!("Error loading project: {}", e);
            return Err(1);
        }
    };
    let dependencies = match project.dependencies() {
        Ok(dependencies) => dependencies,
        Err(e) => {
            log::error!("Error reading dependencies: {}", e);
            return Err(1);
        }
    };

    match &args.command {
        Command::Info => {
            println!(
                "project: {}",
                project.name().unwrap_or("(unnamed)")
            );
            if let Some(python) = &dependencies.python {
                println!("requires-python: {}", python);
            }
            for dependency in &dependencies.run {
                println!("run: {}", describe(dependency));
            }
            for dependency in &dependencies.dev {
                println!("dev: {}", describe(dependency));
            }
            for (extra, group) in &dependencies.extra {
                for dependency in group {
                    println!("extra [{}]: {}", extra, describe(dependency));
                }
            }
            for (name, url) in &dependencies.indexes.urls {
                let default = dependencies.indexes.default.as_deref() == Some(name.as_str());
                println!(
                    "index: {} = {}{}",
                    name,
                    url,
                    if default { " (default)" } else { "" }
                );
            }
            Ok(())
        }
        Command::Install(install_args) => {
            let indexes = match get_indexes_for_projects(std::slice::from_ref(&project)) {
                Ok(indexes) => indexes,
                Err(e) => {
                    log::error!("Error merging indexes: {}", e);
                    return Err(1);
                }
            };

            let mut to_install = dependencies.run.clone();
            if install_args.dev {
                to_install.extend(dependencies.dev.clone());
            }
            for extra in &install_args.extras {
                match dependencies.extra.get(extra) {
                    Some(group) => to_install.extend(group.clone()),
                    None => {
                        log::error!("Unknown extra: {}", extra);
                        return Err(1);
                    }
                }
            }

            let target = match PythonEnvironment::of(&install_args.python) {
                Ok(target) => target,
                Err(e) => {
                    log::error!("Error probing {}: {}", install_args.python.display(), e);
                    return Err(1);
                }
            };
            log::info!(
                "Installing {} dependencies into {} (Python {})",
                to_install.len(),
                target.executable.display(),
                target.version
            );

            let options = InstallOptions {
                indexes,
                quiet: install_args.quiet,
                upgrade: install_args.upgrade,
            };
            let installer = PipInstaller::new(None);
            match installer.install(&to_install, &target, &options) {
                Ok(0) => Ok(()),
                Ok(status) => {
                    log::error!("pip exited with status {}", status);
                    Err(status)
                }
                Err(e) => {
                    log::error!("Error: {}", e);
                    Err(1)
                }
            }
        }
    }
}
