/*
    installer-pkg - Installer validation and Debian build recipe
    Copyright (C) 2023  NotSludgeBomb

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! installer-pkg - validation helpers and the package build recipe.
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use installer_pkg::binary::DebArchive;
use installer_pkg::config::{RulesConfig, CONFIG_PATH};
use installer_pkg::email::is_valid_email;
use installer_pkg::logger::init_cli_logger;
use installer_pkg::options::InstallerOptions;
use installer_pkg::process::SystemRunner;
use installer_pkg::rules::{missing, BuildContext, Recipe, Step, Target};

#[derive(Parser)]
#[command(name = "installer-pkg")]
#[command(about = "Installer input validation and package build recipe")]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Source directory of the package (default: current directory)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    directory: PathBuf,

    /// Build config (default: debian/installer-pkg.toml in the source directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check email addresses, exits with 1 if any is invalid
    Email {
        #[arg(required = true)]
        addresses: Vec<String>,
    },

    /// Run the build recipe
    Build {
        /// clean, build or binary
        #[arg(default_value = "binary")]
        target: Target,
    },

    /// Compare the staged files against the install manifests
    Missing,

    /// Strip binaries and trim unused library dependencies
    Strip,

    /// Print the installation summary for an options file
    Summary { options: PathBuf },

    /// Show the control file and contents of a .deb
    Inspect { deb: PathBuf },
}

fn load_config(cli: &Cli) -> Result<RulesConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.directory.join(CONFIG_PATH));
    RulesConfig::load(&path).with_context(|| format!("loading {}", path.display()))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_cli_logger(cli.verbose);

    match &cli.command {
        Commands::Email { addresses } => {
            let mut all_valid = true;
            for address in addresses {
                if is_valid_email(address) {
                    println!("{address}: valid");
                } else {
                    println!("{address}: invalid");
                    all_valid = false;
                }
            }
            if !all_valid {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Build { target } => {
            let config = load_config(&cli)?;
            let runner = SystemRunner;
            let ctx = BuildContext::new(&cli.directory, &runner);
            Recipe::installer(&config)
                .run(*target, &ctx)
                .context("build failed")?;
        }

        Commands::Missing => {
            let config = load_config(&cli)?;
            let runner = SystemRunner;
            let ctx = BuildContext::new(&cli.directory, &runner);
            let report = missing::FailMissing::new(config.staging_dir.clone()).report(&ctx)?;
            println!("{report}");
            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Strip => {
            let config = load_config(&cli)?;
            let runner = SystemRunner;
            let ctx = BuildContext::new(&cli.directory, &runner);
            Recipe::installer(&config)
                .run_step(Step::Strip, &ctx)
                .context("strip failed")?;
        }

        Commands::Summary { options } => {
            let content = fs::read_to_string(options)
                .with_context(|| format!("reading {}", options.display()))?;
            let options = InstallerOptions::from_toml(&content)?;
            for line in options.to_summary() {
                println!("{line}");
            }
            if let Err(e) = options.validate() {
                eprintln!("invalid options: {e}");
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Inspect { deb } => {
            let file = fs::File::open(deb).with_context(|| format!("opening {}", deb.display()))?;
            let archive = DebArchive::read(file)?;
            print!("{}", archive.control()?);
            println!();
            for path in archive.data_paths()? {
                println!("{}", path.display());
            }
            for (path, target) in archive.data_symlinks()? {
                println!("{} -> {}", path.display(), target.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
