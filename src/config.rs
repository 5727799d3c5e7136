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

//! Build configuration, read from `debian/installer-pkg.toml`.
//!
//! Every field has a default matching the installer's own packaging, so an
//! absent file or an empty one describes the stock build.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::email::{is_valid_email, maintainer_address};
use crate::error::{Error, Result};
use crate::shared::{DebArchitecture, DebPriority};

/// Where the config is looked up, relative to the source directory.
pub const CONFIG_PATH: &str = "debian/installer-pkg.toml";

pub const BUILD_MODE: &str = "release";
pub const STAGING_DIR: &str = "debian/tmp";
pub const TRIM_SCRIPT: &str = "debian/scripts/elf-strip-unused-dependencies.sh";
pub const TRIM_DIRS: &[&str] = &[
    "debian/proxmox-installer/usr/bin",
    "debian/proxmox-auto-install-assistant/usr/bin",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RulesConfig {
    /// Exported as `BUILD_MODE` to every helper.
    pub build_mode: String,
    pub staging_dir: PathBuf,
    pub trim_script: PathBuf,
    pub trim_dirs: Vec<PathBuf>,
    /// Assemble `.deb` files natively instead of calling `dh_builddeb`.
    pub native_deb: bool,
    pub output_dir: PathBuf,
    #[serde(rename = "package")]
    pub packages: Vec<PackageConfig>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            build_mode: BUILD_MODE.to_string(),
            staging_dir: PathBuf::from(STAGING_DIR),
            trim_script: PathBuf::from(TRIM_SCRIPT),
            trim_dirs: TRIM_DIRS.iter().map(PathBuf::from).collect(),
            native_deb: false,
            output_dir: PathBuf::from(".."),
            packages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageConfig {
    pub name: String,
    pub version: String,
    #[serde(default = "default_architecture")]
    pub architecture: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub maintainer: String,
    pub description: String,
    #[serde(default)]
    pub depends: Vec<String>,
}

fn default_architecture() -> String {
    "amd64".to_string()
}

fn default_priority() -> String {
    "optional".to_string()
}

impl PackageConfig {
    pub fn architecture(&self) -> Result<DebArchitecture> {
        self.architecture.parse()
    }

    pub fn priority(&self) -> Result<DebPriority> {
        self.priority.parse()
    }

    /// `<name>_<version>_<arch>.deb`
    pub fn deb_file_name(&self) -> String {
        format!("{}_{}_{}.deb", self.name, self.version, self.architecture)
    }
}

impl RulesConfig {
    /// Loads the config at `path`, falling back to defaults if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.build_mode.is_empty() {
            return Err(Error::config("build-mode", "must not be empty"));
        }
        if self.trim_script.as_os_str().is_empty() {
            return Err(Error::config("trim-script", "must not be empty"));
        }
        for package in &self.packages {
            package.validate()?;
        }
        Ok(())
    }

    pub fn package(&self, name: &str) -> Option<&PackageConfig> {
        self.packages.iter().find(|p| p.name == name)
    }
}

impl PackageConfig {
    pub fn validate(&self) -> Result<()> {
        // Debian policy 5.6.1: lowercase letters, digits, '+', '-', '.',
        // at least two characters, starting with an alphanumeric
        let valid_name = self.name.len() >= 2
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+-.".contains(c))
            && self
                .name
                .starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !valid_name {
            return Err(Error::config(
                "package.name",
                format!("'{}' is not a valid package name", self.name),
            ));
        }
        if self.version.is_empty() || !self.version.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::config(
                "package.version",
                format!("'{}' must start with a digit", self.version),
            ));
        }
        match maintainer_address(&self.maintainer) {
            Some(address) if is_valid_email(address) => {}
            _ => {
                return Err(Error::config(
                    "package.maintainer",
                    format!("'{}' has no valid email address", self.maintainer),
                ))
            }
        }
        self.architecture()?;
        self.priority()?;
        Ok(())
    }
}
