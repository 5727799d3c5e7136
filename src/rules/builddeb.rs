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

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{BuildContext, Step, StepHook};
use crate::binary::DebPackage;
use crate::config::PackageConfig;
use crate::error::{Error, Result};

/// Assembles `.deb` files directly instead of calling `dh_builddeb`.
#[derive(Clone, Debug)]
pub struct NativeBuilddeb {
    packages: Vec<PackageConfig>,
    output_dir: PathBuf,
}

impl NativeBuilddeb {
    pub fn new(packages: Vec<PackageConfig>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            packages,
            output_dir: output_dir.into(),
        }
    }
}

/// The package described by `config`, filled from the staged tree `root`.
pub fn package_from_config(config: &PackageConfig, root: &Path) -> Result<DebPackage> {
    if !root.is_dir() {
        return Err(Error::package(format!(
            "{} has no staged tree at {}",
            config.name,
            root.display()
        )));
    }
    DebPackage::new(&config.name)
        .set_version(&config.version)
        .set_architecture(config.architecture()?)
        .set_priority(config.priority()?)
        .set_maintainer(&config.maintainer)
        .set_description(&config.description)
        .with_depends(config.depends.as_slice())
        .with_dir(root, "/")
}

impl StepHook for NativeBuilddeb {
    fn run(&self, _step: Step, ctx: &BuildContext<'_>) -> Result<()> {
        if self.packages.is_empty() {
            return Err(Error::config("package", "native builddeb needs at least one package"));
        }
        let output_dir = ctx.path(&self.output_dir);
        fs::create_dir_all(&output_dir)?;

        for config in &self.packages {
            let root = ctx.path("debian").join(&config.name);
            let package = package_from_config(config, &root)?;
            let target = output_dir.join(package.file_name());
            package.build()?.write(fs::File::create(&target)?)?;
            info!(
                package = %config.name,
                files = package.files().len(),
                path = %target.display(),
                "wrote package"
            );
        }
        Ok(())
    }
}
