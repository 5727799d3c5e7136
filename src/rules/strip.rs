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

//! Debug symbol stripping followed by unused library dependency trimming.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{run_default, BuildContext, Step, StepHook};
use crate::error::Result;
use crate::shared::is_executable;

/// Which executables were trimmed and which the trim script failed on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StripReport {
    pub trimmed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Regular executable files directly inside each of `dirs`, like a shell
/// `dir/*` glob, sorted per directory. Directories that don't exist are
/// skipped.
pub fn find_executables(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "skipping, not a directory");
            continue;
        }
        for entry in walkdir::WalkDir::new(dir).max_depth(1).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && is_executable(entry.path()) {
                found.push(entry.into_path());
            }
        }
    }
    Ok(found)
}

/// Runs `script <exe>` for every executable below `dirs`.
///
/// A failure only affects that one executable: it is logged, recorded, and
/// the next one is processed. Paths are passed relative to the source
/// directory when possible.
pub fn trim_unused_dependencies(
    ctx: &BuildContext<'_>,
    script: &Path,
    dirs: &[PathBuf],
) -> Result<StripReport> {
    let dirs: Vec<PathBuf> = dirs.iter().map(|d| ctx.path(d)).collect();
    let script = ctx.path(script);
    let mut report = StripReport::default();

    for exe in find_executables(&dirs)? {
        let arg = exe.strip_prefix(ctx.source_dir()).unwrap_or(&exe);
        let cmd = ctx
            .command(script.to_string_lossy())
            .arg_path(arg);
        match ctx.runner().run(&cmd) {
            Ok(outcome) if outcome.success() => {
                debug!(exe = %arg.display(), "trimmed unused dependencies");
                report.trimmed.push(arg.to_path_buf());
            }
            Ok(outcome) => {
                warn!(exe = %arg.display(), %outcome, "dependency trimming failed, continuing");
                report.failed.push(arg.to_path_buf());
            }
            Err(e) => {
                warn!(exe = %arg.display(), error = %e, "dependency trimming failed, continuing");
                report.failed.push(arg.to_path_buf());
            }
        }
    }
    Ok(report)
}

/// `dh_strip`, then the trim script over the installer's executables.
#[derive(Clone, Debug)]
pub struct StripAndTrim {
    script: PathBuf,
    dirs: Vec<PathBuf>,
}

impl StripAndTrim {
    pub fn new(script: impl Into<PathBuf>, dirs: Vec<PathBuf>) -> Self {
        Self {
            script: script.into(),
            dirs,
        }
    }
}

impl StepHook for StripAndTrim {
    fn run(&self, step: Step, ctx: &BuildContext<'_>) -> Result<()> {
        run_default(step, ctx)?;
        let report = trim_unused_dependencies(ctx, &self.script, &self.dirs)?;
        info!(
            trimmed = report.trimmed.len(),
            failed = report.failed.len(),
            "dependency trimming done"
        );
        Ok(())
    }
}
