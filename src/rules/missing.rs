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

//! Checks that the staged install tree and the package install manifests
//! agree, like `dh_missing --fail-missing`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, error, info};

use super::{BuildContext, Step, StepHook};
use crate::error::{Error, Result};

pub const NOT_INSTALLED: &str = "debian/not-installed";

/// Differences between the staged files and the install manifests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MissingReport {
    /// Manifest patterns that match nothing in the staging directory.
    pub not_built: Vec<String>,
    /// Staged files that no manifest installs, relative to the staging directory.
    pub not_installed: Vec<PathBuf>,
}

impl MissingReport {
    pub fn is_clean(&self) -> bool {
        self.not_built.is_empty() && self.not_installed.is_empty()
    }
}

impl fmt::Display for MissingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.not_built.is_empty() {
            parts.push(format!(
                "listed in an install manifest but not built: {}",
                self.not_built.join(", ")
            ));
        }
        if !self.not_installed.is_empty() {
            let files: Vec<String> = self
                .not_installed
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            parts.push(format!("built but not installed: {}", files.join(", ")));
        }
        if parts.is_empty() {
            write!(f, "no missing files")
        } else {
            write!(f, "missing files, {}", parts.join("; "))
        }
    }
}

/// A manifest pattern. Matches a path itself or anything below it, `*` and
/// `?` stop at `/`.
#[derive(Debug)]
pub struct InstallPattern {
    raw: String,
    regex: Regex,
}

impl InstallPattern {
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw
            .trim_start_matches("debian/tmp/")
            .trim_start_matches('/')
            .trim_end_matches('/');
        let regex = Regex::new(&format!("^{}(?:/.*)?$", glob_to_regex(trimmed)))
            .map_err(|e| Error::config("install pattern", format!("'{raw}': {e}")))?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.regex.is_match(&path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::new();
    let mut chars = glob.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    class.push(c);
                }
                if closed && !class.is_empty() {
                    let (negate, body) = match class.strip_prefix('!') {
                        Some(body) => ("^", body),
                        None => ("", class.as_str()),
                    };
                    out.push('[');
                    out.push_str(negate);
                    // Keep '-' ranges, escape everything else regex treats specially
                    for c in body.chars() {
                        if c == '-' {
                            out.push('-');
                        } else {
                            out.push_str(&regex::escape(&c.to_string()));
                        }
                    }
                    out.push(']');
                } else {
                    out.push_str(&regex::escape(&format!("[{class}")));
                    if closed {
                        out.push_str(r"\]");
                    }
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out
}

/// Reads the source patterns from an install manifest: the first word of
/// every line that isn't blank or a comment.
pub fn parse_manifest(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Collects patterns from every `debian/*.install` file, in file name order.
pub fn read_manifests(debian_dir: &Path) -> Result<Vec<String>> {
    if !debian_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut manifests: Vec<PathBuf> = fs::read_dir(debian_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "install"))
        .collect();
    manifests.sort();

    let mut patterns = Vec::new();
    for manifest in manifests {
        debug!(manifest = %manifest.display(), "reading install manifest");
        patterns.extend(parse_manifest(&fs::read_to_string(&manifest)?));
    }
    Ok(patterns)
}

/// Files and symlinks below `staging`, relative to it and sorted.
pub fn staged_files(staging: &Path) -> Result<Vec<PathBuf>> {
    if !staging.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(staging).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(staging) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Compares the staged tree against the manifests.
///
/// `not_installed` lists patterns for files deliberately left out of every
/// package (`debian/not-installed`).
pub fn check<S: AsRef<str>>(
    staging: &Path,
    manifests: &[S],
    not_installed: &[S],
) -> Result<MissingReport> {
    let install = manifests
        .iter()
        .map(|p| InstallPattern::new(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let ignored = not_installed
        .iter()
        .map(|p| InstallPattern::new(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let files = staged_files(staging)?;

    let not_built = install
        .iter()
        .filter(|pattern| !files.iter().any(|f| pattern.matches(f)))
        .map(|pattern| pattern.as_str().to_string())
        .collect();

    let not_installed = files
        .into_iter()
        .filter(|f| !install.iter().chain(&ignored).any(|pattern| pattern.matches(f)))
        .collect();

    Ok(MissingReport {
        not_built,
        not_installed,
    })
}

/// Fails the build when the staged files and install manifests disagree.
#[derive(Clone, Debug)]
pub struct FailMissing {
    staging_dir: PathBuf,
}

impl FailMissing {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    pub fn report(&self, ctx: &BuildContext<'_>) -> Result<MissingReport> {
        let manifests = read_manifests(&ctx.path("debian"))?;
        let not_installed_path = ctx.path(NOT_INSTALLED);
        let not_installed = if not_installed_path.is_file() {
            parse_manifest(&fs::read_to_string(&not_installed_path)?)
        } else {
            Vec::new()
        };
        check(&ctx.path(&self.staging_dir), &manifests, &not_installed)
    }
}

impl StepHook for FailMissing {
    fn run(&self, _step: Step, ctx: &BuildContext<'_>) -> Result<()> {
        let report = self.report(ctx)?;
        if report.is_clean() {
            info!("all staged files are installed");
            return Ok(());
        }
        for pattern in &report.not_built {
            error!(%pattern, "listed in an install manifest but not built");
        }
        for file in &report.not_installed {
            error!(file = %file.display(), "built but not installed into any package");
        }
        Err(Error::MissingFiles(report))
    }
}
