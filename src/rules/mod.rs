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

//! The package build recipe.
//!
//! A [`Recipe`] walks a debhelper-style sequence of [`Step`]s. Each step runs
//! its `dh_*` helper unless an override hook has been registered for it,
//! which mirrors `override_dh_<step>` targets in a `debian/rules` makefile.

pub mod builddeb;
pub mod missing;
pub mod strip;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, info_span};

use crate::config::RulesConfig;
use crate::error::{Error, Result};
use crate::process::{Cmd, CommandRunner};

pub use builddeb::NativeBuilddeb;
pub use missing::FailMissing;
pub use strip::StripAndTrim;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    AutoClean,
    Clean,
    AutoConfigure,
    AutoBuild,
    AutoTest,
    Prep,
    AutoInstall,
    Install,
    Missing,
    Strip,
    Shlibdeps,
    Gencontrol,
    Md5sums,
    Builddeb,
}

impl Step {
    pub const ALL: &'static [Step] = &[
        Step::AutoClean,
        Step::Clean,
        Step::AutoConfigure,
        Step::AutoBuild,
        Step::AutoTest,
        Step::Prep,
        Step::AutoInstall,
        Step::Install,
        Step::Missing,
        Step::Strip,
        Step::Shlibdeps,
        Step::Gencontrol,
        Step::Md5sums,
        Step::Builddeb,
    ];

    /// Name as used in `override_dh_<name>`.
    pub fn name(&self) -> &'static str {
        match self {
            Step::AutoClean => "auto_clean",
            Step::Clean => "clean",
            Step::AutoConfigure => "auto_configure",
            Step::AutoBuild => "auto_build",
            Step::AutoTest => "auto_test",
            Step::Prep => "prep",
            Step::AutoInstall => "auto_install",
            Step::Install => "install",
            Step::Missing => "missing",
            Step::Strip => "strip",
            Step::Shlibdeps => "shlibdeps",
            Step::Gencontrol => "gencontrol",
            Step::Md5sums => "md5sums",
            Step::Builddeb => "builddeb",
        }
    }

    /// The debhelper program run by default.
    pub fn helper(&self) -> String {
        format!("dh_{}", self.name())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.strip_prefix("dh_").unwrap_or(s);
        Step::ALL
            .iter()
            .copied()
            .find(|step| step.name() == name)
            .ok_or_else(|| Error::config("step", format!("unknown step '{s}'")))
    }
}

/// What `debian/rules <target>` is asked to do.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Target {
    Clean,
    Build,
    #[default]
    Binary,
}

impl Target {
    pub fn steps(&self) -> &'static [Step] {
        match self {
            Target::Clean => &[Step::AutoClean, Step::Clean],
            Target::Build => &[Step::AutoConfigure, Step::AutoBuild, Step::AutoTest],
            Target::Binary => &Step::ALL[2..],
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clean" => Ok(Target::Clean),
            "build" => Ok(Target::Build),
            "binary" => Ok(Target::Binary),
            other => Err(Error::config("target", format!("unknown target '{other}'"))),
        }
    }
}

/// Everything a step needs to do its work.
pub struct BuildContext<'a> {
    source_dir: PathBuf,
    env: Vec<(String, String)>,
    runner: &'a dyn CommandRunner,
}

impl<'a> BuildContext<'a> {
    pub fn new(source_dir: impl Into<PathBuf>, runner: &'a dyn CommandRunner) -> Self {
        Self {
            source_dir: source_dir.into(),
            env: Vec::new(),
            runner,
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Resolves `path` against the source directory.
    pub fn path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.source_dir.join(path)
    }

    /// A command running in the source directory with the recipe's environment.
    pub fn command(&self, program: impl AsRef<str>) -> Cmd {
        let mut cmd = Cmd::new(program).dir(&self.source_dir);
        for (key, value) in &self.env {
            cmd = cmd.env(key, value);
        }
        cmd
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner
    }

    fn with_env(&self, env: &[(String, String)]) -> BuildContext<'a> {
        BuildContext {
            source_dir: self.source_dir.clone(),
            env: self.env.iter().chain(env).cloned().collect(),
            runner: self.runner,
        }
    }
}

/// Replaces the default action of a step.
pub trait StepHook {
    fn run(&self, step: Step, ctx: &BuildContext<'_>) -> Result<()>;
}

/// Runs the step's `dh_*` helper. A failing helper fails the build.
pub fn run_default(step: Step, ctx: &BuildContext<'_>) -> Result<()> {
    let cmd = ctx.command(step.helper());
    let outcome = ctx.runner().run(&cmd)?;
    if outcome.success() {
        Ok(())
    } else {
        Err(Error::StepFailed {
            step,
            status: outcome.to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepRecord {
    pub step: Step,
    pub overridden: bool,
}

/// Steps that completed, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub steps: Vec<StepRecord>,
}

#[derive(Default)]
pub struct Recipe {
    env: Vec<(String, String)>,
    overrides: BTreeMap<Step, Box<dyn StepHook>>,
}

impl Recipe {
    /// A recipe running the plain helper for every step.
    pub fn new() -> Self {
        Self::default()
    }

    /// The installer's packaging recipe: release build mode, fail on files
    /// left out of every package, strip and trim unused library references.
    pub fn installer(config: &RulesConfig) -> Self {
        let mut recipe = Recipe::new()
            .with_env("BUILD_MODE", &config.build_mode)
            .override_step(
                Step::Missing,
                FailMissing::new(config.staging_dir.clone()),
            )
            .override_step(
                Step::Strip,
                StripAndTrim::new(config.trim_script.clone(), config.trim_dirs.clone()),
            );
        if config.native_deb {
            recipe = recipe.override_step(
                Step::Builddeb,
                NativeBuilddeb::new(config.packages.clone(), config.output_dir.clone()),
            );
        }
        recipe
    }

    /// Exports `key=value` to every command the recipe runs.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn override_step<H: StepHook + 'static>(mut self, step: Step, hook: H) -> Self {
        self.overrides.insert(step, Box::new(hook));
        self
    }

    pub fn is_overridden(&self, step: Step) -> bool {
        self.overrides.contains_key(&step)
    }

    /// Runs a single step, through its override if there is one.
    pub fn run_step(&self, step: Step, ctx: &BuildContext<'_>) -> Result<StepRecord> {
        let ctx = ctx.with_env(&self.env);
        let _span = info_span!("step", %step).entered();
        let overridden = match self.overrides.get(&step) {
            Some(hook) => {
                info!("running override");
                hook.run(step, &ctx)?;
                true
            }
            None => {
                info!(helper = %step.helper(), "running");
                run_default(step, &ctx)?;
                false
            }
        };
        Ok(StepRecord { step, overridden })
    }

    /// Runs every step of `target` in order, stopping at the first failure.
    pub fn run(&self, target: Target, ctx: &BuildContext<'_>) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        for &step in target.steps() {
            report.steps.push(self.run_step(step, ctx)?);
        }
        info!(steps = report.steps.len(), "build finished");
        Ok(report)
    }
}
