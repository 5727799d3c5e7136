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

use std::cell::{Cell, RefCell};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::binary::*;
use crate::cidr::*;
use crate::config::*;
use crate::email::*;
use crate::options::*;
use crate::process::*;
use crate::rules::missing::{self, FailMissing, MissingReport};
use crate::rules::strip::{self, StripAndTrim};
use crate::rules::*;
use crate::*;

// Records every command and fails those whose program or last argument
// ends with one of `fail`
#[derive(Default)]
struct RecordingRunner {
    commands: RefCell<Vec<Cmd>>,
    fail: Vec<String>,
    unspawnable: Vec<String>,
}

impl RecordingRunner {
    fn failing(fail: &[&str]) -> Self {
        Self {
            fail: fail.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn programs(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .map(|c| c.program().to_string())
            .collect()
    }

    fn last_args(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|c| c.get_args().last().cloned())
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandOutcome> {
        self.commands.borrow_mut().push(cmd.clone());
        let hit = |list: &[String]| {
            list.iter().any(|f| {
                cmd.program().ends_with(f.as_str())
                    || cmd.get_args().last().is_some_and(|a| a.ends_with(f.as_str()))
            })
        };
        if hit(&self.unspawnable) {
            return Err(Error::Spawn {
                program: cmd.program().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        if hit(&self.fail) {
            Ok(CommandOutcome::Exited(1))
        } else {
            Ok(CommandOutcome::Exited(0))
        }
    }
}

fn write_file(root: &Path, path: &str, contents: &str) -> PathBuf {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(&full, contents).unwrap();
    full
}

#[cfg(unix)]
fn write_exec(root: &Path, path: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let full = write_file(root, path, "\x7fELF");
    fs::set_permissions(&full, fs::Permissions::from_mode(0o755)).unwrap();
    full
}

// --- email ---

#[test]
fn accepts_common_addresses() {
    for address in [
        "user@example.com",
        "mail@example.invalid",
        "root@localhost",
        "first.last+tag@sub.domain.example.org",
        "a.b!#$%&'*+/=?^_`{|}~-@x.org",
        "USER@EXAMPLE.COM",
        "x@a-b.c1",
    ] {
        assert!(is_valid_email(address), "{address} should be valid");
    }
}

#[test]
fn rejects_malformed_addresses() {
    for address in [
        "",
        "@",
        "user@",
        "@example.com",
        "user@-example.com",
        "user@example-.com",
        "user@example..com",
        "user@.example.com",
        "user@example.com.",
        "user@exa_mple.com",
        "us er@example.com",
        "us\"er@example.com",
        "user@@example.com",
        "user(comment)@example.com",
        "üser@example.com",
    ] {
        assert!(!is_valid_email(address), "{address:?} should be invalid");
    }
}

#[test]
fn strings_without_at_are_rejected() {
    for address in [
        "user",
        "example.com",
        "user.example.com",
        "user%example.com",
        "!#$%&'*+/=?^_`{|}~-",
    ] {
        assert!(!address.contains('@'));
        assert!(!is_valid_email(address));
    }
}

#[test]
fn label_length_is_limited_to_63() {
    let label_63 = "a".repeat(63);
    let label_64 = "a".repeat(64);
    assert!(is_valid_email(&format!("user@{label_63}.com")));
    assert!(is_valid_email(&format!("user@example.{label_63}")));
    assert!(!is_valid_email(&format!("user@{label_64}.com")));
    assert!(!is_valid_email(&format!("user@example.{label_64}")));
    assert!(!is_valid_email(&format!("user@{label_64}")));
}

#[test]
fn no_normalization_is_done() {
    assert!(!is_valid_email(" user@example.com"));
    assert!(!is_valid_email("user@example.com "));
    assert!(!is_valid_email("user@example.com\n"));

    let address: EmailAddress = "Root@Example.COM".parse().unwrap();
    assert_eq!(address.as_str(), "Root@Example.COM");
    assert_eq!(address.local_part(), "Root");
    assert_eq!(address.domain(), "Example.COM");
}

#[test]
fn email_address_parse_errors() {
    match "user@-example.com".parse::<EmailAddress>() {
        Err(Error::InvalidEmail(input)) => assert_eq!(input, "user@-example.com"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn maintainer_field_address() {
    assert_eq!(
        maintainer_address("Proxmox Support Team <support@proxmox.com>"),
        Some("support@proxmox.com")
    );
    assert_eq!(maintainer_address("support@proxmox.com"), Some("support@proxmox.com"));
    assert_eq!(maintainer_address("Broken <support@proxmox.com"), None);
}

// --- cidr ---

#[test]
fn parse_cidr_addresses() {
    let v4: CidrAddress = "192.168.100.2/24".parse().unwrap();
    assert_eq!(v4.addr(), "192.168.100.2".parse::<IpAddr>().unwrap());
    assert_eq!(v4.mask(), 24);
    assert_eq!(v4.to_string(), "192.168.100.2/24");

    let v6: CidrAddress = "fd00::1/64".parse().unwrap();
    assert_eq!(v6.mask(), 64);
    assert_eq!(v6.to_string(), "fd00::1/64");
}

#[test]
fn cidr_parse_errors() {
    assert_eq!(
        "10.0.0.1".parse::<CidrAddress>(),
        Err(CidrAddressParseError::NoDelimiter)
    );
    assert!(matches!(
        "10.0.0.1/abc".parse::<CidrAddress>(),
        Err(CidrAddressParseError::InvalidMask(Some(_)))
    ));
    assert_eq!(
        "10.0.0.1/33".parse::<CidrAddress>(),
        Err(CidrAddressParseError::InvalidMask(None))
    );
    assert_eq!(
        "fd00::1/129".parse::<CidrAddress>(),
        Err(CidrAddressParseError::InvalidMask(None))
    );
    assert!(matches!(
        "pve.example/24".parse::<CidrAddress>(),
        Err(CidrAddressParseError::InvalidAddr(_))
    ));
    assert!("fd00::1/128".parse::<CidrAddress>().is_ok());
}

#[test]
fn cidr_address_is_parsed_before_mask_range() {
    // the mask limit depends on the address family
    assert!(matches!(
        "foo/40".parse::<CidrAddress>(),
        Err(CidrAddressParseError::InvalidAddr(_))
    ));
    assert_eq!(
        "10.0.0.1/40".parse::<CidrAddress>(),
        Err(CidrAddressParseError::InvalidMask(None))
    );
    assert_eq!("fd00::1/40".parse::<CidrAddress>().map(|c| c.mask()), Ok(40));
}

// --- options ---

fn disk(path: &str, size: u64) -> Disk {
    Disk {
        path: path.to_string(),
        size,
    }
}

#[test]
fn lvm_defaults_depend_on_disk_size() {
    let large = LvmBootdiskOptions::defaults_from(&disk("/dev/sda", 256 * 1024 * 1024));
    assert_eq!(large.total_size, 256 * 1024 * 1024);
    assert_eq!(large.min_lvm_free, 16 * 1024 * 1024);
    assert_eq!(large.swap_size, 4 * 1024 * 1024);

    let small = LvmBootdiskOptions::defaults_from(&disk("/dev/sdb", 64 * 1024 * 1024));
    assert_eq!(small.min_lvm_free, 8 * 1024 * 1024);
    assert_eq!(small.max_root_size, 0);
}

#[test]
fn summary_lists_options_in_order() {
    let mut options = InstallerOptions {
        bootdisk: BootdiskOptions::defaults_from(vec![disk("/dev/nvme0n1", 1 << 40)]).unwrap(),
        timezone: TimezoneOptions::default(),
        password: PasswordOptions::default(),
        network: NetworkOptions::default(),
    };
    options.bootdisk.fstype = FsType::Xfs;
    options.network.ifname = "enp1s0".to_string();
    options.network.address = "192.168.1.5/24".parse().unwrap();

    let summary = options.to_summary();
    let names: Vec<&str> = summary.iter().map(|o| o.name).collect();
    assert_eq!(
        names,
        [
            "Bootdisk filesystem",
            "Bootdisks",
            "Timezone",
            "Keyboard layout",
            "Administrator email",
            "Management interface",
            "Hostname",
            "Host IP (CIDR)",
            "Gateway",
            "DNS",
        ]
    );
    assert_eq!(summary[0].value, "XFS");
    assert_eq!(summary[1].value, "/dev/nvme0n1");
    assert_eq!(summary[2].value, "Europe/Vienna");
    assert_eq!(summary[4].value, "mail@example.invalid");
    assert_eq!(summary[7].value, "192.168.1.5/24");
    assert_eq!(summary[8].value, "0.0.0.0");
}

#[test]
fn options_from_toml_and_validate() {
    let options = InstallerOptions::from_toml(
        r#"
        [bootdisk]
        fstype = "xfs"
        disks = [{ path = "/dev/sda", size = 1000 }]
        advanced = { type = "lvm", disk = { path = "/dev/sda", size = 1000 }, total_size = 1000, swap_size = 0, max_root_size = 0, max_data_size = 0, min_lvm_free = 125 }

        [password]
        email = "admin@example.com"
        root_password = "secret"

        [network]
        address = "10.0.0.2/8"
        gateway = "10.0.0.1"
        dns_server = "10.0.0.1"
        "#,
    );
    let options = options.unwrap();
    assert_eq!(options.bootdisk.fstype, FsType::Xfs);
    assert_eq!(options.network.fqdn, "pve.example.invalid");
    assert_eq!(options.timezone.kb_layout, "en_US");
    assert!(options.validate().is_ok());

    let mut bad = options.clone();
    bad.password.email = "admin@-example.com".to_string();
    assert!(matches!(bad.validate(), Err(Error::InvalidEmail(_))));

    let mut bad = options.clone();
    bad.password.root_password.clear();
    assert!(matches!(bad.validate(), Err(Error::InvalidConfig { .. })));

    assert!(InstallerOptions::from_toml("[bootdisk]\ndisks = []\n").is_err());
}

#[test]
fn invalid_cidr_in_options_is_rejected() {
    let result = InstallerOptions::from_toml(
        r#"
        [bootdisk]
        disks = [{ path = "/dev/sda", size = 1000 }]
        advanced = { type = "lvm", disk = { path = "/dev/sda", size = 1000 }, total_size = 1000, swap_size = 0, max_root_size = 0, max_data_size = 0, min_lvm_free = 125 }

        [network]
        address = "10.0.0.2/40"
        "#,
    );
    assert!(matches!(result, Err(Error::Toml(_))));
}

// --- config ---

#[test]
fn config_defaults_match_stock_build() {
    let config = RulesConfig::default();
    assert_eq!(config.build_mode, "release");
    assert_eq!(config.staging_dir, PathBuf::from("debian/tmp"));
    assert_eq!(
        config.trim_script,
        PathBuf::from("debian/scripts/elf-strip-unused-dependencies.sh")
    );
    assert_eq!(
        config.trim_dirs,
        [
            PathBuf::from("debian/proxmox-installer/usr/bin"),
            PathBuf::from("debian/proxmox-auto-install-assistant/usr/bin"),
        ]
    );
    assert!(!config.native_deb);
}

#[test]
fn config_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    assert_eq!(
        RulesConfig::load(&dir.path().join("absent.toml"))?,
        RulesConfig::default()
    );

    let path = write_file(
        dir.path(),
        "installer-pkg.toml",
        r#"
        native-deb = true

        [[package]]
        name = "proxmox-installer"
        version = "8.0.1"
        maintainer = "Proxmox Support Team <support@proxmox.com>"
        description = "Proxmox installer"
        depends = ["libc6"]
        "#,
    );
    let config = RulesConfig::load(&path)?;
    assert!(config.native_deb);
    assert_eq!(config.build_mode, "release");
    let package = config.package("proxmox-installer").unwrap();
    assert_eq!(package.architecture, "amd64");
    assert_eq!(package.deb_file_name(), "proxmox-installer_8.0.1_amd64.deb");
    Ok(())
}

#[test]
fn config_rejects_bad_maintainer() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_file(
        dir.path(),
        "installer-pkg.toml",
        r#"
        [[package]]
        name = "proxmox-installer"
        version = "8.0.1"
        maintainer = "Proxmox Support Team <support@-proxmox.com>"
        description = "Proxmox installer"
        "#,
    );
    assert!(matches!(
        RulesConfig::load(&path),
        Err(Error::InvalidConfig { .. })
    ));
    Ok(())
}

// --- rules ---

#[test]
fn step_names() {
    assert_eq!("strip".parse::<Step>().unwrap(), Step::Strip);
    assert_eq!("dh_missing".parse::<Step>().unwrap(), Step::Missing);
    assert_eq!(Step::AutoBuild.helper(), "dh_auto_build");
    assert!("dh_frobnicate".parse::<Step>().is_err());
    assert_eq!("binary".parse::<Target>().unwrap(), Target::Binary);
}

#[test]
fn default_recipe_runs_helpers_in_order() -> Result<()> {
    let runner = RecordingRunner::default();
    let ctx = BuildContext::new("/src", &runner);
    let report = Recipe::new().with_env("BUILD_MODE", "release").run(Target::Build, &ctx)?;

    assert_eq!(
        runner.programs(),
        ["dh_auto_configure", "dh_auto_build", "dh_auto_test"]
    );
    assert!(report.steps.iter().all(|s| !s.overridden));
    for cmd in runner.commands.borrow().iter() {
        assert_eq!(cmd.get_env("BUILD_MODE"), Some("release"));
        assert_eq!(cmd.current_dir(), Some(Path::new("/src")));
    }
    Ok(())
}

#[test]
fn recipe_stops_at_first_failure() {
    let runner = RecordingRunner::failing(&["dh_auto_build"]);
    let ctx = BuildContext::new("/src", &runner);
    let result = Recipe::new().run(Target::Binary, &ctx);

    assert!(matches!(
        result,
        Err(Error::StepFailed {
            step: Step::AutoBuild,
            ..
        })
    ));
    assert_eq!(runner.programs(), ["dh_auto_configure", "dh_auto_build"]);
}

struct CountingHook(Rc<Cell<u32>>);

impl StepHook for CountingHook {
    fn run(&self, _step: Step, _ctx: &BuildContext<'_>) -> Result<()> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

#[test]
fn override_replaces_default_helper() -> Result<()> {
    let calls = Rc::new(Cell::new(0));
    let runner = RecordingRunner::default();
    let ctx = BuildContext::new("/src", &runner);
    let recipe = Recipe::new().override_step(Step::AutoTest, CountingHook(calls.clone()));

    let report = recipe.run(Target::Build, &ctx)?;
    assert_eq!(calls.get(), 1);
    assert_eq!(runner.programs(), ["dh_auto_configure", "dh_auto_build"]);
    assert_eq!(
        report.steps.last(),
        Some(&StepRecord {
            step: Step::AutoTest,
            overridden: true
        })
    );
    Ok(())
}

#[test]
fn installer_recipe_overrides() {
    let recipe = Recipe::installer(&RulesConfig::default());
    assert!(recipe.is_overridden(Step::Missing));
    assert!(recipe.is_overridden(Step::Strip));
    assert!(!recipe.is_overridden(Step::Builddeb));

    let config = RulesConfig {
        native_deb: true,
        ..Default::default()
    };
    assert!(Recipe::installer(&config).is_overridden(Step::Builddeb));
}

#[test]
fn installer_recipe_exports_release_build_mode() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let runner = RecordingRunner::default();
    let ctx = BuildContext::new(dir.path(), &runner);
    Recipe::installer(&RulesConfig::default()).run(Target::Binary, &ctx)?;

    let commands = runner.commands.borrow();
    assert!(commands.iter().any(|c| c.program() == "dh_strip"));
    assert_eq!(commands.last().map(Cmd::program), Some("dh_builddeb"));
    for cmd in commands.iter() {
        assert_eq!(cmd.get_env("BUILD_MODE"), Some("release"), "{cmd}");
    }
    Ok(())
}

// --- missing ---

#[test]
fn missing_check_fails_for_unbuilt_manifest_entry() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_file(root, "debian/tmp/usr/bin/proxmox-tui-installer", "");
    write_file(
        root,
        "debian/proxmox-installer.install",
        "usr/bin/proxmox-tui-installer\nusr/bin/proxmox-fetch-answer\n",
    );

    let runner = RecordingRunner::default();
    let ctx = BuildContext::new(root, &runner);
    let result = Recipe::installer(&RulesConfig::default()).run_step(Step::Missing, &ctx);

    match result {
        Err(Error::MissingFiles(report)) => {
            assert_eq!(report.not_built, ["usr/bin/proxmox-fetch-answer"]);
            assert!(report.not_installed.is_empty());
        }
        other => panic!("expected missing files, got {other:?}"),
    }
    // the check is native, no helper runs
    assert!(runner.programs().is_empty());
    Ok(())
}

#[test]
fn missing_check_passes_when_manifests_match() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_file(root, "debian/tmp/usr/bin/proxmox-tui-installer", "");
    write_file(root, "debian/tmp/usr/share/proxmox-installer/country.json", "{}");
    write_file(root, "debian/tmp/usr/bin/proxmox-auto-install-assistant", "");
    write_file(
        root,
        "debian/proxmox-installer.install",
        "# installer\nusr/bin/proxmox-tui-installer\nusr/share/proxmox-installer\n",
    );
    write_file(
        root,
        "debian/proxmox-auto-install-assistant.install",
        "debian/tmp/usr/bin/proxmox-auto-install-assistant usr/bin\n",
    );

    let runner = RecordingRunner::default();
    let ctx = BuildContext::new(root, &runner);
    let record = Recipe::installer(&RulesConfig::default()).run_step(Step::Missing, &ctx)?;
    assert!(record.overridden);
    Ok(())
}

#[test]
fn missing_check_reports_files_not_installed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let staging = dir.path().join("debian/tmp");
    write_file(&staging, "usr/bin/a", "");
    write_file(&staging, "usr/bin/sub/b", "");
    write_file(&staging, "usr/share/doc/README", "");

    let report = missing::check(&staging, &["usr/bin/*"], &[])?;
    assert!(report.not_built.is_empty());
    assert_eq!(
        report.not_installed,
        [PathBuf::from("usr/share/doc/README")]
    );

    let report = missing::check(&staging, &["usr/bin/*"], &["usr/share/doc"])?;
    assert_eq!(report, MissingReport::default());
    assert!(report.is_clean());
    Ok(())
}

#[test]
fn not_installed_file_excludes_staged_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_file(root, "debian/tmp/usr/bin/proxmox-tui-installer", "");
    write_file(root, "debian/tmp/usr/share/doc/installer/README", "");
    write_file(
        root,
        "debian/proxmox-installer.install",
        "usr/bin/proxmox-tui-installer\n",
    );

    let runner = RecordingRunner::default();
    let ctx = BuildContext::new(root, &runner);
    let recipe = Recipe::installer(&RulesConfig::default());
    assert!(matches!(
        recipe.run_step(Step::Missing, &ctx),
        Err(Error::MissingFiles(_))
    ));

    write_file(root, "debian/not-installed", "# docs\nusr/share/doc/installer\n");
    let record = recipe.run_step(Step::Missing, &ctx)?;
    assert!(record.overridden);
    Ok(())
}

#[test]
fn glob_does_not_cross_directories() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let staging = dir.path();
    write_file(staging, "usr/lib/x/y.so", "");

    let report = missing::check(staging, &["usr/*.so", "usr/lib/?/y.so"], &[])?;
    assert_eq!(report.not_built, ["usr/*.so"]);
    assert!(report.not_installed.is_empty());
    Ok(())
}

#[test]
fn manifest_parsing_ignores_comments_and_destinations() {
    assert_eq!(
        missing::parse_manifest("# comment\n\n  usr/bin/foo  usr/sbin\nusr/share/bar\n"),
        ["usr/bin/foo", "usr/share/bar"]
    );
}

// --- strip ---

#[cfg(unix)]
#[test]
fn trim_failure_does_not_stop_other_executables() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_exec(root, "debian/proxmox-installer/usr/bin/proxmox-tui-installer");
    write_exec(root, "debian/proxmox-installer/usr/bin/proxmox-fetch-answer");
    write_exec(root, "debian/proxmox-auto-install-assistant/usr/bin/proxmox-auto-install-assistant");
    write_file(root, "debian/proxmox-installer/usr/bin/README", "not executable");

    let runner = RecordingRunner::failing(&["proxmox-fetch-answer"]);
    let ctx = BuildContext::new(root, &runner);
    let record = Recipe::installer(&RulesConfig::default()).run_step(Step::Strip, &ctx)?;
    assert!(record.overridden);

    let programs = runner.programs();
    assert_eq!(programs[0], "dh_strip");
    assert_eq!(programs.len(), 4);
    assert!(programs[1..]
        .iter()
        .all(|p| p.ends_with("debian/scripts/elf-strip-unused-dependencies.sh")));
    assert_eq!(
        runner.last_args(),
        [
            "debian/proxmox-installer/usr/bin/proxmox-fetch-answer",
            "debian/proxmox-installer/usr/bin/proxmox-tui-installer",
            "debian/proxmox-auto-install-assistant/usr/bin/proxmox-auto-install-assistant",
        ]
    );
    Ok(())
}

#[cfg(unix)]
#[test]
fn trim_report_records_failures() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_exec(root, "out/a");
    write_exec(root, "out/b");
    write_exec(root, "out/c");

    let runner = RecordingRunner {
        fail: vec!["out/a".to_string()],
        unspawnable: vec!["out/b".to_string()],
        ..Default::default()
    };
    let ctx = BuildContext::new(root, &runner);
    let report = strip::trim_unused_dependencies(
        &ctx,
        Path::new("trim.sh"),
        &[PathBuf::from("out"), PathBuf::from("absent")],
    )?;
    assert_eq!(report.failed, [PathBuf::from("out/a"), PathBuf::from("out/b")]);
    assert_eq!(report.trimmed, [PathBuf::from("out/c")]);
    Ok(())
}

#[cfg(unix)]
#[test]
fn executables_in_subdirectories_are_not_trimmed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_exec(root, "out/a");
    write_exec(root, "out/libexec/b");

    let found = strip::find_executables(&[root.join("out")])?;
    assert_eq!(found, [root.join("out/a")]);
    Ok(())
}

#[test]
fn strip_failure_is_fatal() {
    let runner = RecordingRunner::failing(&["dh_strip"]);
    let ctx = BuildContext::new("/nonexistent", &runner);
    let result = StripAndTrim::new("trim.sh", vec![PathBuf::from("out")]).run(Step::Strip, &ctx);
    assert!(matches!(
        result,
        Err(Error::StepFailed {
            step: Step::Strip,
            ..
        })
    ));
    assert_eq!(runner.programs(), ["dh_strip"]);
}

#[test]
fn strip_skips_missing_directories() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let runner = RecordingRunner::default();
    let ctx = BuildContext::new(dir.path(), &runner);
    Recipe::installer(&RulesConfig::default()).run_step(Step::Strip, &ctx)?;
    assert_eq!(runner.programs(), ["dh_strip"]);
    Ok(())
}

#[test]
fn failing_missing_check_aborts_full_build() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "debian/tmp/usr/bin/stray", "");

    let runner = RecordingRunner::default();
    let ctx = BuildContext::new(dir.path(), &runner);
    let result = Recipe::installer(&RulesConfig::default()).run(Target::Binary, &ctx);
    assert!(matches!(result, Err(Error::MissingFiles(_))));
    // nothing after dh_install ran
    assert_eq!(runner.programs().last().map(String::as_str), Some("dh_install"));
    assert!(!runner.programs().iter().any(|p| p == "dh_strip"));
    Ok(())
}

// --- binary ---

#[test]
fn build_and_read_package() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("pkg");
    write_file(&root, "usr/bin/hello", "#!/bin/sh\necho hello\n");
    write_file(&root, "usr/share/doc/hello/copyright", "GPL-3+");
    write_file(&root, "DEBIAN/postinst", "#!/bin/sh\n");

    let package = DebPackage::new("hello")
        .set_version("1.0-1")
        .set_architecture(DebArchitecture::Amd64)
        .set_maintainer("Jane Doe <jane@example.com>")
        .set_description("greets\nPrints a greeting.\n\nThat's all.")
        .with_depend("libc6")
        .set_mtime(0)
        .with_dir(&root, Path::new("/"))?;
    assert_eq!(package.files().len(), 2);
    assert_eq!(package.file_name(), "hello_1.0-1_amd64.deb");

    let mut out = Vec::new();
    package.build()?.write(&mut out)?;
    assert!(out.starts_with(b"!<arch>\n"));

    let archive = DebArchive::read(out.as_slice())?;
    assert_eq!(archive.compression(), DebCompression::Xz);

    let control = archive.control()?;
    assert!(control.contains("Package: hello\n"));
    assert!(control.contains("Version: 1.0-1\n"));
    assert!(control.contains("Architecture: amd64\n"));
    assert!(control.contains("Depends: libc6\n"));
    assert!(control.contains("Installed-Size: 2\n"));
    assert!(control.ends_with("Description: greets\n Prints a greeting.\n .\n That's all.\n"));

    assert_eq!(
        archive.data_paths()?,
        [
            PathBuf::from("/usr/bin/hello"),
            PathBuf::from("/usr/share/doc/hello/copyright"),
        ]
    );

    let digest = format!("{:x}", md5::compute(b"#!/bin/sh\necho hello\n"));
    assert!(archive
        .md5sums()?
        .contains(&format!("{digest}  usr/bin/hello\n")));
    Ok(())
}

#[test]
fn zstd_packages_round_trip() -> Result<()> {
    let package = DebPackage::new("zst")
        .set_version("2")
        .set_compression(DebCompression::Zstd)
        .set_mtime(0)
        .with_file(DebFile::from_buf(b"data".to_vec(), "/usr/bin/zst").is_exec());

    let mut out = Vec::new();
    package.build()?.write(&mut out)?;
    let archive = DebArchive::read(out.as_slice())?;
    assert_eq!(archive.compression(), DebCompression::Zstd);
    assert_eq!(archive.data_paths()?, [PathBuf::from("/usr/bin/zst")]);
    assert!(archive.control()?.contains("Architecture: all\n"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn symlinks_are_packaged_as_links() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("pkg");
    write_file(&root, "usr/lib/foo/real", "real");
    fs::create_dir_all(root.join("usr/bin"))?;
    std::os::unix::fs::symlink("../lib/foo/real", root.join("usr/bin/foo"))?;

    let package = DebPackage::new("foo")
        .set_version("1")
        .set_mtime(0)
        .with_dir(&root, "/")?;
    let paths: Vec<&Path> = package.files().iter().map(DebFile::path).collect();
    assert_eq!(paths, [Path::new("/usr/bin/foo"), Path::new("/usr/lib/foo/real")]);
    assert_eq!(
        package.files()[0].link_target(),
        Some(Path::new("../lib/foo/real"))
    );

    let mut out = Vec::new();
    package.build()?.write(&mut out)?;
    let archive = DebArchive::read(out.as_slice())?;
    assert_eq!(archive.data_paths()?, [PathBuf::from("/usr/lib/foo/real")]);
    assert_eq!(
        archive.data_symlinks()?,
        [(PathBuf::from("/usr/bin/foo"), PathBuf::from("../lib/foo/real"))]
    );
    let md5sums = archive.md5sums()?;
    assert_eq!(md5sums.lines().count(), 1);
    assert!(md5sums.ends_with("  usr/lib/foo/real\n"));
    Ok(())
}

#[test]
fn package_without_version_is_rejected() {
    assert!(matches!(
        DebPackage::new("nover").build(),
        Err(Error::InvalidPackage { .. })
    ));
    assert!(DebArchive::read(&b"!<arch>\n"[..]).is_err());
}

#[test]
fn architecture_and_priority_names() {
    assert_eq!("arm64".parse::<DebArchitecture>().unwrap(), DebArchitecture::Arm64);
    assert_eq!(DebArchitecture::Amd64.to_string(), "amd64");
    assert!("vax".parse::<DebArchitecture>().is_err());
    assert_eq!("extra".parse::<DebPriority>().unwrap(), DebPriority::Optional);
}

#[test]
fn native_builddeb_writes_configured_packages() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_file(root, "debian/proxmox-installer/usr/bin/proxmox-tui-installer", "bin");

    let config = RulesConfig {
        native_deb: true,
        output_dir: PathBuf::from("out"),
        packages: vec![PackageConfig {
            name: "proxmox-installer".to_string(),
            version: "8.0.1".to_string(),
            architecture: "amd64".to_string(),
            priority: "optional".to_string(),
            maintainer: "Proxmox Support Team <support@proxmox.com>".to_string(),
            description: "Proxmox installer".to_string(),
            depends: vec![],
        }],
        ..Default::default()
    };

    let runner = RecordingRunner::default();
    let ctx = BuildContext::new(root, &runner);
    Recipe::installer(&config).run_step(Step::Builddeb, &ctx)?;
    assert!(runner.programs().is_empty());

    let deb = root.join("out/proxmox-installer_8.0.1_amd64.deb");
    let archive = DebArchive::read(fs::File::open(deb)?)?;
    assert_eq!(
        archive.data_paths()?,
        [PathBuf::from("/usr/bin/proxmox-tui-installer")]
    );
    Ok(())
}
