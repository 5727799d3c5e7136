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

//! Options collected by the installer, and the summary shown before installing.

use std::fmt;
use std::iter;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::cidr::CidrAddress;
use crate::email::is_valid_email;
use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    #[default]
    Ext4,
    Xfs,
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            FsType::Ext4 => "ext4",
            FsType::Xfs => "XFS",
        };
        write!(f, "{s}")
    }
}

pub const FS_TYPES: &[FsType] = &[FsType::Ext4, FsType::Xfs];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub path: String,
    pub size: u64,
}

impl fmt::Display for Disk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} B)", self.path, self.size)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvmBootdiskOptions {
    pub disk: Disk,
    pub total_size: u64,
    pub swap_size: u64,
    pub max_root_size: u64,
    pub max_data_size: u64,
    pub min_lvm_free: u64,
}

impl LvmBootdiskOptions {
    pub fn defaults_from(disk: &Disk) -> Self {
        let min_lvm_free = if disk.size > 128 * 1024 * 1024 {
            16 * 1024 * 1024
        } else {
            disk.size / 8
        };

        Self {
            disk: disk.clone(),
            total_size: disk.size,
            // TODO: derive from the installed memory once it is detected
            swap_size: 4 * 1024 * 1024,
            max_root_size: 0,
            max_data_size: 0,
            min_lvm_free,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdvancedBootdiskOptions {
    Lvm(LvmBootdiskOptions),
}

impl AdvancedBootdiskOptions {
    pub fn selected_disks(&self) -> impl Iterator<Item = &Disk> {
        match self {
            AdvancedBootdiskOptions::Lvm(LvmBootdiskOptions { disk, .. }) => iter::once(disk),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootdiskOptions {
    pub disks: Vec<Disk>,
    #[serde(default)]
    pub fstype: FsType,
    pub advanced: AdvancedBootdiskOptions,
}

impl BootdiskOptions {
    /// LVM on the first disk with default sizes.
    pub fn defaults_from(disks: Vec<Disk>) -> Option<Self> {
        let advanced = AdvancedBootdiskOptions::Lvm(LvmBootdiskOptions::defaults_from(
            disks.first()?,
        ));
        Some(Self {
            disks,
            fstype: FsType::default(),
            advanced,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimezoneOptions {
    pub timezone: String,
    pub kb_layout: String,
}

impl Default for TimezoneOptions {
    fn default() -> Self {
        Self {
            timezone: "Europe/Vienna".to_owned(),
            kb_layout: "en_US".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordOptions {
    pub email: String,
    pub root_password: String,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self {
            email: "mail@example.invalid".to_owned(),
            root_password: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOptions {
    pub ifname: String,
    pub fqdn: String,
    pub address: CidrAddress,
    pub gateway: IpAddr,
    pub dns_server: IpAddr,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            ifname: String::new(),
            fqdn: "pve.example.invalid".to_owned(),
            address: CidrAddress::unspecified(),
            gateway: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dns_server: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

/// One line of the installation summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryOption {
    pub name: &'static str,
    pub value: String,
}

impl SummaryOption {
    pub fn new<S: Into<String>>(name: &'static str, value: S) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

impl fmt::Display for SummaryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerOptions {
    pub bootdisk: BootdiskOptions,
    #[serde(default)]
    pub timezone: TimezoneOptions,
    #[serde(default)]
    pub password: PasswordOptions,
    #[serde(default)]
    pub network: NetworkOptions,
}

impl InstallerOptions {
    /// Parses options from a TOML document.
    pub fn from_toml(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn to_summary(&self) -> Vec<SummaryOption> {
        vec![
            SummaryOption::new("Bootdisk filesystem", self.bootdisk.fstype.to_string()),
            SummaryOption::new(
                "Bootdisks",
                self.bootdisk
                    .advanced
                    .selected_disks()
                    .map(|d| d.path.as_str())
                    .collect::<Vec<&str>>()
                    .join(", "),
            ),
            SummaryOption::new("Timezone", &self.timezone.timezone),
            SummaryOption::new("Keyboard layout", &self.timezone.kb_layout),
            SummaryOption::new("Administrator email", &self.password.email),
            SummaryOption::new("Management interface", &self.network.ifname),
            SummaryOption::new("Hostname", &self.network.fqdn),
            SummaryOption::new("Host IP (CIDR)", self.network.address.to_string()),
            SummaryOption::new("Gateway", self.network.gateway.to_string()),
            SummaryOption::new("DNS", self.network.dns_server.to_string()),
        ]
    }

    /// Checks the options a user has to fill in before the installation can start.
    pub fn validate(&self) -> Result<()> {
        if self.bootdisk.disks.is_empty() {
            return Err(Error::config("bootdisk.disks", "at least one disk is required"));
        }
        if !is_valid_email(&self.password.email) {
            return Err(Error::InvalidEmail(self.password.email.clone()));
        }
        if self.password.root_password.is_empty() {
            return Err(Error::config("password.root_password", "must not be empty"));
        }
        Ok(())
    }
}
