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

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use crate::error::{Error, Result};

// Architectures of the official Debian release ports, according to
// https://wiki.debian.org/SupportedArchitectures
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DebArchitecture {
    All,
    Amd64,
    Arm64,
    Armel,
    Armhf,
    I386,
    Mips64el,
    Ppc64el,
    Riscv64,
    S390x,
}

impl DebArchitecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebArchitecture::All => "all",
            DebArchitecture::Amd64 => "amd64",
            DebArchitecture::Arm64 => "arm64",
            DebArchitecture::Armel => "armel",
            DebArchitecture::Armhf => "armhf",
            DebArchitecture::I386 => "i386",
            DebArchitecture::Mips64el => "mips64el",
            DebArchitecture::Ppc64el => "ppc64el",
            DebArchitecture::Riscv64 => "riscv64",
            DebArchitecture::S390x => "s390x",
        }
    }
}

impl FromStr for DebArchitecture {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        Ok(match input {
            "all" => DebArchitecture::All,
            "amd64" => DebArchitecture::Amd64,
            "arm64" => DebArchitecture::Arm64,
            "armel" => DebArchitecture::Armel,
            "armhf" => DebArchitecture::Armhf,
            "i386" => DebArchitecture::I386,
            "mips64el" => DebArchitecture::Mips64el,
            "ppc64el" => DebArchitecture::Ppc64el,
            "riscv64" => DebArchitecture::Riscv64,
            "s390x" => DebArchitecture::S390x,
            other => return Err(Error::package(format!("unknown architecture '{other}'"))),
        })
    }
}

impl fmt::Display for DebArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Used for Deb's Priority field
// https://www.debian.org/doc/debian-policy/ch-archive.html#priorities
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DebPriority {
    Required,
    Important,
    Standard,
    Optional,
}

impl DebPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebPriority::Required => "required",
            DebPriority::Important => "important",
            DebPriority::Standard => "standard",
            DebPriority::Optional => "optional",
        }
    }
}

impl FromStr for DebPriority {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        Ok(match input {
            "required" => DebPriority::Required,
            "important" => DebPriority::Important,
            "standard" => DebPriority::Standard,
            // "extra" is deprecated and treated as "optional" since policy 4.0.1
            "optional" | "extra" => DebPriority::Optional,
            other => return Err(Error::package(format!("unknown priority '{other}'"))),
        })
    }
}

// Compression of the control and data members
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DebCompression {
    #[default]
    Xz,
    Zstd,
}

impl DebCompression {
    pub fn extension(&self) -> &'static str {
        match self {
            DebCompression::Xz => "xz",
            DebCompression::Zstd => "zst",
        }
    }
}

pub(crate) const MODE_REGULAR: u32 = 0o100644;
pub(crate) const MODE_EXECUTABLE: u32 = 0o100755;
pub(crate) const MODE_SYMLINK: u32 = 0o120777;

// A file in a package's data archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebFile {
    contents: Vec<u8>,
    mode: u32,
    // Absolute install path, e.g. /usr/bin/proxmox-tui-installer
    path: PathBuf,
    // Set for symbolic links, which have no contents
    link_target: Option<PathBuf>,
}

impl DebFile {
    // Reads `from` from disk, keeping its permission bits
    #[cfg(unix)]
    pub fn from_path<F, T>(from: F, to: T) -> Result<Self>
    where
        F: AsRef<Path>,
        T: AsRef<Path>,
    {
        let metadata = fs::metadata(&from)?;
        Ok(Self {
            contents: fs::read(&from)?,
            mode: metadata.mode(),
            path: to.as_ref().to_path_buf(),
            link_target: None,
        })
    }

    #[cfg(windows)]
    pub fn from_path<F, T>(from: F, to: T) -> Result<Self>
    where
        F: AsRef<Path>,
        T: AsRef<Path>,
    {
        Ok(Self {
            contents: fs::read(&from)?,
            mode: MODE_REGULAR,
            path: to.as_ref().to_path_buf(),
            link_target: None,
        })
    }

    pub fn from_buf<T: AsRef<Path>>(buf: Vec<u8>, to: T) -> Self {
        Self {
            contents: buf,
            mode: MODE_REGULAR,
            path: to.as_ref().to_path_buf(),
            link_target: None,
        }
    }

    /// A symbolic link installed at `to`, pointing at `target` as written.
    pub fn symlink<L, T>(target: L, to: T) -> Self
    where
        L: AsRef<Path>,
        T: AsRef<Path>,
    {
        Self {
            contents: Vec::new(),
            mode: MODE_SYMLINK,
            path: to.as_ref().to_path_buf(),
            link_target: Some(target.as_ref().to_path_buf()),
        }
    }

    pub fn is_exec(mut self) -> Self {
        self.mode = MODE_EXECUTABLE;
        self
    }

    pub fn set_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn link_target(&self) -> Option<&Path> {
        self.link_target.as_deref()
    }

    // The path as stored in the data tar, "./usr/bin/foo"
    pub(crate) fn archive_path(&self) -> PathBuf {
        let relative = self.path.strip_prefix("/").unwrap_or(&self.path);
        Path::new(".").join(relative)
    }
}

/// Whether `path` is a regular file with any execute bit set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(metadata) => metadata.is_file() && metadata.mode() & 0o111 != 0,
        Err(_) => false,
    }
}

// No execute bits on Windows, every regular file counts
#[cfg(windows)]
pub fn is_executable(path: &Path) -> bool {
    fs::symlink_metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
