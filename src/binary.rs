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

//! Build and read binary Deb packages.
//!
//! This is what the native `builddeb` step uses in place of `dh_builddeb`:
//! the staged tree of a package (`debian/<name>/`) becomes the data archive,
//! the control archive gets a generated `control` and `md5sums`.
//!
//! # Example
//!
//! ```
//! use std::fs::File;
//! use installer_pkg::*;
//! use installer_pkg::binary::*;
//!
//! fn main() -> installer_pkg::Result<()> {
//!     let package = DebPackage::new("proxmox-installer")
//!         .set_version("8.0.1")
//!         .set_architecture(DebArchitecture::Amd64)
//!         .set_maintainer("Proxmox Support Team <support@proxmox.com>")
//!         .set_description("Proxmox installer")
//!         .with_dir("debian/proxmox-installer", "/")?;
//!
//!     package.build()?.write(File::create("proxmox-installer_8.0.1_amd64.deb")?)?;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use xz::read::XzDecoder;
use xz::write::XzEncoder;

use crate::error::{Error, Result};
use crate::shared::*;

// Metadata written to the package's control file
// https://www.debian.org/doc/debian-policy/ch-controlfields.html#binary-package-control-files-debian-control
#[derive(Debug, Clone)]
struct DebControl {
    name: String,
    version: String,
    priority: DebPriority,
    architecture: DebArchitecture,
    depends: Vec<String>,
    maintainer: String,
    description: String,
}

impl DebControl {
    fn serialize(&self, installed_size_kib: u64) -> Vec<u8> {
        let mut out = String::new();
        let depends = self.depends.join(", ");
        let installed_size = installed_size_kib.to_string();
        let fields = [
            ("Package", self.name.as_str()),
            ("Version", self.version.as_str()),
            ("Architecture", self.architecture.as_str()),
            ("Maintainer", self.maintainer.as_str()),
            ("Installed-Size", installed_size.as_str()),
            ("Depends", depends.as_str()),
            ("Priority", self.priority.as_str()),
        ];
        for (key, value) in fields {
            if !value.is_empty() {
                out.push_str(&format!("{key}: {value}\n"));
            }
        }

        // The first description line is the synopsis, the rest is the
        // extended description where blank lines are written as " ."
        let mut lines = self.description.lines();
        out.push_str(&format!("Description: {}\n", lines.next().unwrap_or_default()));
        for line in lines {
            if line.trim().is_empty() {
                out.push_str(" .\n");
            } else {
                out.push_str(&format!(" {line}\n"));
            }
        }
        out.into_bytes()
    }
}

/// A binary package being assembled.
#[derive(Debug, Clone)]
pub struct DebPackage {
    control: DebControl,
    data: Vec<DebFile>,
    compression: DebCompression,
    mtime: Option<u64>,
}

impl DebPackage {
    /// Creates an empty package called `name`.
    pub fn new(name: &str) -> Self {
        Self {
            control: DebControl {
                name: name.to_string(),
                version: String::new(),
                priority: DebPriority::Optional,
                architecture: DebArchitecture::All,
                depends: Vec::new(),
                maintainer: String::new(),
                description: String::new(),
            },
            data: Vec::new(),
            compression: DebCompression::default(),
            mtime: None,
        }
    }

    pub fn set_version(mut self, version: &str) -> Self {
        self.control.version = version.to_string();
        self
    }

    pub fn set_priority(mut self, priority: DebPriority) -> Self {
        self.control.priority = priority;
        self
    }

    pub fn set_architecture(mut self, architecture: DebArchitecture) -> Self {
        self.control.architecture = architecture;
        self
    }

    pub fn with_depend(mut self, depend: &str) -> Self {
        self.control.depends.push(depend.to_string());
        self
    }

    pub fn with_depends<S: AsRef<str>>(mut self, depends: &[S]) -> Self {
        for depend in depends {
            self.control.depends.push(depend.as_ref().to_string());
        }
        self
    }

    pub fn set_maintainer(mut self, maintainer: &str) -> Self {
        self.control.maintainer = maintainer.to_string();
        self
    }

    pub fn set_description(mut self, description: &str) -> Self {
        self.control.description = description.to_string();
        self
    }

    pub fn set_compression(mut self, compression: DebCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Timestamp for every archive member. Defaults to `SOURCE_DATE_EPOCH`,
    /// or the current time if that isn't set.
    pub fn set_mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Adds a file to the package.
    pub fn with_file(mut self, file: DebFile) -> Self {
        self.data.push(file);
        self
    }

    /// Recursively adds the files below `from` to the package under `to`.
    ///
    /// A `DEBIAN` directory at the top of `from` holds maintainer metadata
    /// and is skipped. Symlinks are added as links, not followed. Files are
    /// added in sorted order so builds are reproducible.
    pub fn with_dir<F, T>(mut self, from: F, to: T) -> Result<Self>
    where
        F: AsRef<Path>,
        T: AsRef<Path>,
    {
        let from = from.as_ref();
        let to = to.as_ref();
        let walker = walkdir::WalkDir::new(from)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == "DEBIAN"));
        for entry in walker {
            let entry = entry?;
            let file_type = entry.file_type();
            if !file_type.is_file() && !file_type.is_symlink() {
                continue;
            }
            let relative = entry.path().strip_prefix(from).map_err(|_| {
                Error::package(format!(
                    "{} escapes {}",
                    entry.path().display(),
                    from.display()
                ))
            })?;
            let file = if file_type.is_symlink() {
                DebFile::symlink(fs::read_link(entry.path())?, to.join(relative))
            } else {
                DebFile::from_path(entry.path(), to.join(relative))?
            };
            self = self.with_file(file);
        }
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.control.name
    }

    pub fn version(&self) -> &str {
        &self.control.version
    }

    pub fn architecture(&self) -> DebArchitecture {
        self.control.architecture
    }

    pub fn files(&self) -> &[DebFile] {
        &self.data
    }

    /// `<name>_<version>_<arch>.deb`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.deb",
            self.control.name, self.control.version, self.control.architecture
        )
    }

    // One "<md5>  <path>" line per data file, paths relative to /. Symlinks
    // have no entry.
    fn md5sums(&self) -> Vec<u8> {
        let mut out = String::new();
        for file in self.data.iter().filter(|f| f.link_target().is_none()) {
            let digest = md5::compute(file.contents());
            let path = file.path().strip_prefix("/").unwrap_or(file.path());
            out.push_str(&format!("{:x}  {}\n", digest, path.display()));
        }
        out.into_bytes()
    }

    fn mtime(&self) -> u64 {
        if let Some(mtime) = self.mtime {
            return mtime;
        }
        std::env::var("SOURCE_DATE_EPOCH")
            .ok()
            .and_then(|epoch| epoch.trim().parse().ok())
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64)
    }

    fn check(&self) -> Result<()> {
        if self.control.name.is_empty() {
            return Err(Error::package("package name is empty"));
        }
        if self.control.version.is_empty() {
            return Err(Error::package(format!("{} has no version", self.control.name)));
        }
        for file in &self.data {
            if file.path().components().any(|c| c == Component::ParentDir) {
                return Err(Error::package(format!(
                    "{} contains '..'",
                    file.path().display()
                )));
            }
        }
        Ok(())
    }

    /// Builds the package into a DebArchive.
    pub fn build(&self) -> Result<DebArchive> {
        self.check()?;
        let mtime = self.mtime();

        let installed_size: u64 = self
            .data
            .iter()
            .map(|f| (f.contents().len() as u64).div_ceil(1024))
            .sum();

        let mut control_tar = tar::Builder::new(Vec::new());
        append_file(
            &mut control_tar,
            Path::new("./control"),
            &self.control.serialize(installed_size),
            MODE_REGULAR,
            mtime,
        )?;
        append_file(
            &mut control_tar,
            Path::new("./md5sums"),
            &self.md5sums(),
            MODE_REGULAR,
            mtime,
        )?;

        // dpkg expects every parent directory to have its own entry
        let mut data_tar = tar::Builder::new(Vec::new());
        let mut dirs = BTreeSet::new();
        for file in &self.data {
            let mut parent = file.archive_path();
            while parent.pop() && parent != Path::new(".") {
                dirs.insert(parent.clone());
            }
        }
        append_dir(&mut data_tar, Path::new("."), mtime)?;
        for dir in &dirs {
            append_dir(&mut data_tar, dir, mtime)?;
        }
        for file in &self.data {
            match file.link_target() {
                Some(target) => append_symlink(&mut data_tar, &file.archive_path(), target, mtime)?,
                None => append_file(
                    &mut data_tar,
                    &file.archive_path(),
                    file.contents(),
                    file.mode(),
                    mtime,
                )?,
            }
        }

        debug!(
            package = %self.control.name,
            files = self.data.len(),
            installed_size,
            "built package archives"
        );

        Ok(DebArchive {
            control: compress(self.compression, &control_tar.into_inner()?)?,
            data: compress(self.compression, &data_tar.into_inner()?)?,
            compression: self.compression,
            control_compression: self.compression,
            mtime,
        })
    }
}

fn append_file(
    builder: &mut tar::Builder<Vec<u8>>,
    path: &Path,
    contents: &[u8],
    mode: u32,
    mtime: u64,
) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(contents.len() as u64);
    header.set_mode(mode & 0o7777);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    builder.append_data(&mut header, path, contents)
}

fn append_dir(builder: &mut tar::Builder<Vec<u8>>, path: &Path, mtime: u64) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    builder.append_data(&mut header, path, io::empty())
}

fn append_symlink(
    builder: &mut tar::Builder<Vec<u8>>,
    path: &Path,
    target: &Path,
    mtime: u64,
) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(MODE_SYMLINK & 0o7777);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    header.set_link_name(target)?;
    builder.append_data(&mut header, path, io::empty())
}

fn compress(compression: DebCompression, input: &[u8]) -> io::Result<Vec<u8>> {
    match compression {
        DebCompression::Xz => {
            let mut encoder = XzEncoder::new(Vec::new(), 9);
            encoder.write_all(input)?;
            encoder.finish()
        }
        DebCompression::Zstd => zstd::stream::encode_all(input, 0),
    }
}

fn decompress(compression: DebCompression, input: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match compression {
        DebCompression::Xz => {
            XzDecoder::new(input).read_to_end(&mut out)?;
        }
        DebCompression::Zstd => {
            out = zstd::stream::decode_all(input)?;
        }
    }
    Ok(out)
}

/// A built package: the compressed control and data members of a `.deb`.
#[derive(Debug, Clone)]
pub struct DebArchive {
    control: Vec<u8>,
    data: Vec<u8>,
    compression: DebCompression,
    // Only differs from `compression` in archives built elsewhere
    control_compression: DebCompression,
    mtime: u64,
}

impl DebArchive {
    /// Writes the `ar` container to `output`.
    pub fn write<W: Write>(&self, output: W) -> Result<()> {
        let members: [(String, &[u8]); 3] = [
            ("debian-binary".to_string(), b"2.0\n"),
            (
                format!("control.tar.{}", self.control_compression.extension()),
                &self.control,
            ),
            (
                format!("data.tar.{}", self.compression.extension()),
                &self.data,
            ),
        ];

        let mut archive = ar::Builder::new(output);
        for (name, contents) in members {
            let mut header = ar::Header::new(name.into_bytes(), contents.len() as u64);
            header.set_mode(0o100644);
            header.set_mtime(self.mtime);
            archive.append(&header, contents)?;
        }
        archive.into_inner()?.flush()?;
        Ok(())
    }

    /// Reads a `.deb` from `input`.
    pub fn read<R: Read>(input: R) -> Result<Self> {
        let mut archive = ar::Archive::new(input);
        let mut control = None;
        let mut data = None;
        let mut compression = DebCompression::default();
        let mut control_compression = DebCompression::default();
        let mut seen_version = false;

        while let Some(entry) = archive.next_entry() {
            let mut entry = entry?;
            let name = String::from_utf8_lossy(entry.header().identifier()).into_owned();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;

            match name.as_str() {
                "debian-binary" => {
                    if !buf.starts_with(b"2.") {
                        return Err(Error::package("unsupported deb format version"));
                    }
                    seen_version = true;
                }
                _ => {
                    let member_compression = match Path::new(&name)
                        .extension()
                        .and_then(|e| e.to_str())
                    {
                        Some("xz") => DebCompression::Xz,
                        Some("zst") => DebCompression::Zstd,
                        _ => continue,
                    };
                    if name.starts_with("control.tar.") {
                        control_compression = member_compression;
                        control = Some(buf);
                    } else if name.starts_with("data.tar.") {
                        compression = member_compression;
                        data = Some(buf);
                    }
                }
            }
        }

        match (seen_version, control, data) {
            (true, Some(control), Some(data)) => Ok(Self {
                control,
                data,
                compression,
                control_compression,
                mtime: 0,
            }),
            _ => Err(Error::package("deb package is missing a member")),
        }
    }

    fn control_member(&self, name: &str) -> Result<String> {
        let buf = decompress(self.control_compression, &self.control)?;
        let mut tar = tar::Archive::new(buf.as_slice());
        for entry in tar.entries()? {
            let mut entry = entry?;
            if normalize(&entry.path()?) == Path::new(name) {
                let mut out = String::new();
                entry.read_to_string(&mut out)?;
                return Ok(out);
            }
        }
        Err(Error::package(format!("control archive has no {name}")))
    }

    /// The package's control file.
    pub fn control(&self) -> Result<String> {
        self.control_member("control")
    }

    pub fn md5sums(&self) -> Result<String> {
        self.control_member("md5sums")
    }

    /// Absolute install paths of the regular files in the data archive.
    pub fn data_paths(&self) -> Result<Vec<PathBuf>> {
        let buf = decompress(self.compression, &self.data)?;
        let mut tar = tar::Archive::new(buf.as_slice());
        let mut paths = Vec::new();
        for entry in tar.entries()? {
            let entry = entry?;
            if entry.header().entry_type().is_file() {
                paths.push(Path::new("/").join(normalize(&entry.path()?)));
            }
        }
        Ok(paths)
    }

    /// Symlinks in the data archive as (absolute install path, target).
    pub fn data_symlinks(&self) -> Result<Vec<(PathBuf, PathBuf)>> {
        let buf = decompress(self.compression, &self.data)?;
        let mut tar = tar::Archive::new(buf.as_slice());
        let mut links = Vec::new();
        for entry in tar.entries()? {
            let entry = entry?;
            if entry.header().entry_type().is_symlink() {
                let path = Path::new("/").join(normalize(&entry.path()?));
                let target = entry
                    .link_name()?
                    .map(|target| target.into_owned())
                    .unwrap_or_default();
                links.push((path, target));
            }
        }
        Ok(links)
    }

    pub fn compression(&self) -> DebCompression {
        self.compression
    }
}

// Drops a leading "./" from archive paths
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
