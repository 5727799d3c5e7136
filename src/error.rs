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

use thiserror::Error;

use crate::cidr::CidrAddressParseError;
use crate::rules::missing::MissingReport;
use crate::rules::Step;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("invalid CIDR address: {0}")]
    InvalidCidr(#[from] CidrAddressParseError),

    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("invalid package: {message}")]
    InvalidPackage { message: String },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("step '{step}' failed ({status})")]
    StepFailed { step: Step, status: String },

    #[error("{0}")]
    MissingFiles(MissingReport),
}

impl Error {
    pub(crate) fn config(field: &str, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn package(message: impl Into<String>) -> Self {
        Error::InvalidPackage {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
