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

//! Support library of the bare-metal installer.
//!
//! Validates what the user types into the installer (email addresses, CIDR
//! addresses, the option set shown on the summary screen) and implements
//! the packaging recipe that builds the installer's Debian packages.

pub mod binary;
pub mod cidr;
pub mod config;
pub mod email;
mod error;
pub mod logger;
pub mod options;
pub mod process;
pub mod rules;
mod shared;
#[cfg(test)]
mod test;

pub use error::{Error, Result};
pub use shared::*;
