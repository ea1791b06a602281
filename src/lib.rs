// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Identify Linux block devices and manage LUKS mappings.
//!
//! A device may be referred to by its kernel name, its filesystem label or
//! UUID, its partition UUID, its device-mapper name, or by any path that
//! leads to its node. The `locate` module turns any such reference into
//! the one canonical path of the node. The `classify` module answers
//! questions about a device from sysfs and blkid, and the `luks` module
//! drives cryptsetup to format, open, and close encrypted devices.

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

pub mod classify;
pub mod cmd;
pub mod config;
pub mod consts;
pub mod errors;
pub mod links;
pub mod locate;
pub mod luks;

#[cfg(test)]
mod tests;

pub use crate::{
    config::{DevConfig, DevTree},
    errors::{DevError, DevResult},
    locate::{resolve_canonical_path, same_device, search_dev_path},
    luks::{correlate, dm_mapping_name, LuksMapper, MappingCorrelation},
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
