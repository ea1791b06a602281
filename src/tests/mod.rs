// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Support for unit tests: a synthetic device tree and a fake command
//! runner.

pub mod logger;
pub mod tree;
