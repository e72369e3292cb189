// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

//! Caches for Vulkan pipelines, pipeline layouts, and descriptor set layouts,
//! keyed by structural descriptions of the objects, plus a shared descriptor pool
//! and an on-demand eviction pass for cold entries.

pub use ash;
pub use vkcache_util as util;
pub use vkcache_util::{Clock, ManualClock, SystemClock};

pub mod error;
pub use error::*;

pub mod config;
pub use config::*;

pub mod key;
pub use key::*;

pub mod cache;
pub use cache::*;

pub mod validate;

pub mod eviction;
pub use eviction::*;

pub mod descriptor;
pub use descriptor::*;

pub mod driver;
pub use driver::*;

pub mod vulkan;
pub use vulkan::*;

pub mod manager;
pub use manager::*;
