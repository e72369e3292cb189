// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

use ash::vk;
use thiserror::Error;

use crate::CacheCategory;

/// Failures returned to the frontend. None of them is fatal to the process:
/// the caller decides whether to skip the draw or dispatch, or to escalate.
///
/// Using a descriptor set after the pool that issued it was recreated is
/// a caller responsibility and is not reported here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The key is structurally invalid and no driver call was made
    #[error("Invalid {category} key: {reason}")]
    Validation {
        category: CacheCategory,
        reason: String,
    },

    /// The driver rejected a structurally valid request
    #[error("Failed to create Vulkan {category}: {result}")]
    Creation {
        category: CacheCategory,
        result: vk::Result,
    },

    /// The descriptor pool is still full after being recreated
    #[error("Vulkan descriptor pool exhausted ({capacity} sets) even after recreation")]
    PoolExhausted { capacity: u32 },

    /// A descriptor pool call failed for a reason other than exhaustion
    #[error("Vulkan descriptor pool failure: {0}")]
    Pool(vk::Result),

    #[error("Descriptor set layout {0:?} does not belong to this cache")]
    UnknownLayout(vk::DescriptorSetLayout),

    /// The set was never allocated from the current pool, was already freed,
    /// or was invalidated by a pool recreation
    #[error("Descriptor set {0:?} does not belong to the current pool")]
    UnknownDescriptorSet(vk::DescriptorSet),
}

impl Error {
    pub fn validation(category: CacheCategory, reason: impl Into<String>) -> Self {
        Error::Validation {
            category,
            reason: reason.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
