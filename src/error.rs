// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ratelimit::EntityType;
use crate::store::StoreError;

pub type Result<T, E = BudgetError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Too many {entity} changes, retry in {retry_after_ms} ms")]
    RateLimited {
        entity: EntityType,
        retry_after_ms: u64,
    },
    #[error("Store request failed")]
    Upstream(#[from] StoreError),
}

impl BudgetError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BudgetError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        BudgetError::NotFound(what.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        BudgetError::AccessDenied(msg.into())
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, BudgetError::Upstream(_))
    }
}
