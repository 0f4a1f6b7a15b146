/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("analysis timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("path oracle could not decide the query")]
    OracleUnknown,
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl AnalysisError {
    /// Timeouts and undecided oracle queries only abandon the current
    /// function. Anything else is a bug in the engine or a collaborator.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::OracleUnknown)
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
