/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::time::Duration;
use std::time::Instant;

use crate::error::AnalysisError;
use crate::error::AnalysisResult;

/// Wall-clock budget of one function's analysis.
///
/// Cancellation is cooperative: the engine calls [`Deadline::check`]
/// after every widening step, every oracle query and every round.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::start(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        match self.limit {
            Some(limit) => self.elapsed() >= limit,
            None => false,
        }
    }

    pub fn check(&self) -> AnalysisResult<()> {
        if self.is_expired() {
            Err(AnalysisError::Timeout {
                elapsed: self.elapsed(),
            })
        } else {
            Ok(())
        }
    }
}
