/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::time::Duration;

use crate::node::NarrowingPolicy;
use crate::node::Technique;
use crate::node::TechniqueKey;
use crate::node::ThresholdPolicy;
use crate::value::DomainKind;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_DISJUNCTS: usize = 5;

/// Settings of one analysis run.
#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    pub technique: Technique,
    pub domain: DomainKind,
    pub narrowing: NarrowingPolicy,
    pub threshold: ThresholdPolicy,
    /// Per-function budget. `None` disables the deadline.
    pub timeout: Option<Duration>,
    pub max_disjuncts: usize,
    /// Overrides the number of extra narrowing rounds of the technique.
    pub narrowing_rounds: Option<usize>,
    /// A technique already run on the same context whose invariants are
    /// intersected into this run.
    pub known_properties: Option<TechniqueKey>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            technique: Technique::Classic,
            domain: DomainKind::IntervalEqualities,
            narrowing: NarrowingPolicy::Classic,
            threshold: ThresholdPolicy::Disabled,
            timeout: Some(DEFAULT_TIMEOUT),
            max_disjuncts: DEFAULT_MAX_DISJUNCTS,
            narrowing_rounds: None,
            known_properties: None,
        }
    }
}

impl AnalysisOptions {
    pub fn new(technique: Technique) -> Self {
        Self {
            technique,
            ..Self::default()
        }
    }

    pub fn with_domain(mut self, domain: DomainKind) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_narrowing(mut self, narrowing: NarrowingPolicy) -> Self {
        self.narrowing = narrowing;
        self
    }

    pub fn with_threshold(mut self, threshold: ThresholdPolicy) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_disjuncts(mut self, max_disjuncts: usize) -> Self {
        self.max_disjuncts = max_disjuncts.max(1);
        self
    }

    pub fn with_narrowing_rounds(mut self, rounds: usize) -> Self {
        self.narrowing_rounds = Some(rounds);
        self
    }

    pub fn with_known_properties(mut self, key: TechniqueKey) -> Self {
        self.known_properties = Some(key);
        self
    }

    pub fn technique_key(&self) -> TechniqueKey {
        TechniqueKey {
            technique: self.technique,
            domain: self.domain,
            narrowing: self.narrowing,
            threshold: self.threshold,
        }
    }

    /// Extra narrowing rounds after the first one.
    pub fn narrowing_rounds_for(&self, technique: Technique) -> usize {
        self.narrowing_rounds.unwrap_or(match technique {
            Technique::Classic | Technique::LookaheadWidening | Technique::Guided => 5,
            Technique::PathFocusing => 1,
            Technique::PathFocusingDisjunctive => 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_follows_options() {
        let options = AnalysisOptions::new(Technique::PathFocusing)
            .with_domain(DomainKind::Interval)
            .with_threshold(ThresholdPolicy::Enabled);
        let key = options.technique_key();
        assert_eq!(key.technique, Technique::PathFocusing);
        assert_eq!(key.to_string(), "path-focusing/Interval+thresholds");
        assert_eq!(options.narrowing_rounds_for(Technique::PathFocusing), 1);
        assert_eq!(
            options
                .with_narrowing_rounds(9)
                .narrowing_rounds_for(Technique::Classic),
            9
        );
    }
}
