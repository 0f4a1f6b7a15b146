/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;
use std::fmt;

use crate::value::DomainKind;
use crate::value::Environment;
use crate::value::Symbol;
use crate::value::VariableKindClassifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Technique {
    Classic,
    LookaheadWidening,
    Guided,
    PathFocusing,
    PathFocusingDisjunctive,
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Technique::Classic => "classic",
            Technique::LookaheadWidening => "lookahead-widening",
            Technique::Guided => "guided",
            Technique::PathFocusing => "path-focusing",
            Technique::PathFocusingDisjunctive => "path-focusing-disjunctive",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NarrowingPolicy {
    #[default]
    Classic,
    /// Restart from widening seeds found in the initial values.
    Seeded,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ThresholdPolicy {
    #[default]
    Disabled,
    Enabled,
}

/// Names one analysis run. Every per-node slot map is keyed by it, so
/// several runs can share one context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TechniqueKey {
    pub technique: Technique,
    pub domain: DomainKind,
    pub narrowing: NarrowingPolicy,
    pub threshold: ThresholdPolicy,
}

impl fmt::Display for TechniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.technique, self.domain)?;
        if self.narrowing == NarrowingPolicy::Seeded {
            write!(f, "+seeds")?;
        }
        if self.threshold == ThresholdPolicy::Enabled {
            write!(f, "+thresholds")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// `X_s`, the current over-approximation.
    Stable,
    /// `X_d`, the value being narrowed.
    Descending,
    /// `X_i`, recorded when the node first became reachable.
    Initial,
    /// `X_f`, known properties intersected in for precision.
    Known,
}

#[derive(Clone, Debug)]
pub struct NodeSlots<S> {
    pub x_s: S,
    pub x_d: S,
    pub x_i: S,
    pub x_f: S,
}

impl<S: Clone> NodeSlots<S> {
    pub fn filled(value: S) -> Self {
        Self {
            x_s: value.clone(),
            x_d: value.clone(),
            x_i: value.clone(),
            x_f: value,
        }
    }

    pub fn get(&self, kind: SlotKind) -> &S {
        match kind {
            SlotKind::Stable => &self.x_s,
            SlotKind::Descending => &self.x_d,
            SlotKind::Initial => &self.x_i,
            SlotKind::Known => &self.x_f,
        }
    }

    pub fn get_mut(&mut self, kind: SlotKind) -> &mut S {
        match kind {
            SlotKind::Stable => &mut self.x_s,
            SlotKind::Descending => &mut self.x_d,
            SlotKind::Initial => &mut self.x_i,
            SlotKind::Known => &mut self.x_f,
        }
    }
}

/// Per-block analysis record.
#[derive(Clone, Debug)]
pub struct ControlFlowNode<N, S> {
    pub id: usize,
    pub block: N,
    env: Environment,
    slots: HashMap<TechniqueKey, NodeSlots<S>>,
}

impl<N: Copy, S: Clone> ControlFlowNode<N, S> {
    pub fn new(id: usize, block: N) -> Self {
        Self {
            id,
            block,
            env: Environment::new(),
            slots: HashMap::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn set_env(&mut self, env: Environment) {
        self.env = env;
    }

    /// Tracks `symbol` with the kind the classifier decides. Returns
    /// whether the environment grew.
    pub fn add_variable<C>(&mut self, symbol: Symbol, classifier: &C) -> bool
    where
        C: VariableKindClassifier + ?Sized,
    {
        let kind = classifier.kind_of(&symbol);
        self.env.add(symbol, kind)
    }

    pub fn slots(&self, key: &TechniqueKey) -> Option<&NodeSlots<S>> {
        self.slots.get(key)
    }

    pub fn slots_mut(&mut self, key: &TechniqueKey) -> Option<&mut NodeSlots<S>> {
        self.slots.get_mut(key)
    }

    pub fn init_slots(&mut self, key: TechniqueKey, slots: NodeSlots<S>) {
        self.slots.insert(key, slots);
    }

    pub fn drop_slots(&mut self, key: &TechniqueKey) {
        self.slots.remove(key);
    }

    pub fn has_slots(&self, key: &TechniqueKey) -> bool {
        self.slots.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::VariableKind;

    struct OnlyInts;

    impl VariableKindClassifier for OnlyInts {
        fn kind_of(&self, symbol: &Symbol) -> VariableKind {
            if symbol.starts_with('p') {
                VariableKind::Untracked
            } else {
                VariableKind::Int
            }
        }
    }

    #[test]
    fn test_add_variable_skips_untracked() {
        let mut node: ControlFlowNode<u32, ()> = ControlFlowNode::new(0, 7);
        assert!(node.add_variable(Symbol::from("i"), &OnlyInts));
        assert!(!node.add_variable(Symbol::from("ptr"), &OnlyInts));
        assert!(!node.add_variable(Symbol::from("i"), &OnlyInts));
        assert_eq!(node.env().len(), 1);
    }

    #[test]
    fn test_slots_are_keyed_by_technique() {
        let classic = TechniqueKey {
            technique: Technique::Classic,
            domain: DomainKind::Interval,
            narrowing: NarrowingPolicy::Classic,
            threshold: ThresholdPolicy::Disabled,
        };
        let guided = TechniqueKey {
            technique: Technique::Guided,
            ..classic
        };
        let mut node: ControlFlowNode<u32, i32> = ControlFlowNode::new(0, 0);
        node.init_slots(classic, NodeSlots::filled(1));
        node.init_slots(guided, NodeSlots::filled(2));
        if let Some(s) = node.slots_mut(&guided) {
            *s.get_mut(SlotKind::Descending) = 3;
        }
        assert_eq!(*node.slots(&classic).map(|s| s.get(SlotKind::Descending)).unwrap(), 1);
        assert_eq!(node.slots(&guided).map(|s| s.x_d), Some(3));
        node.drop_slots(&classic);
        assert!(!node.has_slots(&classic));
        assert_eq!(guided.to_string(), "guided/Interval");
    }
}
