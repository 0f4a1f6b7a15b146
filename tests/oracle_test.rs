/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The enumerating oracle, queried against hand-built invariants.

mod common;

mod oracle_test {
    use std::collections::HashMap;
    use std::collections::HashSet;

    use petgraph::graph::NodeIndex;
    use spire::error::AnalysisError;
    use spire::node::SlotKind;
    use spire::numeric::LinearConstraint;
    use spire::numeric::LinearValue;
    use spire::oracle::AbstractPathOracle;
    use spire::oracle::OracleAnswer;
    use spire::oracle::PathOracle;
    use spire::oracle::PathQuery;
    use spire::oracle::StateView;
    use spire::path::Path;
    use spire::path::PathFilter;
    use spire::path::PathSet;
    use spire::value::DomainKind;
    use spire::value::Environment;
    use test_log::test;

    use crate::common::program::*;

    struct FakeState {
        env: Environment,
        values: HashMap<(NodeIndex, SlotKind), Vec<LinearValue>>,
        reduction_points: HashSet<NodeIndex>,
    }

    impl FakeState {
        fn new(reduction_points: &[NodeIndex]) -> Self {
            Self {
                env: Environment::from_ints(["i", "x"]),
                values: HashMap::new(),
                reduction_points: reduction_points.iter().copied().collect(),
            }
        }

        fn value(&self, constraints: &[LinearConstraint]) -> LinearValue {
            let mut value = LinearValue::top(DomainKind::IntervalEqualities, &self.env);
            for c in constraints {
                value.add_constraint(c);
            }
            value
        }

        fn set(&mut self, node: NodeIndex, slot: SlotKind, constraints: &[LinearConstraint]) {
            let value = self.value(constraints);
            self.values.insert((node, slot), vec![value]);
        }
    }

    impl StateView<NodeIndex, LinearValue> for FakeState {
        fn disjunct_count(&self, node: NodeIndex, slot: SlotKind) -> usize {
            self.values.get(&(node, slot)).map_or(0, |v| v.len())
        }

        fn disjunct(&self, node: NodeIndex, slot: SlotKind, index: usize) -> Option<&LinearValue> {
            self.values.get(&(node, slot))?.get(index)
        }

        fn is_reduction_point(&self, node: NodeIndex) -> bool {
            self.reduction_points.contains(&node)
        }

        fn environment(&self, _node: NodeIndex) -> Option<&Environment> {
            Some(&self.env)
        }
    }

    fn oracle_for(l: &CountingLoop) -> AbstractPathOracle<'_, Cfg, LinearValue> {
        AbstractPathOracle::new(&l.procedure.cfg, &l.procedure)
    }

    fn ascending(start: NodeIndex) -> PathQuery<'static, NodeIndex> {
        PathQuery {
            start,
            descending: false,
            filter: PathFilter::Any,
        }
    }

    #[test]
    fn test_uncovered_loop_path_comes_first() {
        let l = counting_loop();
        let mut oracle = oracle_for(&l);
        let mut state = FakeState::new(&[l.procedure.entry(), l.header, l.exit]);
        state.set(l.header, SlotKind::Stable, &[eq(var("i"), c(0)), eq(var("x"), c(0))]);

        let answer = oracle.query(&ascending(l.header), &state).unwrap();
        assert_eq!(
            answer,
            OracleAnswer::Sat {
                path: Path::new(vec![l.header, l.body, l.header]),
                disjunct: 0,
            }
        );
    }

    #[test]
    fn test_covered_paths_are_skipped() {
        let l = counting_loop();
        let mut oracle = oracle_for(&l);
        let mut state = FakeState::new(&[l.procedure.entry(), l.header, l.exit]);
        let invariant = [ge(var("i"), c(0)), ge(c(50), var("i")), eq(var("x"), var("i") + var("i"))];
        state.set(l.header, SlotKind::Stable, &invariant);

        // The loop is stable, the exit was never reached.
        let answer = oracle.query(&ascending(l.header), &state).unwrap();
        assert_eq!(
            answer,
            OracleAnswer::Sat {
                path: Path::new(vec![l.header, l.exit]),
                disjunct: 0,
            }
        );

        state.set(l.exit, SlotKind::Stable, &[eq(var("i"), c(50)), eq(var("x"), c(100))]);
        assert_eq!(oracle.query(&ascending(l.header), &state).unwrap(), OracleAnswer::Unsat);

        // Descending queries compare against X_d, which is still bottom.
        let descending = PathQuery {
            start: l.header,
            descending: true,
            filter: PathFilter::Any,
        };
        assert!(matches!(
            oracle.query(&descending, &state).unwrap(),
            OracleAnswer::Sat { .. }
        ));
    }

    #[test]
    fn test_filter_restricts_the_candidates() {
        let l = counting_loop();
        let mut oracle = oracle_for(&l);
        let mut state = FakeState::new(&[l.procedure.entry(), l.header, l.exit]);
        state.set(l.header, SlotKind::Stable, &[eq(var("i"), c(0)), eq(var("x"), c(0))]);

        let nothing = PathSet::new();
        let query = PathQuery {
            start: l.header,
            descending: false,
            filter: PathFilter::Within(&nothing),
        };
        assert_eq!(oracle.query(&query, &state).unwrap(), OracleAnswer::Unsat);

        let mut recorded = PathSet::new();
        recorded.insert(Path::new(vec![l.header, l.body, l.header]), false);
        let query = PathQuery {
            start: l.header,
            descending: false,
            filter: PathFilter::NotWithin(&recorded),
        };
        // i = 0 cannot leave the loop.
        assert_eq!(oracle.query(&query, &state).unwrap(), OracleAnswer::Unsat);
    }

    #[test]
    fn test_known_properties_prune_images() {
        let l = counting_loop();
        let mut oracle = oracle_for(&l);
        let mut state = FakeState::new(&[l.procedure.entry(), l.header, l.exit]);
        state.set(l.header, SlotKind::Stable, &[ge(var("i"), c(0)), ge(c(10), var("i"))]);
        state.set(l.header, SlotKind::Known, &[ge(c(10), var("i"))]);
        state.set(l.exit, SlotKind::Known, &[ge(c(10), var("i"))]);

        // The loop image i in [1, 11] is cut down to i <= 10 and is covered.
        // The exit needs i >= 50.
        assert_eq!(oracle.query(&ascending(l.header), &state).unwrap(), OracleAnswer::Unsat);
    }

    #[test]
    fn test_bottom_start_has_no_paths() {
        let l = counting_loop();
        let mut oracle = oracle_for(&l);
        let state = FakeState::new(&[l.procedure.entry(), l.header, l.exit]);
        assert_eq!(oracle.query(&ascending(l.header), &state).unwrap(), OracleAnswer::Unsat);
    }

    #[test]
    fn test_unbalanced_pop_is_an_error() {
        let l = counting_loop();
        let mut oracle = oracle_for(&l);
        oracle.push();
        oracle.push();
        assert_eq!(oracle.depth(), 2);
        oracle.pop().unwrap();
        oracle.pop().unwrap();
        assert!(matches!(oracle.pop(), Err(AnalysisError::InvariantViolation(_))));
        assert_eq!(oracle.depth(), 0);
    }
}
