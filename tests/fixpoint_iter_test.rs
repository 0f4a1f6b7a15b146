/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! End-to-end runs of every technique on small loops and branches.

mod common;

mod fixpoint_iter_test {
    use petgraph::graph::NodeIndex;
    use spire::context::AnalysisContext;
    use spire::datatype::DisjunctiveValue;
    use spire::datatype::Interval;
    use spire::driver::FunctionOutcome;
    use spire::error::AnalysisResult;
    use spire::fixpoint_iter::FixpointEngine;
    use spire::node::NarrowingPolicy;
    use spire::node::SlotKind;
    use spire::node::Technique;
    use spire::node::ThresholdPolicy;
    use spire::numeric::LinearManager;
    use spire::numeric::LinearValue;
    use spire::options::AnalysisOptions;
    use spire::oracle::AbstractPathOracle;
    use spire::strategy::ClassicStrategy;
    use spire::strategy::PathFocusingStrategy;
    use spire::strategy::PathSelectionStrategy;
    use spire::value::Symbol;
    use test_log::test;

    use crate::common::program::*;

    const TECHNIQUES: [Technique; 5] = [
        Technique::Classic,
        Technique::LookaheadWidening,
        Technique::Guided,
        Technique::PathFocusing,
        Technique::PathFocusingDisjunctive,
    ];

    fn run(procedure: &Procedure, technique: Technique) -> FunctionOutcome<NodeIndex, LinearValue> {
        let outcome = analyze(procedure, options(AnalysisOptions::new(technique))).unwrap();
        assert!(outcome.is_completed(), "{}: {:?}", technique, outcome.status);
        outcome
    }

    fn range(outcome: &FunctionOutcome<NodeIndex, LinearValue>, block: NodeIndex, var: &str) -> Interval {
        outcome
            .hull(block)
            .unwrap_or_else(|| panic!("{}: block {:?} is unreachable", outcome.key, block))
            .interval_of(&Symbol::from(var))
    }

    #[test]
    fn test_straight_line() {
        let s = straight_line();
        for technique in TECHNIQUES {
            let outcome = run(&s.procedure, technique);
            assert_eq!(range(&outcome, s.ret, "x"), Interval::point(2), "{}", technique);
            assert_eq!(range(&outcome, s.ret, "y"), Interval::point(52), "{}", technique);
        }
    }

    #[test]
    fn test_counting_loop() {
        let l = counting_loop();
        for technique in TECHNIQUES {
            let outcome = run(&l.procedure, technique);
            assert_eq!(range(&outcome, l.header, "i"), Interval::closed(0, 50), "{}", technique);
            assert_eq!(range(&outcome, l.exit, "i"), Interval::point(50), "{}", technique);
            // Recovered through the equality x = 2i.
            assert_eq!(range(&outcome, l.exit, "x"), Interval::point(100), "{}", technique);
        }
    }

    #[test]
    fn test_classic_iterates_every_block() {
        let l = counting_loop();
        let outcome = run(&l.procedure, Technique::Classic);
        assert_eq!(range(&outcome, l.body, "i"), Interval::closed(0, 49));
        assert!(outcome.stats.widenings > 0);
        assert!(outcome.stats.descending_steps > 0);
        assert_eq!(outcome.stats.oracle_queries, 0);
    }

    #[test]
    fn test_path_focusing_keeps_invariants_at_reduction_points_only() {
        let l = counting_loop();
        let outcome = run(&l.procedure, Technique::PathFocusing);
        let body = outcome.invariant(l.body).unwrap();
        assert!(!body.is_reduction_point);
        assert!(body.is_bottom);
        let header = outcome.invariant(l.header).unwrap();
        assert!(header.is_reduction_point);
        assert!(!header.is_bottom);
        assert!(outcome.stats.oracle_queries > 0);
    }

    #[test]
    fn test_loop_then_branch() {
        let b = loop_then_branch();
        for technique in TECHNIQUES {
            let outcome = run(&b.procedure, technique);
            assert_eq!(range(&outcome, b.header, "i"), Interval::closed(0, 49), "{}", technique);
            assert_eq!(range(&outcome, b.ret, "i"), Interval::point(49), "{}", technique);
            assert_eq!(range(&outcome, b.ret, "x"), Interval::closed(50, 61), "{}", technique);
        }
    }

    #[test]
    fn test_disjunctive_separates_branches() {
        let b = loop_then_branch();
        let outcome = run(&b.procedure, Technique::PathFocusingDisjunctive);
        let ret = outcome.invariant(b.ret).unwrap();
        // z = 0, z >= 1 and z <= -1 do not fit in a common disjunct.
        assert_eq!(ret.disjuncts.len(), 3);
        let mut xs: Vec<Interval> = ret
            .disjuncts
            .iter()
            .map(|d| d.interval_of(&Symbol::from("x")))
            .collect();
        xs.sort_by_key(|i| i.lo().cloned());
        assert_eq!(xs, vec![Interval::point(50), Interval::point(61), Interval::point(61)]);
        assert!(ret
            .disjuncts
            .iter()
            .any(|d| d.interval_of(&Symbol::from("z")) == Interval::at_most(-1)));
        assert!(!outcome.precision_degraded);
    }

    #[test]
    fn test_disjunct_bound_degrades_precision() {
        let j = three_way_join();
        let options = options(AnalysisOptions::new(Technique::PathFocusingDisjunctive).with_max_disjuncts(2));
        let outcome = analyze(&j.procedure, options).unwrap();
        assert!(outcome.is_completed());
        assert!(outcome.precision_degraded);

        let ret = outcome.invariant(j.ret).unwrap();
        assert_eq!(ret.disjuncts.len(), 2);
        // Every branch is still covered by the union.
        let hull = outcome.hull(j.ret).unwrap();
        for (x, z) in [(0, 0), (10, 1), (20, 2)] {
            assert!(hull.interval_of(&Symbol::from("x")).contains(&x.into()));
            assert!(hull.interval_of(&Symbol::from("z")).contains(&z.into()));
        }
        assert_eq!(hull.interval_of(&Symbol::from("x")), Interval::closed(0, 20));
    }

    #[test]
    fn test_single_value_techniques_merge_branches() {
        let j = three_way_join();
        for technique in [Technique::Classic, Technique::PathFocusing] {
            let outcome = run(&j.procedure, technique);
            let ret = outcome.invariant(j.ret).unwrap();
            assert_eq!(ret.disjuncts.len(), 1);
            assert_eq!(range(&outcome, j.ret, "x"), Interval::closed(0, 20));
            assert!(!outcome.precision_degraded);
        }
    }

    #[test]
    fn test_seeded_narrowing() {
        let l = counting_loop();
        for technique in [Technique::Classic, Technique::LookaheadWidening] {
            let options = options(AnalysisOptions::new(technique).with_narrowing(NarrowingPolicy::Seeded));
            let outcome = analyze(&l.procedure, options).unwrap();
            assert!(outcome.is_completed());
            assert_eq!(range(&outcome, l.header, "i"), Interval::closed(0, 50), "{}", technique);
            assert_eq!(range(&outcome, l.exit, "i"), Interval::point(50), "{}", technique);
        }
    }

    #[test]
    fn test_widening_with_thresholds() {
        let l = counting_loop();
        let options = options(AnalysisOptions::new(Technique::Classic).with_threshold(ThresholdPolicy::Enabled));
        let outcome = analyze(&l.procedure, options).unwrap();
        assert_eq!(range(&outcome, l.header, "i"), Interval::closed(0, 50));
        assert_eq!(range(&outcome, l.exit, "x"), Interval::point(100));
    }

    #[test]
    fn test_interval_domain_loses_the_relation() {
        let l = counting_loop();
        let options = options(AnalysisOptions::new(Technique::Classic).with_domain(spire::value::DomainKind::Interval));
        let outcome = analyze(&l.procedure, options).unwrap();
        assert_eq!(range(&outcome, l.exit, "i"), Interval::point(50));
        assert_eq!(range(&outcome, l.exit, "x"), Interval::at_least(0));
    }

    #[test]
    fn test_widenings_do_not_depend_on_the_loop_bound() {
        let short = counting_loop_to(50);
        let long = counting_loop_to(1_000_000);
        for technique in TECHNIQUES {
            let few = run(&short.procedure, technique);
            let many = run(&long.procedure, technique);
            assert!(few.stats.widenings > 0, "{}", technique);
            assert_eq!(few.stats.widenings, many.stats.widenings, "{}", technique);
            assert_eq!(range(&many, long.exit, "i"), Interval::point(1_000_000), "{}", technique);
        }
    }

    type Slots = Vec<DisjunctiveValue<LinearValue>>;

    fn stable_slots(engine: &FixpointEngine<'_, Cfg, LinearValue>) -> AnalysisResult<Slots> {
        (0..engine.node_count())
            .map(|n| engine.slot(n, SlotKind::Stable).cloned())
            .collect()
    }

    fn below(lower: &DisjunctiveValue<LinearValue>, upper: &DisjunctiveValue<LinearValue>) -> bool {
        (0..lower.len().max(upper.len())).all(|i| lower.leq_at(upper, i))
    }

    /// Runs `inner` one ascending phase and one narrowing phase, checking
    /// that no ascending step shrinks an `X_s` slot.
    struct Recording<S> {
        inner: S,
        rounds: usize,
        steps: usize,
        ascended: Slots,
    }

    impl<S> Recording<S> {
        fn new(inner: S, rounds: usize) -> Self {
            Self {
                inner,
                rounds,
                steps: 0,
                ascended: Vec::new(),
            }
        }
    }

    impl<S: PathSelectionStrategy<Cfg, LinearValue>> PathSelectionStrategy<Cfg, LinearValue> for Recording<S> {
        fn technique(&self) -> Technique {
            self.inner.technique()
        }

        fn compute_function(&mut self, engine: &mut FixpointEngine<'_, Cfg, LinearValue>) -> AnalysisResult<()> {
            let rounds = self.rounds;
            engine.ascending_iter(self, true)?;
            self.ascended = stable_slots(engine)?;
            engine.narrowing_rounds(self, rounds)
        }

        fn compute_node(&mut self, engine: &mut FixpointEngine<'_, Cfg, LinearValue>, n: usize) -> AnalysisResult<()> {
            let before = stable_slots(engine)?;
            self.inner.compute_node(engine, n)?;
            let after = stable_slots(engine)?;
            for (m, (old, new)) in before.iter().zip(after.iter()).enumerate() {
                assert!(below(old, new), "node {} shrank from {} to {}", m, old, new);
            }
            self.steps += 1;
            Ok(())
        }

        fn narrow_node(&mut self, engine: &mut FixpointEngine<'_, Cfg, LinearValue>, n: usize) -> AnalysisResult<()> {
            self.inner.narrow_node(engine, n)
        }

        fn intersect_with_known_properties(
            &self,
            engine: &FixpointEngine<'_, Cfg, LinearValue>,
            n: usize,
            value: &mut LinearValue,
        ) -> AnalysisResult<()> {
            self.inner.intersect_with_known_properties(engine, n, value)
        }

        fn precision_degraded(&self) -> bool {
            self.inner.precision_degraded()
        }
    }

    /// Runs `strategy` directly on an engine. Returns the final `X_s` and
    /// the context that holds them.
    fn run_recorded<S>(
        procedure: &Procedure,
        strategy: &mut Recording<S>,
    ) -> (Slots, AnalysisContext<NodeIndex, LinearValue>)
    where
        S: PathSelectionStrategy<Cfg, LinearValue>,
    {
        let options = options(AnalysisOptions::new(strategy.technique()));
        let manager = LinearManager::new(options.domain);
        let mut oracle: AbstractPathOracle<'_, Cfg, LinearValue> = AbstractPathOracle::new(&procedure.cfg, procedure);
        let mut context = AnalysisContext::build(&procedure.cfg);
        let slots = {
            let mut engine =
                FixpointEngine::new(&procedure.cfg, &manager, procedure, &mut oracle, &options, &mut context);
            engine.run(strategy).unwrap();
            assert!(!engine.is_unknown());
            stable_slots(&engine).unwrap()
        };
        (slots, context)
    }

    #[test]
    fn test_ascending_steps_only_grow() {
        let l = counting_loop();
        let b = loop_then_branch();
        for procedure in [&l.procedure, &b.procedure] {
            let mut classic = Recording::new(ClassicStrategy::new(), 5);
            let _ = run_recorded(procedure, &mut classic);
            assert!(classic.steps > 0);

            let mut focusing = Recording::new(PathFocusingStrategy::<NodeIndex>::new(), 1);
            let _ = run_recorded(procedure, &mut focusing);
            assert!(focusing.steps > 0);
        }
    }

    #[test]
    fn test_narrowing_stays_below_the_ascending_result() {
        let l = counting_loop();
        let mut classic = Recording::new(ClassicStrategy::new(), 5);
        let (narrowed, context) = run_recorded(&l.procedure, &mut classic);
        assert_eq!(narrowed.len(), classic.ascended.len());
        for (n, (last, ascended)) in narrowed.iter().zip(classic.ascended.iter()).enumerate() {
            assert!(below(last, ascended), "node {} grew from {} to {}", n, ascended, last);
        }

        // Widening left the header unbounded, narrowing recovered i <= 50.
        let i = Symbol::from("i");
        let header = context.index_of(l.header).unwrap();
        assert_eq!(classic.ascended[header].hull().interval_of(&i), Interval::at_least(0));
        assert_eq!(narrowed[header].hull().interval_of(&i), Interval::closed(0, 50));
    }
}
