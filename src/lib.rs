/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Numerical invariant inference on control-flow graphs.
//!
//! The engine runs an ascending (widening) / descending (narrowing)
//! fixpoint computation over an abstract domain, driven by one of five
//! path-selection strategies: the classic worklist, lookahead widening,
//! guided iteration, path focusing and disjunctive path focusing. The
//! path-focusing strategies consult a [`oracle::PathOracle`] for the
//! next feasible path instead of walking CFG edges one at a time.

pub mod context;
pub mod datatype;
pub mod deadline;
pub mod driver;
pub mod error;
pub mod fixpoint_iter;
pub mod graph;
pub mod node;
pub mod numeric;
pub mod options;
pub mod oracle;
pub mod path;
pub mod reduction;
pub mod scc;
pub mod sigma;
pub mod strategy;
pub mod value;
