/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod abstract_domain;
mod abstract_environment;
mod disjunctive;
mod interval;

pub use abstract_domain::*;
pub use abstract_environment::*;
pub use disjunctive::*;
pub use interval::*;
