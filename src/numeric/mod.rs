/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The built-in numerical domain: intervals reduced with affine
//! equalities, over exact integers.

mod equalities;
mod linear;
mod linear_value;
pub mod matrix;

pub use equalities::*;
pub use linear::*;
pub use linear_value::*;
