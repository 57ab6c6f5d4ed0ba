// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format emission library.
//!
//! A module is assembled programmatically: entities are registered on a
//! [`Module`], instruction sequences are built with an [`ExpressionBuilder`],
//! and [`Module::emit`] flattens everything into the canonical WebAssembly
//! 2.0 (non-SIMD) binary encoding.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(nightly, feature(allocator_api))]

#[cfg(nightly)]
extern crate alloc;

pub mod core_compat;
pub mod emit;
pub mod module;
pub mod types;

pub use emit::{Error, ExpressionBuilder};
pub use module::Module;

/// The allocator bound used throughout the crate. Allocators are cloned into
/// every collection an entity owns, so they must be cheaply cloneable
/// handles.
pub trait Allocator: core_compat::alloc::Allocator + Clone {}

impl<A: core_compat::alloc::Allocator + Clone> Allocator for A {}
