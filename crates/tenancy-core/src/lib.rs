// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage-agnostic building blocks for the tenancy engine.
//!
//! This crate provides:
//! - [`identity`]: conversion between canonical UUID text and its 16-byte storage form
//! - [`attributes`]: per-kind attribute contracts (required, allowed, rules)
//! - [`namespace`]: the protected metadata-key policy
//! - [`error`]: the closed error-kind taxonomy shared by every layer

pub mod attributes;
pub mod error;
pub mod identity;
pub mod namespace;

pub use attributes::{AttributeContract, AttributeContractBuilder, Attributes, Rule};
pub use error::{ErrorKind, ValidationError};
pub use identity::{new_identity, to_binary, to_text, IdentityError};
pub use namespace::{NamespaceError, NamespacePolicy, DEFAULT_PROTECTED_PREFIX};
