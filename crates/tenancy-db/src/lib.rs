// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage for the tenancy engine.
//!
//! This crate provides:
//! - SQLite pool creation and the schema
//! - Entity and relationship kind descriptors
//! - The generic scoped resource and relationship engines
//! - Collection queries with column allow-listing and pagination
//! - Entity-specific stores (tenants, users, metadata, invitations, user keys)
//! - [`Directory`], which wires one pool, notifier and policy into every store

pub mod collection;
pub mod directory;
pub mod error;
pub mod invitation;
pub mod kind;
pub mod kinds;
pub mod meta;
pub mod password;
pub mod pool;
pub mod relationship;
pub mod resource;
pub mod schema;
pub mod sql;
pub mod tenant;
pub mod user;
pub mod user_key;

#[cfg(test)]
pub(crate) mod testing;

pub use collection::{
	Collection, CollectionQuery, Filter, FilterOp, Pagination, Sort, SortDirection,
};
pub use directory::{build_notifier, Directory};
pub use error::{DbError, Result};
pub use invitation::{InvitationRepository, InvitationStore};
pub use kind::Record;
pub use kinds::Catalog;
pub use meta::{MetaRepository, MetaStore};
pub use pool::create_pool;
pub use relationship::{RelationshipRepository, RelationshipStore};
pub use resource::{ResourceRepository, ResourceStore};
pub use tenant::{TenantRepository, TenantStore};
pub use user::{UserRepository, UserStore};
pub use user_key::{NewUserKey, UserKeyRepository, UserKeyStore};
