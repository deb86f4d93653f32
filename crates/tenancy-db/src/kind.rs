// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Entity and relationship kind descriptors.
//!
//! A descriptor tells the generic engines everything that differs between
//! kinds: table, identity column and how identities are produced, the scope
//! column, stored columns, the attribute contract, the unique column and the
//! rows that must disappear together with a resource.

use std::sync::Arc;

use serde_json::Value;
use tenancy_core::{identity, AttributeContract};

use crate::sql::SqlValue;

/// A stored record, keyed by column name.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
	/// Canonical UUID text outside, 16-byte BLOB inside.
	Uuid,
	Text,
	Bool,
	Integer,
	Json,
	Timestamp,
	/// Argon2 hash; written from plain text, never read back.
	Password,
	/// Engine-written secret digest, never read back.
	Secret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
	pub name: &'static str,
	pub ty: ColumnType,
}

impl Column {
	pub const fn new(name: &'static str, ty: ColumnType) -> Self {
		Self { name, ty }
	}

	pub fn is_secret(&self) -> bool {
		matches!(self.ty, ColumnType::Password | ColumnType::Secret)
	}

	pub fn selectable(&self) -> bool {
		!self.is_secret()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStrategy {
	/// Generated UUID.
	Uuid,
	/// Supplied by the caller as the identity attribute (email, metadata key).
	Natural,
	/// Generated short string, supplied to the engine by the owning store.
	ShortKey,
}

/// The owning resource a scoped kind lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRef {
	/// Column on this kind's table holding the scope identity.
	pub column: &'static str,
	/// Table holding the scope resources, keyed by `id`.
	pub table: &'static str,
	pub kind: &'static str,
}

/// Rows in another table that reference a resource by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependent {
	pub table: &'static str,
	pub column: &'static str,
}

#[derive(Debug, Clone)]
pub struct ResourceKind {
	pub name: &'static str,
	pub table: &'static str,
	pub identity: &'static str,
	pub strategy: IdentityStrategy,
	pub scope: Option<ScopeRef>,
	/// Every stored column, including identity, scope and timestamps.
	pub columns: Vec<Column>,
	pub contract: AttributeContract,
	pub unique: Option<&'static str>,
	pub dependents: Vec<Dependent>,
}

impl ResourceKind {
	pub fn column(&self, name: &str) -> Option<&Column> {
		self.columns.iter().find(|c| c.name == name)
	}

	pub fn selectable_columns(&self) -> Vec<Column> {
		self.columns.iter().copied().filter(Column::selectable).collect()
	}

	pub fn secret_columns(&self) -> Vec<&'static str> {
		self.columns
			.iter()
			.filter(|c| c.is_secret())
			.map(|c| c.name)
			.collect()
	}

	pub fn identity_column(&self) -> Column {
		self.column(self.identity)
			.copied()
			.unwrap_or(Column::new(self.identity, ColumnType::Text))
	}

	/// Storage value for an identity, `None` when it cannot exist.
	pub fn encode_id(&self, id: &str) -> Option<SqlValue> {
		match self.identity_column().ty {
			ColumnType::Uuid => identity::to_binary(id).ok().map(SqlValue::Blob),
			_ if id.is_empty() => None,
			_ => Some(SqlValue::Text(id.to_string())),
		}
	}
}

/// Storage value for a scope identity, `None` when it cannot exist.
pub fn encode_scope(scope: &str) -> Option<SqlValue> {
	identity::to_binary(scope).ok().map(SqlValue::Blob)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
	Owner,
	Member,
}

/// How an endpoint of a relationship proves it belongs to the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
	/// A row of the endpoint kind exists (inside the scope when the kind is scoped).
	Exists,
	/// The user is a member of the scoping tenant.
	TenantMember,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
	pub kind: Arc<ResourceKind>,
	/// Column on the join table.
	pub column: &'static str,
	pub presence: Presence,
}

/// Tenant↔User membership rules.
#[derive(Debug, Clone)]
pub struct Membership {
	/// Which endpoint is the tenant.
	pub tenant_side: Side,
	/// Tables keyed by `(tenant_id, user_id)` cleared when a membership goes.
	pub cascade: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct RelationshipKind {
	pub name: &'static str,
	pub table: &'static str,
	/// Scope column on the join table, for tenant-scoped relationships.
	pub scope_column: Option<&'static str>,
	pub owner: Endpoint,
	pub member: Endpoint,
	pub membership: Option<Membership>,
}
