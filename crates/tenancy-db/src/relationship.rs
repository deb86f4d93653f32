// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The relationship engine: many-to-many joins between an owner resource
//! and member resources.
//!
//! Storage declares no foreign keys, so this module is the only gatekeeper
//! of referential integrity. `add` and `remove` are all-or-nothing: a batch
//! either commits every listed member or none of them.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Row;
use tenancy_audit::{MutationAction, MutationEvent, MutationNotifier};
use tenancy_config::PolicyConfig;
use tenancy_core::identity;

use crate::collection::{self, Collection, CollectionQuery, CollectionSource, Condition};
use crate::error::DbError;
use crate::kind::{Endpoint, Presence, RelationshipKind, Side};
use crate::pool::finish;
use crate::sql::{self, bind_all, quote, SqlValue};

const MEMBER_ALIAS: &str = "t";
const JOIN_ALIAS: &str = "j";

#[async_trait]
pub trait RelationshipStore: Send + Sync {
	async fn count(&self, scope: Option<&str>, owner: &str) -> Result<i64, DbError>;
	async fn has(&self, scope: Option<&str>, owner: &str, member: &str) -> Result<bool, DbError>;
	async fn add(&self, scope: Option<&str>, owner: &str, members: &[&str]) -> Result<(), DbError>;
	async fn remove(&self, scope: Option<&str>, owner: &str, members: &[&str])
		-> Result<(), DbError>;
	async fn get_collection(
		&self,
		scope: Option<&str>,
		owner: &str,
		query: &CollectionQuery,
	) -> Result<Collection, DbError>;
}

#[async_trait]
impl RelationshipStore for RelationshipRepository {
	async fn count(&self, scope: Option<&str>, owner: &str) -> Result<i64, DbError> {
		self.count(scope, owner).await
	}

	async fn has(&self, scope: Option<&str>, owner: &str, member: &str) -> Result<bool, DbError> {
		self.has(scope, owner, member).await
	}

	async fn add(&self, scope: Option<&str>, owner: &str, members: &[&str]) -> Result<(), DbError> {
		self.add(scope, owner, members).await
	}

	async fn remove(
		&self,
		scope: Option<&str>,
		owner: &str,
		members: &[&str],
	) -> Result<(), DbError> {
		self.remove(scope, owner, members).await
	}

	async fn get_collection(
		&self,
		scope: Option<&str>,
		owner: &str,
		query: &CollectionQuery,
	) -> Result<Collection, DbError> {
		self.get_collection(scope, owner, query).await
	}
}

/// Resolved tenant scope of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scope {
	/// The relationship is not tenant-scoped.
	Unscoped,
	Tenant(Vec<u8>),
	/// A malformed scope identity; nothing lives in it.
	Missing,
}

impl Scope {
	fn tenant(&self) -> Option<&[u8]> {
		match self {
			Scope::Tenant(t) => Some(t),
			Scope::Unscoped | Scope::Missing => None,
		}
	}
}

#[derive(Clone)]
pub struct RelationshipRepository {
	pool: SqlitePool,
	kind: Arc<RelationshipKind>,
	notifier: Arc<dyn MutationNotifier>,
	policy: Arc<PolicyConfig>,
}

impl RelationshipRepository {
	pub fn new(
		pool: SqlitePool,
		kind: Arc<RelationshipKind>,
		notifier: Arc<dyn MutationNotifier>,
		policy: Arc<PolicyConfig>,
	) -> Self {
		Self {
			pool,
			kind,
			notifier,
			policy,
		}
	}

	pub fn kind(&self) -> &RelationshipKind {
		&self.kind
	}

	pub(crate) fn resolve_scope(&self, scope: Option<&str>) -> Result<Scope, DbError> {
		match (self.kind.scope_column, scope) {
			(None, _) => Ok(Scope::Unscoped),
			(Some(_), None) => Err(DbError::bad_request(
				self.kind.name,
				None,
				format!("{} requires a tenant scope", self.kind.name),
			)),
			(Some(_), Some(s)) => Ok(identity::to_binary(s)
				.map(Scope::Tenant)
				.unwrap_or(Scope::Missing)),
		}
	}

	/// Predicates selecting the join rows of `owner` under `scope`.
	fn join_conditions(&self, alias: &str, scope: &Scope, owner: &[u8]) -> Vec<Condition> {
		let mut conditions = vec![Condition::eq(
			alias,
			self.kind.owner.column,
			Some(SqlValue::Blob(owner.to_vec())),
		)];
		if let Some(column) = self.kind.scope_column {
			conditions.push(Condition::eq(
				alias,
				column,
				scope.tenant().map(|t| SqlValue::Blob(t.to_vec())),
			));
		}
		conditions
	}

	async fn count_where(&self, conditions: Vec<Condition>) -> Result<i64, DbError> {
		let mut conn = self.pool.acquire().await?;
		self.count_where_on(&mut *conn, conditions).await
	}

	async fn count_where_on(
		&self,
		conn: &mut SqliteConnection,
		conditions: Vec<Condition>,
	) -> Result<i64, DbError> {
		let clause = conditions
			.iter()
			.map(|c| format!("({})", c.sql))
			.collect::<Vec<_>>()
			.join(" AND ");
		let values = conditions.into_iter().flat_map(|c| c.values).collect();
		let sql = format!(
			"SELECT COUNT(*) AS count FROM {} AS {JOIN_ALIAS} WHERE {clause}",
			quote(self.kind.table)
		);
		let row = bind_all(sqlx::query(&sql), values)
			.fetch_one(&mut *conn)
			.await?;
		Ok(row.get("count"))
	}

	/// Which of `ids` are valid for `endpoint` inside `scope`.
	async fn present(
		&self,
		endpoint: &Endpoint,
		scope: &Scope,
		ids: &[Vec<u8>],
	) -> Result<HashSet<Vec<u8>>, DbError> {
		if ids.is_empty() || *scope == Scope::Missing {
			return Ok(HashSet::new());
		}
		let mut values: Vec<SqlValue> = Vec::with_capacity(ids.len() + 1);
		let sql = match endpoint.presence {
			Presence::Exists => {
				let kind = &endpoint.kind;
				let mut sql = format!(
					"SELECT {} AS member FROM {} WHERE {} IN ({})",
					quote(kind.identity),
					quote(kind.table),
					quote(kind.identity),
					sql::placeholders(ids.len())
				);
				values.extend(ids.iter().cloned().map(SqlValue::Blob));
				if let (Some(scope_ref), Some(tenant)) = (kind.scope, scope.tenant()) {
					sql.push_str(&format!(" AND {} = ?", quote(scope_ref.column)));
					values.push(SqlValue::Blob(tenant.to_vec()));
				}
				sql
			}
			Presence::TenantMember => {
				let Some(tenant) = scope.tenant() else {
					return Ok(HashSet::new());
				};
				values.push(SqlValue::Blob(tenant.to_vec()));
				values.extend(ids.iter().cloned().map(SqlValue::Blob));
				format!(
					"SELECT user_id AS member FROM tenant_users WHERE tenant_id = ? AND user_id IN ({})",
					sql::placeholders(ids.len())
				)
			}
		};

		let rows = bind_all(sqlx::query(&sql), values)
			.fetch_all(&self.pool)
			.await?;
		let mut found = HashSet::with_capacity(rows.len());
		for row in rows {
			found.insert(row.try_get::<Vec<u8>, _>("member")?);
		}
		Ok(found)
	}

	async fn require_owner(&self, scope: Option<&str>, owner: &str) -> Result<(Scope, Vec<u8>), DbError> {
		let endpoint = &self.kind.owner;
		let not_found = || DbError::not_found(endpoint.kind.name, scope, owner);
		let resolved = self.resolve_scope(scope)?;
		let binary = identity::to_binary(owner).map_err(|_| not_found())?;
		let found = self
			.present(endpoint, &resolved, std::slice::from_ref(&binary))
			.await?;
		if found.contains(&binary) {
			Ok((resolved, binary))
		} else {
			Err(not_found())
		}
	}

	/// Number of members linked to `owner`. Malformed identities count zero.
	#[tracing::instrument(skip(self), fields(relationship = self.kind.name))]
	pub async fn count(&self, scope: Option<&str>, owner: &str) -> Result<i64, DbError> {
		let scope = self.resolve_scope(scope)?;
		let Ok(owner) = identity::to_binary(owner) else {
			return Ok(0);
		};
		self.count_where(self.join_conditions(JOIN_ALIAS, &scope, &owner))
			.await
	}

	#[tracing::instrument(skip(self), fields(relationship = self.kind.name))]
	pub async fn has(&self, scope: Option<&str>, owner: &str, member: &str) -> Result<bool, DbError> {
		let scope = self.resolve_scope(scope)?;
		let (Ok(owner), Ok(member)) = (identity::to_binary(owner), identity::to_binary(member)) else {
			return Ok(false);
		};
		let mut conn = self.pool.acquire().await?;
		self.is_linked(&mut *conn, &scope, &owner, &member).await
	}

	/// Whether the join row exists, read on `conn`.
	pub(crate) async fn is_linked(
		&self,
		conn: &mut SqliteConnection,
		scope: &Scope,
		owner: &[u8],
		member: &[u8],
	) -> Result<bool, DbError> {
		let mut conditions = self.join_conditions(JOIN_ALIAS, scope, owner);
		conditions.push(Condition::eq(
			JOIN_ALIAS,
			self.kind.member.column,
			Some(SqlValue::Blob(member.to_vec())),
		));
		Ok(self.count_where_on(conn, conditions).await? > 0)
	}

	/// Insert one join row, doing nothing if it already exists.
	pub(crate) async fn link(
		&self,
		conn: &mut SqliteConnection,
		scope: &Scope,
		owner: &[u8],
		member: &[u8],
	) -> Result<(), DbError> {
		let mut columns = vec![self.kind.owner.column, self.kind.member.column];
		let mut values = vec![SqlValue::Blob(owner.to_vec()), SqlValue::Blob(member.to_vec())];
		if let (Some(column), Some(tenant)) = (self.kind.scope_column, scope.tenant()) {
			columns.push(column);
			values.push(SqlValue::Blob(tenant.to_vec()));
		}
		columns.push("created_at");
		values.push(SqlValue::Text(sql::now()));

		let sql = format!(
			"INSERT OR IGNORE INTO {} ({}) VALUES ({})",
			quote(self.kind.table),
			columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
			sql::placeholders(values.len())
		);
		bind_all(sqlx::query(&sql), values).execute(conn).await?;
		Ok(())
	}

	/// Link every member to `owner`, or none of them.
	///
	/// Fails `NotFound` when the owner does not resolve and `BadRequest`
	/// naming the first member that is not valid in the scope. Members that
	/// are already linked are left as they are.
	#[tracing::instrument(skip(self), fields(relationship = self.kind.name))]
	pub async fn add(&self, scope: Option<&str>, owner: &str, members: &[&str]) -> Result<(), DbError> {
		let (resolved, owner_id) = self.require_owner(scope, owner).await?;

		let requested: Vec<(&str, Option<Vec<u8>>)> = members
			.iter()
			.map(|m| (*m, identity::to_binary(m).ok()))
			.collect();
		let candidates: Vec<Vec<u8>> = requested.iter().filter_map(|(_, b)| b.clone()).collect();
		let valid = self.present(&self.kind.member, &resolved, &candidates).await?;

		let mut tx = self.pool.begin().await?;
		let result = async {
			for (text, binary) in &requested {
				let Some(member) = binary.as_ref().filter(|b| valid.contains(*b)) else {
					return Err(DbError::bad_request(
						self.kind.name,
						scope,
						format!("'{text}' is not a valid {} member", self.kind.member.kind.name),
					));
				};
				self.link(&mut *tx, &resolved, &owner_id, member).await?;
			}
			Ok::<(), DbError>(())
		}
		.await;
		finish(tx, result).await?;

		tracing::debug!(
			relationship = self.kind.name,
			owner,
			count = members.len(),
			"members added"
		);
		let event = MutationEvent::builder(MutationAction::MembersAdded, self.kind.name)
			.scope(scope)
			.resource(owner)
			.members(members.iter().map(|m| m.to_string()))
			.build();
		self.notifier.notify(event).await;
		Ok(())
	}

	/// Refuse to unlink a tenant from its owner.
	async fn guard_tenant_owner(
		&self,
		conn: &mut SqliteConnection,
		owner: &[u8],
		members: &[Vec<u8>],
	) -> Result<(), DbError> {
		let Some(membership) = &self.kind.membership else {
			return Ok(());
		};
		if members.is_empty() {
			return Ok(());
		}
		let sql = match membership.tenant_side {
			Side::Owner => format!(
				"SELECT COUNT(*) AS count FROM tenants WHERE id = ? AND owner IN ({})",
				sql::placeholders(members.len())
			),
			Side::Member => format!(
				"SELECT COUNT(*) AS count FROM tenants WHERE owner = ? AND id IN ({})",
				sql::placeholders(members.len())
			),
		};
		let mut values = vec![SqlValue::Blob(owner.to_vec())];
		values.extend(members.iter().cloned().map(SqlValue::Blob));
		let row = bind_all(sqlx::query(&sql), values)
			.fetch_one(&mut *conn)
			.await?;
		if row.get::<i64, _>("count") > 0 {
			return Err(DbError::forbidden(
				self.kind.name,
				None,
				"the tenant owner cannot be removed from the tenant",
			));
		}
		Ok(())
	}

	/// Unlink every listed member from `owner` in one transaction.
	///
	/// Malformed member identities match nothing and are skipped. Removing a
	/// user from a tenant also clears their role and group assignments there.
	#[tracing::instrument(skip(self), fields(relationship = self.kind.name))]
	pub async fn remove(
		&self,
		scope: Option<&str>,
		owner: &str,
		members: &[&str],
	) -> Result<(), DbError> {
		let (resolved, owner_id) = self.require_owner(scope, owner).await?;
		let binaries: Vec<Vec<u8>> = members
			.iter()
			.filter_map(|m| identity::to_binary(m).ok())
			.collect();

		let mut owner_conditions = self.join_conditions(JOIN_ALIAS, &resolved, &owner_id);
		owner_conditions.push(Condition::new(
			format!("{JOIN_ALIAS}.{} = ?", quote(self.kind.member.column)),
			Vec::new(),
		));
		let clause = owner_conditions
			.iter()
			.map(|c| format!("({})", c.sql))
			.collect::<Vec<_>>()
			.join(" AND ");
		let delete_sql = format!(
			"DELETE FROM {} AS {JOIN_ALIAS} WHERE {clause}",
			quote(self.kind.table)
		);
		let base_values: Vec<SqlValue> = owner_conditions.into_iter().flat_map(|c| c.values).collect();

		// Owner check and deletes share one transaction.
		let mut tx = self.pool.begin().await?;
		let result = async {
			self.guard_tenant_owner(&mut *tx, &owner_id, &binaries).await?;
			for member in &binaries {
				let mut values = base_values.clone();
				values.push(SqlValue::Blob(member.clone()));
				bind_all(sqlx::query(&delete_sql), values)
					.execute(&mut *tx)
					.await?;

				if let Some(membership) = &self.kind.membership {
					let (tenant, user) = match membership.tenant_side {
						Side::Owner => (&owner_id, member),
						Side::Member => (member, &owner_id),
					};
					for table in &membership.cascade {
						let sql = format!(
							"DELETE FROM {} WHERE tenant_id = ? AND user_id = ?",
							quote(table)
						);
						bind_all(
							sqlx::query(&sql),
							vec![SqlValue::Blob(tenant.clone()), SqlValue::Blob(user.clone())],
						)
						.execute(&mut *tx)
						.await?;
					}
				}
			}
			Ok::<(), DbError>(())
		}
		.await;
		finish(tx, result).await?;

		tracing::debug!(
			relationship = self.kind.name,
			owner,
			count = members.len(),
			"members removed"
		);
		let event = MutationEvent::builder(MutationAction::MembersRemoved, self.kind.name)
			.scope(scope)
			.resource(owner)
			.members(members.iter().map(|m| m.to_string()))
			.build();
		self.notifier.notify(event).await;
		Ok(())
	}

	/// List the member resources linked to `owner`.
	#[tracing::instrument(skip(self, query), fields(relationship = self.kind.name))]
	pub async fn get_collection(
		&self,
		scope: Option<&str>,
		owner: &str,
		query: &CollectionQuery,
	) -> Result<Collection, DbError> {
		let (resolved, owner_id) = self.require_owner(scope, owner).await?;
		let member = &self.kind.member.kind;
		let source = CollectionSource {
			kind: self.kind.name,
			scope,
			from: format!(
				"{} AS {MEMBER_ALIAS} JOIN {} AS {JOIN_ALIAS} ON {JOIN_ALIAS}.{} = {MEMBER_ALIAS}.{}",
				quote(member.table),
				quote(self.kind.table),
				quote(self.kind.member.column),
				quote(member.identity)
			),
			alias: MEMBER_ALIAS,
			columns: member.selectable_columns(),
			identity: member.identity,
			conditions: self.join_conditions(JOIN_ALIAS, &resolved, &owner_id),
		};
		let collection = collection::fetch(&self.pool, source, query, &self.policy).await?;

		let event = MutationEvent::builder(MutationAction::Read, self.kind.name)
			.scope(scope)
			.resource(owner)
			.members(collection.ids(member.identity))
			.build();
		self.notifier.notify(event).await;
		Ok(collection)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::TestDirectory;
	use tenancy_core::ErrorKind;

	#[tokio::test]
	async fn test_add_with_foreign_member_persists_nothing() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let (other, _) = dir.tenant("other").await;
		let role = dir.role(&tenant, "admin").await;
		let p1 = dir.permission(&tenant, "read").await;
		let p2 = dir.permission(&other, "write").await;
		dir.notifier.clear();

		let rel = dir.role_permissions();
		let err = rel
			.add(Some(&tenant), &role, &[p1.as_str(), p2.as_str()])
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::BadRequest);
		assert!(err.to_string().contains(&p2));
		assert!(!rel.has(Some(&tenant), &role, &p1).await.unwrap());
		assert_eq!(rel.count(Some(&tenant), &role).await.unwrap(), 0);
		assert!(dir.notifier.events().is_empty());
	}

	#[tokio::test]
	async fn test_add_with_malformed_member_persists_nothing() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "admin").await;
		let p1 = dir.permission(&tenant, "read").await;

		let rel = dir.role_permissions();
		let err = rel
			.add(Some(&tenant), &role, &[p1.as_str(), "garbage"])
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::BadRequest);
		assert_eq!(rel.count(Some(&tenant), &role).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_add_is_idempotent() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "admin").await;
		let p1 = dir.permission(&tenant, "read").await;
		dir.notifier.clear();

		let rel = dir.role_permissions();
		rel.add(Some(&tenant), &role, &[p1.as_str()]).await.unwrap();
		rel.add(Some(&tenant), &role, &[p1.as_str()]).await.unwrap();
		assert_eq!(rel.count(Some(&tenant), &role).await.unwrap(), 1);

		let events = dir.notifier.events();
		assert_eq!(events.len(), 2);
		assert!(events.iter().all(|e| e.action == MutationAction::MembersAdded));
		assert_eq!(events[1].member_ids, vec![p1]);
	}

	#[tokio::test]
	async fn test_missing_owner_is_not_found() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let (other, _) = dir.tenant("other").await;
		let foreign_role = dir.role(&other, "admin").await;
		let p1 = dir.permission(&tenant, "read").await;

		let rel = dir.role_permissions();
		for owner in [foreign_role.as_str(), "garbage"] {
			let err = rel.add(Some(&tenant), owner, &[p1.as_str()]).await.unwrap_err();
			assert_eq!(err.kind(), ErrorKind::NotFound);
			let err = rel.remove(Some(&tenant), owner, &[p1.as_str()]).await.unwrap_err();
			assert_eq!(err.kind(), ErrorKind::NotFound);
		}
		assert_eq!(rel.count(Some(&tenant), "garbage").await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_role_users_require_tenant_membership() {
		let dir = TestDirectory::new().await;
		let (tenant, owner) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "admin").await;
		let outsider = dir.user("outsider@example.com").await;

		let rel = dir.role_users();
		let err = rel
			.add(Some(&tenant), &role, &[outsider.as_str()])
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::BadRequest);

		rel.add(Some(&tenant), &role, &[owner.as_str()]).await.unwrap();
		assert!(dir.user_roles().has(Some(&tenant), &owner, &role).await.unwrap());
	}

	#[tokio::test]
	async fn test_remove_skips_malformed_members() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "admin").await;
		let p1 = dir.permission(&tenant, "read").await;
		let p2 = dir.permission(&tenant, "write").await;

		let rel = dir.role_permissions();
		rel.add(Some(&tenant), &role, &[p1.as_str(), p2.as_str()])
			.await
			.unwrap();
		rel.remove(Some(&tenant), &role, &[p1.as_str(), "garbage"])
			.await
			.unwrap();
		assert!(!rel.has(Some(&tenant), &role, &p1).await.unwrap());
		assert!(rel.has(Some(&tenant), &role, &p2).await.unwrap());
	}

	#[tokio::test]
	async fn test_removing_tenant_owner_is_forbidden() {
		let dir = TestDirectory::new().await;
		let (tenant, owner) = dir.tenant("acme").await;
		let member = dir.user("member@example.com").await;
		let rel = dir.tenant_users();
		rel.add(None, &tenant, &[member.as_str()]).await.unwrap();

		let err = rel
			.remove(None, &tenant, &[member.as_str(), owner.as_str()])
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Forbidden);
		assert!(rel.has(None, &tenant, &owner).await.unwrap());
		assert!(rel.has(None, &tenant, &member).await.unwrap());

		let err = dir
			.user_tenants()
			.remove(None, &owner, &[tenant.as_str()])
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Forbidden);
		assert!(rel.has(None, &tenant, &owner).await.unwrap());
	}

	#[tokio::test]
	async fn test_owner_guard_reads_inside_the_transaction() {
		let dir = TestDirectory::new().await;
		let (tenant, owner) = dir.tenant("acme").await;
		let member = dir.user("member@example.com").await;
		let rel = dir.tenant_users();
		rel.add(None, &tenant, &[member.as_str()]).await.unwrap();

		let tenant_id = identity::to_binary(&tenant).unwrap();
		let owner_id = identity::to_binary(&owner).unwrap();
		let member_id = identity::to_binary(&member).unwrap();

		let mut tx = dir.pool.begin().await.unwrap();
		sqlx::query("UPDATE tenants SET owner = ? WHERE id = ?")
			.bind(&member_id)
			.bind(&tenant_id)
			.execute(&mut *tx)
			.await
			.unwrap();
		let err = rel
			.guard_tenant_owner(&mut *tx, &tenant_id, &[member_id.clone()])
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Forbidden);
		rel.guard_tenant_owner(&mut *tx, &tenant_id, &[owner_id])
			.await
			.unwrap();
		tx.rollback().await.unwrap();

		let err = rel
			.remove(None, &tenant, &[owner.as_str()])
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Forbidden);
		rel.remove(None, &tenant, &[member.as_str()]).await.unwrap();
		assert!(!rel.has(None, &tenant, &member).await.unwrap());
	}

	#[tokio::test]
	async fn test_leaving_tenant_clears_assignments() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let member = dir.user("member@example.com").await;
		let role = dir.role(&tenant, "admin").await;
		let group = dir.group(&tenant, "ops").await;

		dir.tenant_users().add(None, &tenant, &[member.as_str()]).await.unwrap();
		dir.user_roles().add(Some(&tenant), &member, &[role.as_str()]).await.unwrap();
		dir.user_groups().add(Some(&tenant), &member, &[group.as_str()]).await.unwrap();

		dir.user_tenants().remove(None, &member, &[tenant.as_str()]).await.unwrap();

		assert!(!dir.tenant_users().has(None, &tenant, &member).await.unwrap());
		assert_eq!(dir.role_users().count(Some(&tenant), &role).await.unwrap(), 0);
		assert_eq!(dir.group_users().count(Some(&tenant), &group).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_collection_lists_members_through_join() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "admin").await;
		let p1 = dir.permission(&tenant, "read").await;
		dir.permission(&tenant, "write").await;
		dir.role_permissions()
			.add(Some(&tenant), &role, &[p1.as_str()])
			.await
			.unwrap();
		dir.notifier.clear();

		let collection = dir
			.role_permissions()
			.get_collection(Some(&tenant), &role, &CollectionQuery::default())
			.await
			.unwrap();
		assert_eq!(collection.pagination.total, 1);
		assert_eq!(collection.ids("id"), vec![p1.clone()]);

		let events = dir.notifier.events();
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].action, MutationAction::Read);
		assert_eq!(events[0].member_ids, vec![p1]);
	}

	#[tokio::test]
	async fn test_scoped_relationship_requires_scope() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "admin").await;
		let err = dir.role_permissions().count(None, &role).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::BadRequest);
	}
}
