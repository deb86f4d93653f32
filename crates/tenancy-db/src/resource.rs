// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The scoped resource engine.
//!
//! One repository serves every entity kind; the [`ResourceKind`] descriptor
//! supplies the table, identity, scope, columns and attribute contract.
//! Every lookup filters on both the identity and the scope, so an identity
//! that is valid in one scope never resolves in another.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Row;
use tenancy_audit::{redact_attributes, MutationAction, MutationEvent, MutationNotifier};
use tenancy_config::PolicyConfig;
use tenancy_core::attributes::normalize_email;
use tenancy_core::{identity, Attributes, Rule, ValidationError};

use crate::collection::{self, Collection, CollectionQuery, CollectionSource, Condition};
use crate::error::DbError;
use crate::kind::{encode_scope, Column, ColumnType, IdentityStrategy, Record, ResourceKind};
use crate::password;
use crate::pool::finish;
use crate::sql::{self, bind_all, quote, SqlValue};

/// Alias of the kind's table in every generated query.
pub(crate) const ALIAS: &str = "t";

#[async_trait]
pub trait ResourceStore: Send + Sync {
	async fn count(&self, scope: Option<&str>) -> Result<i64, DbError>;
	async fn exists(&self, scope: Option<&str>, id: &str) -> Result<bool, DbError>;
	async fn name_exists(
		&self,
		scope: Option<&str>,
		name: &str,
		exclude_id: Option<&str>,
	) -> Result<bool, DbError>;
	async fn create(&self, scope: Option<&str>, attrs: Attributes) -> Result<String, DbError>;
	async fn get(&self, scope: Option<&str>, id: &str, columns: &[&str]) -> Result<Record, DbError>;
	async fn get_collection(
		&self,
		scope: Option<&str>,
		query: &CollectionQuery,
	) -> Result<Collection, DbError>;
	async fn update(&self, scope: Option<&str>, id: &str, attrs: Attributes) -> Result<(), DbError>;
	async fn delete(&self, scope: Option<&str>, id: &str) -> Result<(), DbError>;
}

#[async_trait]
impl ResourceStore for ResourceRepository {
	async fn count(&self, scope: Option<&str>) -> Result<i64, DbError> {
		self.count(scope).await
	}

	async fn exists(&self, scope: Option<&str>, id: &str) -> Result<bool, DbError> {
		self.exists(scope, id).await
	}

	async fn name_exists(
		&self,
		scope: Option<&str>,
		name: &str,
		exclude_id: Option<&str>,
	) -> Result<bool, DbError> {
		self.name_exists(scope, name, exclude_id).await
	}

	async fn create(&self, scope: Option<&str>, attrs: Attributes) -> Result<String, DbError> {
		self.create(scope, attrs).await
	}

	async fn get(&self, scope: Option<&str>, id: &str, columns: &[&str]) -> Result<Record, DbError> {
		self.get(scope, id, columns).await
	}

	async fn get_collection(
		&self,
		scope: Option<&str>,
		query: &CollectionQuery,
	) -> Result<Collection, DbError> {
		self.get_collection(scope, query).await
	}

	async fn update(&self, scope: Option<&str>, id: &str, attrs: Attributes) -> Result<(), DbError> {
		self.update(scope, id, attrs).await
	}

	async fn delete(&self, scope: Option<&str>, id: &str) -> Result<(), DbError> {
		self.delete(scope, id).await
	}
}

/// A validated row ready to insert, produced by [`ResourceRepository::prepare_create`].
#[derive(Debug, Clone)]
pub(crate) struct PreparedInsert {
	pub id: String,
	pub scope: Option<String>,
	columns: Vec<&'static str>,
	values: Vec<SqlValue>,
	audit: Record,
}

impl PreparedInsert {
	fn push(&mut self, column: &Column, value: SqlValue, audit: Value) {
		self.columns.push(column.name);
		self.values.push(value);
		self.audit.insert(column.name.to_string(), audit);
	}

	fn has(&self, column: &str) -> bool {
		self.columns.iter().any(|c| *c == column)
	}
}

/// A validated partial update, produced by [`ResourceRepository::prepare_update`].
#[derive(Debug, Clone)]
pub(crate) struct PreparedUpdate {
	pub id: String,
	pub scope: Option<String>,
	changed: Vec<String>,
	sql: String,
	values: Vec<SqlValue>,
}

/// Generic repository for one entity kind.
#[derive(Clone)]
pub struct ResourceRepository {
	pool: SqlitePool,
	kind: Arc<ResourceKind>,
	notifier: Arc<dyn MutationNotifier>,
	policy: Arc<PolicyConfig>,
}

impl ResourceRepository {
	pub fn new(
		pool: SqlitePool,
		kind: Arc<ResourceKind>,
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

	pub fn kind(&self) -> &ResourceKind {
		&self.kind
	}

	pub(crate) fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	fn table(&self) -> String {
		format!("{} AS {ALIAS}", quote(self.kind.table))
	}

	fn invalid(&self, scope: Option<&str>, e: ValidationError) -> DbError {
		DbError::bad_request(self.kind.name, scope, e.to_string())
	}

	/// Scope predicate for this kind. Unscoped kinds ignore `scope`.
	fn scope_condition(&self, scope: Option<&str>) -> Result<Option<Condition>, DbError> {
		let Some(scope_ref) = self.kind.scope else {
			return Ok(None);
		};
		let Some(scope) = scope else {
			return Err(DbError::bad_request(
				self.kind.name,
				None,
				format!("{} requires a {} scope", self.kind.name, scope_ref.kind),
			));
		};
		Ok(Some(Condition::eq(ALIAS, scope_ref.column, encode_scope(scope))))
	}

	/// Scope and identity predicates for one row.
	fn row_conditions(&self, scope: Option<&str>, id: &str) -> Result<Vec<Condition>, DbError> {
		let mut conditions: Vec<Condition> = self.scope_condition(scope)?.into_iter().collect();
		conditions.push(Condition::eq(ALIAS, self.kind.identity, self.kind.encode_id(id)));
		Ok(conditions)
	}

	fn where_clause(conditions: Vec<Condition>) -> (String, Vec<SqlValue>) {
		if conditions.is_empty() {
			return ("1".to_string(), Vec::new());
		}
		let sql = conditions
			.iter()
			.map(|c| format!("({})", c.sql))
			.collect::<Vec<_>>()
			.join(" AND ");
		(sql, conditions.into_iter().flat_map(|c| c.values).collect())
	}

	async fn count_where(&self, conditions: Vec<Condition>) -> Result<i64, DbError> {
		let (clause, values) = Self::where_clause(conditions);
		let sql = format!("SELECT COUNT(*) AS count FROM {} WHERE {clause}", self.table());
		let row = bind_all(sqlx::query(&sql), values)
			.fetch_one(&self.pool)
			.await?;
		Ok(row.get("count"))
	}

	#[tracing::instrument(skip(self), fields(kind = self.kind.name))]
	pub async fn count(&self, scope: Option<&str>) -> Result<i64, DbError> {
		self.count_with(scope, Vec::new()).await
	}

	pub(crate) async fn count_with(
		&self,
		scope: Option<&str>,
		extra: Vec<Condition>,
	) -> Result<i64, DbError> {
		let mut conditions: Vec<Condition> = self.scope_condition(scope)?.into_iter().collect();
		conditions.extend(extra);
		self.count_where(conditions).await
	}

	/// Malformed identities do not exist.
	#[tracing::instrument(skip(self), fields(kind = self.kind.name))]
	pub async fn exists(&self, scope: Option<&str>, id: &str) -> Result<bool, DbError> {
		let conditions = self.row_conditions(scope, id)?;
		Ok(self.count_where(conditions).await? > 0)
	}

	/// Whether `name` is taken in the kind's unique column (its identity when
	/// it has none), ignoring the row identified by `exclude_id`.
	#[tracing::instrument(skip(self), fields(kind = self.kind.name))]
	pub async fn name_exists(
		&self,
		scope: Option<&str>,
		name: &str,
		exclude_id: Option<&str>,
	) -> Result<bool, DbError> {
		let column_name = self.kind.unique.unwrap_or(self.kind.identity);
		let Some(column) = self.kind.column(column_name).copied() else {
			return Err(DbError::Internal(format!(
				"{} has no column '{column_name}'",
				self.kind.name
			)));
		};
		let name = if self.kind.contract.rule(column.name).is_some_and(Rule::is_email) {
			normalize_email(name)
		} else {
			name.to_string()
		};

		let mut conditions: Vec<Condition> = self.scope_condition(scope)?.into_iter().collect();
		conditions.push(Condition::eq(
			ALIAS,
			column.name,
			sql::encode(self.kind.name, &column, &Value::String(name)).ok(),
		));
		if let Some(value) = exclude_id.and_then(|id| self.kind.encode_id(id)) {
			conditions.push(Condition::new(
				format!("{ALIAS}.{} <> ?", quote(self.kind.identity)),
				vec![value],
			));
		}
		Ok(self.count_where(conditions).await? > 0)
	}

	/// `NotFound` when `scope` names a missing parent.
	pub(crate) async fn scope_exists(&self, scope: Option<&str>) -> Result<(), DbError> {
		let (Some(scope_ref), Some(scope_id)) = (self.kind.scope, scope) else {
			return Ok(());
		};
		let found = match encode_scope(scope_id) {
			Some(value) => {
				let sql = format!(
					"SELECT COUNT(*) AS count FROM {} WHERE id = ?",
					quote(scope_ref.table)
				);
				let row = bind_all(sqlx::query(&sql), vec![value])
					.fetch_one(&self.pool)
					.await?;
				row.get::<i64, _>("count") > 0
			}
			None => false,
		};
		if found {
			Ok(())
		} else {
			Err(DbError::not_found(scope_ref.kind, None, scope_id))
		}
	}

	fn encode_attribute(&self, column: &Column, value: &Value) -> Result<SqlValue, DbError> {
		match (column.ty, value) {
			(ColumnType::Password, Value::String(plain)) => {
				Ok(SqlValue::Text(password::hash_password(plain)?))
			}
			_ => sql::encode(self.kind.name, column, value),
		}
	}

	fn column_for(&self, name: &str) -> Result<Column, DbError> {
		self.kind.column(name).copied().ok_or_else(|| {
			DbError::Internal(format!("{} has no column '{name}'", self.kind.name))
		})
	}

	/// Validate `attrs`, run the existence and uniqueness pre-checks and
	/// build the row. `system` carries engine-produced columns that bypass
	/// the attribute contract.
	pub(crate) async fn prepare_create(
		&self,
		scope: Option<&str>,
		mut attrs: Attributes,
		system: Attributes,
	) -> Result<PreparedInsert, DbError> {
		let kind = &self.kind;
		kind.contract.normalize(&mut attrs);
		kind.contract
			.validate_create(&attrs)
			.map_err(|e| self.invalid(scope, e))?;
		self.scope_condition(scope)?;
		self.scope_exists(scope).await?;

		let id = match kind.strategy {
			IdentityStrategy::Uuid => identity::new_identity().0,
			IdentityStrategy::Natural | IdentityStrategy::ShortKey => attrs
				.get(kind.identity)
				.or_else(|| system.get(kind.identity))
				.and_then(Value::as_str)
				.map(str::to_string)
				.ok_or_else(|| {
					DbError::bad_request(kind.name, scope, format!("{} is required", kind.identity))
				})?,
		};

		if let Some(unique) = kind.unique {
			if let Some(value) = attrs.get(unique).and_then(Value::as_str) {
				if self.name_exists(scope, value, None).await? {
					return Err(DbError::conflict(
						kind.name,
						scope,
						format!("{} with {unique} '{value}' already exists", kind.name),
					));
				}
			}
		}
		if kind.strategy != IdentityStrategy::Uuid && self.exists(scope, &id).await? {
			return Err(DbError::conflict(
				kind.name,
				scope,
				format!("{} '{id}' already exists", kind.name),
			));
		}

		let mut prepared = PreparedInsert {
			id: id.clone(),
			scope: scope.map(str::to_string),
			columns: Vec::new(),
			values: Vec::new(),
			audit: Record::new(),
		};

		if kind.strategy == IdentityStrategy::Uuid {
			let column = kind.identity_column();
			let value = Value::String(id);
			prepared.push(&column, sql::encode(kind.name, &column, &value)?, value);
		}
		if let (Some(scope_ref), Some(scope_id)) = (kind.scope, scope) {
			let column = self.column_for(scope_ref.column)?;
			let value = Value::String(scope_id.to_string());
			prepared.push(&column, sql::encode(kind.name, &column, &value)?, value);
		}
		for (name, value) in attrs.iter().chain(system.iter()) {
			if prepared.has(name) {
				continue;
			}
			let column = self.column_for(name)?;
			prepared.push(&column, self.encode_attribute(&column, value)?, value.clone());
		}
		let now = Value::String(sql::now());
		for name in ["created_at", "updated_at"] {
			if let Some(column) = kind.column(name).copied() {
				if !prepared.has(name) {
					let encoded = sql::encode(kind.name, &column, &now)?;
					prepared.push(&column, encoded, now.clone());
				}
			}
		}
		redact_attributes(&mut prepared.audit, &kind.secret_columns());

		Ok(prepared)
	}

	/// Insert a prepared row on `conn`, translating unique violations.
	pub(crate) async fn insert(
		&self,
		conn: &mut SqliteConnection,
		prepared: &PreparedInsert,
	) -> Result<(), DbError> {
		let columns = prepared
			.columns
			.iter()
			.map(|c| quote(c))
			.collect::<Vec<_>>()
			.join(", ");
		let sql = format!(
			"INSERT INTO {} ({columns}) VALUES ({})",
			quote(self.kind.table),
			sql::placeholders(prepared.values.len())
		);
		bind_all(sqlx::query(&sql), prepared.values.clone())
			.execute(conn)
			.await
			.map_err(|e| DbError::from_write(e, self.kind.name, prepared.scope.as_deref()))?;
		Ok(())
	}

	pub(crate) async fn notify_created(&self, prepared: PreparedInsert) {
		let event = MutationEvent::builder(MutationAction::Created, self.kind.name)
			.scope(prepared.scope.as_deref())
			.resource(prepared.id)
			.after(Value::Object(prepared.audit))
			.build();
		self.notifier.notify(event).await;
	}

	/// Create a resource and return its identity.
	#[tracing::instrument(skip(self, attrs), fields(kind = self.kind.name))]
	pub async fn create(&self, scope: Option<&str>, attrs: Attributes) -> Result<String, DbError> {
		self.create_with(scope, attrs, Attributes::new()).await
	}

	pub(crate) async fn create_with(
		&self,
		scope: Option<&str>,
		attrs: Attributes,
		system: Attributes,
	) -> Result<String, DbError> {
		let prepared = self.prepare_create(scope, attrs, system).await?;
		{
			let mut conn = self.pool.acquire().await?;
			self.insert(&mut *conn, &prepared).await?;
		}
		let id = prepared.id.clone();
		tracing::debug!(kind = self.kind.name, id = %id, "resource created");
		self.notify_created(prepared).await;
		Ok(id)
	}

	fn select_list(columns: &[Column]) -> String {
		columns
			.iter()
			.map(|c| format!("{ALIAS}.{} AS {}", quote(c.name), quote(c.name)))
			.collect::<Vec<_>>()
			.join(", ")
	}

	async fn fetch_columns(
		&self,
		conn: &mut SqliteConnection,
		scope: Option<&str>,
		id: &str,
		columns: &[Column],
	) -> Result<Option<Record>, DbError> {
		let (clause, values) = Self::where_clause(self.row_conditions(scope, id)?);
		let sql = format!(
			"SELECT {} FROM {} WHERE {clause}",
			Self::select_list(columns),
			self.table()
		);
		let row = bind_all(sqlx::query(&sql), values)
			.fetch_optional(&mut *conn)
			.await?;
		let Some(row) = row else {
			return Ok(None);
		};
		let mut record = Record::new();
		for column in columns {
			record.insert(column.name.to_string(), sql::decode(&row, column)?);
		}
		Ok(Some(record))
	}

	/// Every selectable column of one row.
	pub(crate) async fn fetch_record(
		&self,
		scope: Option<&str>,
		id: &str,
	) -> Result<Option<Record>, DbError> {
		let mut conn = self.pool.acquire().await?;
		self.fetch_record_on(&mut *conn, scope, id).await
	}

	async fn fetch_record_on(
		&self,
		conn: &mut SqliteConnection,
		scope: Option<&str>,
		id: &str,
	) -> Result<Option<Record>, DbError> {
		self.fetch_columns(conn, scope, id, &self.kind.selectable_columns())
			.await
	}

	/// Fetch one resource. An empty `columns` selects every selectable
	/// column; the identity column is always included.
	#[tracing::instrument(skip(self), fields(kind = self.kind.name))]
	pub async fn get(
		&self,
		scope: Option<&str>,
		id: &str,
		columns: &[&str],
	) -> Result<Record, DbError> {
		let selected = if columns.is_empty() {
			self.kind.selectable_columns()
		} else {
			let mut selected = vec![self.kind.identity_column()];
			for name in columns {
				let column = self
					.kind
					.column(name)
					.copied()
					.filter(Column::selectable)
					.ok_or_else(|| {
						DbError::bad_request(self.kind.name, scope, format!("unknown field '{name}'"))
					})?;
				if !selected.contains(&column) {
					selected.push(column);
				}
			}
			selected
		};

		let mut conn = self.pool.acquire().await?;
		self.fetch_columns(&mut *conn, scope, id, &selected)
			.await?
			.ok_or_else(|| DbError::not_found(self.kind.name, scope, id))
	}

	/// List resources in a scope, with caller conditions added to the
	/// scope predicate.
	pub(crate) async fn collection_with(
		&self,
		scope: Option<&str>,
		query: &CollectionQuery,
		extra: Vec<Condition>,
	) -> Result<Collection, DbError> {
		let mut conditions: Vec<Condition> = self.scope_condition(scope)?.into_iter().collect();
		conditions.extend(extra);
		let source = CollectionSource {
			kind: self.kind.name,
			scope,
			from: self.table(),
			alias: ALIAS,
			columns: self.kind.selectable_columns(),
			identity: self.kind.identity,
			conditions,
		};
		let collection = collection::fetch(&self.pool, source, query, &self.policy).await?;

		let event = MutationEvent::builder(MutationAction::Read, self.kind.name)
			.scope(scope)
			.resources(collection.ids(self.kind.identity))
			.build();
		self.notifier.notify(event).await;
		Ok(collection)
	}

	#[tracing::instrument(skip(self, query), fields(kind = self.kind.name))]
	pub async fn get_collection(
		&self,
		scope: Option<&str>,
		query: &CollectionQuery,
	) -> Result<Collection, DbError> {
		self.collection_with(scope, query, Vec::new()).await
	}

	/// Validate a partial update and build its statement. `None` when
	/// `attrs` is empty.
	pub(crate) async fn prepare_update(
		&self,
		scope: Option<&str>,
		id: &str,
		mut attrs: Attributes,
	) -> Result<Option<PreparedUpdate>, DbError> {
		if attrs.is_empty() {
			return Ok(None);
		}
		let kind = &self.kind;
		kind.contract.normalize(&mut attrs);
		kind.contract
			.validate_update(&attrs)
			.map_err(|e| self.invalid(scope, e))?;
		if attrs.contains_key(kind.identity) {
			return Err(DbError::bad_request(
				kind.name,
				scope,
				format!("{} cannot be changed", kind.identity),
			));
		}
		if !self.exists(scope, id).await? {
			return Err(DbError::not_found(kind.name, scope, id));
		}

		if let Some(unique) = kind.unique {
			if let Some(value) = attrs.get(unique).and_then(Value::as_str) {
				if self.name_exists(scope, value, Some(id)).await? {
					return Err(DbError::conflict(
						kind.name,
						scope,
						format!("{} with {unique} '{value}' already exists", kind.name),
					));
				}
			}
		}

		let mut assignments = Vec::with_capacity(attrs.len() + 1);
		let mut values = Vec::with_capacity(attrs.len() + 1);
		for (name, value) in &attrs {
			let column = self.column_for(name)?;
			assignments.push(format!("{} = ?", quote(column.name)));
			values.push(self.encode_attribute(&column, value)?);
		}
		if kind.column("updated_at").is_some() {
			assignments.push(format!("{} = ?", quote("updated_at")));
			values.push(SqlValue::Text(sql::now()));
		}

		let (clause, condition_values) = Self::where_clause(self.row_conditions(scope, id)?);
		values.extend(condition_values);
		let sql = format!(
			"UPDATE {} AS {ALIAS} SET {} WHERE {clause}",
			quote(kind.table),
			assignments.join(", ")
		);
		Ok(Some(PreparedUpdate {
			id: id.to_string(),
			scope: scope.map(str::to_string),
			changed: attrs.keys().cloned().collect(),
			sql,
			values,
		}))
	}

	/// Run a prepared update on `conn`, returning the row before and after.
	pub(crate) async fn apply_update(
		&self,
		conn: &mut SqliteConnection,
		prepared: &PreparedUpdate,
	) -> Result<(Record, Record), DbError> {
		let kind = &self.kind;
		let scope = prepared.scope.as_deref();
		let before = self
			.fetch_record_on(&mut *conn, scope, &prepared.id)
			.await?
			.ok_or_else(|| DbError::not_found(kind.name, scope, &prepared.id))?;
		bind_all(sqlx::query(&prepared.sql), prepared.values.clone())
			.execute(&mut *conn)
			.await
			.map_err(|e| DbError::from_write(e, kind.name, scope))?;
		let after = self
			.fetch_record_on(&mut *conn, scope, &prepared.id)
			.await?
			.ok_or_else(|| DbError::not_found(kind.name, scope, &prepared.id))?;
		Ok((before, after))
	}

	pub(crate) async fn notify_updated(&self, prepared: PreparedUpdate, before: Record, after: Record) {
		let secrets = self.kind.secret_columns();
		let changed: Vec<String> = prepared
			.changed
			.into_iter()
			.filter(|name| {
				secrets.iter().any(|s| *s == name.as_str()) || before.get(name) != after.get(name)
			})
			.collect();

		tracing::debug!(kind = self.kind.name, id = %prepared.id, changed = ?changed, "resource updated");
		let event = MutationEvent::builder(MutationAction::Updated, self.kind.name)
			.scope(prepared.scope.as_deref())
			.resource(prepared.id)
			.before(Value::Object(before))
			.after(Value::Object(after))
			.changed(changed)
			.build();
		self.notifier.notify(event).await;
	}

	/// Apply a partial update. An empty `attrs` is a no-op.
	///
	/// The row is read, written and read back in one transaction so the
	/// event describes exactly this write.
	#[tracing::instrument(skip(self, attrs), fields(kind = self.kind.name))]
	pub async fn update(&self, scope: Option<&str>, id: &str, attrs: Attributes) -> Result<(), DbError> {
		let Some(prepared) = self.prepare_update(scope, id, attrs).await? else {
			return Ok(());
		};
		let mut tx = self.pool.begin().await?;
		let result = self.apply_update(&mut *tx, &prepared).await;
		let (before, after) = finish(tx, result).await?;
		self.notify_updated(prepared, before, after).await;
		Ok(())
	}

	/// Delete one row and its dependents on `conn`, returning the row as it
	/// was.
	pub(crate) async fn delete_on(
		&self,
		conn: &mut SqliteConnection,
		scope: Option<&str>,
		id: &str,
	) -> Result<Record, DbError> {
		let kind = &self.kind;
		let before = self
			.fetch_record_on(&mut *conn, scope, id)
			.await?
			.ok_or_else(|| DbError::not_found(kind.name, scope, id))?;
		let encoded = kind
			.encode_id(id)
			.ok_or_else(|| DbError::not_found(kind.name, scope, id))?;

		for dependent in &kind.dependents {
			let sql = format!(
				"DELETE FROM {} WHERE {} = ?",
				quote(dependent.table),
				quote(dependent.column)
			);
			bind_all(sqlx::query(&sql), vec![encoded.clone()])
				.execute(&mut *conn)
				.await?;
		}
		let (clause, values) = Self::where_clause(self.row_conditions(scope, id)?);
		let sql = format!("DELETE FROM {} AS {ALIAS} WHERE {clause}", quote(kind.table));
		bind_all(sqlx::query(&sql), values).execute(&mut *conn).await?;
		Ok(before)
	}

	pub(crate) async fn notify_deleted(&self, scope: Option<&str>, id: &str, before: Record) {
		tracing::debug!(kind = self.kind.name, id, "resource deleted");
		let event = MutationEvent::builder(MutationAction::Deleted, self.kind.name)
			.scope(scope)
			.resource(id)
			.before(Value::Object(before))
			.build();
		self.notifier.notify(event).await;
	}

	/// Delete a resource and every dependent row in one transaction.
	#[tracing::instrument(skip(self), fields(kind = self.kind.name))]
	pub async fn delete(&self, scope: Option<&str>, id: &str) -> Result<(), DbError> {
		let mut tx = self.pool.begin().await?;
		let result = self.delete_on(&mut *tx, scope, id).await;
		let before = finish(tx, result).await?;
		self.notify_deleted(scope, id, before).await;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::collection::FilterOp;
	use crate::testing::{attrs, TestDirectory};
	use serde_json::json;
	use tenancy_core::ErrorKind;

	#[tokio::test]
	async fn test_create_then_get() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;

		let id = dir
			.roles()
			.create(Some(&tenant), attrs(json!({"name": "admin", "description": "all"})))
			.await
			.unwrap();
		assert!(identity::is_valid(&id));
		assert_eq!(dir.roles().count(Some(&tenant)).await.unwrap(), 1);

		let record = dir.roles().get(Some(&tenant), &id, &[]).await.unwrap();
		assert_eq!(record["id"], json!(id));
		assert_eq!(record["tenant_id"], json!(tenant));
		assert_eq!(record["name"], json!("admin"));
		assert!(record["created_at"].is_string());
	}

	#[tokio::test]
	async fn test_get_forces_identity_column() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let id = dir.role(&tenant, "admin").await;

		let record = dir.roles().get(Some(&tenant), &id, &["name"]).await.unwrap();
		assert_eq!(record.len(), 2);
		assert_eq!(record["id"], json!(id));

		let user = dir.user("a@example.com").await;
		let err = dir.users().get(&user, &["password"]).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::BadRequest);
	}

	#[tokio::test]
	async fn test_scope_isolation() {
		let dir = TestDirectory::new().await;
		let (tenant_a, _) = dir.tenant("a").await;
		let (tenant_b, _) = dir.tenant("b").await;
		let role = dir.role(&tenant_a, "admin").await;

		let err = dir.roles().get(Some(&tenant_b), &role, &[]).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);
		assert!(!dir.roles().exists(Some(&tenant_b), &role).await.unwrap());
		assert!(dir.roles().exists(Some(&tenant_a), &role).await.unwrap());

		let err = dir.roles().delete(Some(&tenant_b), &role).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);
	}

	#[tokio::test]
	async fn test_malformed_identity_does_not_exist() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;

		assert!(!dir.roles().exists(Some(&tenant), "not-a-uuid").await.unwrap());
		let err = dir.roles().get(Some(&tenant), "not-a-uuid", &[]).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);
		let err = dir
			.roles()
			.create(Some("not-a-uuid"), attrs(json!({"name": "x"})))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);
	}

	#[tokio::test]
	async fn test_create_validates_before_touching_storage() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		dir.notifier.clear();

		for input in [
			json!({}),
			json!({"name": "x", "colour": "red"}),
			json!({"name": 7}),
		] {
			let err = dir.roles().create(Some(&tenant), attrs(input)).await.unwrap_err();
			assert_eq!(err.kind(), ErrorKind::BadRequest);
		}
		let err = dir.roles().create(None, attrs(json!({"name": "x"}))).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::BadRequest);

		assert_eq!(dir.roles().count(Some(&tenant)).await.unwrap(), 0);
		assert!(dir.notifier.events().is_empty());
	}

	#[tokio::test]
	async fn test_create_in_missing_scope_is_not_found() {
		let dir = TestDirectory::new().await;
		let (missing, _) = identity::new_identity();
		let err = dir
			.roles()
			.create(Some(&missing), attrs(json!({"name": "x"})))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);
	}

	#[tokio::test]
	async fn test_names_are_unique_per_scope() {
		let dir = TestDirectory::new().await;
		let (tenant_a, _) = dir.tenant("a").await;
		let (tenant_b, _) = dir.tenant("b").await;
		dir.role(&tenant_a, "admin").await;

		let err = dir
			.roles()
			.create(Some(&tenant_a), attrs(json!({"name": "admin"})))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Conflict);

		dir.role(&tenant_b, "admin").await;
		assert!(dir.roles().name_exists(Some(&tenant_b), "admin", None).await.unwrap());
	}

	#[tokio::test]
	async fn test_update_to_taken_name_conflicts() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		dir.role(&tenant, "existing-name").await;
		let role = dir.role(&tenant, "editor").await;

		let err = dir
			.roles()
			.update(Some(&tenant), &role, attrs(json!({"name": "existing-name"})))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Conflict);

		let record = dir.roles().get(Some(&tenant), &role, &["name"]).await.unwrap();
		assert_eq!(record["name"], json!("editor"));
	}

	#[tokio::test]
	async fn test_update_to_own_name_succeeds() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "editor").await;
		dir.notifier.clear();

		dir.roles()
			.update(Some(&tenant), &role, attrs(json!({"name": "editor", "description": "edits"})))
			.await
			.unwrap();

		let events = dir.notifier.events();
		assert_eq!(events.len(), 1);
		let event = &events[0];
		assert_eq!(event.action, MutationAction::Updated);
		assert_eq!(event.changed_columns, vec!["description".to_string()]);
		assert_eq!(event.before.as_ref().unwrap()["description"], Value::Null);
		assert_eq!(event.after.as_ref().unwrap()["description"], json!("edits"));
	}

	#[tokio::test]
	async fn test_empty_update_is_a_no_op() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		dir.notifier.clear();

		let (missing, _) = identity::new_identity();
		dir.roles()
			.update(Some(&tenant), &missing, Attributes::new())
			.await
			.unwrap();
		assert!(dir.notifier.events().is_empty());
	}

	#[tokio::test]
	async fn test_update_missing_is_not_found() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let (missing, _) = identity::new_identity();
		let err = dir
			.roles()
			.update(Some(&tenant), &missing, attrs(json!({"name": "x"})))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);
	}

	#[tokio::test]
	async fn test_update_snapshots_roll_back_with_the_write() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "editor").await;
		let roles = dir.roles();
		let prepared = roles
			.prepare_update(Some(&tenant), &role, attrs(json!({"description": "draft"})))
			.await
			.unwrap()
			.unwrap();

		let mut tx = roles.pool().begin().await.unwrap();
		let (before, after) = roles.apply_update(&mut *tx, &prepared).await.unwrap();
		assert_eq!(before["description"], Value::Null);
		assert_eq!(after["description"], json!("draft"));
		tx.rollback().await.unwrap();

		let record = roles.get(Some(&tenant), &role, &["description"]).await.unwrap();
		assert_eq!(record["description"], Value::Null);
	}

	#[tokio::test]
	async fn test_update_of_row_deleted_after_checks_is_not_found() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "editor").await;
		let roles = dir.roles();
		let prepared = roles
			.prepare_update(Some(&tenant), &role, attrs(json!({"description": "late"})))
			.await
			.unwrap()
			.unwrap();
		roles.delete(Some(&tenant), &role).await.unwrap();
		dir.notifier.clear();

		let mut tx = roles.pool().begin().await.unwrap();
		let err = roles.apply_update(&mut *tx, &prepared).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NotFound);
		tx.rollback().await.unwrap();

		assert!(dir.notifier.events().is_empty());
		assert_eq!(roles.count(Some(&tenant)).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_collection_rejects_bad_filters() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		dir.role(&tenant, "admin").await;
		dir.notifier.clear();

		for query in [
			CollectionQuery::default().filter("colour", FilterOp::Eq, json!("red")),
			CollectionQuery::default().filter("name", FilterOp::In, json!("admin")),
			CollectionQuery::default().filter("name", FilterOp::Eq, json!({"nested": true})),
		] {
			let err = dir
				.roles()
				.get_collection(Some(&tenant), &query)
				.await
				.unwrap_err();
			assert_eq!(err.kind(), ErrorKind::BadRequest);
		}
		assert!(dir.notifier.events().is_empty());
	}

	#[tokio::test]
	async fn test_delete_snapshots_and_removes_dependents() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "admin").await;
		let permission = dir.permission(&tenant, "read").await;
		dir.role_permissions()
			.add(Some(&tenant), &role, &[permission.as_str()])
			.await
			.unwrap();
		dir.notifier.clear();

		dir.permissions().delete(Some(&tenant), &permission).await.unwrap();

		assert!(!dir.permissions().exists(Some(&tenant), &permission).await.unwrap());
		assert_eq!(dir.role_permissions().count(Some(&tenant), &role).await.unwrap(), 0);
		let events = dir.notifier.events();
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].action, MutationAction::Deleted);
		assert_eq!(events[0].before.as_ref().unwrap()["name"], json!("read"));
	}

	#[tokio::test]
	async fn test_created_notification_redacts_secrets() {
		let dir = TestDirectory::new().await;
		dir.notifier.clear();
		dir.users()
			.create(attrs(json!({"email": "Bob@Example.com", "password": "hunter22"})))
			.await
			.unwrap();

		let events = dir.notifier.events();
		assert_eq!(events.len(), 1);
		let after = events[0].after.as_ref().unwrap();
		assert_eq!(after["password"], json!(tenancy_audit::REDACTED));
		assert_eq!(after["email"], json!("bob@example.com"));
	}

	#[tokio::test]
	async fn test_collection_notifies_returned_ids() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let a = dir.role(&tenant, "a").await;
		let b = dir.role(&tenant, "b").await;
		dir.notifier.clear();

		let collection = dir
			.roles()
			.get_collection(Some(&tenant), &CollectionQuery::default().fields(&["name"]))
			.await
			.unwrap();
		assert_eq!(collection.pagination.total, 2);
		assert!(collection.data.iter().all(|r| r.contains_key("id")));

		let events = dir.notifier.events();
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].action, MutationAction::Read);
		let mut ids = events[0].resource_ids.clone();
		ids.sort();
		let mut expected = vec![a, b];
		expected.sort();
		assert_eq!(ids, expected);
	}

	#[tokio::test]
	async fn test_concurrent_creates_yield_one_conflict() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let roles = dir.roles();

		let (first, second) = tokio::join!(
			roles.create(Some(&tenant), attrs(json!({"name": "racer"}))),
			roles.create(Some(&tenant), attrs(json!({"name": "racer"}))),
		);
		let outcomes = [first, second];
		assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
		let err = outcomes.into_iter().find_map(Result::err).unwrap();
		assert_eq!(err.kind(), ErrorKind::Conflict);
		assert_eq!(roles.count(Some(&tenant)).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_unique_violation_on_insert_maps_to_conflict() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let roles = dir.roles();
		let first = roles
			.prepare_create(Some(&tenant), attrs(json!({"name": "dup"})), Attributes::new())
			.await
			.unwrap();
		let second = roles
			.prepare_create(Some(&tenant), attrs(json!({"name": "dup"})), Attributes::new())
			.await
			.unwrap();

		let mut conn = roles.pool().acquire().await.unwrap();
		roles.insert(&mut *conn, &first).await.unwrap();
		let err = roles.insert(&mut *conn, &second).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Conflict);
	}
}
