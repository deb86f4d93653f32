// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant repository.
//!
//! Tenants are created together with their owner's membership, and can only
//! be handed to a user who already belongs to them.

use async_trait::async_trait;
use serde_json::Value;
use tenancy_core::{identity, Attributes};

use crate::collection::{Collection, CollectionQuery, Condition};
use crate::error::DbError;
use crate::kind::{encode_scope, Record};
use crate::pool::finish;
use crate::relationship::{RelationshipRepository, Scope};
use crate::resource::{ResourceRepository, ALIAS};

#[async_trait]
pub trait TenantStore: Send + Sync {
	async fn count(&self) -> Result<i64, DbError>;
	async fn exists(&self, id: &str) -> Result<bool, DbError>;
	async fn name_exists(&self, name: &str, exclude_id: Option<&str>) -> Result<bool, DbError>;
	async fn create(&self, attrs: Attributes) -> Result<String, DbError>;
	async fn get(&self, id: &str, columns: &[&str]) -> Result<Record, DbError>;
	async fn get_collection(&self, query: &CollectionQuery) -> Result<Collection, DbError>;
	async fn update(&self, id: &str, attrs: Attributes) -> Result<(), DbError>;
	async fn delete(&self, id: &str) -> Result<(), DbError>;
	async fn owned_by(&self, user_id: &str, query: &CollectionQuery) -> Result<Collection, DbError>;
}

#[async_trait]
impl TenantStore for TenantRepository {
	async fn count(&self) -> Result<i64, DbError> {
		self.count().await
	}

	async fn exists(&self, id: &str) -> Result<bool, DbError> {
		self.exists(id).await
	}

	async fn name_exists(&self, name: &str, exclude_id: Option<&str>) -> Result<bool, DbError> {
		self.name_exists(name, exclude_id).await
	}

	async fn create(&self, attrs: Attributes) -> Result<String, DbError> {
		self.create(attrs).await
	}

	async fn get(&self, id: &str, columns: &[&str]) -> Result<Record, DbError> {
		self.get(id, columns).await
	}

	async fn get_collection(&self, query: &CollectionQuery) -> Result<Collection, DbError> {
		self.get_collection(query).await
	}

	async fn update(&self, id: &str, attrs: Attributes) -> Result<(), DbError> {
		self.update(id, attrs).await
	}

	async fn delete(&self, id: &str) -> Result<(), DbError> {
		self.delete(id).await
	}

	async fn owned_by(&self, user_id: &str, query: &CollectionQuery) -> Result<Collection, DbError> {
		self.owned_by(user_id, query).await
	}
}

#[derive(Clone)]
pub struct TenantRepository {
	tenants: ResourceRepository,
	users: ResourceRepository,
	members: RelationshipRepository,
}

impl TenantRepository {
	pub fn new(
		tenants: ResourceRepository,
		users: ResourceRepository,
		members: RelationshipRepository,
	) -> Self {
		Self {
			tenants,
			users,
			members,
		}
	}

	pub async fn count(&self) -> Result<i64, DbError> {
		self.tenants.count(None).await
	}

	pub async fn exists(&self, id: &str) -> Result<bool, DbError> {
		self.tenants.exists(None, id).await
	}

	pub async fn name_exists(&self, name: &str, exclude_id: Option<&str>) -> Result<bool, DbError> {
		self.tenants.name_exists(None, name, exclude_id).await
	}

	/// Create a tenant and make its owner the first member.
	///
	/// The owner must be an existing user.
	#[tracing::instrument(skip(self, attrs))]
	pub async fn create(&self, attrs: Attributes) -> Result<String, DbError> {
		let owner = attrs
			.get("owner")
			.and_then(Value::as_str)
			.map(str::to_string);
		let prepared = self
			.tenants
			.prepare_create(None, attrs, Attributes::new())
			.await?;

		let owner = owner.unwrap_or_default();
		if !self.users.exists(None, &owner).await? {
			return Err(DbError::bad_request(
				"tenant",
				None,
				format!("owner '{owner}' is not an existing user"),
			));
		}
		let tenant_id = identity::to_binary(&prepared.id)
			.map_err(|e| DbError::Internal(e.to_string()))?;
		let owner_id = identity::to_binary(&owner).map_err(|e| DbError::Internal(e.to_string()))?;

		let mut tx = self.tenants.pool().begin().await?;
		let result = async {
			self.tenants.insert(&mut *tx, &prepared).await?;
			self.members
				.link(&mut *tx, &Scope::Unscoped, &tenant_id, &owner_id)
				.await
		}
		.await;
		finish(tx, result).await?;

		let id = prepared.id.clone();
		tracing::info!(tenant_id = %id, owner = %owner, "tenant created");
		self.tenants.notify_created(prepared).await;
		Ok(id)
	}

	pub async fn get(&self, id: &str, columns: &[&str]) -> Result<Record, DbError> {
		self.tenants.get(None, id, columns).await
	}

	pub async fn get_collection(&self, query: &CollectionQuery) -> Result<Collection, DbError> {
		self.tenants.get_collection(None, query).await
	}

	/// Update a tenant. A new owner must already be a member.
	///
	/// The membership check and the write run in one transaction.
	#[tracing::instrument(skip(self, attrs))]
	pub async fn update(&self, id: &str, attrs: Attributes) -> Result<(), DbError> {
		let new_owner = attrs
			.get("owner")
			.and_then(Value::as_str)
			.map(str::to_string);
		let Some(prepared) = self.tenants.prepare_update(None, id, attrs).await? else {
			return Ok(());
		};
		let transfer = match &new_owner {
			Some(owner) => {
				let tenant_id =
					identity::to_binary(id).map_err(|e| DbError::Internal(e.to_string()))?;
				let owner_id =
					identity::to_binary(owner).map_err(|e| DbError::Internal(e.to_string()))?;
				Some((tenant_id, owner_id))
			}
			None => None,
		};

		let mut tx = self.tenants.pool().begin().await?;
		let result = async {
			if let Some((tenant_id, owner_id)) = &transfer {
				let member = self
					.members
					.is_linked(&mut *tx, &Scope::Unscoped, tenant_id, owner_id)
					.await?;
				if !member {
					return Err(DbError::bad_request(
						"tenant",
						None,
						format!(
							"new owner '{}' is not a member of the tenant",
							new_owner.as_deref().unwrap_or_default()
						),
					));
				}
			}
			self.tenants.apply_update(&mut *tx, &prepared).await
		}
		.await;
		let (before, after) = finish(tx, result).await?;
		self.tenants.notify_updated(prepared, before, after).await;
		Ok(())
	}

	/// Delete a tenant and everything scoped to it.
	pub async fn delete(&self, id: &str) -> Result<(), DbError> {
		self.tenants.delete(None, id).await
	}

	/// Tenants whose owner is `user_id`.
	#[tracing::instrument(skip(self, query))]
	pub async fn owned_by(&self, user_id: &str, query: &CollectionQuery) -> Result<Collection, DbError> {
		let owner = Condition::eq(ALIAS, "owner", encode_scope(user_id));
		self.tenants.collection_with(None, query, vec![owner]).await
	}
}
