// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User repository.

use async_trait::async_trait;
use sqlx::Row;
use tenancy_core::{identity, Attributes};

use crate::collection::{Collection, CollectionQuery};
use crate::error::DbError;
use crate::kind::Record;
use crate::password;
use crate::pool::finish;
use crate::resource::ResourceRepository;

#[async_trait]
pub trait UserStore: Send + Sync {
	async fn count(&self) -> Result<i64, DbError>;
	async fn exists(&self, id: &str) -> Result<bool, DbError>;
	async fn email_exists(&self, email: &str, exclude_id: Option<&str>) -> Result<bool, DbError>;
	async fn create(&self, attrs: Attributes) -> Result<String, DbError>;
	async fn get(&self, id: &str, columns: &[&str]) -> Result<Record, DbError>;
	async fn get_collection(&self, query: &CollectionQuery) -> Result<Collection, DbError>;
	async fn update(&self, id: &str, attrs: Attributes) -> Result<(), DbError>;
	async fn delete(&self, id: &str) -> Result<(), DbError>;
	async fn verify_password(&self, id: &str, password: &str) -> Result<bool, DbError>;
}

#[async_trait]
impl UserStore for UserRepository {
	async fn count(&self) -> Result<i64, DbError> {
		self.count().await
	}

	async fn exists(&self, id: &str) -> Result<bool, DbError> {
		self.exists(id).await
	}

	async fn email_exists(&self, email: &str, exclude_id: Option<&str>) -> Result<bool, DbError> {
		self.email_exists(email, exclude_id).await
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

	async fn verify_password(&self, id: &str, password: &str) -> Result<bool, DbError> {
		self.verify_password(id, password).await
	}
}

/// Users are global. Passwords are hashed on write and never selectable.
#[derive(Clone)]
pub struct UserRepository {
	users: ResourceRepository,
}

impl UserRepository {
	pub fn new(users: ResourceRepository) -> Self {
		Self { users }
	}

	pub async fn count(&self) -> Result<i64, DbError> {
		self.users.count(None).await
	}

	pub async fn exists(&self, id: &str) -> Result<bool, DbError> {
		self.users.exists(None, id).await
	}

	/// Case-insensitive, since stored emails are normalised.
	pub async fn email_exists(&self, email: &str, exclude_id: Option<&str>) -> Result<bool, DbError> {
		self.users.name_exists(None, email, exclude_id).await
	}

	pub async fn create(&self, attrs: Attributes) -> Result<String, DbError> {
		self.users.create(None, attrs).await
	}

	pub async fn get(&self, id: &str, columns: &[&str]) -> Result<Record, DbError> {
		self.users.get(None, id, columns).await
	}

	pub async fn get_collection(&self, query: &CollectionQuery) -> Result<Collection, DbError> {
		self.users.get_collection(None, query).await
	}

	pub async fn update(&self, id: &str, attrs: Attributes) -> Result<(), DbError> {
		self.users.update(None, id, attrs).await
	}

	/// Delete a user with their memberships, assignments, metadata and keys.
	///
	/// A user who still owns a tenant cannot be deleted. The ownership check
	/// and the delete run in one transaction.
	#[tracing::instrument(skip(self))]
	pub async fn delete(&self, id: &str) -> Result<(), DbError> {
		let mut tx = self.users.pool().begin().await?;
		let result = async {
			if let Ok(binary) = identity::to_binary(id) {
				let row = sqlx::query("SELECT COUNT(*) AS count FROM tenants WHERE owner = ?")
					.bind(binary)
					.fetch_one(&mut *tx)
					.await?;
				let owned: i64 = row.get("count");
				if owned > 0 {
					return Err(DbError::forbidden(
						"user",
						None,
						format!("user owns {owned} tenant(s); transfer ownership first"),
					));
				}
			}
			self.users.delete_on(&mut *tx, None, id).await
		}
		.await;
		let before = finish(tx, result).await?;
		self.users.notify_deleted(None, id, before).await;
		Ok(())
	}

	/// Check a password against the stored hash.
	#[tracing::instrument(skip(self, password))]
	pub async fn verify_password(&self, id: &str, password: &str) -> Result<bool, DbError> {
		let not_found = || DbError::not_found("user", None, id);
		let binary = identity::to_binary(id).map_err(|_| not_found())?;
		let row = sqlx::query("SELECT password FROM users WHERE id = ?")
			.bind(binary)
			.fetch_optional(self.users.pool())
			.await?
			.ok_or_else(not_found)?;
		let hash: String = row.get("password");
		password::verify_password(password, &hash)
	}
}
