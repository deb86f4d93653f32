// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-user API keys.
//!
//! A key is a short public id plus a secret shown once at creation. Only
//! the SHA-256 digest of the secret is stored.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use sqlx::Row;
use tenancy_config::PolicyConfig;
use tenancy_core::{identity, Attributes};

use crate::collection::{Collection, CollectionQuery};
use crate::error::DbError;
use crate::kind::Record;
use crate::password;
use crate::pool::finish;
use crate::resource::ResourceRepository;
use crate::sql;

const KEY_ID_LEN: usize = 12;
const KEY_SECRET_LEN: usize = 40;
const KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MAX_ID_ATTEMPTS: usize = 5;

/// Returned once by [`UserKeyRepository::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUserKey {
	pub id: String,
	pub secret: String,
}

#[async_trait]
pub trait UserKeyStore: Send + Sync {
	async fn count(&self, user_id: &str) -> Result<i64, DbError>;
	async fn create(&self, user_id: &str, attrs: Attributes) -> Result<NewUserKey, DbError>;
	async fn get(&self, user_id: &str, id: &str) -> Result<Record, DbError>;
	async fn get_collection(
		&self,
		user_id: &str,
		query: &CollectionQuery,
	) -> Result<Collection, DbError>;
	async fn update(&self, user_id: &str, id: &str, attrs: Attributes) -> Result<(), DbError>;
	async fn delete(&self, user_id: &str, id: &str) -> Result<(), DbError>;
	async fn authenticate(&self, id: &str, secret: &str) -> Result<Option<String>, DbError>;
}

#[async_trait]
impl UserKeyStore for UserKeyRepository {
	async fn count(&self, user_id: &str) -> Result<i64, DbError> {
		self.count(user_id).await
	}

	async fn create(&self, user_id: &str, attrs: Attributes) -> Result<NewUserKey, DbError> {
		self.create(user_id, attrs).await
	}

	async fn get(&self, user_id: &str, id: &str) -> Result<Record, DbError> {
		self.get(user_id, id).await
	}

	async fn get_collection(
		&self,
		user_id: &str,
		query: &CollectionQuery,
	) -> Result<Collection, DbError> {
		self.get_collection(user_id, query).await
	}

	async fn update(&self, user_id: &str, id: &str, attrs: Attributes) -> Result<(), DbError> {
		self.update(user_id, id, attrs).await
	}

	async fn delete(&self, user_id: &str, id: &str) -> Result<(), DbError> {
		self.delete(user_id, id).await
	}

	async fn authenticate(&self, id: &str, secret: &str) -> Result<Option<String>, DbError> {
		self.authenticate(id, secret).await
	}
}

fn random_string(len: usize) -> String {
	let mut rng = rand::thread_rng();
	(0..len)
		.map(|_| KEY_CHARSET[rng.gen_range(0..KEY_CHARSET.len())] as char)
		.collect()
}

#[derive(Clone)]
pub struct UserKeyRepository {
	keys: ResourceRepository,
	policy: Arc<PolicyConfig>,
}

impl UserKeyRepository {
	pub fn new(keys: ResourceRepository, policy: Arc<PolicyConfig>) -> Self {
		Self { keys, policy }
	}

	pub async fn count(&self, user_id: &str) -> Result<i64, DbError> {
		self.keys.count(Some(user_id)).await
	}

	/// Issue a key. Fails `Forbidden` once the user holds the configured
	/// maximum number of keys.
	///
	/// The held-key count and the insert run in one transaction.
	#[tracing::instrument(skip(self, attrs))]
	pub async fn create(&self, user_id: &str, attrs: Attributes) -> Result<NewUserKey, DbError> {
		let secret = random_string(KEY_SECRET_LEN);
		let mut attempt = 0;
		loop {
			attempt += 1;
			let mut system = Attributes::new();
			system.insert("id".to_string(), Value::String(random_string(KEY_ID_LEN)));
			system.insert(
				"key_hash".to_string(),
				Value::String(password::hash_secret(&secret)),
			);

			match self.issue(user_id, attrs.clone(), system).await {
				Ok(id) => return Ok(NewUserKey { id, secret }),
				Err(DbError::Conflict(_)) if attempt < MAX_ID_ATTEMPTS => {
					tracing::debug!(attempt, "user key id collision; retrying");
				}
				Err(DbError::Conflict(_)) => {
					return Err(DbError::Internal(
						"could not allocate a unique user key id".to_string(),
					));
				}
				Err(e) => return Err(e),
			}
		}
	}

	async fn issue(&self, user_id: &str, attrs: Attributes, system: Attributes) -> Result<String, DbError> {
		let prepared = self.keys.prepare_create(Some(user_id), attrs, system).await?;
		let user = identity::to_binary(user_id).map_err(|e| DbError::Internal(e.to_string()))?;
		let max = self.policy.max_user_keys;

		let mut tx = self.keys.pool().begin().await?;
		let result = async {
			let held: i64 = sqlx::query("SELECT COUNT(*) AS count FROM user_keys WHERE user_id = ?")
				.bind(&user)
				.fetch_one(&mut *tx)
				.await?
				.get("count");
			if held >= i64::from(max) {
				return Err(DbError::forbidden(
					"user_key",
					Some(user_id),
					format!("user already holds the maximum of {max} keys"),
				));
			}
			self.keys.insert(&mut *tx, &prepared).await
		}
		.await;
		finish(tx, result).await?;

		let id = prepared.id.clone();
		self.keys.notify_created(prepared).await;
		Ok(id)
	}

	pub async fn get(&self, user_id: &str, id: &str) -> Result<Record, DbError> {
		self.keys.get(Some(user_id), id, &[]).await
	}

	pub async fn get_collection(
		&self,
		user_id: &str,
		query: &CollectionQuery,
	) -> Result<Collection, DbError> {
		self.keys.get_collection(Some(user_id), query).await
	}

	pub async fn update(&self, user_id: &str, id: &str, attrs: Attributes) -> Result<(), DbError> {
		self.keys.update(Some(user_id), id, attrs).await
	}

	pub async fn delete(&self, user_id: &str, id: &str) -> Result<(), DbError> {
		self.keys.delete(Some(user_id), id).await
	}

	/// Resolve a key to its owning user id.
	///
	/// `None` for an unknown key, a wrong secret or an expired key. A
	/// successful match records `last_used_at`.
	#[tracing::instrument(skip(self, secret))]
	pub async fn authenticate(&self, id: &str, secret: &str) -> Result<Option<String>, DbError> {
		let pool = self.keys.pool();
		let row = sqlx::query("SELECT user_id, key_hash, expires_at FROM user_keys WHERE id = ?")
			.bind(id)
			.fetch_optional(pool)
			.await?;
		let Some(row) = row else {
			tracing::debug!("unknown user key");
			return Ok(None);
		};

		let stored: String = row.try_get("key_hash")?;
		if stored != password::hash_secret(secret) {
			tracing::debug!("user key secret mismatch");
			return Ok(None);
		}
		let now = sql::now();
		let expires_at: Option<String> = row.try_get("expires_at")?;
		if expires_at.is_some_and(|at| at <= now) {
			tracing::debug!("user key expired");
			return Ok(None);
		}

		let user: Vec<u8> = row.try_get("user_id")?;
		let user = identity::to_text(&user).map_err(|e| DbError::Internal(e.to_string()))?;

		sqlx::query("UPDATE user_keys SET last_used_at = ? WHERE id = ?")
			.bind(&now)
			.bind(id)
			.execute(pool)
			.await?;
		Ok(Some(user))
	}
}
