// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant and user metadata.
//!
//! Every call carries `allow_protected`, the outcome of the caller's own
//! authorization check. Without it, keys under the protected prefix cannot
//! be read, written or listed.

use async_trait::async_trait;
use serde_json::Value;
use tenancy_core::{Attributes, NamespaceError, NamespacePolicy};

use crate::collection::{Collection, CollectionQuery, Condition};
use crate::error::DbError;
use crate::kind::Record;
use crate::resource::{ResourceRepository, ALIAS};
use crate::sql::{quote, SqlValue};

const KEY: &str = "meta_key";

#[async_trait]
pub trait MetaStore: Send + Sync {
	async fn count(&self, scope: &str, allow_protected: bool) -> Result<i64, DbError>;
	async fn exists(&self, scope: &str, key: &str, allow_protected: bool) -> Result<bool, DbError>;
	async fn create(
		&self,
		scope: &str,
		attrs: Attributes,
		allow_protected: bool,
	) -> Result<String, DbError>;
	async fn get(&self, scope: &str, key: &str, allow_protected: bool) -> Result<Record, DbError>;
	async fn get_collection(
		&self,
		scope: &str,
		query: &CollectionQuery,
		allow_protected: bool,
	) -> Result<Collection, DbError>;
	async fn update(
		&self,
		scope: &str,
		key: &str,
		attrs: Attributes,
		allow_protected: bool,
	) -> Result<(), DbError>;
	async fn delete(&self, scope: &str, key: &str, allow_protected: bool) -> Result<(), DbError>;
}

#[async_trait]
impl MetaStore for MetaRepository {
	async fn count(&self, scope: &str, allow_protected: bool) -> Result<i64, DbError> {
		self.count(scope, allow_protected).await
	}

	async fn exists(&self, scope: &str, key: &str, allow_protected: bool) -> Result<bool, DbError> {
		self.exists(scope, key, allow_protected).await
	}

	async fn create(
		&self,
		scope: &str,
		attrs: Attributes,
		allow_protected: bool,
	) -> Result<String, DbError> {
		self.create(scope, attrs, allow_protected).await
	}

	async fn get(&self, scope: &str, key: &str, allow_protected: bool) -> Result<Record, DbError> {
		self.get(scope, key, allow_protected).await
	}

	async fn get_collection(
		&self,
		scope: &str,
		query: &CollectionQuery,
		allow_protected: bool,
	) -> Result<Collection, DbError> {
		self.get_collection(scope, query, allow_protected).await
	}

	async fn update(
		&self,
		scope: &str,
		key: &str,
		attrs: Attributes,
		allow_protected: bool,
	) -> Result<(), DbError> {
		self.update(scope, key, attrs, allow_protected).await
	}

	async fn delete(&self, scope: &str, key: &str, allow_protected: bool) -> Result<(), DbError> {
		self.delete(scope, key, allow_protected).await
	}
}

#[derive(Clone)]
pub struct MetaRepository {
	meta: ResourceRepository,
	namespace: NamespacePolicy,
}

fn escape_like(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		if matches!(c, '\\' | '%' | '_') {
			out.push('\\');
		}
		out.push(c);
	}
	out
}

impl MetaRepository {
	pub fn new(meta: ResourceRepository, namespace: NamespacePolicy) -> Self {
		Self { meta, namespace }
	}

	fn kind(&self) -> &'static str {
		self.meta.kind().name
	}

	/// Normalise `key` and gate it on the protected namespace.
	fn check(&self, scope: &str, key: &str, allow_protected: bool) -> Result<String, DbError> {
		self.namespace
			.check(key, allow_protected)
			.map_err(|e| match e {
				NamespaceError::InvalidKey(_) => DbError::bad_request(self.kind(), Some(scope), e.to_string()),
				NamespaceError::Protected(_) => DbError::forbidden(self.kind(), Some(scope), e.to_string()),
			})
	}

	fn visible(&self, allow_protected: bool) -> Vec<Condition> {
		if allow_protected {
			return Vec::new();
		}
		vec![Condition::new(
			format!("{ALIAS}.{} NOT LIKE ? ESCAPE '\\'", quote(KEY)),
			vec![SqlValue::Text(format!("{}%", escape_like(self.namespace.prefix())))],
		)]
	}

	/// Number of keys visible to the caller.
	#[tracing::instrument(skip(self), fields(kind = self.kind()))]
	pub async fn count(&self, scope: &str, allow_protected: bool) -> Result<i64, DbError> {
		self.meta
			.count_with(Some(scope), self.visible(allow_protected))
			.await
	}

	#[tracing::instrument(skip(self), fields(kind = self.kind()))]
	pub async fn exists(&self, scope: &str, key: &str, allow_protected: bool) -> Result<bool, DbError> {
		match self.namespace.check(key, allow_protected) {
			Ok(key) => self.meta.exists(Some(scope), &key).await,
			Err(NamespaceError::InvalidKey(_)) => Ok(false),
			Err(e @ NamespaceError::Protected(_)) => {
				Err(DbError::forbidden(self.kind(), Some(scope), e.to_string()))
			}
		}
	}

	/// Create an entry and return its normalised key.
	#[tracing::instrument(skip(self, attrs), fields(kind = self.kind()))]
	pub async fn create(
		&self,
		scope: &str,
		mut attrs: Attributes,
		allow_protected: bool,
	) -> Result<String, DbError> {
		if let Some(key) = attrs.get(KEY).and_then(Value::as_str) {
			let key = self.check(scope, key, allow_protected)?;
			attrs.insert(KEY.to_string(), Value::String(key));
		}
		self.meta.create(Some(scope), attrs).await
	}

	#[tracing::instrument(skip(self), fields(kind = self.kind()))]
	pub async fn get(&self, scope: &str, key: &str, allow_protected: bool) -> Result<Record, DbError> {
		let key = self.check(scope, key, allow_protected)?;
		self.meta.get(Some(scope), &key, &[]).await
	}

	/// List entries; protected keys only with `allow_protected`.
	#[tracing::instrument(skip(self, query), fields(kind = self.kind()))]
	pub async fn get_collection(
		&self,
		scope: &str,
		query: &CollectionQuery,
		allow_protected: bool,
	) -> Result<Collection, DbError> {
		self.meta
			.collection_with(Some(scope), query, self.visible(allow_protected))
			.await
	}

	/// Replace the value of an entry. The key itself cannot change.
	#[tracing::instrument(skip(self, attrs), fields(kind = self.kind()))]
	pub async fn update(
		&self,
		scope: &str,
		key: &str,
		attrs: Attributes,
		allow_protected: bool,
	) -> Result<(), DbError> {
		let key = self.check(scope, key, allow_protected)?;
		self.meta.update(Some(scope), &key, attrs).await
	}

	#[tracing::instrument(skip(self), fields(kind = self.kind()))]
	pub async fn delete(&self, scope: &str, key: &str, allow_protected: bool) -> Result<(), DbError> {
		let key = self.check(scope, key, allow_protected)?;
		self.meta.delete(Some(scope), &key).await
	}
}
