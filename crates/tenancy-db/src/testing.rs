// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tenancy_audit::{MutationEvent, MutationNotifier};
use tenancy_config::PolicyConfig;
use tenancy_core::Attributes;

use crate::directory::Directory;
use crate::schema;

/// In-memory database with the schema applied.
///
/// A single connection: every `sqlite::memory:` connection is its own
/// database.
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect("sqlite::memory:")
		.await
		.unwrap();
	schema::apply(&pool).await.unwrap();
	pool
}

pub fn attrs(value: Value) -> Attributes {
	value.as_object().cloned().unwrap()
}

#[derive(Default)]
pub struct RecordingNotifier {
	events: Mutex<Vec<MutationEvent>>,
}

impl RecordingNotifier {
	pub fn events(&self) -> Vec<MutationEvent> {
		self.events.lock().unwrap().clone()
	}

	pub fn clear(&self) {
		self.events.lock().unwrap().clear();
	}
}

#[async_trait]
impl MutationNotifier for RecordingNotifier {
	async fn notify(&self, event: MutationEvent) {
		self.events.lock().unwrap().push(event);
	}
}

pub struct TestDirectory {
	directory: Directory,
	pub pool: SqlitePool,
	pub notifier: Arc<RecordingNotifier>,
}

impl Deref for TestDirectory {
	type Target = Directory;

	fn deref(&self) -> &Directory {
		&self.directory
	}
}

impl TestDirectory {
	pub async fn new() -> Self {
		Self::with_policy(PolicyConfig::default()).await
	}

	pub async fn with_policy(policy: PolicyConfig) -> Self {
		let pool = create_test_pool().await;
		let notifier = Arc::new(RecordingNotifier::default());
		let directory = Directory::new(pool.clone(), notifier.clone(), Arc::new(policy));
		Self {
			directory,
			pool,
			notifier,
		}
	}

	pub async fn user(&self, email: &str) -> String {
		self.users()
			.create(attrs(serde_json::json!({"email": email, "password": "pw-123456"})))
			.await
			.unwrap()
	}

	/// A tenant and its freshly created owner: `(tenant_id, owner_id)`.
	pub async fn tenant(&self, name: &str) -> (String, String) {
		let owner = self.user(&format!("owner-{name}@example.com")).await;
		let tenant = self
			.tenants()
			.create(attrs(serde_json::json!({"name": name, "owner": owner})))
			.await
			.unwrap();
		(tenant, owner)
	}

	pub async fn role(&self, tenant: &str, name: &str) -> String {
		self.roles()
			.create(Some(tenant), attrs(serde_json::json!({"name": name})))
			.await
			.unwrap()
	}

	pub async fn permission(&self, tenant: &str, name: &str) -> String {
		self.permissions()
			.create(Some(tenant), attrs(serde_json::json!({"name": name})))
			.await
			.unwrap()
	}

	pub async fn group(&self, tenant: &str, name: &str) -> String {
		self.groups()
			.create(Some(tenant), attrs(serde_json::json!({"name": name})))
			.await
			.unwrap()
	}
}
