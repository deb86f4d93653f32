// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wiring: one pool, one notifier and one policy shared by every store.

use std::sync::Arc;

use sqlx::sqlite::SqlitePool;
use tenancy_audit::{
	AuditFilterConfig, AuditNotifier, AuditSink, MutationNotifier, NoopNotifier, SqliteAuditSink,
	TracingAuditSink,
};
use tenancy_config::{AuditConfig, PolicyConfig, TenancyConfig};
use tenancy_core::NamespacePolicy;

use crate::error::DbError;
use crate::invitation::InvitationRepository;
use crate::kind::{RelationshipKind, ResourceKind};
use crate::kinds::Catalog;
use crate::meta::MetaRepository;
use crate::pool::create_pool;
use crate::relationship::RelationshipRepository;
use crate::resource::ResourceRepository;
use crate::schema;
use crate::tenant::TenantRepository;
use crate::user::UserRepository;
use crate::user_key::UserKeyRepository;

/// Build the notifier described by the audit section.
pub fn build_notifier(
	config: &AuditConfig,
	pool: &SqlitePool,
) -> Result<Arc<dyn MutationNotifier>, DbError> {
	if !config.enabled {
		tracing::info!("audit disabled; mutations will not be recorded");
		return Ok(Arc::new(NoopNotifier));
	}
	let filter = AuditFilterConfig::from_config(config)
		.map_err(|e| DbError::Internal(format!("invalid audit configuration: {e}")))?;

	let mut sinks: Vec<Arc<dyn AuditSink>> =
		vec![Arc::new(TracingAuditSink::new(AuditFilterConfig::default()))];
	if config.sqlite_sink {
		sinks.push(Arc::new(SqliteAuditSink::new(
			pool.clone(),
			AuditFilterConfig::default(),
		)));
	}
	let notifier = AuditNotifier::new(filter, sinks);
	tracing::info!(sinks = ?notifier.sink_names(), "audit notifier configured");
	Ok(Arc::new(notifier))
}

/// Entry point to every resource and relationship store.
#[derive(Clone)]
pub struct Directory {
	pool: SqlitePool,
	catalog: Catalog,
	notifier: Arc<dyn MutationNotifier>,
	policy: Arc<PolicyConfig>,
}

impl Directory {
	pub fn new(
		pool: SqlitePool,
		notifier: Arc<dyn MutationNotifier>,
		policy: Arc<PolicyConfig>,
	) -> Self {
		Self {
			pool,
			catalog: Catalog::new(),
			notifier,
			policy,
		}
	}

	/// Open the configured database, apply the schema and build the notifier.
	#[tracing::instrument(skip(config))]
	pub async fn from_config(config: &TenancyConfig) -> Result<Self, DbError> {
		let pool = create_pool(&config.database.url).await?;
		schema::apply(&pool).await?;
		let notifier = build_notifier(&config.audit, &pool)?;
		Ok(Self::new(pool, notifier, Arc::new(config.policy.clone())))
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	pub fn policy(&self) -> &PolicyConfig {
		&self.policy
	}

	fn resource(&self, kind: &Arc<ResourceKind>) -> ResourceRepository {
		ResourceRepository::new(
			self.pool.clone(),
			Arc::clone(kind),
			Arc::clone(&self.notifier),
			Arc::clone(&self.policy),
		)
	}

	fn relationship(&self, kind: &Arc<RelationshipKind>) -> RelationshipRepository {
		RelationshipRepository::new(
			self.pool.clone(),
			Arc::clone(kind),
			Arc::clone(&self.notifier),
			Arc::clone(&self.policy),
		)
	}

	fn namespace(&self) -> NamespacePolicy {
		NamespacePolicy::new(&self.policy.protected_prefix)
	}

	pub fn tenants(&self) -> TenantRepository {
		TenantRepository::new(
			self.resource(&self.catalog.tenant),
			self.resource(&self.catalog.user),
			self.tenant_users(),
		)
	}

	pub fn users(&self) -> UserRepository {
		UserRepository::new(self.resource(&self.catalog.user))
	}

	pub fn roles(&self) -> ResourceRepository {
		self.resource(&self.catalog.role)
	}

	pub fn permissions(&self) -> ResourceRepository {
		self.resource(&self.catalog.permission)
	}

	pub fn groups(&self) -> ResourceRepository {
		self.resource(&self.catalog.group)
	}

	pub fn tenant_meta(&self) -> MetaRepository {
		MetaRepository::new(self.resource(&self.catalog.tenant_meta), self.namespace())
	}

	pub fn user_meta(&self) -> MetaRepository {
		MetaRepository::new(self.resource(&self.catalog.user_meta), self.namespace())
	}

	pub fn invitations(&self) -> InvitationRepository {
		InvitationRepository::new(
			self.resource(&self.catalog.invitation),
			self.roles(),
			self.resource(&self.catalog.user),
			self.tenant_users(),
			self.user_roles(),
			Arc::clone(&self.notifier),
			Arc::clone(&self.policy),
		)
	}

	pub fn user_keys(&self) -> UserKeyRepository {
		UserKeyRepository::new(self.resource(&self.catalog.user_key), Arc::clone(&self.policy))
	}

	pub fn tenant_users(&self) -> RelationshipRepository {
		self.relationship(&self.catalog.tenant_users)
	}

	pub fn user_tenants(&self) -> RelationshipRepository {
		self.relationship(&self.catalog.user_tenants)
	}

	pub fn role_permissions(&self) -> RelationshipRepository {
		self.relationship(&self.catalog.role_permissions)
	}

	pub fn role_users(&self) -> RelationshipRepository {
		self.relationship(&self.catalog.role_users)
	}

	pub fn user_roles(&self) -> RelationshipRepository {
		self.relationship(&self.catalog.user_roles)
	}

	pub fn group_users(&self) -> RelationshipRepository {
		self.relationship(&self.catalog.group_users)
	}

	pub fn user_groups(&self) -> RelationshipRepository {
		self.relationship(&self.catalog.user_groups)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use sqlx::Row;
	use tenancy_config::{DatabaseConfig, TenancyConfig};

	#[tokio::test]
	async fn test_disabled_audit_uses_noop() {
		let pool = create_test_pool().await;
		let config = AuditConfig {
			enabled: false,
			actions: None,
			sqlite_sink: true,
			..Default::default()
		};
		let notifier = build_notifier(&config, &pool).unwrap();
		let directory = Directory::new(pool.clone(), notifier, Arc::new(PolicyConfig::default()));
		directory
			.users()
			.create(
				serde_json::json!({"email": "a@example.com", "password": "pw"})
					.as_object()
					.cloned()
					.unwrap(),
			)
			.await
			.unwrap();

		let row = sqlx::query("SELECT COUNT(*) AS count FROM mutation_log")
			.fetch_one(&pool)
			.await
			.unwrap();
		assert_eq!(row.get::<i64, _>("count"), 0);
	}

	#[tokio::test]
	async fn test_sqlite_sink_records_mutations() {
		let pool = create_test_pool().await;
		let config = AuditConfig {
			enabled: true,
			actions: Some(vec!["created".to_string()]),
			sqlite_sink: true,
			..Default::default()
		};
		let notifier = build_notifier(&config, &pool).unwrap();
		let directory = Directory::new(pool.clone(), notifier, Arc::new(PolicyConfig::default()));
		let users = directory.users();
		let id = users
			.create(
				serde_json::json!({"email": "a@example.com", "password": "pw"})
					.as_object()
					.cloned()
					.unwrap(),
			)
			.await
			.unwrap();
		users.get(&id, &[]).await.unwrap();
		users
			.get_collection(&crate::CollectionQuery::default())
			.await
			.unwrap();

		let rows = sqlx::query("SELECT action, after_state FROM mutation_log")
			.fetch_all(&pool)
			.await
			.unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].get::<String, _>("action"), "created");
		let after: String = rows[0].get("after_state");
		assert!(after.contains(tenancy_audit::REDACTED));
		assert!(!after.contains("\"pw\""));
	}

	#[tokio::test]
	async fn test_severity_floor_and_exclusions_reach_the_sink() {
		let pool = create_test_pool().await;
		let config = AuditConfig {
			enabled: true,
			min_severity: Some("info".to_string()),
			exclude_actions: vec!["updated".to_string()],
			sqlite_sink: true,
			..Default::default()
		};
		let notifier = build_notifier(&config, &pool).unwrap();
		let directory = Directory::new(pool.clone(), notifier, Arc::new(PolicyConfig::default()));
		let users = directory.users();
		let id = users
			.create(
				serde_json::json!({"email": "a@example.com", "password": "pw"})
					.as_object()
					.cloned()
					.unwrap(),
			)
			.await
			.unwrap();
		users
			.update(
				&id,
				serde_json::json!({"email": "b@example.com"})
					.as_object()
					.cloned()
					.unwrap(),
			)
			.await
			.unwrap();
		users
			.get_collection(&crate::CollectionQuery::default())
			.await
			.unwrap();
		users.delete(&id).await.unwrap();

		let actions: Vec<String> = sqlx::query("SELECT action FROM mutation_log ORDER BY action")
			.fetch_all(&pool)
			.await
			.unwrap()
			.iter()
			.map(|row| row.get("action"))
			.collect();
		assert_eq!(actions, vec!["created".to_string(), "deleted".to_string()]);
	}

	#[tokio::test]
	async fn test_invalid_audit_action_is_rejected() {
		let config = AuditConfig {
			enabled: true,
			actions: Some(vec!["exploded".to_string()]),
			sqlite_sink: false,
			..Default::default()
		};
		let pool = create_test_pool().await;
		assert!(matches!(
			build_notifier(&config, &pool),
			Err(DbError::Internal(_))
		));
	}

	#[tokio::test]
	async fn test_from_config_opens_file_database() {
		let dir = tempfile::tempdir().unwrap();
		let config = TenancyConfig {
			database: DatabaseConfig {
				url: format!("sqlite:{}", dir.path().join("tenancy.db").display()),
			},
			..Default::default()
		};
		let directory = Directory::from_config(&config).await.unwrap();
		assert_eq!(directory.users().count().await.unwrap(), 0);
	}
}
