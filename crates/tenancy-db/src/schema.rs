// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Table definitions.
//!
//! Identities are 16-byte BLOBs, timestamps RFC 3339 TEXT, JSON attributes
//! TEXT. There are no foreign keys: the engines own referential integrity.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS tenants (
		id BLOB PRIMARY KEY,
		name TEXT NOT NULL UNIQUE,
		owner BLOB NOT NULL,
		enabled INTEGER NOT NULL DEFAULT 1,
		meta TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_tenants_owner ON tenants(owner)",
	r#"
	CREATE TABLE IF NOT EXISTS users (
		id BLOB PRIMARY KEY,
		email TEXT NOT NULL UNIQUE,
		password TEXT NOT NULL,
		enabled INTEGER NOT NULL DEFAULT 1,
		meta TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS tenant_roles (
		id BLOB PRIMARY KEY,
		tenant_id BLOB NOT NULL,
		name TEXT NOT NULL,
		description TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE(tenant_id, name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS tenant_permissions (
		id BLOB PRIMARY KEY,
		tenant_id BLOB NOT NULL,
		name TEXT NOT NULL,
		description TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE(tenant_id, name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS tenant_groups (
		id BLOB PRIMARY KEY,
		tenant_id BLOB NOT NULL,
		name TEXT NOT NULL,
		description TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE(tenant_id, name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS tenant_meta (
		tenant_id BLOB NOT NULL,
		meta_key TEXT NOT NULL,
		meta_value TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		PRIMARY KEY (tenant_id, meta_key)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS user_meta (
		user_id BLOB NOT NULL,
		meta_key TEXT NOT NULL,
		meta_value TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		PRIMARY KEY (user_id, meta_key)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS tenant_invitations (
		tenant_id BLOB NOT NULL,
		email TEXT NOT NULL,
		role BLOB,
		expires_at TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		PRIMARY KEY (tenant_id, email)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS user_keys (
		id TEXT PRIMARY KEY,
		user_id BLOB NOT NULL,
		name TEXT NOT NULL,
		key_hash TEXT NOT NULL,
		expires_at TEXT,
		allowed_ips TEXT,
		allowed_domains TEXT,
		last_used_at TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_user_keys_user ON user_keys(user_id)",
	r#"
	CREATE TABLE IF NOT EXISTS tenant_users (
		tenant_id BLOB NOT NULL,
		user_id BLOB NOT NULL,
		created_at TEXT NOT NULL,
		PRIMARY KEY (tenant_id, user_id)
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_tenant_users_user ON tenant_users(user_id)",
	r#"
	CREATE TABLE IF NOT EXISTS tenant_role_permissions (
		tenant_id BLOB NOT NULL,
		role_id BLOB NOT NULL,
		permission_id BLOB NOT NULL,
		created_at TEXT NOT NULL,
		PRIMARY KEY (role_id, permission_id)
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_role_permissions_permission ON tenant_role_permissions(permission_id)",
	r#"
	CREATE TABLE IF NOT EXISTS tenant_user_roles (
		tenant_id BLOB NOT NULL,
		user_id BLOB NOT NULL,
		role_id BLOB NOT NULL,
		created_at TEXT NOT NULL,
		PRIMARY KEY (role_id, user_id)
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_user_roles_user ON tenant_user_roles(tenant_id, user_id)",
	r#"
	CREATE TABLE IF NOT EXISTS tenant_group_users (
		tenant_id BLOB NOT NULL,
		group_id BLOB NOT NULL,
		user_id BLOB NOT NULL,
		created_at TEXT NOT NULL,
		PRIMARY KEY (group_id, user_id)
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_group_users_user ON tenant_group_users(tenant_id, user_id)",
	r#"
	CREATE TABLE IF NOT EXISTS mutation_log (
		id TEXT PRIMARY KEY,
		timestamp TEXT NOT NULL,
		action TEXT NOT NULL,
		severity TEXT NOT NULL,
		resource_type TEXT NOT NULL,
		scope_id TEXT,
		resource_ids TEXT NOT NULL,
		member_ids TEXT NOT NULL,
		before_state TEXT,
		after_state TEXT,
		changed_columns TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_mutation_log_timestamp ON mutation_log(timestamp)",
];

/// Create every table and index that does not exist yet.
#[tracing::instrument(skip(pool))]
pub async fn apply(pool: &SqlitePool) -> Result<(), DbError> {
	let mut tx = pool.begin().await?;
	for statement in STATEMENTS {
		sqlx::query(statement).execute(&mut *tx).await?;
	}
	tx.commit().await?;
	tracing::debug!(statements = STATEMENTS.len(), "schema applied");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use sqlx::Row;

	#[tokio::test]
	async fn test_apply_is_idempotent() {
		let pool = create_test_pool().await;
		apply(&pool).await.unwrap();

		let row = sqlx::query(
			"SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
		)
		.fetch_one(&pool)
		.await
		.unwrap();
		assert_eq!(row.get::<i64, _>("count"), 14);
	}
}
