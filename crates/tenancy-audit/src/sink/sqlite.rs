// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::AuditSinkError;
use crate::event::MutationEvent;
use crate::filter::AuditFilterConfig;
use crate::sink::AuditSink;

/// Writes events to the `mutation_log` table.
pub struct SqliteAuditSink {
	pool: SqlitePool,
	filter: AuditFilterConfig,
}

impl SqliteAuditSink {
	pub fn new(pool: SqlitePool, filter: AuditFilterConfig) -> Self {
		Self { pool, filter }
	}
}

fn to_json<T: serde::Serialize>(field: &str, value: &T) -> Result<String, AuditSinkError> {
	serde_json::to_string(value)
		.map_err(|e| AuditSinkError::Rejected(format!("failed to serialize {field}: {e}")))
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
	fn name(&self) -> &str {
		"sqlite"
	}

	fn filter(&self) -> &AuditFilterConfig {
		&self.filter
	}

	async fn publish(&self, event: Arc<MutationEvent>) -> Result<(), AuditSinkError> {
		let resource_ids = to_json("resource_ids", &event.resource_ids)?;
		let member_ids = to_json("member_ids", &event.member_ids)?;
		let changed_columns = to_json("changed_columns", &event.changed_columns)?;
		let before = event
			.before
			.as_ref()
			.map(|v| to_json("before", v))
			.transpose()?;
		let after = event
			.after
			.as_ref()
			.map(|v| to_json("after", v))
			.transpose()?;

		sqlx::query(
			r#"
			INSERT INTO mutation_log (
				id, timestamp, action, severity, resource_type, scope_id,
				resource_ids, member_ids, before_state, after_state, changed_columns
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(event.id.to_string())
		.bind(event.timestamp.to_rfc3339())
		.bind(event.action.to_string())
		.bind(event.severity.to_string())
		.bind(&event.resource_type)
		.bind(&event.scope_id)
		.bind(resource_ids)
		.bind(member_ids)
		.bind(before)
		.bind(after)
		.bind(changed_columns)
		.execute(&self.pool)
		.await
		.map_err(|e| {
			if is_transient_error(&e) {
				AuditSinkError::StoreUnavailable(e.to_string())
			} else {
				AuditSinkError::Rejected(format!("database error: {e}"))
			}
		})?;

		Ok(())
	}
}

fn is_transient_error(e: &sqlx::Error) -> bool {
	matches!(
		e,
		sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
	)
}
