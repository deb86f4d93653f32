// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use tracing::Level;

use super::{AuditSink, AuditSinkError};
use crate::event::{AuditSeverity, MutationEvent};
use crate::filter::AuditFilterConfig;

pub struct TracingAuditSink {
	filter: AuditFilterConfig,
}

impl TracingAuditSink {
	pub fn new(filter: AuditFilterConfig) -> Self {
		Self { filter }
	}
}

pub fn severity_to_level(severity: AuditSeverity) -> Level {
	match severity {
		AuditSeverity::Debug => Level::DEBUG,
		AuditSeverity::Info | AuditSeverity::Notice => Level::INFO,
	}
}

macro_rules! emit {
	($macro:ident, $event:expr) => {{
		let event = $event;
		tracing::$macro!(
			target: "tenancy_audit",
			id = %event.id,
			action = %event.action,
			severity = %event.severity,
			resource_type = %event.resource_type,
			scope_id = event.scope_id.as_deref(),
			resource_ids = ?event.resource_ids,
			member_ids = ?event.member_ids,
			changed_columns = ?event.changed_columns,
			before = event.before.as_ref().map(|v| v.to_string()),
			after = event.after.as_ref().map(|v| v.to_string()),
			"mutation"
		)
	}};
}

#[async_trait]
impl AuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	fn filter(&self) -> &AuditFilterConfig {
		&self.filter
	}

	async fn publish(&self, event: Arc<MutationEvent>) -> Result<(), AuditSinkError> {
		let event = event.as_ref();
		match severity_to_level(event.severity) {
			Level::DEBUG => emit!(debug, event),
			_ => emit!(info, event),
		}
		Ok(())
	}
}
