// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mutation event types.
//!
//! - [`MutationAction`]: what happened (created, updated, members added, ...)
//! - [`AuditSeverity`]: RFC 5424-compatible severity levels
//! - [`MutationEvent`]: the payload handed to the notifier
//! - [`MutationEventBuilder`]: fluent construction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
	Created,
	Updated,
	Deleted,
	Read,
	MembersAdded,
	MembersRemoved,
}

impl MutationAction {
	pub fn all() -> &'static [MutationAction] {
		&[
			MutationAction::Created,
			MutationAction::Updated,
			MutationAction::Deleted,
			MutationAction::Read,
			MutationAction::MembersAdded,
			MutationAction::MembersRemoved,
		]
	}

	/// Bulk reads are debug, removals notice, everything else info.
	pub fn default_severity(&self) -> AuditSeverity {
		match self {
			MutationAction::Read => AuditSeverity::Debug,
			MutationAction::Deleted | MutationAction::MembersRemoved => AuditSeverity::Notice,
			MutationAction::Created | MutationAction::Updated | MutationAction::MembersAdded => {
				AuditSeverity::Info
			}
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			MutationAction::Created => "created",
			MutationAction::Updated => "updated",
			MutationAction::Deleted => "deleted",
			MutationAction::Read => "read",
			MutationAction::MembersAdded => "members_added",
			MutationAction::MembersRemoved => "members_removed",
		}
	}
}

impl fmt::Display for MutationAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for MutationAction {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		MutationAction::all()
			.iter()
			.copied()
			.find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| format!("unknown mutation action '{s}'"))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	Debug = 7,
	#[default]
	Info = 6,
	Notice = 5,
}

impl PartialOrd for AuditSeverity {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for AuditSeverity {
	fn cmp(&self, other: &Self) -> Ordering {
		// Lower numeric value = higher severity
		(*other as u8).cmp(&(*self as u8))
	}
}

impl fmt::Display for AuditSeverity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditSeverity::Debug => "debug",
			AuditSeverity::Info => "info",
			AuditSeverity::Notice => "notice",
		};
		write!(f, "{s}")
	}
}

impl FromStr for AuditSeverity {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"debug" => Ok(AuditSeverity::Debug),
			"info" => Ok(AuditSeverity::Info),
			"notice" => Ok(AuditSeverity::Notice),
			_ => Err(format!("unknown audit severity '{s}'")),
		}
	}
}

/// One committed mutation or bulk read.
///
/// Identities are canonical UUID text (or the kind's natural key).
/// `before`/`after` have secret attributes already redacted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationEvent {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub action: MutationAction,
	pub severity: AuditSeverity,
	/// Entity or relationship kind, e.g. `role` or `role_permissions`.
	pub resource_type: String,
	pub scope_id: Option<String>,
	pub resource_ids: Vec<String>,
	/// Relationship members named by the call.
	pub member_ids: Vec<String>,
	pub before: Option<Value>,
	pub after: Option<Value>,
	pub changed_columns: Vec<String>,
}

impl MutationEvent {
	pub fn builder(action: MutationAction, resource_type: impl Into<String>) -> MutationEventBuilder {
		MutationEventBuilder::new(action, resource_type)
	}
}

pub struct MutationEventBuilder {
	action: MutationAction,
	resource_type: String,
	scope_id: Option<String>,
	resource_ids: Vec<String>,
	member_ids: Vec<String>,
	before: Option<Value>,
	after: Option<Value>,
	changed_columns: Vec<String>,
}

impl MutationEventBuilder {
	pub fn new(action: MutationAction, resource_type: impl Into<String>) -> Self {
		Self {
			action,
			resource_type: resource_type.into(),
			scope_id: None,
			resource_ids: Vec::new(),
			member_ids: Vec::new(),
			before: None,
			after: None,
			changed_columns: Vec::new(),
		}
	}

	pub fn scope(mut self, scope_id: Option<&str>) -> Self {
		self.scope_id = scope_id.map(str::to_string);
		self
	}

	pub fn resource(mut self, id: impl Into<String>) -> Self {
		self.resource_ids.push(id.into());
		self
	}

	pub fn resources(mut self, ids: impl IntoIterator<Item = String>) -> Self {
		self.resource_ids.extend(ids);
		self
	}

	pub fn members(mut self, ids: impl IntoIterator<Item = String>) -> Self {
		self.member_ids.extend(ids);
		self
	}

	pub fn before(mut self, state: Value) -> Self {
		self.before = Some(state);
		self
	}

	pub fn after(mut self, state: Value) -> Self {
		self.after = Some(state);
		self
	}

	pub fn changed(mut self, columns: impl IntoIterator<Item = String>) -> Self {
		self.changed_columns.extend(columns);
		self
	}

	pub fn build(self) -> MutationEvent {
		MutationEvent {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			action: self.action,
			severity: self.action.default_severity(),
			resource_type: self.resource_type,
			scope_id: self.scope_id,
			resource_ids: self.resource_ids,
			member_ids: self.member_ids,
			before: self.before,
			after: self.after,
			changed_columns: self.changed_columns,
		}
	}
}
