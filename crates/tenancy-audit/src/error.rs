// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit pipeline errors. None of these reach the caller of a mutation;
//! the notifier logs sink failures and the directory rejects bad filters
//! when it is opened.

use thiserror::Error;

use crate::event::MutationAction;

#[derive(Error, Debug)]
pub enum AuditError {
	#[error("audit sink '{sink}' dropped {action} event for {resource_type}: {source}")]
	Publish {
		sink: String,
		action: MutationAction,
		resource_type: String,
		#[source]
		source: AuditSinkError,
	},

	#[error("unknown audited action '{0}'")]
	UnknownAction(String),

	#[error("unknown audit severity '{0}'")]
	UnknownSeverity(String),
}

#[derive(Error, Debug)]
pub enum AuditSinkError {
	/// The audit store was locked or unreachable; a later event may succeed.
	#[error("audit store unavailable: {0}")]
	StoreUnavailable(String),

	/// The event itself could not be recorded.
	#[error("event rejected: {0}")]
	Rejected(String),
}

impl AuditSinkError {
	pub fn is_retryable(&self) -> bool {
		matches!(self, AuditSinkError::StoreUnavailable(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_publish_error_names_the_event() {
		let error = AuditError::Publish {
			sink: "sqlite".to_string(),
			action: MutationAction::MembersRemoved,
			resource_type: "tenant_users".to_string(),
			source: AuditSinkError::Rejected("bad payload".to_string()),
		};
		assert_eq!(
			error.to_string(),
			"audit sink 'sqlite' dropped members_removed event for tenant_users: event rejected: bad payload"
		);
	}

	#[test]
	fn test_only_unavailable_store_is_retryable() {
		assert!(AuditSinkError::StoreUnavailable("locked".to_string()).is_retryable());
		assert!(!AuditSinkError::Rejected("bad".to_string()).is_retryable());
	}
}
