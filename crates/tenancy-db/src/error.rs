// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tenancy_core::ErrorKind;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Bad request: {0}")]
	BadRequest(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Forbidden: {0}")]
	Forbidden(String),

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
	/// Collapse onto the caller-facing taxonomy.
	pub fn kind(&self) -> ErrorKind {
		match self {
			DbError::NotFound(_) => ErrorKind::NotFound,
			DbError::BadRequest(_) => ErrorKind::BadRequest,
			DbError::Conflict(_) => ErrorKind::Conflict,
			DbError::Forbidden(_) => ErrorKind::Forbidden,
			DbError::Sqlx(_) | DbError::Internal(_) | DbError::Serialization(_) => {
				ErrorKind::Unexpected
			}
		}
	}

	pub(crate) fn not_found(kind: &str, scope: Option<&str>, id: &str) -> Self {
		debug!(kind, scope, id, "resource not found");
		DbError::NotFound(format!("{kind} '{id}' not found"))
	}

	pub(crate) fn bad_request(kind: &str, scope: Option<&str>, reason: impl Into<String>) -> Self {
		let reason = reason.into();
		debug!(kind, scope, reason = %reason, "rejected request");
		DbError::BadRequest(reason)
	}

	pub(crate) fn conflict(kind: &str, scope: Option<&str>, reason: impl Into<String>) -> Self {
		let reason = reason.into();
		debug!(kind, scope, reason = %reason, "uniqueness conflict");
		DbError::Conflict(reason)
	}

	pub(crate) fn forbidden(kind: &str, scope: Option<&str>, reason: impl Into<String>) -> Self {
		let reason = reason.into();
		tracing::warn!(kind, scope, reason = %reason, "forbidden operation");
		DbError::Forbidden(reason)
	}

	/// Translate a unique-constraint violation into `Conflict`.
	pub(crate) fn from_write(e: sqlx::Error, kind: &str, scope: Option<&str>) -> Self {
		match e {
			sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
				DbError::conflict(kind, scope, format!("{kind} already exists"))
			}
			_ => DbError::Sqlx(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_kind_mapping() {
		assert_eq!(DbError::NotFound("x".into()).kind(), ErrorKind::NotFound);
		assert_eq!(DbError::BadRequest("x".into()).kind(), ErrorKind::BadRequest);
		assert_eq!(DbError::Conflict("x".into()).kind(), ErrorKind::Conflict);
		assert_eq!(DbError::Forbidden("x".into()).kind(), ErrorKind::Forbidden);
		assert_eq!(DbError::Internal("x".into()).kind(), ErrorKind::Unexpected);
		assert_eq!(
			DbError::Sqlx(sqlx::Error::PoolTimedOut).kind(),
			ErrorKind::Unexpected
		);
	}

	#[test]
	fn test_non_unique_write_errors_stay_infrastructure() {
		let err = DbError::from_write(sqlx::Error::PoolClosed, "role", None);
		assert!(matches!(err, DbError::Sqlx(_)));
	}
}
