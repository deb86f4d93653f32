// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of failure classes every engine operation reports.
///
/// Callers map these onto their own surface (HTTP status, exit code);
/// the engine only guarantees that each failure lands in exactly one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	NotFound,
	BadRequest,
	Conflict,
	Forbidden,
	Unexpected,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ErrorKind::NotFound => "not_found",
			ErrorKind::BadRequest => "bad_request",
			ErrorKind::Conflict => "conflict",
			ErrorKind::Forbidden => "forbidden",
			ErrorKind::Unexpected => "unexpected",
		};
		write!(f, "{s}")
	}
}

/// Attribute validation failures raised by an [`crate::AttributeContract`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
	#[error("missing required attribute '{0}'")]
	MissingAttribute(String),

	#[error("attribute '{0}' is not allowed")]
	UnknownAttribute(String),

	#[error("attribute '{attribute}' must be {expected}")]
	InvalidAttribute { attribute: String, expected: String },
}

impl ValidationError {
	pub fn attribute(&self) -> &str {
		match self {
			ValidationError::MissingAttribute(a) | ValidationError::UnknownAttribute(a) => a,
			ValidationError::InvalidAttribute { attribute, .. } => attribute,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_is_snake_case() {
		assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
		assert_eq!(ErrorKind::BadRequest.to_string(), "bad_request");
		assert_eq!(ErrorKind::Unexpected.to_string(), "unexpected");
	}

	#[test]
	fn serde_matches_display() {
		let json = serde_json::to_string(&ErrorKind::Forbidden).unwrap();
		assert_eq!(json, "\"forbidden\"");
	}

	#[test]
	fn validation_error_names_attribute() {
		let err = ValidationError::InvalidAttribute {
			attribute: "email".to_string(),
			expected: "an email address".to_string(),
		};
		assert_eq!(err.attribute(), "email");
		assert_eq!(err.to_string(), "attribute 'email' must be an email address");
	}
}
