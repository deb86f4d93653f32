// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde_json::{Map, Value};

/// Marker substituted for secret attribute values.
pub const REDACTED: &str = "[REDACTED]";

/// Replace the value of every present secret attribute with [`REDACTED`].
pub fn redact_attributes(attrs: &mut Map<String, Value>, secrets: &[&str]) {
	for name in secrets {
		if let Some(value) = attrs.get_mut(*name) {
			*value = Value::String(REDACTED.to_string());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn redacts_only_present_secrets() {
		let mut attrs = json!({"email": "a@example.com", "password": "hunter22"})
			.as_object()
			.cloned()
			.unwrap();
		redact_attributes(&mut attrs, &["password", "key_hash"]);
		assert_eq!(attrs["password"], json!(REDACTED));
		assert_eq!(attrs["email"], json!("a@example.com"));
		assert!(!attrs.contains_key("key_hash"));
	}
}
