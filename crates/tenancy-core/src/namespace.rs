// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Protected metadata namespace.
//!
//! Metadata keys starting with the reserved prefix hold system-owned data
//! (plan bookkeeping, verification tokens) next to caller metadata. The
//! policy only classifies keys; whether a caller may touch protected keys is
//! decided upstream and passed in as `allow_protected`.

pub const DEFAULT_PROTECTED_PREFIX: &str = "00-";

const MAX_KEY_LEN: usize = 191;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamespaceError {
	#[error("invalid metadata key '{0}'")]
	InvalidKey(String),

	#[error("metadata key '{0}' is protected")]
	Protected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePolicy {
	prefix: String,
}

impl Default for NamespacePolicy {
	fn default() -> Self {
		Self::new(DEFAULT_PROTECTED_PREFIX)
	}
}

impl NamespacePolicy {
	pub fn new(prefix: &str) -> Self {
		Self {
			prefix: normalize(prefix),
		}
	}

	pub fn prefix(&self) -> &str {
		&self.prefix
	}

	/// Classifies the normalised form of `key`.
	pub fn is_protected(&self, key: &str) -> bool {
		normalize(key).starts_with(&self.prefix)
	}

	/// Normalise `key` and gate it on `allow_protected`.
	///
	/// Returns the normalised key to use for storage and comparison.
	pub fn check(&self, key: &str, allow_protected: bool) -> Result<String, NamespaceError> {
		let normalized = normalize(key);
		if !is_valid_key(&normalized) {
			return Err(NamespaceError::InvalidKey(key.to_string()));
		}
		if !allow_protected && normalized.starts_with(&self.prefix) {
			return Err(NamespaceError::Protected(normalized));
		}
		Ok(normalized)
	}
}

/// Canonical key form: trimmed, lowercase, whitespace and underscores
/// turned into `-`, runs of `-` collapsed.
pub fn normalize(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	for c in key.trim().chars() {
		let c = if c.is_whitespace() || c == '_' {
			'-'
		} else {
			c.to_ascii_lowercase()
		};
		if c == '-' && out.ends_with('-') {
			continue;
		}
		out.push(c);
	}
	out
}

fn is_valid_key(key: &str) -> bool {
	!key.is_empty()
		&& key.len() <= MAX_KEY_LEN
		&& key
			.chars()
			.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}
