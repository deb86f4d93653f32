// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Engine policy values: key limits, invitation lifetime, paging bounds and
//! the protected metadata prefix.

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_MAX_USER_KEYS: u32 = 10;
const DEFAULT_INVITATION_TTL_HOURS: u32 = 72;
const DEFAULT_PAGE_SIZE: u32 = 25;
const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_PROTECTED_PREFIX: &str = "00-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
	pub max_user_keys: u32,
	pub invitation_ttl_hours: u32,
	pub default_page_size: u32,
	pub max_page_size: u32,
	pub protected_prefix: String,
}

impl Default for PolicyConfig {
	fn default() -> Self {
		PolicyConfigLayer::default().finalize()
	}
}

impl PolicyConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_user_keys == 0 {
			return Err(ConfigError::Validation(
				"policy.max_user_keys must be at least 1".to_string(),
			));
		}
		if self.max_page_size == 0 {
			return Err(ConfigError::Validation(
				"policy.max_page_size must be at least 1".to_string(),
			));
		}
		if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
			return Err(ConfigError::Validation(format!(
				"policy.default_page_size must be between 1 and {}",
				self.max_page_size
			)));
		}
		if self.protected_prefix.trim().is_empty() {
			return Err(ConfigError::Validation(
				"policy.protected_prefix must not be empty".to_string(),
			));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PolicyConfigLayer {
	#[serde(default)]
	pub max_user_keys: Option<u32>,
	#[serde(default)]
	pub invitation_ttl_hours: Option<u32>,
	#[serde(default)]
	pub default_page_size: Option<u32>,
	#[serde(default)]
	pub max_page_size: Option<u32>,
	#[serde(default)]
	pub protected_prefix: Option<String>,
}

impl PolicyConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.max_user_keys.is_some() {
			self.max_user_keys = other.max_user_keys;
		}
		if other.invitation_ttl_hours.is_some() {
			self.invitation_ttl_hours = other.invitation_ttl_hours;
		}
		if other.default_page_size.is_some() {
			self.default_page_size = other.default_page_size;
		}
		if other.max_page_size.is_some() {
			self.max_page_size = other.max_page_size;
		}
		if other.protected_prefix.is_some() {
			self.protected_prefix = other.protected_prefix;
		}
	}

	pub fn finalize(self) -> PolicyConfig {
		PolicyConfig {
			max_user_keys: self.max_user_keys.unwrap_or(DEFAULT_MAX_USER_KEYS),
			invitation_ttl_hours: self
				.invitation_ttl_hours
				.unwrap_or(DEFAULT_INVITATION_TTL_HOURS),
			default_page_size: self.default_page_size.unwrap_or(DEFAULT_PAGE_SIZE),
			max_page_size: self.max_page_size.unwrap_or(DEFAULT_MAX_PAGE_SIZE),
			protected_prefix: self
				.protected_prefix
				.unwrap_or_else(|| DEFAULT_PROTECTED_PREFIX.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = PolicyConfig::default();
		assert_eq!(config.max_user_keys, 10);
		assert_eq!(config.invitation_ttl_hours, 72);
		assert_eq!(config.default_page_size, 25);
		assert_eq!(config.max_page_size, 100);
		assert_eq!(config.protected_prefix, "00-");
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_merge_keeps_unset_fields() {
		let mut base = PolicyConfigLayer {
			max_user_keys: Some(3),
			..Default::default()
		};
		base.merge(PolicyConfigLayer {
			invitation_ttl_hours: Some(1),
			..Default::default()
		});
		let config = base.finalize();
		assert_eq!(config.max_user_keys, 3);
		assert_eq!(config.invitation_ttl_hours, 1);
	}

	#[test]
	fn test_validate_rejects_bad_paging() {
		let config = PolicyConfig {
			default_page_size: 200,
			..Default::default()
		};
		assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

		let config = PolicyConfig {
			max_user_keys: 0,
			..Default::default()
		};
		assert!(config.validate().is_err());
	}
}
