// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{AuditConfigLayer, DatabaseConfigLayer, LoggingConfigLayer, PolicyConfigLayer};

/// Engine configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenancyConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub policy: Option<PolicyConfigLayer>,
	#[serde(default)]
	pub audit: Option<AuditConfigLayer>,
}

impl TenancyConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: TenancyConfigLayer) {
		merge_option(
			&mut self.database,
			other.database,
			DatabaseConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_option(&mut self.policy, other.policy, PolicyConfigLayer::merge);
		merge_option(&mut self.audit, other.audit, AuditConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_empty_layers() {
		let mut base = TenancyConfigLayer::default();
		base.merge(TenancyConfigLayer::default());
		assert!(base.policy.is_none());
	}

	#[test]
	fn test_merge_other_overwrites() {
		let mut base = TenancyConfigLayer {
			policy: Some(PolicyConfigLayer {
				max_user_keys: Some(5),
				max_page_size: Some(50),
				..Default::default()
			}),
			..Default::default()
		};
		let other = TenancyConfigLayer {
			policy: Some(PolicyConfigLayer {
				max_user_keys: Some(2),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(other);
		let policy = base.policy.unwrap();
		assert_eq!(policy.max_user_keys, Some(2));
		assert_eq!(policy.max_page_size, Some(50));
	}

	#[test]
	fn test_merge_adds_missing_sections() {
		let mut base = TenancyConfigLayer::default();
		base.merge(TenancyConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("sqlite::memory:".to_string()),
			}),
			..Default::default()
		});
		assert_eq!(
			base.database.unwrap().url.as_deref(),
			Some("sqlite::memory:")
		);
	}
}
