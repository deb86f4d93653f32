// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use tenancy_config::AuditConfig;

use crate::error::AuditError;
use crate::event::{AuditSeverity, MutationAction, MutationEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFilterConfig {
	pub min_severity: AuditSeverity,
	pub include_actions: Option<Vec<MutationAction>>,
	pub exclude_actions: Option<Vec<MutationAction>>,
}

impl Default for AuditFilterConfig {
	fn default() -> Self {
		Self {
			min_severity: AuditSeverity::Debug,
			include_actions: None,
			exclude_actions: None,
		}
	}
}

impl AuditFilterConfig {
	/// Build the global filter from the `[audit]` section.
	pub fn from_config(config: &AuditConfig) -> Result<Self, AuditError> {
		let include_actions = config.actions.as_deref().map(parse_actions).transpose()?;
		let exclude_actions = match config.exclude_actions.as_slice() {
			[] => None,
			names => Some(parse_actions(names)?),
		};
		let min_severity = match config.min_severity.as_deref() {
			Some(name) => name
				.parse::<AuditSeverity>()
				.map_err(|_| AuditError::UnknownSeverity(name.to_string()))?,
			None => AuditSeverity::Debug,
		};

		Ok(Self {
			min_severity,
			include_actions,
			exclude_actions,
		})
	}

	pub fn allows(&self, event: &MutationEvent) -> bool {
		if event.severity < self.min_severity {
			return false;
		}

		if let Some(ref exclude) = self.exclude_actions {
			if exclude.contains(&event.action) {
				return false;
			}
		}

		if let Some(ref include) = self.include_actions {
			if !include.contains(&event.action) {
				return false;
			}
		}

		true
	}
}

fn parse_actions(names: &[String]) -> Result<Vec<MutationAction>, AuditError> {
	names
		.iter()
		.map(|name| {
			name.parse::<MutationAction>()
				.map_err(|_| AuditError::UnknownAction(name.clone()))
		})
		.collect()
}
