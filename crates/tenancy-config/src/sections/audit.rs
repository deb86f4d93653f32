// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit configuration section.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AuditConfigLayer {
	pub enabled: Option<bool>,
	/// Action names to record; absent means every action.
	pub actions: Option<Vec<String>>,
	/// Action names never recorded, even when listed in `actions`.
	pub exclude_actions: Option<Vec<String>>,
	/// Least important severity still recorded (`debug`, `info` or `notice`).
	pub min_severity: Option<String>,
	pub sqlite_sink: Option<bool>,
}

impl AuditConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.actions.is_some() {
			self.actions = other.actions;
		}
		if other.exclude_actions.is_some() {
			self.exclude_actions = other.exclude_actions;
		}
		if other.min_severity.is_some() {
			self.min_severity = other.min_severity;
		}
		if other.sqlite_sink.is_some() {
			self.sqlite_sink = other.sqlite_sink;
		}
	}

	pub fn finalize(self) -> AuditConfig {
		AuditConfig {
			enabled: self.enabled.unwrap_or(true),
			actions: self.actions,
			exclude_actions: self.exclude_actions.unwrap_or_default(),
			min_severity: self.min_severity,
			sqlite_sink: self.sqlite_sink.unwrap_or(false),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
	pub enabled: bool,
	pub actions: Option<Vec<String>>,
	pub exclude_actions: Vec<String>,
	pub min_severity: Option<String>,
	pub sqlite_sink: bool,
}

impl Default for AuditConfig {
	fn default() -> Self {
		AuditConfigLayer::default().finalize()
	}
}
