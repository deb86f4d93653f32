// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage location of the tenancy directory.
//!
//! The engine only speaks SQLite, so the URL must use the `sqlite:` scheme
//! and name a file (or `:memory:`).

use serde::Deserialize;

use crate::error::ConfigError;

const SCHEME: &str = "sqlite:";
const DEFAULT_URL: &str = "sqlite:./tenancy.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
	pub url: String,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		DatabaseConfigLayer::default().finalize()
	}
}

impl DatabaseConfig {
	/// Path part of the URL, without the scheme or `//` prefix.
	pub fn path(&self) -> &str {
		let rest = self.url.strip_prefix(SCHEME).unwrap_or(&self.url);
		let rest = rest.strip_prefix("//").unwrap_or(rest);
		rest.split('?').next().unwrap_or_default()
	}

	pub fn is_in_memory(&self) -> bool {
		self.path() == ":memory:"
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.url.starts_with(SCHEME) {
			return Err(ConfigError::InvalidValue {
				key: "database.url".to_string(),
				message: format!("'{}' is not a sqlite: URL", self.url),
			});
		}
		if self.path().trim().is_empty() {
			return Err(ConfigError::InvalidValue {
				key: "database.url".to_string(),
				message: "no database file given".to_string(),
			});
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		DatabaseConfig {
			url: self
				.url
				.map(|u| u.trim().to_string())
				.unwrap_or_else(|| DEFAULT_URL.to_string()),
		}
	}
}
