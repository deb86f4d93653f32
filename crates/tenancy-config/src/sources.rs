// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::TenancyConfigLayer;
use crate::sections::{AuditConfigLayer, DatabaseConfigLayer, LoggingConfigLayer, PolicyConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<TenancyConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<TenancyConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(TenancyConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/tenancy/tenancy.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<TenancyConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(TenancyConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: TenancyConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: TENANCY_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<TenancyConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(TenancyConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: env_var("TENANCY_DATABASE_URL"),
			}),
			logging: Some(LoggingConfigLayer {
				level: env_var("TENANCY_LOG_LEVEL"),
				json: env_bool("TENANCY_LOG_JSON"),
			}),
			policy: Some(load_policy_from_env()?),
			audit: Some(load_audit_from_env()),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|s| {
		s.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	})
}

fn load_policy_from_env() -> Result<PolicyConfigLayer, ConfigError> {
	Ok(PolicyConfigLayer {
		max_user_keys: env_u32("TENANCY_POLICY_MAX_USER_KEYS")?,
		invitation_ttl_hours: env_u32("TENANCY_POLICY_INVITATION_TTL_HOURS")?,
		default_page_size: env_u32("TENANCY_POLICY_DEFAULT_PAGE_SIZE")?,
		max_page_size: env_u32("TENANCY_POLICY_MAX_PAGE_SIZE")?,
		protected_prefix: env_var("TENANCY_POLICY_PROTECTED_PREFIX"),
	})
}

fn load_audit_from_env() -> AuditConfigLayer {
	AuditConfigLayer {
		enabled: env_bool("TENANCY_AUDIT_ENABLED"),
		actions: env_list("TENANCY_AUDIT_ACTIONS"),
		exclude_actions: env_list("TENANCY_AUDIT_EXCLUDE_ACTIONS"),
		min_severity: env_var("TENANCY_AUDIT_MIN_SEVERITY"),
		sqlite_sink: env_bool("TENANCY_AUDIT_SQLITE_SINK"),
	}
}
