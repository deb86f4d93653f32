// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the tenancy engine.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - The read-only policy values the engines consume
//! - Consistent environment variable naming (`TENANCY_*`)
//! - Tracing subscriber bootstrap from the logging section
//!
//! # Usage
//!
//! ```ignore
//! use tenancy_config::{init_tracing, load_config};
//!
//! let config = load_config()?;
//! init_tracing(&config.logging)?;
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::TenancyConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fully resolved engine configuration.
#[derive(Debug, Clone, Default)]
pub struct TenancyConfig {
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub policy: PolicyConfig,
	pub audit: AuditConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TENANCY_*`)
/// 2. Config file (`/etc/tenancy/tenancy.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<TenancyConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<TenancyConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Load configuration from the given sources, applied in precedence order.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<TenancyConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = TenancyConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

fn finalize(layer: TenancyConfigLayer) -> Result<TenancyConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();
	let policy = layer.policy.unwrap_or_default().finalize();
	let audit = layer.audit.unwrap_or_default().finalize();

	database.validate()?;
	policy.validate()?;

	info!(
		database = %database.url,
		max_user_keys = policy.max_user_keys,
		invitation_ttl_hours = policy.invitation_ttl_hours,
		audit_enabled = audit.enabled,
		"Tenancy configuration loaded"
	);

	Ok(TenancyConfig {
		database,
		logging,
		policy,
		audit,
	})
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);
	let result = if config.json {
		registry.with(tracing_subscriber::fmt::layer().json()).try_init()
	} else {
		registry.with(tracing_subscriber::fmt::layer()).try_init()
	};
	result.map_err(|e| ConfigError::Logging(e.to_string()))
}
