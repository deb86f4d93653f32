// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use tracing::warn;

use crate::error::DbError;

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./tenancy.db")
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid or connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Commit on success; roll back explicitly before surfacing an error.
pub(crate) async fn finish<T>(
	tx: Transaction<'static, Sqlite>,
	result: Result<T, DbError>,
) -> Result<T, DbError> {
	match result {
		Ok(value) => {
			tx.commit().await?;
			Ok(value)
		}
		Err(e) => {
			if let Err(rollback) = tx.rollback().await {
				warn!(error = %rollback, "transaction rollback failed");
			}
			warn!(error = %e, "transaction rolled back");
			Err(e)
		}
	}
}
