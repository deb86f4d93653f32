// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Conversion between attribute values and SQLite parameters/columns.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};
use tenancy_core::identity;

use crate::error::DbError;
use crate::kind::{Column, ColumnType};

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
	Null,
	Text(String),
	Blob(Vec<u8>),
	Integer(i64),
	Bool(bool),
}

pub(crate) fn bind_all(mut query: SqliteQuery<'_>, values: Vec<SqlValue>) -> SqliteQuery<'_> {
	for value in values {
		query = match value {
			SqlValue::Null => query.bind(None::<String>),
			SqlValue::Text(s) => query.bind(s),
			SqlValue::Blob(b) => query.bind(b),
			SqlValue::Integer(i) => query.bind(i),
			SqlValue::Bool(b) => query.bind(b),
		};
	}
	query
}

/// Double-quote an identifier taken from a kind descriptor.
pub(crate) fn quote(ident: &str) -> String {
	format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn placeholders(n: usize) -> String {
	vec!["?"; n].join(", ")
}

pub(crate) fn now() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Canonical stored form of a timestamp: UTC, microsecond precision.
pub(crate) fn normalize_timestamp(s: &str) -> Option<String> {
	DateTime::parse_from_rfc3339(s)
		.ok()
		.map(|t| t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Encode a validated attribute value for `column`.
///
/// Password columns must be hashed by the caller first. Rejections are
/// reported against `kind`.
pub(crate) fn encode(kind: &str, column: &Column, value: &Value) -> Result<SqlValue, DbError> {
	if value.is_null() {
		return Ok(SqlValue::Null);
	}
	let mismatch = || {
		DbError::bad_request(kind, None, format!("attribute '{}' has the wrong type", column.name))
	};
	match column.ty {
		ColumnType::Uuid => {
			let text = value.as_str().ok_or_else(mismatch)?;
			identity::to_binary(text)
				.map(SqlValue::Blob)
				.map_err(|e| DbError::bad_request(kind, None, e.to_string()))
		}
		ColumnType::Text | ColumnType::Password | ColumnType::Secret => value
			.as_str()
			.map(|s| SqlValue::Text(s.to_string()))
			.ok_or_else(mismatch),
		ColumnType::Timestamp => value
			.as_str()
			.and_then(normalize_timestamp)
			.map(SqlValue::Text)
			.ok_or_else(mismatch),
		ColumnType::Bool => value.as_bool().map(SqlValue::Bool).ok_or_else(mismatch),
		ColumnType::Integer => value.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
		ColumnType::Json => Ok(SqlValue::Text(serde_json::to_string(value)?)),
	}
}

pub(crate) fn decode(row: &SqliteRow, column: &Column) -> Result<Value, DbError> {
	let name = column.name;
	let value = match column.ty {
		ColumnType::Uuid => match row.try_get::<Option<Vec<u8>>, _>(name)? {
			Some(bytes) => Value::String(
				identity::to_text(&bytes).map_err(|e| DbError::Internal(e.to_string()))?,
			),
			None => Value::Null,
		},
		ColumnType::Text | ColumnType::Timestamp | ColumnType::Password | ColumnType::Secret => {
			row.try_get::<Option<String>, _>(name)?
				.map(Value::String)
				.unwrap_or(Value::Null)
		}
		ColumnType::Bool => row
			.try_get::<Option<bool>, _>(name)?
			.map(Value::Bool)
			.unwrap_or(Value::Null),
		ColumnType::Integer => row
			.try_get::<Option<i64>, _>(name)?
			.map(Value::from)
			.unwrap_or(Value::Null),
		ColumnType::Json => match row.try_get::<Option<String>, _>(name)? {
			Some(raw) => serde_json::from_str(&raw)?,
			None => Value::Null,
		},
	};
	Ok(value)
}
