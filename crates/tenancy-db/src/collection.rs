// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collection queries: field selection, filtering, sorting and pagination
//! over a table or join, restricted to an allow-list of columns.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tenancy_config::PolicyConfig;
use tenancy_core::identity;

use crate::error::DbError;
use crate::kind::{Column, ColumnType, Record};
use crate::sql::{self, bind_all, quote, SqlValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
	Eq,
	Ne,
	Lt,
	Lte,
	Gt,
	Gte,
	Like,
	In,
	Null,
	NotNull,
}

impl FilterOp {
	fn sql(&self) -> &'static str {
		match self {
			FilterOp::Eq => "=",
			FilterOp::Ne => "<>",
			FilterOp::Lt => "<",
			FilterOp::Lte => "<=",
			FilterOp::Gt => ">",
			FilterOp::Gte => ">=",
			FilterOp::Like => "LIKE",
			FilterOp::In => "IN",
			FilterOp::Null => "IS NULL",
			FilterOp::NotNull => "IS NOT NULL",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
	pub field: String,
	pub op: FilterOp,
	#[serde(default)]
	pub value: Value,
}

impl Filter {
	pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
		Self {
			field: field.into(),
			op,
			value,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
	#[default]
	Asc,
	Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
	pub field: String,
	#[serde(default)]
	pub direction: SortDirection,
}

/// Caller-supplied listing arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionQuery {
	/// Columns to return; all selectable columns when absent.
	pub fields: Option<Vec<String>>,
	#[serde(default)]
	pub filters: Vec<Filter>,
	#[serde(default)]
	pub sort: Vec<Sort>,
	/// 1-based.
	pub page: Option<u32>,
	pub limit: Option<u32>,
}

impl CollectionQuery {
	pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Self {
		self.filters.push(Filter::new(field, op, value));
		self
	}

	pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
		self.sort.push(Sort {
			field: field.into(),
			direction,
		});
		self
	}

	pub fn fields(mut self, fields: &[&str]) -> Self {
		self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
		self
	}

	pub fn page(mut self, page: u32, limit: u32) -> Self {
		self.page = Some(page);
		self.limit = Some(limit);
		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
	pub page: u32,
	pub limit: u32,
	pub total: i64,
	pub pages: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
	pub data: Vec<Record>,
	pub pagination: Pagination,
}

impl Collection {
	/// Identity values of the returned rows.
	pub fn ids(&self, identity: &str) -> Vec<String> {
		self.data
			.iter()
			.filter_map(|r| r.get(identity).and_then(Value::as_str).map(str::to_string))
			.collect()
	}
}

/// A SQL predicate with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Condition {
	pub sql: String,
	pub values: Vec<SqlValue>,
}

impl Condition {
	pub fn new(sql: impl Into<String>, values: Vec<SqlValue>) -> Self {
		Self {
			sql: sql.into(),
			values,
		}
	}

	/// Matches no row.
	pub fn never() -> Self {
		Self::new("0", Vec::new())
	}

	/// `alias.column = ?`, or never when the value cannot exist.
	pub fn eq(alias: &str, column: &str, value: Option<SqlValue>) -> Self {
		match value {
			Some(v) => Self::new(format!("{alias}.{} = ?", quote(column)), vec![v]),
			None => Self::never(),
		}
	}
}

/// Table or join description handed to [`fetch`].
pub(crate) struct CollectionSource<'a> {
	/// Entity or relationship name reported with rejected queries.
	pub kind: &'a str,
	pub scope: Option<&'a str>,
	/// `FROM` clause body, with `alias` bound to the listed table.
	pub from: String,
	pub alias: &'a str,
	/// Allow-listed columns of the aliased table.
	pub columns: Vec<Column>,
	/// Always returned.
	pub identity: &'a str,
	pub conditions: Vec<Condition>,
}

impl CollectionSource<'_> {
	fn reject(&self, reason: impl Into<String>) -> DbError {
		DbError::bad_request(self.kind, self.scope, reason)
	}

	fn column(&self, name: &str) -> Result<&Column, DbError> {
		self.columns
			.iter()
			.find(|c| c.name == name)
			.ok_or_else(|| self.reject(format!("unknown field '{name}'")))
	}

	fn qualified(&self, column: &Column) -> String {
		format!("{}.{}", self.alias, quote(column.name))
	}
}

fn resolve_fields(source: &CollectionSource<'_>, query: &CollectionQuery) -> Result<Vec<Column>, DbError> {
	let Some(ref names) = query.fields else {
		return Ok(source.columns.clone());
	};
	let mut columns = vec![*source.column(source.identity)?];
	for name in names {
		let column = *source.column(name)?;
		if !columns.contains(&column) {
			columns.push(column);
		}
	}
	Ok(columns)
}

fn filter_condition(source: &CollectionSource<'_>, filter: &Filter) -> Result<Option<Condition>, DbError> {
	let column = source.column(&filter.field)?;
	let target = source.qualified(column);

	match filter.op {
		FilterOp::Null | FilterOp::NotNull => {
			return Ok(Some(Condition::new(format!("{target} {}", filter.op.sql()), Vec::new())));
		}
		_ if column.ty == ColumnType::Json => {
			return Err(source.reject(format!(
				"field '{}' only supports null checks",
				column.name
			)));
		}
		FilterOp::Like if column.ty != ColumnType::Text => {
			return Err(source.reject(format!(
				"field '{}' does not support like",
				column.name
			)));
		}
		_ => {}
	}

	if filter.op == FilterOp::In {
		let Value::Array(items) = &filter.value else {
			return Err(source.reject(format!(
				"filter 'in' on '{}' requires an array",
				column.name
			)));
		};
		let mut values = Vec::with_capacity(items.len());
		for item in items {
			if let Some(v) = filter_value(source, column, item)? {
				values.push(v);
			}
		}
		if values.is_empty() {
			return Ok(Some(Condition::never()));
		}
		let sql = format!("{target} IN ({})", sql::placeholders(values.len()));
		return Ok(Some(Condition::new(sql, values)));
	}

	match filter_value(source, column, &filter.value)? {
		Some(v) => Ok(Some(Condition::new(
			format!("{target} {} ?", filter.op.sql()),
			vec![v],
		))),
		// A malformed identity equals nothing and differs from everything.
		None if filter.op == FilterOp::Ne => Ok(None),
		None if filter.op == FilterOp::Eq => Ok(Some(Condition::never())),
		None => Err(source.reject(format!(
			"field '{}' only supports eq, ne and in with identities",
			column.name
		))),
	}
}

/// `Ok(None)` marks an identity value that cannot exist.
fn filter_value(
	source: &CollectionSource<'_>,
	column: &Column,
	value: &Value,
) -> Result<Option<SqlValue>, DbError> {
	let mismatch = || source.reject(format!("invalid filter value for '{}'", column.name));
	let encoded = match column.ty {
		ColumnType::Uuid => {
			let text = value.as_str().ok_or_else(mismatch)?;
			return Ok(identity::to_binary(text).ok().map(SqlValue::Blob));
		}
		ColumnType::Text => SqlValue::Text(value.as_str().ok_or_else(mismatch)?.to_string()),
		ColumnType::Timestamp => SqlValue::Text(
			value
				.as_str()
				.and_then(sql::normalize_timestamp)
				.ok_or_else(mismatch)?,
		),
		ColumnType::Bool => SqlValue::Bool(value.as_bool().ok_or_else(mismatch)?),
		ColumnType::Integer => SqlValue::Integer(value.as_i64().ok_or_else(mismatch)?),
		ColumnType::Json | ColumnType::Password | ColumnType::Secret => return Err(mismatch()),
	};
	Ok(Some(encoded))
}

fn order_by(source: &CollectionSource<'_>, query: &CollectionQuery) -> Result<String, DbError> {
	let mut terms = Vec::with_capacity(query.sort.len() + 1);
	for sort in &query.sort {
		let column = source.column(&sort.field)?;
		if column.ty == ColumnType::Json {
			return Err(source.reject(format!(
				"field '{}' is not sortable",
				column.name
			)));
		}
		let direction = match sort.direction {
			SortDirection::Asc => "ASC",
			SortDirection::Desc => "DESC",
		};
		terms.push(format!("{} {direction}", source.qualified(column)));
	}
	// Identity breaks ties so pages are stable.
	terms.push(format!("{}.{} ASC", source.alias, quote(source.identity)));
	Ok(terms.join(", "))
}

/// Run a collection query.
pub(crate) async fn fetch(
	pool: &SqlitePool,
	source: CollectionSource<'_>,
	query: &CollectionQuery,
	policy: &PolicyConfig,
) -> Result<Collection, DbError> {
	let columns = resolve_fields(&source, query)?;

	let mut conditions = source.conditions.clone();
	for filter in &query.filters {
		if let Some(condition) = filter_condition(&source, filter)? {
			conditions.push(condition);
		}
	}
	let order = order_by(&source, query)?;

	let where_clause = if conditions.is_empty() {
		"1".to_string()
	} else {
		conditions
			.iter()
			.map(|c| format!("({})", c.sql))
			.collect::<Vec<_>>()
			.join(" AND ")
	};
	let values: Vec<SqlValue> = conditions.into_iter().flat_map(|c| c.values).collect();

	let limit = query
		.limit
		.unwrap_or(policy.default_page_size)
		.clamp(1, policy.max_page_size.max(1));
	let page = query.page.unwrap_or(1).max(1);
	let offset = i64::from(page - 1) * i64::from(limit);

	let count_sql = format!("SELECT COUNT(*) AS count FROM {} WHERE {where_clause}", source.from);
	let total: i64 = bind_all(sqlx::query(&count_sql), values.clone())
		.fetch_one(pool)
		.await?
		.get("count");

	let select = columns
		.iter()
		.map(|c| format!("{} AS {}", source.qualified(c), quote(c.name)))
		.collect::<Vec<_>>()
		.join(", ");
	let data_sql = format!(
		"SELECT {select} FROM {} WHERE {where_clause} ORDER BY {order} LIMIT ? OFFSET ?",
		source.from
	);
	let mut data_values = values;
	data_values.push(SqlValue::Integer(i64::from(limit)));
	data_values.push(SqlValue::Integer(offset));

	let rows = bind_all(sqlx::query(&data_sql), data_values)
		.fetch_all(pool)
		.await?;

	let mut data = Vec::with_capacity(rows.len());
	for row in &rows {
		let mut record = Record::new();
		for column in &columns {
			record.insert(column.name.to_string(), sql::decode(row, column)?);
		}
		data.push(record);
	}

	let pages = if total == 0 {
		0
	} else {
		(total + i64::from(limit) - 1) / i64::from(limit)
	};

	Ok(Collection {
		data,
		pagination: Pagination {
			page,
			limit,
			total,
			pages,
		},
	})
}
