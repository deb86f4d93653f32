// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Attribute contracts.
//!
//! A contract declares, per entity kind, which attributes must be present on
//! create, which may be present at all, and the type/format rule each one
//! obeys. Anything not declared is rejected.

use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use serde_json::Value;

use crate::error::ValidationError;
use crate::identity;

/// Caller-supplied attribute map.
pub type Attributes = serde_json::Map<String, Value>;

const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
	/// Non-blank string of at most `max_len` characters.
	Text { max_len: usize },
	Email,
	Uuid,
	Boolean,
	Integer,
	StringArray,
	Object,
	/// Any JSON value except null.
	Json,
	/// RFC 3339 timestamp string.
	Timestamp,
	Nullable(Box<Rule>),
}

impl Rule {
	pub fn text(max_len: usize) -> Self {
		Rule::Text { max_len }
	}

	pub fn nullable(self) -> Self {
		match self {
			Rule::Nullable(_) => self,
			other => Rule::Nullable(Box::new(other)),
		}
	}

	pub fn is_email(&self) -> bool {
		match self {
			Rule::Email => true,
			Rule::Nullable(inner) => inner.is_email(),
			_ => false,
		}
	}

	pub fn accepts(&self, value: &Value) -> bool {
		match (self, value) {
			(Rule::Nullable(_), Value::Null) => true,
			(Rule::Nullable(inner), v) => inner.accepts(v),
			(_, Value::Null) => false,
			(Rule::Text { max_len }, Value::String(s)) => {
				!s.trim().is_empty() && s.chars().count() <= *max_len
			}
			(Rule::Email, Value::String(s)) => is_email(s),
			(Rule::Uuid, Value::String(s)) => identity::is_valid(s),
			(Rule::Boolean, Value::Bool(_)) => true,
			(Rule::Integer, Value::Number(n)) => n.is_i64(),
			(Rule::StringArray, Value::Array(items)) => items.iter().all(Value::is_string),
			(Rule::Object, Value::Object(_)) => true,
			(Rule::Json, _) => true,
			(Rule::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
			_ => false,
		}
	}

	pub fn describe(&self) -> String {
		match self {
			Rule::Text { max_len } => format!("a non-blank string of at most {max_len} characters"),
			Rule::Email => "an email address".to_string(),
			Rule::Uuid => "a UUID".to_string(),
			Rule::Boolean => "a boolean".to_string(),
			Rule::Integer => "an integer".to_string(),
			Rule::StringArray => "an array of strings".to_string(),
			Rule::Object => "an object".to_string(),
			Rule::Json => "a non-null value".to_string(),
			Rule::Timestamp => "an RFC 3339 timestamp".to_string(),
			Rule::Nullable(inner) => format!("null or {}", inner.describe()),
		}
	}
}

fn is_email(s: &str) -> bool {
	if s.len() > MAX_EMAIL_LEN || s.chars().any(char::is_whitespace) {
		return false;
	}
	let Some((local, domain)) = s.split_once('@') else {
		return false;
	};
	!local.is_empty()
		&& !domain.contains('@')
		&& domain.contains('.')
		&& !domain.starts_with('.')
		&& !domain.ends_with('.')
}

/// Trim and lowercase an email address.
pub fn normalize_email(s: &str) -> String {
	s.trim().to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct AttributeContract {
	required: BTreeSet<String>,
	rules: BTreeMap<String, Rule>,
}

impl AttributeContract {
	pub fn builder() -> AttributeContractBuilder {
		AttributeContractBuilder::default()
	}

	pub fn allows(&self, name: &str) -> bool {
		self.rules.contains_key(name)
	}

	pub fn is_required(&self, name: &str) -> bool {
		self.required.contains(name)
	}

	pub fn rule(&self, name: &str) -> Option<&Rule> {
		self.rules.get(name)
	}

	pub fn allowed(&self) -> impl Iterator<Item = &str> {
		self.rules.keys().map(String::as_str)
	}

	/// Canonicalise attribute values whose rule defines a canonical form.
	pub fn normalize(&self, attrs: &mut Attributes) {
		for (name, value) in attrs.iter_mut() {
			if !self.rules.get(name).is_some_and(Rule::is_email) {
				continue;
			}
			if let Some(s) = value.as_str() {
				let normalized = normalize_email(s);
				*value = Value::String(normalized);
			}
		}
	}

	pub fn validate_create(&self, attrs: &Attributes) -> Result<(), ValidationError> {
		self.check_allowed(attrs)?;
		if let Some(missing) = self.required.iter().find(|name| !attrs.contains_key(*name)) {
			return Err(ValidationError::MissingAttribute(missing.clone()));
		}
		self.check_rules(attrs)
	}

	/// Partial updates skip the required check. An empty map passes.
	pub fn validate_update(&self, attrs: &Attributes) -> Result<(), ValidationError> {
		self.check_allowed(attrs)?;
		self.check_rules(attrs)
	}

	fn check_allowed(&self, attrs: &Attributes) -> Result<(), ValidationError> {
		match attrs.keys().find(|name| !self.rules.contains_key(*name)) {
			Some(unknown) => Err(ValidationError::UnknownAttribute(unknown.clone())),
			None => Ok(()),
		}
	}

	fn check_rules(&self, attrs: &Attributes) -> Result<(), ValidationError> {
		for (name, value) in attrs {
			if let Some(rule) = self.rules.get(name) {
				if !rule.accepts(value) {
					return Err(ValidationError::InvalidAttribute {
						attribute: name.clone(),
						expected: rule.describe(),
					});
				}
			}
		}
		Ok(())
	}
}

#[derive(Debug, Default)]
pub struct AttributeContractBuilder {
	contract: AttributeContract,
}

impl AttributeContractBuilder {
	pub fn required(mut self, name: impl Into<String>, rule: Rule) -> Self {
		let name = name.into();
		self.contract.required.insert(name.clone());
		self.contract.rules.insert(name, rule);
		self
	}

	pub fn optional(mut self, name: impl Into<String>, rule: Rule) -> Self {
		self.contract.rules.insert(name.into(), rule);
		self
	}

	pub fn build(self) -> AttributeContract {
		self.contract
	}
}
