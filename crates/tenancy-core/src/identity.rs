// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity codec.
//!
//! Every external contract (records, events, logs) carries identities as
//! canonical lowercase hyphenated UUID text. Storage keeps the 16-byte
//! binary form. Conversion happens only at the storage boundary.

use uuid::Uuid;

/// Length of the canonical hyphenated text form.
pub const TEXT_LEN: usize = 36;

/// Length of the binary form.
pub const BINARY_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
	#[error("invalid identity: {0}")]
	InvalidIdentity(String),
}

/// Produce a fresh identity in both representations.
pub fn new_identity() -> (String, Vec<u8>) {
	let id = Uuid::new_v4();
	(id.hyphenated().to_string(), id.as_bytes().to_vec())
}

/// True iff `text` is a hyphenated UUID (either case).
pub fn is_valid(text: &str) -> bool {
	parse(text).is_some()
}

/// Convert canonical text to the binary storage form.
pub fn to_binary(text: &str) -> Result<Vec<u8>, IdentityError> {
	parse(text)
		.map(|id| id.as_bytes().to_vec())
		.ok_or_else(|| IdentityError::InvalidIdentity(text.to_string()))
}

/// Convert the binary storage form to canonical text.
pub fn to_text(binary: &[u8]) -> Result<String, IdentityError> {
	Uuid::from_slice(binary)
		.map(|id| id.hyphenated().to_string())
		.map_err(|_| IdentityError::InvalidIdentity(hex_preview(binary)))
}

/// Canonicalise `text`, or `None` when it is not an identity.
pub fn canonical(text: &str) -> Option<String> {
	parse(text).map(|id| id.hyphenated().to_string())
}

fn parse(text: &str) -> Option<Uuid> {
	// Uuid::try_parse also accepts simple, braced and urn forms.
	if text.len() != TEXT_LEN {
		return None;
	}
	Uuid::try_parse(text).ok()
}

fn hex_preview(binary: &[u8]) -> String {
	let shown: String = binary.iter().take(BINARY_LEN).map(|b| format!("{b:02x}")).collect();
	format!("{} bytes: {shown}", binary.len())
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn new_identity_forms_agree() {
		let (text, binary) = new_identity();
		assert_eq!(text.len(), TEXT_LEN);
		assert_eq!(binary.len(), BINARY_LEN);
		assert_eq!(to_binary(&text).unwrap(), binary);
		assert_eq!(to_text(&binary).unwrap(), text);
	}

	#[test]
	fn uppercase_input_is_canonicalised() {
		let text = "A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11";
		let binary = to_binary(text).unwrap();
		assert_eq!(to_text(&binary).unwrap(), text.to_lowercase());
	}

	#[test]
	fn rejects_non_hyphenated_forms() {
		assert!(!is_valid("a0eebc999c0b4ef8bb6d6bb9bd380a11"));
		assert!(!is_valid("{a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11}"));
		assert!(!is_valid("urn:uuid:a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"));
		assert!(!is_valid(""));
		assert!(!is_valid("not-a-uuid"));
	}

	#[test]
	fn to_binary_reports_input() {
		let err = to_binary("nope").unwrap_err();
		assert_eq!(err, IdentityError::InvalidIdentity("nope".to_string()));
	}

	#[test]
	fn to_text_requires_sixteen_bytes() {
		assert!(to_text(&[0u8; 15]).is_err());
		assert!(to_text(&[0u8; 17]).is_err());
		assert_eq!(
			to_text(&[0u8; 16]).unwrap(),
			"00000000-0000-0000-0000-000000000000"
		);
	}

	proptest! {
		#[test]
		fn any_sixteen_bytes_survive_text(bytes in proptest::array::uniform16(any::<u8>())) {
			let text = to_text(&bytes).unwrap();
			prop_assert!(is_valid(&text));
			prop_assert_eq!(to_binary(&text).unwrap(), bytes.to_vec());
		}

		#[test]
		fn arbitrary_short_strings_are_never_identities(s in "[a-z0-9-]{0,35}") {
			prop_assert!(!is_valid(&s));
			prop_assert!(to_binary(&s).is_err());
		}
	}
}
