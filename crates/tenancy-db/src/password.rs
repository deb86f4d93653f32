// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Password and user-key secret hashing.
//!
//! Passwords use Argon2id. Test builds use reduced-cost parameters that
//! MUST NOT be used in production. User-key secrets are high-entropy and
//! stored as a SHA-256 hex digest.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
#[cfg(test)]
use argon2::{Algorithm, Params, Version};
use sha2::{Digest, Sha256};

use crate::error::DbError;

#[inline]
fn argon2_instance() -> Argon2<'static> {
	#[cfg(test)]
	{
		// Memory: 1 MiB, iterations: 1, parallelism: 1
		let params = Params::new(1024, 1, 1, None).expect("valid Argon2 params for tests");
		Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
	}

	#[cfg(not(test))]
	{
		Argon2::default()
	}
}

pub fn hash_password(password: &str) -> Result<String, DbError> {
	let salt = SaltString::generate(&mut OsRng);
	argon2_instance()
		.hash_password(password.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|e| DbError::Internal(format!("failed to hash password: {e}")))
}

/// `false` for a mismatch; an unparseable stored hash is an internal error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, DbError> {
	let parsed = PasswordHash::new(hash)
		.map_err(|e| DbError::Internal(format!("invalid password hash: {e}")))?;
	Ok(argon2_instance()
		.verify_password(password.as_bytes(), &parsed)
		.is_ok())
}

pub fn hash_secret(secret: &str) -> String {
	hex::encode(Sha256::digest(secret.as_bytes()))
}
