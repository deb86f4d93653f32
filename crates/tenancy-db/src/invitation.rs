// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant invitations, keyed by the invitee's email address.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::Row;
use tenancy_audit::{MutationAction, MutationEvent, MutationNotifier};
use tenancy_config::PolicyConfig;
use tenancy_core::attributes::normalize_email;
use tenancy_core::{identity, Attributes};

use crate::collection::{Collection, CollectionQuery};
use crate::error::DbError;
use crate::kind::Record;
use crate::pool::finish;
use crate::relationship::{RelationshipRepository, Scope};
use crate::resource::ResourceRepository;
use crate::sql;

#[async_trait]
pub trait InvitationStore: Send + Sync {
	async fn count(&self, tenant: &str) -> Result<i64, DbError>;
	async fn exists(&self, tenant: &str, email: &str) -> Result<bool, DbError>;
	async fn create(&self, tenant: &str, attrs: Attributes) -> Result<String, DbError>;
	async fn get(&self, tenant: &str, email: &str) -> Result<Record, DbError>;
	async fn get_collection(&self, tenant: &str, query: &CollectionQuery)
		-> Result<Collection, DbError>;
	async fn delete(&self, tenant: &str, email: &str) -> Result<(), DbError>;
	async fn accept(&self, tenant: &str, email: &str, user_id: &str) -> Result<(), DbError>;
	async fn purge_expired(&self, tenant: &str) -> Result<u64, DbError>;
}

#[async_trait]
impl InvitationStore for InvitationRepository {
	async fn count(&self, tenant: &str) -> Result<i64, DbError> {
		self.count(tenant).await
	}

	async fn exists(&self, tenant: &str, email: &str) -> Result<bool, DbError> {
		self.exists(tenant, email).await
	}

	async fn create(&self, tenant: &str, attrs: Attributes) -> Result<String, DbError> {
		self.create(tenant, attrs).await
	}

	async fn get(&self, tenant: &str, email: &str) -> Result<Record, DbError> {
		self.get(tenant, email).await
	}

	async fn get_collection(
		&self,
		tenant: &str,
		query: &CollectionQuery,
	) -> Result<Collection, DbError> {
		self.get_collection(tenant, query).await
	}

	async fn delete(&self, tenant: &str, email: &str) -> Result<(), DbError> {
		self.delete(tenant, email).await
	}

	async fn accept(&self, tenant: &str, email: &str, user_id: &str) -> Result<(), DbError> {
		self.accept(tenant, email, user_id).await
	}

	async fn purge_expired(&self, tenant: &str) -> Result<u64, DbError> {
		self.purge_expired(tenant).await
	}
}

#[derive(Clone)]
pub struct InvitationRepository {
	invitations: ResourceRepository,
	roles: ResourceRepository,
	users: ResourceRepository,
	members: RelationshipRepository,
	user_roles: RelationshipRepository,
	notifier: Arc<dyn MutationNotifier>,
	policy: Arc<PolicyConfig>,
}

impl InvitationRepository {
	pub fn new(
		invitations: ResourceRepository,
		roles: ResourceRepository,
		users: ResourceRepository,
		members: RelationshipRepository,
		user_roles: RelationshipRepository,
		notifier: Arc<dyn MutationNotifier>,
		policy: Arc<PolicyConfig>,
	) -> Self {
		Self {
			invitations,
			roles,
			users,
			members,
			user_roles,
			notifier,
			policy,
		}
	}

	pub async fn count(&self, tenant: &str) -> Result<i64, DbError> {
		self.invitations.count(Some(tenant)).await
	}

	pub async fn exists(&self, tenant: &str, email: &str) -> Result<bool, DbError> {
		self.invitations
			.exists(Some(tenant), &normalize_email(email))
			.await
	}

	/// Invite an email address, optionally with a role granted on acceptance.
	///
	/// Returns the normalised email.
	#[tracing::instrument(skip(self, attrs))]
	pub async fn create(&self, tenant: &str, attrs: Attributes) -> Result<String, DbError> {
		self.invitations.scope_exists(Some(tenant)).await?;
		if let Some(role) = attrs.get("role").and_then(Value::as_str) {
			if identity::is_valid(role) && !self.roles.exists(Some(tenant), role).await? {
				return Err(DbError::bad_request(
					"invitation",
					Some(tenant),
					format!("role '{role}' does not exist in the tenant"),
				));
			}
		}

		let ttl = Duration::hours(i64::from(self.policy.invitation_ttl_hours));
		let expires_at = (Utc::now() + ttl).to_rfc3339_opts(SecondsFormat::Micros, true);
		let mut system = Attributes::new();
		system.insert("expires_at".to_string(), Value::String(expires_at));

		self.invitations
			.create_with(Some(tenant), attrs, system)
			.await
	}

	pub async fn get(&self, tenant: &str, email: &str) -> Result<Record, DbError> {
		self.invitations
			.get(Some(tenant), &normalize_email(email), &[])
			.await
	}

	pub async fn get_collection(
		&self,
		tenant: &str,
		query: &CollectionQuery,
	) -> Result<Collection, DbError> {
		self.invitations.get_collection(Some(tenant), query).await
	}

	pub async fn delete(&self, tenant: &str, email: &str) -> Result<(), DbError> {
		self.invitations
			.delete(Some(tenant), &normalize_email(email))
			.await
	}

	/// Turn an invitation into a membership.
	///
	/// The accepting user's email must match the invitation, which must not
	/// have expired. Membership, the invited role and removal of the
	/// invitation commit together.
	#[tracing::instrument(skip(self))]
	pub async fn accept(&self, tenant: &str, email: &str, user_id: &str) -> Result<(), DbError> {
		let email = normalize_email(email);
		let invitation = self
			.invitations
			.fetch_record(Some(tenant), &email)
			.await?
			.ok_or_else(|| DbError::not_found("invitation", Some(tenant), &email))?;

		let expired = invitation
			.get("expires_at")
			.and_then(Value::as_str)
			.map_or(true, |at| at < sql::now().as_str());
		if expired {
			return Err(DbError::bad_request(
				"invitation",
				Some(tenant),
				format!("invitation for '{email}' has expired"),
			));
		}

		let user = self
			.users
			.fetch_record(None, user_id)
			.await?
			.ok_or_else(|| DbError::not_found("user", None, user_id))?;
		if user.get("email").and_then(Value::as_str) != Some(email.as_str()) {
			return Err(DbError::forbidden(
				"invitation",
				Some(tenant),
				"invitation was issued to a different email address",
			));
		}

		let mut role = invitation
			.get("role")
			.and_then(Value::as_str)
			.map(str::to_string);
		if let Some(ref role_id) = role {
			if !self.roles.exists(Some(tenant), role_id).await? {
				tracing::warn!(tenant, role = %role_id, "invited role no longer exists; skipping");
				role = None;
			}
		}

		let internal = |e: identity::IdentityError| DbError::Internal(e.to_string());
		let tenant_id = identity::to_binary(tenant).map_err(internal)?;
		let user_bin = identity::to_binary(user_id).map_err(internal)?;
		let role_bin = role.as_deref().map(identity::to_binary).transpose().map_err(internal)?;

		let mut tx = self.invitations.pool().begin().await?;
		let result = async {
			self.members
				.link(&mut *tx, &Scope::Unscoped, &tenant_id, &user_bin)
				.await?;
			if let Some(ref role_bin) = role_bin {
				self.user_roles
					.link(&mut *tx, &Scope::Tenant(tenant_id.clone()), &user_bin, role_bin)
					.await?;
			}
			sqlx::query("DELETE FROM tenant_invitations WHERE tenant_id = ? AND email = ?")
				.bind(&tenant_id)
				.bind(&email)
				.execute(&mut *tx)
				.await?;
			Ok::<(), DbError>(())
		}
		.await;
		finish(tx, result).await?;

		tracing::info!(tenant, user_id, "invitation accepted");
		let event = MutationEvent::builder(MutationAction::MembersAdded, "tenant_users")
			.scope(Some(tenant))
			.resource(tenant)
			.members([user_id.to_string()])
			.before(Value::Object(invitation))
			.build();
		self.notifier.notify(event).await;
		Ok(())
	}

	/// Delete every expired invitation of a tenant; returns how many went.
	#[tracing::instrument(skip(self))]
	pub async fn purge_expired(&self, tenant: &str) -> Result<u64, DbError> {
		let Ok(tenant_id) = identity::to_binary(tenant) else {
			return Ok(0);
		};
		let now = sql::now();

		let mut tx = self.invitations.pool().begin().await?;
		let result = async {
			let rows = sqlx::query(
				"SELECT email FROM tenant_invitations WHERE tenant_id = ? AND expires_at < ?",
			)
			.bind(&tenant_id)
			.bind(&now)
			.fetch_all(&mut *tx)
			.await?;
			let emails = rows
				.iter()
				.map(|row| row.try_get::<String, _>("email"))
				.collect::<Result<Vec<_>, _>>()?;
			if emails.is_empty() {
				return Ok::<_, DbError>((emails, 0));
			}

			let purged = sqlx::query(
				"DELETE FROM tenant_invitations WHERE tenant_id = ? AND expires_at < ?",
			)
			.bind(&tenant_id)
			.bind(&now)
			.execute(&mut *tx)
			.await?
			.rows_affected();
			Ok::<_, DbError>((emails, purged))
		}
		.await;
		let (emails, purged) = finish(tx, result).await?;
		if purged == 0 {
			return Ok(0);
		}

		tracing::debug!(tenant, purged, "expired invitations purged");
		let event = MutationEvent::builder(MutationAction::Deleted, "invitation")
			.scope(Some(tenant))
			.resources(emails)
			.build();
		self.notifier.notify(event).await;
		Ok(purged)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{attrs, TestDirectory};
	use serde_json::json;
	use tenancy_core::ErrorKind;

	async fn expire(dir: &TestDirectory, tenant: &str, email: &str) {
		sqlx::query("UPDATE tenant_invitations SET expires_at = ? WHERE tenant_id = ? AND email = ?")
			.bind("2000-01-01T00:00:00.000000Z")
			.bind(identity::to_binary(tenant).unwrap())
			.bind(email)
			.execute(&dir.pool)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_create_sets_expiry_and_normalises_email() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let email = dir
			.invitations()
			.create(&tenant, attrs(json!({"email": "New@Example.com"})))
			.await
			.unwrap();
		assert_eq!(email, "new@example.com");

		let record = dir.invitations().get(&tenant, "NEW@example.com").await.unwrap();
		let expires = record["expires_at"].as_str().unwrap();
		assert!(expires > sql::now().as_str());

		let err = dir
			.invitations()
			.create(&tenant, attrs(json!({"email": "new@example.com"})))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Conflict);
	}

	#[tokio::test]
	async fn test_role_must_exist_in_tenant() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let (other, _) = dir.tenant("other").await;
		let foreign = dir.role(&other, "admin").await;

		let err = dir
			.invitations()
			.create(&tenant, attrs(json!({"email": "a@example.com", "role": foreign})))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::BadRequest);
	}

	#[tokio::test]
	async fn test_invitation_to_missing_tenant_is_not_found() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "editor").await;
		let (missing, _) = identity::new_identity();

		for input in [
			json!({"email": "a@example.com", "role": role}),
			json!({"email": "a@example.com"}),
		] {
			let err = dir
				.invitations()
				.create(&missing, attrs(input))
				.await
				.unwrap_err();
			assert_eq!(err.kind(), ErrorKind::NotFound);
		}
	}

	#[tokio::test]
	async fn test_accept_grants_membership_and_role() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let role = dir.role(&tenant, "editor").await;
		let user = dir.user("joiner@example.com").await;
		dir.invitations()
			.create(&tenant, attrs(json!({"email": "joiner@example.com", "role": role})))
			.await
			.unwrap();

		dir.invitations()
			.accept(&tenant, "joiner@example.com", &user)
			.await
			.unwrap();

		assert!(dir.tenant_users().has(None, &tenant, &user).await.unwrap());
		assert!(dir.user_roles().has(Some(&tenant), &user, &role).await.unwrap());
		assert!(!dir.invitations().exists(&tenant, "joiner@example.com").await.unwrap());
	}

	#[tokio::test]
	async fn test_accept_rejects_other_users_and_expired() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let stranger = dir.user("stranger@example.com").await;
		let invitee = dir.user("invitee@example.com").await;
		dir.invitations()
			.create(&tenant, attrs(json!({"email": "invitee@example.com"})))
			.await
			.unwrap();

		let err = dir
			.invitations()
			.accept(&tenant, "invitee@example.com", &stranger)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Forbidden);

		expire(&dir, &tenant, "invitee@example.com").await;
		let err = dir
			.invitations()
			.accept(&tenant, "invitee@example.com", &invitee)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::BadRequest);
		assert!(!dir.tenant_users().has(None, &tenant, &invitee).await.unwrap());
	}

	#[tokio::test]
	async fn test_purge_expired() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		for email in ["old@example.com", "new@example.com"] {
			dir.invitations()
				.create(&tenant, attrs(json!({"email": email})))
				.await
				.unwrap();
		}
		expire(&dir, &tenant, "old@example.com").await;

		assert_eq!(dir.invitations().purge_expired(&tenant).await.unwrap(), 1);
		assert_eq!(dir.invitations().count(&tenant).await.unwrap(), 1);
		assert_eq!(dir.invitations().purge_expired(&tenant).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_purge_reports_exactly_the_deleted_emails() {
		let dir = TestDirectory::new().await;
		let (tenant, _) = dir.tenant("acme").await;
		let (other, _) = dir.tenant("other").await;
		for email in ["a@example.com", "b@example.com", "c@example.com"] {
			dir.invitations()
				.create(&tenant, attrs(json!({"email": email})))
				.await
				.unwrap();
		}
		dir.invitations()
			.create(&other, attrs(json!({"email": "a@example.com"})))
			.await
			.unwrap();
		expire(&dir, &tenant, "a@example.com").await;
		expire(&dir, &tenant, "c@example.com").await;
		expire(&dir, &other, "a@example.com").await;
		dir.notifier.clear();

		assert_eq!(dir.invitations().purge_expired(&tenant).await.unwrap(), 2);

		let events = dir.notifier.events();
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].action, MutationAction::Deleted);
		assert_eq!(events[0].scope_id.as_deref(), Some(tenant.as_str()));
		let mut purged = events[0].resource_ids.clone();
		purged.sort();
		assert_eq!(purged, vec!["a@example.com".to_string(), "c@example.com".to_string()]);
		assert!(dir.invitations().exists(&tenant, "b@example.com").await.unwrap());
		assert!(dir.invitations().exists(&other, "a@example.com").await.unwrap());

		dir.notifier.clear();
		assert_eq!(dir.invitations().purge_expired(&tenant).await.unwrap(), 0);
		assert!(dir.notifier.events().is_empty());
	}
}
