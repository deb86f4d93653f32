// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The concrete entity and relationship kinds.

use std::sync::Arc;

use tenancy_core::{AttributeContract, Rule};

use crate::kind::{
	Column, ColumnType, Dependent, Endpoint, IdentityStrategy, Membership, Presence,
	RelationshipKind, ResourceKind, ScopeRef, Side,
};

const NAME_LEN: usize = 255;
const DESCRIPTION_LEN: usize = 1024;
const PASSWORD_LEN: usize = 1024;

const CREATED_AT: Column = Column::new("created_at", ColumnType::Timestamp);
const UPDATED_AT: Column = Column::new("updated_at", ColumnType::Timestamp);

const TENANT_SCOPE: ScopeRef = ScopeRef {
	column: "tenant_id",
	table: "tenants",
	kind: "tenant",
};

const USER_SCOPE: ScopeRef = ScopeRef {
	column: "user_id",
	table: "users",
	kind: "user",
};

/// Join tables keyed by `(tenant_id, user_id)` other than `tenant_users`.
const TENANT_USER_TABLES: [&str; 2] = ["tenant_user_roles", "tenant_group_users"];

fn tenant() -> ResourceKind {
	ResourceKind {
		name: "tenant",
		table: "tenants",
		identity: "id",
		strategy: IdentityStrategy::Uuid,
		scope: None,
		columns: vec![
			Column::new("id", ColumnType::Uuid),
			Column::new("name", ColumnType::Text),
			Column::new("owner", ColumnType::Uuid),
			Column::new("enabled", ColumnType::Bool),
			Column::new("meta", ColumnType::Json),
			CREATED_AT,
			UPDATED_AT,
		],
		contract: AttributeContract::builder()
			.required("name", Rule::text(NAME_LEN))
			.required("owner", Rule::Uuid)
			.optional("enabled", Rule::Boolean)
			.optional("meta", Rule::Object.nullable())
			.build(),
		unique: Some("name"),
		dependents: vec![
			Dependent { table: "tenant_roles", column: "tenant_id" },
			Dependent { table: "tenant_permissions", column: "tenant_id" },
			Dependent { table: "tenant_groups", column: "tenant_id" },
			Dependent { table: "tenant_meta", column: "tenant_id" },
			Dependent { table: "tenant_invitations", column: "tenant_id" },
			Dependent { table: "tenant_users", column: "tenant_id" },
			Dependent { table: "tenant_role_permissions", column: "tenant_id" },
			Dependent { table: "tenant_user_roles", column: "tenant_id" },
			Dependent { table: "tenant_group_users", column: "tenant_id" },
		],
	}
}

fn user() -> ResourceKind {
	ResourceKind {
		name: "user",
		table: "users",
		identity: "id",
		strategy: IdentityStrategy::Uuid,
		scope: None,
		columns: vec![
			Column::new("id", ColumnType::Uuid),
			Column::new("email", ColumnType::Text),
			Column::new("password", ColumnType::Password),
			Column::new("enabled", ColumnType::Bool),
			Column::new("meta", ColumnType::Json),
			CREATED_AT,
			UPDATED_AT,
		],
		contract: AttributeContract::builder()
			.required("email", Rule::Email)
			.required("password", Rule::text(PASSWORD_LEN))
			.optional("enabled", Rule::Boolean)
			.optional("meta", Rule::Object.nullable())
			.build(),
		unique: Some("email"),
		dependents: vec![
			Dependent { table: "user_meta", column: "user_id" },
			Dependent { table: "user_keys", column: "user_id" },
			Dependent { table: "tenant_users", column: "user_id" },
			Dependent { table: "tenant_user_roles", column: "user_id" },
			Dependent { table: "tenant_group_users", column: "user_id" },
		],
	}
}

/// Roles, permissions and groups share one shape.
fn named_tenant_resource(
	name: &'static str,
	table: &'static str,
	dependents: Vec<Dependent>,
) -> ResourceKind {
	ResourceKind {
		name,
		table,
		identity: "id",
		strategy: IdentityStrategy::Uuid,
		scope: Some(TENANT_SCOPE),
		columns: vec![
			Column::new("id", ColumnType::Uuid),
			Column::new("tenant_id", ColumnType::Uuid),
			Column::new("name", ColumnType::Text),
			Column::new("description", ColumnType::Text),
			CREATED_AT,
			UPDATED_AT,
		],
		contract: AttributeContract::builder()
			.required("name", Rule::text(NAME_LEN))
			.optional("description", Rule::text(DESCRIPTION_LEN).nullable())
			.build(),
		unique: Some("name"),
		dependents,
	}
}

fn meta(name: &'static str, table: &'static str, scope: ScopeRef) -> ResourceKind {
	ResourceKind {
		name,
		table,
		identity: "meta_key",
		strategy: IdentityStrategy::Natural,
		scope: Some(scope),
		columns: vec![
			Column::new(scope.column, ColumnType::Uuid),
			Column::new("meta_key", ColumnType::Text),
			Column::new("meta_value", ColumnType::Json),
			CREATED_AT,
			UPDATED_AT,
		],
		contract: AttributeContract::builder()
			.required("meta_key", Rule::text(NAME_LEN))
			.required("meta_value", Rule::Json)
			.build(),
		unique: None,
		dependents: Vec::new(),
	}
}

fn invitation() -> ResourceKind {
	ResourceKind {
		name: "invitation",
		table: "tenant_invitations",
		identity: "email",
		strategy: IdentityStrategy::Natural,
		scope: Some(TENANT_SCOPE),
		columns: vec![
			Column::new("tenant_id", ColumnType::Uuid),
			Column::new("email", ColumnType::Text),
			Column::new("role", ColumnType::Uuid),
			Column::new("expires_at", ColumnType::Timestamp),
			CREATED_AT,
			UPDATED_AT,
		],
		contract: AttributeContract::builder()
			.required("email", Rule::Email)
			.optional("role", Rule::Uuid.nullable())
			.build(),
		unique: None,
		dependents: Vec::new(),
	}
}

fn user_key() -> ResourceKind {
	ResourceKind {
		name: "user_key",
		table: "user_keys",
		identity: "id",
		strategy: IdentityStrategy::ShortKey,
		scope: Some(USER_SCOPE),
		columns: vec![
			Column::new("id", ColumnType::Text),
			Column::new("user_id", ColumnType::Uuid),
			Column::new("name", ColumnType::Text),
			Column::new("key_hash", ColumnType::Secret),
			Column::new("expires_at", ColumnType::Timestamp),
			Column::new("allowed_ips", ColumnType::Json),
			Column::new("allowed_domains", ColumnType::Json),
			Column::new("last_used_at", ColumnType::Timestamp),
			CREATED_AT,
			UPDATED_AT,
		],
		contract: AttributeContract::builder()
			.required("name", Rule::text(NAME_LEN))
			.optional("expires_at", Rule::Timestamp.nullable())
			.optional("allowed_ips", Rule::StringArray.nullable())
			.optional("allowed_domains", Rule::StringArray.nullable())
			.build(),
		unique: None,
		dependents: Vec::new(),
	}
}

fn endpoint(kind: &Arc<ResourceKind>, column: &'static str, presence: Presence) -> Endpoint {
	Endpoint {
		kind: Arc::clone(kind),
		column,
		presence,
	}
}

/// Every kind the engine serves, built once and shared.
#[derive(Debug, Clone)]
pub struct Catalog {
	pub tenant: Arc<ResourceKind>,
	pub user: Arc<ResourceKind>,
	pub role: Arc<ResourceKind>,
	pub permission: Arc<ResourceKind>,
	pub group: Arc<ResourceKind>,
	pub tenant_meta: Arc<ResourceKind>,
	pub user_meta: Arc<ResourceKind>,
	pub invitation: Arc<ResourceKind>,
	pub user_key: Arc<ResourceKind>,

	pub tenant_users: Arc<RelationshipKind>,
	pub user_tenants: Arc<RelationshipKind>,
	pub role_permissions: Arc<RelationshipKind>,
	pub role_users: Arc<RelationshipKind>,
	pub user_roles: Arc<RelationshipKind>,
	pub group_users: Arc<RelationshipKind>,
	pub user_groups: Arc<RelationshipKind>,
}

impl Default for Catalog {
	fn default() -> Self {
		Self::new()
	}
}

impl Catalog {
	pub fn new() -> Self {
		let tenant = Arc::new(tenant());
		let user = Arc::new(user());
		let role = Arc::new(named_tenant_resource(
			"role",
			"tenant_roles",
			vec![
				Dependent { table: "tenant_role_permissions", column: "role_id" },
				Dependent { table: "tenant_user_roles", column: "role_id" },
			],
		));
		let permission = Arc::new(named_tenant_resource(
			"permission",
			"tenant_permissions",
			vec![Dependent { table: "tenant_role_permissions", column: "permission_id" }],
		));
		let group = Arc::new(named_tenant_resource(
			"group",
			"tenant_groups",
			vec![Dependent { table: "tenant_group_users", column: "group_id" }],
		));

		let tenant_users = Arc::new(RelationshipKind {
			name: "tenant_users",
			table: "tenant_users",
			scope_column: None,
			owner: endpoint(&tenant, "tenant_id", Presence::Exists),
			member: endpoint(&user, "user_id", Presence::Exists),
			membership: Some(Membership {
				tenant_side: Side::Owner,
				cascade: TENANT_USER_TABLES.to_vec(),
			}),
		});
		let user_tenants = Arc::new(RelationshipKind {
			name: "user_tenants",
			table: "tenant_users",
			scope_column: None,
			owner: endpoint(&user, "user_id", Presence::Exists),
			member: endpoint(&tenant, "tenant_id", Presence::Exists),
			membership: Some(Membership {
				tenant_side: Side::Member,
				cascade: TENANT_USER_TABLES.to_vec(),
			}),
		});
		let role_permissions = Arc::new(RelationshipKind {
			name: "role_permissions",
			table: "tenant_role_permissions",
			scope_column: Some("tenant_id"),
			owner: endpoint(&role, "role_id", Presence::Exists),
			member: endpoint(&permission, "permission_id", Presence::Exists),
			membership: None,
		});
		let role_users = Arc::new(RelationshipKind {
			name: "role_users",
			table: "tenant_user_roles",
			scope_column: Some("tenant_id"),
			owner: endpoint(&role, "role_id", Presence::Exists),
			member: endpoint(&user, "user_id", Presence::TenantMember),
			membership: None,
		});
		let user_roles = Arc::new(RelationshipKind {
			name: "user_roles",
			table: "tenant_user_roles",
			scope_column: Some("tenant_id"),
			owner: endpoint(&user, "user_id", Presence::TenantMember),
			member: endpoint(&role, "role_id", Presence::Exists),
			membership: None,
		});
		let group_users = Arc::new(RelationshipKind {
			name: "group_users",
			table: "tenant_group_users",
			scope_column: Some("tenant_id"),
			owner: endpoint(&group, "group_id", Presence::Exists),
			member: endpoint(&user, "user_id", Presence::TenantMember),
			membership: None,
		});
		let user_groups = Arc::new(RelationshipKind {
			name: "user_groups",
			table: "tenant_group_users",
			scope_column: Some("tenant_id"),
			owner: endpoint(&user, "user_id", Presence::TenantMember),
			member: endpoint(&group, "group_id", Presence::Exists),
			membership: None,
		});

		Self {
			tenant_meta: Arc::new(meta("tenant_meta", "tenant_meta", TENANT_SCOPE)),
			user_meta: Arc::new(meta("user_meta", "user_meta", USER_SCOPE)),
			invitation: Arc::new(invitation()),
			user_key: Arc::new(user_key()),
			tenant,
			user,
			role,
			permission,
			group,
			tenant_users,
			user_tenants,
			role_permissions,
			role_users,
			user_roles,
			group_users,
			user_groups,
		}
	}
}
