/*!
 * # Acting principal
 *
 * Authentication happens upstream of this service. The gateway forwards the
 * resolved identity as `x-user-id`, `x-user-role` and (for organization staff)
 * `x-organization-id` headers, which are turned into a [`Principal`] here.
 * Handlers gate on the coarse role; services re-check ownership.
 */

use crate::errors::ServiceError;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Nurse,
    InventoryManager,
    Supplier,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Nurse => "Nurse",
            Role::InventoryManager => "Inventory Manager",
            Role::Supplier => "Supplier",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Nurse" => Ok(Role::Nurse),
            "Inventory Manager" => Ok(Role::InventoryManager),
            "Supplier" => Ok(Role::Supplier),
            "Admin" => Ok(Role::Admin),
            other => Err(ServiceError::Unauthorized(format!("unknown role '{}'", other))),
        }
    }
}

/// The identity a service operation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    /// Set for nurses and inventory managers; suppliers are not tenants
    pub organization_id: Option<Uuid>,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role, organization_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            role,
            organization_id,
        }
    }

    pub fn nurse(user_id: Uuid, organization_id: Uuid) -> Self {
        Self::new(user_id, Role::Nurse, Some(organization_id))
    }

    pub fn inventory_manager(user_id: Uuid, organization_id: Uuid) -> Self {
        Self::new(user_id, Role::InventoryManager, Some(organization_id))
    }

    pub fn supplier(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Supplier, None)
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Admin, None)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Coarse role gate. Admins pass every gate.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ServiceError> {
        if self.is_admin() || allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role '{}' may not perform this operation",
                self.role
            )))
        }
    }

    /// Organization the principal acts for.
    pub fn organization(&self) -> Result<Uuid, ServiceError> {
        self.organization_id.ok_or_else(|| {
            ServiceError::Forbidden("principal is not attached to an organization".to_string())
        })
    }

    /// Whether the principal may see rows owned by `organization_id`.
    pub fn can_access_organization(&self, organization_id: Uuid) -> bool {
        self.is_admin() || self.organization_id == Some(organization_id)
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, USER_ID_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized(format!("missing {}", USER_ID_HEADER)))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| ServiceError::Unauthorized(format!("malformed {}", USER_ID_HEADER)))?;

        let role = header_value(parts, USER_ROLE_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized(format!("missing {}", USER_ROLE_HEADER)))?
            .parse::<Role>()?;

        let organization_id = match header_value(parts, ORGANIZATION_ID_HEADER) {
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                ServiceError::Unauthorized(format!("malformed {}", ORGANIZATION_ID_HEADER))
            })?),
            None => None,
        };

        Ok(Principal::new(user_id, role, organization_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;

    #[test]
    fn role_parses_display_names() {
        assert_eq!("Inventory Manager".parse::<Role>().unwrap(), Role::InventoryManager);
        assert_eq!("Nurse".parse::<Role>().unwrap(), Role::Nurse);
        assert_matches!("nurse ".parse::<Role>(), Err(ServiceError::Unauthorized(_)));
        assert_eq!(Role::InventoryManager.to_string(), "Inventory Manager");
    }

    #[test]
    fn require_role_admits_admins_and_listed_roles() {
        let org = Uuid::new_v4();
        let nurse = Principal::nurse(Uuid::new_v4(), org);
        assert!(nurse.require_role(&[Role::Nurse]).is_ok());
        assert_matches!(
            nurse.require_role(&[Role::Supplier]),
            Err(ServiceError::Forbidden(_))
        );
        assert!(Principal::admin(Uuid::new_v4())
            .require_role(&[Role::Supplier])
            .is_ok());
    }

    #[test]
    fn organization_access_is_tenant_scoped() {
        let org = Uuid::new_v4();
        let manager = Principal::inventory_manager(Uuid::new_v4(), org);
        assert!(manager.can_access_organization(org));
        assert!(!manager.can_access_organization(Uuid::new_v4()));
        assert_matches!(
            Principal::supplier(Uuid::new_v4()).organization(),
            Err(ServiceError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn extracts_principal_from_headers() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let (mut parts, _) = Request::builder()
            .header(USER_ID_HEADER, user.to_string())
            .header(USER_ROLE_HEADER, "Nurse")
            .header(ORGANIZATION_ID_HEADER, org.to_string())
            .body(())
            .unwrap()
            .into_parts();

        let principal = Principal::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(principal, Principal::nurse(user, org));
    }

    #[tokio::test]
    async fn rejects_missing_identity() {
        let (mut parts, _) = Request::builder()
            .header(USER_ROLE_HEADER, "Supplier")
            .body(())
            .unwrap()
            .into_parts();

        assert_matches!(
            Principal::from_request_parts(&mut parts, &()).await,
            Err(ServiceError::Unauthorized(_))
        );
    }
}
