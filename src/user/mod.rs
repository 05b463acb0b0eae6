use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tenant::TenantId;
use crate::typedid::{TypedId, TypedIdMarker};

pub mod db;
pub mod extract;

pub type UserId = TypedId<User>;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub name: String,
    pub roles: Vec<Role>,
    pub tenants: Vec<TenantId>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl TypedIdMarker for User {
    fn tag() -> &'static str {
        "USR"
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// The acting user of a request, resolved by the [`extract`] module.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub user_id: UserId,
    pub tenants: Vec<TenantId>,
    pub is_admin: bool,
}

impl Identity {
    pub fn from_user(user: &User) -> Identity {
        Identity {
            user_id: user.id,
            tenants: user.tenants.clone(),
            is_admin: user.roles.contains(&Role::Admin),
        }
    }

    /// Admins act on behalf of every tenant.
    pub fn can_act_for(&self, tenant_id: TenantId) -> bool {
        self.is_admin || self.tenants.contains(&tenant_id)
    }

    pub fn assert_can_act_for(&self, tenant_id: TenantId) -> Result<(), Error> {
        if !self.can_act_for(tenant_id) {
            return Err(Error::NotTenantMember { tenant_id });
        }

        Ok(())
    }

    pub fn assert_admin(&self) -> Result<(), Error> {
        if !self.is_admin {
            return Err(Error::AdminRequired);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(roles: Vec<Role>, tenants: Vec<TenantId>) -> User {
        User {
            id: UserId::new(),
            name: "Mara".into(),
            roles,
            tenants,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn member_can_act_for_own_tenant_only() {
        let tenant_id = TenantId::new();
        let identity = Identity::from_user(&user(vec![Role::User], vec![tenant_id]));

        assert!(identity.assert_can_act_for(tenant_id).is_ok());
        let other_tenant_id = TenantId::new();
        assert_eq!(
            identity.assert_can_act_for(other_tenant_id).unwrap_err(),
            Error::NotTenantMember {
                tenant_id: other_tenant_id
            }
        );
        assert_eq!(identity.assert_admin().unwrap_err(), Error::AdminRequired);
    }

    #[test]
    fn admin_bypasses_tenant_membership() {
        let identity = Identity::from_user(&user(vec![Role::Admin], vec![]));

        assert!(identity.assert_can_act_for(TenantId::new()).is_ok());
        assert!(identity.assert_admin().is_ok());
    }
}
