//! Who is performing an operation.

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
    /// Machine callers such as the carrier webhook.
    System,
}

/// The authenticated principal behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    pub fn system(name: &str) -> Self {
        Self {
            user_id: UserId::new(format!("system:{name}")),
            role: Role::System,
        }
    }

    /// Merchant-side actors: admins and trusted machine callers.
    pub fn is_merchant(&self) -> bool {
        matches!(self.role, Role::Admin | Role::System)
    }

    /// True when the actor may act on a resource owned by `owner`.
    pub fn can_act_for(&self, owner: &UserId) -> bool {
        self.is_merchant() || &self.user_id == owner
    }
}
