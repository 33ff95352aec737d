use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three client roles a realtime connection or bearer token can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Customer,
    StoreOwner,
    Captain,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::StoreOwner => "store-owner",
            Role::Captain => "captain",
        }
    }
}

/// Gateway registry key: one logical party, independent of transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub role: Role,
    pub id: Uuid,
}

impl Identity {
    pub fn customer(id: Uuid) -> Self {
        Self {
            role: Role::Customer,
            id,
        }
    }

    pub fn store_owner(id: Uuid) -> Self {
        Self {
            role: Role::StoreOwner,
            id,
        }
    }

    pub fn captain(id: Uuid) -> Self {
        Self {
            role: Role::Captain,
            id,
        }
    }
}
