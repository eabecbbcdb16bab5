use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::PartyId;

/// Position of a party in the custody chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manufacturer,
    Logistics,
    Retailer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Manufacturer, Role::Logistics, Role::Retailer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manufacturer => "manufacturer",
            Self::Logistics => "logistics",
            Self::Retailer => "retailer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manufacturer" => Ok(Self::Manufacturer),
            "logistics" => Ok(Self::Logistics),
            "retailer" => Ok(Self::Retailer),
            other => Err(TypeError::UnknownRole(other.to_string())),
        }
    }
}

/// Maps custody roles to the party identity acting in that role.
///
/// The directory only tags callers; it does not authenticate them. Roles
/// without a configured party resolve to `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyDirectory {
    pub manufacturer: Option<PartyId>,
    pub logistics: Option<PartyId>,
    pub retailer: Option<PartyId>,
}

impl PartyDirectory {
    /// Directory used by local demos and tests.
    pub fn demo() -> Self {
        Self {
            manufacturer: Some(PartyId::from("mfg-addr")),
            logistics: Some(PartyId::from("log-addr")),
            retailer: Some(PartyId::from("ret-addr")),
        }
    }

    /// The party configured for `role`, if any.
    pub fn resolve(&self, role: Role) -> Option<&PartyId> {
        match role {
            Role::Manufacturer => self.manufacturer.as_ref(),
            Role::Logistics => self.logistics.as_ref(),
            Role::Retailer => self.retailer.as_ref(),
        }
    }

    /// Reverse lookup: the role a party is registered under.
    pub fn role_of(&self, party: &PartyId) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| self.resolve(*role) == Some(party))
    }

    pub fn set(&mut self, role: Role, party: PartyId) {
        let slot = match role {
            Role::Manufacturer => &mut self.manufacturer,
            Role::Logistics => &mut self.logistics,
            Role::Retailer => &mut self.retailer,
        };
        *slot = Some(party);
    }
}
