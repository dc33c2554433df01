use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of whoever is asking for a booking change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Customer,
    Provider,
    /// Automated process (dispatcher, sweeper, reconciler)
    System,
    Admin,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Provider => write!(f, "provider"),
            Self::System => write!(f, "system"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "provider" => Ok(Self::Provider),
            "system" => Ok(Self::System),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid actor role: {s}")),
        }
    }
}

/// Identity and role of the caller driving a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Customer)
    }

    pub fn provider(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Provider)
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self::new(name, ActorRole::System)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Admin)
    }

    /// System processes and admins are the only actors allowed to drive automated edges
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, ActorRole::System | ActorRole::Admin)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [
            ActorRole::Customer,
            ActorRole::Provider,
            ActorRole::System,
            ActorRole::Admin,
        ] {
            assert_eq!(role.to_string().parse::<ActorRole>().unwrap(), role);
        }
        assert!("janitor".parse::<ActorRole>().is_err());
    }

    #[test]
    fn test_privileged_roles() {
        assert!(Actor::system("sweeper").is_privileged());
        assert!(Actor::admin("ops-1").is_privileged());
        assert!(!Actor::customer("c-1").is_privileged());
        assert!(!Actor::provider("p-1").is_privileged());
    }
}
