//! # Roles and Actors
//!
//! The transport layer authenticates the caller and hands the engine an
//! [`Actor`]: the user's identity, role, and (for municipal coordinators)
//! the set of municipality codes they administer. Authorization decisions
//! in the lifecycle controller are made against this value only.

use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// A user's role in the coordination system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Submits and manages their own excavation projects.
    Applicant,
    /// Reviews projects and manages moratoriums within assigned municipalities.
    MunicipalCoordinator,
    /// Region-wide authority; no territorial restriction.
    RegionalAdmin,
}

impl Role {
    /// Canonical wire/database name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applicant => "applicant",
            Self::MunicipalCoordinator => "municipal_coordinator",
            Self::RegionalAdmin => "regional_admin",
        }
    }

    /// Parse the canonical name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applicant" => Some(Self::Applicant),
            "municipal_coordinator" => Some(Self::MunicipalCoordinator),
            "regional_admin" => Some(Self::RegionalAdmin),
            _ => None,
        }
    }

    /// Whether the role may drive approve/reject decisions.
    pub fn is_coordinating(&self) -> bool {
        matches!(self, Self::MunicipalCoordinator | Self::RegionalAdmin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of a mutating operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    /// The user's identity.
    pub id: UserId,
    /// The user's role.
    pub role: Role,
    /// Municipality codes this actor administers. Meaningful only for
    /// municipal coordinators; empty for applicants and admins.
    #[serde(default)]
    pub territories: Vec<String>,
}

impl Actor {
    /// An applicant actor with no territory.
    pub fn applicant(id: UserId) -> Self {
        Self {
            id,
            role: Role::Applicant,
            territories: Vec::new(),
        }
    }

    /// A municipal coordinator with the given territory codes.
    pub fn coordinator(id: UserId, territories: Vec<String>) -> Self {
        Self {
            id,
            role: Role::MunicipalCoordinator,
            territories,
        }
    }

    /// A regional admin.
    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            role: Role::RegionalAdmin,
            territories: Vec::new(),
        }
    }

    /// Whether this actor's territory intersects the given municipality
    /// codes. Regional admins always pass; applicants never do.
    pub fn territory_intersects<S: AsRef<str>>(&self, codes: &[S]) -> bool {
        match self.role {
            Role::RegionalAdmin => true,
            Role::Applicant => false,
            Role::MunicipalCoordinator => codes
                .iter()
                .any(|c| self.territories.iter().any(|t| t == c.as_ref())),
        }
    }
}
