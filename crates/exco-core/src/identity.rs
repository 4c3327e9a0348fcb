//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifier namespaces of the excavation
//! coordination domain. You cannot pass a `MoratoriumId` where a
//! `ProjectId` is expected; the mixup is a compile error, not a data bug.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parse from a UUID-shaped string.
            pub fn parse(s: &str) -> Result<Self, Error> {
                Uuid::parse_str(s).map(Self).map_err(|_| Error::InvalidInput {
                    field: stringify!($name).to_string(),
                    message: format!("not a valid UUID: {s:?}"),
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype! {
    /// Unique identifier for an excavation project.
    ProjectId
}

id_newtype! {
    /// Unique identifier for a moratorium (temporary no-dig zone).
    MoratoriumId
}

id_newtype! {
    /// Unique identifier for a project comment.
    CommentId
}

id_newtype! {
    /// Unique identifier for a user (applicant, coordinator, or admin).
    UserId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_per_generation() {
        assert_ne!(ProjectId::new(), ProjectId::new());
    }

    #[test]
    fn parse_roundtrip() {
        let id = MoratoriumId::new();
        let parsed = MoratoriumId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = ProjectId::parse("not-a-uuid").unwrap_err();
        match err {
            Error::InvalidInput { field, .. } => assert_eq!(field, "ProjectId"),
            other => panic!("expected InvalidInput, got: {other:?}"),
        }
    }

    #[test]
    fn serde_is_transparent() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
