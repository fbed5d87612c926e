//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Agents and events carry strongly-typed IDs so the two can never be
//! swapped by accident. IDs are UUID v7 (time-ordered), which keeps the
//! `events` primary key index append-friendly. The random low bits are
//! also what the entity store shards on.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }

            /// The low 64 bits of the UUID (random for v7 IDs).
            pub const fn low_bits(self) -> u64 {
                self.0.as_u64_pair().1
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent (pet).
    AgentId
}

define_id! {
    /// Unique identifier for an entry in the event log.
    EventId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = AgentId::new();
        let b = AgentId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_survives_json() {
        let original = EventId::new();
        let json = serde_json::to_string(&original).ok();
        let restored: Option<EventId> = json.as_deref().and_then(|j| serde_json::from_str(j).ok());
        assert_eq!(restored, Some(original));
    }

    #[test]
    fn low_bits_vary_between_ids() {
        let spread: std::collections::HashSet<u64> =
            (0..64).map(|_| AgentId::new().low_bits() & 0xF).collect();
        assert!(spread.len() > 1);
    }
}
