//! The built-in entity kinds and their lifecycles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declares a lifecycle state enum and its `StateCode`, `Display` and
/// `FromStr` impls from a `Variant => "CODE"` table.
macro_rules! lifecycle_states {
    (
        $(#[$meta:meta])*
        $name:ident: $kind:expr => {
            $( $(#[$vmeta:meta])* $variant:ident => $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $code)] $variant ),+
        }

        impl $crate::graph::StateCode for $name {
            const KIND: $crate::lifecycle::EntityKind = $kind;

            fn all() -> &'static [Self] {
                &[ $( $name::$variant ),+ ]
            }

            fn code(self) -> &'static str {
                match self {
                    $( $name::$variant => $code ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::graph::StateCode::code(*self))
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::graph::UnknownStateError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$name as $crate::graph::StateCode>::from_code(s).ok_or_else(|| {
                    $crate::graph::UnknownStateError {
                        kind: $kind,
                        state: s.to_string(),
                    }
                })
            }
        }
    };
}

pub mod device;
pub mod news;
pub mod order;

/// Discriminator for the entity kinds that carry a lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Order,
    ManagedDevice,
    News,
}

impl EntityKind {
    /// The key used in storage and audit records.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::ManagedDevice => "managed_device",
            EntityKind::News => "news",
        }
    }

    /// Whether `code` names one of this kind's states.
    pub fn has_state(self, code: &str) -> bool {
        use crate::graph::StateCode;

        match self {
            EntityKind::Order => order::OrderStatus::from_code(code).is_some(),
            EntityKind::ManagedDevice => device::DeviceStatus::from_code(code).is_some(),
            EntityKind::News => news::NewsStatus::from_code(code).is_some(),
        }
    }

    /// Whether this kind accepts the named command.
    pub fn has_command(self, name: &str) -> bool {
        match self {
            EntityKind::ManagedDevice => device::device_commands().iter().any(|c| c.name == name),
            EntityKind::Order | EntityKind::News => false,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind '{0}'")]
pub struct UnknownKindError(pub String);

impl FromStr for EntityKind {
    type Err = UnknownKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(EntityKind::Order),
            "managed_device" => Ok(EntityKind::ManagedDevice),
            "news" => Ok(EntityKind::News),
            other => Err(UnknownKindError(other.to_string())),
        }
    }
}
