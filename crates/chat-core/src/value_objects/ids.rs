//! Numeric identifiers used by the chat platform
//!
//! Chatrooms, streamers, signed-in actors and livestreams are all numeric ids.
//! They are kept as distinct types so a streamer id can never be passed where a
//! chatroom id is expected. The platform is inconsistent about encoding ids as
//! JSON numbers or strings, so deserialization accepts both.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Error when parsing an identifier from string
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("invalid identifier format")]
    InvalidFormat,
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(u64);

        impl $name {
            /// Create from a raw value
            #[inline]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the inner value
            #[inline]
            pub const fn into_inner(self) -> u64 {
                self.0
            }

            /// Parse from string representation
            pub fn parse(s: &str) -> Result<Self, IdParseError> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| IdParseError::InvalidFormat)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_u64(self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_any(IdVisitor).map(Self)
            }
        }
    };
}

/// Accepts an unsigned integer or a string holding one
struct IdVisitor;

impl<'de> serde::de::Visitor<'de> for IdVisitor {
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string or integer identifier")
    }

    fn visit_u64<E>(self, value: u64) -> Result<u64, E>
    where
        E: serde::de::Error,
    {
        Ok(value)
    }

    fn visit_i64<E>(self, value: i64) -> Result<u64, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(value).map_err(|_| E::custom("identifier must not be negative"))
    }

    fn visit_str<E>(self, value: &str) -> Result<u64, E>
    where
        E: serde::de::Error,
    {
        value
            .trim()
            .parse::<u64>()
            .map_err(|_| E::custom("invalid identifier string"))
    }
}

numeric_id!(
    /// Chatroom identifier (the chat channel, not the streamer)
    RoomId
);

numeric_id!(
    /// Streaming identity a chatroom is attached to
    StreamerId
);

numeric_id!(
    /// Signed-in user
    ActorId
);

numeric_id!(
    /// A single live broadcast of a streamer
    LivestreamId
);
