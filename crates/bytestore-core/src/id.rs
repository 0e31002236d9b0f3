use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier (UUID v4).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Parse the canonical hyphenated lowercase form.
            ///
            /// Other UUID spellings (braced, simple, uppercase) are rejected
            /// because the text form doubles as an on-disk file name.
            pub fn parse(s: &str) -> Result<Self, StoreError> {
                let uuid = Uuid::try_parse(s)
                    .map_err(|_| StoreError::InvalidId(s.to_string()))?;
                if uuid.hyphenated().to_string() != s {
                    return Err(StoreError::InvalidId(s.to_string()));
                }
                Ok(Self(uuid))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $label, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }
    };
}

uuid_id!(
    /// Identifier of a container. Its text form is the container's
    /// directory name under the store root.
    ContainerId,
    "ContainerId"
);

uuid_id!(
    /// Identifier of a stored object. Its text form is the basename of the
    /// payload and sidecar files.
    ObjectId,
    "ObjectId"
);
