use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt};

macro_rules! string_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Opaque SmartThings device identifier, unique per account.
    DeviceId
);

string_id!(
    /// Name of a device component. Every device has at least `main`.
    ComponentId
);

pub const MAIN_COMPONENT: &str = "main";

impl ComponentId {
    pub fn main() -> Self {
        Self(MAIN_COMPONENT.to_owned())
    }

    pub fn is_main(&self) -> bool {
        self.0 == MAIN_COMPONENT
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::main()
    }
}
