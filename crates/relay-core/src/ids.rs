//! String newtypes for identities and connection handles.
//!
//! [`Identity`] is whatever the session store binds a token to (an email
//! address in practice); the relay never interprets it. [`ConnectionId`] is
//! minted per socket as a UUID v7 so log lines sort by connect time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Authenticated principal bound to a connection.
    Identity
);

string_id!(
    /// Unique handle for one accepted socket.
    ConnectionId
);

impl ConnectionId {
    /// Mint a fresh connection ID (`conn_<uuid v7>`).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.starts_with("conn_"));
    }

    #[test]
    fn identity_serializes_as_plain_string() {
        let id = Identity::from("alice@example.com");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alice@example.com\"");
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn identity_orders_lexicographically() {
        let mut ids = vec![Identity::from("carol"), Identity::from("alice"), Identity::from("bob")];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(Identity::as_str).collect();
        assert_eq!(names, ["alice", "bob", "carol"]);
    }

    #[test]
    fn identity_map_lookup_by_str() {
        let mut map = HashMap::new();
        let _ = map.insert(Identity::from("alice"), 1);
        assert_eq!(map.get("alice"), Some(&1));
        assert_eq!(map.get("bob"), None);
    }

    #[test]
    fn display_matches_inner() {
        let id = Identity::from("bob");
        assert_eq!(id.to_string(), "bob");
        assert_eq!(String::from(id), "bob");
    }
}
