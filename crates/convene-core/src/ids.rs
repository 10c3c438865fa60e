//! Branded ID newtypes for type safety.
//!
//! The chat platform hands out numeric identifiers for users and rooms, while
//! ids minted locally (bots, messages) are UUID v7 strings. Both are carried as
//! a `String` newtype.
//!
//! Ordering is numeric-aware: ids that parse as `u64` sort numerically and
//! before any non-numeric id, which sort lexicographically. Hand-off order
//! ("ascending participant id") depends on this so that `"9"` precedes `"10"`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Wire form of an id: the platform sends numbers, local ids are strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Total order used by every branded id.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Ok(Self(RawId::deserialize(deserializer)?.into_string()))
            }
        }

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

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

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                compare_ids(&self.0, &other.0)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
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

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                Self(n.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of a human (or bot) participant on the chat platform.
    ParticipantId
}

branded_id! {
    /// Identifier of a session (a room on the chat platform).
    SessionId
}

branded_id! {
    /// Identifier of an admission task (a waiting pool target).
    TaskId
}

branded_id! {
    /// Identifier of a single chat message.
    MessageId
}

branded_id! {
    /// Identifier of a registered bot instance.
    BotId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_id_new_is_uuid_v7() {
        let id = BotId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn numeric_ids_sort_numerically() {
        let mut ids: Vec<ParticipantId> = ["10", "9", "100", "1"].into_iter().map(Into::into).collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(ParticipantId::as_str).collect();
        assert_eq!(sorted, ["1", "9", "10", "100"]);
    }

    #[test]
    fn numeric_ids_sort_before_textual() {
        let mut ids: Vec<ParticipantId> = ["bob", "7", "alice", "12"].into_iter().map(Into::into).collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(ParticipantId::as_str).collect();
        assert_eq!(sorted, ["7", "12", "alice", "bob"]);
    }

    #[test]
    fn leading_zeros_break_ties_lexicographically() {
        let a = ParticipantId::from("007");
        let b = ParticipantId::from("7");
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }

    #[test]
    fn from_u64() {
        let id = SessionId::from(42_u64);
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn display() {
        let id = TaskId::from("task-1");
        assert_eq!(format!("{id}"), "task-1");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ParticipantId::from("17");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"17\"");
        let back: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn deserializes_numeric_ids() {
        let id: SessionId = serde_json::from_str("42").unwrap();
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn hash_and_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let id = SessionId::from("same");
        let _ = set.insert(id.clone());
        let _ = set.insert(id);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn into_inner() {
        let id = SessionId::from("inner-test");
        assert_eq!(id.into_inner(), "inner-test");
    }
}
