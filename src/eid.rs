use rusty_ulid::Ulid;
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Deref};

/// Content identifier: a ULID rendered as 26 Crockford base32 characters.
///
/// Ids read back from storage or a request path are taken as given; only
/// [`Eid::new`] guarantees the ULID form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Eid(String);

impl Eid {
    pub fn new() -> Self {
        Self(Ulid::generate().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Eid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for Eid {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Eid {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for Eid {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::storage::ID_WIDTH;

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(Eid::new(), Eid::new());
    }

    #[test]
    fn test_new_id_fits_vector_storage() {
        let id = Eid::new();
        assert_eq!(id.len(), ID_WIDTH);
        assert!(id.is_ascii());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = Eid::from("01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"01ARZ3NDEKTSV4RRFFQ69G5FAV\""
        );
        assert_eq!(id.to_string(), "01ARZ3NDEKTSV4RRFFQ69G5FAV");
    }
}
