//! Table identities and patterns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a table by database and table name.
///
/// Names compare case-sensitively here; the table cache keys its shares by
/// the exact identity. Pattern matching for bulk removal is case-insensitive,
/// see [`TablePattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdent {
    /// Database (schema) name.
    pub db: String,
    /// Table name.
    pub table: String,
}

impl TableIdent {
    /// Creates a new table identity.
    pub fn new(db: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.table)
    }
}

/// Matches table identities for bulk handle removal.
///
/// An absent database matches every database. Both names compare
/// ASCII case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePattern {
    /// Database to match, or any.
    pub db: Option<String>,
    /// Table name to match.
    pub table: String,
}

impl TablePattern {
    /// Matches `table` in any database.
    pub fn any_db(table: impl Into<String>) -> Self {
        Self {
            db: None,
            table: table.into(),
        }
    }

    /// Returns true if `ident` matches this pattern.
    pub fn matches(&self, ident: &TableIdent) -> bool {
        let db_matches = self
            .db
            .as_deref()
            .map_or(true, |db| db.is_empty() || db.eq_ignore_ascii_case(&ident.db));
        db_matches && self.table.eq_ignore_ascii_case(&ident.table)
    }
}

impl From<&TableIdent> for TablePattern {
    fn from(ident: &TableIdent) -> Self {
        Self {
            db: Some(ident.db.clone()),
            table: ident.table.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        let ident = TableIdent::new("Shop", "Orders");

        assert!(TablePattern::any_db("orders").matches(&ident));
        assert!(TablePattern::from(&TableIdent::new("shop", "ORDERS")).matches(&ident));
        assert!(!TablePattern::from(&TableIdent::new("other", "orders")).matches(&ident));
        assert!(!TablePattern::any_db("order").matches(&ident));
    }

    #[test]
    fn test_empty_db_matches_any() {
        let pattern = TablePattern {
            db: Some(String::new()),
            table: "t1".to_string(),
        };
        assert!(pattern.matches(&TableIdent::new("a", "t1")));
    }
}
