//! Table catalog definitions.
//!
//! A [`TableDef`] describes one object known to the table cache: its
//! columns, its indexes, what kind of object it is and which storage
//! engine serves it.

use std::fmt;

use cairn_common::constants::MAX_KEY_PARTS;
use cairn_common::error::{CairnError, CairnResult};
use cairn_common::types::{ColumnType, TableIdent};

/// Definition of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub ty: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
}

impl ColumnDef {
    /// Creates a nullable column.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    /// Marks the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Definition of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Column positions of the key parts, in key order.
    pub columns: Vec<usize>,
    /// Whether the index is unique.
    pub unique: bool,
}

impl IndexDef {
    /// Creates a new index.
    pub fn new(name: impl Into<String>, columns: Vec<usize>, unique: bool) -> Self {
        Self {
            name: name.into(),
            columns,
            unique,
        }
    }

    /// Returns the number of key parts.
    pub fn key_parts(&self) -> usize {
        self.columns.len()
    }
}

/// What kind of object a definition describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    /// An ordinary table with its own rows.
    Base,
    /// A view. Cannot be opened where a base table is required.
    View,
    /// A temporary table. Cannot be opened where a base table is required.
    Temporary,
    /// A grouping table. Opening it also opens each child table.
    Merge {
        /// Tables opened alongside the grouping table.
        children: Vec<TableIdent>,
    },
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Base => write!(f, "BASE TABLE"),
            TableKind::View => write!(f, "VIEW"),
            TableKind::Temporary => write!(f, "TEMPORARY TABLE"),
            TableKind::Merge { .. } => write!(f, "MERGE TABLE"),
        }
    }
}

/// Storage engine serving a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// In-memory heap with ordered indexes.
    Memory,
    /// Append-only heap. Cannot drive standalone handle cursors.
    Archive,
    /// Grouping engine for merge tables.
    Merge,
}

impl EngineKind {
    /// Returns the engine name.
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Memory => "MEMORY",
            EngineKind::Archive => "ARCHIVE",
            EngineKind::Merge => "MERGE",
        }
    }

    /// Returns true if tables of this engine can be driven as standalone
    /// handle cursors.
    pub fn supports_handle_cursor(&self) -> bool {
        !matches!(self, EngineKind::Archive)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Definition of a table.
///
/// # Example
///
/// ```rust
/// use cairn_common::types::{ColumnType, TableIdent};
/// use cairn_table::catalog::TableDef;
///
/// let def = TableDef::new(TableIdent::new("shop", "orders"))
///     .column("id", ColumnType::Int)
///     .column("status", ColumnType::Text)
///     .index("PRIMARY", vec![0], true)
///     .index("by_status", vec![1], false);
///
/// assert!(def.validate().is_ok());
/// assert_eq!(def.find_index("BY_STATUS"), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    /// Table identity.
    pub ident: TableIdent,
    /// Columns in row order.
    pub columns: Vec<ColumnDef>,
    /// Index definitions.
    pub indexes: Vec<IndexDef>,
    /// Object kind.
    pub kind: TableKind,
    /// Storage engine.
    pub engine: EngineKind,
}

impl TableDef {
    /// Creates a base table served by the memory engine, with no columns.
    pub fn new(ident: TableIdent) -> Self {
        Self {
            ident,
            columns: Vec::new(),
            indexes: Vec::new(),
            kind: TableKind::Base,
            engine: EngineKind::Memory,
        }
    }

    /// Adds a nullable column.
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef::new(name, ty));
        self
    }

    /// Adds a column definition.
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an index over the given column positions.
    pub fn index(mut self, name: impl Into<String>, columns: Vec<usize>, unique: bool) -> Self {
        self.indexes.push(IndexDef::new(name, columns, unique));
        self
    }

    /// Sets the storage engine.
    pub fn engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the object kind.
    pub fn kind(mut self, kind: TableKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the position of the index called `name`, ignoring case.
    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.indexes
            .iter()
            .position(|index| index.name.eq_ignore_ascii_case(name))
    }

    /// Checks the definition for internal consistency.
    pub fn validate(&self) -> CairnResult<()> {
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(CairnError::invalid_argument(format!(
                    "duplicate column '{}' in {}",
                    column.name, self.ident
                )));
            }
        }

        for (i, index) in self.indexes.iter().enumerate() {
            if index.columns.is_empty() || index.columns.len() > MAX_KEY_PARTS {
                return Err(CairnError::invalid_argument(format!(
                    "index '{}' must have between 1 and {} key parts",
                    index.name, MAX_KEY_PARTS
                )));
            }
            if let Some(&bad) = index.columns.iter().find(|&&c| c >= self.columns.len()) {
                return Err(CairnError::invalid_argument(format!(
                    "index '{}' refers to missing column {}",
                    index.name, bad
                )));
            }
            if self.find_index(&index.name) != Some(i) {
                return Err(CairnError::invalid_argument(format!(
                    "duplicate index '{}' in {}",
                    index.name, self.ident
                )));
            }
        }

        if self.engine == EngineKind::Archive && !self.indexes.is_empty() {
            return Err(CairnError::invalid_argument(
                "the ARCHIVE engine does not support indexes",
            ));
        }

        Ok(())
    }
}
