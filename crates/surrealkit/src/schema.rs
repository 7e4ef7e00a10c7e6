//! Snapshot representation types.
//!
//! A snapshot is everything a database currently defines, captured at two
//! levels: database-wide definition groups (`INFO FOR DB`) and the internals
//! of each table (`INFO FOR TABLE <name>`). Snapshots are built fresh for every
//! diff and thrown away afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Definition name mapped to the exact statement that defines it.
///
/// Ordered so that every walk over a snapshot is deterministic.
pub type Definitions = BTreeMap<String, String>;

/// Database-wide categories of definitions, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbDefinitionGroup {
    /// Access methods (`DEFINE ACCESS`).
    Accesses,
    /// Full-text analyzers (`DEFINE ANALYZER`).
    Analyzers,
    /// Database configuration (`DEFINE CONFIG`).
    Configs,
    /// Stored functions (`DEFINE FUNCTION fn::...`).
    Functions,
    /// Database parameters (`DEFINE PARAM $...`).
    Params,
    /// Tables (`DEFINE TABLE`).
    Tables,
}

impl DbDefinitionGroup {
    /// All groups, in the order the diff engine walks them.
    pub const ALL: [Self; 6] = [
        Self::Accesses,
        Self::Analyzers,
        Self::Configs,
        Self::Functions,
        Self::Params,
        Self::Tables,
    ];

    /// Returns the key used by `INFO FOR DB`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accesses => "accesses",
            Self::Analyzers => "analyzers",
            Self::Configs => "configs",
            Self::Functions => "functions",
            Self::Params => "params",
            Self::Tables => "tables",
        }
    }

    /// Literal text written in front of every name of this group.
    #[must_use]
    pub const fn name_prefix(self) -> &'static str {
        match self {
            Self::Functions => "fn::",
            Self::Params => "$",
            _ => "",
        }
    }
}

impl fmt::Display for DbDefinitionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of definitions scoped to a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableDefinitionGroup {
    /// Table events (`DEFINE EVENT ... ON <table>`).
    Events,
    /// Table fields (`DEFINE FIELD ... ON <table>`).
    Fields,
    /// Table indexes (`DEFINE INDEX ... ON <table>`).
    Indexes,
}

impl TableDefinitionGroup {
    /// All groups, in the order the diff engine walks them.
    pub const ALL: [Self; 3] = [Self::Events, Self::Fields, Self::Indexes];

    /// Returns the key used by `INFO FOR TABLE`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Fields => "fields",
            Self::Indexes => "indexes",
        }
    }
}

impl fmt::Display for TableDefinitionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything defined at database level, as reported by `INFO FOR DB`.
///
/// Keys reported by the database that are not definition groups (users,
/// models, ...) are ignored; missing groups read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSnapshot {
    #[serde(default)]
    pub accesses: Definitions,
    #[serde(default)]
    pub analyzers: Definitions,
    #[serde(default)]
    pub configs: Definitions,
    #[serde(default)]
    pub functions: Definitions,
    #[serde(default)]
    pub params: Definitions,
    #[serde(default)]
    pub tables: Definitions,
}

impl DbSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the definitions of one group.
    #[must_use]
    pub const fn group(&self, group: DbDefinitionGroup) -> &Definitions {
        match group {
            DbDefinitionGroup::Accesses => &self.accesses,
            DbDefinitionGroup::Analyzers => &self.analyzers,
            DbDefinitionGroup::Configs => &self.configs,
            DbDefinitionGroup::Functions => &self.functions,
            DbDefinitionGroup::Params => &self.params,
            DbDefinitionGroup::Tables => &self.tables,
        }
    }

    /// Returns the definitions of one group, mutably.
    pub fn group_mut(&mut self, group: DbDefinitionGroup) -> &mut Definitions {
        match group {
            DbDefinitionGroup::Accesses => &mut self.accesses,
            DbDefinitionGroup::Analyzers => &mut self.analyzers,
            DbDefinitionGroup::Configs => &mut self.configs,
            DbDefinitionGroup::Functions => &mut self.functions,
            DbDefinitionGroup::Params => &mut self.params,
            DbDefinitionGroup::Tables => &mut self.tables,
        }
    }

    /// Returns true if no group holds a definition.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        DbDefinitionGroup::ALL
            .iter()
            .all(|group| self.group(*group).is_empty())
    }
}

/// Everything defined inside one table, as reported by `INFO FOR TABLE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    #[serde(default)]
    pub events: Definitions,
    #[serde(default)]
    pub fields: Definitions,
    #[serde(default)]
    pub indexes: Definitions,
}

impl TableSnapshot {
    /// Creates an empty table snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the definitions of one group.
    #[must_use]
    pub const fn group(&self, group: TableDefinitionGroup) -> &Definitions {
        match group {
            TableDefinitionGroup::Events => &self.events,
            TableDefinitionGroup::Fields => &self.fields,
            TableDefinitionGroup::Indexes => &self.indexes,
        }
    }

    /// Returns the definitions of one group, mutably.
    pub fn group_mut(&mut self, group: TableDefinitionGroup) -> &mut Definitions {
        match group {
            TableDefinitionGroup::Events => &mut self.events,
            TableDefinitionGroup::Fields => &mut self.fields,
            TableDefinitionGroup::Indexes => &mut self.indexes,
        }
    }
}

/// A database snapshot together with the internals of each of its tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseState {
    /// Database-level definitions.
    pub db: DbSnapshot,
    /// Table internals, keyed by table name.
    pub tables: BTreeMap<String, TableSnapshot>,
}

impl DatabaseState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a database-level definition.
    #[must_use]
    pub fn define(
        mut self,
        group: DbDefinitionGroup,
        name: impl Into<String>,
        statement: impl Into<String>,
    ) -> Self {
        self.db.group_mut(group).insert(name.into(), statement.into());
        self
    }

    /// Adds a definition scoped to `table`.
    #[must_use]
    pub fn define_in_table(
        mut self,
        table: impl Into<String>,
        group: TableDefinitionGroup,
        name: impl Into<String>,
        statement: impl Into<String>,
    ) -> Self {
        self.tables
            .entry(table.into())
            .or_default()
            .group_mut(group)
            .insert(name.into(), statement.into());
        self
    }

    /// Returns the internals of a table, if known.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }
}
