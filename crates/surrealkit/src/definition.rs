//! Definition parsing and rewriting.
//!
//! Introspection hands back each definition as a complete `DEFINE` statement.
//! The diff engine never needs the full grammar: it only has to turn an
//! existing statement into its `OVERWRITE` form or into the matching
//! `REMOVE ... IF EXISTS` statement. This module parses just enough structure
//! for that (keyword, kind, name, optional `ON <table>`, remainder) and
//! renders the rewritten forms.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{MigrateError, Result};
use crate::schema::DbDefinitionGroup;

/// Plain, `::`-joined, back-tick escaped or angle-bracket escaped identifier.
const DB_NAME: &str = r"(?:\w+(?:::\w+)*|`[^`]+`|⟨[^⟩]+⟩)";

/// Field names may be nested paths such as `address.city` or `tags[*]`.
const TABLE_ITEM_NAME: &str = r"(?:`[^`]+`|⟨[^⟩]+⟩|\S+?)";

const TABLE_NAME: &str = r"(?:\w+|`[^`]+`|⟨[^⟩]+⟩)";

/// How an existing definition should be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteAction {
    /// Redefine in place (`DEFINE <kind> OVERWRITE ...`).
    Overwrite,
    /// Drop the definition (`REMOVE <kind> IF EXISTS ...`).
    Remove,
}

/// Where a parsed definition lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionScope<'a> {
    /// Database-level definition belonging to a group.
    Database(DbDefinitionGroup),
    /// Definition attached to the named table.
    Table(&'a str),
}

/// A `DEFINE` statement split into the parts the rewriter needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDefinition<'a> {
    /// The leading `DEFINE` keyword as written.
    pub keyword: &'a str,
    /// What is being defined (`TABLE`, `FIELD`, `FUNCTION`, ...).
    pub kind: &'a str,
    /// Name without the group prefix (`fn::`, `$`).
    pub name: &'a str,
    /// Database group or owning table.
    pub scope: DefinitionScope<'a>,
    /// Everything after the name (or after `ON <table>`), untouched.
    pub remainder: &'a str,
}

impl<'a> ParsedDefinition<'a> {
    /// Parses a database-level definition of `group`.
    pub fn database(statement: &'a str, group: DbDefinitionGroup) -> Result<Self> {
        let captures = database_pattern(group)
            .captures(statement)
            .ok_or_else(|| malformed(statement))?;
        let part = |name: &str| captures.name(name).map_or("", |m| m.as_str());

        Ok(Self {
            keyword: part("keyword"),
            kind: part("kind"),
            name: part("name"),
            scope: DefinitionScope::Database(group),
            remainder: part("rest"),
        })
    }

    /// Parses a definition scoped to a table (`DEFINE <kind> <name> ON <table> ...`).
    pub fn table(statement: &'a str) -> Result<Self> {
        let captures = table_pattern()
            .captures(statement)
            .ok_or_else(|| malformed(statement))?;
        let part = |name: &str| captures.name(name).map_or("", |m| m.as_str());

        Ok(Self {
            keyword: part("keyword"),
            kind: part("kind"),
            name: part("name"),
            scope: DefinitionScope::Table(part("table")),
            remainder: part("rest"),
        })
    }

    /// Renders the statement for `action`.
    #[must_use]
    pub fn rewrite(&self, action: RewriteAction) -> String {
        let kw = Keywords::matching(self.keyword);
        match (action, self.scope) {
            (RewriteAction::Overwrite, DefinitionScope::Database(group)) => format!(
                "{} {} {} {}{}{}",
                kw.define,
                self.kind,
                kw.overwrite,
                group.name_prefix(),
                self.name,
                self.remainder
            ),
            (RewriteAction::Overwrite, DefinitionScope::Table(table)) => format!(
                "{} {} {} {} {} {}{}",
                kw.define, self.kind, kw.overwrite, self.name, kw.on, table, self.remainder
            ),
            (RewriteAction::Remove, DefinitionScope::Database(group)) => {
                let mut statement = format!(
                    "{} {} {} {}{}",
                    kw.remove,
                    self.kind,
                    kw.if_exists,
                    group.name_prefix(),
                    self.name
                );
                // Access methods exist at several levels; pin the database one.
                if group == DbDefinitionGroup::Accesses {
                    statement.push(' ');
                    statement.push_str(kw.on_database);
                }
                statement
            }
            (RewriteAction::Remove, DefinitionScope::Table(table)) => format!(
                "{} {} {} {} {} {}",
                kw.remove, self.kind, kw.if_exists, self.name, kw.on, table
            ),
        }
    }
}

/// Rewrites a database-level definition of `group`.
pub fn rewrite_database_definition(
    statement: &str,
    action: RewriteAction,
    group: DbDefinitionGroup,
) -> Result<String> {
    Ok(ParsedDefinition::database(statement, group)?.rewrite(action))
}

/// Rewrites a table-level definition.
pub fn rewrite_table_definition(statement: &str, action: RewriteAction) -> Result<String> {
    Ok(ParsedDefinition::table(statement)?.rewrite(action))
}

fn malformed(statement: &str) -> MigrateError {
    MigrateError::MalformedDefinition {
        statement: statement.to_string(),
    }
}

/// Keywords emitted by the rewriter, cased like the statement they replace.
struct Keywords {
    define: &'static str,
    overwrite: &'static str,
    remove: &'static str,
    if_exists: &'static str,
    on: &'static str,
    on_database: &'static str,
}

impl Keywords {
    const UPPER: Self = Self {
        define: "DEFINE",
        overwrite: "OVERWRITE",
        remove: "REMOVE",
        if_exists: "IF EXISTS",
        on: "ON",
        on_database: "ON DATABASE",
    };

    const LOWER: Self = Self {
        define: "define",
        overwrite: "overwrite",
        remove: "remove",
        if_exists: "if exists",
        on: "on",
        on_database: "on database",
    };

    fn matching(keyword: &str) -> &'static Self {
        if keyword.chars().all(|c| c.is_ascii_lowercase()) {
            &Self::LOWER
        } else {
            &Self::UPPER
        }
    }
}

fn database_pattern(group: DbDefinitionGroup) -> &'static Regex {
    static PLAIN: OnceLock<Regex> = OnceLock::new();
    static FUNCTION: OnceLock<Regex> = OnceLock::new();
    static PARAM: OnceLock<Regex> = OnceLock::new();

    let cell = match group {
        DbDefinitionGroup::Functions => &FUNCTION,
        DbDefinitionGroup::Params => &PARAM,
        _ => &PLAIN,
    };
    cell.get_or_init(|| {
        let pattern = format!(
            r"(?is)^(?<keyword>define)\s+(?<kind>\w+)\s+{}(?<name>{DB_NAME})(?<rest>.*)$",
            regex::escape(group.name_prefix())
        );
        Regex::new(&pattern).expect("database definition pattern is valid")
    })
}

fn table_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            r"(?is)^(?<keyword>define)\s+(?<kind>\w+)\s+(?<name>{TABLE_ITEM_NAME})\s+on\s+(?<table>{TABLE_NAME})(?<rest>.*)$"
        );
        Regex::new(&pattern).expect("table definition pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_definition() {
        let parsed =
            ParsedDefinition::table("DEFINE FIELD email ON user TYPE string PERMISSIONS FULL")
                .unwrap();
        assert_eq!(parsed.kind, "FIELD");
        assert_eq!(parsed.name, "email");
        assert_eq!(parsed.scope, DefinitionScope::Table("user"));
        assert_eq!(parsed.remainder, " TYPE string PERMISSIONS FULL");
    }

    #[test]
    fn test_parse_strips_group_prefix() {
        let parsed = ParsedDefinition::database(
            "DEFINE FUNCTION fn::greet($name: string) { RETURN $name; }",
            DbDefinitionGroup::Functions,
        )
        .unwrap();
        assert_eq!(parsed.kind, "FUNCTION");
        assert_eq!(parsed.name, "greet");
        assert_eq!(parsed.remainder, "($name: string) { RETURN $name; }");

        let parsed = ParsedDefinition::database(
            "DEFINE PARAM $limit VALUE 10",
            DbDefinitionGroup::Params,
        )
        .unwrap();
        assert_eq!(parsed.name, "limit");
        assert_eq!(parsed.remainder, " VALUE 10");
    }

    #[test]
    fn test_overwrite_table() {
        let sql = rewrite_table_definition(
            "DEFINE TABLE user TYPE NORMAL SCHEMAFULL PERMISSIONS NONE",
            RewriteAction::Overwrite,
        );
        // A table definition has no `ON <table>` clause.
        assert!(matches!(sql, Err(MigrateError::MalformedDefinition { .. })));

        let sql = rewrite_database_definition(
            "DEFINE TABLE user TYPE NORMAL SCHEMAFULL PERMISSIONS NONE",
            RewriteAction::Overwrite,
            DbDefinitionGroup::Tables,
        )
        .unwrap();
        assert_eq!(
            sql,
            "DEFINE TABLE OVERWRITE user TYPE NORMAL SCHEMAFULL PERMISSIONS NONE"
        );
    }

    #[test]
    fn test_overwrite_keeps_prefix() {
        let sql = rewrite_database_definition(
            "DEFINE FUNCTION fn::greet($name: string) { RETURN $name; }",
            RewriteAction::Overwrite,
            DbDefinitionGroup::Functions,
        )
        .unwrap();
        assert_eq!(
            sql,
            "DEFINE FUNCTION OVERWRITE fn::greet($name: string) { RETURN $name; }"
        );

        let sql = rewrite_database_definition(
            "DEFINE PARAM $limit VALUE 20 PERMISSIONS FULL",
            RewriteAction::Overwrite,
            DbDefinitionGroup::Params,
        )
        .unwrap();
        assert_eq!(sql, "DEFINE PARAM OVERWRITE $limit VALUE 20 PERMISSIONS FULL");
    }

    #[test]
    fn test_overwrite_preserves_multiline_remainder() {
        let statement = "DEFINE FUNCTION fn::user::create($name: string) {\n\tCREATE user SET name = $name;\n} PERMISSIONS FULL";
        let parsed = ParsedDefinition::database(statement, DbDefinitionGroup::Functions).unwrap();
        assert_eq!(parsed.name, "user::create");

        let sql = parsed.rewrite(RewriteAction::Overwrite);
        assert!(sql.ends_with(parsed.remainder));
        assert_eq!(
            sql,
            "DEFINE FUNCTION OVERWRITE fn::user::create($name: string) {\n\tCREATE user SET name = $name;\n} PERMISSIONS FULL"
        );

        let sql = parsed.rewrite(RewriteAction::Remove);
        assert_eq!(sql, "REMOVE FUNCTION IF EXISTS fn::user::create");
    }

    #[test]
    fn test_remove_database_definitions() {
        let cases = [
            (
                DbDefinitionGroup::Tables,
                "DEFINE TABLE post TYPE NORMAL SCHEMALESS",
                "REMOVE TABLE IF EXISTS post",
            ),
            (
                DbDefinitionGroup::Params,
                "DEFINE PARAM $limit VALUE 10",
                "REMOVE PARAM IF EXISTS $limit",
            ),
            (
                DbDefinitionGroup::Analyzers,
                "DEFINE ANALYZER simple TOKENIZERS blank FILTERS lowercase",
                "REMOVE ANALYZER IF EXISTS simple",
            ),
            (
                DbDefinitionGroup::Accesses,
                "DEFINE ACCESS account ON DATABASE TYPE RECORD DURATION FOR TOKEN 15m",
                "REMOVE ACCESS IF EXISTS account ON DATABASE",
            ),
        ];

        for (group, statement, expected) in cases {
            let sql = rewrite_database_definition(statement, RewriteAction::Remove, group).unwrap();
            assert_eq!(sql, expected, "group {group}");
        }
    }

    #[test]
    fn test_access_overwrite_has_no_extra_qualifier() {
        let sql = rewrite_database_definition(
            "DEFINE ACCESS account ON DATABASE TYPE JWT ALGORITHM HS512 KEY 'secret'",
            RewriteAction::Overwrite,
            DbDefinitionGroup::Accesses,
        )
        .unwrap();
        assert_eq!(
            sql,
            "DEFINE ACCESS OVERWRITE account ON DATABASE TYPE JWT ALGORITHM HS512 KEY 'secret'"
        );
    }

    #[test]
    fn test_table_level_rewrites() {
        let sql = rewrite_table_definition(
            "DEFINE INDEX email_idx ON user FIELDS email UNIQUE",
            RewriteAction::Remove,
        )
        .unwrap();
        assert_eq!(sql, "REMOVE INDEX IF EXISTS email_idx ON user");

        let sql = rewrite_table_definition(
            "DEFINE FIELD address.city ON user TYPE string",
            RewriteAction::Overwrite,
        )
        .unwrap();
        assert_eq!(sql, "DEFINE FIELD OVERWRITE address.city ON user TYPE string");

        let sql =
            rewrite_table_definition("DEFINE FIELD tags[*] ON post TYPE string", RewriteAction::Remove)
                .unwrap();
        assert_eq!(sql, "REMOVE FIELD IF EXISTS tags[*] ON post");
    }

    #[test]
    fn test_lowercase_statements_keep_their_case() {
        let sql = rewrite_table_definition(
            "define field a on t type int",
            RewriteAction::Overwrite,
        )
        .unwrap();
        assert_eq!(sql, "define field overwrite a on t type int");

        let sql = rewrite_table_definition("define field a on t type int", RewriteAction::Remove)
            .unwrap();
        assert_eq!(sql, "remove field if exists a on t");
    }

    #[test]
    fn test_escaped_names() {
        let sql = rewrite_database_definition(
            "DEFINE TABLE `user-profile` TYPE NORMAL",
            RewriteAction::Remove,
            DbDefinitionGroup::Tables,
        )
        .unwrap();
        assert_eq!(sql, "REMOVE TABLE IF EXISTS `user-profile`");

        let sql = rewrite_table_definition(
            "DEFINE FIELD `first name` ON ⟨user-profile⟩ TYPE string",
            RewriteAction::Remove,
        )
        .unwrap();
        assert_eq!(sql, "REMOVE FIELD IF EXISTS `first name` ON ⟨user-profile⟩");
    }

    #[test]
    fn test_malformed_definitions() {
        let result = rewrite_database_definition(
            "SELECT * FROM user",
            RewriteAction::Remove,
            DbDefinitionGroup::Tables,
        );
        assert!(matches!(result, Err(MigrateError::MalformedDefinition { .. })));

        // Function definitions must carry the fn:: prefix.
        let result = rewrite_database_definition(
            "DEFINE FUNCTION greet() { RETURN 1; }",
            RewriteAction::Overwrite,
            DbDefinitionGroup::Functions,
        );
        assert!(matches!(result, Err(MigrateError::MalformedDefinition { .. })));
    }
}
