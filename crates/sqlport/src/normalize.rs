//! Identifier normalization for the PostgreSQL side.
//!
//! PostgreSQL folds unquoted identifiers to lowercase, while T-SQL resolves
//! them case-insensitively but preserves the written case. To keep object
//! names stable across the translation, an identifier is emitted quoted
//! whenever unquoted PostgreSQL would fold it to something else, or always,
//! depending on [`SchemaQuoting`].

use crate::expressions::{Identifier, ObjectName};
use crate::SchemaQuoting;
use std::collections::HashSet;
use std::sync::LazyLock;

/// PostgreSQL reserved words that must be quoted in identifier position
static RESERVED: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "all", "analyse", "analyze", "and", "any", "array", "as", "asc",
        "asymmetric", "both", "case", "cast", "check", "collate", "column",
        "constraint", "create", "current_catalog", "current_date",
        "current_role", "current_time", "current_timestamp", "current_user",
        "default", "deferrable", "desc", "distinct", "do", "else", "end",
        "except", "false", "fetch", "for", "foreign", "from", "grant",
        "group", "having", "in", "initially", "intersect", "into", "lateral",
        "leading", "limit", "localtime", "localtimestamp", "not", "null",
        "offset", "on", "only", "or", "order", "placing", "primary",
        "references", "returning", "select", "session_user", "some",
        "symmetric", "table", "then", "to", "trailing", "true", "union",
        "unique", "user", "using", "variadic", "when", "where", "window",
        "with",
    ])
});

/// True if `name` does not survive PostgreSQL's unquoted-identifier
/// folding: anything with uppercase letters, a non-identifier character,
/// a leading digit, or a reserved word.
pub fn needs_quoting(name: &str) -> bool {
    let Some(first) = name.chars().next() else {
        return true;
    };
    if !(first.is_ascii_lowercase() || first == '_') {
        return true;
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
    {
        return true;
    }
    RESERVED.contains(name)
}

/// Recompute the `quoted` flag of an identifier under the given policy.
/// The written case is always preserved; only the quoting changes.
pub fn normalize_identifier(identifier: &mut Identifier, policy: SchemaQuoting) {
    identifier.quoted = match policy {
        SchemaQuoting::Always => true,
        SchemaQuoting::WhenNeeded => needs_quoting(&identifier.name),
    };
}

/// Normalize every part of an object name, qualifying it with
/// `default_schema` when it has none. Catalog parts have no PostgreSQL
/// rendering and are dropped; the dropped name is returned so the caller
/// can report it.
pub fn normalize_object_name(
    name: &mut ObjectName,
    default_schema: Option<&str>,
    policy: SchemaQuoting,
) -> Option<String> {
    let dropped_catalog = name.catalog.take().map(|c| c.name);
    if name.schema.is_none() {
        if let Some(schema) = default_schema {
            name.schema = Some(Identifier::new(schema));
        }
    }
    if let Some(schema) = name.schema.as_mut() {
        normalize_identifier(schema, policy);
    }
    normalize_identifier(&mut name.name, policy);
    dropped_catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_names_pass_unquoted() {
        assert!(!needs_quoting("dbo"));
        assert!(!needs_quoting("employees"));
        assert!(!needs_quoting("order_total_2"));
    }

    #[test]
    fn mixed_case_needs_quoting() {
        assert!(needs_quoting("Employees"));
        assert!(needs_quoting("orderID"));
    }

    #[test]
    fn special_characters_need_quoting() {
        assert!(needs_quoting("employee name"));
        assert!(needs_quoting("1st_quarter"));
        assert!(needs_quoting("#tmp"));
    }

    #[test]
    fn reserved_words_need_quoting() {
        assert!(needs_quoting("user"));
        assert!(needs_quoting("order"));
        assert!(!needs_quoting("orders"));
    }

    #[test]
    fn always_policy_quotes_everything() {
        let mut id = Identifier::new("dbo");
        normalize_identifier(&mut id, SchemaQuoting::Always);
        assert!(id.quoted);
    }

    #[test]
    fn default_schema_applied_once() {
        let mut name = ObjectName::new(Identifier::quoted("Employees"));
        normalize_object_name(&mut name, Some("dbo"), SchemaQuoting::WhenNeeded);
        let schema = name.schema.expect("schema");
        assert_eq!(schema.name, "dbo");
        assert!(!schema.quoted);
        assert!(name.name.quoted);
    }

    #[test]
    fn existing_schema_kept() {
        let mut name =
            ObjectName::with_schema(Identifier::new("sales"), Identifier::new("orders"));
        let dropped = normalize_object_name(&mut name, Some("dbo"), SchemaQuoting::WhenNeeded);
        assert_eq!(dropped, None);
        assert_eq!(name.schema.expect("schema").name, "sales");
    }

    #[test]
    fn dropped_catalog_reported() {
        let mut name =
            ObjectName::with_schema(Identifier::new("dbo"), Identifier::new("orders"));
        name.catalog = Some(Identifier::new("OtherDb"));
        let dropped = normalize_object_name(&mut name, None, SchemaQuoting::WhenNeeded);
        assert_eq!(dropped.as_deref(), Some("OtherDb"));
        assert!(name.catalog.is_none());
    }
}
