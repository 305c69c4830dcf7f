use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed `schema.table` reference from a table list or include directive.
/// The table component may be the wildcard `*`, matching every table in the
/// schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub schema: String,
    pub table: String,
}

impl ObjectRef {
    pub const WILDCARD: &'static str = "*";

    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Parses a reference in any of its quoting permutations:
    /// `schema.table`, `"schema".table`, `schema."table"`, `"schema"."table"`.
    /// Matching is case-sensitive; quotes carry no meaning beyond delimiting
    /// the identifier. Returns `None` for anything that is not a two-part
    /// reference with non-empty components.
    pub fn parse(raw: &str) -> Option<Self> {
        let (schema, rest) = take_identifier(raw)?;
        let rest = rest.strip_prefix('.')?;
        let table = if rest == Self::WILDCARD {
            Self::WILDCARD.to_string()
        } else {
            let (table, tail) = take_identifier(rest)?;
            if !tail.is_empty() {
                return None;
            }
            table
        };
        if schema.is_empty() || table.is_empty() {
            return None;
        }
        Some(Self { schema, table })
    }

    pub fn is_wildcard(&self) -> bool {
        self.table == Self::WILDCARD
    }

    /// Whether this reference selects the given concrete table.
    pub fn matches(&self, schema: &str, table: &str) -> bool {
        self.schema == schema && (self.is_wildcard() || self.table == table)
    }

}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Consumes one identifier, optionally wrapped in double quotes, returning
/// the unquoted identifier and the remaining input.
fn take_identifier(input: &str) -> Option<(String, &str)> {
    if let Some(rest) = input.strip_prefix('"') {
        let end = rest.find('"')?;
        Some((rest[..end].to_string(), &rest[end + 1..]))
    } else {
        let end = input.find('.').unwrap_or(input.len());
        Some((input[..end].to_string(), &input[end..]))
    }
}
