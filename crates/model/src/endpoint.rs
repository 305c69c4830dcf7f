use crate::object_ref::ObjectRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("invalid table reference `{0}`: expected schema.table")]
    InvalidTableName(String),

    #[error("wildcard reference `{0}` is not allowed here")]
    WildcardNotAllowed(String),
}

/// Capability of a source endpoint whose declared table set can be changed
/// while a transfer exists. Sources without the capability simply never hand
/// it out (see [`Source::table_list_mutable`]); the workflows that need it
/// stay free of per-kind branches.
pub trait TableListMutable {
    /// Structural validation of candidate table names, before any contact
    /// with the live source.
    fn validate_candidate_tables(&self, tables: &[String]) -> Result<(), EndpointError>;

    fn table_list(&self) -> Vec<String>;

    /// Replaces the declared table list, returning the previous one.
    fn replace_table_list(&mut self, tables: Vec<String>) -> Vec<String>;
}

/// Schema pre-steps a relational source wants replicated to the target
/// before rows are copied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreSteps {
    #[serde(default)]
    pub create_tables: bool,
    #[serde(default)]
    pub constraints: bool,
}

impl PreSteps {
    pub fn any_enabled(&self) -> bool {
        self.create_tables || self.constraints
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostgresSource {
    pub cluster: String,
    #[serde(default)]
    pub db_tables: Vec<String>,
    #[serde(default)]
    pub pre_steps: PreSteps,
}

impl TableListMutable for PostgresSource {
    fn validate_candidate_tables(&self, tables: &[String]) -> Result<(), EndpointError> {
        for raw in tables {
            match ObjectRef::parse(raw) {
                None => return Err(EndpointError::InvalidTableName(raw.clone())),
                Some(parsed) if parsed.is_wildcard() => {
                    return Err(EndpointError::WildcardNotAllowed(raw.clone()));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn table_list(&self) -> Vec<String> {
        self.db_tables.clone()
    }

    fn replace_table_list(&mut self, tables: Vec<String>) -> Vec<String> {
        std::mem::replace(&mut self.db_tables, tables)
    }
}

/// A directory of `schema.table.csv` files. Read-only as far as the table
/// set is concerned: the scope is whatever the directory contains, so the
/// endpoint does not implement [`TableListMutable`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CsvSource {
    pub directory: PathBuf,
    #[serde(default)]
    pub include_tables: Vec<String>,
}

/// The persisted source-endpoint record. Round-tripped through the
/// coordinator as an opaque blob; this core only ever touches the declared
/// table list, through the [`TableListMutable`] capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    Postgres(PostgresSource),
    Csv(CsvSource),
}

impl Source {
    /// The declared table scope (exact references or `schema.*` wildcards).
    pub fn include_tables(&self) -> &[String] {
        match self {
            Source::Postgres(src) => &src.db_tables,
            Source::Csv(src) => &src.include_tables,
        }
    }

    /// Hands out the table-set-mutation capability when this source kind
    /// supports it.
    pub fn table_list_mutable(&mut self) -> Option<&mut dyn TableListMutable> {
        match self {
            Source::Postgres(src) => Some(src),
            Source::Csv(_) => None,
        }
    }

    pub fn supports_table_set_mutation(&self) -> bool {
        matches!(self, Source::Postgres(_))
    }

    pub fn pre_steps(&self) -> Option<&PreSteps> {
        match self {
            Source::Postgres(src) => Some(&src.pre_steps),
            Source::Csv(_) => None,
        }
    }
}

/// Deduplicated, deterministically sorted union of two table lists; the
/// merge step of the add-tables workflow.
pub fn merge_table_lists(existing: &[String], added: &[String]) -> Vec<String> {
    let mut set: BTreeSet<String> = existing.iter().cloned().collect();
    set.extend(added.iter().cloned());
    set.into_iter().collect()
}
