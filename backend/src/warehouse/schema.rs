//! Table schemas inferred from extracted batches.
//!
//! Column types follow dataframe-style inference over the non-missing
//! cells of each column: all integers become `BIGINT`, all numbers
//! `DOUBLE PRECISION`, all `True`/`False` `BOOLEAN`, anything else `TEXT`.
//! Columns with no values at all are `TEXT`.

use std::error::Error;

use bytes::BytesMut;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::error::{DatabaseError, DatabaseResult};
use crate::models::Batch;

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static regex"));

const TRUE_VALUES: &[&str] = &["True", "TRUE", "true"];
const FALSE_VALUES: &[&str] = &["False", "FALSE", "false"];

/// SQL type of a loaded column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnType {
    /// Infer the narrowest type holding every value.
    pub fn infer<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Self {
        let mut int = true;
        let mut float = true;
        let mut boolean = true;
        let mut any = false;

        for value in values.flatten() {
            any = true;
            int = int && value.parse::<i64>().is_ok();
            float = float && value.parse::<f64>().is_ok();
            boolean = boolean && parse_bool(value).is_some();
            if !(int || float || boolean) {
                return ColumnType::Text;
            }
        }

        match (any, int, float, boolean) {
            (false, ..) => ColumnType::Text,
            (_, true, ..) => ColumnType::Integer,
            (_, _, true, _) => ColumnType::Float,
            (_, _, _, true) => ColumnType::Boolean,
            _ => ColumnType::Text,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
        }
    }

    pub fn pg_type(self) -> Type {
        match self {
            ColumnType::Integer => Type::INT8,
            ColumnType::Float => Type::FLOAT8,
            ColumnType::Boolean => Type::BOOL,
            ColumnType::Text => Type::TEXT,
        }
    }

    /// Convert a raw cell. Inference guarantees the parse succeeds; a value
    /// that does not fit falls back to NULL.
    pub fn cell(self, raw: Option<&str>) -> Cell {
        let Some(raw) = raw else {
            return Cell::Null;
        };
        match self {
            ColumnType::Integer => raw.parse().map(Cell::Int).unwrap_or(Cell::Null),
            ColumnType::Float => raw.parse().map(Cell::Float).unwrap_or(Cell::Null),
            ColumnType::Boolean => parse_bool(raw).map(Cell::Bool).unwrap_or(Cell::Null),
            ColumnType::Text => Cell::Text(raw.to_string()),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if TRUE_VALUES.contains(&value) {
        Some(true)
    } else if FALSE_VALUES.contains(&value) {
        Some(false)
    } else {
        None
    }
}

/// A typed value written through binary COPY.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ToSql for Cell {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Cell::Null => Ok(IsNull::Yes),
            Cell::Int(v) => v.to_sql(ty, out),
            Cell::Float(v) => v.to_sql(ty, out),
            Cell::Bool(v) => v.to_sql(ty, out),
            Cell::Text(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::INT8 | Type::FLOAT8 | Type::BOOL | Type::TEXT)
    }

    to_sql_checked!();
}

/// Columns and types of a table about to be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<(String, ColumnType)>,
}

impl TableSchema {
    /// Infer a schema for `table` from a batch.
    pub fn infer(table: &str, batch: &Batch) -> DatabaseResult<Self> {
        validate_table_name(table)?;
        let columns = batch
            .headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), ColumnType::infer(batch.column(i))))
            .collect();
        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    pub fn creates(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({})", quote_ident(&self.table), columns)
    }

    pub fn copy(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|(name, _)| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "COPY {} ({}) FROM STDIN BINARY",
            quote_ident(&self.table),
            columns
        )
    }

    pub fn types(&self) -> Vec<Type> {
        self.columns.iter().map(|(_, ty)| ty.pg_type()).collect()
    }

    /// Typed cells of one row.
    pub fn cells(&self, row: &[Option<String>]) -> Vec<Cell> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, (_, ty))| ty.cell(row.get(i).and_then(|c| c.as_deref())))
            .collect()
    }
}

/// `DROP TABLE IF EXISTS ... CASCADE`
pub fn drop_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(table))
}

/// Double-quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Reject anything but plain lowercase identifiers.
pub fn validate_table_name(table: &str) -> DatabaseResult<()> {
    if TABLE_NAME.is_match(table) {
        Ok(())
    } else {
        Err(DatabaseError::InvalidIdentifier(table.to_string()))
    }
}
