//! In-memory result streams.
//!
//! [`RowSet`] holds a column list and fully decoded rows. It is the bridge
//! between SQLx, whose rows are fetched asynchronously, and the synchronous
//! [`ResultStream`] consumed by the materializer: fetch with SQLx, convert with
//! [`RowSet::from_mysql_rows`], then materialize.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::record::{Record, ResultStream};
use crate::value::{ToValue, Value};
use crate::{Error, Result};

/// A forward-only cursor over rows held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl RowSet {
    pub fn new<I>(columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            position: None,
        }
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// [`Error::RowWidthMismatch`] if the row width differs from the columns.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::RowWidthMismatch {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Builder-style [`push_row`](RowSet::push_row) from anything convertible.
    pub fn with_row<I>(mut self, row: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: ToValue,
    {
        self.push_row(row.into_iter().map(|v| v.to_value()).collect())?;
        Ok(self)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decodes fetched MySQL rows. Column names come from the first row.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use sqlx::MySqlPool;
    /// use sqlx_format_bind::{materialize_all, Entity, DescriptorBuilder, RowSet};
    ///
    /// #[derive(Default)]
    /// struct User {
    ///     id: i32,
    ///     name: String,
    /// }
    ///
    /// impl Entity for User {
    ///     fn describe(d: &mut DescriptorBuilder<Self>) {
    ///         d.field("Id", |u| &mut u.id).field("Name", |u| &mut u.name);
    ///     }
    /// }
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
    /// let rows = sqlx::query("SELECT id, name FROM users").fetch_all(&pool).await?;
    /// let mut stream = RowSet::from_mysql_rows(&rows)?;
    /// let users = materialize_all::<User, _>(&mut stream).collect::<Result<Vec<_>, _>>()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_mysql_rows(rows: &[MySqlRow]) -> Result<Self> {
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_owned()).collect())
            .unwrap_or_default();
        let mut set = RowSet {
            columns,
            rows: Vec::with_capacity(rows.len()),
            position: None,
        };
        for row in rows {
            let values = (0..row.len())
                .map(|index| mysql_value(row, index))
                .collect::<Result<Vec<_>>>()?;
            set.push_row(values)?;
        }
        Ok(set)
    }

    fn current(&self) -> Result<&[Value]> {
        self.position
            .and_then(|position| self.rows.get(position))
            .map(Vec::as_slice)
            .ok_or(Error::NoCurrentRow)
    }
}

impl Record for RowSet {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn field_name(&self, index: usize) -> Result<&str> {
        self.columns
            .get(index)
            .map(String::as_str)
            .ok_or(Error::ColumnOutOfRange {
                index,
                count: self.columns.len(),
            })
    }

    fn get_value(&self, index: usize) -> Result<Value> {
        let row = self.current()?;
        row.get(index).cloned().ok_or(Error::ColumnOutOfRange {
            index,
            count: row.len(),
        })
    }

    fn is_null(&self, index: usize) -> Result<bool> {
        let row = self.current()?;
        row.get(index)
            .map(Value::is_null)
            .ok_or(Error::ColumnOutOfRange {
                index,
                count: row.len(),
            })
    }
}

impl ResultStream for RowSet {
    fn advance(&mut self) -> Result<bool> {
        let next = self.position.map_or(0, |p| p.saturating_add(1).min(self.rows.len()));
        self.position = Some(next);
        Ok(next < self.rows.len())
    }
}

fn mysql_value(row: &MySqlRow, index: usize) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let type_name = row.column(index).type_info().name().to_ascii_uppercase();
    let unsigned = type_name.ends_with("UNSIGNED");
    let base = type_name.split([' ', '(']).next().unwrap_or_default();

    let value = match (base, unsigned) {
        ("BOOLEAN" | "BOOL", _) => Value::Bool(row.try_get(index)?),
        ("TINYINT", false) => Value::Int16(i16::from(row.try_get::<i8, _>(index)?)),
        ("TINYINT", true) => Value::Byte(row.try_get(index)?),
        ("SMALLINT", false) => Value::Int16(row.try_get(index)?),
        ("SMALLINT", true) => row.try_get::<u16, _>(index)?.to_value(),
        ("MEDIUMINT" | "INT" | "INTEGER", false) => Value::Int32(row.try_get(index)?),
        ("MEDIUMINT" | "INT" | "INTEGER", true) => row.try_get::<u32, _>(index)?.to_value(),
        ("BIGINT", false) => Value::Int64(row.try_get(index)?),
        ("BIGINT", true) => row.try_get::<u64, _>(index)?.to_value(),
        ("YEAR", _) => row.try_get_unchecked::<u16, _>(index)?.to_value(),
        ("FLOAT", _) => Value::Float(row.try_get(index)?),
        ("DOUBLE" | "REAL", _) => Value::Double(row.try_get(index)?),
        ("DECIMAL" | "NUMERIC", _) => {
            let text = row.try_get_unchecked::<String, _>(index)?;
            let decimal = text.parse().map_err(|_| Error::TypeCoercion {
                column: row.column(index).name().to_owned(),
                expected: "DECIMAL",
                found: "TEXT",
            })?;
            Value::Decimal(decimal)
        }
        ("DATETIME" | "TIMESTAMP", _) => {
            Value::DateTime(row.try_get_unchecked::<NaiveDateTime, _>(index)?)
        }
        ("DATE", _) => row.try_get::<NaiveDate, _>(index)?.to_value(),
        ("BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB", _) => {
            Value::Bytes(row.try_get_unchecked(index)?)
        }
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) => Value::Text(text),
            Err(_) => Value::Bytes(row.try_get_unchecked(index)?),
        },
    };
    Ok(value)
}
