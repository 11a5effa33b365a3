//! The read side of a driver.
//!
//! [`Record`] is one row of named, indexed columns with typed getters.
//! [`ResultStream`] is a forward-only cursor over such rows. Drivers only have
//! to provide names and [`Record::get_value`]; the typed getters fall back to
//! converting the generic value and may be overridden with native reads.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::value::{Decimal, FromValue, Value};
use crate::{Error, Result};

/// A single row of named columns.
pub trait Record {
    fn field_count(&self) -> usize;

    fn field_name(&self, index: usize) -> Result<&str>;

    fn get_value(&self, index: usize) -> Result<Value>;

    fn is_null(&self, index: usize) -> Result<bool> {
        Ok(self.get_value(index)?.is_null())
    }

    fn get_bool(&self, index: usize) -> Result<bool> {
        column_as(self, index)
    }

    fn get_byte(&self, index: usize) -> Result<u8> {
        column_as(self, index)
    }

    fn get_char(&self, index: usize) -> Result<char> {
        column_as(self, index)
    }

    fn get_datetime(&self, index: usize) -> Result<NaiveDateTime> {
        column_as(self, index)
    }

    fn get_decimal(&self, index: usize) -> Result<Decimal> {
        column_as(self, index)
    }

    fn get_double(&self, index: usize) -> Result<f64> {
        column_as(self, index)
    }

    fn get_int16(&self, index: usize) -> Result<i16> {
        column_as(self, index)
    }

    fn get_int32(&self, index: usize) -> Result<i32> {
        column_as(self, index)
    }

    fn get_int64(&self, index: usize) -> Result<i64> {
        column_as(self, index)
    }

    fn get_guid(&self, index: usize) -> Result<Uuid> {
        column_as(self, index)
    }

    fn get_string(&self, index: usize) -> Result<String> {
        column_as(self, index)
    }
}

/// Forward-only cursor over records.
///
/// A fresh stream is positioned before its first row.
pub trait ResultStream: Record {
    /// Moves to the next row, returning `false` once the rows are exhausted.
    fn advance(&mut self) -> Result<bool>;
}

/// Reads column `index` and converts it into `T`.
///
/// # Errors
///
/// [`Error::TypeCoercion`] when the stored value, including NULL, does not
/// convert into `T`.
pub fn column_as<T, R>(record: &R, index: usize) -> Result<T>
where
    T: FromValue,
    R: Record + ?Sized,
{
    let value = record.get_value(index)?;
    T::from_value(&value).ok_or_else(|| Error::TypeCoercion {
        column: record
            .field_name(index)
            .map_or_else(|_| format!("#{index}"), str::to_owned),
        expected: std::any::type_name::<T>(),
        found: value.kind(),
    })
}

/// Name-based access on any [`Record`].
pub trait RecordExt: Record {
    /// Index of `column`: an exact match if there is one, otherwise the first
    /// case-insensitive match.
    fn ordinal(&self, column: &str) -> Option<usize> {
        let names: Vec<(usize, &str)> = (0..self.field_count())
            .filter_map(|i| self.field_name(i).ok().map(|name| (i, name)))
            .collect();
        names
            .iter()
            .find(|(_, name)| *name == column)
            .or_else(|| names.iter().find(|(_, name)| name.eq_ignore_ascii_case(column)))
            .map(|&(i, _)| i)
    }

    /// The value of `column`, or `None` if the record has no such column.
    fn get(&self, column: &str) -> Result<Option<Value>> {
        self.ordinal(column)
            .map(|index| self.get_value(index))
            .transpose()
    }

    /// The value of `column` converted into `T`, or `None` if it is absent.
    fn get_as<T: FromValue>(&self, column: &str) -> Result<Option<T>> {
        self.ordinal(column)
            .map(|index| column_as(self, index))
            .transpose()
    }
}

impl<R: Record + ?Sized> RecordExt for R {}
