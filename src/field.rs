//! Extraction paths for entity fields.
//!
//! Each destination type picks how a column is read: the types a [`Record`]
//! has a typed getter for go straight through that getter, everything else
//! reads the generic value and converts it. Types that can hold a database
//! NULL say so through [`FieldValue::null`].

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::record::{column_as, Record};
use crate::value::{Decimal, Value};
use crate::Result;

/// A type an entity field can be declared as.
pub trait FieldValue: Sized + Send + 'static {
    /// Reads column `index` of the current row.
    fn extract(record: &dyn Record, index: usize) -> Result<Self>;

    /// What a database NULL becomes, or `None` if the type cannot hold one.
    fn null() -> Option<Self> {
        None
    }
}

macro_rules! impl_typed_getter {
    ($($ty:ty => $getter:ident),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn extract(record: &dyn Record, index: usize) -> Result<Self> {
                    record.$getter(index)
                }
            }
        )*
    };
}

macro_rules! impl_converted {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn extract(record: &dyn Record, index: usize) -> Result<Self> {
                    column_as(record, index)
                }
            }
        )*
    };
}

impl_typed_getter! {
    bool => get_bool,
    u8 => get_byte,
    char => get_char,
    NaiveDateTime => get_datetime,
    Decimal => get_decimal,
    f64 => get_double,
    i16 => get_int16,
    i32 => get_int32,
    i64 => get_int64,
    Uuid => get_guid,
    String => get_string,
}

impl_converted!(i8, u16, u32, u64, f32, Vec<u8>, NaiveDate);

impl FieldValue for Value {
    fn extract(record: &dyn Record, index: usize) -> Result<Self> {
        record.get_value(index)
    }

    fn null() -> Option<Self> {
        Some(Value::Null)
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn extract(record: &dyn Record, index: usize) -> Result<Self> {
        T::extract(record, index).map(Some)
    }

    fn null() -> Option<Self> {
        Some(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ResultStream;
    use crate::rows::RowSet;
    use crate::Error;

    /// Counts typed getter calls to tell the two extraction paths apart.
    struct Probe {
        inner: RowSet,
        typed: std::cell::Cell<usize>,
    }

    impl Record for Probe {
        fn field_count(&self) -> usize {
            self.inner.field_count()
        }

        fn field_name(&self, index: usize) -> Result<&str> {
            self.inner.field_name(index)
        }

        fn get_value(&self, index: usize) -> Result<Value> {
            self.inner.get_value(index)
        }

        fn get_int32(&self, index: usize) -> Result<i32> {
            self.typed.set(self.typed.get() + 1);
            self.inner.get_int32(index)
        }
    }

    fn probe(values: Vec<Value>) -> Probe {
        let columns: Vec<String> = (0..values.len()).map(|i| format!("c{i}")).collect();
        let mut inner = RowSet::new(columns);
        inner.push_row(values).unwrap();
        inner.advance().unwrap();
        Probe {
            inner,
            typed: std::cell::Cell::new(0),
        }
    }

    #[test]
    fn test_primitive_uses_typed_getter() {
        let record = probe(vec![Value::Int32(5)]);
        assert_eq!(i32::extract(&record, 0).unwrap(), 5);
        assert_eq!(record.typed.get(), 1);
        assert_eq!(u32::extract(&record, 0).unwrap(), 5);
        assert_eq!(record.typed.get(), 1);
    }

    #[test]
    fn test_nullable_types() {
        assert_eq!(<Option<i32>>::null(), Some(None));
        assert_eq!(Value::null(), Some(Value::Null));
        assert_eq!(String::null(), None);
    }

    #[test]
    fn test_conversion_failure_names_column() {
        let record = probe(vec![Value::Text("abc".into())]);
        assert!(matches!(
            i64::extract(&record, 0),
            Err(Error::TypeCoercion { column, .. }) if column == "c0"
        ));
    }
}
