//! Template arguments.
//!
//! Every argument of a [`Template`] is either a single value, a caller-named
//! [`Parameter`], or a sequence that the binder expands into one parameter per
//! element. Strings and byte blobs are single values even though they are
//! sequences in memory.

use std::collections::{BTreeSet, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::value::{Decimal, ToValue, Value};

/// A parameter whose name is chosen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: Value,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl ToValue) -> Self {
        Self {
            name: name.into(),
            value: value.to_value(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// One template argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    Parameter(Parameter),
    Sequence(Vec<Argument>),
}

impl Argument {
    /// Builds a sequence argument from any iterable of arguments.
    pub fn sequence<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToArgument,
    {
        Argument::Sequence(items.into_iter().map(|item| item.to_argument()).collect())
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Argument::Sequence(_))
    }
}

/// Conversion into a template [`Argument`].
pub trait ToArgument {
    fn to_argument(&self) -> Argument;
}

/// Types that expand element-wise when they appear inside a collection.
///
/// `u8` is deliberately absent: `Vec<u8>` and `[u8]` are byte blobs.
pub trait SequenceElement: ToArgument {}

impl<T: ToArgument + ?Sized> ToArgument for &T {
    fn to_argument(&self) -> Argument {
        (**self).to_argument()
    }
}

impl<T: SequenceElement + ?Sized> SequenceElement for &T {}

impl ToArgument for Argument {
    fn to_argument(&self) -> Argument {
        self.clone()
    }
}

impl ToArgument for Parameter {
    fn to_argument(&self) -> Argument {
        Argument::Parameter(self.clone())
    }
}

impl<T: ToValue> ToArgument for Option<T> {
    fn to_argument(&self) -> Argument {
        Argument::Value(self.to_value())
    }
}

impl<T: ToValue> SequenceElement for Option<T> {}
impl SequenceElement for Argument {}
impl SequenceElement for Parameter {}

macro_rules! impl_atomic_argument {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToArgument for $ty {
                fn to_argument(&self) -> Argument {
                    Argument::Value(self.to_value())
                }
            }
        )*
    };
}

macro_rules! impl_sequence_element {
    ($($ty:ty),* $(,)?) => {
        $( impl SequenceElement for $ty {} )*
    };
}

impl_atomic_argument!(
    Value, bool, u8, char, i8, i16, u16, i32, u32, i64, u64, f32, f64, Decimal, String, str,
    Vec<u8>, [u8], NaiveDateTime, NaiveDate, Uuid,
);

impl_sequence_element!(
    Value, bool, char, i8, i16, u16, i32, u32, i64, u64, f32, f64, Decimal, String, str,
    Vec<u8>, NaiveDateTime, NaiveDate, Uuid,
);

impl<T: SequenceElement> ToArgument for Vec<T> {
    fn to_argument(&self) -> Argument {
        Argument::sequence(self)
    }
}

impl<T: SequenceElement> ToArgument for [T] {
    fn to_argument(&self) -> Argument {
        Argument::sequence(self)
    }
}

impl<T: SequenceElement, const N: usize> ToArgument for [T; N] {
    fn to_argument(&self) -> Argument {
        Argument::sequence(self)
    }
}

impl<T: SequenceElement> ToArgument for BTreeSet<T> {
    fn to_argument(&self) -> Argument {
        Argument::sequence(self)
    }
}

impl<T: SequenceElement, S> ToArgument for HashSet<T, S> {
    fn to_argument(&self) -> Argument {
        Argument::sequence(self)
    }
}

/// A format string with `{index}` slots and its arguments.
///
/// Usually built with the [`template!`](crate::template) macro.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    format: String,
    arguments: Vec<Argument>,
}

impl Template {
    pub fn new(format: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            format: format.into(),
            arguments,
        }
    }

    /// Appends another argument.
    pub fn arg(mut self, argument: impl ToArgument) -> Self {
        self.arguments.push(argument.to_argument());
        self
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_bytes_are_atomic() {
        assert!(!"abc".to_argument().is_sequence());
        assert!(!String::from("abc").to_argument().is_sequence());
        assert!(!vec![1u8, 2, 3].to_argument().is_sequence());
    }

    #[test]
    fn test_collections_are_sequences() {
        assert_eq!(
            vec![1, 2].to_argument(),
            Argument::Sequence(vec![
                Argument::Value(Value::Int32(1)),
                Argument::Value(Value::Int32(2)),
            ])
        );
        assert!(["a", "b"].to_argument().is_sequence());
        assert!(BTreeSet::from([3i64]).to_argument().is_sequence());
        assert!(vec![vec![1u8], vec![2u8]].to_argument().is_sequence());
    }

    #[test]
    fn test_option_maps_to_null() {
        assert_eq!(None::<i32>.to_argument(), Argument::Value(Value::Null));
    }

    #[test]
    fn test_template_arg_appends() {
        let template = Template::new("{0} {1}", vec![]).arg(1).arg("x");
        assert_eq!(template.arguments().len(), 2);
        assert_eq!(template.format(), "{0} {1}");
    }
}
