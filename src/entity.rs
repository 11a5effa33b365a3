//! Entity materialization.
//!
//! An [`Entity`] lists its columns once in [`Entity::describe`]. The resulting
//! [`TypeDescriptor`] is built on first use and cached for the rest of the
//! process, keyed by [`TypeId`]. Materializing matches result columns to
//! properties by name, exact case first, then case-insensitively. A column
//! that only matches case-insensitively is ignored when another column
//! matches the same property exactly.
//!
//! A type may instead build itself from the whole record through
//! [`Entity::from_record`]; that path is tried before the descriptor.
//!
//! Building a descriptor happens at most once per type. Concurrent first
//! users of a type wait for that build instead of racing it, so
//! `describe` must not materialize its own type.
//!
//! # Examples
//!
//! ```
//! use sqlx_format_bind::{materialize_all, DescriptorBuilder, Entity, RowSet, Value};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! impl Entity for User {
//!     fn describe(d: &mut DescriptorBuilder<Self>) {
//!         d.field("Id", |u| &mut u.id)
//!             .field("Name", |u| &mut u.name)
//!             .field("Email", |u| &mut u.email);
//!     }
//! }
//!
//! let mut rows = RowSet::new(["ID", "NAME", "EMAIL"])
//!     .with_row([Value::Int64(1), Value::Text("ann".into()), Value::Null])?;
//!
//! let users = materialize_all::<User, _>(&mut rows).collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(users, vec![User { id: 1, name: "ann".into(), email: None }]);
//! # Ok::<(), sqlx_format_bind::Error>(())
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::debug;

use crate::field::FieldValue;
use crate::record::{Record, ResultStream};
use crate::Result;

/// A type that can be filled from a result row.
pub trait Entity: Default + Send + 'static {
    /// Declares the writable properties of the type.
    ///
    /// Called once per process. It must not materialize `Self`.
    fn describe(descriptor: &mut DescriptorBuilder<Self>);

    /// Builds the entity from the whole record, bypassing the descriptor.
    ///
    /// Returning `Some` takes precedence over the property mapping; the
    /// default returns `None`. Types that always construct themselves can
    /// leave [`describe`](Entity::describe) empty.
    fn from_record(record: &dyn Record) -> Option<Result<Self>> {
        let _ = record;
        None
    }
}

type Fill<T> = Box<dyn Fn(&mut T, &dyn Record, usize) -> Result<()> + Send + Sync>;
type SetNull<T> = Box<dyn Fn(&mut T) + Send + Sync>;

struct Property<T> {
    name: String,
    fill: Fill<T>,
    set_null: Option<SetNull<T>>,
}

impl<T> Property<T> {
    fn apply(&self, entity: &mut T, record: &dyn Record, index: usize) -> Result<()> {
        if let Some(set_null) = &self.set_null {
            if record.is_null(index)? {
                set_null(entity);
                return Ok(());
            }
        }
        (self.fill)(entity, record, index)
    }
}

/// Collects the properties of an [`Entity`].
pub struct DescriptorBuilder<T> {
    properties: Vec<Property<T>>,
}

impl<T: 'static> DescriptorBuilder<T> {
    /// A property stored directly in a field.
    pub fn field<F: FieldValue>(&mut self, name: impl Into<String>, access: fn(&mut T) -> &mut F) -> &mut Self {
        self.property(name, move |entity: &mut T, value: F| *access(entity) = value)
    }

    /// A property written through a setter.
    pub fn setter<F: FieldValue>(&mut self, name: impl Into<String>, set: fn(&mut T, F)) -> &mut Self {
        self.property(name, set)
    }

    fn property<F, S>(&mut self, name: impl Into<String>, set: S) -> &mut Self
    where
        F: FieldValue,
        S: Fn(&mut T, F) + Copy + Send + Sync + 'static,
    {
        let set_null = F::null().map(|_| {
            Box::new(move |entity: &mut T| {
                if let Some(null) = F::null() {
                    set(entity, null);
                }
            }) as SetNull<T>
        });
        let fill = Box::new(move |entity: &mut T, record: &dyn Record, index: usize| {
            set(entity, F::extract(record, index)?);
            Ok(())
        }) as Fill<T>;

        self.properties.push(Property {
            name: name.into(),
            fill,
            set_null,
        });
        self
    }
}

/// Column-to-property bindings for one result shape, highest column first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    bindings: Vec<(usize, usize)>,
}

impl ColumnMap {
    /// `(column, property)` index pairs in fill order.
    pub fn bindings(&self) -> &[(usize, usize)] {
        &self.bindings
    }
}

/// The cached mapping of an [`Entity`] type.
pub struct TypeDescriptor<T> {
    properties: Vec<Property<T>>,
}

impl<T: Entity> TypeDescriptor<T> {
    fn build() -> Self {
        let mut builder = DescriptorBuilder {
            properties: Vec::new(),
        };
        T::describe(&mut builder);
        Self {
            properties: builder.properties,
        }
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    /// Property bound to `column`: the first exact match, else the first
    /// case-insensitive one.
    pub fn find(&self, column: &str) -> Option<usize> {
        self.matching(column).map(|(property, _)| property)
    }

    fn matching(&self, column: &str) -> Option<(usize, bool)> {
        self.properties
            .iter()
            .position(|p| p.name == column)
            .map(|property| (property, true))
            .or_else(|| {
                self.properties
                    .iter()
                    .position(|p| p.name.eq_ignore_ascii_case(column))
                    .map(|property| (property, false))
            })
    }

    /// Matches the columns of `record` against the properties.
    ///
    /// Columns are listed from the last to the first. Filling in that order
    /// leaves the left-most of several same-named columns in place.
    pub fn plan(&self, record: &dyn Record) -> Result<ColumnMap> {
        let mut matches = Vec::new();
        let mut exact = vec![false; self.properties.len()];
        for column in (0..record.field_count()).rev() {
            if let Some((property, is_exact)) = self.matching(record.field_name(column)?) {
                exact[property] |= is_exact;
                matches.push((column, property, is_exact));
            }
        }
        let bindings = matches
            .into_iter()
            .filter(|&(_, property, is_exact)| is_exact || !exact[property])
            .map(|(column, property, _)| (column, property))
            .collect();
        Ok(ColumnMap { bindings })
    }

    /// Creates a `T` from the current row of `record`.
    pub fn fill(&self, map: &ColumnMap, record: &dyn Record) -> Result<T> {
        let mut entity = T::default();
        for &(column, property) in &map.bindings {
            self.properties[property].apply(&mut entity, record, column)?;
        }
        Ok(entity)
    }
}

impl<T> fmt::Debug for TypeDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type", &std::any::type_name::<T>())
            .field(
                "properties",
                &self.properties.iter().map(|p| &p.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

type CacheSlot = Arc<OnceLock<Arc<dyn Any + Send + Sync>>>;

static DESCRIPTORS: OnceLock<DashMap<TypeId, CacheSlot>> = OnceLock::new();

/// The descriptor of `T`, built on the first call.
///
/// This is the one place the materializer can block: concurrent first calls
/// for the same type wait until a single [`Entity::describe`] finishes, and a
/// `describe` that asks for its own descriptor deadlocks. Once built, lookups
/// only take a short shard read of the cache map.
pub fn descriptor<T: Entity>() -> Arc<TypeDescriptor<T>> {
    let slot = DESCRIPTORS
        .get_or_init(DashMap::new)
        .entry(TypeId::of::<T>())
        .or_default()
        .clone();

    let cached = slot
        .get_or_init(|| {
            let descriptor = TypeDescriptor::<T>::build();
            debug!(
                entity = std::any::type_name::<T>(),
                properties = descriptor.properties.len(),
                "built entity descriptor"
            );
            Arc::new(descriptor) as Arc<dyn Any + Send + Sync>
        })
        .clone();

    cached
        .downcast::<TypeDescriptor<T>>()
        .unwrap_or_else(|_| unreachable!("descriptor cache is keyed by TypeId"))
}

/// Materializes the current row of `record`.
///
/// [`Entity::from_record`] is tried first, then the cached descriptor.
///
/// # Errors
///
/// [`Error::TypeCoercion`](crate::Error::TypeCoercion) if a matched column
/// cannot be converted into its property.
pub fn materialize_one<T: Entity>(record: &dyn Record) -> Result<T> {
    if let Some(entity) = T::from_record(record) {
        return entity;
    }
    let descriptor = descriptor::<T>();
    let map = descriptor.plan(record)?;
    descriptor.fill(&map, record)
}

/// Advances `stream` once and materializes that row, if there is one.
pub fn first<T: Entity, S: ResultStream>(stream: &mut S) -> Result<Option<T>> {
    if !stream.advance()? {
        return Ok(None);
    }
    materialize_one(&*stream).map(Some)
}

/// Lazily materializes every remaining row of `stream`.
///
/// Columns are matched on the first row only. The iterator ends after the
/// rows are exhausted or after the first error.
pub fn materialize_all<T: Entity, S: ResultStream>(stream: &mut S) -> Entities<'_, T, S> {
    Entities {
        stream,
        descriptor: descriptor::<T>(),
        map: None,
        done: false,
    }
}

/// Iterator returned by [`materialize_all`].
pub struct Entities<'s, T, S> {
    stream: &'s mut S,
    descriptor: Arc<TypeDescriptor<T>>,
    map: Option<ColumnMap>,
    done: bool,
}

impl<T: Entity, S: ResultStream> Entities<'_, T, S> {
    fn next_entity(&mut self) -> Result<Option<T>> {
        if !self.stream.advance()? {
            return Ok(None);
        }
        let record: &dyn Record = &*self.stream;
        if let Some(entity) = T::from_record(record) {
            return entity.map(Some);
        }
        let map = match self.map.take() {
            Some(map) => map,
            None => self.descriptor.plan(record)?,
        };
        let entity = self.descriptor.fill(&map, record);
        self.map = Some(map);
        entity.map(Some)
    }
}

impl<T: Entity, S: ResultStream> Iterator for Entities<'_, T, S> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.next_entity().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

impl<T: Entity, S: ResultStream> std::iter::FusedIterator for Entities<'_, T, S> {}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::rows::RowSet;
    use crate::value::Value;
    use crate::Error;

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        name: String,
        age: i32,
        nick: Option<String>,
    }

    impl Entity for Person {
        fn describe(d: &mut DescriptorBuilder<Self>) {
            d.field("Name", |p| &mut p.name)
                .field("Age", |p| &mut p.age)
                .setter("Nick", |p, v: Option<String>| p.nick = v);
        }
    }

    fn rows(columns: &[&str], data: Vec<Vec<Value>>) -> RowSet {
        let mut set = RowSet::new(columns.iter().copied());
        for row in data {
            set.push_row(row).unwrap();
        }
        set
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    #[test]
    fn test_case_insensitive_match() {
        let mut set = rows(&["NAME"], vec![vec![text("ann")]]);
        let person: Person = first(&mut set).unwrap().unwrap();
        assert_eq!(person.name, "ann");
    }

    #[test]
    fn test_exact_case_column_wins() {
        let mut set = rows(&["NAME", "Name"], vec![vec![text("upper"), text("exact")]]);
        let person: Person = first(&mut set).unwrap().unwrap();
        assert_eq!(person.name, "exact");

        let mut set = rows(&["Name", "NAME"], vec![vec![text("exact"), text("upper")]]);
        let person: Person = first(&mut set).unwrap().unwrap();
        assert_eq!(person.name, "exact");

        let descriptor = descriptor::<Person>();
        assert_eq!(descriptor.find("Name"), Some(0));
        assert_eq!(descriptor.find("nAmE"), Some(0));
        assert_eq!(descriptor.find("unknown"), None);
    }

    #[derive(Debug, Default)]
    struct Cased {
        exact: String,
        loose: String,
    }

    impl Entity for Cased {
        fn describe(d: &mut DescriptorBuilder<Self>) {
            d.field("name", |c| &mut c.loose)
                .field("Name", |c| &mut c.exact);
        }
    }

    #[test]
    fn test_exact_property_preferred_over_earlier_fuzzy_one() {
        let mut set = rows(&["Name"], vec![vec![text("x")]]);
        let cased: Cased = first(&mut set).unwrap().unwrap();
        assert_eq!(cased.exact, "x");
        assert_eq!(cased.loose, "");
    }

    #[derive(Debug, Default)]
    struct Single {
        x: String,
    }

    impl Entity for Single {
        fn describe(d: &mut DescriptorBuilder<Self>) {
            d.field("X", |s| &mut s.x);
        }
    }

    #[test]
    fn test_duplicate_columns_first_declared_wins() {
        let mut set = rows(&["X", "X"], vec![vec![text("B"), text("A")]]);
        let single: Single = first(&mut set).unwrap().unwrap();
        assert_eq!(single.x, "B");
    }

    #[test]
    fn test_plan_lists_columns_high_to_low() {
        let set = rows(&["Age", "other", "Name"], vec![]);
        let map = descriptor::<Person>().plan(&set).unwrap();
        assert_eq!(map.bindings(), &[(2, 0), (0, 1)]);
    }

    #[test]
    fn test_null_into_option() {
        let mut set = rows(&["Nick", "Name"], vec![vec![Value::Null, text("bo")]]);
        let person: Person = first(&mut set).unwrap().unwrap();
        assert_eq!(person.nick, None);
        assert_eq!(person.name, "bo");
    }

    #[test]
    fn test_null_into_non_nullable_fails() {
        let mut set = rows(&["Name"], vec![vec![Value::Null]]);
        assert!(matches!(
            first::<Person, _>(&mut set),
            Err(Error::TypeCoercion { found: "NULL", .. })
        ));
    }

    #[test]
    fn test_unmatched_columns_and_properties_ignored() {
        let mut set = rows(&["Extra", "Age"], vec![vec![text("?"), Value::Int64(30)]]);
        let person: Person = first(&mut set).unwrap().unwrap();
        assert_eq!(
            person,
            Person {
                name: String::new(),
                age: 30,
                nick: None
            }
        );
    }

    #[test]
    fn test_materialize_all_is_lazy_and_single_pass() {
        let mut set = rows(
            &["Name", "Age"],
            vec![
                vec![text("a"), Value::Int32(1)],
                vec![text("b"), Value::Int32(2)],
            ],
        );
        let mut people = materialize_all::<Person, _>(&mut set);
        assert_eq!(people.next().unwrap().unwrap().name, "a");
        assert_eq!(people.next().unwrap().unwrap().age, 2);
        assert!(people.next().is_none());
        drop(people);
        assert_eq!(materialize_all::<Person, _>(&mut set).count(), 0);
    }

    #[test]
    fn test_coercion_failure_aborts_sequence() {
        let mut set = rows(
            &["Age"],
            vec![
                vec![Value::Int32(1)],
                vec![text("not a number")],
                vec![Value::Int32(3)],
            ],
        );
        let results: Vec<_> = materialize_all::<Person, _>(&mut set).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::TypeCoercion { .. })));
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let mut set = rows(&["Name"], vec![]);
        assert!(first::<Person, _>(&mut set).unwrap().is_none());
    }

    #[derive(Debug, Default, PartialEq)]
    struct Span {
        start: i64,
        length: i64,
    }

    impl Entity for Span {
        fn describe(d: &mut DescriptorBuilder<Self>) {
            d.field("start", |s| &mut s.start);
        }

        fn from_record(record: &dyn Record) -> Option<Result<Self>> {
            use crate::record::RecordExt;

            let span = (|| -> Result<Span> {
                let start = record.get_as::<i64>("start")?.unwrap_or_default();
                let end = record
                    .get_as::<Option<i64>>("end")?
                    .flatten()
                    .unwrap_or(start);
                Ok(Span {
                    start,
                    length: end - start,
                })
            })();
            Some(span)
        }
    }

    #[test]
    fn test_from_record_takes_precedence_over_descriptor() {
        let mut set = rows(
            &["start", "end"],
            vec![
                vec![Value::Int32(3), Value::Int32(10)],
                vec![Value::Int32(5), Value::Null],
            ],
        );
        set.advance().unwrap();
        assert_eq!(
            materialize_one::<Span>(&set).unwrap(),
            Span { start: 3, length: 7 }
        );
        assert_eq!(
            materialize_all::<Span, _>(&mut set).collect::<Result<Vec<_>>>().unwrap(),
            vec![Span { start: 5, length: 0 }]
        );
    }

    #[test]
    fn test_from_record_errors_abort_sequence() {
        let mut set = rows(
            &["start", "end"],
            vec![vec![text("x"), Value::Int32(1)], vec![Value::Int32(1), Value::Int32(2)]],
        );
        let results: Vec<_> = materialize_all::<Span, _>(&mut set).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::TypeCoercion { .. })));
    }

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    #[allow(dead_code)]
    struct Counted {
        value: i64,
    }

    impl Entity for Counted {
        fn describe(d: &mut DescriptorBuilder<Self>) {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            thread::yield_now();
            d.field("value", |c| &mut c.value);
        }
    }

    #[test]
    fn test_descriptor_built_once_under_contention() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| descriptor::<Counted>()))
            .collect();
        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
        assert!(descriptors.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(descriptors[0].property_names().collect::<Vec<_>>(), vec!["value"]);
    }
}
