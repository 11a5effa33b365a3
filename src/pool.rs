//! Bounded, lock-free object pool.
//!
//! The pool keeps at most `capacity` idle instances in a fixed array of slots.
//! Borrowing scans the slots and claims the first occupied one with a single
//! compare-and-swap; returning scans for the first empty slot the same way.
//! Nothing here ever blocks: an exhausted pool constructs a fresh instance and
//! a full pool simply drops whatever is handed back.
//!
//! Borrowed instances come wrapped in a [`Pooled`] handle which returns the
//! instance when dropped. A handle that is leaked with [`std::mem::forget`]
//! leaks its instance; the slot array is not affected, so the pool keeps its
//! full capacity.
//!
//! # Examples
//!
//! ```
//! use sqlx_format_bind::pool::ObjectPool;
//!
//! let pool = ObjectPool::<Vec<u8>>::builder(4)
//!     .default_constructor()
//!     .recycle(|buf| {
//!         buf.clear();
//!         true
//!     })
//!     .build();
//!
//! {
//!     let mut buf = pool.borrow()?;
//!     buf.extend_from_slice(b"scratch");
//! }
//! assert_eq!(pool.available(), 1);
//! assert!(pool.borrow()?.is_empty());
//! # Ok::<(), sqlx_format_bind::Error>(())
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use tracing::trace;

use crate::{Error, Result};

/// Capacity used by [`Builder::default`].
pub const DEFAULT_CAPACITY: usize = 100;

type Constructor<T> = Box<dyn Fn() -> T + Send + Sync>;
type Recycler<T> = Box<dyn Fn(&mut T) -> bool + Send + Sync>;

/// Construction from the context value a pool was configured with.
///
/// This is the statically typed counterpart of a "constructor taking the
/// owning context": the pool calls it only when no explicit factory is set.
pub trait FromContext<C> {
    fn from_context(context: &C) -> Self;
}

/// A fixed-capacity pool of reusable instances.
pub struct ObjectPool<T> {
    slots: Box<[AtomicPtr<T>]>,
    factory: Option<Constructor<T>>,
    contextual: Option<Constructor<T>>,
    fallback: Option<Constructor<T>>,
    recycler: Option<Recycler<T>>,
    _owns: PhantomData<T>,
}

// SAFETY: the pool only ever moves whole `T` values between threads and never
// hands out shared references to idle instances, so `T: Send` is sufficient.
unsafe impl<T: Send> Send for ObjectPool<T> {}
unsafe impl<T: Send> Sync for ObjectPool<T> {}

impl<T: Default + Send + 'static> ObjectPool<T> {
    /// Creates a pool that constructs missing instances with `T::default()`.
    pub fn new(capacity: usize) -> Self {
        Builder::new(capacity).default_constructor().build()
    }
}

impl<T: Send + 'static> ObjectPool<T> {
    /// Returns a [`Builder`] for a pool of the given capacity.
    pub fn builder(capacity: usize) -> Builder<T> {
        Builder::new(capacity)
    }

    /// Creates a pool that constructs missing instances with `factory`.
    pub fn with_factory<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Builder::new(capacity).factory(factory).build()
    }
}

impl<T> ObjectPool<T> {
    /// Maximum number of idle instances the pool retains.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of idle instances at the moment of the call.
    ///
    /// Under concurrent use this is a snapshot and may be stale on return.
    pub fn available(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !slot.load(Ordering::Acquire).is_null())
            .count()
    }

    /// Borrows an idle instance, constructing one if every slot is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuitableConstructor`] if the pool is empty and was
    /// built without any way to construct `T`. The failure affects only this
    /// call.
    pub fn borrow(&self) -> Result<Pooled<'_, T>> {
        let item = match self.take() {
            Some(item) => item,
            None => Box::new(self.construct()?),
        };
        Ok(Pooled {
            pool: self,
            item: ManuallyDrop::new(item),
        })
    }

    fn take(&self) -> Option<Box<T>> {
        for slot in self.slots.iter() {
            let current = slot.load(Ordering::Acquire);
            if current.is_null() {
                continue;
            }
            if slot
                .compare_exchange(current, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // SAFETY: every non-null slot value came from `Box::into_raw` in
                // `give_back`, and the successful exchange moved it out of the
                // slot, so this thread is its only owner.
                return Some(unsafe { Box::from_raw(current) });
            }
        }
        None
    }

    fn construct(&self) -> Result<T> {
        let constructor = self
            .factory
            .as_ref()
            .or(self.contextual.as_ref())
            .or(self.fallback.as_ref())
            .ok_or(Error::NoSuitableConstructor(std::any::type_name::<T>()))?;
        trace!(
            pooled_type = std::any::type_name::<T>(),
            "pool empty, constructing new instance"
        );
        Ok(constructor())
    }

    fn give_back(&self, mut item: Box<T>) {
        if let Some(recycler) = &self.recycler {
            if !recycler(&mut item) {
                trace!(
                    pooled_type = std::any::type_name::<T>(),
                    "recycler rejected instance"
                );
                return;
            }
        }

        let raw = Box::into_raw(item);
        for slot in self.slots.iter() {
            if !slot.load(Ordering::Acquire).is_null() {
                continue;
            }
            if slot
                .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }

        // SAFETY: no slot accepted `raw`, so ownership never left this function.
        drop(unsafe { Box::from_raw(raw) });
        trace!(
            pooled_type = std::any::type_name::<T>(),
            "pool full, dropping returned instance"
        );
    }
}

impl<T> Drop for ObjectPool<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            let raw = std::mem::replace(slot.get_mut(), ptr::null_mut());
            if !raw.is_null() {
                // SAFETY: `&mut self` guarantees no borrower can race us, and
                // non-null slots always own a boxed instance.
                drop(unsafe { Box::from_raw(raw) });
            }
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("type", &std::any::type_name::<T>())
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// Configures and builds an [`ObjectPool`].
///
/// When the pool is empty a new instance is made by the first configured
/// constructor in this order: [`factory`](Builder::factory),
/// [`context`](Builder::context), [`default_constructor`](Builder::default_constructor).
pub struct Builder<T> {
    capacity: usize,
    factory: Option<Constructor<T>>,
    contextual: Option<Constructor<T>>,
    fallback: Option<Constructor<T>>,
    recycler: Option<Recycler<T>>,
}

impl<T: Send + 'static> Builder<T> {
    /// Starts a builder. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            factory: None,
            contextual: None,
            fallback: None,
            recycler: None,
        }
    }

    /// Explicit factory, always preferred over the other constructors.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Constructs instances from `context` through [`FromContext`].
    pub fn context<C>(mut self, context: C) -> Self
    where
        T: FromContext<C>,
        C: Send + Sync + 'static,
    {
        self.contextual = Some(Box::new(move || T::from_context(&context)));
        self
    }

    /// Falls back to `T::default()`.
    pub fn default_constructor(mut self) -> Self
    where
        T: Default,
    {
        self.fallback = Some(Box::new(T::default));
        self
    }

    /// Runs on every returned instance. Returning `false` discards it.
    pub fn recycle<F>(mut self, recycler: F) -> Self
    where
        F: Fn(&mut T) -> bool + Send + Sync + 'static,
    {
        self.recycler = Some(Box::new(recycler));
        self
    }

    pub fn build(self) -> ObjectPool<T> {
        let slots = (0..self.capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        ObjectPool {
            slots,
            factory: self.factory,
            contextual: self.contextual,
            fallback: self.fallback,
            recycler: self.recycler,
            _owns: PhantomData,
        }
    }
}

impl<T: Send + 'static> Default for Builder<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Scoped ownership of a borrowed instance.
///
/// Dropping the handle hands the instance back to its pool. Because the
/// handle is moved into [`release`](Pooled::release) or dropped exactly once,
/// an instance can never be returned twice.
pub struct Pooled<'a, T> {
    pool: &'a ObjectPool<T>,
    item: ManuallyDrop<Box<T>>,
}

impl<T> Pooled<'_, T> {
    /// Returns the instance to the pool now.
    pub fn release(self) {
        drop(self);
    }

    /// Takes the instance out of circulation. The pool will not see it again.
    pub fn detach(self) -> T {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so `item` is taken exactly once.
        let item = unsafe { ManuallyDrop::take(&mut this.item) };
        *item
    }
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        // SAFETY: drop runs once and `item` is not touched afterwards.
        let item = unsafe { ManuallyDrop::take(&mut self.item) };
        self.pool.give_back(item);
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&**self).finish()
    }
}
