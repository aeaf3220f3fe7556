//! # Observable State
//!
//! Single-writer, multi-reader state container with synchronous change
//! notification. Every derived component in the pipeline embeds one of these
//! and exposes it through the [`Observe`] trait.
//!
//! ## Notification order
//!
//! `set()` stores the new value and then calls each listener, in
//! registration order, before returning. A listener may call `set()` again
//! on the same observable; the nested value is stored and delivered to every
//! listener first, after which the outer loop resumes delivering its own
//! (now superseded) value to the remaining listeners. `get()` always returns
//! the latest stored value.
//!
//! ## Usage
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use fpv_aid::observable::Observable;
//!
//! let level = Observable::new(0);
//! let seen = Rc::new(Cell::new(0));
//! let s = seen.clone();
//! let mut sub = level.subscribe(move |v: &i32| s.set(*v));
//!
//! level.set(2);
//! assert_eq!(seen.get(), 2);
//!
//! sub.unsubscribe();
//! level.set(5);
//! assert_eq!(seen.get(), 2);
//! assert_eq!(level.get(), 5);
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Listener<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    state: RefCell<T>,
    listeners: RefCell<Vec<(u64, Listener<T>)>>,
    next_id: Cell<u64>,
}

/// Shared observable state cell.
///
/// Cloning yields another handle to the same state.
pub struct Observable<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Create a new observable holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(initial),
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.inner.state.borrow().clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    /// Store `next` and notify every listener with it.
    ///
    /// No diffing is performed; equal values still notify.
    pub fn set(&self, next: T) {
        *self.inner.state.borrow_mut() = next.clone();

        let snapshot: Vec<(u64, Listener<T>)> = self.inner.listeners.borrow().clone();
        for (id, listener) in snapshot {
            if self.is_registered(id) {
                (*listener)(&next);
            }
        }
    }

    /// Replace the value only if it differs, notifying on change.
    ///
    /// Returns `true` when listeners were notified.
    pub fn set_if_changed(&self, next: T) -> bool
    where
        T: PartialEq,
    {
        if *self.inner.state.borrow() == next {
            return false;
        }
        self.set(next);
        true
    }

    /// Register `listener`; it is called with every value passed to `set()`.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));

        let weak: Weak<Inner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn is_registered(&self, id: u64) -> bool {
        self.inner
            .listeners
            .borrow()
            .iter()
            .any(|(lid, _)| *lid == id)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("state", &*self.inner.state.borrow())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

/// Disposer returned by `subscribe()`.
///
/// `unsubscribe()` is idempotent; dropping the subscription unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap a dispose closure.
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Remove the listener. Later calls do nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }

    /// Whether the listener is still registered through this handle.
    pub fn is_active(&self) -> bool {
        self.dispose.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Read side of an observable component.
pub trait Observe<T> {
    /// Current value.
    fn get(&self) -> T;

    /// Register a change listener.
    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + 'static;
}

impl<T: Clone + 'static> Observe<T> for Observable<T> {
    fn get(&self) -> T {
        Observable::get(self)
    }

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        Observable::subscribe(self, listener)
    }
}
