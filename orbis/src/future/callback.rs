use super::Future;
use crate::error::Error;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A completion callback registered on a [`Future`].
///
/// Callbacks compare equal when they share the same underlying closure:
/// cloning a `DoneCallback` and passing the clone to
/// [`Future::remove_done_callback`] removes every registration of the
/// original.
pub struct DoneCallback<T> {
    func: Rc<dyn Fn(&Future<T>) -> Result<(), Error>>,
}

impl<T> DoneCallback<T> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Future<T>) -> Result<(), Error> + 'static,
    {
        Self {
            func: Rc::new(func),
        }
    }

    /// Wraps a closure that can only run once.
    ///
    /// Any invocation after the first is a no-op.
    pub fn once<F>(func: F) -> Self
    where
        F: FnOnce(&Future<T>) -> Result<(), Error> + 'static,
    {
        let slot = RefCell::new(Some(func));

        Self::new(move |future| {
            let func = slot.borrow_mut().take();
            match func {
                Some(func) => func(future),
                None => Ok(()),
            }
        })
    }

    pub(crate) fn call(&self, future: &Future<T>) -> Result<(), Error> {
        (self.func)(future)
    }
}

impl<T> Clone for DoneCallback<T> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<T> PartialEq for DoneCallback<T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.func), Rc::as_ptr(&other.func))
    }
}

impl<T> Eq for DoneCallback<T> {}

impl<T> fmt::Debug for DoneCallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DoneCallback({:p})", Rc::as_ptr(&self.func))
    }
}
