//! Free-list of statement components.

use crate::dialect::SqlComponent;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Bounded free-list of reset [`SqlComponent`]s shared by every builder of a registry.
#[derive(Debug)]
pub struct StatementPool {
    free: Mutex<Vec<SqlComponent>>,
    capacity: usize,
}

impl StatementPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take a component out of the pool, allocating when the pool is empty.
    pub fn checkout(self: &Arc<Self>) -> Checkout {
        let comp = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        Checkout {
            comp,
            pool: Arc::clone(self),
        }
    }

    /// Number of idle components.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn checkin(&self, mut comp: SqlComponent) {
        comp.reset();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(comp);
        }
    }
}

impl Default for StatementPool {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A component checked out of a [`StatementPool`].
///
/// Dropping it resets the component and returns it to the pool, on every exit path
/// including errors and panics.
#[derive(Debug)]
pub struct Checkout {
    comp: SqlComponent,
    pool: Arc<StatementPool>,
}

impl Deref for Checkout {
    type Target = SqlComponent;

    fn deref(&self) -> &SqlComponent {
        &self.comp
    }
}

impl DerefMut for Checkout {
    fn deref_mut(&mut self) -> &mut SqlComponent {
        &mut self.comp
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        self.pool.checkin(std::mem::take(&mut self.comp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_in_components_come_back_reset() {
        let pool = Arc::new(StatementPool::new(4));
        {
            let mut comp = pool.checkout();
            comp.table = "users".into();
            comp.limit = "10".into();
        }
        assert_eq!(pool.idle(), 1);

        let comp = pool.checkout();
        assert!(comp.is_reset());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn pool_is_bounded() {
        let pool = Arc::new(StatementPool::new(1));
        let a = pool.checkout();
        let b = pool.checkout();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }
}
