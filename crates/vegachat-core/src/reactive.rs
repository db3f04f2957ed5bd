//! Observable single-value cell
//!
//! A `ReactiveCell` is a shared slot that calls every registered observer,
//! synchronously and in registration order, each time a new value is
//! written. Clones share the same value and observers, so a background task
//! can write while the UI reads.

use std::sync::{Arc, Mutex, MutexGuard};

type Observer<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

struct Slot<T> {
    value: T,
    observers: Vec<Observer<T>>,
}

pub struct ReactiveCell<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> ReactiveCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                value: initial,
                observers: Vec::new(),
            })),
        }
    }

    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Store `value` and notify observers with `(new, old)`.
    pub fn set(&self, value: T) {
        let (old, observers) = {
            let mut slot = self.lock();
            let old = std::mem::replace(&mut slot.value, value.clone());
            (old, slot.observers.clone())
        };
        // Observers run unlocked so they may read or write the cell themselves.
        for observer in observers {
            observer(&value, &old);
        }
    }

    pub fn on_change<F>(&self, observer: F)
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.lock().observers.push(Arc::new(observer));
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        // Poisoned slots still hold a valid value.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clone + Default> Default for ReactiveCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReactiveCell").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_notifies_with_new_and_old() {
        let cell = ReactiveCell::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cell.on_change(move |new, old| sink.lock().unwrap().push((*new, *old)));

        cell.set(2);
        cell.set(5);

        assert_eq!(*seen.lock().unwrap(), vec![(2, 1), (5, 2)]);
        assert_eq!(cell.get(), 5);
    }

    #[test]
    fn clones_share_value() {
        let cell = ReactiveCell::new(String::new());
        let other = cell.clone();
        other.set("streamed".to_string());
        assert_eq!(cell.get(), "streamed");
    }

    #[test]
    fn observer_may_read_cell() {
        let cell = ReactiveCell::new(0u32);
        let reader = cell.clone();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        cell.on_change(move |_, _| *sink.lock().unwrap() = Some(reader.get()));

        cell.set(7);
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }
}
