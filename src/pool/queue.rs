//! Bounded FIFO queue with its own lock

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Bounded FIFO queue safe for concurrent push/pop.
///
/// Never blocks: a push on a full queue hands the item back.
pub(crate) struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Push to the back, or return the item if the queue is at capacity.
    pub(crate) fn try_push(&self, item: T) -> Result<(), T> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        Ok(())
    }

    pub(crate) fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Remove the first item matching `predicate`, atomically with respect
    /// to every other operation on this queue.
    pub(crate) fn remove_first<F>(&self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut items = self.items.lock();
        let index = items.iter().position(|item| predicate(item))?;
        items.remove(index)
    }

    pub(crate) fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(3);
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        queue.try_push(3).unwrap();

        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_push_on_full_returns_item() {
        let queue = BoundedQueue::new(1);
        assert!(queue.try_push("a").is_ok());
        assert_eq!(queue.try_push("b"), Err("b"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_remove_first_by_identity() {
        let queue = BoundedQueue::new(4);
        for id in [10, 20, 30] {
            queue.try_push(id).unwrap();
        }

        assert_eq!(queue.remove_first(|id| *id == 20), Some(20));
        assert_eq!(queue.remove_first(|id| *id == 20), None);
        assert_eq!(queue.drain(), vec![10, 30]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_concurrent_push_pop() {
        use std::sync::Arc;

        let queue = Arc::new(BoundedQueue::new(1000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.try_push(t * 100 + i).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 400);
        let mut popped = 0;
        while queue.try_pop().is_some() {
            popped += 1;
        }
        assert_eq!(popped, 400);
    }
}
