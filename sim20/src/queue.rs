use std::collections::VecDeque;

/// Error returned when pushing to a [`Queue`] that has reached its capacity.
/// The rejected value is handed back.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("queue is full")]
pub struct QueueFull<T>(pub T);

/// FIFO queue of simulation entities, e.g., processes waiting for a resource.
///
/// A queue may be bounded, in which case pushing to a full queue hands the value back.
/// The default queue is unbounded. Besides the usual FIFO operations, an element can be taken
/// out of the middle of the queue, which lets a resource keep a secondary ordering of the
/// waiting elements without owning them twice.
///
/// # Examples
///
/// ```
/// # use sim20::{Queue, QueueFull};
///
/// let mut waiting: Queue<&str> = Queue::bounded(2);
/// assert!(waiting.push_back("long").is_ok());
/// assert!(waiting.push_back("short").is_ok());
/// assert_eq!(waiting.push_back("late"), Err(QueueFull("late")));
/// assert_eq!(waiting.remove_where(|p| *p == "short"), Some("short"));
/// assert_eq!(waiting.pop_front(), Some("long"));
/// ```
#[derive(Debug, Clone)]
pub struct Queue<T> {
    inner: VecDeque<T>,
    capacity: usize,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            inner: VecDeque::default(),
            capacity: usize::MAX,
        }
    }
}

impl<T> Queue<T> {
    /// Creates a queue with the given capacity.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self {
            inner: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an element to the back of the `Queue`.
    ///
    /// # Errors
    ///
    /// Returns the value back wrapped in [`QueueFull`] if the queue is at capacity.
    pub fn push_back(&mut self, value: T) -> Result<(), QueueFull<T>> {
        if self.inner.len() < self.capacity {
            self.inner.push_back(value);
            Ok(())
        } else {
            Err(QueueFull(value))
        }
    }

    /// Removes the first element and returns it, or `None` if the `Queue` is empty.
    pub fn pop_front(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    /// Returns a reference to the first element, or `None` if the `Queue` is empty.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.inner.front()
    }

    /// Removes and returns the first element matching `predicate`, preserving the order of the
    /// remaining elements.
    pub fn remove_where<P>(&mut self, predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let position = self.inner.iter().position(predicate)?;
        self.inner.remove(position)
    }

    /// Iterates over the elements from front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }

    /// Returns the number of elements in the `Queue`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks if the `Queue` is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bounded_queue() {
        let mut queue = Queue::<&str>::bounded(2);
        assert_eq!(queue.len(), 0);

        assert!(queue.push_back("A").is_ok());
        assert!(queue.push_back("B").is_ok());
        assert_eq!(queue.push_back("C"), Err(QueueFull("C")));

        assert_eq!(queue.pop_front(), Some("A"));
        assert_eq!(queue.pop_front(), Some("B"));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_unbounded_queue() {
        let mut queue = Queue::<&str>::default();
        assert!(queue.is_empty());

        assert!(queue.push_back("A").is_ok());
        assert!(queue.push_back("B").is_ok());
        assert!(queue.push_back("C").is_ok());
        assert_eq!(queue.front(), Some(&"A"));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec!["A", "B", "C"]);

        assert_eq!(queue.pop_front(), Some("A"));
        assert_eq!(queue.pop_front(), Some("B"));
        assert_eq!(queue.pop_front(), Some("C"));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_remove_where() {
        let mut queue = Queue::default();
        for value in 1..=5 {
            assert!(queue.push_back(value).is_ok());
        }
        assert_eq!(queue.remove_where(|&v| v == 3), Some(3));
        assert_eq!(queue.remove_where(|&v| v == 3), None);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![1, 2, 4, 5]);
    }
}
