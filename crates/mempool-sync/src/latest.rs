//! Fixed-capacity list of the most recently observed arrivals, newest first.

/// Rolling list of the last N arrivals in stripped form.
///
/// The element type is whatever the injected strip function produces; the
/// engine never inspects it.
pub struct LatestArrivals<T> {
    capacity: usize,
    items: Vec<T>,
}

impl<T: Clone> LatestArrivals<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
        }
    }

    /// Prepends one pass's arrivals, keeping their upstream listing order,
    /// and truncates to capacity.
    pub fn prepend(&mut self, mut batch: Vec<T>) {
        if batch.is_empty() {
            return;
        }

        batch.extend(self.items.drain(..));
        batch.truncate(self.capacity);
        self.items = batch;
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}
