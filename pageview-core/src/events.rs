use std::sync::Arc;

use parking_lot::Mutex;

use crate::navigation::Location;

/// Notifications published by the viewer components. Delivered in the order
/// the state transitions happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    LayoutInvalidated,
    PageReady { page: usize },
    Jumped(Location),
    CurrentLocationChanged(Location),
    BackAvailableChanged(bool),
    ForwardAvailableChanged(bool),
    SearchStringChanged,
    ResultsReset,
    ResultsChanged { page: usize },
    CurrentPageChanged { page: usize },
    CurrentResultChanged { page: usize, result: Option<usize> },
    /// The matches backing the current result geometry changed without the
    /// cursor moving.
    CurrentResultGeometryChanged,
}

/// Shared, append-only event list drained by the controller.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: ViewerEvent) {
        self.inner.lock().push(event);
    }

    pub fn drain(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.inner.lock())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_queue() {
        let queue = EventQueue::new();
        let publisher = queue.clone();
        publisher.push(ViewerEvent::LayoutInvalidated);
        publisher.push(ViewerEvent::PageReady { page: 3 });

        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.drain(),
            vec![ViewerEvent::LayoutInvalidated, ViewerEvent::PageReady { page: 3 }]
        );
        assert!(publisher.is_empty());
    }
}
