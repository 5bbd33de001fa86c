//! Branching history of visited destinations.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::events::{EventQueue, ViewerEvent};
use crate::geometry::PointF;

/// A destination in the document: page, position on that page and zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub page: usize,
    pub position: PointF,
    pub zoom: f64,
}

impl Location {
    pub const fn new(page: usize, position: PointF, zoom: f64) -> Self {
        Self {
            page,
            position,
            zoom,
        }
    }
}

pub struct NavigationStack {
    entries: Vec<Location>,
    current: usize,
    events: EventQueue,
}

impl NavigationStack {
    pub fn new(events: EventQueue) -> Self {
        Self {
            entries: Vec::new(),
            current: 0,
            events,
        }
    }

    pub fn current(&self) -> Option<&Location> {
        self.entries.get(self.current)
    }

    pub fn current_page(&self) -> Option<usize> {
        self.current().map(|location| location.page)
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.entries.is_empty()).then_some(self.current)
    }

    pub fn entries(&self) -> &[Location] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn back_available(&self) -> bool {
        !self.entries.is_empty() && self.current > 0
    }

    pub fn forward_available(&self) -> bool {
        !self.entries.is_empty() && self.current + 1 < self.entries.len()
    }

    /// Records a new destination. Any forward history is discarded: jumping
    /// from the middle of the history starts a new branch.
    pub fn jump(&mut self, page: usize, position: PointF, zoom: f64, emit_jumped: bool) {
        let before = self.availability();
        let location = Location::new(page, position, zoom);

        if !self.entries.is_empty() {
            let dropped = self.entries.len() - (self.current + 1);
            if dropped > 0 {
                debug!(dropped, "discarding forward history");
            }
            self.entries.truncate(self.current + 1);
        }
        self.entries.push(location);
        self.current = self.entries.len() - 1;

        self.publish_availability(before);
        if emit_jumped {
            self.events.push(ViewerEvent::Jumped(location));
        }
    }

    /// Rewrites the current destination in place, for continuous scrolling
    /// and zooming. Never pushes, truncates or emits `Jumped`.
    pub fn update(&mut self, page: usize, position: PointF, zoom: f64) {
        let location = Location::new(page, position, zoom);
        let Some(current) = self.entries.get_mut(self.current) else {
            trace!(page, "ignoring update on empty navigation history");
            return;
        };
        if *current == location {
            return;
        }
        *current = location;
        self.events.push(ViewerEvent::CurrentLocationChanged(location));
    }

    pub fn back(&mut self) {
        if !self.back_available() {
            return;
        }
        let before = self.availability();
        self.current -= 1;
        self.publish_availability(before);
        self.events.push(ViewerEvent::Jumped(self.entries[self.current]));
    }

    pub fn forward(&mut self) {
        if !self.forward_available() {
            return;
        }
        let before = self.availability();
        self.current += 1;
        self.publish_availability(before);
        self.events.push(ViewerEvent::Jumped(self.entries[self.current]));
    }

    /// Forgets the whole history, e.g. when the document is replaced.
    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let before = self.availability();
        self.entries.clear();
        self.current = 0;
        self.publish_availability(before);
    }

    fn availability(&self) -> (bool, bool) {
        (self.back_available(), self.forward_available())
    }

    fn publish_availability(&self, (back, forward): (bool, bool)) {
        if back != self.back_available() {
            self.events
                .push(ViewerEvent::BackAvailableChanged(self.back_available()));
        }
        if forward != self.forward_available() {
            self.events
                .push(ViewerEvent::ForwardAvailableChanged(self.forward_available()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> PointF {
        PointF::new(0.0, 0.0)
    }

    fn stack_with(pages: &[usize]) -> (NavigationStack, EventQueue) {
        let events = EventQueue::new();
        let mut stack = NavigationStack::new(events.clone());
        for page in pages {
            stack.jump(*page, origin(), 1.0, true);
        }
        events.drain();
        (stack, events)
    }

    fn pages(stack: &NavigationStack) -> Vec<usize> {
        stack.entries().iter().map(|location| location.page).collect()
    }

    #[test]
    fn empty_stack_has_no_current_entry() {
        let (stack, _) = stack_with(&[]);
        assert!(stack.current().is_none());
        assert_eq!(stack.current_index(), None);
        assert!(!stack.back_available());
        assert!(!stack.forward_available());
    }

    #[test]
    fn jump_from_middle_discards_forward_branch() {
        let (mut stack, _) = stack_with(&[0, 1, 2]);
        stack.back();
        assert_eq!(stack.current_index(), Some(1));

        stack.jump(3, origin(), 1.0, true);

        assert_eq!(pages(&stack), vec![0, 1, 3]);
        assert_eq!(stack.current_index(), Some(2));
        assert!(!stack.forward_available());
        assert!(stack.back_available());
    }

    #[test]
    fn update_rewrites_current_entry_without_branching() {
        let (mut stack, events) = stack_with(&[0, 1, 2]);
        stack.back();
        events.drain();

        stack.update(1, PointF::new(10.0, 250.0), 2.0);

        assert_eq!(stack.len(), 3);
        assert!(stack.forward_available());
        assert_eq!(
            stack.current(),
            Some(&Location::new(1, PointF::new(10.0, 250.0), 2.0))
        );
        assert_eq!(
            events.drain(),
            vec![ViewerEvent::CurrentLocationChanged(Location::new(
                1,
                PointF::new(10.0, 250.0),
                2.0
            ))]
        );

        stack.back();
        stack.forward();
        assert_eq!(stack.current().unwrap().position, PointF::new(10.0, 250.0));
    }

    #[test]
    fn identical_update_is_silent() {
        let (mut stack, events) = stack_with(&[4]);
        stack.update(4, origin(), 1.0);
        assert!(events.is_empty());
    }

    #[test]
    fn update_on_empty_history_is_ignored() {
        let (mut stack, events) = stack_with(&[]);
        stack.update(2, origin(), 1.0);
        assert!(stack.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn back_and_forward_at_boundaries_are_silent_no_ops() {
        let (mut stack, events) = stack_with(&[0, 5]);
        stack.forward();
        assert_eq!(stack.current_index(), Some(1));
        assert!(events.is_empty());

        stack.back();
        events.drain();
        stack.back();
        assert_eq!(stack.current_index(), Some(0));
        assert!(events.is_empty());

        let (mut empty, events) = stack_with(&[]);
        empty.back();
        empty.forward();
        assert!(events.is_empty());
    }

    #[test]
    fn traversal_emits_jumped_and_availability_changes() {
        let (mut stack, events) = stack_with(&[0, 7]);
        stack.back();
        let first = Location::new(0, origin(), 1.0);
        assert_eq!(
            events.drain(),
            vec![
                ViewerEvent::BackAvailableChanged(false),
                ViewerEvent::ForwardAvailableChanged(true),
                ViewerEvent::Jumped(first),
            ]
        );

        stack.forward();
        let second = Location::new(7, origin(), 1.0);
        assert_eq!(
            events.drain(),
            vec![
                ViewerEvent::BackAvailableChanged(true),
                ViewerEvent::ForwardAvailableChanged(false),
                ViewerEvent::Jumped(second),
            ]
        );
    }

    #[test]
    fn jump_can_suppress_jumped_event() {
        let (mut stack, events) = stack_with(&[0]);
        stack.jump(9, origin(), 1.5, false);
        assert_eq!(stack.current_page(), Some(9));
        assert_eq!(events.drain(), vec![ViewerEvent::BackAvailableChanged(true)]);
    }

    #[test]
    fn clear_empties_history() {
        let (mut stack, events) = stack_with(&[0, 1]);
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(events.drain(), vec![ViewerEvent::BackAvailableChanged(false)]);
    }
}
