//! Collision events

use crate::body::BodyHandle;
use tgame_math::Vec2;

/// Contact data attached to a start event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactData {
    /// Contact point on the first body, world space
    pub point: Vec2,
    /// Contact normal (pointing from body_a to body_b)
    pub normal: Vec2,
    /// Penetration depth
    pub depth: f32,
}

/// Type of collision event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionEventType {
    /// Pair started touching this step
    Started,
    /// Pair stopped touching this step
    Stopped,
}

/// A collision event between two bodies
#[derive(Debug, Clone)]
pub struct CollisionEvent {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub event_type: CollisionEventType,
    /// Contact points (empty for stopped events)
    pub contacts: Vec<ContactData>,
}

impl CollisionEvent {
    /// Check if this is a start event
    pub fn is_started(&self) -> bool {
        self.event_type == CollisionEventType::Started
    }

    /// Check if this is a stop event
    pub fn is_stopped(&self) -> bool {
        self.event_type == CollisionEventType::Stopped
    }

    /// Check whether `body` takes part in the event
    pub fn involves(&self, body: BodyHandle) -> bool {
        self.body_a == body || self.body_b == body
    }

    /// Get the average contact point
    pub fn average_contact_point(&self) -> Option<Vec2> {
        if self.contacts.is_empty() {
            return None;
        }
        let sum: Vec2 = self.contacts.iter().map(|c| c.point).sum();
        Some(sum / self.contacts.len() as f32)
    }

    /// Get the deepest penetration
    pub fn max_depth(&self) -> Option<f32> {
        self.contacts.iter().map(|c| c.depth).reduce(f32::max)
    }
}

/// Handler trait for physics events
pub trait PhysicsEventHandler {
    /// Called once per recorded collision start or end
    fn on_collision(&mut self, event: &CollisionEvent);
}

/// Default event handler that collects events into a buffer
#[derive(Debug, Default)]
pub struct EventCollector {
    /// Collision events this frame
    pub collision_events: Vec<CollisionEvent>,
}

impl EventCollector {
    /// Create a new event collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all collected events
    pub fn clear(&mut self) {
        self.collision_events.clear();
    }

    pub fn len(&self) -> usize {
        self.collision_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collision_events.is_empty()
    }

    /// Get collision start events
    pub fn started_collisions(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.collision_events.iter().filter(|e| e.is_started())
    }

    /// Get collision end events
    pub fn stopped_collisions(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.collision_events.iter().filter(|e| e.is_stopped())
    }
}

impl PhysicsEventHandler for EventCollector {
    fn on_collision(&mut self, event: &CollisionEvent) {
        self.collision_events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Body, BodyId, BodySet};
    use approx::assert_relative_eq;

    fn two_handles() -> (BodyHandle, BodyHandle) {
        let mut bodies = BodySet::new();
        (
            BodyHandle(bodies.insert(Body::new(BodyId(1)))),
            BodyHandle(bodies.insert(Body::new(BodyId(2)))),
        )
    }

    #[test]
    fn test_collector_filters() {
        let (a, b) = two_handles();
        let mut collector = EventCollector::new();
        collector.on_collision(&CollisionEvent {
            body_a: a,
            body_b: b,
            event_type: CollisionEventType::Started,
            contacts: vec![
                ContactData { point: Vec2::new(0.0, 1.0), normal: Vec2::Y, depth: 0.1 },
                ContactData { point: Vec2::new(2.0, 1.0), normal: Vec2::Y, depth: 0.3 },
            ],
        });
        collector.on_collision(&CollisionEvent {
            body_a: a,
            body_b: b,
            event_type: CollisionEventType::Stopped,
            contacts: Vec::new(),
        });

        assert_eq!(collector.len(), 2);
        let started: Vec<_> = collector.started_collisions().collect();
        assert_eq!(started.len(), 1);
        assert!(started[0].involves(b));
        assert_eq!(started[0].average_contact_point(), Some(Vec2::new(1.0, 1.0)));
        assert_relative_eq!(started[0].max_depth().unwrap(), 0.3);

        let stopped: Vec<_> = collector.stopped_collisions().collect();
        assert_eq!(stopped[0].average_contact_point(), None);

        collector.clear();
        assert!(collector.is_empty());
    }
}
