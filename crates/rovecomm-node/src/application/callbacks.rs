//! Registry of user callbacks keyed by data ID.
//!
//! Each concrete data ID has at most one callback; registering again
//! replaces the previous one.  Data ID 0 ("any") is a separate slot whose
//! callback sees every packet, in addition to the ID-specific one.
//!
//! The registry only answers "who should get this packet"; the dispatch
//! runtime clones the returned `Arc`s out and invokes them after releasing
//! its lock, so a callback may call back into the runtime.

use std::collections::HashMap;
use std::sync::Arc;

use rovecomm_core::protocol::system;
use rovecomm_core::{ElementType, Packet};

/// A user callback.  Invoked on the dispatch thread.
pub type Callback = Arc<dyn Fn(&Packet) + Send + Sync>;

struct Registration {
    callback: Callback,
    /// Element type the manifest declares for this ID, if it declares one.
    expected_type: Option<ElementType>,
}

/// Result of matching a packet against the ID-specific slot.
pub enum ExactMatch {
    /// A callback is registered and the packet has the expected shape.
    Matched(Callback),
    /// A callback is registered but the packet carries another element type.
    TypeMismatch { expected: ElementType },
    NotRegistered,
}

/// Callbacks that should receive one packet.
pub struct Targets {
    pub exact: ExactMatch,
    pub wildcard: Option<Callback>,
}

#[derive(Default)]
pub struct CallbackRegistry {
    by_id: HashMap<u16, Registration>,
    wildcard: Option<Callback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `data_id`, replacing any previous one.
    ///
    /// `expected_type` is the manifest's declared element type; packets of
    /// another type are not handed to this callback.  It is ignored for the
    /// wildcard ID.
    ///
    /// Returns `true` if a previous registration was replaced.
    pub fn set(
        &mut self,
        data_id: u16,
        callback: Callback,
        expected_type: Option<ElementType>,
    ) -> bool {
        if data_id == system::ANY {
            return self.wildcard.replace(callback).is_some();
        }
        self.by_id
            .insert(
                data_id,
                Registration {
                    callback,
                    expected_type,
                },
            )
            .is_some()
    }

    /// Removes the callback for `data_id`.  Returns `true` if one existed.
    pub fn clear(&mut self, data_id: u16) -> bool {
        if data_id == system::ANY {
            return self.wildcard.take().is_some();
        }
        self.by_id.remove(&data_id).is_some()
    }

    /// Number of registrations, counting the wildcard slot.
    pub fn len(&self) -> usize {
        self.by_id.len() + usize::from(self.wildcard.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the callbacks that should receive `packet`.
    pub fn route(&self, packet: &Packet) -> Targets {
        let exact = match self.by_id.get(&packet.data_id()) {
            None => ExactMatch::NotRegistered,
            Some(Registration {
                expected_type: Some(expected),
                ..
            }) if *expected != packet.element_type() => ExactMatch::TypeMismatch {
                expected: *expected,
            },
            Some(reg) => ExactMatch::Matched(Arc::clone(&reg.callback)),
        };

        Targets {
            exact,
            wildcard: self.wildcard.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback(counter: &Arc<AtomicUsize>) -> Callback {
        let counter = Arc::clone(counter);
        Arc::new(move |_p: &Packet| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn packet(data_id: u16) -> Packet {
        Packet::new(data_id, ElementType::UInt8, &[1u8]).unwrap()
    }

    #[test]
    fn test_route_finds_exact_and_wildcard() {
        // Arrange
        let mut registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.set(2000, counting_callback(&hits), None);
        registry.set(system::ANY, counting_callback(&hits), None);

        // Act
        let targets = registry.route(&packet(2000));

        // Assert
        assert!(matches!(targets.exact, ExactMatch::Matched(_)));
        assert!(targets.wildcard.is_some());
    }

    #[test]
    fn test_unregistered_id_has_no_exact_match() {
        let mut registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.set(2000, counting_callback(&hits), None);

        let targets = registry.route(&packet(2001));

        assert!(matches!(targets.exact, ExactMatch::NotRegistered));
        assert!(targets.wildcard.is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        // Arrange
        let mut registry = CallbackRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        // Act
        assert!(!registry.set(2000, counting_callback(&first), None));
        assert!(registry.set(2000, counting_callback(&second), None));
        if let ExactMatch::Matched(cb) = registry.route(&packet(2000)).exact {
            cb(&packet(2000));
        }

        // Assert
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let mut registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.set(2100, counting_callback(&hits), Some(ElementType::Float32));

        let targets = registry.route(&packet(2100));

        assert!(matches!(
            targets.exact,
            ExactMatch::TypeMismatch {
                expected: ElementType::Float32
            }
        ));
    }

    #[test]
    fn test_clear_removes_exact_and_wildcard() {
        let mut registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.set(2000, counting_callback(&hits), None);
        registry.set(system::ANY, counting_callback(&hits), None);

        assert!(registry.clear(2000));
        assert!(registry.clear(system::ANY));
        assert!(!registry.clear(2000));
        assert!(registry.is_empty());
    }
}
