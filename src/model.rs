//! Models, observers and the flat-graph port encoding.

use crate::arena::{ModelId, ObserverId};
use crate::dynamics::{Dynamics, DynamicsType};
use crate::heap::HeapHandle;
use crate::message::ObservationMessage;
use crate::types::Time;

/// One atomic model instance: its payload plus scheduling state.
pub struct Model {
    /// Time of the last transition.
    pub tl: Time,
    /// Time of the next scheduled transition.
    pub tn: Time,
    pub(crate) handle: Option<HeapHandle>,
    pub(crate) observer: ObserverId,
    pub dynamics: Dynamics,
}

impl Model {
    pub(crate) fn new(dynamics: Dynamics) -> Self {
        Self {
            tl: 0.0,
            tn: Time::INFINITY,
            handle: None,
            observer: ObserverId::default(),
            dynamics,
        }
    }

    pub fn kind(&self) -> DynamicsType {
        self.dynamics.kind()
    }
}

/// Phase reported to an observer callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverStatus {
    Initialize,
    Run,
    Finalize,
}

/// Everything a callback may read about one observation.
pub struct ObserverEvent<'a> {
    pub name: &'a str,
    pub model: ModelId,
    pub msg: &'a ObservationMessage,
    pub kind: DynamicsType,
    pub tl: Time,
    pub t: Time,
    pub status: ObserverStatus,
}

/// Callback invoked at initialize, on each observed transition, and at
/// finalize. Observers may read freely but must not mutate the simulation.
pub type ObserverCallback = Box<dyn FnMut(ObserverEvent<'_>)>;

/// Watches one model through its observation samples.
pub struct Observer {
    pub(crate) cb: ObserverCallback,
    pub name: String,
    pub model: ModelId,
    pub msg: ObservationMessage,
}

impl Observer {
    pub fn new(name: impl Into<String>, cb: ObserverCallback) -> Self {
        Self {
            cb,
            name: name.into(),
            model: ModelId::default(),
            msg: ObservationMessage::default(),
        }
    }
}

/// Maximum ports representable in a flat-graph port id.
pub const GRAPH_PORT_LIMIT: usize = 8;

/// Encodes an endpoint as a flat integer for graph clients:
/// `(input ? 0 : 8 + port) << 28 | slot_index`, `port < 8`,
/// `slot_index < 2^28`.
pub fn graph_port_id(input: bool, port: usize, slot_index: u32) -> u32 {
    debug_assert!(port < GRAPH_PORT_LIMIT);
    debug_assert!(slot_index < (1 << 28));

    let base = if input { 0 } else { GRAPH_PORT_LIMIT };
    ((base + port) as u32) << 28 | slot_index
}

/// Splits a flat endpoint id back into `(is_input, port, slot_index)`.
pub fn split_graph_port_id(id: u32) -> (bool, usize, u32) {
    let tag = (id >> 28) as usize;
    let slot = id & ((1 << 28) - 1);

    if tag < GRAPH_PORT_LIMIT {
        (true, tag, slot)
    } else {
        (false, tag - GRAPH_PORT_LIMIT, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_defaults() {
        let model = Model::new(Dynamics::new(DynamicsType::Counter));
        assert_eq!(model.tl, 0.0);
        assert!(model.tn.is_infinite());
        assert!(model.handle.is_none());
        assert_eq!(model.kind(), DynamicsType::Counter);
    }

    #[test]
    fn test_graph_port_id_roundtrip() {
        for &(input, port, slot) in &[(true, 0, 0u32), (true, 7, 123), (false, 0, 1), (false, 7, (1 << 28) - 1)] {
            let id = graph_port_id(input, port, slot);
            assert_eq!(split_graph_port_id(id), (input, port, slot));
        }
    }

    #[test]
    fn test_graph_port_id_distinguishes_direction() {
        let input = graph_port_id(true, 2, 5);
        let output = graph_port_id(false, 2, 5);
        assert_ne!(input, output);
    }

    #[test]
    fn test_observer_records_callback_calls() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut observer = Observer::new(
            "watch",
            Box::new(move |event| sink.borrow_mut().push(event.status)),
        );

        (observer.cb)(ObserverEvent {
            name: &observer.name,
            model: observer.model,
            msg: &observer.msg,
            kind: DynamicsType::Counter,
            tl: 0.0,
            t: 1.0,
            status: ObserverStatus::Run,
        });

        assert_eq!(*seen.borrow(), vec![ObserverStatus::Run]);
    }
}
