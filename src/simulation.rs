//! The simulation container and its transition loop.
//!
//! A [`Simulation`] owns every arena (models, observers, the four list
//! allocators), the pairing-heap scheduler and the per-step scratch
//! buffers. One [`Simulation::run`] call executes one step: pop every
//! model sharing the earliest `tn`, run their transitions, then deliver
//! the messages their `lambda`s emitted. All transitions of a step run
//! before any delivery, and a message emitted at `t` is seen by its
//! destination no earlier than the next pop of that destination.

use crate::arena::{DataArray, Id, ModelId, ObserverId};
use crate::dynamics::{is_ports_compatible, Dynamics, DynamicsType};
use crate::error::{Error, SimResult};
use crate::list::{BlockAllocator, ListView, ListViewConst, EMPTY_LIST, NIL};
use crate::message::{DatedMessage, Message, NodeConn, OutputMessage, Record};
use crate::model::{Model, Observer, ObserverCallback, ObserverEvent, ObserverStatus};
use crate::heap::Scheduler;
use crate::source::{Source, SourceDispatch, SourceOp};
use crate::types::{OutputPort, Real, Time};

/// Extra headroom multiplier for the connection and record arenas.
const PER_MODEL_NODES: usize = 10;

pub struct Simulation {
    pub(crate) messages: BlockAllocator<Message>,
    pub(crate) nodes: BlockAllocator<NodeConn>,
    pub(crate) records: BlockAllocator<Record>,
    pub(crate) dated_messages: BlockAllocator<DatedMessage>,
    pub(crate) emitted_outputs: Vec<OutputMessage>,
    immediate_models: Vec<ModelId>,
    models: DataArray<Model, ModelId>,
    observers: DataArray<Observer, ObserverId>,
    sched: Scheduler,
    source_dispatch: Option<SourceDispatch>,
}

impl Simulation {
    /// Sizes every arena for `model_capacity` models exchanging up to
    /// `message_capacity` in-flight messages.
    pub fn new(model_capacity: usize, message_capacity: usize) -> SimResult<Self> {
        Ok(Self {
            messages: BlockAllocator::with_capacity(message_capacity)?,
            nodes: BlockAllocator::with_capacity(model_capacity * PER_MODEL_NODES)?,
            records: BlockAllocator::with_capacity(model_capacity * PER_MODEL_NODES)?,
            dated_messages: BlockAllocator::with_capacity(model_capacity)?,
            emitted_outputs: Vec::with_capacity(model_capacity),
            immediate_models: Vec::with_capacity(model_capacity),
            models: DataArray::with_capacity(model_capacity)?,
            observers: DataArray::with_capacity(model_capacity)?,
            sched: Scheduler::with_capacity(model_capacity)?,
            source_dispatch: None,
        })
    }

    // -- construction ----------------------------------------------------

    pub fn can_alloc(&self, count: usize) -> bool {
        self.models.can_alloc(count)
    }

    /// Allocates a model of `kind` with default parameters.
    pub fn alloc(&mut self, kind: DynamicsType) -> SimResult<ModelId> {
        self.alloc_dynamics(Dynamics::new(kind))
    }

    /// Allocates a model from an already-parameterized payload.
    pub fn alloc_dynamics(&mut self, dynamics: Dynamics) -> SimResult<ModelId> {
        match self.models.try_alloc(Model::new(dynamics)) {
            Some((id, _)) => Ok(id),
            None => Err(Error::ArenaOutOfCapacity),
        }
    }

    /// Duplicates a model's parameters and state into a fresh model with
    /// empty ports and detached archives/queues.
    pub fn clone_model(&mut self, id: ModelId) -> SimResult<ModelId> {
        let mut dynamics = self
            .models
            .try_to_get(id)
            .ok_or(Error::UnknownDynamics)?
            .dynamics
            .clone();

        for port in dynamics.input_ports_mut() {
            *port = EMPTY_LIST;
        }
        for port in dynamics.output_ports_mut() {
            *port = EMPTY_LIST;
        }

        match &mut dynamics {
            Dynamics::Integrator(d) => d.archive = EMPTY_LIST,
            Dynamics::Quantifier(d) => {
                d.archive = EMPTY_LIST;
                d.archive_length = 0;
            }
            Dynamics::Queue(d) => d.fifo = EMPTY_LIST,
            Dynamics::DynamicQueue(d) => d.fifo = EMPTY_LIST,
            Dynamics::PriorityQueue(d) => d.fifo = EMPTY_LIST,
            _ => {}
        }

        self.alloc_dynamics(dynamics)
    }

    /// Frees a model: detaches its observer, drains its port lists and
    /// removes its scheduler node.
    pub fn deallocate(&mut self, id: ModelId) -> SimResult<()> {
        let obs_id = self
            .models
            .try_to_get(id)
            .ok_or(Error::UnknownDynamics)?
            .observer;

        if let Some(obs) = self.observers.try_to_get_mut(obs_id) {
            obs.model = ModelId::default();
        }
        self.observers.free(obs_id);

        let mut model = match self.models.free(id) {
            Some(model) => model,
            None => return Err(Error::UnknownDynamics),
        };

        for port in model.dynamics.output_ports_mut() {
            ListView::new(&mut self.nodes, port).clear();
        }
        for port in model.dynamics.input_ports_mut() {
            ListView::new(&mut self.messages, port).clear();
        }

        if let Some(handle) = model.handle {
            self.sched.erase(handle);
        }

        Ok(())
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.try_to_get(id)
    }

    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut Model> {
        self.models.try_to_get_mut(id)
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn model_ids(&self) -> Vec<ModelId> {
        self.models.ids()
    }

    /// Every live connection as `(src, out_port, dst, in_port)`.
    pub fn connections(&self) -> Vec<(ModelId, usize, ModelId, usize)> {
        let mut out = Vec::new();

        for (id, model) in self.models.iter() {
            for (port_index, port) in model.dynamics.output_ports().iter().enumerate() {
                for conn in ListViewConst::new(&self.nodes, *port).iter() {
                    out.push((id, port_index, conn.model, conn.port as usize));
                }
            }
        }

        out
    }

    // -- wiring ----------------------------------------------------------

    pub fn can_connect(&self, count: usize) -> bool {
        self.nodes.can_alloc(count)
    }

    /// Connects `src`'s output port to `dst`'s input port. A connection
    /// exists at most once per `(src, out) -> (dst, in)` tuple.
    pub fn connect(
        &mut self,
        src: ModelId,
        port_src: usize,
        dst: ModelId,
        port_dst: usize,
    ) -> SimResult<()> {
        let (src_kind, dst_kind, dst_inputs) = {
            let src_model = self.models.try_to_get(src).ok_or(Error::UnknownDynamics)?;
            let dst_model = self.models.try_to_get(dst).ok_or(Error::UnknownDynamics)?;
            (
                src_model.kind(),
                dst_model.kind(),
                dst_model.dynamics.input_ports().len(),
            )
        };

        if port_dst >= dst_inputs {
            return Err(Error::ConnectUnknownInputPort);
        }

        if !is_ports_compatible(src_kind, src, port_src, dst_kind, dst, port_dst) {
            return Err(Error::ConnectIncompatibleDynamics);
        }

        let Self { models, nodes, .. } = self;
        let src_model = models.try_to_get_mut(src).ok_or(Error::UnknownDynamics)?;
        let ports = src_model.dynamics.output_ports_mut();

        if port_src >= ports.len() {
            return Err(Error::ConnectUnknownOutputPort);
        }

        for conn in ListViewConst::new(nodes, ports[port_src]).iter() {
            if conn.model == dst && conn.port as usize == port_dst {
                return Err(Error::ConnectAlreadyExists);
            }
        }

        if !nodes.can_alloc(1) {
            return Err(Error::NotEnoughNode);
        }

        ListView::new(nodes, &mut ports[port_src]).push_back(NodeConn::new(dst, port_dst as u8));
        Ok(())
    }

    /// Removes the connection if it exists.
    pub fn disconnect(
        &mut self,
        src: ModelId,
        port_src: usize,
        dst: ModelId,
        port_dst: usize,
    ) -> SimResult<()> {
        let Self { models, nodes, .. } = self;
        let src_model = models.try_to_get_mut(src).ok_or(Error::UnknownDynamics)?;
        let ports = src_model.dynamics.output_ports_mut();

        if port_src >= ports.len() {
            return Err(Error::ConnectUnknownOutputPort);
        }

        let mut list = ListView::new(nodes, &mut ports[port_src]);
        let mut index = list.head();
        while index != NIL {
            let conn = *list.value(index);
            if conn.model == dst && conn.port as usize == port_dst {
                list.erase(index);
                return Ok(());
            }
            index = list.next(index);
        }

        Ok(())
    }

    // -- observers -------------------------------------------------------

    pub fn alloc_observer(
        &mut self,
        name: impl Into<String>,
        cb: ObserverCallback,
    ) -> SimResult<ObserverId> {
        match self.observers.try_alloc(Observer::new(name, cb)) {
            Some((id, _)) => Ok(id),
            None => Err(Error::ArenaOutOfCapacity),
        }
    }

    pub fn observer(&self, id: ObserverId) -> Option<&Observer> {
        self.observers.try_to_get(id)
    }

    /// The observer attached to `id`, if any.
    pub fn observer_of(&self, id: ModelId) -> Option<&Observer> {
        let model = self.models.try_to_get(id)?;
        self.observers.try_to_get(model.observer)
    }

    /// Attaches an observer to a model; both sides record the pairing.
    pub fn observe(&mut self, model: ModelId, observer: ObserverId) -> SimResult<()> {
        if self.models.try_to_get(model).is_none() {
            return Err(Error::UnknownDynamics);
        }

        let obs = self
            .observers
            .try_to_get_mut(observer)
            .ok_or(Error::UnknownDynamics)?;
        obs.model = model;

        if let Some(mdl) = self.models.try_to_get_mut(model) {
            mdl.observer = observer;
        }

        Ok(())
    }

    // -- external sources ------------------------------------------------

    pub fn set_source_dispatch(&mut self, dispatch: SourceDispatch) {
        self.source_dispatch = Some(dispatch);
    }

    /// Convenience: installs a registry as the source dispatch.
    pub fn attach_sources(&mut self, sources: crate::source::ExternalSources) {
        self.source_dispatch = Some(sources.into_dispatch());
    }

    pub(crate) fn initialize_source(&mut self, src: &mut Source) -> SimResult<()> {
        if !src.is_bound() {
            return Ok(());
        }

        match self.source_dispatch.as_mut() {
            Some(dispatch) => dispatch(src, SourceOp::Initialize),
            None => Err(Error::SourceUnknown),
        }
    }

    pub(crate) fn update_source(&mut self, src: &mut Source, value: &mut f64) -> SimResult<()> {
        if src.next(value) {
            return Ok(());
        }

        let dispatch = self
            .source_dispatch
            .as_mut()
            .ok_or(Error::SourceUnknown)?;

        if !src.is_bound() {
            return Err(Error::SourceUnknown);
        }

        dispatch(src, SourceOp::Update)?;

        if src.next(value) {
            Ok(())
        } else {
            Err(Error::SourceEmpty)
        }
    }

    pub(crate) fn finalize_source(&mut self, src: &mut Source) -> SimResult<()> {
        if !src.is_bound() {
            return Ok(());
        }

        match self.source_dispatch.as_mut() {
            Some(dispatch) => dispatch(src, SourceOp::Finalize),
            None => Err(Error::SourceUnknown),
        }
    }

    // -- the loop --------------------------------------------------------

    /// Runs every model's `initialize`, schedules it, then fires each
    /// observer once with [`ObserverStatus::Initialize`].
    pub fn initialize(&mut self, t: Time) -> SimResult<()> {
        self.clean();

        for id in self.models.ids() {
            self.make_initialize(id, t)?;
        }

        let Self { observers, models, .. } = self;
        for (_, obs) in observers.iter_mut() {
            if let Some(mdl) = models.try_to_get(obs.model) {
                obs.msg.reset();
                (obs.cb)(ObserverEvent {
                    name: &obs.name,
                    model: obs.model,
                    msg: &obs.msg,
                    kind: mdl.kind(),
                    tl: mdl.tl,
                    t,
                    status: ObserverStatus::Initialize,
                });
            }
        }

        Ok(())
    }

    /// Executes one step. On return `t` is the time the step ran at, or
    /// `+inf` when nothing remains scheduled.
    pub fn run(&mut self, t: &mut Time) -> SimResult<()> {
        if self.sched.is_empty() {
            *t = Time::INFINITY;
            return Ok(());
        }

        *t = self.sched.tn();
        if t.is_infinite() {
            return Ok(());
        }

        let mut immediates = std::mem::take(&mut self.immediate_models);
        self.sched.pop(&mut immediates);
        self.emitted_outputs.clear();

        tracing::trace!(time = *t, batch = immediates.len(), "step");

        let mut result = Ok(());
        for &id in &immediates {
            if self.models.try_to_get(id).is_none() {
                continue;
            }

            if let Err(err) = self.make_transition(id, *t) {
                result = Err(err);
                break;
            }
        }

        immediates.clear();
        self.immediate_models = immediates;
        result?;

        let outputs = std::mem::take(&mut self.emitted_outputs);
        let mut delivery = Ok(());

        {
            let Self {
                models,
                sched,
                messages,
                ..
            } = self;

            for om in &outputs {
                let Some(mdl) = models.try_to_get_mut(om.model) else {
                    continue;
                };

                if let Some(handle) = mdl.handle {
                    sched.update(handle, *t, mdl.tn);
                }

                if !messages.can_alloc(1) {
                    delivery = Err(Error::NotEnoughMessage);
                    break;
                }

                let ports = mdl.dynamics.input_ports_mut();
                if (om.port as usize) < ports.len() {
                    ListView::new(messages, &mut ports[om.port as usize]).push_back(om.msg);
                }
            }
        }

        let mut outputs = outputs;
        outputs.clear();
        self.emitted_outputs = outputs;

        delivery
    }

    /// Fires each observer once with [`ObserverStatus::Finalize`], then
    /// runs every model's `finalize`. Safe to call after an errored step.
    pub fn finalize(&mut self, t: Time) -> SimResult<()> {
        for id in self.models.ids() {
            let (mut dynamics, tl, obs_id) = {
                let mdl = match self.models.try_to_get_mut(id) {
                    Some(mdl) => mdl,
                    None => continue,
                };
                (std::mem::take(&mut mdl.dynamics), mdl.tl, mdl.observer)
            };

            if obs_id.is_defined() {
                if let Some(msg) = dynamics.observation(t - tl) {
                    if let Some(obs) = self.observers.try_to_get_mut(obs_id) {
                        obs.msg = msg;
                        (obs.cb)(ObserverEvent {
                            name: &obs.name,
                            model: obs.model,
                            msg: &obs.msg,
                            kind: dynamics.kind(),
                            tl,
                            t,
                            status: ObserverStatus::Finalize,
                        });
                    }
                }
            }

            let result = dynamics.finalize(self);

            if let Some(mdl) = self.models.try_to_get_mut(id) {
                mdl.dynamics = dynamics;
            }

            result?;
        }

        Ok(())
    }

    /// Resets the scheduler and the per-run arenas while keeping models,
    /// observers and connections.
    pub fn clean(&mut self) {
        self.sched.clear();
        self.messages.reset();
        self.records.reset();
        self.dated_messages.reset();
        self.emitted_outputs.clear();
        self.immediate_models.clear();
    }

    /// Drops everything: models, observers and connections included.
    pub fn clear(&mut self) {
        self.clean();
        self.nodes.reset();
        self.models.clear();
        self.observers.clear();
    }

    /// Arena-usage snapshot.
    pub fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "models": self.models.len(),
            "observers": self.observers.len(),
            "scheduled": self.sched.len(),
            "messages_in_use": self.messages.len(),
            "nodes_in_use": self.nodes.len(),
            "records_in_use": self.records.len(),
            "dated_messages_in_use": self.dated_messages.len(),
        })
    }

    fn make_initialize(&mut self, id: ModelId, t: Time) -> SimResult<()> {
        let mut dynamics = {
            let mdl = self.models.try_to_get_mut(id).ok_or(Error::UnknownDynamics)?;
            mdl.handle = None;
            std::mem::take(&mut mdl.dynamics)
        };

        for port in dynamics.input_ports_mut() {
            *port = EMPTY_LIST;
        }

        let result = dynamics.initialize(self);
        let sigma = dynamics.sigma();

        let mdl = self.models.try_to_get_mut(id).ok_or(Error::UnknownDynamics)?;
        mdl.dynamics = dynamics;
        result?;

        mdl.tl = t;
        mdl.tn = t + sigma;
        let tn = mdl.tn;

        let handle = self.sched.insert(id, tn);
        if let Some(mdl) = self.models.try_to_get_mut(id) {
            mdl.handle = Some(handle);
        }

        Ok(())
    }

    fn make_transition(&mut self, id: ModelId, t: Time) -> SimResult<()> {
        let (mut dynamics, tl, tn, handle, obs_id) = {
            let mdl = self.models.try_to_get_mut(id).ok_or(Error::UnknownDynamics)?;
            (
                std::mem::take(&mut mdl.dynamics),
                mdl.tl,
                mdl.tn,
                mdl.handle,
                mdl.observer,
            )
        };

        if obs_id.is_defined() {
            if let Some(msg) = dynamics.observation(t - tl) {
                match self.observers.try_to_get_mut(obs_id) {
                    Some(obs) => {
                        obs.msg = msg;
                        (obs.cb)(ObserverEvent {
                            name: &obs.name,
                            model: obs.model,
                            msg: &obs.msg,
                            kind: dynamics.kind(),
                            tl,
                            t,
                            status: ObserverStatus::Run,
                        });
                    }
                    None => {
                        if let Some(mdl) = self.models.try_to_get_mut(id) {
                            mdl.observer = ObserverId::default();
                        }
                    }
                }
            }
        }

        // An internal event is due exactly when the scheduler node still
        // carries the model's own tn; a delivery moved it to the current
        // time instead.
        let fire = match handle {
            Some(handle) => self.sched.tn_of(handle) == tn,
            None => false,
        };

        let mut result = Ok(());
        if fire {
            result = dynamics.lambda(self);
        }

        if result.is_ok() {
            result = dynamics.transition(self, t, t - tl, tn - t);
        }

        if result.is_ok() {
            for port in dynamics.input_ports_mut() {
                ListView::new(&mut self.messages, port).clear();
            }
        }

        let sigma = dynamics.sigma();

        let Self { models, sched, .. } = self;
        let mdl = models.try_to_get_mut(id).ok_or(Error::UnknownDynamics)?;
        mdl.dynamics = dynamics;
        result?;

        mdl.tl = t;
        mdl.tn = t + sigma;
        if sigma != 0.0 && mdl.tn == t {
            mdl.tn = t.next_up();
        }

        if let Some(handle) = mdl.handle {
            sched.reintegrate(handle, mdl.tn);
        }

        Ok(())
    }
}

/// Queues one message on every destination connected to `port`, pruning
/// connections whose destination no longer resolves.
pub(crate) fn send_message(
    sim: &mut Simulation,
    port: &mut OutputPort,
    r1: Real,
    r2: Real,
    r3: Real,
) -> SimResult<()> {
    let Simulation {
        nodes,
        models,
        emitted_outputs,
        ..
    } = sim;

    let mut list = ListView::new(nodes, port);
    let mut index = list.head();

    while index != NIL {
        let conn = *list.value(index);

        if models.try_to_get(conn.model).is_none() {
            index = list.erase(index);
            continue;
        }

        if emitted_outputs.len() == emitted_outputs.capacity() {
            return Err(Error::NotEnoughMessage);
        }

        emitted_outputs.push(OutputMessage {
            msg: Message::new(r1, r2, r3),
            model: conn.model,
            port: conn.port,
        });

        index = list.next(index);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::misc::Constant;

    #[test]
    fn test_alloc_and_lookup() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let id = sim.alloc(DynamicsType::Counter).unwrap();

        assert_eq!(sim.model(id).unwrap().kind(), DynamicsType::Counter);
        assert_eq!(sim.model_count(), 1);
    }

    #[test]
    fn test_alloc_until_full() {
        let mut sim = Simulation::new(2, 8).unwrap();
        sim.alloc(DynamicsType::Counter).unwrap();
        sim.alloc(DynamicsType::Counter).unwrap();
        assert!(!sim.can_alloc(1));
        assert_eq!(
            sim.alloc(DynamicsType::Counter),
            Err(Error::ArenaOutOfCapacity)
        );
    }

    #[test]
    fn test_connect_and_duplicate() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let src = sim.alloc(DynamicsType::Constant).unwrap();
        let dst = sim.alloc(DynamicsType::Counter).unwrap();

        sim.connect(src, 0, dst, 0).unwrap();
        assert_eq!(
            sim.connect(src, 0, dst, 0),
            Err(Error::ConnectAlreadyExists)
        );
    }

    #[test]
    fn test_connect_port_bounds() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let src = sim.alloc(DynamicsType::Constant).unwrap();
        let dst = sim.alloc(DynamicsType::Counter).unwrap();

        assert_eq!(
            sim.connect(src, 3, dst, 0),
            Err(Error::ConnectUnknownOutputPort)
        );
        assert_eq!(
            sim.connect(src, 0, dst, 5),
            Err(Error::ConnectUnknownInputPort)
        );
    }

    #[test]
    fn test_connect_disconnect_restores_node_usage() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let src = sim.alloc(DynamicsType::Constant).unwrap();
        let dst = sim.alloc(DynamicsType::Counter).unwrap();

        let before = sim.stats()["nodes_in_use"].as_u64().unwrap();
        sim.connect(src, 0, dst, 0).unwrap();
        sim.disconnect(src, 0, dst, 0).unwrap();
        let after = sim.stats()["nodes_in_use"].as_u64().unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_deallocate_prunes_and_frees() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let src = sim.alloc(DynamicsType::Constant).unwrap();
        let dst = sim.alloc(DynamicsType::Counter).unwrap();
        sim.connect(src, 0, dst, 0).unwrap();

        sim.deallocate(src).unwrap();
        assert!(sim.model(src).is_none());
        assert_eq!(sim.model_count(), 1);
        assert_eq!(sim.stats()["nodes_in_use"], 0);
    }

    #[test]
    fn test_deallocate_stale_id() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let id = sim.alloc(DynamicsType::Counter).unwrap();
        sim.deallocate(id).unwrap();
        assert_eq!(sim.deallocate(id), Err(Error::UnknownDynamics));
    }

    #[test]
    fn test_run_on_empty_simulation() {
        let mut sim = Simulation::new(4, 16).unwrap();
        sim.initialize(0.0).unwrap();

        let mut t = 0.0;
        sim.run(&mut t).unwrap();
        assert!(t.is_infinite());
    }

    #[test]
    fn test_constant_delivers_to_counter() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let src = sim
            .alloc_dynamics(Dynamics::Constant(Constant::with(7.0, 0.0)))
            .unwrap();
        let dst = sim.alloc(DynamicsType::Counter).unwrap();
        sim.connect(src, 0, dst, 0).unwrap();

        sim.initialize(0.0).unwrap();

        let mut t = 0.0;
        // Constant fires at 0, message delivered; counter pops next.
        sim.run(&mut t).unwrap();
        assert_eq!(t, 0.0);
        sim.run(&mut t).unwrap();
        assert_eq!(t, 0.0);

        match &sim.model(dst).unwrap().dynamics {
            Dynamics::Counter(counter) => assert_eq!(counter.number, 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_clone_model_resets_wiring() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let src = sim
            .alloc_dynamics(Dynamics::Constant(Constant::with(3.5, 1.0)))
            .unwrap();
        let dst = sim.alloc(DynamicsType::Counter).unwrap();
        sim.connect(src, 0, dst, 0).unwrap();

        let copy = sim.clone_model(src).unwrap();
        let model = sim.model(copy).unwrap();
        match &model.dynamics {
            Dynamics::Constant(constant) => {
                assert_eq!(constant.default_value, 3.5);
                assert_eq!(constant.default_offset, 1.0);
            }
            _ => unreachable!(),
        }
        assert!(model.dynamics.output_ports().iter().all(|&p| p == EMPTY_LIST));
    }

    #[test]
    fn test_tn_never_equals_t_after_step() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let id = sim
            .alloc_dynamics(Dynamics::TimeFunc(crate::dynamics::misc::TimeFunc::with(
                crate::dynamics::misc::TimeFunction::Time,
                0.25,
            )))
            .unwrap();
        sim.initialize(0.0).unwrap();

        let mut t = 0.0;
        for _ in 0..8 {
            sim.run(&mut t).unwrap();
            let model = sim.model(id).unwrap();
            assert_eq!(model.tl, t);
            assert!(model.tn > t);
        }
    }

    #[test]
    fn test_observer_detached_when_freed() {
        let mut sim = Simulation::new(8, 32).unwrap();
        let id = sim
            .alloc_dynamics(Dynamics::Constant(Constant::with(1.0, 0.0)))
            .unwrap();
        let obs = sim.alloc_observer("probe", Box::new(|_| {})).unwrap();
        sim.observe(id, obs).unwrap();

        assert_eq!(sim.observer(obs).unwrap().model, id);
        sim.deallocate(id).unwrap();
        assert!(sim.observer(obs).is_none());
    }
}
