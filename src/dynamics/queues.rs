//! Delay queues over the dated-message arena.
//!
//! All three kinds append arriving messages to an internally held list
//! keyed on due time. Each transition first drops entries due at or before
//! the current time, then enqueues arrivals, then sets `sigma` to the head
//! due time minus now, clamped at zero. `lambda` drains exactly the batch
//! sharing the head due time.

use crate::dynamics::ModelDynamics;
use crate::error::{Error, SimResult};
use crate::list::{ListView, ListViewConst, EMPTY_LIST, NIL};
use crate::message::{DatedMessage, Message};
use crate::simulation::{send_message, Simulation};
use crate::source::Source;
use crate::types::{InputPort, OutputPort, Real, Time};

fn drop_due(sim: &mut Simulation, fifo: &mut u64, t: Time) {
    let mut list = ListView::new(&mut sim.dated_messages, fifo);
    while let Some(front) = list.front() {
        if front.due() <= t {
            list.pop_front();
        } else {
            break;
        }
    }
}

fn head_sigma(sim: &Simulation, fifo: u64, t: Time) -> Time {
    match ListViewConst::new(&sim.dated_messages, fifo).front() {
        Some(front) => {
            let sigma = front.due() - t;
            if sigma <= 0.0 {
                0.0
            } else {
                sigma
            }
        }
        None => Time::INFINITY,
    }
}

fn emit_head_batch(
    sim: &mut Simulation,
    fifo: u64,
    y: &mut OutputPort,
) -> SimResult<()> {
    if fifo == EMPTY_LIST {
        return Ok(());
    }

    let batch: Vec<Message> = {
        let list = ListViewConst::new(&sim.dated_messages, fifo);
        let head_due = match list.front() {
            Some(front) => front.due(),
            None => return Ok(()),
        };

        list.iter()
            .take_while(|dm| dm.due() <= head_due)
            .map(|dm| dm.message())
            .collect()
    };

    for msg in batch {
        send_message(sim, y, msg[0], msg[1], msg[2])?;
    }

    Ok(())
}

fn pending_arrivals(sim: &Simulation, port: InputPort) -> Vec<Message> {
    ListViewConst::new(&sim.messages, port).iter().copied().collect()
}

/// FIFO queue with a fixed delay.
#[derive(Clone, Debug)]
pub struct Queue {
    pub x: [InputPort; 1],
    pub y: [OutputPort; 1],
    pub fifo: u64,
    pub default_ta: Real,
    pub sigma: Time,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 1],
            y: [EMPTY_LIST; 1],
            fifo: EMPTY_LIST,
            default_ta: 1.0,
            sigma: 0.0,
        }
    }
}

impl Queue {
    pub fn with(ta: Real) -> Self {
        Self {
            default_ta: ta,
            ..Self::default()
        }
    }
}

impl ModelDynamics for Queue {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        if self.default_ta <= 0.0 {
            return Err(Error::QueueBadTa);
        }

        self.sigma = Time::INFINITY;
        self.fifo = EMPTY_LIST;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        emit_head_batch(sim, self.fifo, &mut self.y[0])
    }

    fn transition(&mut self, sim: &mut Simulation, t: Time, _e: Time, _r: Time) -> SimResult<()> {
        drop_due(sim, &mut self.fifo, t);

        for msg in pending_arrivals(sim, self.x[0]) {
            if !sim.dated_messages.can_alloc(1) {
                return Err(Error::QueueFull);
            }

            ListView::new(&mut sim.dated_messages, &mut self.fifo)
                .push_back(DatedMessage::new(t + self.default_ta, msg));
        }

        self.sigma = head_sigma(sim, self.fifo, t);
        Ok(())
    }

    fn finalize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        ListView::new(&mut sim.dated_messages, &mut self.fifo).clear();
        Ok(())
    }

    fn sigma(&self) -> Time {
        self.sigma
    }

    fn input_ports(&self) -> &[InputPort] {
        &self.x
    }

    fn input_ports_mut(&mut self) -> &mut [InputPort] {
        &mut self.x
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.y
    }

    fn output_ports_mut(&mut self) -> &mut [OutputPort] {
        &mut self.y
    }
}

/// FIFO queue whose delay is drawn from an external source per arrival.
#[derive(Clone, Debug, Default)]
pub struct DynamicQueue {
    pub x: [InputPort; 1],
    pub y: [OutputPort; 1],
    pub fifo: u64,
    pub source_ta: Source,
    pub stop_on_error: bool,
    pub sigma: Time,
}

impl DynamicQueue {
    pub fn with(source_ta: Source, stop_on_error: bool) -> Self {
        Self {
            x: [EMPTY_LIST; 1],
            y: [EMPTY_LIST; 1],
            fifo: EMPTY_LIST,
            source_ta,
            stop_on_error,
            sigma: 0.0,
        }
    }
}

impl ModelDynamics for DynamicQueue {
    fn initialize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        self.sigma = Time::INFINITY;
        self.fifo = EMPTY_LIST;

        if self.stop_on_error {
            if !self.source_ta.is_bound() {
                return Err(Error::DynamicQueueSourceNull);
            }
            sim.initialize_source(&mut self.source_ta)?;
        } else {
            let _ = sim.initialize_source(&mut self.source_ta);
        }

        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        emit_head_batch(sim, self.fifo, &mut self.y[0])
    }

    fn transition(&mut self, sim: &mut Simulation, t: Time, _e: Time, _r: Time) -> SimResult<()> {
        drop_due(sim, &mut self.fifo, t);

        for msg in pending_arrivals(sim, self.x[0]) {
            if !sim.dated_messages.can_alloc(1) {
                return Err(Error::DynamicQueueFull);
            }

            let mut ta = 0.0;
            if self.stop_on_error {
                sim.update_source(&mut self.source_ta, &mut ta)?;
                ListView::new(&mut sim.dated_messages, &mut self.fifo)
                    .push_back(DatedMessage::new(t + ta as Real, msg));
            } else if sim.update_source(&mut self.source_ta, &mut ta).is_ok() {
                ListView::new(&mut sim.dated_messages, &mut self.fifo)
                    .push_back(DatedMessage::new(t + ta as Real, msg));
            }
        }

        self.sigma = head_sigma(sim, self.fifo, t);
        Ok(())
    }

    fn finalize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        ListView::new(&mut sim.dated_messages, &mut self.fifo).clear();
        sim.finalize_source(&mut self.source_ta)?;
        Ok(())
    }

    fn sigma(&self) -> Time {
        self.sigma
    }

    fn input_ports(&self) -> &[InputPort] {
        &self.x
    }

    fn input_ports_mut(&mut self) -> &mut [InputPort] {
        &mut self.x
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.y
    }

    fn output_ports_mut(&mut self) -> &mut [OutputPort] {
        &mut self.y
    }
}

/// Queue ordered by due time; the delay source decides each arrival's
/// position.
#[derive(Clone, Debug, Default)]
pub struct PriorityQueue {
    pub x: [InputPort; 1],
    pub y: [OutputPort; 1],
    pub fifo: u64,
    pub default_ta: Real,
    pub source_ta: Source,
    pub stop_on_error: bool,
    pub sigma: Time,
}

impl PriorityQueue {
    pub fn with(source_ta: Source, stop_on_error: bool) -> Self {
        Self {
            x: [EMPTY_LIST; 1],
            y: [EMPTY_LIST; 1],
            fifo: EMPTY_LIST,
            default_ta: 1.0,
            source_ta,
            stop_on_error,
            sigma: 0.0,
        }
    }

    fn insert_sorted(&mut self, sim: &mut Simulation, due: Time, msg: Message) -> SimResult<()> {
        if !sim.dated_messages.can_alloc(1) {
            return Err(Error::PriorityQueueFull);
        }

        let mut list = ListView::new(&mut sim.dated_messages, &mut self.fifo);

        let mut pos = list.head();
        while pos != NIL && list.value(pos).due() <= due {
            pos = list.next(pos);
        }

        list.insert_before(pos, DatedMessage::new(due, msg));
        Ok(())
    }
}

impl ModelDynamics for PriorityQueue {
    fn initialize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        if self.stop_on_error {
            if !self.source_ta.is_bound() {
                return Err(Error::PriorityQueueSourceNull);
            }
            sim.initialize_source(&mut self.source_ta)?;
        } else {
            let _ = sim.initialize_source(&mut self.source_ta);
        }

        self.sigma = Time::INFINITY;
        self.fifo = EMPTY_LIST;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        emit_head_batch(sim, self.fifo, &mut self.y[0])
    }

    fn transition(&mut self, sim: &mut Simulation, t: Time, _e: Time, _r: Time) -> SimResult<()> {
        drop_due(sim, &mut self.fifo, t);

        for msg in pending_arrivals(sim, self.x[0]) {
            let mut ta = 0.0;
            if self.stop_on_error {
                sim.update_source(&mut self.source_ta, &mut ta)?;
                self.insert_sorted(sim, t + ta as Real, msg)?;
            } else if sim.update_source(&mut self.source_ta, &mut ta).is_ok() {
                self.insert_sorted(sim, t + ta as Real, msg)?;
            }
        }

        self.sigma = head_sigma(sim, self.fifo, t);
        Ok(())
    }

    fn finalize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        ListView::new(&mut sim.dated_messages, &mut self.fifo).clear();
        sim.finalize_source(&mut self.source_ta)?;
        Ok(())
    }

    fn sigma(&self) -> Time {
        self.sigma
    }

    fn input_ports(&self) -> &[InputPort] {
        &self.x
    }

    fn input_ports_mut(&mut self) -> &mut [InputPort] {
        &mut self.x
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.y
    }

    fn output_ports_mut(&mut self) -> &mut [OutputPort] {
        &mut self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_rejects_non_positive_delay() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut queue = Queue::with(0.0);
        assert_eq!(queue.initialize(&mut sim), Err(Error::QueueBadTa));
    }

    #[test]
    fn test_queue_schedules_head() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut queue = Queue::with(5.0);
        queue.initialize(&mut sim).unwrap();

        ListView::new(&mut sim.dated_messages, &mut queue.fifo)
            .push_back(DatedMessage::new(7.0, Message::new(1.0, 0.0, 0.0)));

        queue.transition(&mut sim, 2.0, 0.0, 0.0).unwrap();
        assert_eq!(queue.sigma, 5.0);
    }

    #[test]
    fn test_queue_drops_due_entries() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut queue = Queue::with(1.0);
        queue.initialize(&mut sim).unwrap();

        {
            let mut list = ListView::new(&mut sim.dated_messages, &mut queue.fifo);
            list.push_back(DatedMessage::new(1.0, Message::new(1.0, 0.0, 0.0)));
            list.push_back(DatedMessage::new(3.0, Message::new(2.0, 0.0, 0.0)));
        }

        queue.transition(&mut sim, 1.0, 0.0, 0.0).unwrap();

        let list = ListViewConst::new(&sim.dated_messages, queue.fifo);
        assert_eq!(list.iter().count(), 1);
        assert_eq!(queue.sigma, 2.0);
    }

    #[test]
    fn test_priority_queue_sorted_insert() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut pq = PriorityQueue::default();
        pq.fifo = EMPTY_LIST;

        pq.insert_sorted(&mut sim, 3.0, Message::new(3.0, 0.0, 0.0))
            .unwrap();
        pq.insert_sorted(&mut sim, 1.0, Message::new(1.0, 0.0, 0.0))
            .unwrap();
        pq.insert_sorted(&mut sim, 2.0, Message::new(2.0, 0.0, 0.0))
            .unwrap();

        let dues: Vec<Time> = ListViewConst::new(&sim.dated_messages, pq.fifo)
            .iter()
            .map(|dm| dm.due())
            .collect();
        assert_eq!(dues, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_dynamic_queue_requires_source_when_strict() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut dq = DynamicQueue::with(Source::default(), true);
        assert_eq!(dq.initialize(&mut sim), Err(Error::DynamicQueueSourceNull));
    }
}
