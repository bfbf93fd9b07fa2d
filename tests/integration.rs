//! End-to-end simulation scenarios.
//!
//! These tests assemble small model graphs through the public API and
//! verify the kernel's observable behavior: QSS integration accuracy,
//! queue timing, threshold detection, priority ordering under random
//! delays, and the observer lifecycle.

use std::cell::RefCell;
use std::rc::Rc;

use kairos::dynamics::misc::Constant;
use kairos::dynamics::qss_arith::{Qss1Multiplier, Qss1Wsum2};
use kairos::dynamics::qss_cross::Qss1Cross;
use kairos::dynamics::qss_integrator::Qss1Integrator;
use kairos::dynamics::queues::{PriorityQueue, Queue};
use kairos::source::{RandomDistribution, RandomSource, Source};
use kairos::{
    Dynamics, DynamicsType, ExternalSources, ModelId, ObserverStatus, Real, Simulation, Time,
};

fn integrator_value(sim: &Simulation, id: ModelId) -> Real {
    match &sim.model(id).unwrap().dynamics {
        Dynamics::Qss1Integrator(integ) => integ.value,
        _ => unreachable!(),
    }
}

fn counter_value(sim: &Simulation, id: ModelId) -> i64 {
    match &sim.model(id).unwrap().dynamics {
        Dynamics::Counter(counter) => counter.number,
        _ => unreachable!(),
    }
}

/// Lotka-Volterra with QSS1: dx/dt = 2x - 0.4xy, dy/dt = -y + 0.1xy.
///
/// Both populations must stay bounded and strictly positive, and the prey
/// population must oscillate around the equilibrium.
#[test]
fn test_lotka_volterra_qss1() {
    let mut sim = Simulation::new(16, 256).unwrap();

    let prey = sim
        .alloc_dynamics(Dynamics::Qss1Integrator(Qss1Integrator::with(18.0, 0.01)))
        .unwrap();
    let predator = sim
        .alloc_dynamics(Dynamics::Qss1Integrator(Qss1Integrator::with(7.0, 0.01)))
        .unwrap();
    let product = sim
        .alloc_dynamics(Dynamics::Qss1Multiplier(Qss1Multiplier::default()))
        .unwrap();
    let prey_rate = sim
        .alloc_dynamics(Dynamics::Qss1Wsum2(Qss1Wsum2::with([2.0, -0.4])))
        .unwrap();
    let predator_rate = sim
        .alloc_dynamics(Dynamics::Qss1Wsum2(Qss1Wsum2::with([-1.0, 0.1])))
        .unwrap();

    sim.connect(prey, 0, prey_rate, 0).unwrap();
    sim.connect(prey, 0, product, 0).unwrap();
    sim.connect(predator, 0, predator_rate, 0).unwrap();
    sim.connect(predator, 0, product, 1).unwrap();
    sim.connect(product, 0, prey_rate, 1).unwrap();
    sim.connect(product, 0, predator_rate, 1).unwrap();
    sim.connect(prey_rate, 0, prey, 0).unwrap();
    sim.connect(predator_rate, 0, predator, 0).unwrap();

    sim.initialize(0.0).unwrap();

    let mut t: Time = 0.0;
    let mut prey_min = Real::INFINITY;
    let mut prey_max = Real::NEG_INFINITY;

    while t < 15.0 {
        sim.run(&mut t).unwrap();
        if t.is_infinite() {
            break;
        }

        let x = integrator_value(&sim, prey);
        let y = integrator_value(&sim, predator);

        assert!(x > 0.0 && x < 100.0, "prey escaped at t={t}: {x}");
        assert!(y > 0.0 && y < 100.0, "predator escaped at t={t}: {y}");

        prey_min = prey_min.min(x);
        prey_max = prey_max.max(x);

        let model = sim.model(prey).unwrap();
        assert!(model.tn >= model.tl);
    }

    // The prey population starts above the equilibrium (x = 10) and must
    // swing below it and back: a closed orbit, not a fixed point.
    assert!(prey_min < 10.0, "prey never dipped: min {prey_min}");
    assert!(prey_max > 17.0, "prey never recovered: max {prey_max}");

    sim.finalize(t.min(15.0)).unwrap();
}

/// Constant derivative 1 into a QSS1 integrator: crossings form an
/// arithmetic progression with step dq, and the state tracks t.
#[test]
fn test_integrator_round_trip() {
    let mut sim = Simulation::new(8, 64).unwrap();

    let source = sim
        .alloc_dynamics(Dynamics::Constant(Constant::with(1.0, 0.0)))
        .unwrap();
    let integrator = sim
        .alloc_dynamics(Dynamics::Qss1Integrator(Qss1Integrator::with(0.0, 0.5)))
        .unwrap();
    let sink = sim.alloc(DynamicsType::Counter).unwrap();

    sim.connect(source, 0, integrator, 0).unwrap();
    sim.connect(integrator, 0, sink, 0).unwrap();

    let times = Rc::new(RefCell::new(Vec::<Time>::new()));
    let record = Rc::clone(&times);
    let observer = sim
        .alloc_observer(
            "state",
            Box::new(move |event| {
                if event.status == ObserverStatus::Run {
                    record.borrow_mut().push(event.t);
                }
            }),
        )
        .unwrap();
    sim.observe(integrator, observer).unwrap();

    sim.initialize(0.0).unwrap();

    let mut t: Time = 0.0;
    while t <= 10.0 {
        sim.run(&mut t).unwrap();
        if t.is_infinite() {
            break;
        }
    }

    let value = integrator_value(&sim, integrator);
    assert!(
        (value - 10.0).abs() <= 0.5,
        "state at t_end was {value}, expected 10 +/- dq"
    );

    // Crossing times advance by dq / |x_dot| = 0.5.
    let times = times.borrow();
    let crossings: Vec<Time> = times.iter().copied().filter(|&t| t > 0.0).collect();
    assert!(crossings.len() >= 19, "only {} crossings", crossings.len());
    for pair in crossings.windows(2) {
        assert!(
            (pair[1] - pair[0] - 0.5).abs() < 1e-6,
            "uneven crossing step between {} and {}",
            pair[0],
            pair[1]
        );
    }

    sim.finalize(10.0).unwrap();
}

/// Three bursts through a fixed-delay queue arrive in order, shifted by
/// the queue delay.
#[test]
fn test_queue_fifo_timing() {
    let mut sim = Simulation::new(16, 64).unwrap();

    let mut emitters = Vec::new();
    for k in 1..=3 {
        let id = sim
            .alloc_dynamics(Dynamics::Constant(Constant::with(k as Real, k as Time)))
            .unwrap();
        emitters.push(id);
    }

    let queue = sim
        .alloc_dynamics(Dynamics::Queue(Queue::with(5.0)))
        .unwrap();
    let counter = sim.alloc(DynamicsType::Counter).unwrap();

    for &emitter in &emitters {
        sim.connect(emitter, 0, queue, 0).unwrap();
    }
    sim.connect(queue, 0, counter, 0).unwrap();

    sim.initialize(0.0).unwrap();

    let mut t: Time = 0.0;
    let mut deliveries = Vec::new();
    let mut last_count = 0;

    while t.is_finite() {
        sim.run(&mut t).unwrap();
        if t.is_infinite() {
            break;
        }

        let count = counter_value(&sim, counter);
        if count > last_count {
            deliveries.push((t, count - last_count));
            last_count = count;
        }
    }

    assert_eq!(last_count, 3);
    let times: Vec<Time> = deliveries.iter().map(|&(t, _)| t).collect();
    assert_eq!(times, vec![6.0, 7.0, 8.0]);

    sim.finalize(t).unwrap();
}

/// A unit ramp from x = -1 crosses threshold 0 exactly once, at t = 1.
#[test]
fn test_cross_detects_single_up_crossing() {
    let mut sim = Simulation::new(8, 64).unwrap();

    let source = sim
        .alloc_dynamics(Dynamics::Constant(Constant::with(1.0, 0.0)))
        .unwrap();
    let integrator = sim
        .alloc_dynamics(Dynamics::Qss1Integrator(Qss1Integrator::with(-1.0, 0.25)))
        .unwrap();
    let cross = sim
        .alloc_dynamics(Dynamics::Qss1Cross(Qss1Cross::with(0.0, true)))
        .unwrap();
    let events = sim.alloc(DynamicsType::Counter).unwrap();

    sim.connect(source, 0, integrator, 0).unwrap();
    sim.connect(integrator, 0, cross, 0).unwrap();
    // Event pulses land on the counter.
    sim.connect(cross, 2, events, 0).unwrap();

    sim.initialize(0.0).unwrap();

    let mut t: Time = 0.0;
    let mut first_event_at = None;

    while t <= 1.0 {
        sim.run(&mut t).unwrap();
        if t.is_infinite() {
            break;
        }

        if counter_value(&sim, events) > 0 && first_event_at.is_none() {
            first_event_at = Some(t);
        }

        if t < 1.0 {
            assert_eq!(
                counter_value(&sim, events),
                0,
                "event fired early at t={t}"
            );
        }
    }

    assert_eq!(counter_value(&sim, events), 1);
    assert_eq!(first_event_at, Some(1.0));

    sim.finalize(t).unwrap();
}

/// Twenty messages entering a priority queue at t = 0 with uniformly
/// random delays leave in due order, none lost.
#[test]
fn test_priority_queue_random_delays() {
    const BURST: usize = 20;

    let mut sources = ExternalSources::with_seed(4, 2021).unwrap();
    let (ta_id, _) = sources
        .randoms
        .alloc(RandomSource::new(RandomDistribution::UniformReal {
            a: 0.0,
            b: 1.0,
        }));

    let mut sim = Simulation::new(64, 256).unwrap();

    let queue = sim
        .alloc_dynamics(Dynamics::PriorityQueue(PriorityQueue::with(
            Source::random(ta_id),
            true,
        )))
        .unwrap();
    let counter = sim.alloc(DynamicsType::Counter).unwrap();
    sim.connect(queue, 0, counter, 0).unwrap();

    for k in 0..BURST {
        let emitter = sim
            .alloc_dynamics(Dynamics::Constant(Constant::with(k as Real, 0.0)))
            .unwrap();
        sim.connect(emitter, 0, queue, 0).unwrap();
    }

    sim.attach_sources(sources);
    sim.initialize(0.0).unwrap();

    let mut t: Time = 0.0;
    let mut previous_delivery: Time = 0.0;
    let mut last_count = 0;

    while t.is_finite() {
        sim.run(&mut t).unwrap();
        if t.is_infinite() {
            break;
        }

        let count = counter_value(&sim, counter);
        if count > last_count {
            assert!(t >= previous_delivery, "deliveries out of order at t={t}");
            assert!(t < 1.0, "delay outside the sampled range at t={t}");
            previous_delivery = t;
            last_count = count;
        }
    }

    assert_eq!(last_count as usize, BURST, "messages were lost");

    sim.finalize(t).unwrap();
}

/// The observer callback sequence is Initialize, zero or more Runs, then
/// exactly one Finalize.
#[test]
fn test_observer_lifecycle() {
    let mut sim = Simulation::new(8, 64).unwrap();

    let source = sim
        .alloc_dynamics(Dynamics::Constant(Constant::with(1.0, 0.0)))
        .unwrap();
    let integrator = sim
        .alloc_dynamics(Dynamics::Qss1Integrator(Qss1Integrator::with(0.0, 0.5)))
        .unwrap();
    sim.connect(source, 0, integrator, 0).unwrap();

    let statuses = Rc::new(RefCell::new(Vec::new()));
    let record = Rc::clone(&statuses);
    let observer = sim
        .alloc_observer(
            "lifecycle",
            Box::new(move |event| record.borrow_mut().push(event.status)),
        )
        .unwrap();
    sim.observe(integrator, observer).unwrap();

    sim.initialize(0.0).unwrap();

    let mut t: Time = 0.0;
    while t <= 3.0 {
        sim.run(&mut t).unwrap();
        if t.is_infinite() {
            break;
        }
    }

    sim.finalize(3.0).unwrap();

    let statuses = statuses.borrow();
    assert_eq!(statuses.first(), Some(&ObserverStatus::Initialize));
    assert_eq!(statuses.last(), Some(&ObserverStatus::Finalize));

    let runs = statuses
        .iter()
        .filter(|&&status| status == ObserverStatus::Run)
        .count();
    assert!(runs > 0, "observer saw no Run callbacks");

    let finalizes = statuses
        .iter()
        .filter(|&&status| status == ObserverStatus::Finalize)
        .count();
    assert_eq!(finalizes, 1);

    // Initialize comes first and exactly once.
    let initializes = statuses
        .iter()
        .filter(|&&status| status == ObserverStatus::Initialize)
        .count();
    assert_eq!(initializes, 1);
}

/// Deallocating a model mid-run leaves the simulation consistent: the
/// stale destination is pruned on the next emission.
#[test]
fn test_deallocate_between_steps() {
    let mut sim = Simulation::new(8, 64).unwrap();

    let source = sim
        .alloc_dynamics(Dynamics::TimeFunc(kairos::dynamics::misc::TimeFunc::with(
            kairos::dynamics::misc::TimeFunction::Time,
            0.5,
        )))
        .unwrap();
    let sink = sim.alloc(DynamicsType::Counter).unwrap();
    sim.connect(source, 0, sink, 0).unwrap();

    sim.initialize(0.0).unwrap();

    let mut t: Time = 0.0;
    sim.run(&mut t).unwrap();
    sim.run(&mut t).unwrap();

    sim.deallocate(sink).unwrap();

    // The emitter keeps running; its stale connection must not fault.
    for _ in 0..4 {
        sim.run(&mut t).unwrap();
    }

    assert!(sim.model(sink).is_none());
    assert_eq!(sim.model_count(), 1);
}

/// Equal-tn models are popped as one batch, their transitions run in
/// arena order, and they all run before any delivery.
#[test]
fn test_simultaneous_models_batch() {
    let mut sim = Simulation::new(8, 64).unwrap();

    let a = sim
        .alloc_dynamics(Dynamics::Constant(Constant::with(1.0, 1.0)))
        .unwrap();
    let b = sim
        .alloc_dynamics(Dynamics::Constant(Constant::with(2.0, 1.0)))
        .unwrap();
    let c = sim
        .alloc_dynamics(Dynamics::Constant(Constant::with(3.0, 1.0)))
        .unwrap();
    let counter = sim.alloc(DynamicsType::Counter).unwrap();
    sim.connect(a, 0, counter, 0).unwrap();
    sim.connect(b, 0, counter, 0).unwrap();
    sim.connect(c, 0, counter, 0).unwrap();

    // Each observed transition pushes its model id, exposing the order
    // the batch ran in.
    let order = Rc::new(RefCell::new(Vec::<ModelId>::new()));
    for &id in &[a, b, c] {
        let record = Rc::clone(&order);
        let observer = sim
            .alloc_observer(
                "batch",
                Box::new(move |event| {
                    if event.status == ObserverStatus::Run {
                        record.borrow_mut().push(event.model);
                    }
                }),
            )
            .unwrap();
        sim.observe(id, observer).unwrap();
    }

    sim.initialize(0.0).unwrap();

    let mut t: Time = 0.0;
    sim.run(&mut t).unwrap();
    assert_eq!(t, 1.0);

    // The batch ran in arena order: a, b, c as allocated.
    assert_eq!(*order.borrow(), vec![a, b, c]);

    // All three messages arrive in the same step; the counter sees them
    // in one transition at the same time.
    sim.run(&mut t).unwrap();
    assert_eq!(t, 1.0);
    assert_eq!(counter_value(&sim, counter), 3);
}
