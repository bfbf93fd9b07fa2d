//! Criterion benchmarks for the simulation kernel.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kairos::dynamics::misc::Constant;
use kairos::dynamics::qss_arith::{Qss1Multiplier, Qss1Wsum2};
use kairos::dynamics::qss_integrator::Qss1Integrator;
use kairos::{Dynamics, Simulation, Time};

fn lotka_volterra() -> Simulation {
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

    sim
}

fn ramp_chain() -> Simulation {
    let mut sim = Simulation::new(8, 64).unwrap();

    let source = sim
        .alloc_dynamics(Dynamics::Constant(Constant::with(1.0, 0.0)))
        .unwrap();
    let integrator = sim
        .alloc_dynamics(Dynamics::Qss1Integrator(Qss1Integrator::with(0.0, 0.001)))
        .unwrap();
    sim.connect(source, 0, integrator, 0).unwrap();

    sim
}

fn bench_lotka_volterra(c: &mut Criterion) {
    c.bench_function("lotka_volterra_qss1_t15", |b| {
        b.iter(|| {
            let mut sim = lotka_volterra();
            sim.initialize(0.0).unwrap();

            let mut t: Time = 0.0;
            while t < 15.0 {
                sim.run(&mut t).unwrap();
                if t.is_infinite() {
                    break;
                }
            }

            black_box(t)
        })
    });
}

fn bench_integrator_steps(c: &mut Criterion) {
    c.bench_function("qss1_ramp_10k_steps", |b| {
        b.iter(|| {
            let mut sim = ramp_chain();
            sim.initialize(0.0).unwrap();

            let mut t: Time = 0.0;
            for _ in 0..10_000 {
                sim.run(&mut t).unwrap();
                if t.is_infinite() {
                    break;
                }
            }

            black_box(t)
        })
    });
}

criterion_group!(benches, bench_lotka_volterra, bench_integrator_steps);
criterion_main!(benches);
