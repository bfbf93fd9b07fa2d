//! # kairos
//!
//! A discrete-event simulation kernel for hybrid continuous/discrete
//! models, built on the DEVS formalism and the Quantized State System
//! (QSS) integrators of orders 1 to 3.
//!
//! ## Design
//!
//! - **Arena-owned**: every model, observer, message, connection, record
//!   and queued entry lives in a fixed-capacity arena owned by the
//!   [`Simulation`]; identifiers are generational, so stale handles fail
//!   lookups instead of aliasing.
//! - **One word per list**: ports, queues and archives are intrusive
//!   doubly-linked lists packed into a single `u64` handle; an
//!   unconnected port allocates nothing.
//! - **Pairing-heap scheduling**: the next transition is always the heap
//!   minimum; all models sharing that time are popped as one batch, every
//!   transition of the batch runs before any emitted message is delivered.
//! - **Headless**: the engine exposes a programmatic API only; editors,
//!   plotting and persistence are clients on top of it.
//!
//! ## Example
//!
//! ```
//! use kairos::{Dynamics, DynamicsType, Simulation};
//! use kairos::dynamics::misc::Constant;
//!
//! let mut sim = Simulation::new(16, 64).unwrap();
//! let source = sim
//!     .alloc_dynamics(Dynamics::Constant(Constant::with(1.0, 0.0)))
//!     .unwrap();
//! let sink = sim.alloc(DynamicsType::Counter).unwrap();
//! sim.connect(source, 0, sink, 0).unwrap();
//!
//! sim.initialize(0.0).unwrap();
//! let mut t = 0.0;
//! while t.is_finite() {
//!     sim.run(&mut t).unwrap();
//! }
//! sim.finalize(t).unwrap();
//! ```

pub mod arena;
pub mod dynamics;
pub mod error;
pub mod heap;
pub mod list;
pub mod message;
pub mod model;
pub mod project;
pub mod simulation;
pub mod source;
pub mod types;

pub use arena::{DataArray, Id, ModelId, ObserverId};
pub use dynamics::{Dynamics, DynamicsType, ModelDynamics};
pub use error::{Error, SimResult};
pub use message::{DatedMessage, Message, ObservationMessage, Record};
pub use model::{Model, Observer, ObserverCallback, ObserverEvent, ObserverStatus};
pub use project::{ProjectConfig, ProjectError};
pub use simulation::Simulation;
pub use source::{
    ExternalSources, RandomDistribution, Source, SourceDispatch, SourceOp, SourceType,
};
pub use types::{Real, Time};
