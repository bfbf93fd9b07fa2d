//! Atomic model kinds and their dispatch.
//!
//! Every kind is a plain struct implementing [`ModelDynamics`]; the
//! [`Dynamics`] sum type holds exactly one of them per model and routes the
//! contract operations to the active variant. The contract mirrors DEVS:
//! `initialize` computes the first `sigma`, `lambda` emits just before an
//! internal event, `transition` folds elapsed time and pending input into
//! new state, `observation` samples the output for an observer, and
//! `finalize` releases any list storage the kind owns.

pub mod legacy;
pub mod misc;
pub mod qss_arith;
pub mod qss_cross;
pub mod qss_integrator;
pub mod queues;

use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::message::ObservationMessage;
use crate::simulation::Simulation;
use crate::types::{InputPort, OutputPort, Time};

pub use legacy::{
    Adder, Adder2, Adder3, Adder4, AdaptState, Cross, Integrator, Mult, Mult2, Mult3, Mult4,
    Quantifier,
};
pub use misc::{
    Accumulator2, Constant, Counter, Filter, Flow, Generator, TimeFunc, TimeFunction,
};
pub use qss_arith::{
    Qss1Multiplier, Qss1Power, Qss1Square, Qss1Sum2, Qss1Sum3, Qss1Sum4, Qss1Wsum2, Qss1Wsum3,
    Qss1Wsum4, Qss2Multiplier, Qss2Power, Qss2Square, Qss2Sum2, Qss2Sum3, Qss2Sum4, Qss2Wsum2,
    Qss2Wsum3, Qss2Wsum4, Qss3Multiplier, Qss3Power, Qss3Square, Qss3Sum2, Qss3Sum3, Qss3Sum4,
    Qss3Wsum2, Qss3Wsum3, Qss3Wsum4, QssMultiplier, QssPower, QssSquare, QssSum, QssWsum,
};
pub use qss_cross::{Qss1Cross, Qss2Cross, Qss3Cross, QssCross};
pub use qss_integrator::{Qss1Integrator, Qss2Integrator, Qss3Integrator, QssIntegrator};
pub use queues::{DynamicQueue, PriorityQueue, Queue};

/// The contract every atomic model kind satisfies. Operations a kind does
/// not define fall back to no-ops, the way an idle model behaves.
pub trait ModelDynamics {
    fn initialize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let _ = sim;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let _ = sim;
        Ok(())
    }

    fn transition(&mut self, sim: &mut Simulation, t: Time, e: Time, r: Time) -> SimResult<()> {
        let _ = (sim, t, e, r);
        Ok(())
    }

    /// Samples the current output. `None` means the kind is unobservable
    /// and its observer receives no Run or Finalize samples.
    fn observation(&self, e: Time) -> Option<ObservationMessage> {
        let _ = e;
        None
    }

    fn finalize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let _ = sim;
        Ok(())
    }

    /// Time advance until the next internal event.
    fn sigma(&self) -> Time;

    fn input_ports(&self) -> &[InputPort] {
        &[]
    }

    fn input_ports_mut(&mut self) -> &mut [InputPort] {
        &mut []
    }

    fn output_ports(&self) -> &[OutputPort] {
        &[]
    }

    fn output_ports_mut(&mut self) -> &mut [OutputPort] {
        &mut []
    }
}

macro_rules! dynamics_kinds {
    ($(($variant:ident, $ty:ty, $name:literal)),+ $(,)?) => {
        /// Tag naming each atomic model kind.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum DynamicsType {
            $($variant),+
        }

        impl DynamicsType {
            /// Every kind, in declaration order.
            pub const ALL: &'static [DynamicsType] = &[$(DynamicsType::$variant),+];

            /// The kind's canonical snake_case name.
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        /// Per-model payload: one state struct, tagged by its kind.
        #[derive(Clone, Debug)]
        pub enum Dynamics {
            $($variant($ty)),+
        }

        impl Dynamics {
            /// Builds the default-parameterized payload for `kind`.
            pub fn new(kind: DynamicsType) -> Self {
                match kind {
                    $(DynamicsType::$variant => Dynamics::$variant(<$ty>::default())),+
                }
            }

            pub fn kind(&self) -> DynamicsType {
                match self {
                    $(Dynamics::$variant(_) => DynamicsType::$variant),+
                }
            }

            pub(crate) fn initialize(&mut self, sim: &mut Simulation) -> SimResult<()> {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.initialize(sim)),+
                }
            }

            pub(crate) fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.lambda(sim)),+
                }
            }

            pub(crate) fn transition(
                &mut self,
                sim: &mut Simulation,
                t: Time,
                e: Time,
                r: Time,
            ) -> SimResult<()> {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.transition(sim, t, e, r)),+
                }
            }

            pub fn observation(&self, e: Time) -> Option<ObservationMessage> {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.observation(e)),+
                }
            }

            pub(crate) fn finalize(&mut self, sim: &mut Simulation) -> SimResult<()> {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.finalize(sim)),+
                }
            }

            pub fn sigma(&self) -> Time {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.sigma()),+
                }
            }

            pub fn input_ports(&self) -> &[InputPort] {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.input_ports()),+
                }
            }

            pub fn input_ports_mut(&mut self) -> &mut [InputPort] {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.input_ports_mut()),+
                }
            }

            pub fn output_ports(&self) -> &[OutputPort] {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.output_ports()),+
                }
            }

            pub fn output_ports_mut(&mut self) -> &mut [OutputPort] {
                match self {
                    $(Dynamics::$variant(dynamics) => dynamics.output_ports_mut()),+
                }
            }
        }

        $(
            impl From<$ty> for Dynamics {
                fn from(dynamics: $ty) -> Self {
                    Dynamics::$variant(dynamics)
                }
            }
        )+
    };
}

dynamics_kinds![
    (Qss1Integrator, qss_integrator::Qss1Integrator, "qss1_integrator"),
    (Qss1Multiplier, qss_arith::Qss1Multiplier, "qss1_multiplier"),
    (Qss1Cross, qss_cross::Qss1Cross, "qss1_cross"),
    (Qss1Power, qss_arith::Qss1Power, "qss1_power"),
    (Qss1Square, qss_arith::Qss1Square, "qss1_square"),
    (Qss1Sum2, qss_arith::Qss1Sum2, "qss1_sum_2"),
    (Qss1Sum3, qss_arith::Qss1Sum3, "qss1_sum_3"),
    (Qss1Sum4, qss_arith::Qss1Sum4, "qss1_sum_4"),
    (Qss1Wsum2, qss_arith::Qss1Wsum2, "qss1_wsum_2"),
    (Qss1Wsum3, qss_arith::Qss1Wsum3, "qss1_wsum_3"),
    (Qss1Wsum4, qss_arith::Qss1Wsum4, "qss1_wsum_4"),
    (Qss2Integrator, qss_integrator::Qss2Integrator, "qss2_integrator"),
    (Qss2Multiplier, qss_arith::Qss2Multiplier, "qss2_multiplier"),
    (Qss2Cross, qss_cross::Qss2Cross, "qss2_cross"),
    (Qss2Power, qss_arith::Qss2Power, "qss2_power"),
    (Qss2Square, qss_arith::Qss2Square, "qss2_square"),
    (Qss2Sum2, qss_arith::Qss2Sum2, "qss2_sum_2"),
    (Qss2Sum3, qss_arith::Qss2Sum3, "qss2_sum_3"),
    (Qss2Sum4, qss_arith::Qss2Sum4, "qss2_sum_4"),
    (Qss2Wsum2, qss_arith::Qss2Wsum2, "qss2_wsum_2"),
    (Qss2Wsum3, qss_arith::Qss2Wsum3, "qss2_wsum_3"),
    (Qss2Wsum4, qss_arith::Qss2Wsum4, "qss2_wsum_4"),
    (Qss3Integrator, qss_integrator::Qss3Integrator, "qss3_integrator"),
    (Qss3Multiplier, qss_arith::Qss3Multiplier, "qss3_multiplier"),
    (Qss3Cross, qss_cross::Qss3Cross, "qss3_cross"),
    (Qss3Power, qss_arith::Qss3Power, "qss3_power"),
    (Qss3Square, qss_arith::Qss3Square, "qss3_square"),
    (Qss3Sum2, qss_arith::Qss3Sum2, "qss3_sum_2"),
    (Qss3Sum3, qss_arith::Qss3Sum3, "qss3_sum_3"),
    (Qss3Sum4, qss_arith::Qss3Sum4, "qss3_sum_4"),
    (Qss3Wsum2, qss_arith::Qss3Wsum2, "qss3_wsum_2"),
    (Qss3Wsum3, qss_arith::Qss3Wsum3, "qss3_wsum_3"),
    (Qss3Wsum4, qss_arith::Qss3Wsum4, "qss3_wsum_4"),
    (Integrator, legacy::Integrator, "integrator"),
    (Quantifier, legacy::Quantifier, "quantifier"),
    (Adder2, legacy::Adder2, "adder_2"),
    (Adder3, legacy::Adder3, "adder_3"),
    (Adder4, legacy::Adder4, "adder_4"),
    (Mult2, legacy::Mult2, "mult_2"),
    (Mult3, legacy::Mult3, "mult_3"),
    (Mult4, legacy::Mult4, "mult_4"),
    (Counter, misc::Counter, "counter"),
    (Queue, queues::Queue, "queue"),
    (DynamicQueue, queues::DynamicQueue, "dynamic_queue"),
    (PriorityQueue, queues::PriorityQueue, "priority_queue"),
    (Generator, misc::Generator, "generator"),
    (Constant, misc::Constant, "constant"),
    (Cross, legacy::Cross, "cross"),
    (TimeFunc, misc::TimeFunc, "time_func"),
    (Accumulator2, misc::Accumulator2, "accumulator_2"),
    (Filter, misc::Filter, "filter"),
    (Flow, misc::Flow, "flow"),
];

impl Default for Dynamics {
    fn default() -> Self {
        Dynamics::Constant(misc::Constant::default())
    }
}

impl DynamicsType {
    /// Names of the kind's input ports, in port order.
    pub fn input_port_names(self) -> &'static [&'static str] {
        use DynamicsType::*;

        match self {
            Qss1Integrator | Qss2Integrator | Qss3Integrator => &["x-dot", "reset"],
            Integrator => &["quanta", "x-dot", "reset"],
            Qss1Multiplier | Qss2Multiplier | Qss3Multiplier | Qss1Sum2 | Qss2Sum2 | Qss3Sum2
            | Qss1Wsum2 | Qss2Wsum2 | Qss3Wsum2 | Adder2 | Mult2 => &["in-1", "in-2"],
            Qss1Sum3 | Qss2Sum3 | Qss3Sum3 | Qss1Wsum3 | Qss2Wsum3 | Qss3Wsum3 | Adder3
            | Mult3 => &["in-1", "in-2", "in-3"],
            Qss1Sum4 | Qss2Sum4 | Qss3Sum4 | Qss1Wsum4 | Qss2Wsum4 | Qss3Wsum4 | Adder4
            | Mult4 => &["in-1", "in-2", "in-3", "in-4"],
            Qss1Power | Qss2Power | Qss3Power | Qss1Square | Qss2Square | Qss3Square | Counter
            | Queue | DynamicQueue | PriorityQueue | Filter | Quantifier => &["in"],
            Qss1Cross | Qss2Cross | Qss3Cross | Cross => {
                &["value", "if", "else", "threshold"]
            }
            Accumulator2 => &["in-1", "in-2", "nb-1", "nb-2"],
            Generator | Constant | TimeFunc | Flow => &[],
        }
    }

    /// Names of the kind's output ports, in port order.
    pub fn output_port_names(self) -> &'static [&'static str] {
        use DynamicsType::*;

        match self {
            Qss1Cross | Qss2Cross | Qss3Cross => &["if-value", "else-value", "event"],
            Cross => &["result", "event"],
            Counter | Accumulator2 => &[],
            _ => &["out"],
        }
    }

    pub fn input_port_count(self) -> usize {
        self.input_port_names().len()
    }

    pub fn output_port_count(self) -> usize {
        self.output_port_names().len()
    }
}

/// Connection compatibility: only a quantifier may feed the adaptive
/// integrator's quanta port, and a model may not feed itself.
pub(crate) fn is_ports_compatible(
    src_kind: DynamicsType,
    src_id: crate::arena::ModelId,
    _out_port: usize,
    dst_kind: DynamicsType,
    dst_id: crate::arena::ModelId,
    in_port: usize,
) -> bool {
    if src_id == dst_id {
        return false;
    }

    let quanta_port = dst_kind == DynamicsType::Integrator && in_port == legacy::PORT_QUANTA;

    match src_kind {
        DynamicsType::Quantifier => quanta_port,
        _ => !quanta_port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Id, ModelId};

    #[test]
    fn test_kind_names_roundtrip() {
        for &kind in DynamicsType::ALL {
            assert_eq!(DynamicsType::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_all_kinds_constructible() {
        for &kind in DynamicsType::ALL {
            let dynamics = Dynamics::new(kind);
            assert_eq!(dynamics.kind(), kind);
        }
    }

    #[test]
    fn test_port_counts_match_payloads() {
        for &kind in DynamicsType::ALL {
            let dynamics = Dynamics::new(kind);
            assert_eq!(
                dynamics.input_ports().len(),
                kind.input_port_count(),
                "{}",
                kind.name()
            );
            assert_eq!(
                dynamics.output_ports().len(),
                kind.output_port_count(),
                "{}",
                kind.name()
            );
        }
    }

    #[test]
    fn test_serde_names_match_table() {
        let json = serde_json::to_string(&DynamicsType::Qss1Integrator).unwrap();
        assert_eq!(json, "\"qss1_integrator\"");

        let kind: DynamicsType = serde_json::from_str("\"priority_queue\"").unwrap();
        assert_eq!(kind, DynamicsType::PriorityQueue);
    }

    #[test]
    fn test_quantifier_integrator_compatibility() {
        let a = ModelId::from_parts(1, 0);
        let b = ModelId::from_parts(1, 1);

        // Quantifier feeds the quanta port, nothing else does.
        assert!(is_ports_compatible(
            DynamicsType::Quantifier,
            a,
            0,
            DynamicsType::Integrator,
            b,
            legacy::PORT_QUANTA,
        ));
        assert!(!is_ports_compatible(
            DynamicsType::Constant,
            a,
            0,
            DynamicsType::Integrator,
            b,
            legacy::PORT_QUANTA,
        ));
        assert!(!is_ports_compatible(
            DynamicsType::Quantifier,
            a,
            0,
            DynamicsType::Counter,
            b,
            0,
        ));

        // Self-connection is rejected.
        assert!(!is_ports_compatible(
            DynamicsType::Constant,
            a,
            0,
            DynamicsType::Counter,
            a,
            0,
        ));
    }
}
