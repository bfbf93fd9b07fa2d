//! Declarative project descriptions.
//!
//! A [`ProjectConfig`] captures a whole simulation as data: the models
//! with their per-kind parameter packs, the connections between them,
//! observer attachments and the external-source registry contents. It
//! round-trips through YAML or JSON and instantiates into a live
//! [`Simulation`] plus [`ExternalSources`].
//!
//! # Configuration file structure
//!
//! ```yaml
//! models:
//!   - { type: constant, value: 1.0, offset: 0.0 }
//!   - { type: qss1_integrator, x: 0.0, dq: 0.5 }
//!   - { type: counter }
//!
//! connections:
//!   - { src: 0, out: 0, dst: 1, in: 0 }
//!   - { src: 1, out: 0, dst: 2, in: 0 }
//!
//! observers:
//!   - { model: 1, name: state }
//!
//! sources:
//!   seed: 42
//!   constants: [1.0]
//!   randoms:
//!     - { distribution: uniform-real, a: 0.0, b: 1.0 }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arena::Id;
use crate::arena::{ModelId, ObserverId};
use crate::dynamics::legacy::AdaptState;
use crate::dynamics::misc::TimeFunction;
use crate::dynamics::{
    legacy, misc, qss_arith, qss_cross, qss_integrator, queues, Dynamics, DynamicsType,
};
use crate::simulation::Simulation;
use crate::source::{
    BinaryFileSource, ConstantSource, ExternalSources, RandomDistribution, RandomSource, Source,
    SourceType, TextFileSource,
};
use crate::types::{Real, Time};

/// Errors raised while loading, validating or instantiating a project.
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown file format: {0}")]
    UnknownFormat(String),

    #[error("engine error: {0}")]
    Engine(#[from] crate::error::Error),
}

/// Result type for project operations.
pub type ProjectResult<T> = Result<T, ProjectError>;

/// Reference to an entry of the project's source section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceType,
    pub index: usize,
}

/// Per-kind parameter pack. Variant tags match [`DynamicsType::name`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelParams {
    Qss1Integrator { x: Real, dq: Real },
    Qss1Multiplier,
    Qss1Cross { threshold: Real, detect_up: bool },
    Qss1Power { n: Real },
    Qss1Square,
    Qss1Sum2,
    Qss1Sum3,
    Qss1Sum4,
    Qss1Wsum2 { coeffs: [Real; 2] },
    Qss1Wsum3 { coeffs: [Real; 3] },
    Qss1Wsum4 { coeffs: [Real; 4] },
    Qss2Integrator { x: Real, dq: Real },
    Qss2Multiplier,
    Qss2Cross { threshold: Real, detect_up: bool },
    Qss2Power { n: Real },
    Qss2Square,
    Qss2Sum2,
    Qss2Sum3,
    Qss2Sum4,
    Qss2Wsum2 { coeffs: [Real; 2] },
    Qss2Wsum3 { coeffs: [Real; 3] },
    Qss2Wsum4 { coeffs: [Real; 4] },
    Qss3Integrator { x: Real, dq: Real },
    Qss3Multiplier,
    Qss3Cross { threshold: Real, detect_up: bool },
    Qss3Power { n: Real },
    Qss3Square,
    Qss3Sum2,
    Qss3Sum3,
    Qss3Sum4,
    Qss3Wsum2 { coeffs: [Real; 2] },
    Qss3Wsum3 { coeffs: [Real; 3] },
    Qss3Wsum4 { coeffs: [Real; 4] },
    Integrator { value: Real, reset: Real },
    Quantifier {
        step_size: Real,
        past_length: i32,
        #[serde(default)]
        adapt: AdaptState,
        #[serde(default)]
        zero_init_offset: bool,
    },
    Adder2 { values: [Real; 2], coeffs: [Real; 2] },
    Adder3 { values: [Real; 3], coeffs: [Real; 3] },
    Adder4 { values: [Real; 4], coeffs: [Real; 4] },
    Mult2 { values: [Real; 2], coeffs: [Real; 2] },
    Mult3 { values: [Real; 3], coeffs: [Real; 3] },
    Mult4 { values: [Real; 4], coeffs: [Real; 4] },
    Counter,
    Queue { ta: Real },
    DynamicQueue {
        #[serde(default)]
        source_ta: Option<SourceRef>,
        #[serde(default)]
        stop_on_error: bool,
    },
    PriorityQueue {
        #[serde(default)]
        source_ta: Option<SourceRef>,
        #[serde(default)]
        stop_on_error: bool,
    },
    Generator {
        #[serde(default)]
        offset: Time,
        #[serde(default)]
        source_ta: Option<SourceRef>,
        #[serde(default)]
        source_value: Option<SourceRef>,
        #[serde(default)]
        stop_on_error: bool,
    },
    Constant { value: Real, offset: Time },
    Cross { threshold: Real },
    TimeFunc { function: TimeFunction, sigma: Time },
    Accumulator2,
    Filter { lower: Real, upper: Real },
    Flow {
        samplerate: Real,
        data: Vec<Real>,
        sigmas: Vec<Real>,
    },
}

impl ModelParams {
    pub fn kind(&self) -> DynamicsType {
        match self {
            Self::Qss1Integrator { .. } => DynamicsType::Qss1Integrator,
            Self::Qss1Multiplier => DynamicsType::Qss1Multiplier,
            Self::Qss1Cross { .. } => DynamicsType::Qss1Cross,
            Self::Qss1Power { .. } => DynamicsType::Qss1Power,
            Self::Qss1Square => DynamicsType::Qss1Square,
            Self::Qss1Sum2 => DynamicsType::Qss1Sum2,
            Self::Qss1Sum3 => DynamicsType::Qss1Sum3,
            Self::Qss1Sum4 => DynamicsType::Qss1Sum4,
            Self::Qss1Wsum2 { .. } => DynamicsType::Qss1Wsum2,
            Self::Qss1Wsum3 { .. } => DynamicsType::Qss1Wsum3,
            Self::Qss1Wsum4 { .. } => DynamicsType::Qss1Wsum4,
            Self::Qss2Integrator { .. } => DynamicsType::Qss2Integrator,
            Self::Qss2Multiplier => DynamicsType::Qss2Multiplier,
            Self::Qss2Cross { .. } => DynamicsType::Qss2Cross,
            Self::Qss2Power { .. } => DynamicsType::Qss2Power,
            Self::Qss2Square => DynamicsType::Qss2Square,
            Self::Qss2Sum2 => DynamicsType::Qss2Sum2,
            Self::Qss2Sum3 => DynamicsType::Qss2Sum3,
            Self::Qss2Sum4 => DynamicsType::Qss2Sum4,
            Self::Qss2Wsum2 { .. } => DynamicsType::Qss2Wsum2,
            Self::Qss2Wsum3 { .. } => DynamicsType::Qss2Wsum3,
            Self::Qss2Wsum4 { .. } => DynamicsType::Qss2Wsum4,
            Self::Qss3Integrator { .. } => DynamicsType::Qss3Integrator,
            Self::Qss3Multiplier => DynamicsType::Qss3Multiplier,
            Self::Qss3Cross { .. } => DynamicsType::Qss3Cross,
            Self::Qss3Power { .. } => DynamicsType::Qss3Power,
            Self::Qss3Square => DynamicsType::Qss3Square,
            Self::Qss3Sum2 => DynamicsType::Qss3Sum2,
            Self::Qss3Sum3 => DynamicsType::Qss3Sum3,
            Self::Qss3Sum4 => DynamicsType::Qss3Sum4,
            Self::Qss3Wsum2 { .. } => DynamicsType::Qss3Wsum2,
            Self::Qss3Wsum3 { .. } => DynamicsType::Qss3Wsum3,
            Self::Qss3Wsum4 { .. } => DynamicsType::Qss3Wsum4,
            Self::Integrator { .. } => DynamicsType::Integrator,
            Self::Quantifier { .. } => DynamicsType::Quantifier,
            Self::Adder2 { .. } => DynamicsType::Adder2,
            Self::Adder3 { .. } => DynamicsType::Adder3,
            Self::Adder4 { .. } => DynamicsType::Adder4,
            Self::Mult2 { .. } => DynamicsType::Mult2,
            Self::Mult3 { .. } => DynamicsType::Mult3,
            Self::Mult4 { .. } => DynamicsType::Mult4,
            Self::Counter => DynamicsType::Counter,
            Self::Queue { .. } => DynamicsType::Queue,
            Self::DynamicQueue { .. } => DynamicsType::DynamicQueue,
            Self::PriorityQueue { .. } => DynamicsType::PriorityQueue,
            Self::Generator { .. } => DynamicsType::Generator,
            Self::Constant { .. } => DynamicsType::Constant,
            Self::Cross { .. } => DynamicsType::Cross,
            Self::TimeFunc { .. } => DynamicsType::TimeFunc,
            Self::Accumulator2 => DynamicsType::Accumulator2,
            Self::Filter { .. } => DynamicsType::Filter,
            Self::Flow { .. } => DynamicsType::Flow,
        }
    }

    fn into_dynamics(&self, sources: &SourceBindings) -> ProjectResult<Dynamics> {
        let dynamics = match self {
            Self::Qss1Integrator { x, dq } => {
                Dynamics::Qss1Integrator(qss_integrator::Qss1Integrator::with(*x, *dq))
            }
            Self::Qss2Integrator { x, dq } => {
                Dynamics::Qss2Integrator(qss_integrator::Qss2Integrator::with(*x, *dq))
            }
            Self::Qss3Integrator { x, dq } => {
                Dynamics::Qss3Integrator(qss_integrator::Qss3Integrator::with(*x, *dq))
            }
            Self::Qss1Cross { threshold, detect_up } => {
                Dynamics::Qss1Cross(qss_cross::Qss1Cross::with(*threshold, *detect_up))
            }
            Self::Qss2Cross { threshold, detect_up } => {
                Dynamics::Qss2Cross(qss_cross::Qss2Cross::with(*threshold, *detect_up))
            }
            Self::Qss3Cross { threshold, detect_up } => {
                Dynamics::Qss3Cross(qss_cross::Qss3Cross::with(*threshold, *detect_up))
            }
            Self::Qss1Power { n } => {
                let mut power = qss_arith::Qss1Power::default();
                power.default_n = *n;
                Dynamics::Qss1Power(power)
            }
            Self::Qss2Power { n } => {
                let mut power = qss_arith::Qss2Power::default();
                power.default_n = *n;
                Dynamics::Qss2Power(power)
            }
            Self::Qss3Power { n } => {
                let mut power = qss_arith::Qss3Power::default();
                power.default_n = *n;
                Dynamics::Qss3Power(power)
            }
            Self::Qss1Wsum2 { coeffs } => {
                Dynamics::Qss1Wsum2(qss_arith::Qss1Wsum2::with(*coeffs))
            }
            Self::Qss1Wsum3 { coeffs } => {
                Dynamics::Qss1Wsum3(qss_arith::Qss1Wsum3::with(*coeffs))
            }
            Self::Qss1Wsum4 { coeffs } => {
                Dynamics::Qss1Wsum4(qss_arith::Qss1Wsum4::with(*coeffs))
            }
            Self::Qss2Wsum2 { coeffs } => {
                Dynamics::Qss2Wsum2(qss_arith::Qss2Wsum2::with(*coeffs))
            }
            Self::Qss2Wsum3 { coeffs } => {
                Dynamics::Qss2Wsum3(qss_arith::Qss2Wsum3::with(*coeffs))
            }
            Self::Qss2Wsum4 { coeffs } => {
                Dynamics::Qss2Wsum4(qss_arith::Qss2Wsum4::with(*coeffs))
            }
            Self::Qss3Wsum2 { coeffs } => {
                Dynamics::Qss3Wsum2(qss_arith::Qss3Wsum2::with(*coeffs))
            }
            Self::Qss3Wsum3 { coeffs } => {
                Dynamics::Qss3Wsum3(qss_arith::Qss3Wsum3::with(*coeffs))
            }
            Self::Qss3Wsum4 { coeffs } => {
                Dynamics::Qss3Wsum4(qss_arith::Qss3Wsum4::with(*coeffs))
            }
            Self::Integrator { value, reset } => {
                Dynamics::Integrator(legacy::Integrator::with(*value, *reset))
            }
            Self::Quantifier {
                step_size,
                past_length,
                adapt,
                zero_init_offset,
            } => {
                let mut quantifier = legacy::Quantifier::with(*step_size, *past_length);
                quantifier.default_adapt_state = *adapt;
                quantifier.default_zero_init_offset = *zero_init_offset;
                Dynamics::Quantifier(quantifier)
            }
            Self::Adder2 { values, coeffs } => {
                let mut adder = legacy::Adder2::default();
                adder.default_values = *values;
                adder.default_input_coeffs = *coeffs;
                Dynamics::Adder2(adder)
            }
            Self::Adder3 { values, coeffs } => {
                let mut adder = legacy::Adder3::default();
                adder.default_values = *values;
                adder.default_input_coeffs = *coeffs;
                Dynamics::Adder3(adder)
            }
            Self::Adder4 { values, coeffs } => {
                let mut adder = legacy::Adder4::default();
                adder.default_values = *values;
                adder.default_input_coeffs = *coeffs;
                Dynamics::Adder4(adder)
            }
            Self::Mult2 { values, coeffs } => {
                let mut mult = legacy::Mult2::default();
                mult.default_values = *values;
                mult.default_input_coeffs = *coeffs;
                Dynamics::Mult2(mult)
            }
            Self::Mult3 { values, coeffs } => {
                let mut mult = legacy::Mult3::default();
                mult.default_values = *values;
                mult.default_input_coeffs = *coeffs;
                Dynamics::Mult3(mult)
            }
            Self::Mult4 { values, coeffs } => {
                let mut mult = legacy::Mult4::default();
                mult.default_values = *values;
                mult.default_input_coeffs = *coeffs;
                Dynamics::Mult4(mult)
            }
            Self::Queue { ta } => Dynamics::Queue(queues::Queue::with(*ta)),
            Self::DynamicQueue {
                source_ta,
                stop_on_error,
            } => {
                let source = sources.resolve(*source_ta)?;
                Dynamics::DynamicQueue(queues::DynamicQueue::with(source, *stop_on_error))
            }
            Self::PriorityQueue {
                source_ta,
                stop_on_error,
            } => {
                let source = sources.resolve(*source_ta)?;
                Dynamics::PriorityQueue(queues::PriorityQueue::with(source, *stop_on_error))
            }
            Self::Generator {
                offset,
                source_ta,
                source_value,
                stop_on_error,
            } => {
                let ta = sources.resolve(*source_ta)?;
                let value = sources.resolve(*source_value)?;
                let mut generator = misc::Generator::with(ta, value, *offset);
                generator.stop_on_error = *stop_on_error;
                Dynamics::Generator(generator)
            }
            Self::Constant { value, offset } => {
                Dynamics::Constant(misc::Constant::with(*value, *offset))
            }
            Self::Cross { threshold } => {
                let mut cross = legacy::Cross::default();
                cross.default_threshold = *threshold;
                Dynamics::Cross(cross)
            }
            Self::TimeFunc { function, sigma } => {
                Dynamics::TimeFunc(misc::TimeFunc::with(*function, *sigma))
            }
            Self::Filter { lower, upper } => Dynamics::Filter(misc::Filter::with(*lower, *upper)),
            Self::Flow {
                samplerate,
                data,
                sigmas,
            } => Dynamics::Flow(misc::Flow::with(*samplerate, data.clone(), sigmas.clone())),
            other => Dynamics::new(other.kind()),
        };

        Ok(dynamics)
    }

    fn from_dynamics(dynamics: &Dynamics, sources: &SourceBindings) -> Self {
        match dynamics {
            Dynamics::Qss1Integrator(d) => Self::Qss1Integrator {
                x: d.default_x,
                dq: d.default_dq,
            },
            Dynamics::Qss2Integrator(d) => Self::Qss2Integrator {
                x: d.default_x,
                dq: d.default_dq,
            },
            Dynamics::Qss3Integrator(d) => Self::Qss3Integrator {
                x: d.default_x,
                dq: d.default_dq,
            },
            Dynamics::Qss1Multiplier(_) => Self::Qss1Multiplier,
            Dynamics::Qss2Multiplier(_) => Self::Qss2Multiplier,
            Dynamics::Qss3Multiplier(_) => Self::Qss3Multiplier,
            Dynamics::Qss1Cross(d) => Self::Qss1Cross {
                threshold: d.default_threshold,
                detect_up: d.default_detect_up,
            },
            Dynamics::Qss2Cross(d) => Self::Qss2Cross {
                threshold: d.default_threshold,
                detect_up: d.default_detect_up,
            },
            Dynamics::Qss3Cross(d) => Self::Qss3Cross {
                threshold: d.default_threshold,
                detect_up: d.default_detect_up,
            },
            Dynamics::Qss1Power(d) => Self::Qss1Power { n: d.default_n },
            Dynamics::Qss2Power(d) => Self::Qss2Power { n: d.default_n },
            Dynamics::Qss3Power(d) => Self::Qss3Power { n: d.default_n },
            Dynamics::Qss1Square(_) => Self::Qss1Square,
            Dynamics::Qss2Square(_) => Self::Qss2Square,
            Dynamics::Qss3Square(_) => Self::Qss3Square,
            Dynamics::Qss1Sum2(_) => Self::Qss1Sum2,
            Dynamics::Qss1Sum3(_) => Self::Qss1Sum3,
            Dynamics::Qss1Sum4(_) => Self::Qss1Sum4,
            Dynamics::Qss2Sum2(_) => Self::Qss2Sum2,
            Dynamics::Qss2Sum3(_) => Self::Qss2Sum3,
            Dynamics::Qss2Sum4(_) => Self::Qss2Sum4,
            Dynamics::Qss3Sum2(_) => Self::Qss3Sum2,
            Dynamics::Qss3Sum3(_) => Self::Qss3Sum3,
            Dynamics::Qss3Sum4(_) => Self::Qss3Sum4,
            Dynamics::Qss1Wsum2(d) => Self::Qss1Wsum2 {
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Qss1Wsum3(d) => Self::Qss1Wsum3 {
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Qss1Wsum4(d) => Self::Qss1Wsum4 {
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Qss2Wsum2(d) => Self::Qss2Wsum2 {
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Qss2Wsum3(d) => Self::Qss2Wsum3 {
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Qss2Wsum4(d) => Self::Qss2Wsum4 {
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Qss3Wsum2(d) => Self::Qss3Wsum2 {
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Qss3Wsum3(d) => Self::Qss3Wsum3 {
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Qss3Wsum4(d) => Self::Qss3Wsum4 {
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Integrator(d) => Self::Integrator {
                value: d.default_current_value,
                reset: d.default_reset_value,
            },
            Dynamics::Quantifier(d) => Self::Quantifier {
                step_size: d.default_step_size,
                past_length: d.default_past_length,
                adapt: d.default_adapt_state,
                zero_init_offset: d.default_zero_init_offset,
            },
            Dynamics::Adder2(d) => Self::Adder2 {
                values: d.default_values,
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Adder3(d) => Self::Adder3 {
                values: d.default_values,
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Adder4(d) => Self::Adder4 {
                values: d.default_values,
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Mult2(d) => Self::Mult2 {
                values: d.default_values,
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Mult3(d) => Self::Mult3 {
                values: d.default_values,
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Mult4(d) => Self::Mult4 {
                values: d.default_values,
                coeffs: d.default_input_coeffs,
            },
            Dynamics::Counter(_) => Self::Counter,
            Dynamics::Queue(d) => Self::Queue { ta: d.default_ta },
            Dynamics::DynamicQueue(d) => Self::DynamicQueue {
                source_ta: sources.reference(&d.source_ta),
                stop_on_error: d.stop_on_error,
            },
            Dynamics::PriorityQueue(d) => Self::PriorityQueue {
                source_ta: sources.reference(&d.source_ta),
                stop_on_error: d.stop_on_error,
            },
            Dynamics::Generator(d) => Self::Generator {
                offset: d.default_offset,
                source_ta: sources.reference(&d.source_ta),
                source_value: sources.reference(&d.source_value),
                stop_on_error: d.stop_on_error,
            },
            Dynamics::Constant(d) => Self::Constant {
                value: d.default_value,
                offset: d.default_offset,
            },
            Dynamics::Cross(d) => Self::Cross {
                threshold: d.default_threshold,
            },
            Dynamics::TimeFunc(d) => Self::TimeFunc {
                function: d.default_f,
                sigma: d.default_sigma,
            },
            Dynamics::Accumulator2(_) => Self::Accumulator2,
            Dynamics::Filter(d) => Self::Filter {
                lower: d.default_lower_threshold,
                upper: d.default_upper_threshold,
            },
            Dynamics::Flow(d) => Self::Flow {
                samplerate: d.default_samplerate,
                data: d.default_data.clone(),
                sigmas: d.default_sigmas.clone(),
            },
        }
    }
}

/// One model of the project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub params: ModelParams,
}

impl ModelConfig {
    pub fn new(params: ModelParams) -> Self {
        Self { name: None, params }
    }
}

/// One connection `(src, out) -> (dst, in)` by model position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub src: usize,
    pub out: usize,
    pub dst: usize,
    #[serde(rename = "in")]
    pub in_port: usize,
}

/// One observer attachment by model position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverConfig {
    pub model: usize,
    pub name: String,
}

/// External-source registry contents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary_files: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_files: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub randoms: Vec<RandomDistribution>,
}

impl SourcesConfig {
    fn len_of(&self, kind: SourceType) -> usize {
        match kind {
            SourceType::Constant => self.constants.len(),
            SourceType::BinaryFile => self.binary_files.len(),
            SourceType::TextFile => self.text_files.len(),
            SourceType::Random => self.randoms.len(),
        }
    }
}

/// A whole simulation as data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observers: Vec<ObserverConfig>,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// A project instantiated into live engine objects.
pub struct BuiltProject {
    pub simulation: Simulation,
    pub sources: ExternalSources,
    /// Model ids in project order.
    pub models: Vec<ModelId>,
    /// Observer ids in project order; callbacks start as no-ops.
    pub observers: Vec<ObserverId>,
}

impl ProjectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // -- persistence -----------------------------------------------------

    pub fn from_yaml(yaml: &str) -> ProjectResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> ProjectResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ProjectResult<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ProjectResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Loads a project, selecting the format from the file extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ProjectResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ProjectError::UnknownFormat(ext.to_string())),
        }
    }

    pub fn to_yaml(&self) -> ProjectResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> ProjectResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ProjectResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ProjectResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    // -- validation ------------------------------------------------------

    /// Checks model indices, port ranges, source references and duplicate
    /// connections.
    pub fn validate(&self) -> ProjectResult<()> {
        for (index, conn) in self.connections.iter().enumerate() {
            let src = self.models.get(conn.src).ok_or_else(|| {
                ProjectError::Validation(format!(
                    "connection {index} references unknown source model {}",
                    conn.src
                ))
            })?;
            let dst = self.models.get(conn.dst).ok_or_else(|| {
                ProjectError::Validation(format!(
                    "connection {index} references unknown destination model {}",
                    conn.dst
                ))
            })?;

            if conn.out >= src.params.kind().output_port_count() {
                return Err(ProjectError::Validation(format!(
                    "connection {index} uses output port {} beyond {}",
                    conn.out,
                    src.params.kind().name()
                )));
            }

            if conn.in_port >= dst.params.kind().input_port_count() {
                return Err(ProjectError::Validation(format!(
                    "connection {index} uses input port {} beyond {}",
                    conn.in_port,
                    dst.params.kind().name()
                )));
            }

            let duplicates = self.connections[..index]
                .iter()
                .any(|other| other == conn);
            if duplicates {
                return Err(ProjectError::Validation(format!(
                    "duplicate connection at index {index}"
                )));
            }
        }

        for (index, observer) in self.observers.iter().enumerate() {
            if observer.model >= self.models.len() {
                return Err(ProjectError::Validation(format!(
                    "observer {index} references unknown model {}",
                    observer.model
                )));
            }
        }

        for (index, model) in self.models.iter().enumerate() {
            for reference in model_source_refs(&model.params) {
                if reference.index >= self.sources.len_of(reference.kind) {
                    tracing::warn!(
                        model = index,
                        "source reference beyond the registry section"
                    );
                    return Err(ProjectError::Validation(format!(
                        "model {index} references a source outside the registry section"
                    )));
                }
            }
        }

        Ok(())
    }

    // -- instantiation ---------------------------------------------------

    /// Builds the registry and a simulation holding every model,
    /// connection and observer of the project.
    ///
    /// The returned registry is separate from the simulation; install it
    /// with [`Simulation::attach_sources`] (or a custom dispatch) before
    /// initializing.
    pub fn build(
        &self,
        model_capacity: usize,
        message_capacity: usize,
    ) -> ProjectResult<BuiltProject> {
        self.validate()?;

        let source_capacity = [
            self.sources.constants.len(),
            self.sources.binary_files.len(),
            self.sources.text_files.len(),
            self.sources.randoms.len(),
            1,
        ]
        .into_iter()
        .max()
        .unwrap_or(1);

        let mut sources = match self.sources.seed {
            Some(seed) => ExternalSources::with_seed(source_capacity, seed)?,
            None => ExternalSources::with_capacity(source_capacity)?,
        };

        let mut bindings = SourceBindings::default();
        for value in &self.sources.constants {
            let (id, _) = sources.constants.alloc(ConstantSource::new(*value));
            bindings.constants.push(id.raw());
        }
        for path in &self.sources.binary_files {
            let (id, _) = sources.binary_files.alloc(BinaryFileSource::new(path));
            bindings.binary_files.push(id.raw());
        }
        for path in &self.sources.text_files {
            let (id, _) = sources.text_files.alloc(TextFileSource::new(path));
            bindings.text_files.push(id.raw());
        }
        for distribution in &self.sources.randoms {
            let (id, _) = sources.randoms.alloc(RandomSource::new(*distribution));
            bindings.randoms.push(id.raw());
        }

        let mut simulation = Simulation::new(model_capacity, message_capacity)?;

        let mut models = Vec::with_capacity(self.models.len());
        for model in &self.models {
            let dynamics = model.params.into_dynamics(&bindings)?;
            models.push(simulation.alloc_dynamics(dynamics)?);
        }

        for conn in &self.connections {
            simulation.connect(
                models[conn.src],
                conn.out,
                models[conn.dst],
                conn.in_port,
            )?;
        }

        let mut observers = Vec::with_capacity(self.observers.len());
        for observer in &self.observers {
            let id = simulation.alloc_observer(observer.name.as_str(), Box::new(|_| {}))?;
            simulation.observe(models[observer.model], id)?;
            observers.push(id);
        }

        Ok(BuiltProject {
            simulation,
            sources,
            models,
            observers,
        })
    }

    /// Reads a live simulation (and its registry) back into a project.
    pub fn from_simulation(simulation: &Simulation, sources: &ExternalSources) -> Self {
        let bindings = SourceBindings::from_registry(sources);

        let model_ids = simulation.model_ids();
        let index_of = |id: ModelId| model_ids.iter().position(|&m| m == id);

        let mut models = Vec::with_capacity(model_ids.len());
        let mut observers = Vec::new();

        for (position, &id) in model_ids.iter().enumerate() {
            let model = match simulation.model(id) {
                Some(model) => model,
                None => continue,
            };

            models.push(ModelConfig::new(ModelParams::from_dynamics(
                &model.dynamics,
                &bindings,
            )));

            if let Some(observer) = simulation.observer_of(id) {
                observers.push(ObserverConfig {
                    model: position,
                    name: observer.name.clone(),
                });
            }
        }

        let connections = simulation
            .connections()
            .into_iter()
            .filter_map(|(src, out, dst, in_port)| {
                Some(ConnectionConfig {
                    src: index_of(src)?,
                    out,
                    dst: index_of(dst)?,
                    in_port,
                })
            })
            .collect();

        let sources_config = SourcesConfig {
            seed: None,
            constants: sources.constants.iter().map(|(_, c)| c.value).collect(),
            binary_files: sources
                .binary_files
                .iter()
                .map(|(_, f)| f.path.clone())
                .collect(),
            text_files: sources.text_files.iter().map(|(_, f)| f.path.clone()).collect(),
            randoms: sources.randoms.iter().map(|(_, r)| r.distribution).collect(),
        };

        Self {
            models,
            connections,
            observers,
            sources: sources_config,
        }
    }
}

/// Maps project source indices to registry identifiers and back.
#[derive(Default)]
struct SourceBindings {
    constants: Vec<u64>,
    binary_files: Vec<u64>,
    text_files: Vec<u64>,
    randoms: Vec<u64>,
}

impl SourceBindings {
    fn from_registry(sources: &ExternalSources) -> Self {
        Self {
            constants: sources.constants.iter().map(|(id, _)| id.raw()).collect(),
            binary_files: sources.binary_files.iter().map(|(id, _)| id.raw()).collect(),
            text_files: sources.text_files.iter().map(|(id, _)| id.raw()).collect(),
            randoms: sources.randoms.iter().map(|(id, _)| id.raw()).collect(),
        }
    }

    fn table(&self, kind: SourceType) -> &[u64] {
        match kind {
            SourceType::Constant => &self.constants,
            SourceType::BinaryFile => &self.binary_files,
            SourceType::TextFile => &self.text_files,
            SourceType::Random => &self.randoms,
        }
    }

    fn resolve(&self, reference: Option<SourceRef>) -> ProjectResult<Source> {
        let Some(reference) = reference else {
            return Ok(Source::default());
        };

        let raw = self
            .table(reference.kind)
            .get(reference.index)
            .copied()
            .ok_or_else(|| {
                ProjectError::Validation(format!(
                    "source reference {:?}/{} does not resolve",
                    reference.kind, reference.index
                ))
            })?;

        Ok(Source {
            kind: Some(reference.kind),
            id: raw,
            ..Source::default()
        })
    }

    fn reference(&self, source: &Source) -> Option<SourceRef> {
        let kind = source.kind?;
        let index = self.table(kind).iter().position(|&raw| raw == source.id)?;
        Some(SourceRef { kind, index })
    }
}

fn model_source_refs(params: &ModelParams) -> Vec<SourceRef> {
    let mut out = Vec::new();

    match params {
        ModelParams::DynamicQueue { source_ta, .. }
        | ModelParams::PriorityQueue { source_ta, .. } => {
            out.extend(source_ta.iter().copied());
        }
        ModelParams::Generator {
            source_ta,
            source_value,
            ..
        } => {
            out.extend(source_ta.iter().copied());
            out.extend(source_value.iter().copied());
        }
        _ => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_project() -> ProjectConfig {
        ProjectConfig {
            models: vec![
                ModelConfig::new(ModelParams::Constant {
                    value: 1.0,
                    offset: 0.0,
                }),
                ModelConfig::new(ModelParams::Qss1Integrator { x: 0.0, dq: 0.5 }),
                ModelConfig::new(ModelParams::Counter),
            ],
            connections: vec![
                ConnectionConfig {
                    src: 0,
                    out: 0,
                    dst: 1,
                    in_port: 0,
                },
                ConnectionConfig {
                    src: 1,
                    out: 0,
                    dst: 2,
                    in_port: 0,
                },
            ],
            observers: vec![ObserverConfig {
                model: 1,
                name: "state".to_string(),
            }],
            sources: SourcesConfig::default(),
        }
    }

    #[test]
    fn test_yaml_roundtrip() {
        let project = ramp_project();
        let yaml = project.to_yaml().unwrap();
        let restored = ProjectConfig::from_yaml(&yaml).unwrap();
        assert_eq!(project, restored);
    }

    #[test]
    fn test_json_roundtrip() {
        let project = ramp_project();
        let json = project.to_json().unwrap();
        let restored = ProjectConfig::from_json(&json).unwrap();
        assert_eq!(project, restored);
    }

    #[test]
    fn test_yaml_parsing_with_tags() {
        let yaml = r#"
models:
  - { type: constant, value: 2.0, offset: 0.0 }
  - { type: qss1_wsum_2, coeffs: [2.0, -0.4] }
  - { type: queue, ta: 5.0 }

connections:
  - { src: 0, out: 0, dst: 1, in: 0 }

sources:
  constants: [1.5]
  randoms:
    - { distribution: uniform-real, a: 0.0, b: 1.0 }
"#;

        let project = ProjectConfig::from_yaml(yaml).unwrap();
        assert_eq!(project.models.len(), 3);
        assert_eq!(project.models[1].params.kind(), DynamicsType::Qss1Wsum2);
        assert_eq!(project.sources.constants, vec![1.5]);
        assert_eq!(project.sources.randoms.len(), 1);
    }

    #[test]
    fn test_validation_rejects_bad_connection() {
        let mut project = ramp_project();
        project.connections.push(ConnectionConfig {
            src: 9,
            out: 0,
            dst: 0,
            in_port: 0,
        });
        assert!(matches!(
            project.validate(),
            Err(ProjectError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_port() {
        let mut project = ramp_project();
        // Counter has no output port.
        project.connections.push(ConnectionConfig {
            src: 2,
            out: 0,
            dst: 0,
            in_port: 0,
        });
        assert!(matches!(
            project.validate(),
            Err(ProjectError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_rejects_duplicate_connection() {
        let mut project = ramp_project();
        project.connections.push(project.connections[0]);
        assert!(matches!(
            project.validate(),
            Err(ProjectError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_rejects_dangling_source_ref() {
        let mut project = ramp_project();
        project.models.push(ModelConfig::new(ModelParams::Generator {
            offset: 0.0,
            source_ta: Some(SourceRef {
                kind: SourceType::Constant,
                index: 7,
            }),
            source_value: None,
            stop_on_error: false,
        }));
        assert!(matches!(
            project.validate(),
            Err(ProjectError::Validation(_))
        ));
    }

    #[test]
    fn test_build_produces_runnable_simulation() {
        let project = ramp_project();
        let mut built = project.build(16, 64).unwrap();
        built.simulation.attach_sources(built.sources);

        built.simulation.initialize(0.0).unwrap();

        let mut t = 0.0;
        let mut steps = 0;
        while t < 10.0 && steps < 1000 {
            built.simulation.run(&mut t).unwrap();
            steps += 1;
        }

        assert!(steps < 1000);
        assert_eq!(built.simulation.model_count(), 3);
    }

    #[test]
    fn test_export_import_preserves_structure() {
        let project = ramp_project();
        let built = project.build(16, 64).unwrap();

        let exported = ProjectConfig::from_simulation(&built.simulation, &built.sources);

        assert_eq!(exported.models.len(), project.models.len());
        assert_eq!(exported.connections.len(), project.connections.len());
        for (a, b) in exported.models.iter().zip(&project.models) {
            assert_eq!(a.params, b.params);
        }
    }

    #[test]
    fn test_source_refs_roundtrip_through_build() {
        let project = ProjectConfig {
            models: vec![ModelConfig::new(ModelParams::Generator {
                offset: 0.5,
                source_ta: Some(SourceRef {
                    kind: SourceType::Constant,
                    index: 0,
                }),
                source_value: Some(SourceRef {
                    kind: SourceType::Constant,
                    index: 1,
                }),
                stop_on_error: true,
            })],
            connections: Vec::new(),
            observers: Vec::new(),
            sources: SourcesConfig {
                constants: vec![2.0, 9.0],
                ..SourcesConfig::default()
            },
        };

        let built = project.build(8, 32).unwrap();
        let exported = ProjectConfig::from_simulation(&built.simulation, &built.sources);
        assert_eq!(exported.models[0].params, project.models[0].params);
    }
}
