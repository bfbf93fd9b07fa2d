//! Sources, sinks and helpers: constant, counter, generator, time
//! function, accumulator, filter and flow playback.

use serde::{Deserialize, Serialize};

use crate::dynamics::ModelDynamics;
use crate::error::{Error, SimResult};
use crate::list::{ListViewConst, EMPTY_LIST};
use crate::message::ObservationMessage;
use crate::simulation::{send_message, Simulation};
use crate::source::Source;
use crate::types::{InputPort, OutputPort, Real, Time};

/// Emits a fixed value once after an offset, then sleeps forever.
#[derive(Clone, Debug)]
pub struct Constant {
    pub y: [OutputPort; 1],
    pub default_value: Real,
    pub default_offset: Time,
    pub value: Real,
    pub sigma: Time,
}

impl Default for Constant {
    fn default() -> Self {
        Self {
            y: [EMPTY_LIST; 1],
            default_value: 0.0,
            default_offset: 0.0,
            value: 0.0,
            sigma: 0.0,
        }
    }
}

impl Constant {
    pub fn with(value: Real, offset: Time) -> Self {
        Self {
            default_value: value,
            default_offset: offset,
            ..Self::default()
        }
    }
}

impl ModelDynamics for Constant {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.sigma = self.default_offset;
        self.value = self.default_value;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        send_message(sim, &mut self.y[0], self.value, 0.0, 0.0)
    }

    fn transition(&mut self, _sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::from_value(self.value))
    }

    fn sigma(&self) -> Time {
        self.sigma
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.y
    }

    fn output_ports_mut(&mut self) -> &mut [OutputPort] {
        &mut self.y
    }
}

/// Counts every incoming message.
#[derive(Clone, Debug)]
pub struct Counter {
    pub x: [InputPort; 1],
    pub number: i64,
    pub sigma: Time,
}

impl Default for Counter {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 1],
            number: 0,
            sigma: 0.0,
        }
    }
}

impl ModelDynamics for Counter {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.number = 0;
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        self.number += ListViewConst::new(&sim.messages, self.x[0]).iter().count() as i64;
        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::from_value(self.number as Real))
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
}

/// Emits source-driven values with source-driven inter-arrival times.
#[derive(Clone, Debug)]
pub struct Generator {
    pub y: [OutputPort; 1],
    pub default_offset: Time,
    pub source_ta: Source,
    pub source_value: Source,
    pub stop_on_error: bool,
    pub value: Real,
    pub sigma: Time,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            y: [EMPTY_LIST; 1],
            default_offset: 0.0,
            source_ta: Source::default(),
            source_value: Source::default(),
            stop_on_error: false,
            value: 0.0,
            sigma: 0.0,
        }
    }
}

impl Generator {
    pub fn with(source_ta: Source, source_value: Source, offset: Time) -> Self {
        Self {
            default_offset: offset,
            source_ta,
            source_value,
            ..Self::default()
        }
    }
}

impl ModelDynamics for Generator {
    fn initialize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        self.sigma = self.default_offset;

        if self.stop_on_error {
            if !self.source_ta.is_bound() || !self.source_value.is_bound() {
                return Err(Error::GeneratorSourceNull);
            }

            sim.initialize_source(&mut self.source_ta)?;
            sim.initialize_source(&mut self.source_value)?;
        } else {
            let _ = sim.initialize_source(&mut self.source_ta);
            let _ = sim.initialize_source(&mut self.source_value);
        }

        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        send_message(sim, &mut self.y[0], self.value, 0.0, 0.0)
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        let mut next_sigma = 0.0;
        let mut next_value = 0.0;

        if self.stop_on_error {
            sim.update_source(&mut self.source_ta, &mut next_sigma)
                .map_err(|_| Error::GeneratorSourceEmpty)?;
            sim.update_source(&mut self.source_value, &mut next_value)
                .map_err(|_| Error::GeneratorSourceEmpty)?;
            self.sigma = next_sigma as Time;
            self.value = next_value as Real;
        } else {
            self.sigma = match sim.update_source(&mut self.source_ta, &mut next_sigma) {
                Ok(()) => next_sigma as Time,
                Err(_) => Time::INFINITY,
            };

            self.value = match sim.update_source(&mut self.source_value, &mut next_value) {
                Ok(()) => next_value as Real,
                Err(_) => 0.0,
            };
        }

        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::from_value(self.value))
    }

    fn finalize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        sim.finalize_source(&mut self.source_ta)?;
        sim.finalize_source(&mut self.source_value)?;
        Ok(())
    }

    fn sigma(&self) -> Time {
        self.sigma
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.y
    }

    fn output_ports_mut(&mut self) -> &mut [OutputPort] {
        &mut self.y
    }
}

/// Built-in time functions for [`TimeFunc`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeFunction {
    /// `f(t) = t`
    #[default]
    Time,
    /// `f(t) = t^2`
    Square,
    /// `f(t) = sin(2 pi 0.1 t)`
    Sine,
}

impl TimeFunction {
    pub fn eval(self, t: Time) -> Real {
        match self {
            Self::Time => t,
            Self::Square => t * t,
            Self::Sine => {
                const F0: Real = 0.1;
                const PI: Real = core::f64::consts::PI as Real;
                (2.0 * PI * F0 * t).sin()
            }
        }
    }
}

/// Samples `f(t)` at a fixed period.
#[derive(Clone, Debug)]
pub struct TimeFunc {
    pub y: [OutputPort; 1],
    pub default_sigma: Time,
    pub default_f: TimeFunction,
    pub value: Real,
    pub f: TimeFunction,
    pub sigma: Time,
}

impl Default for TimeFunc {
    fn default() -> Self {
        Self {
            y: [EMPTY_LIST; 1],
            default_sigma: 0.01,
            default_f: TimeFunction::Time,
            value: 0.0,
            f: TimeFunction::Time,
            sigma: 0.0,
        }
    }
}

impl TimeFunc {
    pub fn with(f: TimeFunction, sigma: Time) -> Self {
        Self {
            default_sigma: sigma,
            default_f: f,
            ..Self::default()
        }
    }
}

impl ModelDynamics for TimeFunc {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.f = self.default_f;
        self.sigma = self.default_sigma;
        self.value = 0.0;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        send_message(sim, &mut self.y[0], self.value, 0.0, 0.0)
    }

    fn transition(&mut self, _sim: &mut Simulation, t: Time, _e: Time, _r: Time) -> SimResult<()> {
        self.value = self.f.eval(t);
        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::from_value(self.value))
    }

    fn sigma(&self) -> Time {
        self.sigma
    }

    fn output_ports(&self) -> &[OutputPort] {
        &self.y
    }

    fn output_ports_mut(&mut self) -> &mut [OutputPort] {
        &mut self.y
    }
}

/// Adds `value * weight` whenever the paired weight port fires.
///
/// Ports 0..2 carry values, ports 2..4 the matching weights.
#[derive(Clone, Debug)]
pub struct Accumulator2 {
    pub x: [InputPort; 4],
    pub number: Real,
    pub numbers: [Real; 2],
    pub sigma: Time,
}

impl Default for Accumulator2 {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 4],
            number: 0.0,
            numbers: [0.0; 2],
            sigma: 0.0,
        }
    }
}

impl ModelDynamics for Accumulator2 {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.number = 0.0;
        self.numbers = [0.0; 2];
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        for i in 0..2 {
            if self.x[i + 2] != EMPTY_LIST {
                if let Some(msg) = ListViewConst::new(&sim.messages, self.x[i + 2]).front() {
                    self.numbers[i] = msg[0];
                }
            }
        }

        for i in 0..2 {
            if self.x[i] != EMPTY_LIST {
                if let Some(msg) = ListViewConst::new(&sim.messages, self.x[i]).front() {
                    if msg[0] != 0.0 {
                        self.number += self.numbers[i];
                    }
                }
            }
        }

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
}

/// Passes through values lying inside an open band, substituting message
/// components that fall outside it.
#[derive(Clone, Debug)]
pub struct Filter {
    pub x: [InputPort; 1],
    pub y: [OutputPort; 1],
    pub default_lower_threshold: Real,
    pub default_upper_threshold: Real,
    pub lower_threshold: Real,
    pub upper_threshold: Real,
    pub in_value: Real,
    pub sigma: Time,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 1],
            y: [EMPTY_LIST; 1],
            default_lower_threshold: -0.5,
            default_upper_threshold: 0.5,
            lower_threshold: -0.5,
            upper_threshold: 0.5,
            in_value: 0.0,
            sigma: Time::INFINITY,
        }
    }
}

impl Filter {
    pub fn with(lower: Real, upper: Real) -> Self {
        Self {
            default_lower_threshold: lower,
            default_upper_threshold: upper,
            ..Self::default()
        }
    }
}

impl ModelDynamics for Filter {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        if self.default_lower_threshold >= self.default_upper_threshold {
            return Err(Error::FilterThresholdInvalid);
        }

        self.sigma = Time::INFINITY;
        self.lower_threshold = self.default_lower_threshold;
        self.upper_threshold = self.default_upper_threshold;

        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        send_message(sim, &mut self.y[0], self.in_value, 0.0, 0.0)
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        self.sigma = Time::INFINITY;

        let port = self.x[0];
        let messages: Vec<crate::message::Message> =
            ListViewConst::new(&sim.messages, port).iter().copied().collect();

        for msg in messages {
            if msg[0] > self.lower_threshold && msg[0] < self.upper_threshold {
                self.in_value = msg[0];
            } else if msg[1] > self.lower_threshold && msg[1] < self.upper_threshold {
                self.in_value = msg[1];
            } else {
                self.in_value = msg[2];
            }

            self.sigma = 0.0;
        }

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

/// Plays back a pre-loaded `(data, sigma)` table indexed by accumulated
/// time at a given sample rate.
#[derive(Clone, Debug)]
pub struct Flow {
    pub y: [OutputPort; 1],
    pub default_samplerate: Real,
    pub default_data: Vec<Real>,
    pub default_sigmas: Vec<Real>,
    pub accu_sigma: Real,
    pub index: usize,
    pub sigma: Time,
}

impl Default for Flow {
    fn default() -> Self {
        Self {
            y: [EMPTY_LIST; 1],
            default_samplerate: 44100.0,
            default_data: Vec::new(),
            default_sigmas: Vec::new(),
            accu_sigma: 0.0,
            index: 0,
            sigma: 0.0,
        }
    }
}

impl Flow {
    pub fn with(samplerate: Real, data: Vec<Real>, sigmas: Vec<Real>) -> Self {
        Self {
            default_samplerate: samplerate,
            default_data: data,
            default_sigmas: sigmas,
            ..Self::default()
        }
    }
}

impl ModelDynamics for Flow {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        if self.default_samplerate <= 0.0 {
            return Err(Error::FlowBadSampleRate);
        }

        if self.default_data.len() <= 1
            || self.default_sigmas.len() != self.default_data.len()
        {
            return Err(Error::FlowBadData);
        }

        self.sigma = 1.0 / self.default_samplerate;
        self.accu_sigma = 0.0;
        self.index = 0;

        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let value = self.default_data[self.index];
        send_message(sim, &mut self.y[0], value, 0.0, 0.0)
    }

    fn transition(&mut self, _sim: &mut Simulation, t: Time, _e: Time, _r: Time) -> SimResult<()> {
        while self.index < self.default_sigmas.len() {
            self.accu_sigma += self.default_sigmas[self.index];

            if self.accu_sigma > t {
                self.sigma = self.default_sigmas[self.index];
                return Ok(());
            }

            self.index += 1;
        }

        self.sigma = Time::INFINITY;
        self.index = self.default_data.len() - 1;

        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::from_value(self.default_data[self.index]))
    }

    fn sigma(&self) -> Time {
        self.sigma
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
    fn test_constant_emits_once() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut constant = Constant::with(3.0, 2.0);
        constant.initialize(&mut sim).unwrap();
        assert_eq!(constant.sigma, 2.0);

        constant.transition(&mut sim, 2.0, 2.0, 0.0).unwrap();
        assert!(constant.sigma.is_infinite());
    }

    #[test]
    fn test_time_function_eval() {
        assert_eq!(TimeFunction::Time.eval(3.0), 3.0);
        assert_eq!(TimeFunction::Square.eval(3.0), 9.0);
        assert!(TimeFunction::Sine.eval(0.0).abs() < 1e-9);
    }

    #[test]
    fn test_filter_rejects_inverted_band() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut filter = Filter::with(1.0, -1.0);
        assert_eq!(
            filter.initialize(&mut sim),
            Err(Error::FilterThresholdInvalid)
        );
    }

    #[test]
    fn test_flow_rejects_bad_tables() {
        let mut sim = Simulation::new(4, 16).unwrap();

        let mut flow = Flow::with(0.0, vec![1.0, 2.0], vec![0.1, 0.1]);
        assert_eq!(flow.initialize(&mut sim), Err(Error::FlowBadSampleRate));

        let mut flow = Flow::with(100.0, vec![1.0], vec![0.1]);
        assert_eq!(flow.initialize(&mut sim), Err(Error::FlowBadData));
    }

    #[test]
    fn test_generator_silently_sleeps_without_sources() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut generator = Generator::default();
        generator.initialize(&mut sim).unwrap();

        generator.transition(&mut sim, 0.0, 0.0, 0.0).unwrap();
        assert!(generator.sigma.is_infinite());
        assert_eq!(generator.value, 0.0);
    }

    #[test]
    fn test_generator_strict_requires_sources() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut generator = Generator::default();
        generator.stop_on_error = true;
        assert_eq!(
            generator.initialize(&mut sim),
            Err(Error::GeneratorSourceNull)
        );
    }
}
