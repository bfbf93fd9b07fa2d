//! First-generation DEVS blocks: the adaptive integrator/quantifier pair
//! and the plain adder, multiplier and threshold detector.
//!
//! The adaptive integrator consumes quanta from a quantifier on a
//! dedicated port and integrates a piecewise-constant derivative archive
//! between threshold crossings. The quantifier watches the integrator's
//! output and re-emits a `(up, down)` threshold band, optionally shifting
//! the band when the derivative oscillates.

use crate::dynamics::ModelDynamics;
use crate::error::{Error, SimResult};
use crate::list::{ListView, ListViewConst, EMPTY_LIST};
use crate::message::{ObservationMessage, Record};
use crate::simulation::{send_message, Simulation};
use crate::types::{InputPort, OutputPort, Real, Time};

pub const PORT_QUANTA: usize = 0;
pub const PORT_X_DOT: usize = 1;
pub const PORT_RESET: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IntegratorState {
    Init,
    WaitForQuanta,
    WaitForXDot,
    WaitForBoth,
    Running,
}

/// Adaptive integrator driven by an external quantifier.
#[derive(Clone, Debug)]
pub struct Integrator {
    pub x: [InputPort; 3],
    pub y: [OutputPort; 1],
    pub default_current_value: Real,
    pub default_reset_value: Real,
    pub archive: u64,
    pub current_value: Real,
    pub reset_value: Real,
    pub up_threshold: Real,
    pub down_threshold: Real,
    pub last_output_value: Real,
    pub expected_value: Real,
    pub reset: bool,
    st: IntegratorState,
    pub sigma: Time,
}

impl Default for Integrator {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 3],
            y: [EMPTY_LIST; 1],
            default_current_value: 0.0,
            default_reset_value: 0.0,
            archive: EMPTY_LIST,
            current_value: 0.0,
            reset_value: 0.0,
            up_threshold: 0.0,
            down_threshold: 0.0,
            last_output_value: 0.0,
            expected_value: 0.0,
            reset: false,
            st: IntegratorState::Init,
            sigma: 0.0,
        }
    }
}

impl Integrator {
    pub fn with(current_value: Real, reset_value: Real) -> Self {
        Self {
            default_current_value: current_value,
            default_reset_value: reset_value,
            ..Self::default()
        }
    }

    fn external(&mut self, sim: &mut Simulation, t: Time) -> SimResult<()> {
        if self.x[PORT_QUANTA] != EMPTY_LIST {
            for msg in ListViewConst::new(&sim.messages, self.x[PORT_QUANTA]).iter() {
                self.up_threshold = msg[0];
                self.down_threshold = msg[1];

                if self.st == IntegratorState::WaitForQuanta {
                    self.st = IntegratorState::Running;
                }

                if self.st == IntegratorState::WaitForBoth {
                    self.st = IntegratorState::WaitForXDot;
                }
            }
        }

        if self.x[PORT_X_DOT] != EMPTY_LIST {
            let port = self.x[PORT_X_DOT];
            let mut derivatives = Vec::new();
            for msg in ListViewConst::new(&sim.messages, port).iter() {
                derivatives.push(msg[0]);
            }

            let mut archive = ListView::new(&mut sim.records, &mut self.archive);
            for x_dot in derivatives {
                archive.push_back(Record::new(x_dot, t));

                if self.st == IntegratorState::WaitForXDot {
                    self.st = IntegratorState::Running;
                }

                if self.st == IntegratorState::WaitForBoth {
                    self.st = IntegratorState::WaitForQuanta;
                }
            }
        }

        if self.x[PORT_RESET] != EMPTY_LIST {
            for msg in ListViewConst::new(&sim.messages, self.x[PORT_RESET]).iter() {
                self.reset_value = msg[0];
                self.reset = true;
            }
        }

        if self.st == IntegratorState::Running {
            self.current_value = self.compute_current_value(sim, t);
            self.expected_value = self.compute_expected_value(sim);
        }

        Ok(())
    }

    fn internal(&mut self, sim: &mut Simulation, t: Time) -> SimResult<()> {
        match self.st {
            IntegratorState::Running => {
                self.last_output_value = self.expected_value;

                let mut archive = ListView::new(&mut sim.records, &mut self.archive);
                let last_derivative = match archive.back() {
                    Some(record) => record.x_dot,
                    None => return Err(Error::IntegratorInternal),
                };
                archive.clear();
                archive.push_back(Record::new(last_derivative, t));

                self.current_value = self.expected_value;
                self.st = IntegratorState::WaitForQuanta;
                Ok(())
            }
            IntegratorState::Init => {
                self.st = IntegratorState::WaitForBoth;
                self.last_output_value = self.current_value;
                Ok(())
            }
            _ => Err(Error::IntegratorInternal),
        }
    }

    fn ta(&mut self, sim: &Simulation) -> SimResult<()> {
        if self.st == IntegratorState::Running {
            if self.archive == EMPTY_LIST {
                return Err(Error::IntegratorRunningWithoutXDot);
            }

            let archive = ListViewConst::new(&sim.records, self.archive);
            let current_derivative = match archive.back() {
                Some(record) => record.x_dot,
                None => return Err(Error::IntegratorRunningWithoutXDot),
            };

            if current_derivative == 0.0 {
                self.sigma = Time::INFINITY;
                return Ok(());
            }

            if current_derivative > 0.0 {
                if self.up_threshold - self.current_value < 0.0 {
                    return Err(Error::IntegratorBadXDot);
                }

                self.sigma = (self.up_threshold - self.current_value) / current_derivative;
                return Ok(());
            }

            if self.down_threshold - self.current_value > 0.0 {
                return Err(Error::IntegratorBadXDot);
            }

            self.sigma = (self.down_threshold - self.current_value) / current_derivative;
            return Ok(());
        }

        self.sigma = Time::INFINITY;
        Ok(())
    }

    /// Integrates the archived piecewise-constant derivative up to `t`,
    /// clamped to the threshold band.
    fn compute_current_value(&self, sim: &Simulation, t: Time) -> Real {
        if self.archive == EMPTY_LIST {
            return if self.reset {
                self.reset_value
            } else {
                self.last_output_value
            };
        }

        let archive = ListViewConst::new(&sim.records, self.archive);
        let mut value = if self.reset {
            self.reset_value
        } else {
            self.last_output_value
        };

        let mut iter = archive.iter().peekable();
        let mut last = None;
        while let Some(record) = iter.next() {
            match iter.peek() {
                Some(next) => value += (next.date - record.date) * record.x_dot,
                None => last = Some(*record),
            }
        }

        if let Some(record) = last {
            value += (t - record.date) * record.x_dot;
        }

        if self.up_threshold < value {
            self.up_threshold
        } else if self.down_threshold > value {
            self.down_threshold
        } else {
            value
        }
    }

    fn compute_expected_value(&self, sim: &Simulation) -> Real {
        let archive = ListViewConst::new(&sim.records, self.archive);
        let current_derivative = archive.back().map_or(0.0, |record| record.x_dot);

        if current_derivative == 0.0 {
            self.current_value
        } else if current_derivative > 0.0 {
            self.up_threshold
        } else {
            self.down_threshold
        }
    }
}

impl ModelDynamics for Integrator {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.current_value = self.default_current_value;
        self.reset_value = self.default_reset_value;
        self.up_threshold = 0.0;
        self.down_threshold = 0.0;
        self.last_output_value = 0.0;
        self.expected_value = 0.0;
        self.reset = false;
        self.st = IntegratorState::Init;
        self.archive = EMPTY_LIST;
        self.sigma = 0.0;

        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        match self.st {
            IntegratorState::Running => {
                send_message(sim, &mut self.y[0], self.expected_value, 0.0, 0.0)
            }
            IntegratorState::Init => {
                send_message(sim, &mut self.y[0], self.current_value, 0.0, 0.0)
            }
            _ => Err(Error::IntegratorOutput),
        }
    }

    fn transition(&mut self, sim: &mut Simulation, t: Time, _e: Time, r: Time) -> SimResult<()> {
        let quiet = self.x[PORT_QUANTA] == EMPTY_LIST
            && self.x[PORT_X_DOT] == EMPTY_LIST
            && self.x[PORT_RESET] == EMPTY_LIST;

        if quiet {
            self.internal(sim, t)?;
        } else {
            if r == 0.0 {
                self.internal(sim, t)?;
            }

            self.external(sim, t)?;
        }

        self.ta(sim)
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::from_value(self.last_output_value))
    }

    fn finalize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        ListView::new(&mut sim.records, &mut self.archive).clear();
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

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum QuantifierState {
    #[default]
    Init,
    Idle,
    Response,
}

/// Threshold-band adaptation policy of the [`Quantifier`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdaptState {
    Impossible,
    #[default]
    Possible,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Change detector driving a quantized-state band around its input.
#[derive(Clone, Debug)]
pub struct Quantifier {
    pub x: [InputPort; 1],
    pub y: [OutputPort; 1],
    pub default_step_size: Real,
    pub default_past_length: i32,
    pub default_adapt_state: AdaptState,
    pub default_zero_init_offset: bool,
    pub archive: u64,
    pub archive_length: i32,
    up_threshold: Real,
    down_threshold: Real,
    offset: Real,
    step_size: Real,
    step_number: i32,
    past_length: i32,
    zero_init_offset: bool,
    state: QuantifierState,
    adapt_state: AdaptState,
    pub sigma: Time,
}

impl Default for Quantifier {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 1],
            y: [EMPTY_LIST; 1],
            default_step_size: 0.001,
            default_past_length: 3,
            default_adapt_state: AdaptState::Possible,
            default_zero_init_offset: false,
            archive: EMPTY_LIST,
            archive_length: 0,
            up_threshold: 0.0,
            down_threshold: 0.0,
            offset: 0.0,
            step_size: 0.0,
            step_number: 0,
            past_length: 0,
            zero_init_offset: false,
            state: QuantifierState::Init,
            adapt_state: AdaptState::Possible,
            sigma: Time::INFINITY,
        }
    }
}

impl Quantifier {
    pub fn with(step_size: Real, past_length: i32) -> Self {
        Self {
            default_step_size: step_size,
            default_past_length: past_length,
            ..Self::default()
        }
    }

    fn external(&mut self, sim: &mut Simulation, t: Time) -> SimResult<()> {
        let value = {
            let span = ListViewConst::new(&sim.messages, self.x[0]);
            let mut sum = 0.0;
            let mut count = 0.0;

            for msg in span.iter() {
                sum += msg[0];
                count += 1.0;
            }

            sum / count
        };

        if self.state == QuantifierState::Init {
            self.init_step_number_and_offset(value);
            self.update_thresholds();
            self.state = QuantifierState::Response;
            return Ok(());
        }

        while value >= self.up_threshold || value <= self.down_threshold {
            self.step_number += if value >= self.up_threshold { 1 } else { -1 };

            match self.adapt_state {
                AdaptState::Impossible => self.update_thresholds(),
                AdaptState::Possible => {
                    let change = if value >= self.up_threshold {
                        self.step_size
                    } else {
                        -self.step_size
                    };
                    self.store_change(sim, change, t);

                    let shifting_factor = self.shift_quanta(sim);

                    if shifting_factor < 0.0 {
                        return Err(Error::QuantifierShiftingNeg);
                    }
                    if shifting_factor > 1.0 {
                        return Err(Error::QuantifierShiftingOver1);
                    }

                    if shifting_factor != 0.0 && shifting_factor != 1.0 {
                        let direction = if value >= self.up_threshold {
                            Direction::Down
                        } else {
                            Direction::Up
                        };
                        self.update_thresholds_shifted(shifting_factor, direction);
                        self.adapt_state = AdaptState::Done;
                    } else {
                        self.update_thresholds();
                    }
                }
                AdaptState::Done => {
                    self.init_step_number_and_offset(value);
                    self.adapt_state = AdaptState::Possible;
                    self.update_thresholds();
                }
            }
        }

        self.state = QuantifierState::Response;
        Ok(())
    }

    fn internal(&mut self) {
        if self.state == QuantifierState::Response {
            self.state = QuantifierState::Idle;
        }
    }

    fn ta(&mut self) {
        self.sigma = if self.state == QuantifierState::Response {
            0.0
        } else {
            Time::INFINITY
        };
    }

    fn update_thresholds(&mut self) {
        let step_number = self.step_number as Real;
        self.up_threshold = self.offset + self.step_size * (step_number + 1.0);
        self.down_threshold = self.offset + self.step_size * (step_number - 1.0);
    }

    fn update_thresholds_shifted(&mut self, factor: Real, direction: Direction) {
        let step_number = self.step_number as Real;

        match direction {
            Direction::Up => {
                self.up_threshold = self.offset + self.step_size * (step_number + (1.0 - factor));
                self.down_threshold = self.offset + self.step_size * (step_number - 1.0);
            }
            Direction::Down => {
                self.up_threshold = self.offset + self.step_size * (step_number + 1.0);
                self.down_threshold =
                    self.offset + self.step_size * (step_number - (1.0 - factor));
            }
        }
    }

    fn init_step_number_and_offset(&mut self, value: Real) {
        self.step_number = (value / self.step_size).floor() as i32;

        self.offset = if self.zero_init_offset {
            0.0
        } else {
            value - self.step_number as Real * self.step_size
        };
    }

    /// Oscillation-adaptive shifting factor: the mean of the date-ratio
    /// estimates over consecutive archive triples, taken only when the
    /// archived derivative alternates sign over the whole window.
    fn shift_quanta(&mut self, sim: &mut Simulation) -> Real {
        let mut factor = 0.0;

        if self.oscillating(sim, self.past_length - 1) {
            let samples: Vec<Record> = ListViewConst::new(&sim.records, self.archive)
                .iter()
                .copied()
                .collect();

            let (Some(first), Some(last)) = (samples.first().copied(), samples.last().copied())
            else {
                return 0.0;
            };

            if last.date - first.date != 0.0 {
                let mut acc = 0.0;
                let mut count = 0.0;

                for window in samples.windows(3) {
                    let (r0, r1, r2) = (window[0], window[1], window[2]);
                    if r2.date - r0.date != 0.0 {
                        let local_estim = if last.x_dot * r1.x_dot > 0.0 {
                            1.0 - (r1.date - r0.date) / (r2.date - r0.date)
                        } else {
                            (r1.date - r0.date) / (r2.date - r0.date)
                        };

                        acc += local_estim;
                        count += 1.0;
                    }
                }

                if count > 0.0 {
                    factor = acc / count;
                    ListView::new(&mut sim.records, &mut self.archive).clear();
                    self.archive_length = 0;
                }
            }
        }

        factor
    }

    fn store_change(&mut self, sim: &mut Simulation, value: Real, t: Time) {
        let mut archive = ListView::new(&mut sim.records, &mut self.archive);
        archive.push_back(Record::new(value, t));
        self.archive_length += 1;

        while self.archive_length > self.past_length {
            archive.pop_front();
            self.archive_length -= 1;
        }
    }

    fn oscillating(&self, sim: &Simulation, range: i32) -> bool {
        if range + 1 > self.archive_length {
            return false;
        }

        let archive = ListViewConst::new(&sim.records, self.archive);
        let samples: Vec<Record> = archive.iter().copied().collect();
        let start = samples.len().saturating_sub(range as usize + 1);

        samples[start..]
            .windows(2)
            .all(|pair| pair[0].x_dot * pair[1].x_dot <= 0.0)
    }
}

impl ModelDynamics for Quantifier {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.step_size = self.default_step_size;
        self.past_length = self.default_past_length;
        self.zero_init_offset = self.default_zero_init_offset;
        self.adapt_state = self.default_adapt_state;
        self.up_threshold = 0.0;
        self.down_threshold = 0.0;
        self.offset = 0.0;
        self.step_number = 0;
        self.archive = EMPTY_LIST;
        self.archive_length = 0;
        self.state = QuantifierState::Init;

        if self.step_size <= 0.0 {
            return Err(Error::QuantifierBadQuantum);
        }

        if self.past_length <= 2 {
            return Err(Error::QuantifierBadArchiveLength);
        }

        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        send_message(
            sim,
            &mut self.y[0],
            self.up_threshold,
            self.down_threshold,
            0.0,
        )
    }

    fn transition(&mut self, sim: &mut Simulation, t: Time, _e: Time, r: Time) -> SimResult<()> {
        if self.x[0] == EMPTY_LIST {
            self.internal();
        } else {
            if r == 0.0 {
                self.internal();
            }

            self.external(sim, t)?;
        }

        self.ta();
        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::new(
            self.up_threshold,
            self.down_threshold,
            0.0,
            0.0,
        ))
    }

    fn finalize(&mut self, sim: &mut Simulation) -> SimResult<()> {
        ListView::new(&mut sim.records, &mut self.archive).clear();
        self.archive_length = 0;
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

/// Linear combination of `N` inputs with per-port coefficients.
#[derive(Clone, Debug)]
pub struct Adder<const N: usize> {
    pub x: [InputPort; N],
    pub y: [OutputPort; 1],
    pub default_values: [Real; N],
    pub default_input_coeffs: [Real; N],
    pub values: [Real; N],
    pub input_coeffs: [Real; N],
    pub sigma: Time,
}

impl<const N: usize> Default for Adder<N> {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; N],
            y: [EMPTY_LIST; 1],
            default_values: [1.0 / N as Real; N],
            default_input_coeffs: [0.0; N],
            values: [0.0; N],
            input_coeffs: [0.0; N],
            sigma: 0.0,
        }
    }
}

impl<const N: usize> ModelDynamics for Adder<N> {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.values = self.default_values;
        self.input_coeffs = self.default_input_coeffs;
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let mut to_send = 0.0;
        for i in 0..N {
            to_send += self.input_coeffs[i] * self.values[i];
        }

        send_message(sim, &mut self.y[0], to_send, 0.0, 0.0)
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        let mut fired = false;

        for i in 0..N {
            for msg in ListViewConst::new(&sim.messages, self.x[i]).iter() {
                self.values[i] = msg[0];
                fired = true;
            }
        }

        self.sigma = if fired { 0.0 } else { Time::INFINITY };
        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        let mut out = 0.0;
        for i in 0..N {
            out += self.input_coeffs[i] * self.values[i];
        }
        Some(ObservationMessage::from_value(out))
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

/// Product of `N` inputs, each raised to a per-port exponent.
#[derive(Clone, Debug)]
pub struct Mult<const N: usize> {
    pub x: [InputPort; N],
    pub y: [OutputPort; 1],
    pub default_values: [Real; N],
    pub default_input_coeffs: [Real; N],
    pub values: [Real; N],
    pub input_coeffs: [Real; N],
    pub sigma: Time,
}

impl<const N: usize> Default for Mult<N> {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; N],
            y: [EMPTY_LIST; 1],
            default_values: [1.0; N],
            default_input_coeffs: [0.0; N],
            values: [0.0; N],
            input_coeffs: [0.0; N],
            sigma: 0.0,
        }
    }
}

impl<const N: usize> ModelDynamics for Mult<N> {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.values = self.default_values;
        self.input_coeffs = self.default_input_coeffs;
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let mut to_send = 1.0;
        for i in 0..N {
            to_send *= self.values[i].powf(self.input_coeffs[i]);
        }

        send_message(sim, &mut self.y[0], to_send, 0.0, 0.0)
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        let mut fired = false;

        for i in 0..N {
            for msg in ListViewConst::new(&sim.messages, self.x[i]).iter() {
                self.values[i] = msg[0];
                fired = true;
            }
        }

        self.sigma = if fired { 0.0 } else { Time::INFINITY };
        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        let mut out = 1.0;
        for i in 0..N {
            out *= self.values[i].powf(self.input_coeffs[i]);
        }
        Some(ObservationMessage::from_value(out))
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

/// First-generation threshold detector: compares the latest value sample
/// against the threshold and selects the if/else branch instantly.
#[derive(Clone, Debug)]
pub struct Cross {
    pub x: [InputPort; 4],
    pub y: [OutputPort; 2],
    pub default_threshold: Real,
    pub threshold: Real,
    pub value: Real,
    pub if_value: Real,
    pub else_value: Real,
    pub result: Real,
    pub event: Real,
    pub sigma: Time,
}

pub const CROSS_OUT_RESULT: usize = 0;
pub const CROSS_OUT_EVENT: usize = 1;

impl Default for Cross {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 4],
            y: [EMPTY_LIST; 2],
            default_threshold: 0.0,
            threshold: 0.0,
            value: 0.0,
            if_value: 0.0,
            else_value: 0.0,
            result: 0.0,
            event: 0.0,
            sigma: 0.0,
        }
    }
}

impl ModelDynamics for Cross {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.threshold = self.default_threshold;
        self.value = self.threshold - 1.0;
        self.if_value = 0.0;
        self.else_value = 0.0;
        self.result = 0.0;
        self.event = 0.0;
        self.sigma = 0.0;

        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        send_message(sim, &mut self.y[CROSS_OUT_RESULT], self.result, 0.0, 0.0)?;
        send_message(sim, &mut self.y[CROSS_OUT_EVENT], self.event, 0.0, 0.0)?;
        Ok(())
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        let mut fired = false;
        let mut value_fired = false;
        self.event = 0.0;

        for msg in ListViewConst::new(&sim.messages, self.x[super::qss_cross::PORT_THRESHOLD]).iter()
        {
            self.threshold = msg[0];
            fired = true;
        }

        for msg in ListViewConst::new(&sim.messages, self.x[super::qss_cross::PORT_VALUE]).iter() {
            self.value = msg[0];
            value_fired = true;
            fired = true;
        }

        for msg in ListViewConst::new(&sim.messages, self.x[super::qss_cross::PORT_IF_VALUE]).iter()
        {
            self.if_value = msg[0];
            fired = true;
        }

        for msg in
            ListViewConst::new(&sim.messages, self.x[super::qss_cross::PORT_ELSE_VALUE]).iter()
        {
            self.else_value = msg[0];
            fired = true;
        }

        if value_fired {
            self.event = 0.0;
            if self.value >= self.threshold {
                self.else_value = self.if_value;
                self.event = 1.0;
            }
        }

        self.result = self.else_value;
        self.sigma = if fired { 0.0 } else { Time::INFINITY };

        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::new(
            self.value,
            self.if_value,
            self.else_value,
            0.0,
        ))
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

pub type Adder2 = Adder<2>;
pub type Adder3 = Adder<3>;
pub type Adder4 = Adder<4>;

pub type Mult2 = Mult<2>;
pub type Mult3 = Mult<3>;
pub type Mult4 = Mult<4>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantifier_rejects_bad_parameters() {
        let mut sim = Simulation::new(4, 16).unwrap();

        let mut q = Quantifier::with(0.0, 3);
        assert_eq!(q.initialize(&mut sim), Err(Error::QuantifierBadQuantum));

        let mut q = Quantifier::with(0.1, 2);
        assert_eq!(
            q.initialize(&mut sim),
            Err(Error::QuantifierBadArchiveLength)
        );
    }

    #[test]
    fn test_quantifier_thresholds_bracket_value() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut q = Quantifier::with(0.5, 3);
        q.initialize(&mut sim).unwrap();

        q.init_step_number_and_offset(1.3);
        q.step_size = 0.5;
        q.update_thresholds();

        assert!(q.up_threshold > 1.3);
        assert!(q.down_threshold < 1.3);
    }

    #[test]
    fn test_adder_combination() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut adder = Adder2::default();
        adder.default_input_coeffs = [1.0, 2.0];
        adder.default_values = [3.0, 4.0];
        adder.initialize(&mut sim).unwrap();

        let obs = adder.observation(0.0).unwrap();
        assert_eq!(obs[0], 3.0 + 2.0 * 4.0);
    }

    #[test]
    fn test_mult_power_combination() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut mult = Mult2::default();
        mult.default_values = [2.0, 3.0];
        mult.default_input_coeffs = [2.0, 1.0];
        mult.initialize(&mut sim).unwrap();

        let obs = mult.observation(0.0).unwrap();
        assert_eq!(obs[0], 4.0 * 3.0);
    }

    #[test]
    fn test_integrator_initialize_state() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut integ = Integrator::with(5.0, 0.0);
        integ.initialize(&mut sim).unwrap();

        assert_eq!(integ.current_value, 5.0);
        assert_eq!(integ.sigma, 0.0);
        assert_eq!(integ.archive, EMPTY_LIST);
    }

    #[test]
    fn test_legacy_cross_selects_branch() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut cross = Cross::default();
        cross.default_threshold = 1.0;
        cross.initialize(&mut sim).unwrap();

        // No inputs: quiet transition goes idle.
        cross.transition(&mut sim, 0.0, 0.0, 0.0).unwrap();
        assert!(cross.sigma.is_infinite());
    }
}
