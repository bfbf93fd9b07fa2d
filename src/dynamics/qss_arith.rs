//! Quantized-state arithmetic blocks: sums, weighted sums, multipliers,
//! powers and squares at orders 1, 2 and 3.
//!
//! Each block keeps one `[value, slope, curvature]` slice per input port.
//! A transition overwrites the slices of ports that fired and advances the
//! stale slices by their stored derivatives over the elapsed time; `sigma`
//! is zero iff any input fired, so the block emits immediately after every
//! input change and sleeps otherwise.

use crate::dynamics::ModelDynamics;
use crate::error::SimResult;
use crate::list::{ListViewConst, EMPTY_LIST};
use crate::message::ObservationMessage;
use crate::simulation::{send_message, Simulation};
use crate::types::{InputPort, OutputPort, Real, Time};

/// Per-port coefficient slice: `[value, slope, curvature]`.
type Slice = [Real; 3];

fn advance<const ORDER: usize>(slice: &mut Slice, e: Time) {
    if ORDER >= 2 {
        slice[0] += slice[1] * e;
    }
    if ORDER == 3 {
        slice[0] += slice[2] * e * e;
        slice[1] += 2.0 * slice[2] * e;
    }
}

fn refresh<const ORDER: usize>(slice: &mut Slice, msg: &crate::message::Message) {
    slice[0] = msg[0];
    if ORDER >= 2 {
        slice[1] = msg[1];
    }
    if ORDER == 3 {
        slice[2] = msg[2];
    }
}

/// Unweighted sum of `N` inputs.
#[derive(Clone, Debug)]
pub struct QssSum<const ORDER: usize, const N: usize> {
    pub x: [InputPort; N],
    pub y: [OutputPort; 1],
    pub values: [Slice; N],
    pub sigma: Time,
}

impl<const ORDER: usize, const N: usize> Default for QssSum<ORDER, N> {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; N],
            y: [EMPTY_LIST; 1],
            values: [[0.0; 3]; N],
            sigma: 0.0,
        }
    }
}

impl<const ORDER: usize, const N: usize> QssSum<ORDER, N> {
    fn combined(&self) -> Slice {
        let mut out = [0.0; 3];
        for slice in &self.values {
            out[0] += slice[0];
            out[1] += slice[1];
            out[2] += slice[2];
        }
        out
    }
}

impl<const ORDER: usize, const N: usize> ModelDynamics for QssSum<ORDER, N> {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.values = [[0.0; 3]; N];
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let out = self.combined();
        match ORDER {
            1 => send_message(sim, &mut self.y[0], out[0], 0.0, 0.0),
            2 => send_message(sim, &mut self.y[0], out[0], out[1], 0.0),
            _ => send_message(sim, &mut self.y[0], out[0], out[1], out[2]),
        }
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, e: Time, _r: Time) -> SimResult<()> {
        let mut fired = false;

        for i in 0..N {
            if self.x[i] == EMPTY_LIST {
                advance::<ORDER>(&mut self.values[i], e);
            } else {
                for msg in ListViewConst::new(&sim.messages, self.x[i]).iter() {
                    refresh::<ORDER>(&mut self.values[i], msg);
                    fired = true;
                }
            }
        }

        self.sigma = if fired { 0.0 } else { Time::INFINITY };
        Ok(())
    }

    fn observation(&self, e: Time) -> Option<ObservationMessage> {
        let mut value = 0.0;
        for slice in &self.values {
            value += slice[0];
            if ORDER >= 2 {
                value += slice[1] * e;
            }
            if ORDER == 3 {
                value += slice[2] * e * e;
            }
        }
        Some(ObservationMessage::from_value(value))
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

/// Weighted sum of `N` inputs with fixed coefficients.
#[derive(Clone, Debug)]
pub struct QssWsum<const ORDER: usize, const N: usize> {
    pub x: [InputPort; N],
    pub y: [OutputPort; 1],
    pub default_input_coeffs: [Real; N],
    pub values: [Slice; N],
    pub sigma: Time,
}

impl<const ORDER: usize, const N: usize> Default for QssWsum<ORDER, N> {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; N],
            y: [EMPTY_LIST; 1],
            default_input_coeffs: [0.0; N],
            values: [[0.0; 3]; N],
            sigma: 0.0,
        }
    }
}

impl<const ORDER: usize, const N: usize> QssWsum<ORDER, N> {
    pub fn with(coeffs: [Real; N]) -> Self {
        Self {
            default_input_coeffs: coeffs,
            ..Self::default()
        }
    }

    fn combined(&self) -> Slice {
        let mut out = [0.0; 3];
        for (slice, coeff) in self.values.iter().zip(&self.default_input_coeffs) {
            out[0] += coeff * slice[0];
            out[1] += coeff * slice[1];
            out[2] += coeff * slice[2];
        }
        out
    }
}

impl<const ORDER: usize, const N: usize> ModelDynamics for QssWsum<ORDER, N> {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.values = [[0.0; 3]; N];
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let out = self.combined();
        match ORDER {
            1 => send_message(sim, &mut self.y[0], out[0], 0.0, 0.0),
            2 => send_message(sim, &mut self.y[0], out[0], out[1], 0.0),
            _ => send_message(sim, &mut self.y[0], out[0], out[1], out[2]),
        }
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, e: Time, _r: Time) -> SimResult<()> {
        let mut fired = false;

        for i in 0..N {
            if self.x[i] == EMPTY_LIST {
                advance::<ORDER>(&mut self.values[i], e);
            } else {
                for msg in ListViewConst::new(&sim.messages, self.x[i]).iter() {
                    refresh::<ORDER>(&mut self.values[i], msg);
                    fired = true;
                }
            }
        }

        self.sigma = if fired { 0.0 } else { Time::INFINITY };
        Ok(())
    }

    fn observation(&self, e: Time) -> Option<ObservationMessage> {
        let mut value = 0.0;
        for (slice, coeff) in self.values.iter().zip(&self.default_input_coeffs) {
            value += coeff * slice[0];
            if ORDER >= 2 {
                value += coeff * slice[1] * e;
            }
            if ORDER == 3 {
                value += coeff * slice[2] * e * e;
            }
        }
        Some(ObservationMessage::from_value(value))
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

/// Product of two inputs, with slope and curvature propagation at the
/// higher orders.
#[derive(Clone, Debug)]
pub struct QssMultiplier<const ORDER: usize> {
    pub x: [InputPort; 2],
    pub y: [OutputPort; 1],
    pub values: [Slice; 2],
    pub sigma: Time,
}

impl<const ORDER: usize> Default for QssMultiplier<ORDER> {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 2],
            y: [EMPTY_LIST; 1],
            values: [[0.0; 3]; 2],
            sigma: 0.0,
        }
    }
}

impl<const ORDER: usize> ModelDynamics for QssMultiplier<ORDER> {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.values = [[0.0; 3]; 2];
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let [a, b] = self.values;
        match ORDER {
            1 => send_message(sim, &mut self.y[0], a[0] * b[0], 0.0, 0.0),
            2 => send_message(
                sim,
                &mut self.y[0],
                a[0] * b[0],
                a[1] * b[0] + b[1] * a[0],
                0.0,
            ),
            _ => send_message(
                sim,
                &mut self.y[0],
                a[0] * b[0],
                a[1] * b[0] + b[1] * a[0],
                a[0] * b[2] + a[1] * b[1] + a[2] * b[0],
            ),
        }
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, e: Time, _r: Time) -> SimResult<()> {
        let fired = [self.x[0] != EMPTY_LIST, self.x[1] != EMPTY_LIST];
        self.sigma = Time::INFINITY;

        for i in 0..2 {
            for msg in ListViewConst::new(&sim.messages, self.x[i]).iter() {
                refresh::<ORDER>(&mut self.values[i], msg);
                self.sigma = 0.0;
            }
        }

        for i in 0..2 {
            if !fired[i] {
                advance::<ORDER>(&mut self.values[i], e);
            }
        }

        Ok(())
    }

    fn observation(&self, e: Time) -> Option<ObservationMessage> {
        let [a, b] = self.values;
        let left = a[0] + if ORDER >= 2 { a[1] * e } else { 0.0 }
            + if ORDER == 3 { a[2] * e * e } else { 0.0 };
        let right = b[0] + if ORDER >= 2 { b[1] * e } else { 0.0 }
            + if ORDER == 3 { b[2] * e * e } else { 0.0 };
        Some(ObservationMessage::from_value(left * right))
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

/// Raises its input to a fixed power.
#[derive(Clone, Debug)]
pub struct QssPower<const ORDER: usize> {
    pub x: [InputPort; 1],
    pub y: [OutputPort; 1],
    pub default_n: Real,
    pub value: Slice,
    pub sigma: Time,
}

impl<const ORDER: usize> Default for QssPower<ORDER> {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 1],
            y: [EMPTY_LIST; 1],
            default_n: 1.0,
            value: [0.0; 3],
            sigma: 0.0,
        }
    }
}

impl<const ORDER: usize> ModelDynamics for QssPower<ORDER> {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.value = [0.0; 3];
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let n = self.default_n;
        let [v, s, c] = self.value;

        match ORDER {
            1 => send_message(sim, &mut self.y[0], v.powf(n), 0.0, 0.0),
            2 => send_message(
                sim,
                &mut self.y[0],
                v.powf(n),
                n * v.powf(n - 1.0) * s,
                0.0,
            ),
            _ => send_message(
                sim,
                &mut self.y[0],
                v.powf(n),
                n * v.powf(n - 1.0) * s,
                n * (n - 1.0) * v.powf(n - 2.0) * (s * s / 2.0) + n * v.powf(n - 1.0) * c,
            ),
        }
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        self.sigma = Time::INFINITY;

        if self.x[0] != EMPTY_LIST {
            if let Some(msg) = ListViewConst::new(&sim.messages, self.x[0]).front() {
                refresh::<ORDER>(&mut self.value, msg);
                self.sigma = 0.0;
            }
        }

        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::from_value(self.value[0]))
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

/// Squares its input.
#[derive(Clone, Debug)]
pub struct QssSquare<const ORDER: usize> {
    pub x: [InputPort; 1],
    pub y: [OutputPort; 1],
    pub value: Slice,
    pub sigma: Time,
}

impl<const ORDER: usize> Default for QssSquare<ORDER> {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 1],
            y: [EMPTY_LIST; 1],
            value: [0.0; 3],
            sigma: 0.0,
        }
    }
}

impl<const ORDER: usize> ModelDynamics for QssSquare<ORDER> {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.value = [0.0; 3];
        self.sigma = Time::INFINITY;
        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let [v, s, c] = self.value;

        match ORDER {
            1 => send_message(sim, &mut self.y[0], v * v, 0.0, 0.0),
            2 => send_message(sim, &mut self.y[0], v * v, 2.0 * v * s, 0.0),
            _ => send_message(
                sim,
                &mut self.y[0],
                v * v,
                2.0 * v * s,
                2.0 * v * c + s * s,
            ),
        }
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, _e: Time, _r: Time) -> SimResult<()> {
        self.sigma = Time::INFINITY;

        if self.x[0] != EMPTY_LIST {
            if let Some(msg) = ListViewConst::new(&sim.messages, self.x[0]).front() {
                refresh::<ORDER>(&mut self.value, msg);
                self.sigma = 0.0;
            }
        }

        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::from_value(self.value[0]))
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

pub type Qss1Sum2 = QssSum<1, 2>;
pub type Qss1Sum3 = QssSum<1, 3>;
pub type Qss1Sum4 = QssSum<1, 4>;
pub type Qss2Sum2 = QssSum<2, 2>;
pub type Qss2Sum3 = QssSum<2, 3>;
pub type Qss2Sum4 = QssSum<2, 4>;
pub type Qss3Sum2 = QssSum<3, 2>;
pub type Qss3Sum3 = QssSum<3, 3>;
pub type Qss3Sum4 = QssSum<3, 4>;

pub type Qss1Wsum2 = QssWsum<1, 2>;
pub type Qss1Wsum3 = QssWsum<1, 3>;
pub type Qss1Wsum4 = QssWsum<1, 4>;
pub type Qss2Wsum2 = QssWsum<2, 2>;
pub type Qss2Wsum3 = QssWsum<2, 3>;
pub type Qss2Wsum4 = QssWsum<2, 4>;
pub type Qss3Wsum2 = QssWsum<3, 2>;
pub type Qss3Wsum3 = QssWsum<3, 3>;
pub type Qss3Wsum4 = QssWsum<3, 4>;

pub type Qss1Multiplier = QssMultiplier<1>;
pub type Qss2Multiplier = QssMultiplier<2>;
pub type Qss3Multiplier = QssMultiplier<3>;

pub type Qss1Power = QssPower<1>;
pub type Qss2Power = QssPower<2>;
pub type Qss3Power = QssPower<3>;

pub type Qss1Square = QssSquare<1>;
pub type Qss2Square = QssSquare<2>;
pub type Qss3Square = QssSquare<3>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_second_order() {
        let mut slice = [1.0, 2.0, 0.0];
        advance::<2>(&mut slice, 0.5);
        assert_eq!(slice, [2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_advance_third_order() {
        let mut slice = [1.0, 2.0, 3.0];
        advance::<3>(&mut slice, 1.0);
        // value += slope + curvature, slope += 2 * curvature.
        assert_eq!(slice, [6.0, 8.0, 3.0]);
    }

    #[test]
    fn test_wsum_combination() {
        let mut wsum = Qss1Wsum2::with([2.0, -0.5]);
        wsum.values[0][0] = 3.0;
        wsum.values[1][0] = 4.0;
        let out = wsum.combined();
        assert_eq!(out[0], 2.0 * 3.0 - 0.5 * 4.0);
    }

    #[test]
    fn test_multiplier_observation() {
        let mut m = Qss1Multiplier::default();
        m.values[0][0] = 3.0;
        m.values[1][0] = 5.0;
        let obs = m.observation(0.0).unwrap();
        assert_eq!(obs[0], 15.0);
    }

    #[test]
    fn test_sum_observation_extrapolates() {
        let mut sum = Qss2Sum2::default();
        sum.values[0] = [1.0, 2.0, 0.0];
        sum.values[1] = [10.0, 0.0, 0.0];
        let obs = sum.observation(0.5).unwrap();
        assert_eq!(obs[0], 1.0 + 2.0 * 0.5 + 10.0);
    }
}
