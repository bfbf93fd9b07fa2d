//! Quantized-state threshold detectors.
//!
//! The detector tracks a `value` trajectory against a threshold. When the
//! trajectory reaches the threshold from the watched side it schedules an
//! immediate output: the `if` branch and a unit event pulse. The `else`
//! branch is re-emitted whenever it changes. A crossing at the same instant
//! as the previous one is debounced through `last_reset`.

use crate::dynamics::ModelDynamics;
use crate::error::SimResult;
use crate::list::{ListViewConst, EMPTY_LIST};
use crate::message::ObservationMessage;
use crate::simulation::{send_message, Simulation};
use crate::types::{InputPort, OutputPort, Real, Time};

pub const PORT_VALUE: usize = 0;
pub const PORT_IF_VALUE: usize = 1;
pub const PORT_ELSE_VALUE: usize = 2;
pub const PORT_THRESHOLD: usize = 3;

pub const OUT_IF_VALUE: usize = 0;
pub const OUT_ELSE_VALUE: usize = 1;
pub const OUT_EVENT: usize = 2;

type Slice = [Real; 3];

/// Threshold detector; `ORDER` bounds the polynomial degree of the tracked
/// trajectories.
#[derive(Clone, Debug)]
pub struct QssCross<const ORDER: usize> {
    pub x: [InputPort; 4],
    pub y: [OutputPort; 3],
    pub default_threshold: Real,
    pub default_detect_up: bool,
    pub threshold: Real,
    pub if_value: Slice,
    pub else_value: Slice,
    pub value: Slice,
    pub last_reset: Time,
    pub reach_threshold: bool,
    pub detect_up: bool,
    pub sigma: Time,
}

impl<const ORDER: usize> Default for QssCross<ORDER> {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 4],
            y: [EMPTY_LIST; 3],
            default_threshold: 0.0,
            default_detect_up: true,
            threshold: 0.0,
            if_value: [0.0; 3],
            else_value: [0.0; 3],
            value: [0.0; 3],
            last_reset: Time::INFINITY,
            reach_threshold: false,
            detect_up: true,
            sigma: 0.0,
        }
    }
}

impl<const ORDER: usize> QssCross<ORDER> {
    pub fn with(threshold: Real, detect_up: bool) -> Self {
        Self {
            default_threshold: threshold,
            default_detect_up: detect_up,
            ..Self::default()
        }
    }

    /// Time until the tracked trajectory next reaches the threshold, from
    /// the polynomial coefficients: linear root below order 3, smallest
    /// positive quadratic root at order 3.
    fn compute_wake_up(&mut self) {
        self.sigma = Time::INFINITY;

        if ORDER == 1 {
            return;
        }

        if self.value[1] == 0.0 {
            return;
        }

        if ORDER == 3 && self.value[2] != 0.0 {
            let a = self.value[2];
            let b = self.value[1];
            let c = self.value[0] - self.threshold;
            let d = b * b - 4.0 * a * c;

            if d > 0.0 {
                let x1 = (-b + d.sqrt()) / (2.0 * a);
                let x2 = (-b - d.sqrt()) / (2.0 * a);

                if x1 > 0.0 {
                    self.sigma = if x2 > 0.0 { x1.min(x2) } else { x1 };
                } else if x2 > 0.0 {
                    self.sigma = x2;
                }
            } else if d == 0.0 {
                let x = -b / (2.0 * a);
                if x > 0.0 {
                    self.sigma = x;
                }
            }

            return;
        }

        let root = (self.threshold - self.value[0]) / self.value[1];
        if root > 0.0 {
            self.sigma = root;
        }
    }

    fn absorb(&mut self, sim: &Simulation, port: usize, slice_kind: SliceKind, e: Time) {
        let port_word = self.x[port];
        let slice = match slice_kind {
            SliceKind::Value => &mut self.value,
            SliceKind::IfValue => &mut self.if_value,
            SliceKind::ElseValue => &mut self.else_value,
        };

        if port_word == EMPTY_LIST {
            if ORDER >= 2 {
                slice[0] += slice[1] * e;
            }
            if ORDER == 3 {
                slice[0] += slice[2] * e * e;
                slice[1] += 2.0 * slice[2] * e;
            }
        } else {
            for msg in ListViewConst::new(&sim.messages, port_word).iter() {
                slice[0] = msg[0];
                if ORDER >= 2 {
                    slice[1] = msg[1];
                }
                if ORDER == 3 {
                    slice[2] = msg[2];
                }
            }
        }
    }
}

enum SliceKind {
    Value,
    IfValue,
    ElseValue,
}

impl<const ORDER: usize> ModelDynamics for QssCross<ORDER> {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        self.if_value = [0.0; 3];
        self.else_value = [0.0; 3];
        self.value = [0.0; 3];

        self.threshold = self.default_threshold;
        self.value[0] = self.threshold - 1.0;

        self.sigma = Time::INFINITY;
        self.last_reset = Time::INFINITY;
        self.detect_up = self.default_detect_up;
        self.reach_threshold = false;

        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let else_out = self.else_value;
        let if_out = self.if_value;

        match ORDER {
            1 => send_message(sim, &mut self.y[OUT_ELSE_VALUE], else_out[0], 0.0, 0.0)?,
            2 => send_message(
                sim,
                &mut self.y[OUT_ELSE_VALUE],
                else_out[0],
                else_out[1],
                0.0,
            )?,
            _ => send_message(
                sim,
                &mut self.y[OUT_ELSE_VALUE],
                else_out[0],
                else_out[1],
                else_out[2],
            )?,
        }

        if self.reach_threshold {
            match ORDER {
                1 => send_message(sim, &mut self.y[OUT_IF_VALUE], if_out[0], 0.0, 0.0)?,
                2 => send_message(sim, &mut self.y[OUT_IF_VALUE], if_out[0], if_out[1], 0.0)?,
                _ => send_message(
                    sim,
                    &mut self.y[OUT_IF_VALUE],
                    if_out[0],
                    if_out[1],
                    if_out[2],
                )?,
            }
            send_message(sim, &mut self.y[OUT_EVENT], 1.0, 0.0, 0.0)?;
        }

        Ok(())
    }

    fn transition(&mut self, sim: &mut Simulation, t: Time, e: Time, _r: Time) -> SimResult<()> {
        let old_else_value = self.else_value[0];

        if self.x[PORT_THRESHOLD] != EMPTY_LIST {
            for msg in ListViewConst::new(&sim.messages, self.x[PORT_THRESHOLD]).iter() {
                self.threshold = msg[0];
            }
        }

        self.absorb(sim, PORT_IF_VALUE, SliceKind::IfValue, e);
        self.absorb(sim, PORT_ELSE_VALUE, SliceKind::ElseValue, e);
        self.absorb(sim, PORT_VALUE, SliceKind::Value, e);

        self.reach_threshold = false;

        let crossed = (self.detect_up && self.value[0] >= self.threshold)
            || (!self.detect_up && self.value[0] <= self.threshold);

        if crossed {
            if t != self.last_reset {
                self.last_reset = t;
                self.reach_threshold = true;
                self.sigma = 0.0;
            } else {
                self.sigma = Time::INFINITY;
            }
        } else if old_else_value != self.else_value[0] {
            self.sigma = 0.0;
        } else {
            self.compute_wake_up();
        }

        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(ObservationMessage::new(
            self.value[0],
            self.if_value[0],
            self.else_value[0],
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

pub type Qss1Cross = QssCross<1>;
pub type Qss2Cross = QssCross<2>;
pub type Qss3Cross = QssCross<3>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_starts_below_threshold() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut cross = Qss1Cross::with(3.0, true);
        cross.initialize(&mut sim).unwrap();

        assert_eq!(cross.threshold, 3.0);
        assert_eq!(cross.value[0], 2.0);
        assert!(cross.sigma.is_infinite());
        assert!(!cross.reach_threshold);
    }

    #[test]
    fn test_wake_up_linear() {
        let mut cross = Qss2Cross::with(1.0, true);
        cross.threshold = 1.0;
        cross.value = [0.0, 2.0, 0.0];
        cross.compute_wake_up();
        assert!((cross.sigma - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_wake_up_receding_trajectory_sleeps() {
        let mut cross = Qss2Cross::with(1.0, true);
        cross.threshold = 1.0;
        cross.value = [0.0, -2.0, 0.0];
        cross.compute_wake_up();
        assert!(cross.sigma.is_infinite());
    }

    #[test]
    fn test_wake_up_quadratic() {
        let mut cross = Qss3Cross::with(4.0, true);
        cross.threshold = 4.0;
        // value(t) = t^2: reaches 4 at t = 2.
        cross.value = [0.0, 0.0, 1.0];
        cross.compute_wake_up();
        assert!((cross.sigma - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_order_has_no_wake_up() {
        let mut cross = Qss1Cross::with(1.0, true);
        cross.value = [0.0, 5.0, 0.0];
        cross.compute_wake_up();
        assert!(cross.sigma.is_infinite());
    }
}
