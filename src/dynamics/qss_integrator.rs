//! Quantized-state integrators of orders 1, 2 and 3.
//!
//! The integrator holds the state `value` and a quantized image `q` within
//! a band of width `dq`. Internal transitions advance the state by the
//! closed-form polynomial over `sigma` and recompute the time to the next
//! quantum crossing; external transitions overwrite the derivative
//! coefficients from the incoming message and solve for the crossing of
//! either band edge. A message on the reset port overwrites the state and
//! forces an immediate output.

use crate::dynamics::ModelDynamics;
use crate::error::{Error, SimResult};
use crate::list::{ListViewConst, EMPTY_LIST};
use crate::message::ObservationMessage;
use crate::simulation::{send_message, Simulation};
use crate::types::{InputPort, OutputPort, Real, Time};

pub const PORT_X_DOT: usize = 0;
pub const PORT_RESET: usize = 1;

const PI_DIV_3: Real = core::f64::consts::FRAC_PI_3 as Real;

/// QSS integrator; `ORDER` selects the Taylor truncation (1, 2 or 3).
#[derive(Clone, Debug)]
pub struct QssIntegrator<const ORDER: usize> {
    pub x: [InputPort; 2],
    pub y: [OutputPort; 1],
    pub default_x: Real,
    pub default_dq: Real,
    pub value: Real,
    pub u: Real,
    pub mu: Real,
    pub pu: Real,
    pub q: Real,
    pub mq: Real,
    pub pq: Real,
    pub sigma: Time,
}

impl<const ORDER: usize> Default for QssIntegrator<ORDER> {
    fn default() -> Self {
        Self {
            x: [EMPTY_LIST; 2],
            y: [EMPTY_LIST; 1],
            default_x: 0.0,
            default_dq: 0.01,
            value: 0.0,
            u: 0.0,
            mu: 0.0,
            pu: 0.0,
            q: 0.0,
            mq: 0.0,
            pq: 0.0,
            sigma: 0.0,
        }
    }
}

impl<const ORDER: usize> QssIntegrator<ORDER> {
    pub fn with(default_x: Real, default_dq: Real) -> Self {
        Self {
            default_x,
            default_dq,
            ..Self::default()
        }
    }

    fn external(&mut self, sim: &mut Simulation, e: Time) -> SimResult<()> {
        let msg = {
            let lst = ListViewConst::new(&sim.messages, self.x[PORT_X_DOT]);
            match lst.front() {
                Some(msg) => *msg,
                None => return Ok(()),
            }
        };

        match ORDER {
            1 => {
                self.value += e * self.u;
                self.u = msg[0];

                if self.sigma != 0.0 {
                    self.sigma = if self.u == 0.0 {
                        Time::INFINITY
                    } else if self.u > 0.0 {
                        (self.q + self.default_dq - self.value) / self.u
                    } else {
                        (self.q - self.default_dq - self.value) / self.u
                    };
                }
            }
            2 => {
                self.value += self.u * e + (self.mu / 2.0) * e * e;
                self.u = msg[0];
                self.mu = msg[1];

                if self.sigma != 0.0 {
                    self.q += self.mq * e;
                    let a = self.mu / 2.0;
                    let b = self.u - self.mq;
                    let mut c = self.value - self.q + self.default_dq;
                    self.sigma = Time::INFINITY;

                    if a == 0.0 {
                        if b != 0.0 {
                            let s = -c / b;
                            if s > 0.0 {
                                self.sigma = s;
                            }

                            c = self.value - self.q - self.default_dq;
                            let s = -c / b;
                            if s > 0.0 && s < self.sigma {
                                self.sigma = s;
                            }
                        }
                    } else {
                        let disc = b * b - 4.0 * a * c;
                        let s = (-b + disc.sqrt()) / 2.0 / a;
                        if s > 0.0 {
                            self.sigma = s;
                        }

                        let s = (-b - disc.sqrt()) / 2.0 / a;
                        if s > 0.0 && s < self.sigma {
                            self.sigma = s;
                        }

                        c = self.value - self.q - self.default_dq;
                        let disc = b * b - 4.0 * a * c;
                        let s = (-b + disc.sqrt()) / 2.0 / a;
                        if s > 0.0 && s < self.sigma {
                            self.sigma = s;
                        }

                        let s = (-b - disc.sqrt()) / 2.0 / a;
                        if s > 0.0 && s < self.sigma {
                            self.sigma = s;
                        }
                    }

                    if (self.value - self.q) > self.default_dq
                        || (self.q - self.value) > self.default_dq
                    {
                        self.sigma = 0.0;
                    }
                }
            }
            3 => {
                self.value +=
                    self.u * e + (self.mu * e * e) / 2.0 + (self.pu * e * e * e) / 3.0;
                self.u = msg[0];
                self.mu = msg[1];
                self.pu = msg[2];

                if self.sigma != 0.0 {
                    self.q += self.mq * e + self.pq * e * e;
                    self.mq += 2.0 * self.pq * e;
                    let a = self.mu / 2.0 - self.pq;
                    let b = self.u - self.mq;
                    let c = self.value - self.q - self.default_dq;

                    if self.pu != 0.0 {
                        self.sigma = self.cubic_crossing(a, b, c);
                    } else {
                        self.sigma = self.quadratic_crossing(a, b, c);
                    }

                    if (self.value - self.q).abs() > self.default_dq {
                        self.sigma = 0.0;
                    }
                }
            }
            _ => unreachable!(),
        }

        Ok(())
    }

    /// Smallest positive root over both band edges when the emitted
    /// polynomial is cubic. Depressed-cubic form, Cardano when one real
    /// root, trigonometric path when three.
    fn cubic_crossing(&self, a: Real, b: Real, c: Real) -> Time {
        let a = 3.0 * a / self.pu;
        let b = 3.0 * b / self.pu;
        let c = 3.0 * c / self.pu;
        let v = b - a * a / 3.0;
        let w = c - b * a / 3.0 + 2.0 * a * a * a / 27.0;

        let s = smallest_positive_cubic_root(a, v, w);

        let c = c + 6.0 * self.default_dq / self.pu;
        let w = c - b * a / 3.0 + 2.0 * a * a * a / 27.0;
        let other = smallest_positive_cubic_root(a, v, w);

        if s < other || other < 0.0 {
            s
        } else {
            other
        }
    }

    /// Smallest positive root over both band edges when the leading cubic
    /// coefficient vanishes.
    fn quadratic_crossing(&self, a: Real, b: Real, mut c: Real) -> Time {
        if a != 0.0 {
            let s = smallest_positive_quadratic_root(a, b, c);
            c += 2.0 * self.default_dq;
            let other = smallest_positive_quadratic_root(a, b, c);
            return s.min(other);
        }

        if b != 0.0 {
            let mut x1 = -c / b;
            let mut x2 = x1 - 2.0 * self.default_dq / b;
            if x1 < 0.0 {
                x1 = Time::INFINITY;
            }
            if x2 < 0.0 {
                x2 = Time::INFINITY;
            }
            return x1.min(x2);
        }

        Time::INFINITY
    }

    fn internal(&mut self) -> SimResult<()> {
        match ORDER {
            1 => {
                self.value += self.sigma * self.u;
                self.q = self.value;

                self.sigma = if self.u == 0.0 {
                    Time::INFINITY
                } else {
                    self.default_dq / self.u.abs()
                };
            }
            2 => {
                self.value += self.u * self.sigma + self.mu / 2.0 * self.sigma * self.sigma;
                self.q = self.value;
                self.u += self.mu * self.sigma;
                self.mq = self.u;

                self.sigma = if self.mu == 0.0 {
                    Time::INFINITY
                } else {
                    (2.0 * self.default_dq / self.mu.abs()).sqrt()
                };
            }
            3 => {
                self.value += self.u * self.sigma
                    + (self.mu * self.sigma * self.sigma) / 2.0
                    + (self.pu * self.sigma * self.sigma * self.sigma) / 3.0;
                self.q = self.value;
                self.u += self.mu * self.sigma + self.pu * self.sigma * self.sigma;
                self.mq = self.u;
                self.mu += 2.0 * self.pu * self.sigma;
                self.pq = self.mu / 2.0;

                self.sigma = if self.pu == 0.0 {
                    Time::INFINITY
                } else {
                    (3.0 * self.default_dq / self.pu).abs().powf(1.0 / 3.0)
                };
            }
            _ => unreachable!(),
        }

        Ok(())
    }

    fn reset(&mut self, sim: &mut Simulation) -> SimResult<()> {
        let lst = ListViewConst::new(&sim.messages, self.x[PORT_RESET]);
        if let Some(msg) = lst.front() {
            self.value = msg[0];
            self.q = self.value;
            self.sigma = 0.0;
        }

        Ok(())
    }
}

impl<const ORDER: usize> ModelDynamics for QssIntegrator<ORDER> {
    fn initialize(&mut self, _sim: &mut Simulation) -> SimResult<()> {
        if !self.default_x.is_finite() {
            return Err(Error::IntegratorBadX);
        }

        if !self.default_dq.is_finite() || self.default_dq <= 0.0 {
            return Err(Error::IntegratorBadX);
        }

        self.value = self.default_x;
        self.u = 0.0;
        self.mu = 0.0;
        self.pu = 0.0;
        self.mq = 0.0;
        self.pq = 0.0;

        self.q = match ORDER {
            1 => (self.value / self.default_dq).floor() * self.default_dq,
            _ => self.value,
        };

        self.sigma = 0.0;

        Ok(())
    }

    fn lambda(&mut self, sim: &mut Simulation) -> SimResult<()> {
        match ORDER {
            1 => send_message(sim, &mut self.y[0], self.value + self.u * self.sigma, 0.0, 0.0),
            2 => send_message(
                sim,
                &mut self.y[0],
                self.value + self.u * self.sigma + self.mu * self.sigma * self.sigma / 2.0,
                self.u + self.mu * self.sigma,
                0.0,
            ),
            3 => send_message(
                sim,
                &mut self.y[0],
                self.value
                    + self.u * self.sigma
                    + (self.mu * self.sigma * self.sigma) / 2.0
                    + (self.pu * self.sigma * self.sigma * self.sigma) / 3.0,
                self.u + self.mu * self.sigma + self.pu * self.sigma * self.sigma,
                self.mu / 2.0 + self.pu * self.sigma,
            ),
            _ => unreachable!(),
        }
    }

    fn transition(&mut self, sim: &mut Simulation, _t: Time, e: Time, _r: Time) -> SimResult<()> {
        if self.x[PORT_X_DOT] == EMPTY_LIST && self.x[PORT_RESET] == EMPTY_LIST {
            self.internal()?;
        } else if self.x[PORT_RESET] != EMPTY_LIST {
            self.reset(sim)?;
        } else {
            self.external(sim, e)?;
        }

        Ok(())
    }

    fn observation(&self, _e: Time) -> Option<ObservationMessage> {
        Some(match ORDER {
            1 => ObservationMessage::new(self.value, self.u, 0.0, 0.0),
            2 => ObservationMessage::new(self.value, self.u, self.mu, 0.0),
            _ => ObservationMessage::new(self.value, self.u, self.mu, self.pu),
        })
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

/// Smallest positive root of `x^3 + a_shift` form: the depressed cubic
/// `y^3 + v y + w` with `x = y - a/3`. Returns `+inf` when every real root
/// is negative.
fn smallest_positive_cubic_root(a: Real, v: Real, w: Real) -> Real {
    let i1 = -w / 2.0;
    let i2 = i1 * i1 + v * v * v / 27.0;

    if i2 > 0.0 {
        let i2 = i2.sqrt();
        let big_a = cbrt_signed(i1 + i2);
        let big_b = cbrt_signed(i1 - i2);

        let s = big_a + big_b - a / 3.0;
        if s < 0.0 {
            Real::INFINITY
        } else {
            s
        }
    } else if i2 == 0.0 {
        let big_a = cbrt_signed(i1);
        let x1 = 2.0 * big_a - a / 3.0;
        let x2 = -(big_a + a / 3.0);

        smallest_positive(x1, x2)
    } else {
        let arg = (w * (27.0 / (-v)).sqrt() / (2.0 * v)).acos() / 3.0;
        let y1 = 2.0 * (-v / 3.0).sqrt();
        let y2 = -y1 * (PI_DIV_3 - arg).cos() - a / 3.0;
        let y3 = -y1 * (PI_DIV_3 + arg).cos() - a / 3.0;
        let y1 = y1 * arg.cos() - a / 3.0;

        if y1 < 0.0 {
            Real::INFINITY
        } else if y3 < 0.0 {
            y1
        } else if y2 < 0.0 {
            y3
        } else {
            y2
        }
    }
}

fn smallest_positive_quadratic_root(a: Real, b: Real, c: Real) -> Real {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Real::INFINITY;
    }

    let disc = disc.sqrt();
    let x1 = (-b + disc) / 2.0 / a;
    let x2 = (-b - disc) / 2.0 / a;

    smallest_positive(x1, x2)
}

fn smallest_positive(x1: Real, x2: Real) -> Real {
    if x1 < 0.0 {
        if x2 < 0.0 {
            Real::INFINITY
        } else {
            x2
        }
    } else if x2 < 0.0 {
        x1
    } else {
        x1.min(x2)
    }
}

fn cbrt_signed(value: Real) -> Real {
    if value > 0.0 {
        value.powf(1.0 / 3.0)
    } else {
        -value.abs().powf(1.0 / 3.0)
    }
}

/// First-order quantized-state integrator.
pub type Qss1Integrator = QssIntegrator<1>;
/// Second-order quantized-state integrator.
pub type Qss2Integrator = QssIntegrator<2>;
/// Third-order quantized-state integrator.
pub type Qss3Integrator = QssIntegrator<3>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubic_root_single_real() {
        // y^3 - 1 = 0 with no shift: root at 1.
        let root = smallest_positive_cubic_root(0.0, 0.0, -1.0);
        assert!((root - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cubic_root_three_real_picks_smallest_positive() {
        // (x - 1)(x - 2)(x + 3) = x^3 - 7x + 6; depressed already (a = 0).
        let root = smallest_positive_cubic_root(0.0, -7.0, 6.0);
        assert!((root - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cubic_root_all_negative_is_infinite() {
        // (x + 1)(x + 2)(x + 3) = x^3 + 6x^2 + 11x + 6, shift a = 6:
        // depressed y^3 - y with w = 0 => roots -1, -2, -3 in x.
        let a: Real = 6.0;
        let v: Real = 11.0 - a * a / 3.0;
        let w: Real = 6.0 - 11.0 * a / 3.0 + 2.0 * a * a * a / 27.0;
        let root = smallest_positive_cubic_root(a, v, w);
        assert!(root.is_infinite());
    }

    #[test]
    fn test_quadratic_root() {
        // x^2 - 3x + 2: roots 1 and 2.
        let root = smallest_positive_quadratic_root(1.0, -3.0, 2.0);
        assert!((root - 1.0).abs() < 1e-9);

        // No real root.
        assert!(smallest_positive_quadratic_root(1.0, 0.0, 1.0).is_infinite());
    }

    #[test]
    fn test_initialize_rejects_bad_defaults() {
        let mut sim = Simulation::new(4, 16).unwrap();

        let mut dyn1 = Qss1Integrator::with(Real::NAN, 0.1);
        assert_eq!(dyn1.initialize(&mut sim), Err(Error::IntegratorBadX));

        let mut dyn2 = Qss1Integrator::with(0.0, 0.0);
        assert_eq!(dyn2.initialize(&mut sim), Err(Error::IntegratorBadX));
    }

    #[test]
    fn test_internal_step_first_order() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut integ = Qss1Integrator::with(0.0, 0.5);
        integ.initialize(&mut sim).unwrap();

        // Constant derivative 1: successive crossings every dq.
        integ.u = 1.0;
        integ.sigma = 0.5;
        integ.internal().unwrap();
        assert!((integ.value - 0.5).abs() < 1e-9);
        assert!((integ.sigma - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_internal_zero_derivative_sleeps() {
        let mut sim = Simulation::new(4, 16).unwrap();
        let mut integ = Qss1Integrator::with(0.0, 0.5);
        integ.initialize(&mut sim).unwrap();
        integ.internal().unwrap();
        assert!(integ.sigma.is_infinite());
    }
}
