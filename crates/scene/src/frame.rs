use glam::{Mat4, Vec3};
use std::time::Instant;

/// Monotonic clock reporting seconds since it was created.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    origin: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Time bookkeeping carried from one frame to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLoopState {
    pub previous_time: f64,
    pub angle: f64,
    pub frame_index: u64,
}

impl FrameLoopState {
    pub fn new(start_time: f64) -> Self {
        Self {
            previous_time: start_time,
            angle: 0.0,
            frame_index: 0,
        }
    }

    /// Advance to `now`: the time since the previous frame is added to the
    /// accumulated angle.
    #[must_use]
    pub fn advance(self, now: f64) -> Self {
        let elapsed = now - self.previous_time;
        Self {
            previous_time: now,
            angle: self.angle + elapsed,
            frame_index: self.frame_index + 1,
        }
    }
}

/// Errors from building a [`Spin`].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SpinError {
    #[error("rotation axis must be finite and non-zero")]
    InvalidAxis,
    #[error("rotation divisor must be finite and non-zero, got {0}")]
    InvalidDivisor(f32),
}

/// Per-object rotation policy: the object turns about `axis` by the
/// accumulated angle divided by `divisor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spin {
    axis: Vec3,
    divisor: f32,
}

impl Spin {
    pub fn new(axis: Vec3, divisor: f32) -> Result<Self, SpinError> {
        if !axis.is_finite() || axis.length_squared() == 0.0 {
            return Err(SpinError::InvalidAxis);
        }
        if !divisor.is_finite() || divisor == 0.0 {
            return Err(SpinError::InvalidDivisor(divisor));
        }
        Ok(Self {
            axis: axis.normalize(),
            divisor,
        })
    }

    pub fn about_x(divisor: f32) -> Result<Self, SpinError> {
        Self::new(Vec3::X, divisor)
    }

    /// One X-axis spin per divisor, in order.
    pub fn about_x_all(divisors: &[f32]) -> Result<Vec<Self>, SpinError> {
        divisors.iter().map(|&d| Self::about_x(d)).collect()
    }

    /// The two cubes of the demo: one at a fifth of the accumulated angle,
    /// one at half.
    pub fn demo_pair() -> [Spin; 2] {
        [
            Spin {
                axis: Vec3::X,
                divisor: 5.0,
            },
            Spin {
                axis: Vec3::X,
                divisor: 2.0,
            },
        ]
    }

    pub fn axis(&self) -> Vec3 {
        self.axis
    }

    pub fn divisor(&self) -> f32 {
        self.divisor
    }

    pub fn rotation_angle(&self, angle: f64) -> f64 {
        angle / self.divisor as f64
    }

    pub fn model_transform(&self, angle: f64) -> Mat4 {
        Mat4::from_axis_angle(self.axis, self.rotation_angle(angle) as f32)
    }
}

/// Lifecycle of the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Initializing,
    Running,
    Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move frame loop from {from:?} to {to:?}")]
pub struct PhaseError {
    pub from: LoopPhase,
    pub to: LoopPhase,
}

impl LoopPhase {
    /// Initializing is the only phase that may enter Running.
    pub fn start_running(self) -> Result<Self, PhaseError> {
        match self {
            LoopPhase::Initializing => Ok(LoopPhase::Running),
            from => Err(PhaseError {
                from,
                to: LoopPhase::Running,
            }),
        }
    }

    pub fn terminate(self) -> Self {
        if self != LoopPhase::Terminating {
            tracing::debug!("frame loop {:?} -> Terminating", self);
        }
        LoopPhase::Terminating
    }

    pub fn is_running(self) -> bool {
        self == LoopPhase::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Mat4, b: Mat4) -> bool {
        a.abs_diff_eq(b, 1e-6)
    }

    #[test]
    fn angle_is_running_sum_of_deltas() {
        let deltas = [0.016, 0.017, 0.5, 0.0, 1.25, 0.0333, 3.0];
        let mut state = FrameLoopState::new(10.0);
        let mut now = 10.0;
        let mut expected = 0.0;
        for d in deltas {
            now += d;
            expected += d;
            state = state.advance(now);
            assert!((state.angle - expected).abs() < 1e-9);
            assert_eq!(state.previous_time, now);
        }
        assert_eq!(state.frame_index, deltas.len() as u64);
    }

    #[test]
    fn per_object_angles_follow_divisors() {
        let [a, b] = Spin::demo_pair();
        let mut state = FrameLoopState::new(0.0);
        let mut now = 0.0;
        for step in 1..200 {
            now += step as f64 * 0.001;
            state = state.advance(now);
            assert_eq!(a.rotation_angle(state.angle), state.angle / 5.0);
            assert_eq!(b.rotation_angle(state.angle), state.angle / 2.0);
        }
    }

    #[test]
    fn five_second_step_rotates_both_cubes() {
        let [a, b] = Spin::demo_pair();
        let state = FrameLoopState::new(0.0).advance(5.0);
        assert_eq!(state.angle, 5.0);

        let ma = a.model_transform(state.angle);
        let mb = b.model_transform(state.angle);
        assert!(approx_eq(ma, Mat4::from_rotation_x(1.0)));
        assert!(approx_eq(mb, Mat4::from_rotation_x(2.5)));

        for m in [ma, mb] {
            assert_eq!(m.w_axis, glam::Vec4::W);
            assert!((m.x_axis.truncate().length() - 1.0).abs() < 1e-6);
            assert!((m.y_axis.truncate().length() - 1.0).abs() < 1e-6);
            assert!((m.z_axis.truncate().length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_angle_is_identity() {
        for spin in Spin::demo_pair() {
            assert!(approx_eq(spin.model_transform(0.0), Mat4::IDENTITY));
        }
    }

    #[test]
    fn spin_validation() {
        assert_eq!(Spin::about_x(0.0), Err(SpinError::InvalidDivisor(0.0)));
        assert!(matches!(
            Spin::about_x(f32::INFINITY),
            Err(SpinError::InvalidDivisor(_))
        ));
        assert_eq!(Spin::new(Vec3::ZERO, 1.0), Err(SpinError::InvalidAxis));
        let s = Spin::new(Vec3::new(0.0, 3.0, 0.0), -4.0).unwrap();
        assert_eq!(s.axis(), Vec3::Y);
    }

    #[test]
    fn spins_from_divisor_list() {
        let spins = Spin::about_x_all(&[5.0, 2.0]).unwrap();
        assert_eq!(spins, Spin::demo_pair());
        assert_eq!(Spin::about_x_all(&[]), Ok(vec![]));
        assert_eq!(
            Spin::about_x_all(&[3.0, 0.0, 1.0]),
            Err(SpinError::InvalidDivisor(0.0))
        );
    }

    #[test]
    fn phase_transitions() {
        let phase = LoopPhase::Initializing;
        let running = phase.start_running().unwrap();
        assert!(running.is_running());
        assert!(running.start_running().is_err());

        let done = running.terminate();
        assert_eq!(done, LoopPhase::Terminating);
        assert_eq!(
            done.start_running(),
            Err(PhaseError {
                from: LoopPhase::Terminating,
                to: LoopPhase::Running
            })
        );
        assert_eq!(LoopPhase::Initializing.terminate(), LoopPhase::Terminating);
    }

    #[test]
    fn clock_is_monotonic() {
        let clock = FrameClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }
}
