//! Placement policies for freshly spawned children. The numbers are
//! aesthetic choices; the only hard requirement is that children never land
//! on top of their parent.

use std::f32::consts::PI;

pub const RING_RADIUS: f32 = 500.0;
pub const FAN_RADIUS: f32 = 350.0;
pub const FAN_DROP: f32 = 200.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LayoutPolicy {
    /// Full circle around the origin, used for the first ring of eras.
    Ring { radius: f32 },
    /// Downward half-circle beneath an expanded node.
    Fan { radius: f32, drop: f32 },
}

impl LayoutPolicy {
    pub fn ring() -> Self {
        LayoutPolicy::Ring {
            radius: RING_RADIUS,
        }
    }

    pub fn fan() -> Self {
        LayoutPolicy::Fan {
            radius: FAN_RADIUS,
            drop: FAN_DROP,
        }
    }

    /// Position of child `index` out of `count` around `origin`.
    pub fn position(&self, origin: (f32, f32), index: usize, count: usize) -> (f32, f32) {
        match *self {
            LayoutPolicy::Ring { radius } => {
                let step = 2.0 * PI / count.max(1) as f32;
                let angle = index as f32 * step;
                (
                    origin.0 + radius * angle.cos(),
                    origin.1 + radius * angle.sin(),
                )
            }
            LayoutPolicy::Fan { radius, drop } => {
                let step = PI / count.saturating_sub(1).max(1) as f32;
                let angle = -PI / 2.0 + index as f32 * step;
                (
                    origin.0 + radius * angle.cos(),
                    origin.1 + radius * angle.sin() + drop,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
        ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
    }

    #[test]
    fn test_ring_uses_full_circle_step() {
        let ring = LayoutPolicy::ring();
        let origin = (0.0, 0.0);
        // With three children the step is 2*pi/3, so child 0 sits at angle 0.
        let first = ring.position(origin, 0, 3);
        assert!((first.0 - RING_RADIUS).abs() < 1e-3);
        assert!(first.1.abs() < 1e-3);

        let second = ring.position(origin, 1, 3);
        let expected = (2.0 * PI / 3.0).cos() * RING_RADIUS;
        assert!((second.0 - expected).abs() < 1e-2);
    }

    #[test]
    fn test_ring_children_keep_distance_from_origin() {
        let ring = LayoutPolicy::ring();
        for index in 0..7 {
            let position = ring.position((10.0, -4.0), index, 7);
            assert!((distance(position, (10.0, -4.0)) - RING_RADIUS).abs() < 1e-2);
        }
    }

    #[test]
    fn test_fan_spans_downward_half_circle() {
        let fan = LayoutPolicy::fan();
        let origin = (0.0, 0.0);
        let first = fan.position(origin, 0, 3);
        let last = fan.position(origin, 2, 3);
        // Endpoints of the half circle: straight up (then dropped) and
        // straight down.
        assert!(first.1 < last.1);
        assert!((first.1 - (FAN_DROP - FAN_RADIUS)).abs() < 1e-2);
        assert!((last.1 - (FAN_DROP + FAN_RADIUS)).abs() < 1e-2);
    }

    #[test]
    fn test_fan_single_child_is_finite() {
        let fan = LayoutPolicy::fan();
        let position = fan.position((5.0, 5.0), 0, 1);
        assert!(position.0.is_finite() && position.1.is_finite());
        assert!(distance(position, (5.0, 5.0)) > 1.0);
    }

    #[test]
    fn test_children_never_overlap_parent() {
        for count in 1..=7 {
            for index in 0..count {
                for policy in [LayoutPolicy::ring(), LayoutPolicy::fan()] {
                    let position = policy.position((0.0, 0.0), index, count);
                    assert!(distance(position, (0.0, 0.0)) > 100.0);
                }
            }
        }
    }
}
