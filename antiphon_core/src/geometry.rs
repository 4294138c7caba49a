//! Geometry and propagation delay.
//!
//! Players sit on a flat board. An event travels from sender to listener
//! at a fixed speed, so the time it takes is proportional to the Euclidean
//! distance between them:
//!
//! ```text
//! delay(a, b) = ms_per_unit * |a - b|   (milliseconds)
//! ```

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default propagation scale: 100 ms per board unit.
pub const DEFAULT_MS_PER_UNIT: f64 = 100.0;

/// A point on the board.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
    
    /// Returns the position as a nalgebra point.
    pub fn as_point(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
    
    /// Euclidean distance to another position.
    pub fn distance(&self, other: &Position) -> f64 {
        nalgebra::distance(&self.as_point(), &other.as_point())
    }
}

/// Converts distance into delivery latency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagationModel {
    /// Milliseconds of delay per unit of distance
    pub ms_per_unit: f64,
}

impl PropagationModel {
    pub fn new(ms_per_unit: f64) -> Self {
        Self { ms_per_unit }
    }
    
    /// Delay for an event travelling from `a` to `b`.
    ///
    /// Total: a non-finite or negative product yields zero delay.
    pub fn delay(&self, a: &Position, b: &Position) -> Duration {
        let millis = self.ms_per_unit * a.distance(b);
        Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::ZERO)
    }
}

impl Default for PropagationModel {
    fn default() -> Self {
        Self::new(DEFAULT_MS_PER_UNIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    
    #[test]
    fn test_distance_is_euclidean() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_relative_eq!(a.distance(&b), 5.0);
        assert_relative_eq!(b.distance(&a), 5.0);
    }
    
    #[test]
    fn test_delay_scales_with_distance() {
        let model = PropagationModel::new(100.0);
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        
        assert_eq!(model.delay(&a, &b), Duration::from_millis(500));
        assert_eq!(model.delay(&a, &a), Duration::ZERO);
    }
    
    #[test]
    fn test_delay_is_total() {
        let model = PropagationModel::default();
        let a = Position::new(0.0, 0.0);
        let far = Position::new(f64::INFINITY, 0.0);
        let nan = Position::new(f64::NAN, 1.0);
        
        assert_eq!(model.delay(&a, &far), Duration::ZERO);
        assert_eq!(model.delay(&a, &nan), Duration::ZERO);
        assert_eq!(PropagationModel::new(-10.0).delay(&a, &Position::new(1.0, 0.0)), Duration::ZERO);
    }
    
    proptest! {
        #[test]
        fn prop_nearer_is_never_later(
            bx in -500.0f64..500.0, by in -500.0f64..500.0,
            cx in -500.0f64..500.0, cy in -500.0f64..500.0,
        ) {
            let model = PropagationModel::default();
            let origin = Position::default();
            let b = Position::new(bx, by);
            let c = Position::new(cx, cy);
            if origin.distance(&b) < origin.distance(&c) {
                prop_assert!(model.delay(&origin, &b) <= model.delay(&origin, &c));
            }
        }
    }
}
