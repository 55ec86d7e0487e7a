//! Subdivision of a rotation into micro-steps

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Tolerance used when deciding whether a rotation divides evenly into steps.
const EPSILON: f64 = 1e-9;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Iterator over the angles to write when rotating from `start` to `target`.
///
/// Yields `floor(|target - start| / step_size)` full steps, each `step_size` further towards the
/// target, followed by one extra write of exactly `target` if the distance isn't a whole number
/// of steps. The last angle yielded is always exactly `target`, so rounding errors can't
/// accumulate over many rotations.
#[derive(Debug, Clone)]
pub struct StepPlan {
    start: f64,
    target: f64,
    step: f64,
    num_full_steps: u64,
    has_remainder: bool,
    idx: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StepPlan {
    /// Plan a rotation. `step_size` must be positive.
    pub fn new(start: f64, target: f64, step_size: f64) -> Self {
        let dist = (target - start).abs();
        let num_full_steps = (dist / step_size + EPSILON).floor() as u64;
        let remainder = dist - num_full_steps as f64 * step_size;

        Self {
            start,
            target,
            step: step_size.copysign(target - start),
            num_full_steps,
            has_remainder: remainder > EPSILON,
            idx: 0,
        }
    }

    /// Number of full-size steps in the rotation.
    pub fn num_full_steps(&self) -> u64 {
        self.num_full_steps
    }

    /// Whether a final partial step to the target is needed.
    pub fn has_remainder(&self) -> bool {
        self.has_remainder
    }
}

impl Iterator for StepPlan {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let total = self.num_full_steps + self.has_remainder as u64;
        if self.idx >= total {
            return None;
        }

        self.idx += 1;

        if self.idx == total {
            Some(self.target)
        } else {
            Some(self.start + self.step * self.idx as f64)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = self.num_full_steps + self.has_remainder as u64;
        let left = (total - self.idx) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for StepPlan {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_whole_steps() {
        let steps: Vec<f64> = StepPlan::new(90.0, 95.0, 1.0).collect();
        assert_eq!(steps, vec![91.0, 92.0, 93.0, 94.0, 95.0]);

        let steps: Vec<f64> = StepPlan::new(95.0, 93.0, 1.0).collect();
        assert_eq!(steps, vec![94.0, 93.0]);
    }

    #[test]
    fn test_remainder_lands_on_target() {
        let plan = StepPlan::new(10.0, 13.5, 1.0);
        assert_eq!(plan.num_full_steps(), 3);
        assert!(plan.has_remainder());
        assert_eq!(plan.collect::<Vec<_>>(), vec![11.0, 12.0, 13.0, 13.5]);

        let plan = StepPlan::new(10.0, 7.25, 0.5);
        assert_eq!(plan.num_full_steps(), 5);
        assert_eq!(
            plan.collect::<Vec<_>>(),
            vec![9.5, 9.0, 8.5, 8.0, 7.5, 7.25]
        );
    }

    #[test]
    fn test_no_drift_with_inexact_steps() {
        let steps: Vec<f64> = StepPlan::new(0.0, 0.3, 0.1).collect();
        assert_eq!(steps.len(), 3);
        assert_eq!(*steps.last().unwrap(), 0.3);

        let steps: Vec<f64> = StepPlan::new(0.0, 180.0, 0.1).collect();
        assert_eq!(steps.len(), 1800);
        assert_eq!(*steps.last().unwrap(), 180.0);
    }

    #[test]
    fn test_zero_and_sub_step_rotations() {
        assert_eq!(StepPlan::new(45.0, 45.0, 1.0).count(), 0);

        let steps: Vec<f64> = StepPlan::new(45.0, 45.4, 1.0).collect();
        assert_eq!(steps, vec![45.4]);
    }
}
