//! Reach counting and expectation checks.

use thiserror::Error;

/// A watch was reached a number of times outside its declared bounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Expectation failed for watch \"{watch_name}\": expected {}, but got {}.",
    describe_bounds(.min, .max),
    describe_actual(.actual)
)]
pub struct ExpectationError {
    pub watch_name: String,
    pub min: u64,
    /// `None` when there is no upper bound.
    pub max: Option<u64>,
    pub actual: u64,
}

#[allow(clippy::ref_option)]
fn describe_bounds(min: &u64, max: &Option<u64>) -> String {
    match (*min, *max) {
        (1, None) => "at least one reach".to_owned(),
        (0, Some(0)) => "no reaches".to_owned(),
        (0, Some(max)) => format!("at most {max} reaches"),
        (0, None) => "any number of reaches".to_owned(),
        (min, None) => format!("at least {min} reaches"),
        (min, Some(max)) if min == max => format!("exactly {min} reaches"),
        (min, Some(max)) => format!("between {min} and {max} reaches"),
    }
}

fn describe_actual(actual: &u64) -> String {
    if *actual == 0 {
        "none".to_owned()
    } else {
        actual.to_string()
    }
}

/// Counter and bounds of one watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reach {
    pub display_name: String,
    pub times_reached: u64,
    pub min: u64,
    pub max: Option<u64>,
}

impl Reach {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            times_reached: 0,
            min: 0,
            max: None,
        }
    }

    pub fn set_bounds(&mut self, min: u64, max: Option<u64>) {
        self.min = min;
        self.max = max;
    }

    pub fn verify(&self) -> Result<(), ExpectationError> {
        let above_min = self.times_reached >= self.min;
        let below_max = self.max.is_none_or(|max| self.times_reached <= max);
        if above_min && below_max {
            return Ok(());
        }
        Err(ExpectationError {
            watch_name: self.display_name.clone(),
            min: self.min,
            max: self.max,
            actual: self.times_reached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(min: u64, max: Option<u64>, actual: u64) -> String {
        let mut reach = Reach::new("W");
        reach.set_bounds(min, max);
        reach.times_reached = actual;
        reach.verify().unwrap_err().to_string()
    }

    #[test]
    fn default_bounds_never_fail() {
        let mut reach = Reach::new("W");
        assert!(reach.verify().is_ok());
        reach.times_reached = 1_000_000;
        assert!(reach.verify().is_ok());
    }

    #[test]
    fn messages_name_the_bound_shape() {
        assert_eq!(
            failure(1, None, 0),
            "Expectation failed for watch \"W\": expected at least one reach, but got none."
        );
        assert_eq!(
            failure(0, Some(0), 2),
            "Expectation failed for watch \"W\": expected no reaches, but got 2."
        );
        assert_eq!(
            failure(0, Some(3), 4),
            "Expectation failed for watch \"W\": expected at most 3 reaches, but got 4."
        );
        assert_eq!(
            failure(5, None, 1),
            "Expectation failed for watch \"W\": expected at least 5 reaches, but got 1."
        );
        assert_eq!(
            failure(3, Some(3), 2),
            "Expectation failed for watch \"W\": expected exactly 3 reaches, but got 2."
        );
        assert_eq!(
            failure(100, Some(200), 13),
            "Expectation failed for watch \"W\": expected between 100 and 200 reaches, but got 13."
        );
    }

    #[test]
    fn error_carries_counts() {
        let mut reach = Reach::new("BeforeCHPUT");
        reach.set_bounds(3, Some(3));
        reach.times_reached = 2;
        let err = reach.verify().unwrap_err();
        assert_eq!(err.watch_name, "BeforeCHPUT");
        assert_eq!((err.min, err.max, err.actual), (3, Some(3), 2));
    }
}
