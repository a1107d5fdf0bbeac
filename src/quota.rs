use std::fmt;

/// A bound on the values a metric may reach.
///
/// Quotas are advisory, post-facto signals: a violating record is persisted
/// first and the violation raised afterward. The boundary itself is always
/// acceptable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Quota {
    UpperBound(f64),
    LowerBound(f64),
}

impl Quota {
    /// An upper bound: values above `limit` violate.
    pub fn less_than(limit: f64) -> Quota {
        Quota::UpperBound(limit)
    }

    /// A lower bound: values below `limit` violate.
    pub fn more_than(limit: f64) -> Quota {
        Quota::LowerBound(limit)
    }

    pub fn bound(&self) -> f64 {
        match self {
            Quota::UpperBound(limit) | Quota::LowerBound(limit) => *limit,
        }
    }

    pub fn is_upper_bound(&self) -> bool {
        matches!(self, Quota::UpperBound(_))
    }

    /// Whether `value` is within the bound.
    pub fn acceptable(&self, value: f64) -> bool {
        match self {
            Quota::UpperBound(limit) => value <= *limit,
            Quota::LowerBound(limit) => value >= *limit,
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Quota::UpperBound(limit) => write!(f, "upper bound of {}", limit),
            Quota::LowerBound(limit) => write!(f, "lower bound of {}", limit),
        }
    }
}
