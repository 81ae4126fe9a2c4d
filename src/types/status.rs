//! Water status classification and the fixed-margin status evaluator

use serde::{Deserialize, Serialize};

use crate::sensors::SafeRange;

/// Classification thresholds shared by every sensor kind
pub mod status_thresholds {
    /// Absolute distance from either bound of the safe range that is reported
    /// as `Warning` instead of `Normal`.
    ///
    /// Applied identically to every sensor regardless of unit: large relative to
    /// a pH range of width 2, negligible for a TDS range of width 500.
    pub const WARNING_MARGIN: f64 = 0.5;
}

/// Severity classification of a single reading
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    #[default]
    Normal = 0,
    Warning = 1,
    Danger = 2,
}

impl Status {
    /// All severities in ascending rank order
    pub const ALL: [Status; 3] = [Status::Normal, Status::Warning, Status::Danger];

    /// Severity rank: 0 (Normal), 1 (Warning), 2 (Danger)
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Label written to the time-series store and returned to callers
    pub const fn label(self) -> &'static str {
        match self {
            Status::Normal => "Normal",
            Status::Warning => "Warning",
            Status::Danger => "Danger",
        }
    }

    /// Display color used by dashboards
    pub const fn color(self) -> &'static str {
        match self {
            Status::Normal => "green",
            Status::Warning => "orange",
            Status::Danger => "red",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify `value` against `range`.
///
/// 1. Outside `[min, max]` is `Danger`.
/// 2. Within `WARNING_MARGIN` of either bound (inclusive) is `Warning`.
/// 3. Everything else is `Normal`.
///
/// Total over `f64`. `NaN` fails every comparison and therefore classifies as
/// `Normal`; the extraction layer never hands a non-finite value to the
/// pipeline, so this only matters for direct callers.
pub fn evaluate(value: f64, range: &SafeRange) -> Status {
    use status_thresholds::WARNING_MARGIN;

    if value < range.min || value > range.max {
        return Status::Danger;
    }
    if value <= range.min + WARNING_MARGIN || value >= range.max - WARNING_MARGIN {
        return Status::Warning;
    }
    Status::Normal
}
