//! Stepped zoom ratios for view scaling.
//!
//! A [`ZoomFactor`] is an exact rational `multiplier:divisor`, stepped
//! through a fixed ladder rather than multiplied by a float. Stepping is
//! exactly reversible around 1:1, so repeated zoom in / zoom out always
//! lands back on the same ratio, and scaled dimensions are computed in
//! integer arithmetic with no drift.
//!
//! Below 1:1 the ladder runs 2:3, 1:2, 1:3, 1:4, 1:6, 1:8, then widens
//! by four per step (1:12, 1:16, ...). Above 1:1 it is the whole
//! multipliers 2:1, 3:1, and so on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Dimensions;

/// An exact zoom ratio: output pixels per `divisor` input pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomFactor {
    multiplier: u32,
    divisor: u32,
}

impl Default for ZoomFactor {
    fn default() -> Self {
        Self::ONE
    }
}

impl ZoomFactor {
    /// The 1:1 ratio.
    pub const ONE: Self = Self {
        multiplier: 1,
        divisor: 1,
    };

    /// The next step toward magnification.
    #[must_use]
    pub const fn zoom_in(self) -> Self {
        let (multiplier, divisor) = match (self.multiplier, self.divisor) {
            (m, 1) => (m.saturating_add(1), 1),
            (2, 3) => (1, 1),
            (_, 2) => (2, 3),
            (m, 3 | 4) => (m, self.divisor - 1),
            (m, 6 | 8) => (m, self.divisor - 2),
            (m, d) => (m, d.saturating_sub(4)),
        };
        Self {
            multiplier,
            divisor,
        }
    }

    /// The next step toward reduction.
    #[must_use]
    pub const fn zoom_out(self) -> Self {
        let (multiplier, divisor) = match (self.multiplier, self.divisor) {
            (m, 1) if m >= 2 => (m - 1, 1),
            (1, 1) => (2, 3),
            (2, 3) => (1, 2),
            (m, 2 | 3) => (m, self.divisor + 1),
            (m, 4 | 6) => (m, self.divisor + 2),
            (m, d) => (m, d.saturating_add(4)),
        };
        Self {
            multiplier,
            divisor,
        }
    }

    /// Scale a single extent, truncating toward zero.
    #[must_use]
    pub fn scale(self, value: u32) -> u32 {
        let divisor = u64::from(self.divisor.max(1));
        let scaled = u64::from(value) * u64::from(self.multiplier) / divisor;
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }

    /// Scale both extents of a size.
    #[must_use]
    pub fn scale_dimensions(self, size: Dimensions) -> Dimensions {
        Dimensions::new(self.scale(size.width), self.scale(size.height))
    }

    /// The ratio as a float, for display only.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.multiplier) / f64::from(self.divisor.max(1))
    }
}

impl fmt::Display for ZoomFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.multiplier, self.divisor)
    }
}
