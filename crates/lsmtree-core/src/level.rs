//! The level index, `L0..=L7`.

use std::fmt;

/// The maximum number of levels a `Version` carries (spec.md §1: `L0..L_max`, `max=7`).
pub const NUM_LEVELS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(pub u32);

impl Level {
    pub const L0: Self = Self(0);

    #[must_use]
    pub fn is_l0(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl TryFrom<u32> for Level {
    type Error = InvalidLevel;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value < NUM_LEVELS {
            Ok(Self(value))
        } else {
            Err(InvalidLevel(value))
        }
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("level {0} exceeds the maximum level index of {}", NUM_LEVELS - 1)]
pub struct InvalidLevel(pub u32);

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}
