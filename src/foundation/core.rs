use std::fmt;

/// Carriage travel direction along the needle bed.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Dir {
    /// Toward higher needle indices (knitout `+`).
    Right,
    /// Toward lower needle indices (knitout `-`).
    Left,
}

impl Dir {
    /// The opposite travel direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::Left => Self::Right,
        }
    }

    /// `+1` for rightward travel, `-1` for leftward.
    pub fn sign(self) -> i32 {
        match self {
            Self::Right => 1,
            Self::Left => -1,
        }
    }

    /// Knitout direction sign.
    pub fn as_knitout(self) -> &'static str {
        match self {
            Self::Right => "+",
            Self::Left => "-",
        }
    }
}

/// The two needle beds of a V-bed machine.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Bed {
    Front,
    Back,
}

impl Bed {
    /// The facing bed.
    pub fn opposite(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }

    /// Knitout bed prefix (`f` / `b`).
    pub fn as_knitout(self) -> &'static str {
        match self {
            Self::Front => "f",
            Self::Back => "b",
        }
    }
}

/// A single addressable needle location: bed, hook-or-slider, index.
///
/// The index here is the index as emitted to the machine; under half gauge it
/// is the physical needle, not the pattern needle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Needle {
    pub bed: Bed,
    /// Loop parked on the bed's slider rather than the needle hook.
    pub slider: bool,
    pub index: i32,
}

impl Needle {
    /// A needle-hook location.
    pub fn hook(bed: Bed, index: i32) -> Self {
        Self {
            bed,
            slider: false,
            index,
        }
    }

    /// A slider location.
    pub fn slider(bed: Bed, index: i32) -> Self {
        Self {
            bed,
            slider: true,
            index,
        }
    }
}

impl fmt::Display for Needle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slider = if self.slider { "s" } else { "" };
        write!(f, "{}{}{}", self.bed.as_knitout(), slider, self.index)
    }
}
