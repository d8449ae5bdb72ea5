use crate::foundation::core::Needle;

pub type CourserResult<T> = Result<T, CourserError>;

#[derive(thiserror::Error, Debug)]
pub enum CourserError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("pattern state error: {0}")]
    State(String),

    #[error("needle range error: {0}")]
    Range(String),

    #[error("compile error: {0}")]
    Compile(String),

    #[error("io error: {0}")]
    Io(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CourserError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

/// Recoverable compile anomalies.
///
/// Warnings are collected in emission order and also logged via `tracing`, so
/// harnesses can assert on them as values instead of scraping log text. None
/// of them aborts a compile; each documents the safe default that was taken.
#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    /// Course operation character outside the alphabet; the needle was skipped.
    UnknownOperation { op: char },
    /// Bring-in requested for a carrier already on the bed; skipped.
    CarrierAlreadyIn { carrier: u32 },
    /// Retraction requested for a carrier already parked out; skipped.
    CarrierNotIn { carrier: u32 },
    /// `map_yarn` on a yarn with no recorded courses; no effect.
    MapUnusedYarn { yarn: String },
    /// Cast-off chain loop count below 1 was clamped to 1.
    ChainLoopsClamped { requested: u32 },
    /// Transfer endpoints do not line up under the current racking; the
    /// instruction was still emitted.
    XferMisaligned {
        src: Needle,
        dst: Needle,
        racking: f64,
    },
    /// Backend-specific primitive invoked on a machine without it; the generic
    /// form was substituted.
    UnsupportedPrimitive { op: &'static str, carrier: u32 },
    /// Duplicate bed in a cast-on/cast-off request, collapsed to one bed.
    DuplicateCastBeds,
    /// Fractional racking left in place around a transfer because auto-align
    /// is disabled.
    RackingNotIntegral { racking: f64 },
    /// Carrier still on the bed when the command log ended; force-retracted.
    CarrierStillActive { carrier: u32 },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOperation { op } => {
                write!(f, "unknown course operation '{op}', needle skipped")
            }
            Self::CarrierAlreadyIn { carrier } => {
                write!(f, "carrier {carrier} is already in, bring-in skipped")
            }
            Self::CarrierNotIn { carrier } => {
                write!(f, "carrier {carrier} is not in, retraction skipped")
            }
            Self::MapUnusedYarn { yarn } => {
                write!(f, "yarn '{yarn}' has no recorded courses, mapping has no effect")
            }
            Self::ChainLoopsClamped { requested } => {
                write!(f, "cast-off chain loop count {requested} clamped to 1")
            }
            Self::XferMisaligned { src, dst, racking } => {
                write!(f, "transfer {src} -> {dst} is not aligned at racking {racking}")
            }
            Self::UnsupportedPrimitive { op, carrier } => {
                write!(
                    f,
                    "'{op}' is unavailable on this machine, generic form used for carrier {carrier}"
                )
            }
            Self::DuplicateCastBeds => {
                write!(f, "duplicate bed in cast request, collapsed to a single bed")
            }
            Self::RackingNotIntegral { racking } => {
                write!(
                    f,
                    "racking {racking} is not integral for a transfer and auto-align is off"
                )
            }
            Self::CarrierStillActive { carrier } => {
                write!(f, "carrier {carrier} still active at end of pattern, retracting")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            CourserError::invalid_argument("x")
                .to_string()
                .contains("invalid argument:")
        );
        assert!(
            CourserError::state("x")
                .to_string()
                .contains("pattern state error:")
        );
        assert!(
            CourserError::range("x")
                .to_string()
                .contains("needle range error:")
        );
        assert!(
            CourserError::compile("x")
                .to_string()
                .contains("compile error:")
        );
        assert!(CourserError::io("x").to_string().contains("io error:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = CourserError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn warnings_render_their_payload() {
        let w = Warning::UnknownOperation { op: 'q' };
        assert!(w.to_string().contains('q'));
        let w = Warning::CarrierStillActive { carrier: 4 };
        assert!(w.to_string().contains('4'));
    }
}
