use crate::foundation::error::{CourserError, CourserResult};

/// Separator used for the canonical sorted join of yarn ids when comparing
/// course groups; yarn ids therefore must not contain it.
pub const YARN_ID_DELIMITER: char = ';';

/// Handle to a yarn: an identifier plus an optional preferred carrier.
///
/// Handles are cheap to clone and immutable once created; all mutable state
/// lives in the [`YarnRecord`] the pattern keeps per id.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Yarn {
    id: String,
    carrier_hint: Option<u32>,
}

impl Yarn {
    /// Create a yarn handle. The id must be non-empty and free of
    /// [`YARN_ID_DELIMITER`].
    pub fn new(id: impl Into<String>) -> CourserResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CourserError::invalid_argument("yarn id must be non-empty"));
        }
        if id.contains(YARN_ID_DELIMITER) {
            return Err(CourserError::invalid_argument(format!(
                "yarn id '{id}' must not contain '{YARN_ID_DELIMITER}'"
            )));
        }
        Ok(Self {
            id,
            carrier_hint: None,
        })
    }

    /// Create a yarn handle with a preferred carrier, used at compile time
    /// when the yarn was never explicitly mapped.
    pub fn with_carrier(id: impl Into<String>, carrier: u32) -> CourserResult<Self> {
        let mut yarn = Self::new(id)?;
        yarn.carrier_hint = Some(carrier);
        Ok(yarn)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn carrier_hint(&self) -> Option<u32> {
        self.carrier_hint
    }
}

/// One knitted row: operation characters over a contiguous needle range.
///
/// `ops[i]` applies to needle `left + i`. The alphabet is matched in the
/// compile pass; unknown characters are skipped there with a warning.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Course {
    /// Needle under the first operation character.
    pub left: i32,
    pub ops: String,
}

impl Course {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Needle count covered by this course.
    pub fn width(&self) -> usize {
        self.ops.chars().count()
    }

    /// Needle under the last operation character.
    ///
    /// Meaningless for an empty course; callers check [`Course::is_empty`]
    /// first.
    pub fn right(&self) -> i32 {
        self.left + self.width() as i32 - 1
    }
}

/// Per-yarn aggregate: recorded courses plus carrier assignment and extents.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct YarnRecord {
    pub courses: Vec<Course>,
    /// Leftmost needle this yarn ever used.
    pub leftmost: Option<i32>,
    /// Rightmost needle this yarn ever used.
    pub rightmost: Option<i32>,
    /// Carrier assigned via `map_yarn`.
    pub carrier: Option<u32>,
    /// Whether bring-in anchors the yarn end with a fixation sequence.
    pub fix: bool,
    /// Per-yarn stitch number, overriding the machine default.
    pub stitch_number: Option<u32>,
    /// Carrier speed applied when the carrier is activated.
    pub speed_number: Option<u32>,
    /// Hint copied from the [`Yarn`] handle at first use.
    pub carrier_hint: Option<u32>,
}

impl YarnRecord {
    pub(crate) fn new(carrier_hint: Option<u32>) -> Self {
        Self {
            courses: Vec::new(),
            leftmost: None,
            rightmost: None,
            carrier: None,
            fix: true,
            stitch_number: None,
            speed_number: None,
            carrier_hint,
        }
    }

    /// The carrier this yarn compiles with: explicit mapping first, hint
    /// second.
    pub fn resolved_carrier(&self) -> Option<u32> {
        self.carrier.or(self.carrier_hint)
    }

    pub(crate) fn touch_extent(&mut self, left: i32, right: i32) {
        self.leftmost = Some(self.leftmost.map_or(left, |l| l.min(left)));
        self.rightmost = Some(self.rightmost.map_or(right, |r| r.max(right)));
    }
}
