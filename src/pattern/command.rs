use crate::foundation::core::Bed;

/// Needle-drop specification: one drop character per needle starting at
/// `left` (`d` drop front, `D` drop back, `b` drop both, `.` skip).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DropSpec {
    pub left: i32,
    pub ops: String,
}

/// Parallel source/destination needle lists for one transfer sweep.
///
/// `src[i]` moves to `dst[i]` on the opposite bed; lengths are equal by
/// construction in the builder and re-checked by `Pattern::validate`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransferSpec {
    pub src: Vec<i32>,
    pub dst: Vec<i32>,
}

/// One entry in the ordered command log.
///
/// The log defines total temporal order across all yarns. Course contents are
/// not stored here; `NewCourse` names its yarns and the compile pass reads
/// each yarn's next course through a per-yarn cursor.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Command {
    NewCourse { yarns: Vec<String> },
    Comment { text: String },
    Pause { message: Option<String> },
    Rack { value: f64 },
    Drop { index: usize },
    Transfer { index: usize, source_bed: Bed },
    StitchNumber { value: Option<u32> },
}
