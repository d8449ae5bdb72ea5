use std::collections::BTreeMap;
use std::path::Path;

use crate::compile::{self, GenerateOpts, GenerateReport};
use crate::emit::{InstructionSink, KnitoutFile};
use crate::foundation::core::Bed;
use crate::foundation::error::{CourserError, CourserResult, Warning};
use crate::pattern::command::{Command, DropSpec, TransferSpec};
use crate::pattern::yarn::{Course, YARN_ID_DELIMITER, Yarn, YarnRecord};

/// A course-based knit pattern: per-yarn course records plus the ordered
/// command log that fixes the temporal order of everything.
///
/// Patterns are built row by row: [`Pattern::new_course`] opens a course for
/// a yarn set, [`Pattern::insert`] fills it by cycling a repeat string, and
/// structural commands (racking, transfers, drops, stitch overrides)
/// interleave freely. [`Pattern::generate`] compiles the result into machine
/// instructions.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Pattern {
    pub(crate) yarns: BTreeMap<String, YarnRecord>,
    pub(crate) commands: Vec<Command>,
    pub(crate) drops: Vec<DropSpec>,
    pub(crate) transfers: Vec<TransferSpec>,
    /// Yarn ids of the course group currently accepting `insert` calls.
    pub(crate) open_group: Option<Vec<String>>,
    /// Leftmost needle any yarn ever used.
    pub(crate) leftmost: Option<i32>,
    /// Rightmost needle any yarn ever used.
    pub(crate) rightmost: Option<i32>,
    #[serde(skip)]
    pub(crate) warnings: Vec<Warning>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open one new course per yarn, starting at needle `offset + 1`.
    ///
    /// The yarn set becomes the open course group; subsequent
    /// [`Pattern::insert`] calls must target exactly this set. Supplied order
    /// is preserved and drives plating order at compile time.
    pub fn new_course(&mut self, yarns: &[&Yarn], offset: i32) -> CourserResult<()> {
        if yarns.is_empty() {
            return Err(CourserError::invalid_argument(
                "new_course requires at least one yarn",
            ));
        }
        let mut ids: Vec<String> = Vec::with_capacity(yarns.len());
        for yarn in yarns {
            if ids.iter().any(|id| id == yarn.id()) {
                return Err(CourserError::invalid_argument(format!(
                    "yarn '{}' listed twice in one course",
                    yarn.id()
                )));
            }
            ids.push(yarn.id().to_string());
        }
        for yarn in yarns {
            let record = self
                .yarns
                .entry(yarn.id().to_string())
                .or_insert_with(|| YarnRecord::new(yarn.carrier_hint()));
            record.courses.push(Course {
                left: offset + 1,
                ops: String::new(),
            });
        }
        self.open_group = Some(ids.clone());
        self.commands.push(Command::NewCourse { yarns: ids });
        Ok(())
    }

    /// Append `needle_count` operations to the open course of each yarn,
    /// cycling `repeat` from its first character.
    pub fn insert(
        &mut self,
        yarns: &[&Yarn],
        repeat: &str,
        needle_count: usize,
    ) -> CourserResult<()> {
        self.insert_offset(yarns, repeat, needle_count, 0)
    }

    /// [`Pattern::insert`] starting `repeat_offset` characters into the
    /// repeat. Negative offsets wrap.
    pub fn insert_offset(
        &mut self,
        yarns: &[&Yarn],
        repeat: &str,
        needle_count: usize,
        repeat_offset: i64,
    ) -> CourserResult<()> {
        if repeat.is_empty() {
            return Err(CourserError::invalid_argument(
                "insert repeat must be non-empty",
            ));
        }
        let requested: Vec<String> = yarns.iter().map(|y| y.id().to_string()).collect();
        let open = self.open_group.as_ref().ok_or_else(|| {
            CourserError::state("insert without an open course; call new_course first")
        })?;
        if canonical(open) != canonical(&requested) {
            return Err(CourserError::state(format!(
                "course group changed: open course is for [{}], insert targets [{}]",
                open.join(", "),
                requested.join(", ")
            )));
        }

        let chars: Vec<char> = repeat.chars().collect();
        let len = chars.len() as i64;
        let start = ((repeat_offset % len) + len) % len;

        for id in &requested {
            let record = self
                .yarns
                .get_mut(id)
                .ok_or_else(|| CourserError::state(format!("yarn '{id}' has no record")))?;
            let course = record
                .courses
                .last_mut()
                .ok_or_else(|| CourserError::state(format!("yarn '{id}' has no open course")))?;
            for i in 0..needle_count {
                course.ops.push(chars[((i as i64 + start) % len) as usize]);
            }
            let (left, right) = (course.left, course.right());
            record.touch_extent(left, right);
            self.touch_extent(left, right);
        }
        Ok(())
    }

    /// Request a bed racking change. Fractional values select quarter/half
    /// pitch.
    pub fn rack(&mut self, value: f64) {
        self.finish_group();
        self.commands.push(Command::Rack { value });
    }

    /// Drop loops across the pattern's full width, cycling `repeat` from the
    /// leftmost needle ever used.
    pub fn drop(
        &mut self,
        repeat: &str,
        needle_count: usize,
        repeat_offset: i64,
    ) -> CourserResult<()> {
        let left = self.leftmost.unwrap_or(1);
        self.drop_at(left - 1, repeat, needle_count, repeat_offset)
    }

    /// Drop loops starting at needle `needle_offset + 1`.
    pub fn drop_at(
        &mut self,
        needle_offset: i32,
        repeat: &str,
        needle_count: usize,
        repeat_offset: i64,
    ) -> CourserResult<()> {
        if repeat.is_empty() {
            return Err(CourserError::invalid_argument(
                "drop repeat must be non-empty",
            ));
        }
        self.finish_group();
        let chars: Vec<char> = repeat.chars().collect();
        let len = chars.len() as i64;
        let start = ((repeat_offset % len) + len) % len;
        let mut ops = String::with_capacity(needle_count);
        for i in 0..needle_count {
            ops.push(chars[((i as i64 + start) % len) as usize]);
        }
        self.drops.push(DropSpec {
            left: needle_offset + 1,
            ops,
        });
        self.commands.push(Command::Drop {
            index: self.drops.len() - 1,
        });
        Ok(())
    }

    /// Transfer loops from `source_bed` to the opposite bed. `dst` defaults
    /// to `src` (straight re-seat).
    pub fn transfer(
        &mut self,
        source_bed: Bed,
        src: &[i32],
        dst: Option<&[i32]>,
    ) -> CourserResult<()> {
        let dst = dst.unwrap_or(src);
        if src.len() != dst.len() {
            return Err(CourserError::invalid_argument(format!(
                "transfer source/destination lengths differ ({} vs {})",
                src.len(),
                dst.len()
            )));
        }
        self.finish_group();
        self.transfers.push(TransferSpec {
            src: src.to_vec(),
            dst: dst.to_vec(),
        });
        self.commands.push(Command::Transfer {
            index: self.transfers.len() - 1,
            source_bed,
        });
        Ok(())
    }

    /// Override the stitch number for all following courses.
    pub fn stitch_number_override(&mut self, value: u32) {
        self.finish_group();
        self.commands.push(Command::StitchNumber { value: Some(value) });
    }

    /// Return to per-yarn / machine-default stitch numbers.
    pub fn clear_stitch_number_override(&mut self) {
        self.finish_group();
        self.commands.push(Command::StitchNumber { value: None });
    }

    /// Emit a comment at this point of the program. Does not close the open
    /// course group.
    pub fn comment(&mut self, text: impl Into<String>) {
        self.commands.push(Command::Comment { text: text.into() });
    }

    /// Pause the machine at this point, with an optional operator message.
    /// Does not close the open course group.
    pub fn pause(&mut self, message: Option<&str>) {
        self.commands.push(Command::Pause {
            message: message.map(str::to_string),
        });
    }

    /// Assign a carrier to a yarn.
    ///
    /// `fix` selects whether bring-in anchors the yarn end with a fixation
    /// sequence. Mapping a yarn that never recorded a course is a warning,
    /// not an error: it has no effect on the output.
    pub fn map_yarn(&mut self, yarn: &Yarn, carrier: u32, fix: bool, speed_number: Option<u32>) {
        match self.yarns.get_mut(yarn.id()) {
            Some(record) if !record.courses.is_empty() => {
                record.carrier = Some(carrier);
                record.fix = fix;
                record.speed_number = speed_number;
            }
            _ => self.warn(Warning::MapUnusedYarn {
                yarn: yarn.id().to_string(),
            }),
        }
    }

    /// Set or clear a per-yarn stitch number. Same leniency as
    /// [`Pattern::map_yarn`] for unused yarns.
    pub fn yarn_stitch_number(&mut self, yarn: &Yarn, value: Option<u32>) {
        match self.yarns.get_mut(yarn.id()) {
            Some(record) if !record.courses.is_empty() => record.stitch_number = value,
            _ => self.warn(Warning::MapUnusedYarn {
                yarn: yarn.id().to_string(),
            }),
        }
    }

    /// Rigidly translate every needle reference in the pattern by `offset`.
    ///
    /// Useful before compiling when an algorithm (cast-off in particular)
    /// needs room one needle past the current leftmost stitch.
    pub fn shift(&mut self, offset: i32) {
        for record in self.yarns.values_mut() {
            for course in &mut record.courses {
                course.left += offset;
            }
            record.leftmost = record.leftmost.map(|n| n + offset);
            record.rightmost = record.rightmost.map(|n| n + offset);
        }
        for drop in &mut self.drops {
            drop.left += offset;
        }
        for transfer in &mut self.transfers {
            for n in &mut transfer.src {
                *n += offset;
            }
            for n in &mut transfer.dst {
                *n += offset;
            }
        }
        self.leftmost = self.leftmost.map(|n| n + offset);
        self.rightmost = self.rightmost.map(|n| n + offset);
    }

    /// Authoring-time warnings recorded so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Structural validation, mainly for patterns loaded from JSON: command
    /// indices must resolve and per-yarn course counts must cover the log.
    pub fn validate(&self) -> CourserResult<()> {
        for id in self.yarns.keys() {
            if id.is_empty() || id.contains(YARN_ID_DELIMITER) {
                return Err(CourserError::invalid_argument(format!(
                    "invalid yarn id '{id}'"
                )));
            }
        }
        let mut refs: BTreeMap<&str, usize> = BTreeMap::new();
        for command in &self.commands {
            match command {
                Command::NewCourse { yarns } => {
                    if yarns.is_empty() {
                        return Err(CourserError::invalid_argument(
                            "course command with no yarns",
                        ));
                    }
                    for id in yarns {
                        if !self.yarns.contains_key(id) {
                            return Err(CourserError::state(format!(
                                "course command references unknown yarn '{id}'"
                            )));
                        }
                        *refs.entry(id).or_default() += 1;
                    }
                }
                Command::Drop { index } => {
                    if *index >= self.drops.len() {
                        return Err(CourserError::state(format!(
                            "drop command references missing spec {index}"
                        )));
                    }
                }
                Command::Transfer { index, .. } => {
                    let spec = self.transfers.get(*index).ok_or_else(|| {
                        CourserError::state(format!(
                            "transfer command references missing spec {index}"
                        ))
                    })?;
                    if spec.src.len() != spec.dst.len() {
                        return Err(CourserError::invalid_argument(format!(
                            "transfer spec {index} has mismatched endpoint lists"
                        )));
                    }
                }
                _ => {}
            }
        }
        for (id, count) in refs {
            let have = self.yarns[id].courses.len();
            if count > have {
                return Err(CourserError::state(format!(
                    "command log opens {count} courses for yarn '{id}' but only {have} are recorded"
                )));
            }
        }
        Ok(())
    }

    /// Compile the pattern into `sink`.
    pub fn generate(
        &self,
        sink: &mut dyn InstructionSink,
        opts: &GenerateOpts,
    ) -> CourserResult<GenerateReport> {
        compile::generate(self, sink, opts)
    }

    /// Compile the pattern and write a knitout file to `path`.
    pub fn generate_to_path(
        &self,
        path: impl AsRef<Path>,
        opts: &GenerateOpts,
    ) -> CourserResult<GenerateReport> {
        let mut file = KnitoutFile::new();
        let report = compile::generate(self, &mut file, opts)?;
        file.write(path)?;
        Ok(report)
    }

    fn finish_group(&mut self) {
        self.open_group = None;
    }

    fn touch_extent(&mut self, left: i32, right: i32) {
        self.leftmost = Some(self.leftmost.map_or(left, |l| l.min(left)));
        self.rightmost = Some(self.rightmost.map_or(right, |r| r.max(right)));
    }

    fn warn(&mut self, warning: Warning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }
}

/// Canonical form of a yarn set: sorted ids joined by the delimiter.
fn canonical(ids: &[String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(&YARN_ID_DELIMITER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yarn(id: &str) -> Yarn {
        Yarn::new(id).unwrap()
    }

    #[test]
    fn repeat_expansion_cycles_the_pattern() {
        let y = yarn("a");
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "kK", 50).unwrap();

        let course = &p.yarns["a"].courses[0];
        assert_eq!(course.width(), 50);
        assert!(course.ops.starts_with("kKkK"));
        assert!(course.ops.ends_with("kK"));
        assert_eq!(course.left, 1);
        assert_eq!((p.leftmost, p.rightmost), (Some(1), Some(50)));
    }

    #[test]
    fn insert_concatenates_within_a_course() {
        let y = yarn("a");
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "b", 1).unwrap();
        p.insert_offset(&[&y], "b", 1, 1).unwrap();
        assert_eq!(p.yarns["a"].courses[0].ops, "bb");
    }

    #[test]
    fn negative_repeat_offset_wraps() {
        let y = yarn("a");
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert_offset(&[&y], "kK", 4, -1).unwrap();
        assert_eq!(p.yarns["a"].courses[0].ops, "KkKk");
    }

    #[test]
    fn insert_requires_matching_group() {
        let (a, b) = (yarn("a"), yarn("b"));
        let mut p = Pattern::new();
        p.new_course(&[&a, &b], 0).unwrap();
        p.insert(&[&a, &b], "k", 10).unwrap();

        let err = p.insert(&[&a], "k", 10).unwrap_err();
        assert!(matches!(err, CourserError::State(_)), "got {err:?}");
        // Same set in any order is still the same group.
        p.insert(&[&b, &a], "k", 2).unwrap();
    }

    #[test]
    fn insert_without_course_fails() {
        let y = yarn("a");
        let mut p = Pattern::new();
        assert!(matches!(
            p.insert(&[&y], "k", 1),
            Err(CourserError::State(_))
        ));
    }

    #[test]
    fn structural_commands_close_the_group() {
        let y = yarn("a");
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 5).unwrap();
        p.rack(1.0);
        assert!(p.insert(&[&y], "k", 5).is_err());

        // Comments and pauses do not.
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 2).unwrap();
        p.comment("mid-course");
        p.pause(Some("check fabric"));
        p.insert(&[&y], "k", 2).unwrap();
        assert_eq!(p.yarns["a"].courses[1].ops, "kkkk");
    }

    #[test]
    fn duplicate_yarn_in_course_rejected() {
        let y = yarn("a");
        let mut p = Pattern::new();
        assert!(matches!(
            p.new_course(&[&y, &y], 0),
            Err(CourserError::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_repeat_rejected() {
        let y = yarn("a");
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        assert!(matches!(
            p.insert(&[&y], "", 5),
            Err(CourserError::InvalidArgument(_))
        ));
    }

    #[test]
    fn map_unused_yarn_is_a_warning_not_an_error() {
        let (a, b) = (yarn("a"), yarn("b"));
        let mut p = Pattern::new();
        p.new_course(&[&a], 0).unwrap();
        p.insert(&[&a], "k", 3).unwrap();

        p.map_yarn(&b, 2, true, None);
        assert_eq!(
            p.warnings(),
            &[Warning::MapUnusedYarn {
                yarn: "b".to_string()
            }]
        );

        p.map_yarn(&a, 3, false, Some(300));
        let rec = &p.yarns["a"];
        assert_eq!(rec.carrier, Some(3));
        assert!(!rec.fix);
        assert_eq!(rec.speed_number, Some(300));
    }

    #[test]
    fn transfer_defaults_destination_and_checks_lengths() {
        let mut p = Pattern::new();
        p.transfer(Bed::Front, &[3, 4, 5], None).unwrap();
        assert_eq!(p.transfers[0].src, p.transfers[0].dst);

        assert!(matches!(
            p.transfer(Bed::Back, &[1, 2], Some(&[1])),
            Err(CourserError::InvalidArgument(_))
        ));
    }

    #[test]
    fn drop_starts_at_leftmost_by_default() {
        let y = yarn("a");
        let mut p = Pattern::new();
        p.new_course(&[&y], 4).unwrap();
        p.insert(&[&y], "k", 10).unwrap();
        p.drop("d", 10, 0).unwrap();
        assert_eq!(p.drops[0].left, 5);
        assert_eq!(p.drops[0].ops, "dddddddddd");
    }

    #[test]
    fn shift_round_trips_exactly() {
        let y = yarn("a");
        let mut p = Pattern::new();
        p.new_course(&[&y], 2).unwrap();
        p.insert(&[&y], "kKb", 7).unwrap();
        p.drop_at(1, "dD", 6, 1).unwrap();
        p.transfer(Bed::Front, &[3, 4], Some(&[5, 6])).unwrap();

        let before = serde_json::to_value(&p).unwrap();
        p.shift(4);
        assert_eq!(p.yarns["a"].courses[0].left, 7);
        assert_eq!(p.drops[0].left, 6);
        assert_eq!(p.transfers[0].src, vec![7, 8]);
        assert_eq!(p.leftmost, Some(7));
        p.shift(-4);
        assert_eq!(serde_json::to_value(&p).unwrap(), before);
    }

    #[test]
    fn validate_catches_dangling_indices() {
        let y = yarn("a");
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 3).unwrap();
        p.validate().unwrap();

        p.commands.push(Command::Drop { index: 9 });
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_catches_over_referenced_yarns() {
        let y = yarn("a");
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 3).unwrap();
        p.commands.push(Command::NewCourse {
            yarns: vec!["a".to_string()],
        });
        assert!(p.validate().is_err());
    }
}
