use std::collections::BTreeMap;
use std::fmt;

use crate::emit::InstructionSink;
use crate::foundation::core::{Bed, Dir};
use crate::foundation::error::{CourserError, CourserResult, Warning};
use crate::machine::backend::{
    BackendKind, CastOffArgs, CastOnArgs, DEFAULT_CHAIN_LOOPS, needles_in,
};
use crate::machine::spec::MachineSpec;
use crate::machine::state::{DEFAULT_DROP_OFF_MOVEMENTS, MachineState};
use crate::pattern::builder::Pattern;
use crate::pattern::command::Command;
use crate::pattern::yarn::{Course, YarnRecord};

const EPS: f64 = 1e-9;

/// Fabric position on the bed, written as the knitout `Position` header.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[value(rename_all = "verbatim")]
pub enum Position {
    #[default]
    Keep,
    Left,
    Right,
    Center,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Position::Keep => "Keep",
            Position::Left => "Left",
            Position::Right => "Right",
            Position::Center => "Center",
        };
        f.write_str(s)
    }
}

/// Options for one compile run.
#[derive(Clone, Debug)]
pub struct GenerateOpts {
    /// Free-text description, emitted as a comment after the headers.
    pub description: String,
    pub position: Position,
    pub machine: MachineSpec,
    pub backend: BackendKind,
    /// Round fractional racking to the nearest pitch around transfers and
    /// split-bearing courses, restoring it afterwards.
    pub auto_align: bool,
    /// Compile for every other needle, doubling emitted indices.
    pub half_gauge: bool,
    /// Carrier-less knit passes in the final drop-off.
    pub drop_off_movements: u32,
    /// Chain loops per needle in the closing cast-off.
    pub cast_off_chain_loops: u32,
}

impl Default for GenerateOpts {
    fn default() -> Self {
        Self {
            description: String::new(),
            position: Position::Keep,
            machine: MachineSpec::swg(),
            backend: BackendKind::Swg,
            auto_align: true,
            half_gauge: false,
            drop_off_movements: DEFAULT_DROP_OFF_MOVEMENTS,
            cast_off_chain_loops: DEFAULT_CHAIN_LOOPS,
        }
    }
}

impl GenerateOpts {
    /// Defaults for a backend, with its house machine spec.
    pub fn for_backend(kind: BackendKind) -> Self {
        Self {
            machine: MachineSpec::for_backend(kind),
            backend: kind,
            ..Self::default()
        }
    }
}

/// What a compile run produced beyond the instruction stream.
#[derive(Clone, Debug)]
pub struct GenerateReport {
    /// Non-empty authored courses compiled; a plating group counts once.
    pub courses: usize,
    /// Authoring and compile warnings, in order of occurrence.
    pub warnings: Vec<Warning>,
}

/// Compile `pattern` into `sink`.
///
/// Fatal inconsistencies abort with an error; recoverable conditions are
/// collected on the report as [`Warning`]s.
#[tracing::instrument(skip(pattern, sink, opts), fields(backend = %opts.backend))]
pub fn generate(
    pattern: &Pattern,
    sink: &mut dyn InstructionSink,
    opts: &GenerateOpts,
) -> CourserResult<GenerateReport> {
    pattern.validate()?;
    write_headers(sink, opts)?;

    let machine = MachineState::new(opts.machine.clone(), opts.backend, opts.half_gauge, sink);
    let mut pass = Pass {
        pattern,
        opts,
        machine,
        cursors: BTreeMap::new(),
        stitch_override: None,
        cast_on_checked: false,
        courses: 0,
    };
    pass.run()?;

    let mut warnings = pattern.warnings().to_vec();
    warnings.extend(pass.machine.take_warnings());
    tracing::debug!(courses = pass.courses, warnings = warnings.len(), "compile finished");
    Ok(GenerateReport {
        courses: pass.courses,
        warnings,
    })
}

fn write_headers(sink: &mut dyn InstructionSink, opts: &GenerateOpts) -> CourserResult<()> {
    sink.header("Machine", &opts.machine.name)?;
    sink.header("Gauge", &opts.machine.gauge.to_string())?;
    sink.header("Carriers", &opts.machine.carriers_header())?;
    sink.header("Position", &opts.position.to_string())?;
    if let Some(mode) = &opts.machine.presser_mode {
        sink.raw(&format!("x-presser-mode {mode}"))?;
    }
    if !opts.description.is_empty() {
        sink.comment(&opts.description)?;
    }
    Ok(())
}

/// Per-yarn progress through its recorded courses.
#[derive(Default)]
struct Cursor {
    /// Index of the next course to compile.
    next: usize,
    /// The yarn's carrier has been brought in and not yet retired.
    active: bool,
}

/// One plating member of a course group, resolved against the pattern.
struct Member<'p> {
    id: &'p str,
    record: &'p YarnRecord,
    course: &'p Course,
    carrier: u32,
}

struct Pass<'p, 'a> {
    pattern: &'p Pattern,
    opts: &'p GenerateOpts,
    machine: MachineState<'a>,
    cursors: BTreeMap<&'p str, Cursor>,
    /// Pattern-wide stitch override from the command log.
    stitch_override: Option<u32>,
    /// The implicit-cast-on decision has been made.
    cast_on_checked: bool,
    courses: usize,
}

impl<'p> Pass<'p, '_> {
    fn run(&mut self) -> CourserResult<()> {
        let pattern = self.pattern;
        for command in &pattern.commands {
            match command {
                Command::NewCourse { yarns } => self.course_group(yarns)?,
                Command::Comment { text } => self.machine.comment(text)?,
                Command::Pause { message } => self.machine.pause(message.as_deref())?,
                Command::Rack { value } => self.machine.rack(*value, false)?,
                Command::StitchNumber { value } => {
                    self.stitch_override = *value;
                    if let Some(v) = *value {
                        self.machine.stitch_number(v)?;
                    }
                }
                Command::Drop { index } => self.drop_sweep(*index)?,
                Command::Transfer { index, source_bed } => {
                    self.transfer_sweep(*index, *source_bed)?;
                }
            }
        }
        self.finish()
    }

    /// Compile one `NewCourse` command: the next recorded course of every
    /// listed yarn, knitted as a single plated pass.
    fn course_group(&mut self, yarns: &'p [String]) -> CourserResult<()> {
        let pattern = self.pattern;
        let mut members: Vec<Member<'p>> = Vec::with_capacity(yarns.len());
        for id in yarns {
            let record = pattern.yarns.get(id).ok_or_else(|| {
                CourserError::compile(format!("course references unknown yarn '{id}'"))
            })?;
            let next = self.cursors.get(id.as_str()).map_or(0, |c| c.next);
            let course = record.courses.get(next).ok_or_else(|| {
                CourserError::compile(format!("yarn '{id}' has no course {next} recorded"))
            })?;
            let carrier = record.resolved_carrier().ok_or_else(|| {
                CourserError::compile(format!(
                    "yarn '{id}' is not mapped to a carrier; call map_yarn or use a carrier hint"
                ))
            })?;
            members.push(Member { id, record, course, carrier });
        }

        let lead = &members[0];
        for m in &members[1..] {
            if m.course.ops != lead.course.ops || m.course.left != lead.course.left {
                return Err(CourserError::compile(format!(
                    "plated yarns diverge: '{}' and '{}' disagree on course {}",
                    lead.id,
                    m.id,
                    self.cursors.get(lead.id).map_or(0, |c| c.next)
                )));
            }
        }
        for m in &members {
            self.cursors.entry(m.id).or_default().next += 1;
        }

        let course = lead.course;
        if !course.is_empty() {
            let stitch = self
                .stitch_override
                .or(lead.record.stitch_number)
                .unwrap_or(self.machine.spec().default_stitch_number);
            let carriers: Vec<u32> = members.iter().map(|m| m.carrier).collect();

            // Emptiness is judged before any carrier comes in; the bring-in
            // anchor itself occupies needles.
            let was_empty = self.machine.beds_empty();
            for m in &members {
                if !self.cursors.entry(m.id).or_default().active {
                    self.activate(m, stitch)?;
                    self.cursors.entry(m.id).or_default().active = true;
                }
            }
            self.implicit_cast_on(course, &carriers, stitch, was_empty)?;

            let made_fabric = self.knit_course(course, &carriers, stitch)?;
            if made_fabric {
                for &c in &carriers {
                    self.machine.drop_fixation(c)?;
                }
            }
            self.courses += 1;
        }

        self.retire_finished(&members)
    }

    /// Bring a yarn's carrier onto the bed, anchoring the yarn end across the
    /// yarn's needle extents when the mapping asked for fixation.
    fn activate(&mut self, m: &Member<'p>, stitch: u32) -> CourserResult<()> {
        if self.machine.carrier_in_use(m.carrier) {
            self.machine.warn(Warning::CarrierAlreadyIn { carrier: m.carrier });
            return Ok(());
        }
        if let Some(v) = m.record.speed_number {
            self.machine.speed_number(v)?;
        }
        if m.record.fix {
            let (Some(left), Some(right)) = (m.record.leftmost, m.record.rightmost) else {
                return Err(CourserError::compile(format!(
                    "yarn '{}' has no needle extent to anchor against",
                    m.id
                )));
            };
            self.machine.bring_in(m.carrier, stitch, left, right)
        } else {
            self.machine.stitch_number(stitch)?;
            self.machine.bring(m.carrier)
        }
    }

    /// The very first yarn activated on an empty machine gets a cast-on over
    /// its first course's span, on the front bed, before that course knits.
    fn implicit_cast_on(
        &mut self,
        course: &Course,
        carriers: &[u32],
        stitch: u32,
        was_empty: bool,
    ) -> CourserResult<()> {
        if self.cast_on_checked {
            return Ok(());
        }
        self.cast_on_checked = true;
        let (left, right) = (course.left, course.right());
        if !was_empty || left >= right {
            return Ok(());
        }
        self.machine.cast_on(&CastOnArgs {
            carriers: carriers.to_vec(),
            left,
            right,
            stitch_number: Some(stitch),
            speed_number: None,
            beds: vec![Bed::Front],
            tube: false,
        })
    }

    /// Knit one course. Returns whether any real loop was formed, which is
    /// what releases a pending fixation.
    fn knit_course(
        &mut self,
        course: &Course,
        carriers: &[u32],
        stitch: u32,
    ) -> CourserResult<bool> {
        let (left, right) = (course.left, course.right());
        let lead = carriers[0];
        let pos = self.machine.carrier_position(lead).ok_or_else(|| {
            CourserError::compile(format!("carrier {lead} has no position on the bed"))
        })?;
        let dir = if pos < f64::from(left + right) / 2.0 {
            Dir::Right
        } else {
            Dir::Left
        };
        self.machine.stitch_number(stitch)?;

        let has_split = course.ops.chars().any(|c| matches!(c, 's' | 'S'));
        let restore = if has_split { self.align_racking()? } else { None };

        let chars: Vec<char> = course.ops.chars().collect();
        let mut fabric = false;
        for n in needles_in(dir, left, right) {
            fabric |= self.needle_op(dir, n, chars[(n - left) as usize], carriers)?;
        }

        if let Some(prev) = restore {
            self.machine.rack(prev, false)?;
        }
        Ok(fabric)
    }

    /// Execute one operation character at needle `n`, returning whether it
    /// formed a loop.
    fn needle_op(&mut self, dir: Dir, n: i32, op: char, carriers: &[u32]) -> CourserResult<bool> {
        let fabric = match op {
            '.' => false,
            'k' => {
                self.machine.knit(dir, Bed::Front, n, carriers)?;
                true
            }
            'K' => {
                self.machine.knit(dir, Bed::Back, n, carriers)?;
                true
            }
            'b' => {
                self.machine.knit(dir, Bed::Front, n, carriers)?;
                self.machine.knit(dir, Bed::Back, n, carriers)?;
                true
            }
            't' => {
                self.machine.tuck(dir, Bed::Front, n, carriers)?;
                true
            }
            'T' => {
                self.machine.tuck(dir, Bed::Back, n, carriers)?;
                true
            }
            'B' => {
                self.machine.tuck(dir, Bed::Front, n, carriers)?;
                self.machine.tuck(dir, Bed::Back, n, carriers)?;
                true
            }
            'm' => {
                self.machine.miss(dir, Bed::Front, n, carriers)?;
                false
            }
            'M' => {
                self.machine.miss(dir, Bed::Back, n, carriers)?;
                false
            }
            's' => {
                let dst = self.aligned_dst(Bed::Front, n);
                self.machine.split(dir, Bed::Front, n, dst, carriers)?;
                true
            }
            'S' => {
                let dst = self.aligned_dst(Bed::Back, n);
                self.machine.split(dir, Bed::Back, n, dst, carriers)?;
                true
            }
            'x' => {
                self.machine.knit(dir, Bed::Front, n, carriers)?;
                self.machine.tuck(dir, Bed::Back, n, carriers)?;
                true
            }
            'X' => {
                self.machine.tuck(dir, Bed::Front, n, carriers)?;
                self.machine.knit(dir, Bed::Back, n, carriers)?;
                true
            }
            other => {
                self.machine.warn(Warning::UnknownOperation { op: other });
                false
            }
        };
        Ok(fabric)
    }

    /// The opposite-bed needle aligned with `n` under the current racking.
    /// Exact when the racking is integral; rounded (and warned about by the
    /// split itself) when it is not.
    fn aligned_dst(&self, from: Bed, n: i32) -> i32 {
        let racking = self.machine.racking();
        let aligned = match from {
            Bed::Front => f64::from(n) - racking,
            Bed::Back => f64::from(n) + racking,
        };
        aligned.round() as i32
    }

    /// Round fractional racking to the nearest pitch for loop transfers,
    /// returning the value to restore afterwards. Warns instead when
    /// auto-align is off.
    fn align_racking(&mut self) -> CourserResult<Option<f64>> {
        let racking = self.machine.racking();
        if (racking - racking.round()).abs() < EPS {
            return Ok(None);
        }
        if !self.opts.auto_align {
            self.machine.warn(Warning::RackingNotIntegral { racking });
            return Ok(None);
        }
        self.machine.rack(racking.round(), false)?;
        Ok(Some(racking))
    }

    fn transfer_sweep(&mut self, index: usize, source_bed: Bed) -> CourserResult<()> {
        let spec = self.pattern.transfers.get(index).ok_or_else(|| {
            CourserError::compile(format!("transfer command references missing spec {index}"))
        })?;
        let restore = self.align_racking()?;
        for (&src, &dst) in spec.src.iter().zip(spec.dst.iter()) {
            self.machine.xfer(source_bed, src, dst, false, false)?;
        }
        if let Some(prev) = restore {
            self.machine.rack(prev, false)?;
        }
        Ok(())
    }

    fn drop_sweep(&mut self, index: usize) -> CourserResult<()> {
        let spec = self.pattern.drops.get(index).ok_or_else(|| {
            CourserError::compile(format!("drop command references missing spec {index}"))
        })?;
        let left = spec.left;
        for (i, op) in spec.ops.chars().enumerate() {
            let n = left + i as i32;
            match op {
                '.' => {}
                'd' => self.machine.drop_loop(Bed::Front, n)?,
                'D' => self.machine.drop_loop(Bed::Back, n)?,
                'b' => {
                    self.machine.drop_loop(Bed::Front, n)?;
                    self.machine.drop_loop(Bed::Back, n)?;
                }
                other => self.machine.warn(Warning::UnknownOperation { op: other }),
            }
        }
        Ok(())
    }

    /// Retire every member whose last course was just consumed. The last
    /// active carrier on the machine closes the fabric with a cast-off over
    /// the yarn's extents; earlier ones simply retract.
    fn retire_finished(&mut self, members: &[Member<'p>]) -> CourserResult<()> {
        for m in members {
            let cursor = self.cursors.entry(m.id).or_default();
            if cursor.next < m.record.courses.len() || !cursor.active {
                continue;
            }
            cursor.active = false;
            let sole = self.machine.active_carriers() == [m.carrier];
            if sole && let (Some(left), Some(right)) = (m.record.leftmost, m.record.rightmost) {
                self.machine.cast_off(&CastOffArgs {
                    carriers: vec![m.carrier],
                    left,
                    right,
                    stitch_number: None,
                    speed_number: None,
                    beds: vec![Bed::Front],
                    chain_loops: self.opts.cast_off_chain_loops,
                    tube: false,
                })?;
            } else {
                self.machine.retract(m.carrier)?;
            }
        }
        Ok(())
    }

    /// End of the command log: force-retract anything still on the bed, then
    /// shake the piece off the machine.
    fn finish(&mut self) -> CourserResult<()> {
        for id in self.machine.active_carriers() {
            self.machine.warn(Warning::CarrierStillActive { carrier: id });
            self.machine.retract(id)?;
        }
        self.machine
            .drop_off(None, None, self.opts.drop_off_movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{EmittedOp, InMemorySink};
    use crate::pattern::yarn::Yarn;

    fn compiled(pattern: &Pattern, opts: &GenerateOpts) -> (Vec<EmittedOp>, GenerateReport) {
        let mut sink = InMemorySink::new();
        let report = generate(pattern, &mut sink, opts).unwrap();
        (sink.into_ops(), report)
    }

    fn carried_knits(ops: &[EmittedOp]) -> Vec<(Dir, Bed, i32)> {
        ops.iter()
            .filter_map(|op| match op {
                EmittedOp::Knit { dir, needle, carriers } if !carriers.is_empty() => {
                    Some((*dir, needle.bed, needle.index))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn headers_come_first() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 4).unwrap();

        let opts = GenerateOpts {
            description: "swatch".to_string(),
            position: Position::Center,
            ..GenerateOpts::default()
        };
        let (ops, _) = compiled(&p, &opts);
        assert_eq!(
            &ops[..6],
            &[
                EmittedOp::Header { key: "Machine".into(), value: "SWG091N2".into() },
                EmittedOp::Header { key: "Gauge".into(), value: "15".into() },
                EmittedOp::Header {
                    key: "Carriers".into(),
                    value: "1 2 3 4 5 6 7 8 9 10".into()
                },
                EmittedOp::Header { key: "Position".into(), value: "Center".into() },
                EmittedOp::Raw { line: "x-presser-mode auto".into() },
                EmittedOp::Comment { text: "swatch".into() },
            ]
        );
    }

    #[test]
    fn first_course_casts_on_then_knits_rightward() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        for _ in 0..2 {
            p.new_course(&[&y], 0).unwrap();
            p.insert(&[&y], "k", 6).unwrap();
        }

        let (ops, report) = compiled(&p, &GenerateOpts::default());
        assert_eq!(report.courses, 2);
        assert!(report.warnings.is_empty(), "got {:?}", report.warnings);

        // Cast-on leaves the carrier at needle 1, so the first course walks
        // right and the second walks back left.
        let front: Vec<(Dir, i32)> = carried_knits(&ops)
            .into_iter()
            .filter(|(_, bed, _)| *bed == Bed::Front)
            .map(|(dir, _, n)| (dir, n))
            .collect();
        let course1 = &front[6..12];
        let course2 = &front[12..18];
        assert_eq!(course1[0], (Dir::Right, 1));
        assert_eq!(course1[5], (Dir::Right, 6));
        assert_eq!(course2[0], (Dir::Left, 6));
        assert_eq!(course2[5], (Dir::Left, 1));
    }

    #[test]
    fn only_the_first_activation_casts_on() {
        let a = Yarn::with_carrier("a", 1).unwrap();
        let b = Yarn::with_carrier("b", 2).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&a], 0).unwrap();
        p.insert(&[&a], "k", 4).unwrap();
        p.new_course(&[&b], 0).unwrap();
        p.insert(&[&b], "k", 4).unwrap();
        p.new_course(&[&a], 0).unwrap();
        p.insert(&[&a], "k", 4).unwrap();

        let (ops, _) = compiled(&p, &GenerateOpts::default());
        let tucks = ops
            .iter()
            .filter(|op| matches!(op, EmittedOp::Tuck { .. }))
            .count();
        // One bring-in anchor per yarn (4 tucks each over the 4-needle
        // extent) plus one cast-on zigzag; a second cast-on would add 4 more.
        assert_eq!(tucks, 12);
    }

    #[test]
    fn unmapped_yarn_is_fatal() {
        let y = Yarn::new("a").unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 3).unwrap();

        let mut sink = InMemorySink::new();
        let err = generate(&p, &mut sink, &GenerateOpts::default()).unwrap_err();
        assert!(matches!(err, CourserError::Compile(_)), "got {err:?}");
    }

    #[test]
    fn plating_divergence_is_fatal() {
        let a = Yarn::with_carrier("a", 1).unwrap();
        let b = Yarn::with_carrier("b", 2).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&a, &b], 0).unwrap();
        p.insert(&[&a, &b], "k", 4).unwrap();
        // A hand-tampered record, as a broken JSON import would produce.
        p.yarns.get_mut("b").unwrap().courses[0].ops = "tttt".to_string();

        let mut sink = InMemorySink::new();
        let err = generate(&p, &mut sink, &GenerateOpts::default()).unwrap_err();
        assert!(matches!(err, CourserError::Compile(_)));
    }

    #[test]
    fn plated_course_lists_carriers_in_order() {
        let a = Yarn::with_carrier("a", 4).unwrap();
        let b = Yarn::with_carrier("b", 2).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&a, &b], 0).unwrap();
        p.insert(&[&a, &b], "k", 3).unwrap();

        let (ops, _) = compiled(&p, &GenerateOpts::default());
        let plated: Vec<Vec<u32>> = ops
            .iter()
            .filter_map(|op| match op {
                EmittedOp::Knit { carriers, needle, .. }
                    if carriers.len() == 2 && needle.bed == Bed::Front =>
                {
                    Some(carriers.clone())
                }
                _ => None,
            })
            .collect();
        assert!(!plated.is_empty());
        assert!(plated.iter().all(|c| c == &[4, 2]));
    }

    #[test]
    fn plating_retires_lead_by_retract_and_last_by_cast_off() {
        let a = Yarn::with_carrier("a", 1).unwrap();
        let b = Yarn::with_carrier("b", 2).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&a, &b], 0).unwrap();
        p.insert(&[&a, &b], "k", 4).unwrap();

        let (ops, _) = compiled(&p, &GenerateOpts::default());
        let outhooks: Vec<u32> = ops
            .iter()
            .filter_map(|op| match op {
                EmittedOp::Outhook { carrier } => Some(*carrier),
                _ => None,
            })
            .collect();
        assert_eq!(outhooks, vec![1, 2]);
        // Carrier 2 closed the fabric: chain transfers exist.
        assert!(ops.iter().any(|op| matches!(op, EmittedOp::Xfer { .. })));
    }

    #[test]
    fn unknown_op_warns_and_skips() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "kqk", 3).unwrap();

        let (_, report) = compiled(&p, &GenerateOpts::default());
        assert!(
            report
                .warnings
                .contains(&Warning::UnknownOperation { op: 'q' })
        );
    }

    #[test]
    fn stitch_resolution_prefers_override_then_yarn_then_default() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 2).unwrap();
        p.stitch_number_override(9);
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 2).unwrap();
        p.clear_stitch_number_override();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 2).unwrap();
        p.yarn_stitch_number(&y, Some(7));

        let (ops, _) = compiled(&p, &GenerateOpts::default());
        let stitches: Vec<u32> = ops
            .iter()
            .filter_map(|op| match op {
                EmittedOp::StitchNumber { value } => Some(*value),
                _ => None,
            })
            .collect();
        // Yarn override 7 for courses outside the pattern-wide override 9;
        // redundant changes are suppressed in between.
        assert_eq!(stitches, vec![7, 9, 7]);
    }

    #[test]
    fn transfer_auto_aligns_and_restores_racking() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 4).unwrap();
        p.rack(0.25);
        p.transfer(Bed::Front, &[2, 3], None).unwrap();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 4).unwrap();

        let (ops, report) = compiled(&p, &GenerateOpts::default());
        assert!(
            !report
                .warnings
                .iter()
                .any(|w| matches!(w, Warning::XferMisaligned { .. })),
            "got {:?}",
            report.warnings
        );
        let racks: Vec<f64> = ops
            .iter()
            .filter_map(|op| match op {
                EmittedOp::Rack { value } => Some(*value),
                _ => None,
            })
            .collect();
        // 0.25 from the pattern, 0 around the transfer, 0.25 restored; the
        // closing cast-off and drop-off rack on their own after that.
        assert_eq!(&racks[..3], &[0.25, 0.0, 0.25]);
    }

    #[test]
    fn disabled_auto_align_warns_and_transfers_anyway() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 4).unwrap();
        p.rack(0.25);
        p.transfer(Bed::Front, &[2], None).unwrap();

        let opts = GenerateOpts { auto_align: false, ..GenerateOpts::default() };
        let (ops, report) = compiled(&p, &opts);
        assert!(
            report
                .warnings
                .iter()
                .any(|w| matches!(w, Warning::RackingNotIntegral { .. }))
        );
        assert!(
            report
                .warnings
                .iter()
                .any(|w| matches!(w, Warning::XferMisaligned { .. }))
        );
        assert!(ops.iter().any(|op| matches!(op, EmittedOp::Xfer { .. })));
    }

    #[test]
    fn split_course_auto_aligns_and_targets_the_aligned_needle() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 4).unwrap();
        p.rack(1.25);
        p.new_course(&[&y], 1).unwrap();
        p.insert(&[&y], "s", 2).unwrap();

        let (ops, report) = compiled(&p, &GenerateOpts::default());
        assert!(
            !report
                .warnings
                .iter()
                .any(|w| matches!(w, Warning::XferMisaligned { .. })),
            "got {:?}",
            report.warnings
        );
        let splits: Vec<(i32, i32)> = ops
            .iter()
            .filter_map(|op| match op {
                EmittedOp::Split { src, dst, .. } => Some((src.index, dst.index)),
                _ => None,
            })
            .collect();
        // At the aligned racking of 1, front needle n faces back needle n-1.
        assert_eq!(splits, vec![(3, 2), (2, 1)]);
        let racks: Vec<f64> = ops
            .iter()
            .filter_map(|op| match op {
                EmittedOp::Rack { value } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(&racks[..3], &[1.25, 1.0, 1.25]);
    }

    #[test]
    fn fixation_drops_after_the_first_fabric_course() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        for _ in 0..2 {
            p.new_course(&[&y], 0).unwrap();
            p.insert(&[&y], "k", 4).unwrap();
        }

        let (ops, _) = compiled(&p, &GenerateOpts::default());
        // The anchor lives on the back bed; a front-only fabric leaves it
        // untouched until the course-1 release drops all four columns.
        let first_back_drop = ops
            .iter()
            .position(|op| matches!(op, EmittedOp::Drop { needle } if needle.bed == Bed::Back))
            .unwrap();
        let last_course1_knit = ops
            .iter()
            .rposition(
                |op| matches!(op, EmittedOp::Knit { needle, carriers, .. } if needle.bed == Bed::Front && carriers == &[3] ),
            )
            .unwrap();
        assert!(
            first_back_drop < last_course1_knit,
            "anchor should release before knitting ends"
        );
        let back_drops = ops
            .iter()
            .filter(|op| matches!(op, EmittedOp::Drop { needle } if needle.bed == Bed::Back))
            .count();
        // 4 fixation columns plus the 4 back-bed needles of the drop-off.
        assert_eq!(back_drops, 8);
    }

    #[test]
    fn unfixed_yarn_comes_in_without_an_anchor() {
        let y = Yarn::new("a").unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 3).unwrap();
        p.map_yarn(&y, 5, false, None);

        let (ops, _) = compiled(&p, &GenerateOpts::default());
        let hook_pair = ops
            .iter()
            .position(|op| matches!(op, EmittedOp::Inhook { carrier: 5 }))
            .unwrap();
        assert_eq!(
            ops[hook_pair + 1],
            EmittedOp::Releasehook { carrier: 5 },
            "no anchor between hook-in and release"
        );
    }

    #[test]
    fn drop_command_expands_its_alphabet() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "b", 4).unwrap();
        p.drop("d.Db", 4, 0).unwrap();

        let (ops, _) = compiled(&p, &GenerateOpts::default());
        let drops: Vec<(Bed, i32)> = ops
            .iter()
            .filter_map(|op| match op {
                EmittedOp::Drop { needle } => Some((needle.bed, needle.index)),
                _ => None,
            })
            .collect();
        // Fixation release (back 1..4) and the cast-off bind (front 1..4)
        // come first; the authored sweep follows.
        assert_eq!(
            &drops[8..12],
            &[(Bed::Front, 1), (Bed::Back, 3), (Bed::Front, 4), (Bed::Back, 4)]
        );
    }

    #[test]
    fn empty_course_compiles_to_nothing() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();

        let (ops, report) = compiled(&p, &GenerateOpts::default());
        assert_eq!(report.courses, 0);
        assert!(
            ops.iter()
                .all(|op| matches!(op, EmittedOp::Header { .. } | EmittedOp::Raw { .. }))
        );
    }

    #[test]
    fn comments_and_pauses_pass_through_in_order() {
        let y = Yarn::with_carrier("a", 3).unwrap();
        let mut p = Pattern::new();
        p.new_course(&[&y], 0).unwrap();
        p.insert(&[&y], "k", 2).unwrap();
        p.comment("waistband done");
        p.pause(Some("swap cone"));

        let (ops, _) = compiled(&p, &GenerateOpts::default());
        let comment = ops
            .iter()
            .position(|op| op == &EmittedOp::Comment { text: "waistband done".into() })
            .unwrap();
        let pause = ops
            .iter()
            .position(|op| {
                op == &EmittedOp::Pause { message: Some("swap cone".into()) }
            })
            .unwrap();
        assert!(comment < pause);
    }
}
