//! Backend dispatch: the operations whose instruction sequences differ
//! between machine families, plus the shared chained bind-off they both use.

use std::fmt;

use crate::foundation::core::{Bed, Dir};
use crate::foundation::error::{CourserError, CourserResult, Warning};
use crate::machine::kniterate::KniterateBackend;
use crate::machine::state::MachineState;
use crate::machine::swg::SwgBackend;

/// Default number of chain loops knitted per needle during cast-off.
pub const DEFAULT_CHAIN_LOOPS: u32 = 3;

/// Supported machine families.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Shima Seiki SWG-class machines with a yarn inserting hook.
    Swg,
    /// Kniterate machines, hookless.
    Kniterate,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Swg => write!(f, "swg"),
            BackendKind::Kniterate => write!(f, "kniterate"),
        }
    }
}

/// A pending temporary yarn anchor, recorded by bring-in and dropped once
/// the carrier has knitted real fabric.
#[derive(Clone, Debug, PartialEq)]
pub struct Fixation {
    pub carrier: u32,
    pub left: i32,
    pub right: i32,
    pub bed: Bed,
    /// Needle spacing of the anchor loops; dropping walks `left..=right` at
    /// this stride.
    pub stride: i32,
}

/// Cast-on request. `beds` selects the target bed(s); `tube` casts each bed
/// independently for circular work instead of alternating a flat edge.
#[derive(Clone, Debug, PartialEq)]
pub struct CastOnArgs {
    pub carriers: Vec<u32>,
    pub left: i32,
    pub right: i32,
    pub stitch_number: Option<u32>,
    pub speed_number: Option<u32>,
    pub beds: Vec<Bed>,
    pub tube: bool,
}

impl CastOnArgs {
    /// Single carrier, front bed, flat.
    pub fn single(carrier: u32, left: i32, right: i32) -> Self {
        Self {
            carriers: vec![carrier],
            left,
            right,
            stitch_number: None,
            speed_number: None,
            beds: vec![Bed::Front],
            tube: false,
        }
    }
}

/// Cast-off request. Flat work is first unified onto `beds[0]`; tube work
/// binds each bed separately in mirrored directions.
#[derive(Clone, Debug, PartialEq)]
pub struct CastOffArgs {
    pub carriers: Vec<u32>,
    pub left: i32,
    pub right: i32,
    pub stitch_number: Option<u32>,
    pub speed_number: Option<u32>,
    pub beds: Vec<Bed>,
    pub chain_loops: u32,
    pub tube: bool,
}

impl CastOffArgs {
    /// Single carrier, front bed, flat, default chain count.
    pub fn single(carrier: u32, left: i32, right: i32) -> Self {
        Self {
            carriers: vec![carrier],
            left,
            right,
            stitch_number: None,
            speed_number: None,
            beds: vec![Bed::Front],
            chain_loops: DEFAULT_CHAIN_LOOPS,
            tube: false,
        }
    }
}

/// The operations that differ per machine family. Everything else compiles
/// through the shared [`MachineState`] primitives.
pub trait MachineBackend: Sync {
    fn kind(&self) -> BackendKind;

    /// Whether the machine has a yarn inserting hook (`inhook`,
    /// `releasehook`, `outhook`).
    fn has_inserting_hook(&self) -> bool;

    /// Bring a carrier onto the bed and anchor its free yarn end across
    /// `[fix_left, fix_right]`, recording the anchor for a later drop.
    fn bring_in(
        &self,
        machine: &mut MachineState<'_>,
        carrier: u32,
        stitch_number: u32,
        fix_left: i32,
        fix_right: i32,
    ) -> CourserResult<()>;

    /// Build a first anchored course on empty needles.
    fn cast_on(&self, machine: &mut MachineState<'_>, args: &CastOnArgs) -> CourserResult<()>;

    /// Bind off live loops and retract the carriers. Both current families
    /// share the chained bind-off.
    fn cast_off(&self, machine: &mut MachineState<'_>, args: &CastOffArgs) -> CourserResult<()> {
        chained_cast_off(machine, args)
    }
}

/// Backend singleton for a [`BackendKind`].
pub fn backend_for(kind: BackendKind) -> &'static dyn MachineBackend {
    static SWG: SwgBackend = SwgBackend;
    static KNITERATE: KniterateBackend = KniterateBackend;
    match kind {
        BackendKind::Swg => &SWG,
        BackendKind::Kniterate => &KNITERATE,
    }
}

/// Validate a cast bed list: one or two beds, duplicates collapsed with a
/// warning.
pub(crate) fn resolve_cast_beds(
    machine: &mut MachineState<'_>,
    beds: &[Bed],
) -> CourserResult<Vec<Bed>> {
    match beds {
        [] => Err(CourserError::invalid_argument(
            "cast request needs at least one bed",
        )),
        [a, b] if a == b => {
            machine.warn(Warning::DuplicateCastBeds);
            Ok(vec![*a])
        }
        [_] | [_, _] => Ok(beds.to_vec()),
        _ => Err(CourserError::invalid_argument(
            "cast request names more than two beds",
        )),
    }
}

/// Chained bind-off shared by both backends.
///
/// Direction follows the course rule: carrier left of the range midpoint
/// walks right, binding `[left, right-1]` and finishing at `right`; right of
/// the midpoint mirrors. Each bound needle knits `chain_loops` chain loops,
/// hands its loop one needle along via transfer, racking shift and
/// counter-transfer, then drops the vacated needle. Carriers retract before
/// the final drop so the last loop cannot unravel while still under tension.
pub(crate) fn chained_cast_off(
    machine: &mut MachineState<'_>,
    args: &CastOffArgs,
) -> CourserResult<()> {
    if args.left > args.right {
        return Err(CourserError::invalid_argument(format!(
            "cast-off range [{}, {}] is inverted",
            args.left, args.right
        )));
    }
    let Some(&lead) = args.carriers.first() else {
        return Err(CourserError::invalid_argument(
            "cast-off needs at least one carrier",
        ));
    };
    let beds = resolve_cast_beds(machine, &args.beds)?;
    let chain = if args.chain_loops < 1 {
        machine.warn(Warning::ChainLoopsClamped {
            requested: args.chain_loops,
        });
        1
    } else {
        args.chain_loops
    };
    if let Some(v) = args.stitch_number {
        machine.stitch_number(v)?;
    }
    if let Some(v) = args.speed_number {
        machine.speed_number(v)?;
    }
    let pos = machine.carrier_position(lead).ok_or_else(|| {
        CourserError::compile(format!("carrier {lead} is not on the bed for cast-off"))
    })?;
    let walk = if pos < f64::from(args.left + args.right) / 2.0 {
        Dir::Right
    } else {
        Dir::Left
    };

    if args.tube {
        let last = beds.len() - 1;
        for (i, &bed) in beds.iter().enumerate() {
            let dir = if i == 0 { walk } else { walk.reversed() };
            bind_bed(machine, args, bed, dir, chain, i == last)?;
        }
    } else {
        let working = beds[0];
        machine.rack(0.0, false)?;
        for n in args.left..=args.right {
            if machine.occupied(working.opposite(), n) {
                machine.xfer(working.opposite(), n, n, false, false)?;
            }
        }
        bind_bed(machine, args, working, walk, chain, true)?;
    }
    Ok(())
}

/// Bind off one bed: knit across in `walk` direction, then chain each needle
/// toward the far end. `retract` retracts the carriers just before the
/// terminal drop.
fn bind_bed(
    machine: &mut MachineState<'_>,
    args: &CastOffArgs,
    bed: Bed,
    walk: Dir,
    chain: u32,
    retract: bool,
) -> CourserResult<()> {
    let (l, r) = (args.left, args.right);
    machine.rack(0.0, false)?;
    for n in needles_in(walk, l, r) {
        machine.knit(walk, bed, n, &args.carriers)?;
    }

    // Handing the loop from n to n+step needs the opposite bed racked one
    // pitch over; which sign depends on the walk direction and source bed.
    let step = if walk == Dir::Right { 1 } else { -1 };
    let shift = match (walk, bed) {
        (Dir::Right, Bed::Front) | (Dir::Left, Bed::Back) => 1.0,
        (Dir::Right, Bed::Back) | (Dir::Left, Bed::Front) => -1.0,
    };
    let mut d = walk.reversed();
    let terminal = if walk == Dir::Right { r } else { l };
    for n in needles_in(walk, l, r) {
        if n == terminal {
            break;
        }
        for _ in 0..chain {
            machine.knit(d, bed, n, &args.carriers)?;
            d = d.reversed();
        }
        machine.xfer(bed, n, n, false, false)?;
        machine.rack(shift, false)?;
        machine.xfer(bed.opposite(), n, n + step, false, false)?;
        machine.rack(0.0, false)?;
        machine.drop_loop(bed, n)?;
    }
    for _ in 0..chain {
        machine.knit(d, bed, terminal, &args.carriers)?;
        d = d.reversed();
    }
    if retract {
        for &c in &args.carriers {
            machine.retract(c)?;
        }
    }
    machine.drop_loop(bed, terminal)
}

pub(crate) fn needles_in(dir: Dir, left: i32, right: i32) -> Box<dyn Iterator<Item = i32>> {
    match dir {
        Dir::Right => Box::new(left..=right),
        Dir::Left => Box::new((left..=right).rev()),
    }
}
