use crate::foundation::core::{Bed, Dir};
use crate::foundation::error::{CourserError, CourserResult};
use crate::machine::backend::{
    BackendKind, CastOnArgs, Fixation, MachineBackend, resolve_cast_beds,
};
use crate::machine::state::MachineState;

/// Needle spacing of the bring-in anchor tucks.
const FIXATION_STRIDE: i32 = 5;

/// Kniterate backend. No inserting hook: the yarn tail is anchored by
/// stride tucks on the back bed instead, and cast-on relies on
/// alternating-direction knits that twist into anchors on bare needles.
pub struct KniterateBackend;

impl MachineBackend for KniterateBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Kniterate
    }

    fn has_inserting_hook(&self) -> bool {
        false
    }

    fn bring_in(
        &self,
        machine: &mut MachineState<'_>,
        carrier: u32,
        stitch_number: u32,
        fix_left: i32,
        fix_right: i32,
    ) -> CourserResult<()> {
        if fix_left > fix_right {
            return Err(CourserError::invalid_argument(format!(
                "fixation range [{fix_left}, {fix_right}] is inverted"
            )));
        }
        tracing::debug!(carrier, fix_left, fix_right, "kniterate bring-in");
        machine.stitch_number(stitch_number)?;
        machine.carrier_in(carrier)?;
        let mut n = fix_right;
        let mut lowest = fix_right;
        while n >= fix_left {
            machine.tuck(Dir::Left, Bed::Back, n, &[carrier])?;
            lowest = n;
            n -= FIXATION_STRIDE;
        }
        machine.set_fixation(Fixation {
            carrier,
            left: lowest,
            right: fix_right,
            bed: Bed::Back,
            stride: FIXATION_STRIDE,
        });
        Ok(())
    }

    fn cast_on(&self, machine: &mut MachineState<'_>, args: &CastOnArgs) -> CourserResult<()> {
        if args.left >= args.right {
            return Err(CourserError::invalid_argument(format!(
                "cast-on range [{}, {}] needs at least two needles",
                args.left, args.right
            )));
        }
        let beds = resolve_cast_beds(machine, &args.beds)?;
        if let Some(v) = args.stitch_number {
            machine.stitch_number(v)?;
        }
        if let Some(v) = args.speed_number {
            machine.speed_number(v)?;
        }
        tracing::debug!(left = args.left, right = args.right, tube = args.tube, "kniterate cast-on");
        let (l, r) = (args.left, args.right);
        match (beds.as_slice(), args.tube) {
            ([a, b], true) => {
                parity_pass(machine, &args.carriers, l, r, |_| *a, false)?;
                parity_pass(machine, &args.carriers, l, r, |_| *b, true)?;
            }
            ([a, b], false) => {
                let (a, b) = (*a, *b);
                parity_pass(
                    machine,
                    &args.carriers,
                    l,
                    r,
                    |n| if (n - l) % 2 == 0 { a } else { b },
                    false,
                )?;
            }
            ([a], _) => {
                parity_pass(machine, &args.carriers, l, r, |_| *a, false)?;
                straighten(machine, *a, l, r)?;
            }
            _ => unreachable!("resolve_cast_beds yields one or two beds"),
        }
        for &c in &args.carriers {
            machine.snap_carrier(c, f64::from(l))?;
        }
        Ok(())
    }
}

/// Anchor knits on bare needles: even offsets knitted left-to-right, odd
/// offsets knitted back right-to-left, so consecutive loops twist against
/// each other. `mirror` flips both passes for the second bed of a tube.
fn parity_pass<F: Fn(i32) -> Bed>(
    machine: &mut MachineState<'_>,
    carriers: &[u32],
    left: i32,
    right: i32,
    bed_for: F,
    mirror: bool,
) -> CourserResult<()> {
    let (d1, d2) = if mirror {
        (Dir::Left, Dir::Right)
    } else {
        (Dir::Right, Dir::Left)
    };
    let mut evens: Vec<i32> = (left..=right).step_by(2).collect();
    let mut odds: Vec<i32> = (left + 1..=right).step_by(2).collect();
    if mirror {
        evens.reverse();
    } else {
        odds.reverse();
    }
    for &n in &evens {
        machine.knit(d1, bed_for(n), n, carriers)?;
    }
    for &n in &odds {
        machine.knit(d2, bed_for(n), n, carriers)?;
    }
    Ok(())
}

/// Re-seat every cast-on loop through the opposite bed and back, so twisted
/// anchor loops all sit with uniform ownership before real knitting starts.
/// Runs at zero racking and restores the previous racking after.
fn straighten(machine: &mut MachineState<'_>, bed: Bed, left: i32, right: i32) -> CourserResult<()> {
    let prev = machine.racking();
    machine.rack(0.0, false)?;
    for n in left..=right {
        machine.xfer(bed, n, n, false, false)?;
        machine.xfer(bed.opposite(), n, n, false, false)?;
    }
    machine.rack(prev, false)
}
