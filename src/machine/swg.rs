use crate::foundation::core::{Bed, Dir};
use crate::foundation::error::{CourserError, CourserResult};
use crate::machine::backend::{
    BackendKind, CastOnArgs, Fixation, MachineBackend, resolve_cast_beds,
};
use crate::machine::state::MachineState;

/// Shima Seiki SWG-class backend. Carriers ride a yarn inserting hook, and
/// both bring-in and cast-on build the same comb-like zigzag anchor. The
/// bring-in anchor lives on the back bed so a front-bed fabric never knits
/// through it before the fixation is dropped.
pub struct SwgBackend;

impl MachineBackend for SwgBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Swg
    }

    fn has_inserting_hook(&self) -> bool {
        true
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
        tracing::debug!(carrier, fix_left, fix_right, "swg bring-in");
        machine.stitch_number(stitch_number)?;
        machine.inhook(carrier)?;
        zigzag(machine, &[carrier], fix_left, fix_right, |_| Bed::Back, false)?;
        machine.releasehook(carrier)?;
        machine.set_fixation(Fixation {
            carrier,
            left: fix_left,
            right: fix_right,
            bed: Bed::Back,
            stride: 1,
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
        tracing::debug!(left = args.left, right = args.right, tube = args.tube, "swg cast-on");
        let (l, r) = (args.left, args.right);
        match (beds.as_slice(), args.tube) {
            ([a, b], true) => {
                zigzag(machine, &args.carriers, l, r, |_| *a, false)?;
                zigzag(machine, &args.carriers, l, r, |_| *b, true)?;
            }
            ([a, b], false) => {
                // Flat double-bed edge: needles alternate beds by parity.
                let (a, b) = (*a, *b);
                zigzag(
                    machine,
                    &args.carriers,
                    l,
                    r,
                    |n| if (n - l) % 2 == 0 { a } else { b },
                    false,
                )?;
            }
            ([a], _) => zigzag(machine, &args.carriers, l, r, |_| *a, false)?,
            _ => unreachable!("resolve_cast_beds yields one or two beds"),
        }
        for &c in &args.carriers {
            machine.snap_carrier(c, f64::from(l))?;
        }
        Ok(())
    }
}

/// Comb anchor over `[left, right]`: tuck even-offset needles right-to-left,
/// tuck the odd offsets back left-to-right, then knit the whole span
/// right-to-left to consolidate the zigzag into one course. `mirror` flips
/// every pass direction for the second bed of a tube.
fn zigzag<F: Fn(i32) -> Bed>(
    machine: &mut MachineState<'_>,
    carriers: &[u32],
    left: i32,
    right: i32,
    bed_for: F,
    mirror: bool,
) -> CourserResult<()> {
    let (d1, d2, d3) = if mirror {
        (Dir::Right, Dir::Left, Dir::Right)
    } else {
        (Dir::Left, Dir::Right, Dir::Left)
    };
    let mut evens: Vec<i32> = (left..=right).step_by(2).collect();
    let mut odds: Vec<i32> = (left + 1..=right).step_by(2).collect();
    let mut all: Vec<i32> = (left..=right).collect();
    if !mirror {
        evens.reverse();
        all.reverse();
    } else {
        odds.reverse();
    }
    for &n in &evens {
        machine.tuck(d1, bed_for(n), n, carriers)?;
    }
    for &n in &odds {
        machine.tuck(d2, bed_for(n), n, carriers)?;
    }
    for &n in &all {
        machine.knit(d3, bed_for(n), n, carriers)?;
    }
    Ok(())
}
