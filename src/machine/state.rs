use std::collections::BTreeMap;

use crate::emit::InstructionSink;
use crate::foundation::core::{Bed, Dir, Needle};
use crate::foundation::error::{CourserError, CourserResult, Warning};
use crate::machine::backend::{
    BackendKind, CastOffArgs, CastOnArgs, Fixation, MachineBackend, backend_for, needles_in,
};
use crate::machine::bed::BedState;
use crate::machine::carrier::Carrier;
use crate::machine::spec::MachineSpec;

/// Default number of carrier-less knit passes in a final drop-off.
pub const DEFAULT_DROP_OFF_MOVEMENTS: u32 = 6;

/// Tolerance for racking and position comparisons.
const EPS: f64 = 1e-9;

/// Simulated state of one V-bed machine, writing instructions to a sink.
///
/// Every primitive validates against the tracked state first, then emits,
/// then mutates, so a failed operation leaves both the state and the
/// instruction stream untouched. All needle indices are author-space; the
/// half-gauge doubling happens only at the emission boundary.
pub struct MachineState<'a> {
    spec: MachineSpec,
    backend: &'static dyn MachineBackend,
    half_gauge: bool,
    racking: f64,
    stitch: Option<u32>,
    speed: Option<u32>,
    front: BedState,
    back: BedState,
    carriers: BTreeMap<u32, Carrier>,
    fixations: BTreeMap<u32, Fixation>,
    warnings: Vec<Warning>,
    sink: &'a mut dyn InstructionSink,
}

impl<'a> MachineState<'a> {
    pub fn new(
        spec: MachineSpec,
        kind: BackendKind,
        half_gauge: bool,
        sink: &'a mut dyn InstructionSink,
    ) -> Self {
        let carriers = (1..=spec.carriers).map(|id| (id, Carrier::new(id))).collect();
        Self {
            spec,
            backend: backend_for(kind),
            half_gauge,
            racking: 0.0,
            stitch: None,
            speed: None,
            front: BedState::new(),
            back: BedState::new(),
            carriers,
            fixations: BTreeMap::new(),
            warnings: Vec::new(),
            sink,
        }
    }

    pub fn spec(&self) -> &MachineSpec {
        &self.spec
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn racking(&self) -> f64 {
        self.racking
    }

    pub fn carrier_position(&self, id: u32) -> Option<f64> {
        self.carriers.get(&id).and_then(|c| c.position)
    }

    pub fn carrier_in_use(&self, id: u32) -> bool {
        self.carrier_position(id).is_some()
    }

    /// Carriers currently on the bed, in id order.
    pub fn active_carriers(&self) -> Vec<u32> {
        self.carriers
            .values()
            .filter(|c| c.in_use())
            .map(|c| c.id)
            .collect()
    }

    /// Whether any needle on either bed currently holds a loop.
    pub fn beds_empty(&self) -> bool {
        self.front.is_empty() && self.back.is_empty()
    }

    pub fn occupied(&self, bed: Bed, index: i32) -> bool {
        self.bed(bed).occupied(index, false)
    }

    pub fn loop_owners(&self, bed: Bed, index: i32) -> &[u32] {
        self.bed(bed).owners(index, false)
    }

    pub fn has_pending_fixation(&self, carrier: u32) -> bool {
        self.fixations.contains_key(&carrier)
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    // ------------------------------------------------------------------
    // Needle primitives
    // ------------------------------------------------------------------

    pub fn knit(&mut self, dir: Dir, bed: Bed, index: i32, carriers: &[u32]) -> CourserResult<()> {
        let needle = self.emit_needle(bed, index, false)?;
        self.check_carriers_in(carriers)?;
        self.sink.knit(dir, needle, carriers)?;
        self.bed_mut(bed).knit(index, carriers);
        self.advance_carriers(dir, index, carriers);
        Ok(())
    }

    pub fn tuck(&mut self, dir: Dir, bed: Bed, index: i32, carriers: &[u32]) -> CourserResult<()> {
        let needle = self.emit_needle(bed, index, false)?;
        self.check_carriers_in(carriers)?;
        self.sink.tuck(dir, needle, carriers)?;
        self.bed_mut(bed).tuck(index, carriers);
        self.advance_carriers(dir, index, carriers);
        Ok(())
    }

    /// Float the yarn past a needle without forming a loop.
    pub fn miss(&mut self, dir: Dir, bed: Bed, index: i32, carriers: &[u32]) -> CourserResult<()> {
        let needle = self.emit_needle(bed, index, false)?;
        self.check_carriers_in(carriers)?;
        self.sink.miss(dir, needle, carriers)?;
        self.advance_carriers(dir, index, carriers);
        Ok(())
    }

    /// Move loops from a needle to the aligned needle on the opposite bed.
    /// Transferring between two sliders is mechanically impossible.
    pub fn xfer(
        &mut self,
        from_bed: Bed,
        src: i32,
        dst: i32,
        from_slider: bool,
        to_slider: bool,
    ) -> CourserResult<()> {
        if from_slider && to_slider {
            return Err(CourserError::invalid_argument(
                "cannot transfer from slider to slider",
            ));
        }
        let src_needle = self.emit_needle(from_bed, src, from_slider)?;
        let dst_needle = self.emit_needle(from_bed.opposite(), dst, to_slider)?;
        self.check_alignment(from_bed, src, dst, from_slider, to_slider);
        self.sink.xfer(src_needle, dst_needle)?;
        let stack = self.bed_mut(from_bed).take(src, from_slider);
        self.bed_mut(from_bed.opposite()).put(dst, to_slider, stack);
        Ok(())
    }

    /// Knit new loops at `src` while pushing its old loops to `dst` on the
    /// opposite bed.
    pub fn split(
        &mut self,
        dir: Dir,
        from_bed: Bed,
        src: i32,
        dst: i32,
        carriers: &[u32],
    ) -> CourserResult<()> {
        if carriers.is_empty() {
            return Err(CourserError::invalid_argument(
                "split needs at least one carrier",
            ));
        }
        let src_needle = self.emit_needle(from_bed, src, false)?;
        let dst_needle = self.emit_needle(from_bed.opposite(), dst, false)?;
        self.check_carriers_in(carriers)?;
        self.check_alignment(from_bed, src, dst, false, false);
        self.sink.split(dir, src_needle, dst_needle, carriers)?;
        let stack = self.bed_mut(from_bed).take(src, false);
        self.bed_mut(from_bed.opposite()).put(dst, false, stack);
        self.bed_mut(from_bed).knit(src, carriers);
        self.advance_carriers(dir, src, carriers);
        Ok(())
    }

    /// Knock the loops off a needle. Emitted even when the needle is already
    /// empty, so cleanup passes stay in the instruction stream.
    pub fn drop_loop(&mut self, bed: Bed, index: i32) -> CourserResult<()> {
        let needle = self.emit_needle(bed, index, false)?;
        self.sink.drop_loop(needle)?;
        self.bed_mut(bed).drop_loops(index);
        Ok(())
    }

    /// Set bed racking. Redundant requests are suppressed unless `force`.
    pub fn rack(&mut self, value: f64, force: bool) -> CourserResult<()> {
        let quarters = value * 4.0;
        if (quarters - quarters.round()).abs() > EPS {
            return Err(CourserError::invalid_argument(format!(
                "racking {value} is not a quarter-pitch multiple"
            )));
        }
        if !force && (value - self.racking).abs() < EPS {
            return Ok(());
        }
        self.racking = value;
        self.sink.rack(self.emitted_racking())
    }

    /// Set the stitch number, suppressing redundant changes.
    pub fn stitch_number(&mut self, value: u32) -> CourserResult<()> {
        if self.stitch == Some(value) {
            return Ok(());
        }
        self.stitch = Some(value);
        self.sink.stitch_number(value)
    }

    /// Set the carriage speed number, suppressing redundant changes.
    pub fn speed_number(&mut self, value: u32) -> CourserResult<()> {
        if self.speed == Some(value) {
            return Ok(());
        }
        self.speed = Some(value);
        self.sink.speed_number(value)
    }

    // ------------------------------------------------------------------
    // Carrier primitives
    // ------------------------------------------------------------------

    /// Bring a carrier in without the inserting hook.
    pub fn carrier_in(&mut self, id: u32) -> CourserResult<()> {
        let entry = self.entry_position();
        let carrier = self.carrier_mut(id)?;
        if carrier.in_use() {
            self.warn(Warning::CarrierAlreadyIn { carrier: id });
            return Ok(());
        }
        carrier.position = Some(entry);
        carrier.hook_released = true;
        self.sink.carrier_in(id)
    }

    /// Bring a carrier in on the inserting hook. Falls back to the generic
    /// form on hookless machines.
    pub fn inhook(&mut self, id: u32) -> CourserResult<()> {
        if !self.backend.has_inserting_hook() {
            self.warn(Warning::UnsupportedPrimitive {
                op: "inhook",
                carrier: id,
            });
            return self.carrier_in(id);
        }
        let entry = self.entry_position();
        let carrier = self.carrier_mut(id)?;
        if carrier.in_use() {
            self.warn(Warning::CarrierAlreadyIn { carrier: id });
            return Ok(());
        }
        carrier.position = Some(entry);
        carrier.hook_released = false;
        self.sink.inhook(id)
    }

    /// Release the inserting hook. Idempotent; a no-op on hookless machines.
    pub fn releasehook(&mut self, id: u32) -> CourserResult<()> {
        if !self.backend.has_inserting_hook() {
            self.warn(Warning::UnsupportedPrimitive {
                op: "releasehook",
                carrier: id,
            });
            return Ok(());
        }
        let carrier = self.carrier_mut(id)?;
        if !carrier.in_use() {
            self.warn(Warning::CarrierNotIn { carrier: id });
            return Ok(());
        }
        if carrier.hook_released {
            return Ok(());
        }
        carrier.hook_released = true;
        self.sink.releasehook(id)
    }

    /// Take a carrier out without the inserting hook.
    pub fn carrier_out(&mut self, id: u32) -> CourserResult<()> {
        let carrier = self.carrier_mut(id)?;
        if !carrier.in_use() {
            self.warn(Warning::CarrierNotIn { carrier: id });
            return Ok(());
        }
        carrier.park();
        self.sink.carrier_out(id)
    }

    /// Take a carrier out on the inserting hook, releasing it first if it
    /// was never released. Falls back to the generic form on hookless
    /// machines.
    pub fn outhook(&mut self, id: u32) -> CourserResult<()> {
        if !self.backend.has_inserting_hook() {
            self.warn(Warning::UnsupportedPrimitive {
                op: "outhook",
                carrier: id,
            });
            return self.carrier_out(id);
        }
        let carrier = self.carrier_mut(id)?;
        if !carrier.in_use() {
            self.warn(Warning::CarrierNotIn { carrier: id });
            return Ok(());
        }
        if !carrier.hook_released {
            carrier.hook_released = true;
            self.sink.releasehook(id)?;
        }
        let carrier = self.carrier_mut(id)?;
        carrier.park();
        self.sink.outhook(id)
    }

    /// Bring a carrier in the way this machine family does it, without
    /// anchoring the yarn end. On hooked machines the hook is released
    /// immediately.
    pub fn bring(&mut self, id: u32) -> CourserResult<()> {
        if self.backend.has_inserting_hook() {
            self.inhook(id)?;
            self.releasehook(id)
        } else {
            self.carrier_in(id)
        }
    }

    /// Retract a carrier the way this machine family does it.
    pub fn retract(&mut self, id: u32) -> CourserResult<()> {
        if self.backend.has_inserting_hook() {
            self.outhook(id)
        } else {
            self.carrier_out(id)
        }
    }

    // ------------------------------------------------------------------
    // Backend-dispatched sequences
    // ------------------------------------------------------------------

    pub fn bring_in(
        &mut self,
        carrier: u32,
        stitch_number: u32,
        fix_left: i32,
        fix_right: i32,
    ) -> CourserResult<()> {
        let backend = self.backend;
        backend.bring_in(self, carrier, stitch_number, fix_left, fix_right)
    }

    pub fn cast_on(&mut self, args: &CastOnArgs) -> CourserResult<()> {
        let backend = self.backend;
        backend.cast_on(self, args)
    }

    pub fn cast_off(&mut self, args: &CastOffArgs) -> CourserResult<()> {
        let backend = self.backend;
        backend.cast_off(self, args)
    }

    /// Drop a pending yarn anchor. No-op when the carrier has none.
    pub fn drop_fixation(&mut self, carrier: u32) -> CourserResult<()> {
        let Some(fix) = self.fixations.remove(&carrier) else {
            return Ok(());
        };
        tracing::debug!(carrier, fix.left, fix.right, "dropping fixation");
        let mut n = fix.left;
        while n <= fix.right {
            self.drop_loop(fix.bed, n)?;
            n += fix.stride;
        }
        Ok(())
    }

    /// Shake the finished piece off the machine: quarter-pitch racking, then
    /// `movements` carrier-less all-needle knit passes in alternating
    /// directions and bed orders, then drop every needle in the range.
    ///
    /// The range defaults to the union of both beds' high-water spans; with
    /// no explicit range on a machine that never held loops this is a no-op.
    pub fn drop_off(
        &mut self,
        left: Option<i32>,
        right: Option<i32>,
        movements: u32,
    ) -> CourserResult<()> {
        let union = self.span_union();
        let l = left.or(union.map(|(l, _)| l));
        let r = right.or(union.map(|(_, r)| r));
        let (Some(l), Some(r)) = (l, r) else {
            return Ok(());
        };
        if l > r {
            return Err(CourserError::invalid_argument(format!(
                "drop-off range [{l}, {r}] is inverted"
            )));
        }
        tracing::debug!(left = l, right = r, movements, "drop-off");
        self.rack(0.25, false)?;
        for m in 0..movements {
            let dir = if m % 2 == 0 { Dir::Right } else { Dir::Left };
            let (first, second) = if m % 2 == 0 {
                (Bed::Front, Bed::Back)
            } else {
                (Bed::Back, Bed::Front)
            };
            for n in needles_in(dir, l, r) {
                self.knit(dir, first, n, &[])?;
                self.knit(dir, second, n, &[])?;
            }
        }
        for n in l..=r {
            self.drop_loop(Bed::Front, n)?;
        }
        for n in l..=r {
            self.drop_loop(Bed::Back, n)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Passthroughs
    // ------------------------------------------------------------------

    pub fn comment(&mut self, text: &str) -> CourserResult<()> {
        self.sink.comment(text)
    }

    pub fn pause(&mut self, message: Option<&str>) -> CourserResult<()> {
        self.sink.pause(message)
    }

    // ------------------------------------------------------------------
    // Crate internals
    // ------------------------------------------------------------------

    pub(crate) fn set_fixation(&mut self, fixation: Fixation) {
        self.fixations.insert(fixation.carrier, fixation);
    }

    /// Force a carrier's tracked position, used by cast-on to leave the
    /// carrier exactly on the leftmost needle.
    pub(crate) fn snap_carrier(&mut self, id: u32, position: f64) -> CourserResult<()> {
        self.carrier_mut(id)?.position = Some(position);
        Ok(())
    }

    fn bed(&self, bed: Bed) -> &BedState {
        match bed {
            Bed::Front => &self.front,
            Bed::Back => &self.back,
        }
    }

    fn bed_mut(&mut self, bed: Bed) -> &mut BedState {
        match bed {
            Bed::Front => &mut self.front,
            Bed::Back => &mut self.back,
        }
    }

    fn span_union(&self) -> Option<(i32, i32)> {
        match (self.front.span(), self.back.span()) {
            (Some((fl, fr)), Some((bl, br))) => Some((fl.min(bl), fr.max(br))),
            (span, None) | (None, span) => span,
        }
    }

    /// Author-space needle mapped to the physical bed, bounds-checked.
    fn emit_needle(&self, bed: Bed, index: i32, slider: bool) -> CourserResult<Needle> {
        let phys = if self.half_gauge { index * 2 - 1 } else { index };
        if phys < 1 || phys > self.spec.width as i32 {
            return Err(CourserError::range(format!(
                "needle {index} maps to physical {phys}, outside 1..={}",
                self.spec.width
            )));
        }
        Ok(Needle { bed, slider, index: phys })
    }

    fn emitted_racking(&self) -> f64 {
        if self.half_gauge {
            self.racking.trunc() * 2.0 + self.racking.fract()
        } else {
            self.racking
        }
    }

    fn entry_position(&self) -> f64 {
        f64::from(self.spec.width) + 1.0
    }

    fn carrier_mut(&mut self, id: u32) -> CourserResult<&mut Carrier> {
        let count = self.spec.carriers;
        self.carriers.get_mut(&id).ok_or_else(|| {
            CourserError::compile(format!("carrier {id} outside the machine's set 1..={count}"))
        })
    }

    fn check_carriers_in(&self, carriers: &[u32]) -> CourserResult<()> {
        for &id in carriers {
            match self.carriers.get(&id) {
                Some(c) if c.in_use() => {}
                Some(_) => {
                    return Err(CourserError::compile(format!(
                        "carrier {id} is not on the bed; bring it in first"
                    )));
                }
                None => {
                    return Err(CourserError::compile(format!(
                        "carrier {id} outside the machine's set 1..={}",
                        self.spec.carriers
                    )));
                }
            }
        }
        Ok(())
    }

    fn advance_carriers(&mut self, dir: Dir, index: i32, carriers: &[u32]) {
        let pos = f64::from(index) + 0.5 * f64::from(dir.sign());
        for id in carriers {
            if let Some(c) = self.carriers.get_mut(id) {
                c.position = Some(pos);
            }
        }
    }

    fn check_alignment(
        &mut self,
        from_bed: Bed,
        src: i32,
        dst: i32,
        from_slider: bool,
        to_slider: bool,
    ) {
        let expected = match from_bed {
            Bed::Front => f64::from(src) - self.racking,
            Bed::Back => f64::from(src) + self.racking,
        };
        if (expected - f64::from(dst)).abs() > EPS {
            self.warn(Warning::XferMisaligned {
                src: Needle { bed: from_bed, slider: from_slider, index: src },
                dst: Needle {
                    bed: from_bed.opposite(),
                    slider: to_slider,
                    index: dst,
                },
                racking: self.racking,
            });
        }
    }
}
