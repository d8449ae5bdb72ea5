use std::collections::BTreeMap;

use smallvec::SmallVec;

/// Loops held by one needle, identified by the carrier that formed each.
/// Tucking stacks loops, so more than one is common; two covers most fabric.
pub type LoopStack = SmallVec<[u32; 2]>;

/// Loop bookkeeping for one needle bed: which hook and slider needles hold
/// loops, which carriers formed them, and the high-water needle span the bed
/// has ever worked.
///
/// Indices are author-space needle numbers; gauge mapping happens at the
/// emission layer. The span never shrinks when loops drop, so a final
/// drop-off can sweep everything the bed ever touched.
#[derive(Clone, Debug, Default)]
pub struct BedState {
    loops: BTreeMap<i32, LoopStack>,
    sliders: BTreeMap<i32, LoopStack>,
    left: Option<i32>,
    right: Option<i32>,
}

impl BedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Form new loops at a hook needle, knocking over whatever it held.
    /// With no carriers this is equivalent to a drop.
    pub fn knit(&mut self, index: i32, carriers: &[u32]) {
        self.touch(index);
        if carriers.is_empty() {
            self.loops.remove(&index);
        } else {
            self.loops.insert(index, LoopStack::from_slice(carriers));
        }
    }

    /// Stack additional loops onto a hook needle without knocking over.
    pub fn tuck(&mut self, index: i32, carriers: &[u32]) {
        self.touch(index);
        if carriers.is_empty() {
            return;
        }
        self.loops
            .entry(index)
            .or_default()
            .extend_from_slice(carriers);
    }

    /// Knock the loops off a hook needle.
    pub fn drop_loops(&mut self, index: i32) -> LoopStack {
        self.loops.remove(&index).unwrap_or_default()
    }

    /// Remove and return every loop at a needle.
    pub fn take(&mut self, index: i32, slider: bool) -> LoopStack {
        self.slots_mut(slider).remove(&index).unwrap_or_default()
    }

    /// Add loops to a needle, under any it already holds.
    pub fn put(&mut self, index: i32, slider: bool, incoming: LoopStack) {
        self.touch(index);
        if incoming.is_empty() {
            return;
        }
        self.slots_mut(slider)
            .entry(index)
            .or_default()
            .extend(incoming);
    }

    /// Carriers of the loops at a needle, oldest first.
    pub fn owners(&self, index: i32, slider: bool) -> &[u32] {
        self.slots(slider)
            .get(&index)
            .map_or(&[], |stack| stack.as_slice())
    }

    pub fn occupied(&self, index: i32, slider: bool) -> bool {
        self.slots(slider).contains_key(&index)
    }

    /// High-water span of needles this bed has ever worked.
    pub fn span(&self) -> Option<(i32, i32)> {
        Some((self.left?, self.right?))
    }

    /// Whether any needle currently holds a loop.
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty() && self.sliders.is_empty()
    }

    /// Total loops currently held across hooks and sliders.
    pub fn loop_count(&self) -> usize {
        self.loops
            .values()
            .chain(self.sliders.values())
            .map(LoopStack::len)
            .sum()
    }

    fn touch(&mut self, index: i32) {
        self.left = Some(self.left.map_or(index, |l| l.min(index)));
        self.right = Some(self.right.map_or(index, |r| r.max(index)));
    }

    fn slots(&self, slider: bool) -> &BTreeMap<i32, LoopStack> {
        if slider { &self.sliders } else { &self.loops }
    }

    fn slots_mut(&mut self, slider: bool) -> &mut BTreeMap<i32, LoopStack> {
        if slider { &mut self.sliders } else { &mut self.loops }
    }
}
