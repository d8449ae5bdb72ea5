/// Tracked state of one yarn carrier.
#[derive(Clone, Debug, PartialEq)]
pub struct Carrier {
    pub id: u32,
    /// Current position on the needle axis, `None` while parked outside the
    /// bed. Sits half a needle past the last stitch in the travel direction.
    pub position: Option<f64>,
    /// Whether the inserting hook that brought this carrier in has released
    /// it. Hookless entry counts as released.
    pub hook_released: bool,
}

impl Carrier {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            position: None,
            hook_released: true,
        }
    }

    pub fn in_use(&self) -> bool {
        self.position.is_some()
    }

    /// Park the carrier outside the bed.
    pub fn park(&mut self) {
        self.position = None;
        self.hook_released = true;
    }
}
