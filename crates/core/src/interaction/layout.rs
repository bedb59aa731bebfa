//! Raw slot layout of a station surface: a 6×9 grid with the 3×3 inputs on
//! the left, the result to their right and filler everywhere else.

/// Raw slots owned by the surface. Higher raw slots are the viewer's inventory.
pub const SURFACE_SLOTS: usize = 54;

/// Raw slot of each grid index, row-major.
pub const INPUT_SLOTS: [usize; 9] = [11, 12, 13, 20, 21, 22, 29, 30, 31];

/// Raw slot of the result.
pub const RESULT_SLOT: usize = 24;

/// What a raw slot means to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Grid input with its index 0..9.
    Input(usize),
    /// Result slot.
    Result,
    /// Decorative; never insertable or removable.
    Filler,
    /// Viewer's own storage slot.
    Viewer(usize),
}

/// Classify a raw slot.
pub fn classify(raw_slot: usize) -> SlotRole {
    if raw_slot >= SURFACE_SLOTS {
        return SlotRole::Viewer(raw_slot - SURFACE_SLOTS);
    }
    if raw_slot == RESULT_SLOT {
        return SlotRole::Result;
    }
    match INPUT_SLOTS.iter().position(|slot| *slot == raw_slot) {
        Some(index) => SlotRole::Input(index),
        None => SlotRole::Filler,
    }
}

/// Raw slot of grid input `index`.
pub fn input_slot(index: usize) -> Option<usize> {
    INPUT_SLOTS.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles() {
        assert_eq!(classify(11), SlotRole::Input(0));
        assert_eq!(classify(31), SlotRole::Input(8));
        assert_eq!(classify(24), SlotRole::Result);
        assert_eq!(classify(0), SlotRole::Filler);
        assert_eq!(classify(23), SlotRole::Filler);
        assert_eq!(classify(53), SlotRole::Filler);
        assert_eq!(classify(54), SlotRole::Viewer(0));
        assert_eq!(input_slot(4), Some(21));
        assert_eq!(input_slot(9), None);
    }
}
