// A linear probe sequence over the slots of a generation.
//
// The sequence starts at `hash % capacity` and walks the slot array in order, wrapping
// around at the end. Colliding keys are resolved purely by the order in which the walk
// encounters them.
#[derive(Debug)]
pub struct Probe {
    // The current index in the probe sequence.
    pub i: usize,
    // The number of slots visited so far.
    len: usize,
    // The capacity of the generation being probed.
    capacity: usize,
}

impl Probe {
    // Initialize the probe sequence for a generation of the given capacity.
    #[inline]
    pub fn start(hash: u64, capacity: usize) -> Probe {
        debug_assert!(capacity > 0);

        Probe {
            i: (hash % capacity as u64) as usize,
            len: 0,
            capacity,
        }
    }

    // Advance to the next slot.
    #[inline]
    pub fn next(&mut self) {
        self.len += 1;
        self.i += 1;

        if self.i == self.capacity {
            self.i = 0;
        }
    }

    // Returns `true` if every slot has been visited.
    //
    // The watermark guarantees that a probe always terminates at an unused slot or a
    // matching key before this happens.
    #[inline]
    pub fn exhausted(&self) -> bool {
        self.len >= self.capacity
    }
}

// A probe went around the whole generation without resolving.
//
// This means the load factor invariant was broken and the table cannot be trusted.
#[cold]
#[inline(never)]
pub fn exhausted(capacity: usize) -> ! {
    panic!(
        "probe sequence visited all {capacity} slots without finding the key or an unused slot"
    )
}
