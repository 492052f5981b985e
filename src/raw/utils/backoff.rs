use std::{hint, thread};

// Exponential backoff for the spin loops in the table.
//
// Every wait in the table (reader drains, exclusive-lock drains, waiting on a detached
// generation) is a spin loop. Waits are expected to be short, so this spins with a
// quadratically growing number of iterations before falling back to yielding the thread.
// There is no timeout: a thread that stalls while holding a guard stalls the waiter.
#[derive(Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    // Number of steps before we start yielding to the scheduler.
    const SPIN_LIMIT: u32 = 7;

    #[inline]
    pub fn new() -> Backoff {
        Backoff { step: 0 }
    }

    // Back off in a spin loop that is waiting on another thread.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= Backoff::SPIN_LIMIT {
            for _ in 0..(self.step * self.step).max(1) {
                hint::spin_loop();
            }

            self.step += 1;
        } else {
            thread::yield_now();
        }
    }
}
