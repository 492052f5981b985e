use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A simple lock-free, append-only, stack.
///
/// Under the greedy reclamation policy retired generations are pushed here by
/// the resizing thread and freed in bulk when the table is dropped.
pub struct Stack<T> {
    head: AtomicPtr<Node<T>>,
}

struct Node<T> {
    value: T,
    next: *mut Node<T>,
}

impl<T> Stack<T> {
    /// Create a new `Stack`.
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Add an entry to the stack.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            value,
            next: ptr::null_mut(),
        }));

        loop {
            // Load the head node.
            //
            // `Relaxed` is sufficient here as all reads are through `&mut self`.
            let head = self.head.load(Ordering::Relaxed);

            // Link the node to the stack.
            //
            // Safety: The node was allocated above and is not yet shared.
            unsafe { (*node).next = head }

            if self
                .head
                .compare_exchange(head, node, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Returns the number of entries in the stack.
    pub fn len(&mut self) -> usize {
        let mut len = 0;
        let mut head = *self.head.get_mut();

        while !head.is_null() {
            len += 1;

            // Safety: We have `&mut self` and the node is non-null.
            head = unsafe { (*head).next };
        }

        len
    }

    /// Drain all elements from the stack.
    pub fn drain(&mut self, mut f: impl FnMut(T)) {
        let mut head = std::mem::replace(self.head.get_mut(), ptr::null_mut());

        while !head.is_null() {
            // Safety: We have `&mut self` and the node is non-null.
            let owned_head = unsafe { Box::from_raw(head) };

            f(owned_head.value);

            head = owned_head.next;
        }
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        self.drain(drop);
    }
}
