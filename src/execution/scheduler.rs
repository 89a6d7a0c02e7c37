//! Step cursor - determines which step runs next

/// Position in a pipeline's step list
///
/// Steps run in document order; a jump moves the cursor explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCursor {
    next: usize,
    len: usize,
}

impl StepCursor {
    pub fn new(len: usize) -> Self {
        Self { next: 0, len }
    }

    /// Start at `index` instead of the first step
    pub fn starting_at(len: usize, index: usize) -> Self {
        Self { next: index, len }
    }

    /// Index of the next step to run, advancing past it
    pub fn advance(&mut self) -> Option<usize> {
        if self.next >= self.len {
            return None;
        }
        let current = self.next;
        self.next += 1;
        Some(current)
    }

    /// Make `index` the next step to run
    pub fn jump_to(&mut self, index: usize) {
        self.next = index.min(self.len);
    }
}
