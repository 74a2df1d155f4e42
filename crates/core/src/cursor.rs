#[must_use]
pub fn last_index(len: usize) -> usize {
    len.saturating_sub(1)
}

#[must_use]
pub fn clamp(index: usize, len: usize) -> usize {
    index.min(last_index(len))
}

#[must_use]
pub fn move_by(index: usize, delta: isize, len: usize) -> usize {
    let moved = if delta.is_negative() {
        index.saturating_sub(delta.unsigned_abs())
    } else {
        index.saturating_add(delta.unsigned_abs())
    };
    clamp(moved, len)
}

/// Selection index over a list whose length changes underneath it.
///
/// An empty list keeps the index at `0`, which callers treat as "no selection".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    index: usize,
}

impl Cursor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.index
    }

    #[must_use]
    pub fn selection(self, len: usize) -> Option<usize> {
        (self.index < len).then_some(self.index)
    }

    pub fn clamp_to(&mut self, len: usize) {
        self.index = clamp(self.index, len);
    }

    pub fn move_by(&mut self, delta: isize, len: usize) {
        self.index = move_by(self.index, delta, len);
    }

    pub fn move_to_first(&mut self) {
        self.index = 0;
    }

    pub fn move_to_last(&mut self, len: usize) {
        self.index = last_index(len);
    }
}
