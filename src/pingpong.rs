// pingpong.rs — Which of the two simulation buffers is the read source.
//
// Each dispatch reads `input` and writes `input.next()`, after which the
// driver advances `input`. After the loop the active index therefore names
// the buffer holding the newest output, and that is what gets blurred.

/// One of the two simulation buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferIndex {
    #[default]
    A,
    B,
}

impl BufferIndex {
    /// The other buffer.
    #[inline]
    pub fn next(self) -> Self {
        match self {
            BufferIndex::A => BufferIndex::B,
            BufferIndex::B => BufferIndex::A,
        }
    }

    /// Active index after `dispatches` toggles: flips iff the count is odd.
    #[inline]
    pub fn after(self, dispatches: u32) -> Self {
        if dispatches % 2 == 1 {
            self.next()
        } else {
            self
        }
    }

    /// Array slot, 0 for A and 1 for B.
    #[inline]
    pub fn slot(self) -> usize {
        match self {
            BufferIndex::A => 0,
            BufferIndex::B => 1,
        }
    }
}

/// Two values addressed by `BufferIndex`.
#[derive(Debug, Clone)]
pub struct PingPong<T> {
    slots: [T; 2],
}

impl<T> PingPong<T> {
    pub fn new(a: T, b: T) -> Self {
        PingPong { slots: [a, b] }
    }

    #[inline]
    pub fn get(&self, index: BufferIndex) -> &T {
        &self.slots[index.slot()]
    }

    #[inline]
    pub fn get_mut(&mut self, index: BufferIndex) -> &mut T {
        &mut self.slots[index.slot()]
    }

    /// Borrow `(read, write)` for a dispatch reading `input`.
    pub fn split(&mut self, input: BufferIndex) -> (&T, &mut T) {
        let [a, b] = &mut self.slots;
        match input {
            BufferIndex::A => (&*a, b),
            BufferIndex::B => (&*b, a),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}
