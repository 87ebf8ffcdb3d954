//! Self-verifying execution stack.
//!
//! A growable stack of f64 values that continuously checks its own integrity:
//! sentinel words flank the data region, a checksum covers the stack's fields
//! plus the entire buffer (sentinels included), and every slot beyond `size`
//! holds a poison value so stale reads are detectable in diagnostics. Every
//! mutating operation re-verifies before returning; a failure means memory
//! safety was already violated somewhere upstream and is reported as a
//! distinct, non-recoverable error kind.

use crate::error::StackError;
use log::debug;

/// Bit pattern of the sentinel slots flanking the data region.
const SENTINEL_BITS: u64 = 0xBAD5_EED0_BAD5_EED0;

/// Written into every slot at index >= size. Far outside any floating-point
/// tolerance used by the machine, so it never masquerades as real data.
pub const POISON: f64 = -663.0;

const INITIAL_CAPACITY: usize = 10;
const REALLOC_FACTOR: usize = 2;
/// Shrinking only kicks in above this size, so small stacks do not thrash.
const SHRINK_MIN_SIZE: usize = 8;

/// Buffer layout: `[sentinel][data; capacity][sentinel]`, addressed by index.
/// `buf[0]` and `buf[capacity + 1]` are the sentinels; element `i` of the
/// stack lives at `buf[i + 1]`.
pub struct GuardedStack {
    buf: Vec<f64>,
    size: usize,
    capacity: usize,
    checksum: u64,
}

/// FNV-1a over a byte view; pure function of its input.
fn fnv1a(bytes: impl Iterator<Item = u8>) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl GuardedStack {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut stack = GuardedStack {
            buf: Vec::new(),
            size: 0,
            capacity: 0,
            checksum: 0,
        };
        stack.rebuild_buffer(capacity);
        stack
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push a value, growing the buffer when full.
    pub fn push(&mut self, value: f64) -> Result<(), StackError> {
        self.verify()?;

        if self.size == self.capacity {
            self.rebuild_buffer(self.capacity * REALLOC_FACTOR);
        }

        self.buf[self.size + 1] = value;
        self.size += 1;
        self.reseal();

        self.verify()
    }

    /// Pop the top value. Shrinks the buffer once usage drops well below
    /// capacity, with hysteresis so alternating push/pop does not thrash.
    pub fn pop(&mut self) -> Result<f64, StackError> {
        self.verify()?;

        if self.size < 1 {
            return Err(StackError::Underflow);
        }

        if self.size > SHRINK_MIN_SIZE && REALLOC_FACTOR * self.size < self.capacity {
            self.rebuild_buffer(self.capacity / REALLOC_FACTOR);
        }

        self.size -= 1;
        let value = self.buf[self.size + 1];
        self.buf[self.size + 1] = POISON;
        self.reseal();

        self.verify()?;
        Ok(value)
    }

    /// Pop without copying the value out (the "null destination" case).
    pub fn pop_discard(&mut self) -> Result<(), StackError> {
        self.pop().map(|_| ())
    }

    /// Read the top value without mutating.
    pub fn peek(&self) -> Result<f64, StackError> {
        self.verify()?;
        if self.size < 1 {
            return Err(StackError::Underflow);
        }
        Ok(self.buf[self.size])
    }

    /// Full integrity check: bounds, both sentinels, checksum.
    pub fn verify(&self) -> Result<(), StackError> {
        if self.size > self.capacity || self.buf.len() != self.capacity + 2 {
            return Err(StackError::SizeOutOfRange);
        }
        if self.buf[0].to_bits() != SENTINEL_BITS {
            return Err(StackError::LeftSentinel);
        }
        if self.buf[self.capacity + 1].to_bits() != SENTINEL_BITS {
            return Err(StackError::RightSentinel);
        }
        if self.compute_checksum() != self.checksum {
            return Err(StackError::Checksum);
        }
        Ok(())
    }

    /// Checksum over the structure's own fields plus the whole buffer,
    /// sentinels included. Excludes the stored checksum itself.
    fn compute_checksum(&self) -> u64 {
        let header = self
            .size
            .to_le_bytes()
            .into_iter()
            .chain(self.capacity.to_le_bytes());
        let data = self.buf.iter().flat_map(|v| v.to_bits().to_le_bytes());
        fnv1a(header.chain(data))
    }

    fn reseal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Reallocate to `new_capacity`, preserving live data, re-planting the
    /// sentinels and poisoning every unused slot.
    fn rebuild_buffer(&mut self, new_capacity: usize) {
        debug_assert!(new_capacity >= self.size);
        debug!(
            "stack realloc: capacity {} -> {} (size {})",
            self.capacity, new_capacity, self.size
        );

        let sentinel = f64::from_bits(SENTINEL_BITS);
        let mut buf = vec![POISON; new_capacity + 2];
        buf[0] = sentinel;
        buf[new_capacity + 1] = sentinel;
        if self.size > 0 {
            buf[1..=self.size].copy_from_slice(&self.buf[1..=self.size]);
        }

        self.buf = buf;
        self.capacity = new_capacity;
        self.reseal();
    }

    /// Diagnostic dump of the stack state, poison slots marked.
    pub fn dump(&self) {
        debug!(
            "stack: size {} capacity {} checksum {:016x}",
            self.size, self.capacity, self.checksum
        );
        for (i, value) in self.buf[1..=self.capacity].iter().enumerate() {
            if i < self.size {
                debug!("  *[{}] = {}", i, value);
            } else if value.to_bits() != POISON.to_bits() {
                debug!("  [{}] = {} (UNUSED, NOT POISONED)", i, value);
            }
        }
    }

    /// Raw slot access for corruption tests only.
    #[cfg(test)]
    fn raw_slot_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.buf[index]
    }
}

impl Default for GuardedStack {
    fn default() -> Self {
        Self::new()
    }
}
