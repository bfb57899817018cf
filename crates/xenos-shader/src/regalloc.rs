//! LIFO allocation of `r#` scratch registers above the guest registers.

/// A stack of temp registers.
///
/// Registers are numbered from `base`, which is the guest register count
/// when guest registers are `r#`, or 0 when they live in `x0[]`.
#[derive(Debug, Clone, Default)]
pub struct TempStack {
    base: u32,
    live: u32,
    high_water: u32,
    pushes: u64,
    pops: u64,
}

impl TempStack {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    /// Clears all state for a new translation.
    pub fn reset(&mut self, base: u32) {
        *self = Self::new(base);
    }

    /// Allocates `count` consecutive registers, returning the first.
    pub fn push(&mut self, count: u32) -> u32 {
        debug_assert!(count != 0);
        let first = self.base + self.live;
        self.live += count;
        self.high_water = self.high_water.max(self.live);
        self.pushes += u64::from(count);
        first
    }

    /// Releases the `count` most recently pushed registers.
    pub fn pop(&mut self, count: u32) {
        debug_assert!(count <= self.live, "popping {count} of {} temps", self.live);
        self.live = self.live.saturating_sub(count);
        self.pops += u64::from(count);
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Registers currently allocated.
    pub fn live(&self) -> u32 {
        self.live
    }

    /// Largest number of simultaneously allocated registers.
    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    /// Value for `dcl_temps`.
    pub fn declared_count(&self) -> u32 {
        self.base + self.high_water
    }

    /// Whether every pushed register has been popped.
    pub fn is_balanced(&self) -> bool {
        self.live == 0 && self.pushes == self.pops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_are_numbered_above_the_base() {
        let mut stack = TempStack::new(5);
        assert_eq!(stack.push(1), 5);
        assert_eq!(stack.push(2), 6);
        assert_eq!(stack.push(1), 8);
        stack.pop(1);
        stack.pop(2);
        assert_eq!(stack.push(1), 6);
        stack.pop(1);
        stack.pop(1);
        assert!(stack.is_balanced());
        assert_eq!(stack.high_water(), 4);
        assert_eq!(stack.declared_count(), 9);
    }

    #[test]
    fn reset_clears_the_high_water_mark() {
        let mut stack = TempStack::new(0);
        stack.push(3);
        stack.pop(3);
        stack.reset(2);
        assert_eq!(stack.high_water(), 0);
        assert_eq!(stack.declared_count(), 2);
        assert!(stack.is_balanced());
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn popping_too_much_asserts() {
        let mut stack = TempStack::new(0);
        stack.push(1);
        stack.pop(2);
    }
}
