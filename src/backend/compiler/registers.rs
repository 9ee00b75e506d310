use super::asm::Register;

/// Callee-saved registers handed out to parameters and locals, in order.
pub const CALLEE_SAVED: [Register; 4] = [Register::R4, Register::R5, Register::R6, Register::R7];

/// Fixed-capacity allocator over [`CALLEE_SAVED`]. There is no spilling: once
/// every register is live, allocation fails.
#[derive(Debug, Default)]
pub struct RegisterPool {
    next: usize,
    high_water: usize,
}

impl RegisterPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Option<Register> {
        let register = CALLEE_SAVED.get(self.next).copied()?;
        self.next += 1;
        self.high_water = self.high_water.max(self.next);
        Some(register)
    }

    pub fn mark(&self) -> usize {
        self.next
    }

    /// Frees every register allocated after `mark`.
    pub fn release_to(&mut self, mark: usize) {
        self.next = self.next.min(mark);
    }

    /// Registers the function has to save in its prologue.
    pub fn used(&self) -> &'static [Register] {
        &CALLEE_SAVED[..self.high_water]
    }
}
