//! Cooperative cancellation
//!
//! A process-wide flag raised by an external signal source (typically the
//! host environment on a user interrupt) and polled by long-running work.
//! Whoever raises the flag is also responsible for clearing it once the
//! cancellation has been handled.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::lang::{ArrayResult, Signal};

static GLOBAL: InterruptFlag = InterruptFlag::new();

#[derive(Debug, Default)]
pub struct InterruptFlag {
    raised: AtomicBool,
}

impl InterruptFlag {
    pub const fn new() -> Self {
        InterruptFlag {
            raised: AtomicBool::new(false),
        }
    }

    /// The flag shared by the whole process
    pub fn global() -> &'static InterruptFlag {
        &GLOBAL
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Cancellation checkpoint: `Err(Signal::Interrupt)` once the flag is
    /// raised
    pub fn throw_if_raised(&self) -> ArrayResult<()> {
        if self.is_raised() {
            return Signal::Interrupt.into();
        }
        Ok(())
    }
}

pub fn raise() {
    GLOBAL.raise()
}

pub fn clear() {
    GLOBAL.clear()
}

pub fn is_raised() -> bool {
    GLOBAL.is_raised()
}

pub fn throw_if_raised() -> ArrayResult<()> {
    GLOBAL.throw_if_raised()
}
