//! Interpreter port
//!
//! The explorer never runs program code itself. An [`Interpreter`] executes
//! one instruction of one thread per [`Interpreter::step`], calling back into
//! the explorer's handlers for every memory or thread operation. Every
//! execution restarts the program from scratch; handlers replay what the
//! graph already records and only extend it past that.

use super::explorer::Explorer;
use crate::domain::error::CheckerError;
use crate::domain::report::Outcome;

/// Program under test
pub trait Interpreter {
    /// Rewind every thread to its first instruction
    fn reset(&mut self);

    /// Number of program threads, the main thread included
    fn thread_count(&self) -> usize;

    /// Execute the next instruction of `thread`
    ///
    /// A handler returning `None` means the thread blocked; the instruction
    /// must then be issued again when the thread is next scheduled.
    fn step(&mut self, thread: usize, explorer: &mut Explorer) -> Result<(), CheckerError>;

    /// Observable result of the execution that just ended
    fn outcome(&self) -> Outcome;
}
