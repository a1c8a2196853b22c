//! Litmus programs
//!
//! A [`LitmusTest`] is a handful of straight-line threads over named shared
//! variables. Each thread owns a private register file; registers carry the
//! events their value came from, so an instruction that reads a register
//! depends on those events.
//!
//! ```text
//!   sb                   thread 0          thread 1
//!                        x = 1             y = 1
//!                        r0 = y            r0 = x
//!   exists (0:r0=0 /\ 1:r0=0)
//! ```
//!
//! Programs are built with [`LitmusTest::thread`] and a [`ThreadBuilder`],
//! or decoded from JSON.

use crate::domain::graph::{Address, MemOrdering, Value};
use crate::domain::report::Outcome;
use crate::domain::revisit::CELL_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Register index, private to one thread
pub type Reg = usize;

/// First address handed to a shared variable
pub const VAR_BASE: u64 = 0x10;

/// Value source of an instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Literal
    Const(Value),
    /// Current value of a register
    Reg(Reg),
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Self::Const(v)
    }
}

/// Register operand
pub const fn reg(r: Reg) -> Operand {
    Operand::Reg(r)
}

/// Memory location of an access
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loc {
    /// Named shared variable
    Var(String),
    /// Address held in a register
    Ptr(Reg),
}

impl From<&str> for Loc {
    fn from(name: &str) -> Self {
        Self::Var(name.to_owned())
    }
}

/// Comparison in a condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cmp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
}

/// `lhs cmp rhs`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cond {
    /// Left side
    pub lhs: Operand,
    /// Comparison
    pub cmp: Cmp,
    /// Right side
    pub rhs: Operand,
}

impl Cond {
    /// `lhs == rhs`
    pub fn eq(lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Self {
        Self {
            lhs: lhs.into(),
            cmp: Cmp::Eq,
            rhs: rhs.into(),
        }
    }

    /// `lhs != rhs`
    pub fn ne(lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Self {
        Self {
            lhs: lhs.into(),
            cmp: Cmp::Ne,
            rhs: rhs.into(),
        }
    }

    /// Evaluate with resolved operands
    pub const fn holds(&self, lhs: Value, rhs: Value) -> bool {
        match self.cmp {
            Cmp::Eq => lhs == rhs,
            Cmp::Ne => lhs != rhs,
        }
    }
}

/// One step of a litmus thread
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// `dst = *loc`
    Load {
        /// Destination register
        dst: Reg,
        /// Source location
        loc: Loc,
        /// Access ordering
        ordering: MemOrdering,
    },
    /// `*loc = value`
    Store {
        /// Target location
        loc: Loc,
        /// Stored value
        value: Operand,
        /// Access ordering
        ordering: MemOrdering,
    },
    /// `dst = src + operand`, no memory access
    Add {
        /// Destination register
        dst: Reg,
        /// Source value
        src: Operand,
        /// Addend
        operand: Value,
    },
    /// `dst = fetch_add(loc, operand)`
    FetchAdd {
        /// Receives the old value
        dst: Reg,
        /// Target location
        loc: Loc,
        /// Addend
        operand: Value,
        /// Update ordering
        ordering: MemOrdering,
    },
    /// `dst = cmpxchg(loc, expected, desired)`
    CompareExchange {
        /// Receives the old value
        dst: Reg,
        /// Target location
        loc: Loc,
        /// Value that allows the swap
        expected: Value,
        /// Value swapped in
        desired: Value,
        /// Update ordering
        ordering: MemOrdering,
    },
    /// Memory fence
    Fence {
        /// Fence strength
        ordering: MemOrdering,
    },
    /// Acquire a mutex
    Lock {
        /// Mutex location
        loc: Loc,
    },
    /// Release a mutex
    Unlock {
        /// Mutex location
        loc: Loc,
    },
    /// Enter an RCU read-side critical section
    RcuLock,
    /// Leave an RCU read-side critical section
    RcuUnlock,
    /// Wait for an RCU grace period
    SyncRcu,
    /// `dst = malloc(size)`
    Malloc {
        /// Receives the block address
        dst: Reg,
        /// Size in cells
        size: u64,
    },
    /// `free(ptr)`
    Free {
        /// Block address
        ptr: Operand,
    },
    /// Discard the execution unless `cond` holds
    Assume(Cond),
    /// Report a violation unless `cond` holds
    Assert {
        /// Checked condition
        cond: Cond,
        /// Reported message
        message: String,
    },
}

impl Instruction {
    /// Register written by this instruction
    pub const fn destination(&self) -> Option<Reg> {
        match self {
            Self::Load { dst, .. }
            | Self::Add { dst, .. }
            | Self::FetchAdd { dst, .. }
            | Self::CompareExchange { dst, .. }
            | Self::Malloc { dst, .. } => Some(*dst),
            _ => None,
        }
    }

    fn variable(&self) -> Option<&str> {
        match self {
            Self::Load { loc, .. }
            | Self::Store { loc, .. }
            | Self::FetchAdd { loc, .. }
            | Self::CompareExchange { loc, .. }
            | Self::Lock { loc }
            | Self::Unlock { loc } => match loc {
                Loc::Var(name) => Some(name),
                Loc::Ptr(_) => None,
            },
            _ => None,
        }
    }
}

/// Named multi-threaded litmus program
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LitmusTest {
    /// Short name
    pub name: String,
    /// One-line description
    #[serde(default)]
    pub description: String,
    /// Shared variables, in address order
    #[serde(default)]
    pub vars: Vec<String>,
    /// Variables whose final value is part of the outcome
    #[serde(default)]
    pub observed: Vec<String>,
    /// Code of every thread
    pub threads: Vec<Vec<Instruction>>,
    /// Outcome whose reachability the test asks about
    #[serde(default)]
    pub exists: Option<Outcome>,
}

impl LitmusTest {
    /// Empty program
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach a description
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a thread
    #[must_use]
    pub fn thread(mut self, build: impl FnOnce(ThreadBuilder) -> ThreadBuilder) -> Self {
        let code = build(ThreadBuilder::default()).code;
        for name in code.iter().filter_map(Instruction::variable) {
            self.declare(name);
        }
        self.threads.push(code);
        self
    }

    /// Report the final value of `var` in every outcome
    #[must_use]
    pub fn observe(mut self, var: &str) -> Self {
        self.declare(var);
        self.observed.push(var.to_owned());
        self
    }

    /// Ask whether `outcome` is reachable
    #[must_use]
    pub fn exists<'a>(mut self, outcome: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        self.exists = Some(Outcome::from_pairs(outcome));
        self
    }

    fn declare(&mut self, name: &str) {
        if !self.vars.iter().any(|v| v == name) {
            self.vars.push(name.to_owned());
        }
    }

    /// Address of a shared variable
    pub fn address(&self, var: &str) -> Option<Address> {
        self.vars
            .iter()
            .position(|v| v == var)
            .map(|i| Address(VAR_BASE + i as u64 * CELL_SIZE))
    }

    /// Number of litmus threads, the spawning main thread excluded
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Register file size of thread `t`
    pub fn register_count(&self, t: usize) -> usize {
        self.threads
            .get(t)
            .into_iter()
            .flatten()
            .filter_map(Instruction::destination)
            .map(|r| r + 1)
            .max()
            .unwrap_or(0)
    }

    /// Decode a program from JSON, declaring its variables
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut test: Self = serde_json::from_str(json)?;
        let names: Vec<String> = test
            .threads
            .iter()
            .flatten()
            .filter_map(Instruction::variable)
            .map(str::to_owned)
            .chain(test.observed.iter().cloned())
            .collect();
        for name in &names {
            test.declare(name);
        }
        Ok(test)
    }
}

impl fmt::Display for LitmusTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} threads)", self.name, self.threads.len())?;
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        if let Some(exists) = &self.exists {
            write!(f, " exists ({exists})")?;
        }
        Ok(())
    }
}

/// Fluent builder for one thread's code
#[derive(Debug, Default)]
pub struct ThreadBuilder {
    code: Vec<Instruction>,
}

impl ThreadBuilder {
    fn push(mut self, instruction: Instruction) -> Self {
        self.code.push(instruction);
        self
    }

    /// `dst = *loc`
    #[must_use]
    pub fn load(self, dst: Reg, loc: impl Into<Loc>, ordering: MemOrdering) -> Self {
        self.push(Instruction::Load {
            dst,
            loc: loc.into(),
            ordering,
        })
    }

    /// `*loc = value`
    #[must_use]
    pub fn store(self, loc: impl Into<Loc>, value: impl Into<Operand>, ordering: MemOrdering) -> Self {
        self.push(Instruction::Store {
            loc: loc.into(),
            value: value.into(),
            ordering,
        })
    }

    /// `dst = src + operand`
    #[must_use]
    pub fn add(self, dst: Reg, src: impl Into<Operand>, operand: Value) -> Self {
        self.push(Instruction::Add {
            dst,
            src: src.into(),
            operand,
        })
    }

    /// `dst = fetch_add(loc, operand)`
    #[must_use]
    pub fn fetch_add(self, dst: Reg, loc: impl Into<Loc>, operand: Value, ordering: MemOrdering) -> Self {
        self.push(Instruction::FetchAdd {
            dst,
            loc: loc.into(),
            operand,
            ordering,
        })
    }

    /// `dst = cmpxchg(loc, expected, desired)`
    #[must_use]
    pub fn compare_exchange(
        self,
        dst: Reg,
        loc: impl Into<Loc>,
        expected: Value,
        desired: Value,
        ordering: MemOrdering,
    ) -> Self {
        self.push(Instruction::CompareExchange {
            dst,
            loc: loc.into(),
            expected,
            desired,
            ordering,
        })
    }

    /// Memory fence
    #[must_use]
    pub fn fence(self, ordering: MemOrdering) -> Self {
        self.push(Instruction::Fence { ordering })
    }

    /// Acquire the mutex at `loc`
    #[must_use]
    pub fn lock(self, loc: impl Into<Loc>) -> Self {
        self.push(Instruction::Lock { loc: loc.into() })
    }

    /// Release the mutex at `loc`
    #[must_use]
    pub fn unlock(self, loc: impl Into<Loc>) -> Self {
        self.push(Instruction::Unlock { loc: loc.into() })
    }

    /// `rcu_read_lock()`
    #[must_use]
    pub fn rcu_lock(self) -> Self {
        self.push(Instruction::RcuLock)
    }

    /// `rcu_read_unlock()`
    #[must_use]
    pub fn rcu_unlock(self) -> Self {
        self.push(Instruction::RcuUnlock)
    }

    /// `synchronize_rcu()`
    #[must_use]
    pub fn sync_rcu(self) -> Self {
        self.push(Instruction::SyncRcu)
    }

    /// `dst = malloc(size)`
    #[must_use]
    pub fn malloc(self, dst: Reg, size: u64) -> Self {
        self.push(Instruction::Malloc { dst, size })
    }

    /// `free(ptr)`
    #[must_use]
    pub fn free(self, ptr: impl Into<Operand>) -> Self {
        self.push(Instruction::Free { ptr: ptr.into() })
    }

    /// Discard executions where `cond` fails
    #[must_use]
    pub fn assume(self, cond: Cond) -> Self {
        self.push(Instruction::Assume(cond))
    }

    /// Report executions where `cond` fails
    #[must_use]
    pub fn assert(self, cond: Cond, message: &str) -> Self {
        self.push(Instruction::Assert {
            cond,
            message: message.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MemOrdering::Relaxed;

    fn sb() -> LitmusTest {
        LitmusTest::new("sb")
            .thread(|t| t.store("x", 1, Relaxed).load(0, "y", Relaxed))
            .thread(|t| t.store("y", 1, Relaxed).load(0, "x", Relaxed))
    }

    #[test]
    fn test_variables_get_distinct_addresses() {
        let test = sb();
        assert_eq!(test.vars, vec!["x", "y"]);
        assert_eq!(test.address("x"), Some(Address(VAR_BASE)));
        assert_eq!(test.address("y"), Some(Address(VAR_BASE + CELL_SIZE)));
        assert_eq!(test.address("z"), None);
    }

    #[test]
    fn test_register_count() {
        let test = LitmusTest::new("regs")
            .thread(|t| t.load(2, "x", Relaxed).add(0, reg(2), 1))
            .thread(|t| t.store("x", 1, Relaxed));
        assert_eq!(test.register_count(0), 3);
        assert_eq!(test.register_count(1), 0);
        assert_eq!(test.register_count(7), 0);
    }

    #[test]
    fn test_conditions() {
        assert!(Cond::eq(reg(0), 1).holds(1, 1));
        assert!(!Cond::ne(reg(0), 1).holds(1, 1));
        assert!(Cond::ne(reg(0), 0).holds(3, 0));
    }

    #[test]
    fn test_json_declares_variables() {
        let json = serde_json::to_string(&sb()).unwrap();
        let mut stripped: serde_json::Value = serde_json::from_str(&json).unwrap();
        stripped["vars"] = serde_json::Value::Array(Vec::new());

        let back = LitmusTest::from_json(&stripped.to_string()).unwrap();
        assert_eq!(back.vars, vec!["x", "y"]);
        assert_eq!(back.threads, sb().threads);
    }

    #[test]
    fn test_display() {
        let test = sb().describe("store buffering");
        assert_eq!(test.to_string(), "sb (2 threads): store buffering");
    }
}
