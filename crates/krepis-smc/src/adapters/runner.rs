//! Litmus interpreter
//!
//! [`LitmusInterpreter`] runs a [`LitmusTest`] against the explorer's
//! handlers. Thread 0 is a synthetic main thread:
//!
//! ```text
//!   main:  spawn T1 .. spawn Tn ; join T1 .. join Tn ; read observed vars ; finish
//!   Ti:    litmus code of thread i-1 ; finish
//! ```
//!
//! The outcome of an execution holds every written register as `"t:rN"`
//! and every observed variable under its name.

use super::litmus::{Instruction, LitmusTest, Loc, Operand, Reg};
use crate::domain::config::CheckerConfig;
use crate::domain::error::CheckerError;
use crate::domain::graph::{Address, Event, MemOrdering, Value};
use crate::domain::report::{Outcome, VerificationResult};
use crate::domain::revisit::{Explorer, Interpreter};
use tracing::debug;

/// Register contents and the events the value came from
#[derive(Clone, Debug, Default)]
struct Register {
    value: Value,
    sources: Vec<Event>,
    written: bool,
}

/// Main-thread progress
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MainStep {
    Spawn(usize),
    Join(usize),
    Observe(usize),
    Finish,
    Done,
}

/// Interpreter port for litmus programs
#[derive(Debug)]
pub struct LitmusInterpreter<'t> {
    test: &'t LitmusTest,
    main: MainStep,
    children: Vec<usize>,
    pcs: Vec<usize>,
    regs: Vec<Vec<Register>>,
    finals: Vec<Value>,
}

impl<'t> LitmusInterpreter<'t> {
    /// Interpreter for `test`
    pub fn new(test: &'t LitmusTest) -> Self {
        let mut interp = Self {
            test,
            main: MainStep::Spawn(0),
            children: Vec::new(),
            pcs: Vec::new(),
            regs: Vec::new(),
            finals: Vec::new(),
        };
        interp.reset();
        interp
    }

    /// Program being run
    pub const fn test(&self) -> &'t LitmusTest {
        self.test
    }

    fn slot_of(&self, thread: usize) -> Result<usize, CheckerError> {
        self.children
            .iter()
            .position(|&c| c == thread)
            .ok_or(CheckerError::UnknownThread(thread))
    }

    fn value(&self, slot: usize, op: Operand) -> Value {
        match op {
            Operand::Const(v) => v,
            Operand::Reg(r) => self.regs[slot].get(r).map_or(0, |reg| reg.value),
        }
    }

    fn sources(&self, slot: usize, ops: &[Operand]) -> Vec<Event> {
        let mut out: Vec<Event> = ops
            .iter()
            .filter_map(|op| match op {
                Operand::Reg(r) => self.regs[slot].get(*r),
                Operand::Const(_) => None,
            })
            .flat_map(|reg| reg.sources.iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn set(&mut self, slot: usize, dst: Reg, value: Value, sources: Vec<Event>) {
        let file = &mut self.regs[slot];
        if file.len() <= dst {
            file.resize_with(dst + 1, Register::default);
        }
        file[dst] = Register {
            value,
            sources,
            written: true,
        };
    }

    fn address(&self, slot: usize, loc: &Loc) -> Result<Address, CheckerError> {
        match loc {
            Loc::Var(name) => self
                .test
                .address(name)
                .ok_or_else(|| CheckerError::UnknownVariable(name.clone())),
            Loc::Ptr(r) => Ok(to_address(self.value(slot, Operand::Reg(*r)))),
        }
    }

    fn loc_deps(&self, slot: usize, loc: &Loc) -> Vec<Event> {
        match loc {
            Loc::Var(_) => Vec::new(),
            Loc::Ptr(r) => self.sources(slot, &[Operand::Reg(*r)]),
        }
    }

    /// Skip main-thread phases that have nothing left to do
    fn settle(&self, step: MainStep) -> MainStep {
        let threads = self.test.threads.len();
        let observed = self.test.observed.len();
        match step {
            MainStep::Spawn(i) if i >= threads => {
                if threads > 0 {
                    MainStep::Join(0)
                } else if observed > 0 {
                    MainStep::Observe(0)
                } else {
                    MainStep::Finish
                }
            }
            MainStep::Join(i) if i >= threads => {
                if observed > 0 {
                    MainStep::Observe(0)
                } else {
                    MainStep::Finish
                }
            }
            MainStep::Observe(i) if i >= observed => MainStep::Finish,
            other => other,
        }
    }

    fn step_main(&mut self, ex: &mut Explorer) -> Result<(), CheckerError> {
        self.main = match self.settle(self.main) {
            MainStep::Spawn(i) => match ex.spawn(0)? {
                Some(child) => {
                    self.children.push(child);
                    MainStep::Spawn(i + 1)
                }
                None => MainStep::Spawn(i),
            },
            MainStep::Join(i) => match ex.join(0, self.children[i])? {
                Some(()) => MainStep::Join(i + 1),
                None => MainStep::Join(i),
            },
            MainStep::Observe(i) => {
                let name = &self.test.observed[i];
                let addr = self
                    .test
                    .address(name)
                    .ok_or_else(|| CheckerError::UnknownVariable(name.clone()))?;
                match ex.load(0, addr, MemOrdering::Relaxed, Vec::new())? {
                    Some(v) => {
                        self.finals[i] = v;
                        MainStep::Observe(i + 1)
                    }
                    None => MainStep::Observe(i),
                }
            }
            MainStep::Finish => match ex.finish(0)? {
                Some(()) => MainStep::Done,
                None => MainStep::Finish,
            },
            MainStep::Done => MainStep::Done,
        };
        Ok(())
    }

    fn step_child(&mut self, slot: usize, thread: usize, ex: &mut Explorer) -> Result<(), CheckerError> {
        let test = self.test;
        let Some(instruction) = test.threads[slot].get(self.pcs[slot]) else {
            if ex.finish(thread)?.is_some() {
                self.pcs[slot] += 1;
            }
            return Ok(());
        };
        let at = ex.next_event(thread);
        let done = match instruction {
            Instruction::Load { dst, loc, ordering } => {
                let addr = self.address(slot, loc)?;
                let deps = self.loc_deps(slot, loc);
                match ex.load(thread, addr, *ordering, deps)? {
                    Some(v) => {
                        self.set(slot, *dst, v, at.into_iter().collect());
                        true
                    }
                    None => false,
                }
            }
            Instruction::Store { loc, value, ordering } => {
                let addr = self.address(slot, loc)?;
                let mut deps = self.loc_deps(slot, loc);
                deps.extend(self.sources(slot, &[*value]));
                let v = self.value(slot, *value);
                ex.store(thread, addr, v, *ordering, deps)?.is_some()
            }
            Instruction::Add { dst, src, operand } => {
                let v = self.value(slot, *src).wrapping_add(*operand);
                let sources = self.sources(slot, &[*src]);
                self.set(slot, *dst, v, sources);
                true
            }
            Instruction::FetchAdd {
                dst,
                loc,
                operand,
                ordering,
            } => {
                let addr = self.address(slot, loc)?;
                let deps = self.loc_deps(slot, loc);
                match ex.fetch_add(thread, addr, *operand, *ordering, deps)? {
                    Some(v) => {
                        self.set(slot, *dst, v, at.into_iter().collect());
                        true
                    }
                    None => false,
                }
            }
            Instruction::CompareExchange {
                dst,
                loc,
                expected,
                desired,
                ordering,
            } => {
                let addr = self.address(slot, loc)?;
                let deps = self.loc_deps(slot, loc);
                match ex.compare_exchange(thread, addr, *expected, *desired, *ordering, deps)? {
                    Some(v) => {
                        self.set(slot, *dst, v, at.into_iter().collect());
                        true
                    }
                    None => false,
                }
            }
            Instruction::Fence { ordering } => ex.fence(thread, *ordering)?.is_some(),
            Instruction::Lock { loc } => {
                let addr = self.address(slot, loc)?;
                ex.lock(thread, addr)?.is_some()
            }
            Instruction::Unlock { loc } => {
                let addr = self.address(slot, loc)?;
                ex.unlock(thread, addr)?.is_some()
            }
            Instruction::RcuLock => ex.rcu_lock(thread)?.is_some(),
            Instruction::RcuUnlock => ex.rcu_unlock(thread)?.is_some(),
            Instruction::SyncRcu => ex.sync_rcu(thread)?.is_some(),
            Instruction::Malloc { dst, size } => match ex.malloc(thread, *size)? {
                Some(addr) => {
                    self.set(slot, *dst, to_value(addr), at.into_iter().collect());
                    true
                }
                None => false,
            },
            Instruction::Free { ptr } => {
                let addr = to_address(self.value(slot, *ptr));
                ex.free(thread, addr)?.is_some()
            }
            Instruction::Assume(cond) => {
                let holds = cond.holds(self.value(slot, cond.lhs), self.value(slot, cond.rhs));
                ex.assume(thread, holds)?.is_some()
            }
            Instruction::Assert { cond, message } => {
                let holds = cond.holds(self.value(slot, cond.lhs), self.value(slot, cond.rhs));
                ex.assert(thread, holds, message)?;
                true
            }
        };
        if done {
            self.pcs[slot] += 1;
        }
        Ok(())
    }
}

#[allow(clippy::cast_sign_loss)]
const fn to_address(v: Value) -> Address {
    Address(v as u64)
}

#[allow(clippy::cast_possible_wrap)]
const fn to_value(addr: Address) -> Value {
    addr.0 as Value
}

impl Interpreter for LitmusInterpreter<'_> {
    fn reset(&mut self) {
        let n = self.test.thread_count();
        self.main = MainStep::Spawn(0);
        self.children.clear();
        self.pcs = vec![0; n];
        self.regs = (0..n)
            .map(|t| vec![Register::default(); self.test.register_count(t)])
            .collect();
        self.finals = vec![0; self.test.observed.len()];
    }

    fn thread_count(&self) -> usize {
        self.test.thread_count() + 1
    }

    fn step(&mut self, thread: usize, explorer: &mut Explorer) -> Result<(), CheckerError> {
        if thread == 0 {
            self.step_main(explorer)
        } else {
            let slot = self.slot_of(thread)?;
            self.step_child(slot, thread, explorer)
        }
    }

    fn outcome(&self) -> Outcome {
        let mut outcome = Outcome::default();
        for (t, file) in self.regs.iter().enumerate() {
            for (r, reg) in file.iter().enumerate().filter(|(_, reg)| reg.written) {
                outcome.0.insert(format!("{t}:r{r}"), reg.value);
            }
        }
        for (name, v) in self.test.observed.iter().zip(&self.finals) {
            outcome.0.insert(name.clone(), *v);
        }
        outcome
    }
}

/// Explore every execution of `test`
///
/// Runs on the worker pool when the `parallel` feature is on and
/// `config.workers` is above one.
pub fn verify(test: &LitmusTest, config: &CheckerConfig) -> Result<VerificationResult, CheckerError> {
    debug!(test = %test.name, workers = config.workers, "verifying litmus test");
    #[cfg(feature = "parallel")]
    {
        if config.workers > 1 {
            let pool = crate::infrastructure::WorkerPool::new(config.clone());
            return pool.run(|| LitmusInterpreter::new(test));
        }
    }
    Explorer::new(config.clone()).run(&mut LitmusInterpreter::new(test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::litmus::{reg, Cond};
    use crate::domain::config::MemoryModel;
    use MemOrdering::{Acquire, Relaxed, Release};

    #[test]
    fn test_single_thread_reads_own_store() {
        let test = LitmusTest::new("own")
            .thread(|t| t.store("x", 5, Relaxed).load(0, "x", Relaxed));
        let result = verify(&test, &CheckerConfig::default()).unwrap();
        assert_eq!(result.stats.complete, 1);
        assert!(result.allows(&Outcome::from_pairs([("0:r0", 5)])));
    }

    #[test]
    fn test_register_arithmetic_feeds_stores() {
        let test = LitmusTest::new("inc")
            .thread(|t| t.load(0, "x", Relaxed).add(1, reg(0), 41).store("x", reg(1), Relaxed))
            .observe("x");
        let result = verify(&test, &CheckerConfig::default()).unwrap();
        assert_eq!(result.outcomes.len(), 1);
        assert!(result.allows(&Outcome::from_pairs([("0:r0", 0), ("0:r1", 41), ("x", 41)])));
    }

    #[test]
    fn test_observed_final_value_is_co_maximal() {
        let test = LitmusTest::new("ww")
            .thread(|t| t.store("x", 1, Relaxed))
            .thread(|t| t.store("x", 2, Relaxed))
            .observe("x");
        let result = verify(&test, &CheckerConfig::default().keep_going()).unwrap();
        assert_eq!(result.stats.complete, 2);
        assert!(result.allows(&Outcome::from_pairs([("x", 1)])));
        assert!(result.allows(&Outcome::from_pairs([("x", 2)])));
    }

    #[test]
    fn test_failed_assertion_is_reported() {
        let test = LitmusTest::new("assert")
            .thread(|t| t.store("x", 1, Release))
            .thread(|t| t.load(0, "x", Acquire).assert(Cond::eq(reg(0), 1), "x not yet written"));
        let result = verify(&test, &CheckerConfig::default()).unwrap();
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].kind(), "assertion");
    }

    #[test]
    fn test_assume_prunes_executions() {
        let test = LitmusTest::new("assume")
            .thread(|t| t.store("x", 1, Relaxed))
            .thread(|t| t.load(0, "x", Relaxed).assume(Cond::eq(reg(0), 1)));
        let result = verify(&test, &CheckerConfig::default()).unwrap();
        assert_eq!(result.stats.complete, 1);
        assert!(result.allows(&Outcome::from_pairs([("1:r0", 1)])));
        assert!(result.stats.blocked >= 1);
    }

    #[test]
    fn test_outcome_names_registers_by_thread() {
        let test = LitmusTest::new("names").thread(|t| t.load(3, "x", Relaxed));
        let interp = LitmusInterpreter::new(&test);
        assert_eq!(interp.thread_count(), 2);
        assert!(interp.outcome().0.is_empty(), "nothing written yet");

        let result = verify(&test, &CheckerConfig::default().with_model(MemoryModel::Sc)).unwrap();
        assert!(result.allows(&Outcome::from_pairs([("0:r3", 0)])));
    }

    #[test]
    fn test_unknown_child_thread() {
        let test = LitmusTest::new("none");
        let mut interp = LitmusInterpreter::new(&test);
        let mut ex = Explorer::new(CheckerConfig::default());
        assert_eq!(interp.step(4, &mut ex), Err(CheckerError::UnknownThread(4)));
    }
}
