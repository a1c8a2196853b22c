//! Built-in litmus catalog
//!
//! Classic shapes from the weak-memory literature plus a few programs with
//! seeded bugs. Each test's `exists` clause names the outcome the shape is
//! known for; whether it is reachable depends on the memory model.
//!
//! | name          | weak outcome reachable under         |
//! |---------------|--------------------------------------|
//! | `sb`          | ra, rc11, lkmm                       |
//! | `sb+mbs`      | none (full fences)                   |
//! | `sb+sc`       | ra (SeqCst accesses only order rc11) |
//! | `mp`          | rc11, lkmm                           |
//! | `mp+rel-acq`  | none                                 |
//! | `lb`          | none under sc, ra, rc11              |
//! | `2+2w`        | ra, rc11                             |
//! | `rcu-mp`      | none under lkmm                      |

use super::litmus::{reg, Cond, LitmusTest, Loc, ThreadBuilder};
use crate::domain::graph::MemOrdering::{Acquire, NotAtomic, Relaxed, Release, SeqCst};

/// Store buffering
pub fn sb() -> LitmusTest {
    LitmusTest::new("sb")
        .describe("store buffering")
        .thread(|t| t.store("x", 1, Relaxed).load(0, "y", Relaxed))
        .thread(|t| t.store("y", 1, Relaxed).load(0, "x", Relaxed))
        .exists([("0:r0", 0), ("1:r0", 0)])
}

/// Store buffering with full fences between the store and the load
pub fn sb_mbs() -> LitmusTest {
    LitmusTest::new("sb+mbs")
        .describe("store buffering, full fences")
        .thread(|t| t.store("x", 1, Relaxed).fence(SeqCst).load(0, "y", Relaxed))
        .thread(|t| t.store("y", 1, Relaxed).fence(SeqCst).load(0, "x", Relaxed))
        .exists([("0:r0", 0), ("1:r0", 0)])
}

/// Store buffering with SeqCst accesses
pub fn sb_sc() -> LitmusTest {
    LitmusTest::new("sb+sc")
        .describe("store buffering, SeqCst accesses")
        .thread(|t| t.store("x", 1, SeqCst).load(0, "y", SeqCst))
        .thread(|t| t.store("y", 1, SeqCst).load(0, "x", SeqCst))
        .exists([("0:r0", 0), ("1:r0", 0)])
}

/// Message passing, all relaxed
pub fn mp() -> LitmusTest {
    LitmusTest::new("mp")
        .describe("message passing")
        .thread(|t| t.store("x", 1, Relaxed).store("y", 1, Relaxed))
        .thread(|t| t.load(0, "y", Relaxed).load(1, "x", Relaxed))
        .exists([("1:r0", 1), ("1:r1", 0)])
}

/// Message passing through a release store and an acquire load
pub fn mp_rel_acq() -> LitmusTest {
    LitmusTest::new("mp+rel-acq")
        .describe("message passing, release/acquire flag")
        .thread(|t| t.store("x", 1, Relaxed).store("y", 1, Release))
        .thread(|t| t.load(0, "y", Acquire).load(1, "x", Relaxed))
        .exists([("1:r0", 1), ("1:r1", 0)])
}

/// Load buffering
pub fn lb() -> LitmusTest {
    LitmusTest::new("lb")
        .describe("load buffering")
        .thread(|t| t.load(0, "x", Relaxed).store("y", 1, Relaxed))
        .thread(|t| t.load(0, "y", Relaxed).store("x", 1, Relaxed))
        .exists([("0:r0", 1), ("1:r0", 1)])
}

/// Two threads writing two locations in opposite orders
pub fn two_plus_two_w() -> LitmusTest {
    LitmusTest::new("2+2w")
        .describe("write-write coherence cycle")
        .thread(|t| t.store("x", 1, Relaxed).store("y", 2, Relaxed))
        .thread(|t| t.store("y", 1, Relaxed).store("x", 2, Relaxed))
        .observe("x")
        .observe("y")
        .exists([("x", 1), ("y", 1)])
}

/// Non-atomic counter protected by a mutex
pub fn lock_counter() -> LitmusTest {
    let increment = |t: ThreadBuilder| {
        t.lock("m")
            .load(0, "x", NotAtomic)
            .add(1, reg(0), 1)
            .store("x", reg(1), NotAtomic)
            .unlock("m")
    };
    LitmusTest::new("lock-counter")
        .describe("mutex-protected increment")
        .thread(increment)
        .thread(increment)
        .observe("x")
        .exists([("x", 1)])
}

/// Two mutexes taken in opposite orders
pub fn abba() -> LitmusTest {
    LitmusTest::new("abba")
        .describe("lock-order inversion")
        .thread(|t| t.lock("a").lock("b").unlock("b").unlock("a"))
        .thread(|t| t.lock("b").lock("a").unlock("a").unlock("b"))
}

/// Message passing across an RCU grace period
pub fn rcu_mp() -> LitmusTest {
    LitmusTest::new("rcu-mp")
        .describe("grace period orders a read-side critical section")
        .thread(|t| t.store("x", 1, Relaxed).sync_rcu().store("y", 1, Relaxed))
        .thread(|t| {
            t.rcu_lock()
                .load(0, "y", Relaxed)
                .load(1, "x", Relaxed)
                .rcu_unlock()
        })
        .exists([("1:r0", 1), ("1:r1", 0)])
}

/// Plain write racing with a plain read
pub fn race() -> LitmusTest {
    LitmusTest::new("race")
        .describe("unsynchronized non-atomic accesses")
        .thread(|t| t.store("x", 1, NotAtomic))
        .thread(|t| t.load(0, "x", NotAtomic))
}

/// Published block freed while another thread reads through it
pub fn uaf() -> LitmusTest {
    LitmusTest::new("uaf")
        .describe("read through a pointer after its block is freed")
        .thread(|t| t.malloc(0, 1).store("p", reg(0), Release).free(reg(0)))
        .thread(|t| {
            t.load(0, "p", Acquire)
                .assume(Cond::ne(reg(0), 0))
                .load(1, Loc::Ptr(0), NotAtomic)
        })
}

/// Published block freed by both its owner and a reader
pub fn double_free() -> LitmusTest {
    LitmusTest::new("double-free")
        .describe("two threads free the same block")
        .thread(|t| t.malloc(0, 1).store("p", reg(0), Release).free(reg(0)))
        .thread(|t| t.load(0, "p", Acquire).assume(Cond::ne(reg(0), 0)).free(reg(0)))
}

/// Every built-in test, in listing order
pub fn catalog() -> Vec<LitmusTest> {
    vec![
        sb(),
        sb_mbs(),
        sb_sc(),
        mp(),
        mp_rel_acq(),
        lb(),
        two_plus_two_w(),
        lock_counter(),
        abba(),
        rcu_mp(),
        race(),
        uaf(),
        double_free(),
    ]
}

/// Built-in test by name
pub fn find(name: &str) -> Option<LitmusTest> {
    catalog().into_iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<String> = catalog().into_iter().map(|t| t.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 13);
    }

    #[test]
    fn test_find() {
        assert_eq!(find("2+2w").map(|t| t.threads.len()), Some(2));
        assert!(find("iriw").is_none());
    }

    #[test]
    fn test_heap_tests_declare_only_the_pointer() {
        let test = uaf();
        assert_eq!(test.vars, vec!["p"]);
        assert_eq!(test.register_count(1), 2);
    }
}
