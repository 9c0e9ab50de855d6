//! Integration Tests for Reactive System
//!
//! These tests verify that cells, computations, and effects work together
//! correctly through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use reactino_core::reactive::{Cleanup, Computed, ReactiveError, Runtime};
use reactino_core::{ConfigError, RuntimeConfig};

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

fn cleanup_logging(log: &Log, entry: &'static str) -> Option<Cleanup> {
    let log = log.clone();
    Some(Box::new(move || push(&log, entry)) as Cleanup)
}

/// A write propagates to a derived value with exactly one extra run.
#[test]
fn write_propagates_to_derived_value() {
    let runtime = Runtime::new();
    let (a, set_a) = runtime.create_cell(1);
    let b = runtime.create_computation(move || Ok(a.get()? * 2));

    assert_eq!(b.peek().unwrap(), 2);
    assert_eq!(b.run_count().unwrap(), 1);

    set_a.set(5).unwrap();
    runtime.settle().unwrap();

    assert_eq!(b.peek().unwrap(), 10);
    assert_eq!(b.run_count().unwrap(), 2);
}

/// Diamond: A feeds B and C, D reads both. D must run once per change and
/// never see a mix of old and new upstream values.
#[test]
fn diamond_propagation_is_glitch_free() {
    let runtime = Runtime::new();
    let (a, set_a) = runtime.create_cell(1);

    let a_for_b = a.clone();
    let b = runtime.create_computation(move || Ok(a_for_b.get()? * 2));
    let c = runtime.create_computation(move || Ok(a.get()? + 1));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let (b_reader, c_reader) = (b.clone(), c.clone());
    let d = runtime.create_effect(move || {
        sink.borrow_mut().push((b_reader.get()?, c_reader.get()?));
        Ok(None)
    });

    assert_eq!(*seen.borrow(), vec![(2, 2)]);
    assert_eq!(b.rank().unwrap(), 0);
    assert_eq!(c.rank().unwrap(), 0);

    set_a.set(5).unwrap();
    runtime.settle().unwrap();

    assert_eq!(*seen.borrow(), vec![(2, 2), (10, 6)]);
    assert_eq!(d.run_count().unwrap(), 2);
}

/// An unchanged derived value stops propagation.
#[test]
fn unchanged_result_does_not_rerun_dependents() {
    let runtime = Runtime::new();
    let (a, set_a) = runtime.create_cell(1);
    let parity = runtime.create_computation(move || Ok(a.get()? % 2));

    let runs = Rc::new(Cell::new(0));
    let runs_clone = runs.clone();
    let parity_reader = parity.clone();
    let _effect = runtime.create_effect(move || {
        parity_reader.get()?;
        runs_clone.set(runs_clone.get() + 1);
        Ok(None)
    });

    set_a.set(3).unwrap();
    runtime.settle().unwrap();

    assert_eq!(parity.run_count().unwrap(), 2);
    assert_eq!(runs.get(), 1);
}

/// Branches that are no longer taken drop out of the dependency set.
#[test]
fn conditional_reads_prune_stale_dependencies() {
    let runtime = Runtime::new();
    let (use_left, set_use_left) = runtime.create_cell(true);
    let (left, set_left) = runtime.create_cell("left");
    let (right, _) = runtime.create_cell("right");

    let (left_reader, right_reader) = (left.clone(), right.clone());
    let picked = runtime.create_computation(move || {
        if use_left.get()? {
            left_reader.get()
        } else {
            right_reader.get()
        }
    });

    assert_eq!(picked.peek().unwrap(), "left");
    assert_eq!(left.subscriber_count().unwrap(), 1);
    assert_eq!(right.subscriber_count().unwrap(), 0);

    set_use_left.set(false).unwrap();
    runtime.settle().unwrap();

    assert_eq!(picked.peek().unwrap(), "right");
    assert_eq!(left.subscriber_count().unwrap(), 0);
    assert_eq!(right.subscriber_count().unwrap(), 1);

    // The abandoned branch no longer triggers runs.
    set_left.set("other").unwrap();
    runtime.settle().unwrap();
    assert_eq!(picked.run_count().unwrap(), 2);
}

/// Writes issued before a settle are coalesced into a single flush.
#[test]
fn writes_are_batched_until_settle() {
    let runtime = Runtime::new();
    let (a, set_a) = runtime.create_cell(0);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let _effect = runtime.create_effect(move || {
        sink.borrow_mut().push(a.get()?);
        Ok(None)
    });

    for value in 1..=3 {
        set_a.set(value).unwrap();
    }
    assert_eq!(runtime.stats().pending_microtasks, 1);
    assert_eq!(runtime.settle().unwrap(), 1);

    assert_eq!(*seen.borrow(), vec![0, 3]);
    let stats = runtime.stats();
    assert_eq!(stats.dirty_queue_len, 0);
    assert_eq!(stats.pending_microtasks, 0);
}

/// Disposing a parent runs its cleanup first, then its children's in
/// creation order, depth first.
#[test]
fn disposal_cascades_through_children() {
    let runtime = Runtime::new();
    let log: Log = Rc::default();
    let child_memo: Rc<RefCell<Option<Computed<i32>>>> = Rc::default();

    let parent_log = log.clone();
    let parent_runtime = runtime.clone();
    let memo_slot = child_memo.clone();
    let parent = runtime.create_effect(move || {
        let first_log = parent_log.clone();
        let first_runtime = parent_runtime.clone();
        parent_runtime.create_effect(move || {
            let grandchild_log = first_log.clone();
            first_runtime.create_effect(move || Ok(cleanup_logging(&grandchild_log, "grandchild")));
            Ok(cleanup_logging(&first_log, "first"))
        });

        let second_log = parent_log.clone();
        parent_runtime.create_effect(move || Ok(cleanup_logging(&second_log, "second")));

        *memo_slot.borrow_mut() = Some(parent_runtime.create_computation(|| Ok(7)));
        Ok(cleanup_logging(&parent_log, "parent"))
    });

    let memo = child_memo.borrow().clone().unwrap();
    assert_eq!(memo.peek().unwrap(), 7);
    assert_eq!(runtime.stats().live_computations, 5);

    parent.dispose();

    assert_eq!(*log.borrow(), vec!["parent", "first", "grandchild", "second"]);
    assert!(memo.is_disposed());
    assert_eq!(runtime.stats().live_computations, 0);
}

/// Cells created inside a computation are replaced on every run.
#[test]
fn rerun_disposes_cells_created_by_previous_run() {
    let runtime = Runtime::new();
    let (trigger, set_trigger) = runtime.create_cell(0);
    let created = Rc::new(RefCell::new(Vec::new()));

    let inner_runtime = runtime.clone();
    let sink = created.clone();
    let _effect = runtime.create_effect(move || {
        let value = trigger.get()?;
        let (local, _) = inner_runtime.create_cell(value);
        sink.borrow_mut().push(local);
        Ok(None)
    });

    set_trigger.set(1).unwrap();
    runtime.settle().unwrap();

    let created = created.borrow();
    assert_eq!(created.len(), 2);
    assert!(created[0].is_disposed());
    assert_eq!(created[1].peek().unwrap(), 1);
}

/// Errors are stored, propagate downstream, and stay until an input changes.
#[test]
fn errors_propagate_and_persist() {
    let runtime = Runtime::new();
    let (input, set_input) = runtime.create_cell(1);
    let (unrelated, set_unrelated) = runtime.create_cell(0);

    let checked = runtime.create_computation(move || {
        let value = input.get()?;
        if value < 0 {
            return Err(ReactiveError::msg("negative input"));
        }
        Ok(value)
    });
    let checked_reader = checked.clone();
    let incremented = runtime.create_computation(move || {
        unrelated.get()?;
        Ok(checked_reader.get()? + 1)
    });
    assert_eq!(incremented.peek().unwrap(), 2);

    set_input.set(-1).unwrap();
    runtime.settle().unwrap();

    let upstream = checked.peek().unwrap_err();
    let downstream = incremented.peek().unwrap_err();
    assert!(upstream.is_application());
    assert!(upstream.same(&downstream));
    assert_eq!(downstream.to_string(), "negative input");

    // Rerunning the reader does not heal the failure.
    set_unrelated.set(1).unwrap();
    runtime.settle().unwrap();
    assert!(incremented.peek().unwrap_err().same(&upstream));
    assert_eq!(checked.run_count().unwrap(), 2);

    set_input.set(4).unwrap();
    runtime.settle().unwrap();
    assert_eq!(incremented.peek().unwrap(), 5);
}

/// A root effect that a computation resumes is kept alive by it.
#[test]
fn root_effect_mounts_and_unmounts() {
    let runtime = Runtime::new();
    let (count, set_count) = runtime.create_cell(0);
    let renders = Rc::new(Cell::new(0));

    let renders_clone = renders.clone();
    let root = runtime.create_root_effect(move || {
        count.get()?;
        renders_clone.set(renders_clone.get() + 1);
        Ok(())
    });
    assert_eq!(renders.get(), 1);

    assert!(root.suspend());
    set_count.set(1).unwrap();
    runtime.settle().unwrap();
    assert_eq!(renders.get(), 1);

    root.resume().unwrap();
    assert_eq!(renders.get(), 2);
    // Resuming a clean root does nothing.
    root.resume().unwrap();
    assert_eq!(renders.get(), 2);

    root.dispose();
    assert!(matches!(root.resume(), Err(ReactiveError::AlreadyDisposed(_))));
}

#[test]
fn settle_inside_computation_is_rejected() {
    let runtime = Runtime::new();
    let inner = runtime.clone();
    let computed = runtime.create_computation(move || inner.settle());

    assert!(matches!(
        computed.peek(),
        Err(ReactiveError::SettleInsideComputation)
    ));
}

/// Long chains need one flush per level; a low limit stops a single settle.
#[test]
fn settle_limit_comes_from_config() {
    let config = RuntimeConfig::from_json(r#"{ "settle_limit": 3 }"#).unwrap();
    let runtime = Runtime::with_config(config);
    let (a, set_a) = runtime.create_cell(0);

    let mut last: Computed<i32> = runtime.create_computation(move || a.get());
    for _ in 0..5 {
        let previous = last.clone();
        last = runtime.create_computation(move || Ok(previous.get()? + 1));
    }
    let tail = last.clone();
    let _effect = runtime.create_effect(move || {
        tail.get()?;
        Ok(None)
    });
    assert_eq!(last.peek().unwrap(), 5);

    set_a.set(10).unwrap();
    assert!(matches!(
        runtime.settle(),
        Err(ReactiveError::SettleLimitExceeded { limit: 3 })
    ));

    // The remaining work is picked up by the next call.
    while runtime.settle().is_err() {}
    assert_eq!(last.peek().unwrap(), 15);
    assert_eq!(last.run_count().unwrap(), 2);
}

#[test]
fn invalid_config_is_rejected() {
    assert!(matches!(
        RuntimeConfig::from_json(r#"{ "settle_limit": 0 }"#),
        Err(ConfigError::ZeroSettleLimit)
    ));
    assert!(matches!(
        RuntimeConfig::from_json("settle_limit = 3"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn shutdown_disposes_everything() {
    let runtime = Runtime::new();
    let log: Log = Rc::default();
    let (count, set_count) = runtime.create_cell(0);

    let effect_log = log.clone();
    let reader = count.clone();
    let effect = runtime.create_effect(move || {
        reader.get()?;
        Ok(cleanup_logging(&effect_log, "cleanup"))
    });
    set_count.set(1).unwrap();

    runtime.shutdown();

    // The pending rerun is dropped; only the first run's cleanup fires.
    assert_eq!(*log.borrow(), vec!["cleanup"]);
    assert!(effect.is_disposed());
    assert!(count.is_disposed());
    assert!(matches!(count.peek(), Err(ReactiveError::AlreadyDisposed(_))));

    let stats = runtime.stats();
    assert_eq!(stats.live_cells, 0);
    assert_eq!(stats.live_computations, 0);
    assert_eq!(stats.pending_microtasks, 0);
}

/// The async driver flushes writes made by other local tasks.
#[tokio::test]
async fn drive_flushes_in_the_background() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let runtime = Runtime::new();
            let (count, set_count) = runtime.create_cell(0);
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

            let _effect = runtime.create_effect(move || {
                let _ = tx.send(count.get()?);
                Ok(None)
            });

            let driver = runtime.clone();
            let handle = tokio::task::spawn_local(async move { driver.drive().await });

            assert_eq!(rx.recv().await, Some(0));
            set_count.set(7).unwrap();
            assert_eq!(rx.recv().await, Some(7));

            runtime.shutdown();
            handle.await.unwrap().unwrap();
            // The effect and its sender are gone.
            assert_eq!(rx.recv().await, None);
        })
        .await;
}

/// Hitting the settle limit makes the driver yield, not stop.
#[tokio::test]
async fn drive_keeps_going_past_the_settle_limit() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let config = RuntimeConfig::from_json(r#"{ "settle_limit": 2 }"#).unwrap();
            let runtime = Runtime::with_config(config);
            let (a, set_a) = runtime.create_cell(0);

            let mut last: Computed<i32> = runtime.create_computation(move || a.get());
            for _ in 0..5 {
                let previous = last.clone();
                last = runtime.create_computation(move || Ok(previous.get()? + 1));
            }
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let tail = last.clone();
            let _effect = runtime.create_effect(move || {
                let _ = tx.send(tail.get()?);
                Ok(None)
            });

            let driver = runtime.clone();
            let handle = tokio::task::spawn_local(async move { driver.drive().await });

            assert_eq!(rx.recv().await, Some(5));
            set_a.set(10).unwrap();
            assert_eq!(rx.recv().await, Some(15));
            assert_eq!(last.run_count().unwrap(), 2);

            runtime.shutdown();
            assert!(handle.await.unwrap().is_ok());
        })
        .await;
}
