//! Integration tests for producers on other threads and per-thread
//! accumulation.
//!
//! Run with: cargo test -p deferq_core --test thread_staging

mod common;

use std::sync::Arc;
use std::thread;

use common::{call, notify, sel, setup, Event};
use crossbeam_channel::bounded;
use deferq_core::{call_footprint, QueueError};
use deferq_shared::{ObjectId, Value};

const ID: ObjectId = ObjectId(42);

#[test]
fn test_accumulated_records_merge_on_disable() {
    let (queue, world) = setup(4096, &[42]);

    let worker = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            queue.set_accumulation_enabled(true).unwrap();
            for i in 0..3 {
                queue.enqueue_call(ID, &sel("work"), &[Value::Int(i)], true).unwrap();
            }
            // Staged privately: nothing in the shared arena yet.
            assert_eq!(queue.used_bytes(), 0);
            queue.set_accumulation_enabled(false).unwrap();
        })
    };
    worker.join().unwrap();

    assert_eq!(queue.used_bytes(), 3 * call_footprint(1));
    queue.flush();
    assert_eq!(
        world.events(),
        (0..3).map(|i| call(42, "work", vec![Value::Int(i)])).collect::<Vec<_>>()
    );
}

#[test]
fn test_nested_enable_holds_records_until_last_disable() {
    let (queue, world) = setup(4096, &[42]);
    let (step_tx, step_rx) = bounded::<()>(0);
    let (done_tx, done_rx) = bounded::<()>(0);

    let worker = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            queue.set_accumulation_enabled(true).unwrap();
            queue.set_accumulation_enabled(true).unwrap();
            queue.enqueue_notification(ID, 1).unwrap();
            queue.enqueue_notification(ID, 2).unwrap();
            queue.set_accumulation_enabled(false).unwrap();
            done_tx.send(()).unwrap();

            step_rx.recv().unwrap();
            queue.set_accumulation_enabled(false).unwrap();
            done_tx.send(()).unwrap();
        })
    };

    done_rx.recv().unwrap();
    queue.flush();
    assert!(world.events().is_empty(), "records drained before the last disable");

    step_tx.send(()).unwrap();
    done_rx.recv().unwrap();
    queue.flush();
    assert_eq!(world.events(), vec![notify(42, 1), notify(42, 2)]);

    worker.join().unwrap();
}

#[test]
fn test_merged_block_is_contiguous() {
    let (queue, world) = setup(4096, &[42]);
    let (to_worker, worker_rx) = bounded::<&'static str>(0);
    let (to_main, main_rx) = bounded::<()>(0);

    let worker = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for command in worker_rx {
                match command {
                    "stage" => {
                        queue.set_accumulation_enabled(true).unwrap();
                        queue.enqueue_notification(ID, 10).unwrap();
                        queue.enqueue_notification(ID, 11).unwrap();
                    }
                    "merge" => queue.set_accumulation_enabled(false).unwrap(),
                    _ => break,
                }
                to_main.send(()).unwrap();
            }
        })
    };

    queue.enqueue_notification(ID, 1).unwrap();
    to_worker.send("stage").unwrap();
    main_rx.recv().unwrap();
    queue.enqueue_notification(ID, 2).unwrap();
    to_worker.send("merge").unwrap();
    main_rx.recv().unwrap();
    queue.enqueue_notification(ID, 3).unwrap();
    drop(to_worker);
    worker.join().unwrap();

    queue.flush();
    let codes: Vec<i32> = world
        .events()
        .into_iter()
        .map(|event| match event {
            Event::Notify { code, .. } => code,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(codes, vec![1, 2, 10, 11, 3]);
}

#[test]
fn test_staging_ignores_capacity_until_merge() {
    let text: Arc<str> = Arc::from("burst");
    let record = call_footprint(1);
    let (queue, world) = setup(2 * record + 1, &[42]);

    let worker = {
        let queue = Arc::clone(&queue);
        let text = Arc::clone(&text);
        thread::spawn(move || {
            queue.set_accumulation_enabled(true).unwrap();
            for _ in 0..10 {
                queue
                    .enqueue_call(ID, &sel("say"), &[Value::String(Arc::clone(&text))], true)
                    .unwrap();
            }
            queue.set_accumulation_enabled(false)
        })
    };

    let merged = worker.join().unwrap();
    assert!(matches!(merged, Err(QueueError::OutOfCapacity { .. })));

    // The staged records were destroyed, not leaked into the arena.
    assert_eq!(Arc::strong_count(&text), 1);
    assert_eq!(queue.used_bytes(), 0);
    queue.flush();
    assert!(world.events().is_empty());
}

#[test]
fn test_unbalanced_disable_panics() {
    let (queue, _world) = setup(4096, &[42]);

    let worker = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let _ = queue.set_accumulation_enabled(false);
        })
    };

    assert!(worker.join().is_err());
}

#[test]
fn test_unmerged_staging_destroyed_on_drop() {
    let text: Arc<str> = Arc::from("abandoned");
    let (queue, world) = setup(4096, &[42]);

    {
        let queue = Arc::clone(&queue);
        let text = Arc::clone(&text);
        thread::spawn(move || {
            queue.set_accumulation_enabled(true).unwrap();
            queue
                .enqueue_property_set(ID, &sel("label"), &Value::String(text))
                .unwrap();
        })
        .join()
        .unwrap();
    }

    assert_eq!(Arc::strong_count(&text), 2);
    queue.flush();
    assert!(world.events().is_empty());

    drop(queue);
    assert_eq!(Arc::strong_count(&text), 1);
}

#[test]
fn test_concurrent_producers_keep_per_thread_order() {
    const THREADS: i32 = 8;
    const PER_THREAD: i32 = 200;

    let ids: Vec<u64> = (1..=THREADS as u64).collect();
    let (queue, world) = setup(1024 * 1024, &ids);

    let workers: Vec<_> = (1..=THREADS)
        .map(|t| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    queue.enqueue_notification(ObjectId::new(t as u64), i).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    queue.flush();
    let events = world.events();
    assert_eq!(events.len(), (THREADS * PER_THREAD) as usize);

    for t in 1..=THREADS as u64 {
        let codes: Vec<i32> = events
            .iter()
            .filter_map(|event| match event {
                Event::Notify { target, code } if *target == t => Some(*code),
                _ => None,
            })
            .collect();
        assert_eq!(codes, (0..PER_THREAD).collect::<Vec<_>>());
    }
}

#[test]
fn test_producers_during_flush() {
    let (queue, world) = setup(1024 * 1024, &[42]);
    let (started_tx, started_rx) = bounded::<()>(1);

    // Seed enough work that the drain is still running when the producer pushes.
    for i in 0..1000 {
        queue.enqueue_notification(ID, i).unwrap();
    }

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            started_tx.send(()).unwrap();
            for i in 1000..1100 {
                queue.enqueue_notification(ID, i).unwrap();
            }
        })
    };

    started_rx.recv().unwrap();
    queue.flush();
    producer.join().unwrap();
    queue.flush();

    let codes: Vec<i32> = world
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Notify { code, .. } => Some(code),
            _ => None,
        })
        .collect();
    assert_eq!(codes, (0..1100).collect::<Vec<_>>());
}
