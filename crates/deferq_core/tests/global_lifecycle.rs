//! Integration tests for the process-wide queue and environment config.
//!
//! Both touch process globals, so each concern lives in a single test.
//!
//! Run with: cargo test -p deferq_core --test global_lifecycle

mod common;

use deferq_core::config::MAX_SIZE_ENV;
use deferq_core::{global, QueueConfig, QueueError};
use deferq_shared::ObjectId;

use common::{notify, World};

#[test]
fn test_init_get_shutdown() {
    assert!(global::get().is_none());

    let world = World::new();
    world.spawn(&[42]);
    let config = QueueConfig::with_size_kb(64);

    let owner = global::init(&config, world.clone(), world.clone()).unwrap();
    world.attach(owner.queue());
    assert_eq!(owner.capacity_bytes(), 64 * 1024);

    let second = global::init(&config, world.clone(), world.clone());
    assert!(matches!(second, Err(QueueError::AlreadyInitialized)));

    let queue = global::get().unwrap();
    queue.enqueue_notification(ObjectId::new(42), 7).unwrap();
    drop(queue);

    owner.flush();
    assert_eq!(world.take_events(), vec![notify(42, 7)]);

    owner.shutdown();
    assert!(global::get().is_none());

    // A fresh owner can be installed after shutdown.
    let owner = global::init(&config, world.clone(), world.clone()).unwrap();
    assert!(global::get().is_some());
    drop(owner);
    assert!(global::get().is_none());

    let invalid = global::init(&QueueConfig::with_size_kb(0), world.clone(), world);
    assert!(matches!(invalid, Err(QueueError::InvalidConfig(_))));
    assert!(global::get().is_none());
}

#[test]
fn test_config_from_env() {
    std::env::set_var(MAX_SIZE_ENV, "2048");
    assert_eq!(QueueConfig::from_env().unwrap().max_size_kb, 2048);

    std::env::set_var(MAX_SIZE_ENV, " 8192 ");
    assert_eq!(QueueConfig::from_env().unwrap().max_size_kb, 8192);

    std::env::set_var(MAX_SIZE_ENV, "abc");
    assert!(matches!(QueueConfig::from_env(), Err(QueueError::InvalidConfig(_))));

    std::env::set_var(MAX_SIZE_ENV, "0");
    assert!(matches!(QueueConfig::from_env(), Err(QueueError::InvalidConfig(_))));

    std::env::remove_var(MAX_SIZE_ENV);
    assert_eq!(QueueConfig::from_env().unwrap(), QueueConfig::default());

    // Overrides layer on top of a file-based config.
    let file = QueueConfig::from_toml_str("[message_queue]\nmax_size_kb = 1536\n").unwrap();
    assert_eq!(file.clone().with_env_overrides().unwrap(), file);
}
