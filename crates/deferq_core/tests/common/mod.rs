//! Shared fixtures: an in-memory object world that records every dispatch.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, OnceLock, Weak};

use deferq_core::DeferredQueue;
use deferq_shared::{DispatchError, Dispatcher, ObjectId, ObjectRef, ObjectRegistry, Selector, Value};
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// What a target observed, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A method ran.
    Call { target: u64, method: String, args: Vec<Value> },
    /// A property was assigned.
    Set { target: u64, property: String, value: Value },
    /// A notification arrived.
    Notify { target: u64, code: i32 },
}

/// A live object in the test world.
#[derive(Debug)]
pub struct Node {
    pub id: ObjectId,
}

/// Registry and dispatcher in one.
///
/// Methods with special behaviour:
/// - `fail`: returns `InvalidMethod`
/// - `explode`: panics inside the dispatch
/// - `reschedule(n)`: schedules `reschedule(n - 1)` on the same target while `n > 0`
/// - `nested_flush`: calls `flush` on the queue from inside the drain
/// - `free_self`: removes its own target from the world
#[derive(Default)]
pub struct World {
    objects: Mutex<HashMap<ObjectId, Arc<Node>>>,
    events: Mutex<Vec<Event>>,
    queue: OnceLock<Weak<DeferredQueue>>,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds objects with the given raw ids.
    pub fn spawn(&self, ids: &[u64]) {
        let mut objects = self.objects.lock();
        for &raw in ids {
            let id = ObjectId::new(raw);
            objects.insert(id, Arc::new(Node { id }));
        }
    }

    /// Removes an object; its handle stops resolving.
    pub fn free(&self, raw: u64) {
        self.objects.lock().remove(&ObjectId::new(raw));
    }

    /// Lets dispatched methods reach the queue.
    pub fn attach(&self, queue: &Arc<DeferredQueue>) {
        let _ = self.queue.set(Arc::downgrade(queue));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    fn queue(&self) -> Arc<DeferredQueue> {
        self.queue.get().and_then(Weak::upgrade).expect("queue not attached")
    }

    fn node(target: &ObjectRef) -> &Node {
        target.downcast_ref::<Node>().expect("foreign object")
    }
}

impl ObjectRegistry for World {
    fn resolve(&self, id: ObjectId) -> Option<ObjectRef> {
        self.objects.lock().get(&id).map(|node| Arc::clone(node) as ObjectRef)
    }

    fn class_name(&self, id: ObjectId) -> Option<String> {
        self.objects.lock().contains_key(&id).then(|| "Node".to_string())
    }
}

impl Dispatcher for World {
    fn call(&self, target: &ObjectRef, method: &Selector, args: &[Value]) -> Result<(), DispatchError> {
        let node = Self::node(target);
        self.events.lock().push(Event::Call {
            target: node.id.raw(),
            method: method.to_string(),
            args: args.to_vec(),
        });

        match method.as_str() {
            "fail" => Err(DispatchError::InvalidMethod),
            "explode" => panic!("dispatched callback exploded"),
            "reschedule" => {
                let n = args.first().and_then(Value::as_int).unwrap_or(0);
                if n > 0 {
                    self.queue()
                        .enqueue_call(node.id, method, &[Value::Int(n - 1)], true)
                        .expect("reschedule");
                }
                Ok(())
            }
            "nested_flush" => {
                self.queue().flush();
                Ok(())
            }
            "free_self" => {
                self.free(node.id.raw());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn set_property(&self, target: &ObjectRef, property: &Selector, value: &Value) {
        let node = Self::node(target);
        self.events.lock().push(Event::Set {
            target: node.id.raw(),
            property: property.to_string(),
            value: value.clone(),
        });
    }

    fn notify(&self, target: &ObjectRef, code: i32) {
        let node = Self::node(target);
        self.events.lock().push(Event::Notify { target: node.id.raw(), code });
    }
}

/// A queue of `capacity` bytes wired to a fresh world holding `ids`.
pub fn setup(capacity: usize, ids: &[u64]) -> (Arc<DeferredQueue>, Arc<World>) {
    let world = World::new();
    world.spawn(ids);
    let queue = Arc::new(DeferredQueue::with_capacity(capacity, world.clone(), world.clone()));
    world.attach(&queue);
    (queue, world)
}

pub fn sel(name: &str) -> Selector {
    Selector::new(name)
}

pub fn call(target: u64, method: &str, args: Vec<Value>) -> Event {
    Event::Call { target, method: method.to_string(), args }
}

pub fn set(target: u64, property: &str, value: Value) -> Event {
    Event::Set { target, property: property.to_string(), value }
}

pub fn notify(target: u64, code: i32) -> Event {
    Event::Notify { target, code }
}

/// Shared in-memory sink for formatted log lines.
#[derive(Clone, Default)]
struct LogSink(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a thread-local subscriber and returns everything logged at
/// `INFO` and above, one event per line.
pub fn capture_logs<F: FnOnce()>(f: F) -> String {
    let sink = LogSink::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = sink.0.lock().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
