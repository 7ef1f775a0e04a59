//! Scripted in-memory `RemoteInvoker` for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use super::invoker::{RemoteCall, RemoteInvoker, RemoteResponse, TransportError};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    Ok(Value),
    Err(TransportError),
    /// Reply with the inner outcome after a delay.
    Delay(Duration, Box<Scripted>),
    /// Never reply.
    Hang,
    Panic,
}

impl Scripted {
    /// Shorthand for `Scripted::Delay(after, Box::new(self))`.
    pub fn after(self, delay: Duration) -> Self {
        Scripted::Delay(delay, Box::new(self))
    }
}

/// Replies to calls per target from a queue of scripted outcomes. Targets
/// with an empty queue answer `{"target": <target>}`.
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RemoteCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, target: &str, replies: Vec<Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, target: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.target == target).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl RemoteInvoker for ScriptedInvoker {
    async fn invoke(&self, call: RemoteCall) -> Result<RemoteResponse, TransportError> {
        let target = call.target.clone();
        self.calls.lock().unwrap().push(call);
        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&target)
            .and_then(VecDeque::pop_front);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let mut reply = reply.unwrap_or_else(|| Scripted::Ok(json!({ "target": target })));
        loop {
            match reply {
                Scripted::Ok(body) => {
                    return Ok(RemoteResponse {
                        status_code: 200,
                        body,
                    });
                }
                Scripted::Err(err) => return Err(err),
                Scripted::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                Scripted::Hang => std::future::pending::<()>().await,
                Scripted::Panic => panic!("scripted panic in '{target}'"),
            }
        }
    }
}
