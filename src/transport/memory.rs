use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use reqwest::StatusCode;
use serde::Serialize;

use super::{Request, Response, Transport};
use crate::error::ClientError;

enum Scripted {
    Reply(Response),
    Fail(String),
}

/// Blocks requests for one target until opened.
#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Default)]
struct GateState {
    arrived: usize,
    open: bool,
}

impl Gate {
    /// Let every waiting and future request through.
    pub fn open(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.open = true;
        self.changed.notify_all();
    }

    /// Block until at least one request is waiting at the gate.
    pub fn wait_for_arrival(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.arrived == 0 {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn pass(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.arrived += 1;
        self.changed.notify_all();
        while !state.open {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// In-memory transport that records requests and replays scripted responses.
///
/// Responses are queued per target (path and query). The last queued entry for
/// a target is repeated once the queue is down to one; unknown targets get 404.
#[derive(Default)]
pub struct MemoryTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
    sent: Mutex<Vec<Request>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, target: &str, scripted: Scripted) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(target.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn respond(&self, target: &str, response: Response) {
        self.push(target, Scripted::Reply(response));
    }

    pub fn respond_json<T: Serialize + ?Sized>(&self, target: &str, status: u16, body: &T) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match Response::json(status, body) {
            Ok(response) => self.respond(target, response),
            Err(e) => self.fail(target, &e.to_string()),
        }
    }

    pub fn respond_status(&self, target: &str, status: u16) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.respond(target, Response::new(status, Vec::new()));
    }

    /// Make requests for `target` fail at the transport level.
    pub fn fail(&self, target: &str, message: &str) {
        self.push(target, Scripted::Fail(message.to_string()));
    }

    /// Hold requests for `target` until the returned gate is opened.
    pub fn hold(&self, target: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.to_string(), Arc::clone(&gate));
        gate
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Targets requested so far, in order.
    pub fn targets(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.target).collect()
    }

    fn next_scripted(&self, target: &str) -> Result<Response, ClientError> {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = scripts.get_mut(target) else {
            return Ok(Response::new(StatusCode::NOT_FOUND, Vec::new()));
        };
        let scripted = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().map(|s| match s {
                Scripted::Reply(r) => Scripted::Reply(r.clone()),
                Scripted::Fail(m) => Scripted::Fail(m.clone()),
            })
        };
        match scripted {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(ClientError::network(message)),
            None => Ok(Response::new(StatusCode::NOT_FOUND, Vec::new())),
        }
    }
}

impl Transport for MemoryTransport {
    fn execute(&self, request: &Request) -> Result<Response, ClientError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let gate = self
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.target)
            .cloned();
        if let Some(gate) = gate {
            gate.pass();
        }

        self.next_scripted(&request.target)
    }
}
