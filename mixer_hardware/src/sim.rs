//! In-memory transport that records every command and can fail on cue.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mixer_traits::{BoxError, Transport};

use crate::error::TransportError;

type Matcher = Box<dyn Fn(&str) -> bool + Send + Sync>;

enum FailRule {
    /// Fail the n-th send attempt (0-based).
    Nth(usize),
    /// Fail every command the matcher accepts.
    Matching(Matcher),
}

/// Records sent commands; clones share the same log and failure script.
#[derive(Clone)]
pub struct SimulatedTransport {
    sent: Arc<Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
    connected: Arc<AtomicBool>,
    rules: Arc<Mutex<Vec<FailRule>>>,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
            connected: Arc::new(AtomicBool::new(true)),
            rules: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Commands transmitted so far (failed sends are not recorded).
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn set_connected(&self, up: bool) {
        self.connected.store(up, Ordering::SeqCst);
    }

    pub fn fail_nth(&self, n: usize) -> &Self {
        self.push_rule(FailRule::Nth(n));
        self
    }

    /// Fail every command starting with `prefix`.
    pub fn fail_on(&self, prefix: &str) -> &Self {
        let prefix = prefix.to_string();
        self.push_rule(FailRule::Matching(Box::new(move |c| c.starts_with(&prefix))));
        self
    }

    pub fn fail_when(&self, matcher: impl Fn(&str) -> bool + Send + Sync + 'static) -> &Self {
        self.push_rule(FailRule::Matching(Box::new(matcher)));
        self
    }

    fn push_rule(&self, rule: FailRule) {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rule);
    }

    fn should_fail(&self, attempt: usize, command: &str) -> bool {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| match r {
                FailRule::Nth(n) => *n == attempt,
                FailRule::Matching(m) => m(command),
            })
    }
}

impl Transport for SimulatedTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&mut self, command: &str) -> Result<(), BoxError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(TransportError::Disconnected.into());
        }
        if self.should_fail(attempt, command) {
            tracing::debug!(command, attempt, "simulated send failure");
            return Err(TransportError::Rejected(command.to_string()).into());
        }
        tracing::debug!(command, "simulated send");
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());
        Ok(())
    }
}
