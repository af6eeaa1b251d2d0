//! Write serialization and stale-response filtering.
//!
//! A [`WriteGate`] admits one outstanding write per context. The returned
//! [`WriteGuard`] releases the context when dropped, on every exit path.
//!
//! A [`ContextTracker`] stamps each request with the context that issued it
//! and a navigation generation; responses whose [`Ticket`] no longer matches
//! the current context are discarded.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct WriteGate {
    busy: Mutex<HashSet<String>>,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `context` for one write, or `None` while another is in flight.
    pub fn try_begin(&self, context: &str) -> Option<WriteGuard<'_>> {
        let mut busy = self.lock();
        if !busy.insert(context.to_string()) {
            debug!(context, "write refused: another write is in flight");
            return None;
        }
        Some(WriteGuard {
            gate: self,
            context: context.to_string(),
        })
    }

    pub fn is_busy(&self, context: &str) -> bool {
        self.lock().contains(context)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct WriteGuard<'a> {
    gate: &'a WriteGate,
    context: String,
}

impl WriteGuard<'_> {
    pub fn context(&self) -> &str {
        &self.context
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.gate.lock().remove(&self.context);
    }
}

/// Identifies the context and navigation generation a request was issued in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    context: String,
    generation: u64,
}

impl Ticket {
    pub fn context(&self) -> &str {
        &self.context
    }
}

#[derive(Debug, Default)]
pub struct ContextTracker {
    current: Mutex<Option<String>>,
    generation: AtomicU64,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to `context` and returns a ticket for requests issued there.
    pub fn navigate(&self, context: &str) -> Ticket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(context.to_string());
        Ticket {
            context: context.to_string(),
            generation,
        }
    }

    /// A ticket for a request issued in the current context without navigating.
    pub fn ticket(&self) -> Option<Ticket> {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        Some(Ticket {
            context: current,
            generation: self.generation.load(Ordering::SeqCst),
        })
    }

    pub fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation.load(Ordering::SeqCst)
            && self.current().as_deref() == Some(ticket.context.as_str())
    }

    /// Passes `response` through only if `ticket` is still current.
    pub fn accept<T>(&self, ticket: &Ticket, response: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(response)
        } else {
            warn!(
                context = %ticket.context,
                current = ?self.current(),
                "discarding stale response"
            );
            None
        }
    }
}
