//! # Connection Manager
//!
//! Accepts transport connections and turns each into a [`Session`] with a
//! process-unique id. Transports only deal with text frames: they hand the
//! manager an outbound channel and feed inbound frames to the returned
//! session.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::memory_guard::BufferGuard;
use crate::core::session::{Session, SessionContext, SessionId};

pub struct ConnectionManager {
    ctx: SessionContext,
    guard: Arc<BufferGuard>,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl ConnectionManager {
    pub fn new(ctx: SessionContext) -> Self {
        let guard = Arc::new(BufferGuard::new(ctx.options.max_total_buffered_bytes));
        Self {
            ctx,
            guard,
            next_id: AtomicU64::new(1),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Opens a session writing to `outbound`. The handshake is queued before
    /// this returns.
    pub fn accept(&self, outbound: mpsc::UnboundedSender<String>) -> Session {
        let id: SessionId = self.next_id.fetch_add(1, Ordering::Relaxed);
        Session::open(
            id,
            self.ctx.clone(),
            outbound,
            self.guard.clone(),
            self.active.clone(),
        )
    }

    /// Sessions opened and not yet closed.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// The shared budget for partial inbound frames.
    pub fn buffer_guard(&self) -> &Arc<BufferGuard> {
        &self.guard
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }
}
