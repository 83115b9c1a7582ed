use crate::backend::{BackendClient, Session};
use crate::config::PoolConfig;
use crate::{BridgeError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

struct IdleSession {
    session: Session,
    last_used: Instant,
}

struct PoolState {
    /// Front is the oldest-inserted entry; eviction and trimming start there.
    idle: VecDeque<IdleSession>,
    /// Idle + on-loan. Never exceeds `max_size`.
    total: usize,
    /// FIFO; a waiter is granted a session before a net-new one is created.
    waiters: VecDeque<oneshot::Sender<Result<Session>>>,
}

struct PoolInner {
    backend: Arc<dyn BackendClient>,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

/// Bounded pool owning the backend session lifecycle: creation via the
/// create-then-attach protocol, idle retention with opportunistic expiry,
/// and FIFO queueing of callers when saturated.
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    pub fn new(backend: Arc<dyn BackendClient>, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                backend,
                config,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    total: 0,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Acquire an exclusively owned session. Expired idle sessions are
    /// evicted first; a new session is created only below `max_size`;
    /// otherwise the caller suspends on the FIFO wait list.
    pub async fn acquire(&self) -> Result<SessionHandle> {
        enum Plan {
            Reuse(Session),
            Create,
            Wait(oneshot::Receiver<Result<Session>>),
        }

        let (plan, expired) = {
            let mut state = self.inner.state.lock();
            let expired = evict_expired(&mut state, &self.inner.config);
            let plan = if let Some(idle) = state.idle.pop_back() {
                Plan::Reuse(idle.session)
            } else if state.total < self.inner.config.max_size {
                state.total += 1;
                Plan::Create
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Plan::Wait(rx)
            };
            (plan, expired)
        };

        for session in expired {
            delete_best_effort(&self.inner.backend, &session).await;
        }

        let session = match plan {
            Plan::Reuse(session) => session,
            Plan::Create => match create_session(&self.inner.backend).await {
                Ok(session) => session,
                Err(e) => {
                    self.inner.on_create_failed();
                    return Err(e);
                }
            },
            Plan::Wait(rx) => rx
                .await
                .map_err(|_| BridgeError::Transport("session pool dropped waiter".into()))??,
        };

        Ok(SessionHandle {
            inner: Arc::clone(&self.inner),
            session,
            released: AtomicBool::new(false),
        })
    }

    /// Destroy all idle sessions. Sessions on loan are untouched; their
    /// holders release them first. Used only at shutdown.
    pub async fn drain(&self) {
        let idle = {
            let mut state = self.inner.state.lock();
            let idle: Vec<_> = state.idle.drain(..).collect();
            state.total -= idle.len();
            idle
        };
        debug!("draining session pool, destroying {} idle sessions", idle.len());
        for entry in idle {
            delete_best_effort(&self.inner.backend, &entry.session).await;
        }
    }

    /// Idle + on-loan count, for observability.
    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().total
    }
}

impl PoolInner {
    /// A reserved slot failed to materialize. The slot is returned and, if a
    /// caller is queued, a replacement create is attempted on its behalf so
    /// the freed capacity is not stranded.
    fn on_create_failed(self: &Arc<Self>) {
        let waiter = {
            let mut state = self.state.lock();
            state.total -= 1;
            match state.waiters.pop_front() {
                Some(tx) => {
                    state.total += 1;
                    Some(tx)
                }
                None => None,
            }
        };
        if let Some(tx) = waiter {
            let inner = Arc::clone(self);
            spawn_or_inline(async move {
                let result = create_session(&inner.backend).await;
                if result.is_err() {
                    inner.state.lock().total -= 1;
                }
                if let Err(Ok(session)) = tx.send(result) {
                    inner.hand_back(session).await;
                }
            });
        }
    }

    /// Re-park a session whose intended waiter abandoned its acquire.
    async fn hand_back(&self, session: Session) {
        let trimmed = self.release_clean(session);
        for session in trimmed {
            delete_best_effort(&self.backend, &session).await;
        }
    }

    /// Clean release: hand the session straight to the first waiter if one
    /// is queued (skipping the idle set), otherwise park it idle and trim
    /// any overflow oldest-first.
    fn release_clean(&self, mut session: Session) -> Vec<Session> {
        let mut state = self.state.lock();
        while let Some(tx) = state.waiters.pop_front() {
            match tx.send(Ok(session)) {
                Ok(()) => return Vec::new(),
                // Waiter abandoned its acquire; try the next one
                Err(Ok(returned)) => session = returned,
                Err(Err(_)) => unreachable!("pool never sends Err on handoff"),
            }
        }
        state.idle.push_back(IdleSession {
            session,
            last_used: Instant::now(),
        });
        let mut trimmed = Vec::new();
        while state.idle.len() > self.config.max_size {
            let oldest = state.idle.pop_front().expect("idle not empty");
            state.total -= 1;
            trimmed.push(oldest.session);
        }
        trimmed
    }

    /// Error release: the session is no longer trustworthy and is destroyed,
    /// then one waiter (if any) is serviced with an idle pull or a
    /// replacement create.
    async fn release_destroy(&self, session: Session) {
        delete_best_effort(&self.backend, &session).await;
        let serviced = {
            let mut state = self.state.lock();
            state.total -= 1;
            match state.waiters.pop_front() {
                Some(tx) => {
                    if let Some(idle) = state.idle.pop_back() {
                        Some((tx, Some(idle.session)))
                    } else {
                        state.total += 1;
                        Some((tx, None))
                    }
                }
                None => None,
            }
        };
        match serviced {
            Some((tx, Some(idle))) => {
                if let Err(Ok(session)) = tx.send(Ok(idle)) {
                    self.hand_back(session).await;
                }
            }
            Some((tx, None)) => {
                let result = create_session(&self.backend).await;
                if result.is_err() {
                    self.state.lock().total -= 1;
                }
                if let Err(Ok(session)) = tx.send(result) {
                    self.hand_back(session).await;
                }
            }
            None => {}
        }
    }
}

fn evict_expired(state: &mut PoolState, config: &PoolConfig) -> Vec<Session> {
    let now = Instant::now();
    let mut expired = Vec::new();
    while let Some(front) = state.idle.front() {
        if now.duration_since(front.last_used) > config.idle_timeout {
            let entry = state.idle.pop_front().expect("idle not empty");
            state.total -= 1;
            expired.push(entry.session);
        } else {
            break;
        }
    }
    if !expired.is_empty() {
        debug!("evicting {} expired idle sessions", expired.len());
    }
    expired
}

/// Two-step protocol: the session is unusable until the attach acknowledges.
async fn create_session(backend: &Arc<dyn BackendClient>) -> Result<Session> {
    let session = backend.create_session().await?;
    backend.attach_session(&session.session_id).await?;
    debug!(session_id = %session.session_id, node_id = session.node_id, "session created");
    Ok(session)
}

/// The backend may have reclaimed the session already; delete failures are
/// swallowed.
async fn delete_best_effort(backend: &Arc<dyn BackendClient>, session: &Session) {
    if let Err(e) = backend.delete_session(&session.session_id).await {
        warn!(session_id = %session.session_id, "session delete failed: {}", e);
    }
}

fn spawn_or_inline<F>(fut: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(fut);
    } else {
        warn!("no runtime available for deferred pool cleanup");
    }
}

/// Exclusive loan of one session. `release` is one-shot: the second and
/// later calls are no-ops. Dropping an unreleased handle destroys the
/// session, the conservative outcome for an abandoned loan.
pub struct SessionHandle {
    inner: Arc<PoolInner>,
    session: Session,
    released: AtomicBool,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session", &self.session)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Return the session to the pool. With an error the session is
    /// destroyed rather than reused; without, it is handed to the first
    /// waiter or parked idle with a refreshed `last_used`.
    pub async fn release(&self, error: Option<&BridgeError>) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        match error {
            Some(e) => {
                debug!(session_id = %self.session.session_id, "destroying session after error: {}", e);
                self.inner.release_destroy(self.session.clone()).await;
            }
            None => {
                let trimmed = self.inner.release_clean(self.session.clone());
                for session in trimmed {
                    delete_best_effort(&self.inner.backend, &session).await;
                }
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let session = self.session.clone();
        warn!(session_id = %session.session_id, "session handle dropped without release");
        spawn_or_inline(async move {
            inner.release_destroy(session).await;
        });
    }
}
