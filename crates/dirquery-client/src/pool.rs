//! Connection pooling for the directory client.
//!
//! A bounded pool of [`DirectoryConnection`]s with idle scavenging. All pool
//! state sits behind one lock, which the scavenger thread takes exactly like
//! ordinary callers do.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionBuilder, DirectoryConnection};
use crate::error::Error;

/// Default idle time after which an available connection may be scavenged.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between scavenge runs.
pub const DEFAULT_SCAVENGE_INTERVAL: Duration = Duration::from_secs(90);

/// Configuration for the connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections built eagerly on first use and never scavenged.
    pub min_pool_size: usize,
    /// Upper bound on available plus in-use connections.
    pub max_pool_size: usize,
    /// Idle time (milliseconds) before an available connection may be scavenged.
    pub idle_timeout_ms: u64,
    /// Interval (milliseconds) between scavenge runs.
    pub scavenge_interval_ms: u64,
}

impl PoolConfig {
    /// Create a pool configuration with the given bounds.
    pub fn new(min_pool_size: usize, max_pool_size: usize) -> Self {
        Self {
            min_pool_size,
            max_pool_size,
            ..Self::default()
        }
    }

    /// Set the minimum pool size.
    pub fn with_min_pool_size(mut self, min: usize) -> Self {
        self.min_pool_size = min;
        self
    }

    /// Set the maximum pool size.
    pub fn with_max_pool_size(mut self, max: usize) -> Self {
        self.max_pool_size = max;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the scavenge interval.
    pub fn with_scavenge_interval(mut self, interval: Duration) -> Self {
        self.scavenge_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn scavenge_interval(&self) -> Duration {
        Duration::from_millis(self.scavenge_interval_ms)
    }

    /// Reject sizes no pool can satisfy.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_pool_size == 0 {
            return Err(Error::Configuration(
                "max_pool_size must be at least 1".to_string(),
            ));
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(Error::Configuration(format!(
                "min_pool_size ({}) exceeds max_pool_size ({})",
                self.min_pool_size, self.max_pool_size
            )));
        }
        if self.scavenge_interval_ms == 0 {
            return Err(Error::Configuration(
                "scavenge_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 0,
            max_pool_size: 10,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT.as_millis() as u64,
            scavenge_interval_ms: DEFAULT_SCAVENGE_INTERVAL.as_millis() as u64,
        }
    }
}

/// Background thread running [`ConnectionPool::scavenge`] at a fixed interval.
struct ScavengeTimer {
    /// Stop flag and its wakeup.
    signal: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl ScavengeTimer {
    fn start<B: ConnectionBuilder>(pool: Weak<PoolInner<B>>, interval: Duration) -> Self {
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_signal = signal.clone();

        let handle = thread::Builder::new()
            .name("dirquery-scavenger".to_string())
            .spawn(move || {
                let (stopped, wakeup) = &*thread_signal;
                loop {
                    {
                        let mut stopped = stopped.lock();
                        if !*stopped {
                            wakeup.wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }
                    // The pool is gone once the last handle drops.
                    let Some(inner) = pool.upgrade() else {
                        break;
                    };
                    let removed = inner.scavenge();
                    if removed > 0 {
                        debug!(removed, "Scavenged idle connections");
                    }
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Failed to start scavenger thread; idle connections will not be reclaimed");
                None
            }
        };

        Self { signal, handle }
    }

    /// Signal the thread and wait for it to exit.
    fn stop(mut self) {
        {
            let (stopped, wakeup) = &*self.signal;
            *stopped.lock() = true;
            wakeup.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct PoolState<C> {
    /// Idle connections with the time they were released, oldest first.
    available: Vec<(Arc<C>, Instant)>,
    in_use: Vec<Arc<C>>,
    initialized: bool,
    disposed: bool,
    timer: Option<ScavengeTimer>,
}

struct PoolInner<B: ConnectionBuilder> {
    config: PoolConfig,
    builder: B,
    state: Mutex<PoolState<B::Connection>>,
}

impl<B: ConnectionBuilder> PoolInner<B> {
    fn scavenge(&self) -> usize {
        let mut state = self.state.lock();
        if state.disposed {
            return 0;
        }

        let mut budget = state.available.len().saturating_sub(self.config.min_pool_size);
        if budget == 0 {
            return 0;
        }

        let idle_timeout = self.config.idle_timeout();
        let now = Instant::now();
        let mut removed = 0;

        // Ordered by release time, so the budget goes to the oldest first.
        state.available.retain(|(connection, released)| {
            if budget == 0 || now.duration_since(*released) <= idle_timeout {
                return true;
            }
            connection.dispose();
            budget -= 1;
            removed += 1;
            false
        });
        removed
    }
}

/// A pool of directory connections.
///
/// Connections are handed out as shared handles so a query provider can hold
/// a non-owning reference to one. A connection belongs to its caller between
/// [`get_connection`](Self::get_connection) and
/// [`release_connection`](Self::release_connection).
///
/// # Example
///
/// ```ignore
/// use dirquery_client::{ConnectionConfig, ConnectionPool, LdapConnectionFactory, PoolConfig};
///
/// let factory = LdapConnectionFactory::new(ConnectionConfig::new("dc01:636"), handle)?;
/// let pool = ConnectionPool::new(factory, PoolConfig::new(1, 8))?;
///
/// let connection = pool.get_connection()?;
/// // ... run queries ...
/// pool.release_connection(connection);
/// ```
pub struct ConnectionPool<B: ConnectionBuilder> {
    inner: Arc<PoolInner<B>>,
}

impl<B: ConnectionBuilder> ConnectionPool<B> {
    /// Create a pool. No connection is opened until the first
    /// [`get_connection`](Self::get_connection).
    pub fn new(builder: B, config: PoolConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                builder,
                state: Mutex::new(PoolState {
                    available: Vec::new(),
                    in_use: Vec::new(),
                    initialized: false,
                    disposed: false,
                    timer: None,
                }),
            }),
        })
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Take a connection, building one if none is idle.
    pub fn get_connection(&self) -> Result<Arc<B::Connection>, Error> {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return Err(Error::Disposed("connection pool".to_string()));
        }

        if !state.initialized {
            // All or nothing: a failed fill leaves the pool uninitialized.
            let filled = self.fill_minimum()?;
            let now = Instant::now();
            state
                .available
                .extend(filled.into_iter().map(|connection| (connection, now)));
            state.initialized = true;
            state.timer = Some(ScavengeTimer::start(
                Arc::downgrade(&self.inner),
                self.inner.config.scavenge_interval(),
            ));
            info!(
                min = self.inner.config.min_pool_size,
                max = self.inner.config.max_pool_size,
                "Connection pool initialized"
            );
        }

        while let Some((connection, _)) = state.available.pop() {
            if connection.is_disposed() {
                warn!(id = %connection.id(), "Discarding disposed connection from pool");
                continue;
            }
            state.in_use.push(connection.clone());
            return Ok(connection);
        }

        let max = self.inner.config.max_pool_size;
        if state.in_use.len() + state.available.len() + 1 > max {
            warn!(max, in_use = state.in_use.len(), "Connection pool exhausted");
            return Err(Error::PoolExhausted { max });
        }

        let connection = Arc::new(self.inner.builder.build()?);
        debug!(id = %connection.id(), "Opened pooled connection");
        state.in_use.push(connection.clone());
        Ok(connection)
    }

    /// Build the minimum number of connections, disposing any already built
    /// if one of them fails.
    fn fill_minimum(&self) -> Result<Vec<Arc<B::Connection>>, Error> {
        let min = self.inner.config.min_pool_size;
        let mut built = Vec::with_capacity(min);
        for _ in 0..min {
            match self.inner.builder.build() {
                Ok(connection) => built.push(Arc::new(connection)),
                Err(e) => {
                    warn!(built = built.len(), min, error = %e, "Initial pool fill failed");
                    for connection in built {
                        connection.dispose();
                    }
                    return Err(e);
                }
            }
        }
        Ok(built)
    }

    /// Return a connection to the pool.
    ///
    /// A connection the pool did not hand out, or one already released, is
    /// disposed instead of adopted.
    pub fn release_connection(&self, connection: Arc<B::Connection>) {
        let mut state = self.inner.state.lock();
        let id = connection.id();
        match state.in_use.iter().position(|c| c.id() == id) {
            Some(index) => {
                let connection = state.in_use.swap_remove(index);
                state.available.push((connection, Instant::now()));
            }
            None => {
                debug!(%id, "Disposing connection not owned by the pool");
                connection.dispose();
            }
        }
    }

    /// Drop every idle connection and re-run eager initialization on the next
    /// [`get_connection`](Self::get_connection). In-use connections stay valid.
    pub fn reinitialize(&self) -> Result<(), Error> {
        let timer = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(Error::Disposed("connection pool".to_string()));
            }
            for (connection, _) in state.available.drain(..) {
                connection.dispose();
            }
            state.in_use.clear();
            state.initialized = false;
            state.timer.take()
        };

        if let Some(timer) = timer {
            timer.stop();
        }
        info!("Connection pool reinitialized");
        Ok(())
    }

    /// Run one scavenge pass now. Returns the number of connections disposed.
    pub fn scavenge(&self) -> usize {
        self.inner.scavenge()
    }

    /// Dispose every connection and stop the scavenger. Idempotent.
    pub fn dispose(&self) {
        let timer = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            for (connection, _) in state.available.drain(..) {
                connection.dispose();
            }
            for connection in state.in_use.drain(..) {
                connection.dispose();
            }
            state.timer.take()
        };

        if let Some(timer) = timer {
            timer.stop();
        }
        info!("Connection pool disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Number of idle connections.
    pub fn available_count(&self) -> usize {
        self.inner.state.lock().available.len()
    }

    /// Number of connections currently handed out.
    pub fn in_use_count(&self) -> usize {
        self.inner.state.lock().in_use.len()
    }
}

impl<B: ConnectionBuilder> Drop for ConnectionPool<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<B: ConnectionBuilder> std::fmt::Debug for ConnectionPool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("available", &state.available.len())
            .field("in_use", &state.in_use.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}
