use crate::net::NetError;
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
/// Grace period granted to the accept loop when asked to shut down.
pub const SERVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct AcceptLoopState {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl AcceptLoopState {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn mark_stopped(&self) {
        *self.done.lock() = true;
        self.condvar.notify_all();
    }

    fn wait_for_stop(&self, timeout: Duration, name: &'static str) -> Result<(), NetError> {
        let started = Instant::now();
        let mut done = self.done.lock();
        if !*done {
            self.condvar.wait_for(&mut done, timeout);
        }
        if *done {
            Ok(())
        } else {
            Err(NetError::ShutdownTimeout {
                context: name,
                waited_ms: started.elapsed().as_millis(),
            })
        }
    }
}

struct TrackedConnection {
    handle: thread::JoinHandle<()>,
    /// Second handle on the socket so shutdown can unblock a pending read.
    stream: Option<TcpStream>,
}

#[derive(Default)]
struct ConnectionTracker {
    connections: Mutex<Vec<TrackedConnection>>,
}

impl ConnectionTracker {
    fn track(&self, handle: thread::JoinHandle<()>, stream: Option<TcpStream>) {
        let mut connections = self.connections.lock();
        connections.retain(|connection| !connection.handle.is_finished());
        connections.push(TrackedConnection { handle, stream });
    }

    fn active(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|connection| !connection.handle.is_finished())
            .count()
    }

    fn close_and_join(&self, name: &'static str) {
        let connections: Vec<_> = self.connections.lock().drain(..).collect();
        for connection in connections {
            if let Some(stream) = &connection.stream {
                let _ = stream.shutdown(Shutdown::Both);
            }
            if connection.handle.join().is_err() {
                warn!("event={name}_connection_panic");
            }
        }
    }
}

struct ConnectionLimiter {
    active: AtomicUsize,
    limit: usize,
}

impl ConnectionLimiter {
    fn new(limit: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            limit,
        }
    }

    fn try_acquire(&self) -> bool {
        loop {
            let value = self.active.load(Ordering::Relaxed);
            if value >= self.limit {
                return false;
            }
            if self
                .active
                .compare_exchange(value, value + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::Release);
    }
}

struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
}

impl ConnectionPermit {
    fn new(limiter: Arc<ConnectionLimiter>) -> Option<Self> {
        if limiter.try_acquire() {
            Some(Self { limiter })
        } else {
            None
        }
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

/// Owns a running accept loop; dropping it shuts the listener down.
pub struct ServerHandle {
    name: &'static str,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
    connections: Arc<ConnectionTracker>,
    state: Arc<AcceptLoopState>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connection threads that have not finished yet.
    pub fn active_connections(&self) -> usize {
        self.connections.active()
    }

    /// Stops accepting, closes every open connection and joins its thread.
    pub fn try_shutdown(&mut self, timeout: Duration) -> Result<(), NetError> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join.take() {
            self.state.wait_for_stop(timeout, self.name)?;
            if handle.join().is_err() {
                warn!("event=server_accept_loop_panic name={}", self.name);
                return Err(NetError::ThreadPanicked { context: self.name });
            }
            info!("event={}_stopped addr={}", self.name, self.local_addr);
        }
        self.connections.close_and_join(self.name);
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(err) = self.try_shutdown(SERVER_SHUTDOWN_GRACE) {
            warn!("event={}_shutdown_failed error={err}", self.name);
        }
    }
}

/// Runs `handler` on its own thread for every accepted connection.
///
/// The handler receives the shutdown flag; long-running handlers should
/// return once it is set. Connections over `max_connections` are closed
/// immediately.
pub fn spawn_listener<F>(
    name: &'static str,
    listener: TcpListener,
    max_connections: Option<usize>,
    handler: F,
) -> io::Result<ServerHandle>
where
    F: Fn(TcpStream, SocketAddr, Arc<AtomicBool>) -> Result<(), NetError> + Send + Sync + 'static,
{
    let local_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let tracker = Arc::new(ConnectionTracker::default());
    let handler = Arc::new(handler);
    let limiter = max_connections.map(|limit| (limit, Arc::new(ConnectionLimiter::new(limit))));
    let shutdown_flag = shutdown.clone();
    let accept_tracker = tracker.clone();
    let state = Arc::new(AcceptLoopState::new());
    let accept_state = state.clone();
    let join = thread::Builder::new()
        .name(format!("{name}-accept"))
        .spawn(move || {
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    break;
                }
                match listener.accept() {
                    Ok((stream, addr)) => {
                        let permit = match limiter.as_ref() {
                            Some((limit, limiter)) => match ConnectionPermit::new(limiter.clone()) {
                                Some(permit) => Some(permit),
                                None => {
                                    warn!(
                                        "event={}_connection_rejected addr={} reason=too_many_connections limit={}",
                                        name, addr, limit
                                    );
                                    continue;
                                }
                            },
                            None => None,
                        };
                        if let Err(err) = stream.set_nonblocking(false) {
                            warn!("event={}_connection_setup_failed addr={} error={err}", name, addr);
                            continue;
                        }
                        debug!("event={}_connection_accepted addr={}", name, addr);
                        let peer = stream.try_clone().ok();
                        let handler = handler.clone();
                        let shutdown_token = shutdown_flag.clone();
                        let connection = thread::spawn(move || {
                            let _permit = permit;
                            if let Err(err) = handler(stream, addr, shutdown_token) {
                                warn!("event={}_connection_error addr={} error={err}", name, addr);
                            }
                        });
                        accept_tracker.track(connection, peer);
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(ACCEPT_BACKOFF);
                    }
                    Err(err) => {
                        error!("event={}_accept_error error={err}", name);
                        break;
                    }
                }
            }
            accept_state.mark_stopped();
        })?;
    info!("event={}_listening addr={}", name, local_addr);
    Ok(ServerHandle {
        name,
        local_addr,
        shutdown,
        join: Some(join),
        connections: tracker,
        state,
    })
}
