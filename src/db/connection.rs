use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Request {
    Run(Job),
    Close,
}

/// Owning side of the connection thread. Dropping the last handle closes it.
struct Worker {
    requests: mpsc::Sender<Request>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let thread = match self.thread.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(thread) = thread else {
            return;
        };

        if self.requests.send(Request::Close).is_err() {
            debug!("state DB thread already gone at shutdown");
        }
        if thread.join().is_err() {
            error!("state DB thread panicked");
        }
    }
}

/// Handle to the SQLite file holding the supervisor's checkpoint.
///
/// One dedicated thread owns the connection; async callers hand it closures
/// and await the reply, so the runtime never blocks on disk IO.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let (requests, inbox) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("supervisor-db".into())
            .spawn(move || match open(&thread_path) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        serve(conn, inbox);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn state DB thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("state DB thread exited during startup"))??;

        info!("State database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                requests,
                thread: Mutex::new(Some(thread)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `task` on the connection thread and wait for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // The caller may have been cancelled while the job was queued.
            let _ = reply.send(task(conn));
        });

        self.worker
            .requests
            .send(Request::Run(job))
            .map_err(|_| anyhow!("state DB thread is no longer running"))?;

        response
            .await
            .map_err(|_| anyhow!("state DB thread dropped the request"))?
    }
}

fn open(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    run_migrations(&mut conn).context("failed to migrate state database")?;
    Ok(conn)
}

fn serve(mut conn: Connection, inbox: mpsc::Receiver<Request>) {
    for request in inbox {
        match request {
            Request::Run(job) => job(&mut conn),
            Request::Close => break,
        }
    }
    info!("State database thread shutting down");
}
