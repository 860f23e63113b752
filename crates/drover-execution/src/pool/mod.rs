mod core;
mod options;

use std::sync::Arc;

use log::debug;
pub use options::WorkerPoolOptions;
use tokio::sync::Mutex;

use crate::id::WorkerId;
use crate::worker::WorkerClient;

struct WorkerHandle {
    client: WorkerClient,
    leased: bool,
}

/// A pool of connected workers handed out under exclusive leases.
///
/// Handles stay in declaration order and the first free live handle wins.
/// A handle that fails its probe is dropped from the pool for good.
pub struct WorkerPool {
    options: WorkerPoolOptions,
    handles: Arc<Mutex<Vec<WorkerHandle>>>,
}

fn clear_lease(handles: &mut [WorkerHandle], id: WorkerId) {
    if let Some(handle) = handles.iter_mut().find(|x| x.client.id() == id) {
        handle.leased = false;
        debug!("released worker {id}");
    }
}

/// An exclusive lease on a worker handle.
///
/// The lease is given back by [`Lease::release`], or on drop when the
/// leasing future is cancelled or panics.
struct Lease {
    handles: Arc<Mutex<Vec<WorkerHandle>>>,
    client: WorkerClient,
    released: bool,
}

impl Lease {
    fn new(handles: Arc<Mutex<Vec<WorkerHandle>>>, client: WorkerClient) -> Self {
        Self {
            handles,
            client,
            released: false,
        }
    }

    fn client(&self) -> WorkerClient {
        self.client.clone()
    }

    async fn release(mut self) {
        clear_lease(&mut self.handles.lock().await, self.client.id());
        self.released = true;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let id = self.client.id();
        if let Ok(mut handles) = self.handles.try_lock() {
            clear_lease(&mut handles, id);
        } else if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let handles = Arc::clone(&self.handles);
            runtime.spawn(async move {
                clear_lease(&mut handles.lock().await, id);
            });
        }
    }
}
