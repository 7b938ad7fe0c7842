use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wasmtime::{Engine, Module};

use crate::error::{Error, Result};
use crate::worker::instance::Worker;

struct Inner {
    idle: VecDeque<Worker>,
    closed: bool,
}

/// A bounded, growable pool of WASM workers over one compiled module.
///
/// Instantiation is expensive enough to warrant a dedicated blocking context
/// per worker. Idle workers are reused LIFO, new ones are instantiated
/// lazily up to `max`, and callers block on a notification once the pool is
/// at capacity.
pub struct WorkerPool {
    engine: Arc<Engine>,
    module: Arc<Module>,
    min: usize,
    max: usize,
    active_count: AtomicUsize,
    inner: Mutex<Inner>,
    notify: tokio::sync::Notify,
}

/// A worker checked out of the pool. Returned to the idle queue (or closed,
/// if it trapped or the pool shut down in the meantime) when dropped.
pub struct Lease {
    worker: Option<Worker>,
    pool: Arc<WorkerPool>,
}

impl Lease {
    pub fn invoke(&mut self, method: &str, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.worker
            .as_mut()
            .expect("lease always holds a worker until dropped")
            .invoke(method, input)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.release(worker);
        }
    }
}

impl WorkerPool {
    /// Build the pool and warm `min` workers. Warmup failures are fatal: the
    /// caller (the actor's PreStart) must treat a warmup error as a failed
    /// deployment.
    pub async fn start(engine: Arc<Engine>, module: Arc<Module>, min: usize, max: usize) -> Result<Arc<Self>> {
        let max = max.max(1);
        let min = min.min(max);

        let pool = Arc::new(WorkerPool {
            engine,
            module,
            min,
            max,
            active_count: AtomicUsize::new(0),
            inner: Mutex::new(Inner {
                idle: VecDeque::with_capacity(min),
                closed: false,
            }),
            notify: tokio::sync::Notify::new(),
        });

        if min > 0 {
            let warmed = pool.warm(min).await?;
            info!(min, warmed, "worker pool warmed");
        }

        Ok(pool)
    }

    async fn warm(&self, count: usize) -> Result<usize> {
        // Instantiation is CPU-bound; spawn it on rayon's global pool so
        // warmup of several workers overlaps instead of running serially.
        let engine = self.engine.clone();
        let module = self.module.clone();
        let results = tokio::task::spawn_blocking(move || {
            use rayon::prelude::*;
            (0..count)
                .into_par_iter()
                .map(|_| Worker::instantiate(&engine, &module))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| Error::Internal(format!("warmup task panicked: {e}")))?;

        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let mut warmed = 0;
        for result in results {
            match result {
                Ok(worker) => {
                    inner.idle.push_back(worker);
                    warmed += 1;
                }
                Err(e) => {
                    return Err(Error::Internal(format!(
                        "failed to warm worker pool: {e}"
                    )));
                }
            }
        }
        self.active_count.fetch_add(warmed, Ordering::SeqCst);
        Ok(warmed)
    }

    pub fn active_workers(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Acquire a worker, growing the pool if below `max`, else blocking on a
    /// release until `cancel` fires.
    pub async fn acquire(self: &Arc<Self>, cancel: &CancellationToken) -> Result<Lease> {
        loop {
            // Subscribe before inspecting state so a release racing with our
            // check is never lost: `notified()` remembers a permit fired
            // after this call even though we haven't polled it yet.
            let notified = self.notify.notified();

            {
                let mut inner = self.inner.lock().expect("pool mutex poisoned");
                if inner.closed {
                    return Err(Error::Internal("worker pool is shut down".into()));
                }
                if let Some(worker) = inner.idle.pop_back() {
                    return Ok(Lease {
                        worker: Some(worker),
                        pool: self.clone(),
                    });
                }
                if self.active_count.load(Ordering::SeqCst) < self.max {
                    self.active_count.fetch_add(1, Ordering::SeqCst);
                    drop(inner);

                    let engine = self.engine.clone();
                    let module = self.module.clone();
                    let instantiated =
                        tokio::task::spawn_blocking(move || Worker::instantiate(&engine, &module))
                            .await
                            .map_err(|e| Error::Internal(format!("instantiate task panicked: {e}")));

                    return match instantiated {
                        Ok(Ok(worker)) => Ok(Lease {
                            worker: Some(worker),
                            pool: self.clone(),
                        }),
                        Ok(Err(e)) => {
                            self.active_count.fetch_sub(1, Ordering::SeqCst);
                            Err(Error::Execution(format!(
                                "failed to instantiate WASM worker: {e}"
                            )))
                        }
                        Err(e) => {
                            self.active_count.fetch_sub(1, Ordering::SeqCst);
                            Err(e)
                        }
                    };
                }
            }

            tokio::select! {
                () = notified => {}
                () = cancel.cancelled() => return Err(Error::Timeout),
            }
        }
    }

    fn release(&self, worker: Worker) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        if inner.closed || worker.is_closed() {
            drop(inner);
            self.active_count.fetch_sub(1, Ordering::SeqCst);
            if worker.is_closed() {
                debug!("worker closed after a trap, not returned to the pool");
            }
        } else {
            inner.idle.push_back(worker);
        }
        self.notify.notify_one();
    }

    /// Mark the pool closed, drain idle workers, and wait for in-flight
    /// leases to drop (each release path then closes its worker instead of
    /// re-idling it) or for `cancel` to fire first.
    pub async fn shutdown(&self, cancel: &CancellationToken) {
        {
            let mut inner = self.inner.lock().expect("pool mutex poisoned");
            inner.closed = true;
            let drained = inner.idle.len();
            inner.idle.clear();
            self.active_count.fetch_sub(drained, Ordering::SeqCst);
        }
        self.notify.notify_waiters();

        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::select! {
                () = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
                () = cancel.cancelled() => {
                    warn!("worker pool shutdown cancelled with in-flight workers still live");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_module_wat() -> &'static str {
        r#"
        (module
          (memory (export "memory") 1)
          (func (export "allocate") (param i32) (result i32) (i32.const 1024))
          (func (export "deallocate") (param i32 i32))
          (func (export "handle_request") (param i32 i32 i32 i32) (result i64)
            ;; echoes back the input slice unchanged
            (i64.or
              (i64.shl (i64.extend_i32_u (local.get 2)) (i64.const 32))
              (i64.extend_i32_u (local.get 3))))
        )
        "#
    }

    async fn build_pool(min: usize, max: usize) -> Arc<WorkerPool> {
        let engine = Arc::new(Engine::default());
        let module = Arc::new(Module::new(&engine, echo_module_wat()).unwrap());
        WorkerPool::start(engine, module, min, max).await.unwrap()
    }

    #[tokio::test]
    async fn warms_min_workers_at_start() {
        let pool = build_pool(2, 4).await;
        assert_eq!(pool.active_workers(), 2);
    }

    #[tokio::test]
    async fn acquire_grows_up_to_max_then_blocks() {
        let pool = build_pool(0, 1).await;
        let cancel = CancellationToken::new();

        let first = pool.acquire(&cancel).await.unwrap();
        assert_eq!(pool.active_workers(), 1);

        let short_cancel = CancellationToken::new();
        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { pool2.acquire(&short_cancel.clone()).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(first);

        let second = waiter.await.unwrap().unwrap();
        assert_eq!(pool.active_workers(), 1);
        drop(second);
    }

    #[tokio::test]
    async fn acquire_under_cancellation_does_not_instantiate() {
        let pool = build_pool(0, 1).await;
        let cancel = CancellationToken::new();
        let _held = pool.acquire(&cancel).await.unwrap();

        let timeout_cancel = CancellationToken::new();
        timeout_cancel.cancel();
        let err = pool.acquire(&timeout_cancel).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(pool.active_workers(), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_idle_and_waits_for_active_to_reach_zero() {
        let pool = build_pool(2, 2).await;
        let cancel = CancellationToken::new();
        pool.shutdown(&cancel).await;
        assert_eq!(pool.active_workers(), 0);
    }
}
