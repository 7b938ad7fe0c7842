use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span};

use crate::actor::envelope::{HealthCheckResponse, ServiceRequest, ServiceResponse};
use crate::error::Error;
use crate::package::ServicePackage;
use crate::worker::WorkerPool;

const MAILBOX_CAPACITY: usize = 256;

enum Mail {
    Request(ServiceRequest, oneshot::Sender<ServiceResponse>),
    Health(oneshot::Sender<HealthCheckResponse>),
    Shutdown(oneshot::Sender<()>),
}

/// A weak, cloneable reference to a running Service Actor's mailbox. Sending
/// after the actor has shut down fails with `Error::NotFound` rather than
/// panicking — the handle outlives the actor's task only as an inert value.
#[derive(Clone)]
pub struct ActorHandle {
    tx: mpsc::Sender<Mail>,
}

impl ActorHandle {
    pub async fn ask(&self, request: ServiceRequest) -> Result<ServiceResponse, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Mail::Request(request, reply_tx))
            .await
            .map_err(|_| Error::NotFound("service actor is no longer running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Internal("service actor dropped the reply channel".to_string()))
    }

    pub async fn health(&self) -> Result<HealthCheckResponse, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Mail::Health(reply_tx))
            .await
            .map_err(|_| Error::NotFound("service actor is no longer running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Internal("service actor dropped the reply channel".to_string()))
    }

    /// PostStop: ask the actor to drain its pool and stop. Waits for the
    /// actor to confirm before returning.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Mail::Shutdown(reply_tx)).await.is_err() {
            return Ok(());
        }
        let _ = reply_rx.await;
        Ok(())
    }
}

/// Single-threaded-by-construction Service Actor: one dedicated task reads
/// its mailbox sequentially, so no two messages are ever handled
/// concurrently. Concurrency comes from deploying many actors, not from
/// parallelizing one.
struct ServiceActor {
    package: Arc<ServicePackage>,
    pool: Arc<WorkerPool>,
    ready: bool,
}

/// PreStart: build the worker pool from the package's compiled module and
/// warm it. Spawns the actor's task only once warmup succeeds; the caller
/// (the registry) surfaces a PreStart failure as a failed deployment.
pub async fn spawn(package: Arc<ServicePackage>, pool_min: usize, pool_max: usize) -> Result<ActorHandle, Error> {
    let pool = WorkerPool::start(package.engine.clone(), package.module.clone(), pool_min, pool_max)
        .await
        .map_err(|e| Error::Internal(format!("worker pool warmup failed: {e}")))?;

    let mut actor = ServiceActor {
        package,
        pool,
        ready: true,
    };

    let (tx, mut rx) = mpsc::channel::<Mail>(MAILBOX_CAPACITY);
    let service_id = actor.package.service_id.clone();

    tokio::spawn(async move {
        info!(service_id = %service_id, host = crate::config::HOSTNAME.as_str(), "service actor started");
        while let Some(mail) = rx.recv().await {
            match mail {
                Mail::Request(req, reply) => {
                    let span = info_span!("service_request", service_id = %service_id, method = %req.method);
                    let _enter = span.enter();
                    let response = actor.handle_request(req).await;
                    if reply.send(response).is_err() {
                        debug!(service_id = %service_id, "caller dropped before reply was sent");
                    }
                }
                Mail::Health(reply) => {
                    let _ = reply.send(HealthCheckResponse { ready: actor.ready });
                }
                Mail::Shutdown(reply) => {
                    actor.post_stop().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
        info!(service_id = %service_id, "service actor stopped");
    });

    Ok(ActorHandle { tx })
}

impl ServiceActor {
    async fn post_stop(&mut self) {
        let cancel = CancellationToken::new();
        self.pool.shutdown(&cancel).await;
        self.ready = false;
    }

    /// Check readiness, validate, invoke, build the response. Never returns
    /// an `Err` to the caller — every failure is encoded into the
    /// `ServiceResponse`.
    async fn handle_request(&self, request: ServiceRequest) -> ServiceResponse {
        let started = Instant::now();
        let id = request.id.clone();

        if !self.ready {
            return ServiceResponse::err(id, &Error::Internal("service actor is not ready".to_string()), started.elapsed());
        }
        if let Err(e) = self.validate(&request) {
            return ServiceResponse::err(id, &e, started.elapsed());
        }

        match self.invoke(&request).await {
            Ok(output) => ServiceResponse::ok(id, output, started.elapsed()),
            Err(e) => ServiceResponse::err(id, &e, started.elapsed()),
        }
    }

    fn validate(&self, request: &ServiceRequest) -> Result<(), Error> {
        if request.method.is_empty() {
            return Err(Error::Validation(request.method.clone(), "method name is empty".to_string()));
        }
        let descriptor = self
            .package
            .method(&request.method)
            .ok_or_else(|| Error::Validation(request.method.clone(), "method not found".to_string()))?;
        if !descriptor.input_type_name.is_empty() && request.input.is_empty() {
            return Err(Error::Validation(
                request.method.clone(),
                "method requires an input but none was provided".to_string(),
            ));
        }
        Ok(())
    }

    async fn invoke(&self, request: &ServiceRequest) -> Result<Vec<u8>, Error> {
        let cancel = CancellationToken::new();
        let pool = self.pool.clone();
        let method = request.method.clone();
        let input = request.input.clone();

        let acquire = tokio::time::timeout(request.timeout, pool.acquire(&cancel));
        let lease = match acquire.await {
            Ok(Ok(lease)) => lease,
            Ok(Err(e)) => return Err(Error::Execution(e.to_string())),
            Err(_) => return Err(Error::Timeout),
        };

        // WASM execution is CPU-bound; run it on the blocking pool so a slow
        // guest call never stalls the actor's async task.
        let call = tokio::task::spawn_blocking(move || {
            let mut lease = lease;
            lease.invoke(&method, &input)
        });
        match tokio::time::timeout(request.timeout, call).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(Error::Execution(e.to_string())),
            Ok(Err(e)) => Err(Error::Internal(format!("worker invoke task panicked: {e}"))),
            Err(_) => Err(Error::Timeout),
        }
    }
}
