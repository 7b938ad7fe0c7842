use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::actor::service_actor::{self, ActorHandle};
use crate::error::{Error, Result};
use crate::package::{ServiceId, ServicePackage};

/// Owns the actor system: every deployed Service Package has exactly one
/// Service Actor, keyed by its Service Id. `deploy`/`undeploy` are the only
/// writers; lookups take a read lock.
pub struct ActorRegistry {
    worker_pool_min: usize,
    worker_pool_max: usize,
    actors: RwLock<HashMap<ServiceId, ActorHandle>>,
}

impl ActorRegistry {
    pub fn new(worker_pool_min: usize, worker_pool_max: usize) -> Arc<Self> {
        Arc::new(ActorRegistry {
            worker_pool_min,
            worker_pool_max,
            actors: RwLock::new(HashMap::new()),
        })
    }

    pub async fn is_deployed(&self, service_id: &ServiceId) -> bool {
        self.actors.read().await.contains_key(service_id)
    }

    pub async fn get_actor_handle(&self, service_id: &ServiceId) -> Option<ActorHandle> {
        self.actors.read().await.get(service_id).cloned()
    }

    /// Polls every deployed actor's readiness and reports which, if any,
    /// are not ready. A dead mailbox (the actor's task already gone) counts
    /// as not ready rather than failing the whole check.
    pub async fn not_ready_services(&self) -> Vec<ServiceId> {
        let actors: Vec<(ServiceId, ActorHandle)> = {
            let actors = self.actors.read().await;
            actors.iter().map(|(id, handle)| (id.clone(), handle.clone())).collect()
        };

        let mut not_ready = Vec::new();
        for (service_id, handle) in actors {
            match handle.health().await {
                Ok(response) if response.ready => {}
                _ => not_ready.push(service_id),
            }
        }
        not_ready
    }

    /// Computes the Service Id from the package's schema metadata, rejects a
    /// duplicate deployment, runs PreStart (pool warmup), and records the
    /// handle only once the actor is ready.
    pub async fn deploy(&self, package: Arc<ServicePackage>) -> Result<ServiceId> {
        let service_id = package.service_id.clone();

        if self.is_deployed(&service_id).await {
            return Err(Error::Validation(
                service_id.to_string(),
                "a service with this id is already deployed".to_string(),
            ));
        }

        let handle = service_actor::spawn(package, self.worker_pool_min, self.worker_pool_max).await?;

        let mut actors = self.actors.write().await;
        if actors.contains_key(&service_id) {
            handle.shutdown().await.ok();
            return Err(Error::Validation(
                service_id.to_string(),
                "a service with this id is already deployed".to_string(),
            ));
        }
        actors.insert(service_id.clone(), handle);
        info!(service_id = %service_id, "service deployed");
        Ok(service_id)
    }

    pub async fn undeploy(&self, service_id: &ServiceId) -> Result<()> {
        let handle = {
            let mut actors = self.actors.write().await;
            actors.remove(service_id)
        };
        match handle {
            Some(handle) => {
                handle.shutdown().await?;
                info!(service_id = %service_id, "service undeployed");
                Ok(())
            }
            None => Err(Error::NotFound(format!("no service deployed with id {service_id}"))),
        }
    }

    /// Stops every actor best-effort: attempts all of them even if one
    /// fails, and surfaces the first error encountered.
    pub async fn shutdown(&self) -> Result<()> {
        let handles: Vec<(ServiceId, ActorHandle)> = {
            let mut actors = self.actors.write().await;
            actors.drain().collect()
        };

        let mut first_error = None;
        for (service_id, handle) in handles {
            if let Err(e) = handle.shutdown().await {
                warn!(service_id = %service_id, error = %e, "error shutting down service actor");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            } else {
                info!(service_id = %service_id, "service actor stopped during runtime shutdown");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
