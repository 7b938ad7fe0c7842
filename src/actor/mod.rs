pub mod envelope;
pub mod registry;
pub mod service_actor;

pub use envelope::{HealthCheckResponse, ServiceErrorDetail, ServiceRequest, ServiceResponse};
pub use registry::ActorRegistry;
pub use service_actor::ActorHandle;
