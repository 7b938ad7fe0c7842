pub mod loader;
pub mod schema;
pub mod source;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use wasmtime::{Engine, Module};

use crate::package::schema::{MethodDescriptor, PackageSchema};

/// `namespace.ServiceName.version`, the unique handle for a deployment —
/// used as both the actor registry key and the admin API's deployment id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    pub namespace: String,
    pub service_name: String,
    pub version: String,
}

impl ServiceId {
    pub fn new(namespace: impl Into<String>, service_name: impl Into<String>, version: impl Into<String>) -> Self {
        ServiceId {
            namespace: namespace.into(),
            service_name: service_name.into(),
            version: version.into(),
        }
    }

    pub fn from_schema(schema: &PackageSchema) -> anyhow::Result<Self> {
        let service = schema
            .first_service()
            .ok_or_else(|| anyhow::anyhow!("package schema declares no services"))?;
        Ok(ServiceId::new(
            schema.namespace.clone(),
            service.name.clone(),
            schema.version.clone(),
        ))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.namespace, self.service_name, self.version)
    }
}

/// Parsed `okra.json`.
#[derive(Deserialize, Debug, Clone)]
pub struct PackageConfig {
    pub name: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// The immutable, deployable bundle: compiled module + parsed schema +
/// config + method lookup + (optionally) a protobuf descriptor set enabling
/// Connect exposure. Constructed once by the loader and shared (via `Arc`)
/// between the actor and both gateways for the deployment's lifetime.
pub struct ServicePackage {
    pub engine: Arc<Engine>,
    pub module: Arc<Module>,
    pub schema: PackageSchema,
    pub config: PackageConfig,
    pub methods: HashMap<String, MethodDescriptor>,
    pub descriptor_set: Option<prost_reflect::DescriptorPool>,
    pub service_id: ServiceId,
}

impl ServicePackage {
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn service_name(&self) -> anyhow::Result<&str> {
        self.schema
            .first_service()
            .map(|s| s.name.as_str())
            .ok_or_else(|| anyhow::anyhow!("package schema declares no services"))
    }
}

fn build_method_map(schema: &PackageSchema) -> HashMap<String, MethodDescriptor> {
    schema
        .services
        .iter()
        .flat_map(|s| s.methods.iter())
        .map(|m| (m.name.clone(), MethodDescriptor::from(m)))
        .collect()
}

impl ServicePackage {
    pub fn assemble(
        engine: Arc<Engine>,
        module: Module,
        schema: PackageSchema,
        config: PackageConfig,
        descriptor_set: Option<prost_reflect::DescriptorPool>,
    ) -> anyhow::Result<Self> {
        let service_id = ServiceId::from_schema(&schema)?;
        let methods = build_method_map(&schema);
        Ok(ServicePackage {
            engine,
            module: Arc::new(module),
            schema,
            config,
            methods,
            descriptor_set,
            service_id,
        })
    }
}
