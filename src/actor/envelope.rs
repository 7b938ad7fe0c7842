use std::collections::HashMap;
use std::time::Duration;

/// Internal envelope between a gateway and a Service Actor. One per client
/// request; never retained past the ask.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub id: String,
    pub method: String,
    /// Canonical JSON, regardless of the wire format the client used.
    pub input: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub timeout: Duration,
}

impl ServiceRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, input: Vec<u8>, timeout: Duration) -> Self {
        ServiceRequest {
            id: id.into(),
            method: method.into(),
            input,
            metadata: HashMap::new(),
            timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub id: String,
    pub success: bool,
    pub output: Vec<u8>,
    pub error: Option<ServiceErrorDetail>,
    pub metadata: HashMap<String, String>,
    pub duration: Duration,
}

impl ServiceResponse {
    pub fn ok(id: impl Into<String>, output: Vec<u8>, duration: Duration) -> Self {
        ServiceResponse {
            id: id.into(),
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
            duration,
        }
    }

    pub fn err(id: impl Into<String>, error: &crate::error::Error, duration: Duration) -> Self {
        let details = match error {
            crate::error::Error::Validation(field, _) => Some(field.clone()),
            _ => None,
        };
        ServiceResponse {
            id: id.into(),
            success: false,
            output: Vec::new(),
            error: Some(ServiceErrorDetail {
                code: error.kind().to_string(),
                message: error.to_string(),
                details,
            }),
            metadata: HashMap::new(),
            duration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthCheckResponse {
    pub ready: bool,
}
