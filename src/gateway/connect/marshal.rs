use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};

use crate::error::Error;
use crate::gateway::connect::content::ContentKind;

pub fn unmarshal(descriptor: &MessageDescriptor, bytes: &[u8], content: ContentKind) -> Result<DynamicMessage, Error> {
    match content {
        ContentKind::Json => {
            let mut de = serde_json::Deserializer::from_slice(bytes);
            DynamicMessage::deserialize(descriptor.clone(), &mut de).map_err(|e| Error::Parse(e.to_string()))
        }
        ContentKind::Proto => {
            DynamicMessage::decode(descriptor.clone(), bytes).map_err(|e| Error::Parse(e.to_string()))
        }
    }
}

pub fn marshal(message: &DynamicMessage, content: ContentKind) -> Result<Vec<u8>, Error> {
    match content {
        ContentKind::Json => serde_json::to_vec(message).map_err(|e| Error::Internal(e.to_string())),
        ContentKind::Proto => Ok(message.encode_to_vec()),
    }
}

/// Re-marshal a dynamic message built from the wire body into the canonical
/// JSON carried as `ServiceRequest.input`.
pub fn to_canonical_json(message: &DynamicMessage) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(message).map_err(|e| Error::Internal(e.to_string()))
}
