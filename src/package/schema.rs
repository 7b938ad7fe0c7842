use serde::Deserialize;

fn default_version() -> String {
    "v1".to_string()
}

/// Parsed `service.description.json`: the schema a deployed package
/// declares. Namespace and version feed the Service Id; services/types/enums
/// feed both gateways.
#[derive(Deserialize, Debug, Clone)]
pub struct PackageSchema {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub services: Vec<ServiceSchema>,
    #[serde(default)]
    pub types: Vec<ObjectTypeSchema>,
    #[serde(default)]
    pub enums: Vec<EnumTypeSchema>,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServiceSchema {
    pub name: String,
    pub methods: Vec<MethodSchema>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MethodSchema {
    pub name: String,
    #[serde(default, rename = "inputType")]
    pub input_type: Option<String>,
    #[serde(rename = "outputType")]
    pub output_type: String,
    #[serde(default)]
    pub directives: Vec<String>,
}

/// `{name, inputTypeName, outputTypeName, directives}` per the data model —
/// the flattened, lookup-friendly projection of a `MethodSchema` used by the
/// Service Actor's method map.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub input_type_name: String,
    pub output_type_name: String,
    pub directives: Vec<String>,
}

impl From<&MethodSchema> for MethodDescriptor {
    fn from(m: &MethodSchema) -> Self {
        MethodDescriptor {
            name: m.name.clone(),
            input_type_name: m.input_type.clone().unwrap_or_default(),
            output_type_name: m.output_type.clone(),
            directives: m.directives.clone(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ObjectTypeSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub list: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EnumTypeSchema {
    pub name: String,
    pub values: Vec<String>,
}

impl PackageSchema {
    pub fn first_service(&self) -> Option<&ServiceSchema> {
        self.services.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_schema() {
        let raw = r#"{
            "namespace": "test",
            "version": "v1",
            "services": [
                {
                    "name": "Service",
                    "methods": [
                        {"name": "greet", "inputType": "GreetRequest", "outputType": "GreetResponse"}
                    ]
                }
            ]
        }"#;
        let schema: PackageSchema = serde_json::from_str(raw).unwrap();
        assert_eq!(schema.namespace, "test");
        assert_eq!(schema.services.len(), 1);
        assert_eq!(schema.services[0].methods[0].name, "greet");
    }

    #[test]
    fn defaults_namespace_and_version_when_absent() {
        let raw = r#"{"services": [{"name": "Service", "methods": []}]}"#;
        let schema: PackageSchema = serde_json::from_str(raw).unwrap();
        assert_eq!(schema.namespace, "default");
        assert_eq!(schema.version, "v1");
    }

    #[test]
    fn method_with_no_input_type_has_empty_name() {
        let method = MethodSchema {
            name: "ping".to_string(),
            input_type: None,
            output_type: "PingResponse".to_string(),
            directives: vec![],
        };
        let descriptor = MethodDescriptor::from(&method);
        assert_eq!(descriptor.input_type_name, "");
    }
}
