use std::collections::HashMap;
use std::time::Duration;

use async_graphql::dynamic::{
    Enum as DynEnum, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, Schema, TypeRef,
};
use async_graphql::{Name, Value as GqlValue};
use uuid::Uuid;

use crate::actor::{ActorHandle, ServiceRequest};
use crate::package::schema::{EnumTypeSchema, FieldSchema, MethodDescriptor, ObjectTypeSchema};

const QUERY_PREFIXES: &[&str] = &["get", "list", "find", "search", "query", "fetch", "read"];

/// A method surfaced on the namespace's root, bound to the actor that will
/// serve it.
#[derive(Clone)]
pub struct MethodBinding {
    pub method: MethodDescriptor,
    pub actor: ActorHandle,
}

/// Map an OKRA schema scalar/reference name onto its GraphQL counterpart.
/// `Long`/`Double` fold onto `Int`/`Float`; `Time`/`DateTime`/`Timestamp`
/// fold onto `String`; anything else passes through as a reference to a
/// generated type.
fn graphql_scalar_name(okra_type: &str) -> String {
    match okra_type {
        "String" | "Int" | "Boolean" | "ID" | "Float" => okra_type.to_string(),
        "Long" => "Int".to_string(),
        "Double" => "Float".to_string(),
        "Time" | "DateTime" | "Timestamp" => "String".to_string(),
        other => other.to_string(),
    }
}

fn field_type_ref(field: &FieldSchema) -> TypeRef {
    let base = graphql_scalar_name(&field.type_name);
    let named = if field.required {
        TypeRef::named_nn(base)
    } else {
        TypeRef::named(base)
    };
    if field.list {
        TypeRef::List(Box::new(named))
    } else {
        named
    }
}

fn is_query_method(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    QUERY_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Resolver shared by every generated `type` (not `input`) field: projects
/// the JSON object produced by a prior actor call onto the requested
/// subfield, rather than re-dispatching to the service.
fn object_field_resolver(field_name: String) -> impl Fn(async_graphql::dynamic::ResolverContext) -> FieldFuture<'static> + Send + Sync + 'static {
    move |ctx| {
        let field_name = field_name.clone();
        FieldFuture::new(async move {
            let parent = ctx
                .parent_value
                .as_value()
                .ok_or_else(|| async_graphql::Error::new("expected a projectable object value"))?;
            match parent {
                GqlValue::Object(map) => Ok(map.get(&Name::new(&field_name)).cloned().map(FieldValue::value)),
                _ => Ok(None),
            }
        })
    }
}

/// Builds the per-namespace GraphQL document: scalars are implicit in
/// async-graphql's dynamic schema, enums/objects/inputs are generated from
/// the accumulated package schemas, and each method becomes a `Query` or
/// `Mutation` field bound to the actor that owns it. Introspection
/// (`__schema`, `__type`, `__typename`) is provided by the dynamic `Schema`
/// type itself, so no introspection types are hand-authored here.
pub fn build_schema(
    types: &[ObjectTypeSchema],
    enums: &[EnumTypeSchema],
    methods: &HashMap<String, MethodBinding>,
) -> anyhow::Result<Schema> {
    let mut schema_builder = Schema::build("Query", Some("Mutation"), None);

    for enum_schema in enums {
        let mut gql_enum = DynEnum::new(enum_schema.name.clone());
        for value in &enum_schema.values {
            gql_enum = gql_enum.item(value.clone());
        }
        schema_builder = schema_builder.register(gql_enum);
    }

    for object_schema in types {
        if object_schema.name.ends_with("Request") || object_schema.name.ends_with("Input") {
            let mut input = InputObject::new(input_type_name(&object_schema.name));
            for field in &object_schema.fields {
                input = input.field(InputValue::new(field.name.clone(), field_type_ref(field)));
            }
            schema_builder = schema_builder.register(input);
        } else {
            let mut object = Object::new(object_schema.name.clone());
            for field in &object_schema.fields {
                let type_ref = field_type_ref(field);
                object = object.field(Field::new(field.name.clone(), type_ref, object_field_resolver(field.name.clone())));
            }
            schema_builder = schema_builder.register(object);
        }
    }

    let mut query = Object::new("Query");
    let mut mutation = Object::new("Mutation");
    let mut query_has_fields = false;
    let mut mutation_has_fields = false;

    for (name, binding) in methods {
        let field = build_method_field(name.clone(), binding.clone());
        if is_query_method(name) {
            query = query.field(field);
            query_has_fields = true;
        } else {
            mutation = mutation.field(field);
            mutation_has_fields = true;
        }
    }

    if !query_has_fields {
        query = query.field(empty_field());
    }
    if !mutation_has_fields {
        mutation = mutation.field(empty_field());
    }

    schema_builder = schema_builder.register(query).register(mutation);
    Ok(schema_builder.finish()?)
}

fn input_type_name(name: &str) -> String {
    if name.ends_with("Input") {
        name.to_string()
    } else {
        format!("{name}Input")
    }
}

fn empty_field() -> Field {
    Field::new("_empty", TypeRef::named(TypeRef::STRING), |_ctx| {
        FieldFuture::new(async move { Ok(None::<FieldValue>) })
    })
}

fn build_method_field(name: String, binding: MethodBinding) -> Field {
    let output_type = graphql_scalar_name(&binding.method.output_type_name);
    let has_input = !binding.method.input_type_name.is_empty();
    let input_type = input_type_name(&binding.method.input_type_name);

    let mut field = Field::new(name.clone(), TypeRef::named(output_type), move |ctx| {
        let name = name.clone();
        let binding = binding.clone();
        FieldFuture::new(async move {
            let input_json = if has_input {
                let arg = ctx.args.try_get("input")?;
                arg.deserialize::<serde_json::Value>()?
            } else {
                serde_json::Value::Object(Default::default())
            };
            let input_bytes = serde_json::to_vec(&input_json).map_err(|e| async_graphql::Error::new(e.to_string()))?;

            let request = ServiceRequest::new(Uuid::new_v4().to_string(), name.clone(), input_bytes, Duration::from_secs(30));
            let response = binding
                .actor
                .ask(request)
                .await
                .map_err(|e| async_graphql::Error::new(e.to_string()))?;

            if !response.success {
                let message = response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "service call failed".to_string());
                return Err(async_graphql::Error::new(message));
            }

            let output_json: serde_json::Value =
                serde_json::from_slice(&response.output).map_err(|e| async_graphql::Error::new(e.to_string()))?;
            let value = GqlValue::from_json(output_json).map_err(|e| async_graphql::Error::new(e.to_string()))?;
            Ok(Some(FieldValue::value(value)))
        })
    });

    if has_input {
        field = field.argument(InputValue::new("input", TypeRef::named_nn(input_type)));
    }

    field
}
