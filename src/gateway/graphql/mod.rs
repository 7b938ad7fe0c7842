pub mod handler;
pub mod schema_builder;

pub use handler::GraphQlGateway;
