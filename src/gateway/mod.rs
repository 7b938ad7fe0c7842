pub mod connect;
pub mod graphql;

pub use connect::ConnectGateway;
pub use graphql::GraphQlGateway;
