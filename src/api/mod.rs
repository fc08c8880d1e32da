pub mod metrics_routes;
pub mod server;

pub use server::*;
