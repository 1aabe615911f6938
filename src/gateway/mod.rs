// Process wiring and HTTP serving
pub mod server;

pub use server::ProxyServer;
