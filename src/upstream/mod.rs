//! # Upstream Access
//!
//! Everything that leaves the process towards the taxonomy API goes through
//! [`FetchGateway`], which sits on top of a swappable [`Transport`].

pub mod gateway;
pub mod transport;

pub use gateway::FetchGateway;
pub use transport::{ReqwestTransport, Transport, TransportResponse};
