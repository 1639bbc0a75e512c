// Search SigV4 Proxy Library
// Local HTTP proxy that signs requests for a managed search service

pub mod audit;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod signing;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use proxy::ProxyHandler;
pub use server::ProxyServer;
