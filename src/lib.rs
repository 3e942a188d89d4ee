pub mod capture;
pub mod config;
pub mod error;
pub mod http_server;
pub mod normalize;
pub mod registry;
pub mod replay;
pub mod store;
pub mod stream;
pub mod types;
