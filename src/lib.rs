pub mod config;
pub mod error;
pub mod wire;
pub mod decode;
pub mod session;
pub mod db;
pub mod resolver;
pub mod tx;
pub mod server;
pub mod client;
