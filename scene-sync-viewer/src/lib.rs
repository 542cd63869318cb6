pub mod config;
pub mod engine;
pub mod protocol;
pub mod rpc;
pub mod sync;
