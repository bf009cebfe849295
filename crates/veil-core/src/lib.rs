pub mod config;
pub mod logging;

pub mod cache;
pub mod codec;
pub mod dispatch;
pub mod fetch;
pub mod headers;
pub mod proxy;
pub mod rewrite;
pub mod shim;
