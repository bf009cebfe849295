//! CLI command handlers, one file per command.

mod decode;
mod encode;
mod rewrite;
mod serve;
mod shim;

pub use decode::run_decode;
pub use encode::run_encode;
pub use rewrite::run_rewrite;
pub use serve::run_serve;
pub use shim::run_shim;
