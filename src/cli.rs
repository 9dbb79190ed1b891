//! CLI domain: parse, route and output only.
//! Commands build a runtime from configuration and report what it would request.

mod output;
mod parse;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use route::RunContext;
