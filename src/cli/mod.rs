pub mod commands;
pub mod util;

pub use util::{build_engine, require_initialized};
