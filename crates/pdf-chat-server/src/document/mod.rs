pub mod context;
pub mod parser;

pub use context::DocumentContext;
pub use parser::{DocumentParser, ParsedDocument};
