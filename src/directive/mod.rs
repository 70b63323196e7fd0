//! Text directives and their interpreter

pub mod interpreter;
pub mod parser;


pub use interpreter::{Applied, Interpreter, Outcome};
pub use parser::{guidance, Directive, USAGE};
