mod actor;
mod enums;
mod parser;
mod transitions;
mod utf8;

pub use actor::Actor;
pub use enums::State;
pub use parser::Parser;
pub use utf8::Utf8Decoder;
