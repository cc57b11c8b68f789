mod error;
mod grammar;
mod parser;

pub use error::ParseError;
pub use parser::{DEFAULT_PACKAGE, ParsedProgram};

/// Parse rule text into a [`ParsedProgram`].
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not valid rule syntax.
pub fn parse(input: &str) -> Result<ParsedProgram, ParseError> {
    use winnow::Parser;
    grammar::parse_program
        .parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}
