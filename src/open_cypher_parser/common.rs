use nom::{
    bytes::complete::take_while1,
    character::complete::multispace0,
    error::ParseError,
    sequence::delimited,
    IResult, Parser,
};

use super::errors::OpenCypherParsingError;

/// Whitespace-handling combinator.
pub fn ws<'a, O, E: ParseError<&'a str>, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Parse a symbolic name: `n`, `Person`, `since_year`.
pub fn parse_identifier(input: &str) -> IResult<&str, &str, OpenCypherParsingError<'_>> {
    let (rest, ident) = take_while1(is_identifier_char).parse(input)?;
    if !ident.chars().next().is_some_and(is_identifier_start) {
        return Err(nom::Err::Error(OpenCypherParsingError::new(
            input,
            "expected an identifier",
        )));
    }
    Ok((rest, ident))
}

/// True when `input` starts with the given keyword (case-insensitive) and
/// the keyword is not a prefix of a longer identifier.
pub fn starts_with_keyword(input: &str, keyword: &str) -> bool {
    let input = input.trim_start();
    if input.len() < keyword.len() {
        return false;
    }
    let (head, tail) = input.split_at(keyword.len());
    head.eq_ignore_ascii_case(keyword) && !tail.chars().next().is_some_and(is_identifier_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifier() {
        assert_eq!(parse_identifier("abc rest"), Ok((" rest", "abc")));
        assert_eq!(parse_identifier("a_1)"), Ok((")", "a_1")));
        assert!(parse_identifier("1abc").is_err());
        assert!(parse_identifier("").is_err());
    }

    #[test]
    fn test_starts_with_keyword() {
        assert!(starts_with_keyword("  ORDER BY x", "ORDER"));
        assert!(starts_with_keyword("limit 5", "LIMIT"));
        assert!(!starts_with_keyword("orderly", "ORDER"));
        assert!(!starts_with_keyword("", "ORDER"));
    }
}
