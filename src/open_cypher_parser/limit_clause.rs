use nom::{
    bytes::complete::{tag_no_case, take_while1},
    IResult, Parser,
};

use super::ast::Limit;
use super::common::ws;
use super::errors::OpenCypherParsingError;

pub fn parse_limit_clause(
    input: &'_ str,
) -> IResult<&'_ str, Limit, OpenCypherParsingError<'_>> {
    let (input, _) = ws(tag_no_case("LIMIT")).parse(input)?;
    let (rest, digits) = take_while1(|c: char| c.is_ascii_digit())
        .parse(input)
        .map_err(|_: nom::Err<OpenCypherParsingError>| {
            OpenCypherParsingError::new(input, "LIMIT expects a non-negative integer").fail()
        })?;
    let max_rows = digits
        .parse::<usize>()
        .map_err(|_| OpenCypherParsingError::new(input, "LIMIT value out of range").fail())?;
    Ok((rest, Limit { max_rows }))
}
