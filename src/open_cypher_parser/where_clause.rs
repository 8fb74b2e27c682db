use nom::{bytes::complete::tag_no_case, IResult, Parser};

use super::ast::Expression;
use super::common::ws;
use super::errors::OpenCypherParsingError;
use super::expression::parse_expression;

pub fn parse_where_clause(
    input: &'_ str,
) -> IResult<&'_ str, Expression<'_>, OpenCypherParsingError<'_>> {
    let (input, _) = ws(tag_no_case("WHERE")).parse(input)?;
    parse_expression(input).map_err(|e| match e {
        nom::Err::Error(err) | nom::Err::Failure(err) => {
            let mut err = err;
            err.errors.push((input, "in WHERE clause".to_string()));
            nom::Err::Failure(err)
        }
        nom::Err::Incomplete(needed) => nom::Err::Incomplete(needed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_cypher_parser::ast::{Aggregator, Expression};

    #[test]
    fn test_parse_where_clause() {
        let (rest, expr) = parse_where_clause("WHERE r.since > 12345 AND a.age < 107").unwrap();
        assert_eq!(rest, "");
        assert!(matches!(
            expr,
            Expression::Aggregate(ref agg) if agg.aggregator == Aggregator::And
        ));
    }

    #[test]
    fn test_parse_where_requires_expression() {
        assert!(parse_where_clause("WHERE ").is_err());
    }
}
