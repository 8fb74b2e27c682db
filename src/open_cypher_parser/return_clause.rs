use nom::{
    bytes::complete::tag_no_case,
    character::complete::char,
    IResult, Parser,
};

use super::ast::{Atom, NonArithmeticOperatorExpression};
use super::common::{starts_with_keyword, ws};
use super::errors::OpenCypherParsingError;
use super::expression::parse_operand;

/// Parse `RETURN item, item, ...`. Items are restricted to `v.prop` and
/// `id(v)`; everything else the grammar would admit is rejected here.
pub fn parse_return_items(
    input: &'_ str,
) -> IResult<&'_ str, Vec<NonArithmeticOperatorExpression<'_>>, OpenCypherParsingError<'_>> {
    let (input, _) = ws(tag_no_case("RETURN")).parse(input)?;

    if starts_with_keyword(input, "DISTINCT") {
        return Err(OpenCypherParsingError::unsupported(input, "RETURN DISTINCT").fail());
    }

    let mut items = Vec::new();
    let mut remaining_input = input;
    loop {
        let (rest, item) = parse_operand(remaining_input)
            .map_err(|e| promote(e, remaining_input, "in RETURN clause"))?;
        validate_projection_item(remaining_input, &item)?;

        if starts_with_keyword(rest, "AS") {
            return Err(
                OpenCypherParsingError::unsupported(rest, "projection aliases (AS)").fail(),
            );
        }

        items.push(item);
        match ws::<_, OpenCypherParsingError, _>(char(',')).parse(rest) {
            Ok((after_comma, _)) => remaining_input = after_comma,
            Err(_) => return Ok((rest, items)),
        }
    }
}

fn validate_projection_item<'a>(
    input: &'a str,
    item: &NonArithmeticOperatorExpression<'a>,
) -> Result<(), nom::Err<OpenCypherParsingError<'a>>> {
    match &item.atom {
        Atom::Variable(var) => {
            if item.property.is_none() {
                let construct = if item.labels.is_empty() {
                    format!("returning the whole element '{}' (use {}.prop or id({}))", var, var, var)
                } else {
                    "label predicates in RETURN".to_string()
                };
                return Err(OpenCypherParsingError::unsupported(input, construct).fail());
            }
            Ok(())
        }
        Atom::Literal(_) | Atom::Parameter(_) => {
            Err(OpenCypherParsingError::unsupported(input, "literal projection items").fail())
        }
        Atom::Aggregate(_) => {
            Err(OpenCypherParsingError::unsupported(input, "expression projection items").fail())
        }
    }
}

fn promote<'a>(
    e: nom::Err<OpenCypherParsingError<'a>>,
    input: &'a str,
    ctx: &str,
) -> nom::Err<OpenCypherParsingError<'a>> {
    match e {
        nom::Err::Error(mut err) | nom::Err::Failure(mut err) => {
            err.errors.push((input, ctx.to_string()));
            nom::Err::Failure(err)
        }
        nom::Err::Incomplete(needed) => nom::Err::Incomplete(needed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_cypher_parser::ast::{PropertyKey, Variable, SYS_ID};

    #[test]
    fn test_parse_property_items() {
        let (rest, items) = parse_return_items("RETURN a.age, b.age, r.since").unwrap();
        assert_eq!(rest, "");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].atom, Atom::Variable(Variable("a")));
        assert_eq!(items[1].property, Some(PropertyKey("age")));
    }

    #[test]
    fn test_parse_id_items() {
        let (_, items) = parse_return_items("RETURN id(a), id(r)").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].property, Some(PropertyKey(SYS_ID)));
        assert_eq!(items[1].atom, Atom::Variable(Variable("r")));
    }

    #[test]
    fn test_duplicate_items_are_allowed() {
        let (_, items) = parse_return_items("RETURN a.age, a.age").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], items[1]);
    }

    #[test]
    fn test_bare_variable_is_unsupported() {
        assert!(matches!(
            parse_return_items("RETURN n"),
            Err(nom::Err::Failure(_))
        ));
    }

    #[test]
    fn test_alias_is_unsupported() {
        assert!(matches!(
            parse_return_items("RETURN n.age AS age"),
            Err(nom::Err::Failure(_))
        ));
    }

    #[test]
    fn test_distinct_is_unsupported() {
        assert!(matches!(
            parse_return_items("RETURN DISTINCT n.age"),
            Err(nom::Err::Failure(_))
        ));
    }
}
