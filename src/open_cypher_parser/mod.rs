use std::collections::BTreeMap;

use nom::{combinator::opt, Parser};

use crate::value::ValueList;

use ast::{
    Atom, Expression, InListExpression, Literal, NonArithmeticOperatorExpression, ReturnClause,
    SinglePartQuery,
};
use common::{starts_with_keyword, ws};
use errors::OpenCypherParsingError;

pub mod ast;
mod common;
pub mod errors;
mod expression;
mod limit_clause;
mod match_clause;
mod path_pattern;
mod return_clause;
mod where_clause;

pub use errors::ParseFailureKind;

/// Clauses the grammar knows about but this engine does not implement.
const UNSUPPORTED_CLAUSES: &[&str] = &[
    "WITH", "UNWIND", "ORDER", "SKIP", "DISTINCT", "UNION", "CREATE", "MERGE", "SET", "REMOVE",
    "DELETE", "DETACH", "OPTIONAL", "CALL", "USE", "FOREACH", "WHERE", "MATCH",
];

/// Parse a single-part query `MATCH ... [WHERE ...] RETURN ... [LIMIT n]`,
/// resolving `$name` parameters against `params`.
pub fn parse_query<'a>(
    input: &'a str,
    params: &BTreeMap<String, ValueList>,
) -> Result<SinglePartQuery<'a>, OpenCypherParsingError<'a>> {
    let result = parse_single_part_query(input);
    let (remainder, mut query) = match result {
        Ok(ok) => ok,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => return Err(e),
        Err(nom::Err::Incomplete(_)) => {
            return Err(OpenCypherParsingError::new(input, "incomplete input"))
        }
    };

    let trimmed = remainder.trim();
    if !trimmed.is_empty() {
        for clause in UNSUPPORTED_CLAUSES {
            if starts_with_keyword(trimmed, clause) {
                return Err(OpenCypherParsingError::unsupported(
                    trimmed,
                    format!("the {} clause in this position", clause),
                ));
            }
        }
        return Err(OpenCypherParsingError::new(
            trimmed,
            "unexpected tokens after query",
        ));
    }

    if let Some(match_clause) = &mut query.match_clause {
        if let Some(where_clause) = &mut match_clause.where_clause {
            resolve_parameters(where_clause, params)?;
        }
    }

    Ok(query)
}

fn parse_single_part_query(
    input: &'_ str,
) -> nom::IResult<&'_ str, SinglePartQuery<'_>, OpenCypherParsingError<'_>> {
    let (input, _) = nom::character::complete::multispace0.parse(input)?;

    for clause in UNSUPPORTED_CLAUSES {
        if *clause != "MATCH" && *clause != "WHERE" && starts_with_keyword(input, clause) {
            return Err(OpenCypherParsingError::unsupported(
                input,
                format!("the {} clause", clause),
            )
            .fail());
        }
    }

    let (input, match_clause) = opt(match_clause::parse_match_clause).parse(input)?;

    if !starts_with_keyword(input, "RETURN") {
        return Err(OpenCypherParsingError::new(
            input,
            "expected a RETURN clause",
        )
        .fail());
    }
    let (input, items) = return_clause::parse_return_items(input)?;
    let (input, limit) = opt(limit_clause::parse_limit_clause).parse(input)?;
    let (input, _) = opt(ws(nom::character::complete::char(';'))).parse(input)?;

    Ok((
        input,
        SinglePartQuery {
            match_clause,
            return_clause: ReturnClause { items, limit },
        },
    ))
}

/// Replace `$name` atoms by the list value bound in the parameter map.
fn resolve_parameters<'a>(
    expression: &mut Expression<'a>,
    params: &BTreeMap<String, ValueList>,
) -> Result<(), OpenCypherParsingError<'a>> {
    match expression {
        Expression::Aggregate(aggregate) => {
            for child in &mut aggregate.children {
                resolve_parameters(child, params)?;
            }
            Ok(())
        }
        Expression::Comparison(comparison) => {
            resolve_in_operand(&mut comparison.left, params)?;
            resolve_in_operand(&mut comparison.right, params)
        }
        Expression::InList(InListExpression { left, list }) => {
            resolve_in_operand(left, params)?;
            resolve_in_operand(list, params)
        }
        Expression::Operand(operand) => resolve_in_operand(operand, params),
    }
}

fn resolve_in_operand<'a>(
    operand: &mut NonArithmeticOperatorExpression<'a>,
    params: &BTreeMap<String, ValueList>,
) -> Result<(), OpenCypherParsingError<'a>> {
    match &mut operand.atom {
        Atom::Parameter(name) => match params.get(*name) {
            Some(list) => {
                operand.atom = Atom::Literal(Literal::List(list.clone()));
                Ok(())
            }
            None => Err(OpenCypherParsingError::new(
                *name,
                format!("unknown parameter ${}", name),
            )),
        },
        Atom::Aggregate(aggregate) => {
            for child in &mut aggregate.children {
                resolve_parameters(child, params)?;
            }
            Ok(())
        }
        Atom::Variable(_) | Atom::Literal(_) => Ok(()),
    }
}
