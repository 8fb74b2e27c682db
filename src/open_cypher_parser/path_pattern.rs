use nom::{
    character::complete::char,
    combinator::opt,
    IResult, Parser,
};

use super::ast::{
    Label, Labels, NodePattern, PatternElement, PatternElementChain, RelationshipPattern,
    TraversalDirection, Variable,
};
use super::common::{parse_identifier, ws};
use super::errors::OpenCypherParsingError;

type PatternResult<'a, O> = IResult<&'a str, O, OpenCypherParsingError<'a>>;

/// Parse a full pattern element: `(a:Person)-[r:KNOWS]->(b)<-[s]-(c)`.
pub fn parse_path_pattern(input: &'_ str) -> PatternResult<'_, PatternElement<'_>> {
    let (input, first_node) = parse_node_pattern(input)?;

    let mut chain = Vec::new();
    let mut remaining_input = input;
    loop {
        match parse_chain_link(remaining_input) {
            Ok((rest, link)) => {
                chain.push(link);
                remaining_input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }

    Ok((remaining_input, PatternElement { first_node, chain }))
}

fn parse_chain_link(input: &'_ str) -> PatternResult<'_, PatternElementChain<'_>> {
    let (input, relationship) = parse_relationship_pattern(input)?;
    let (input, node) = parse_node_pattern(input)?;
    Ok((input, PatternElementChain { relationship, node }))
}

/// Parse a node pattern: `()`, `(a)`, `(:Person)`, `(a:Person)`.
pub fn parse_node_pattern(input: &'_ str) -> PatternResult<'_, NodePattern<'_>> {
    let (input, _) = ws(char('(')).parse(input)?;
    let (input, variable) = opt(parse_identifier_err).parse(input)?;
    let (input, labels) = parse_labels(input)?;
    let (input, _) = nom::character::complete::multispace0.parse(input)?;

    if input.starts_with('{') {
        return Err(OpenCypherParsingError::unsupported(
            input,
            "property maps in patterns",
        )
        .fail());
    }

    let (input, _) = ws(char(')')).parse(input).map_err(|_: nom::Err<OpenCypherParsingError>| {
        OpenCypherParsingError::new(input, "expected ')' closing a node pattern").fail()
    })?;

    Ok((
        input,
        NodePattern {
            variable: variable.map(Variable),
            labels,
        },
    ))
}

/// Parse a relationship pattern with its direction:
/// `-[r:KNOWS]->`, `<-[r]-`, `-[]-`, `-->`, `<--`, `--`.
fn parse_relationship_pattern(input: &'_ str) -> PatternResult<'_, RelationshipPattern<'_>> {
    let (input, _) = nom::character::complete::multispace0.parse(input)?;
    let (input, left_arrow) = opt(char('<')).parse(input)?;
    let (input, _) = char('-').parse(input)?;

    let (input, detail) = opt(parse_relationship_detail).parse(input)?;
    let (variable, labels) = detail.unwrap_or((None, Labels::new()));

    let (input, _) = char('-').parse(input)?;
    let (input, right_arrow) = opt(char('>')).parse(input)?;

    let direction = match (left_arrow.is_some(), right_arrow.is_some()) {
        (false, false) => TraversalDirection::Any,
        (false, true) => TraversalDirection::Forward,
        (true, false) => TraversalDirection::Backward,
        (true, true) => {
            return Err(
                OpenCypherParsingError::new(input, "a relationship cannot point both ways").fail(),
            )
        }
    };

    Ok((
        input,
        RelationshipPattern {
            direction,
            variable: variable.map(Variable),
            labels,
        },
    ))
}

type RelationshipDetail<'a> = (Option<&'a str>, Labels<'a>);

fn parse_relationship_detail(input: &'_ str) -> PatternResult<'_, RelationshipDetail<'_>> {
    let (input, _) = char('[').parse(input)?;
    let (input, variable) = opt(parse_identifier_err).parse(input)?;
    let (input, labels) = parse_labels(input)?;
    let (input, _) = nom::character::complete::multispace0.parse(input)?;

    if input.starts_with('*') {
        return Err(OpenCypherParsingError::unsupported(
            input,
            "variable-length relationships",
        )
        .fail());
    }
    if input.starts_with('{') {
        return Err(OpenCypherParsingError::unsupported(
            input,
            "property maps in patterns",
        )
        .fail());
    }

    let (input, _) = char(']').parse(input).map_err(|_: nom::Err<OpenCypherParsingError>| {
        OpenCypherParsingError::new(input, "expected ']' closing a relationship pattern").fail()
    })?;
    Ok((input, (variable, labels)))
}

fn parse_labels(input: &'_ str) -> PatternResult<'_, Labels<'_>> {
    let mut labels = Labels::new();
    let mut remaining_input = input;
    while let Ok((rest, _)) = char::<_, OpenCypherParsingError>(':').parse(remaining_input) {
        let (rest, label) = parse_identifier_err(rest)?;
        labels.insert(Label(label));
        remaining_input = rest;
    }
    Ok((remaining_input, labels))
}

fn parse_identifier_err(input: &'_ str) -> PatternResult<'_, &'_ str> {
    parse_identifier(input)
        .map_err(|_| nom::Err::Error(OpenCypherParsingError::new(input, "expected an identifier")))
}
