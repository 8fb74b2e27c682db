use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until, take_while1},
    character::complete::{char, multispace0},
    combinator::{not, opt, peek},
    IResult, Parser,
};

use crate::value::{Value, ValueList};

use super::ast::{
    AggregateExpression, Aggregator, Atom, Comparison, ComparisonExpression, Expression,
    InListExpression, Label, Labels, Literal, NonArithmeticOperatorExpression, PropertyKey,
    Variable, SYS_ID,
};
use super::common::{parse_identifier, ws};
use super::errors::OpenCypherParsingError;

type ExprResult<'a, O> = IResult<&'a str, O, OpenCypherParsingError<'a>>;

pub fn parse_expression(input: &'_ str) -> ExprResult<'_, Expression<'_>> {
    parse_logical_or(input)
}

/// Keywords that must not be mistaken for a word operator's right-hand
/// identifier, e.g. `OR` in `ORDER`.
fn word_operator<'a>(
    keyword: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = OpenCypherParsingError<'a>> {
    ws(nom::sequence::terminated(
        tag_no_case(keyword),
        not(peek(take_while1(|c: char| c.is_alphanumeric() || c == '_'))),
    ))
}

fn parse_aggregation<'a>(
    input: &'a str,
    aggregator: Aggregator,
    keyword: &'static str,
    mut inner: impl FnMut(&'a str) -> ExprResult<'a, Expression<'a>>,
) -> ExprResult<'a, Expression<'a>> {
    let (input, first) = inner(input)?;

    let mut children = vec![first];
    let mut remaining_input = input;
    loop {
        let kw = word_operator(keyword).parse(remaining_input);
        match kw {
            Ok((after_kw, _)) => {
                let (after_child, child) = inner(after_kw)?;
                children.push(child);
                remaining_input = after_child;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }

    if children.len() == 1 {
        return Ok((remaining_input, children.pop().expect("one child")));
    }
    Ok((
        remaining_input,
        Expression::Aggregate(AggregateExpression {
            aggregator,
            children,
        }),
    ))
}

fn parse_logical_or(input: &'_ str) -> ExprResult<'_, Expression<'_>> {
    parse_aggregation(input, Aggregator::Or, "OR", parse_logical_xor)
}

fn parse_logical_xor(input: &'_ str) -> ExprResult<'_, Expression<'_>> {
    parse_aggregation(input, Aggregator::Xor, "XOR", parse_logical_and)
}

fn parse_logical_and(input: &'_ str) -> ExprResult<'_, Expression<'_>> {
    parse_aggregation(input, Aggregator::And, "AND", parse_term)
}

/// A boolean term: a parenthesized expression, a comparison, a
/// list-membership predicate, or a label predicate.
fn parse_term(input: &'_ str) -> ExprResult<'_, Expression<'_>> {
    if let Ok((rest, _)) = ws::<_, OpenCypherParsingError, _>(char('(')).parse(input) {
        let (rest, inner) = parse_expression(rest)?;
        let (rest, _) = ws(char(')')).parse(rest)?;
        // A parenthesized aggregation becomes an atom so that the shape of
        // the tree keeps parentheses as boundaries for decomposition.
        let expression = match inner {
            Expression::Aggregate(aggregate) => {
                Expression::Operand(NonArithmeticOperatorExpression {
                    atom: Atom::Aggregate(Box::new(aggregate)),
                    property: None,
                    labels: Labels::new(),
                })
            }
            other => other,
        };
        return Ok((rest, expression));
    }

    let (input, left) = parse_operand(input)?;

    if let Ok((rest, comparison)) = parse_comparison_operator(input) {
        let (rest, right) = parse_operand(rest)?;
        return Ok((
            rest,
            Expression::Comparison(ComparisonExpression {
                left,
                comparison,
                right,
            }),
        ));
    }

    if let Ok((rest, _)) = word_operator("IN").parse(input) {
        let (rest, list) = parse_in_list_source(rest)?;
        return Ok((rest, Expression::InList(InListExpression { left, list })));
    }

    Ok((input, Expression::Operand(left)))
}

fn parse_comparison_operator(input: &'_ str) -> ExprResult<'_, Comparison> {
    let (input, op) = ws(alt((
        tag("<>"),
        tag("<="),
        tag(">="),
        tag("="),
        tag("<"),
        tag(">"),
    )))
    .parse(input)?;
    let comparison = match op {
        "=" => Comparison::Eq,
        "<>" => Comparison::Ne,
        "<" => Comparison::Lt,
        "<=" => Comparison::Le,
        ">" => Comparison::Gt,
        ">=" => Comparison::Ge,
        _ => unreachable!(),
    };
    Ok((input, comparison))
}

/// An operand of a comparison or membership predicate: `v.prop`, `id(v)`,
/// `v:Label`, a bare variable, a literal, or a parameter.
pub fn parse_operand(input: &'_ str) -> ExprResult<'_, NonArithmeticOperatorExpression<'_>> {
    let (input, _) = multispace0.parse(input)?;

    if let Ok((rest, literal)) = parse_scalar_literal(input) {
        return Ok((
            rest,
            NonArithmeticOperatorExpression::literal(Literal::Scalar(literal)),
        ));
    }

    if let Ok((rest, name)) = parse_parameter_name(input) {
        return Ok((
            rest,
            NonArithmeticOperatorExpression {
                atom: Atom::Parameter(name),
                property: None,
                labels: Labels::new(),
            },
        ));
    }

    let (input, ident) = parse_identifier(input)
        .map_err(|_| nom::Err::Error(OpenCypherParsingError::new(input, "expected an operand")))?;

    // Function invocation: only `id(v)` is understood.
    if let Ok((rest, _)) = ws::<_, OpenCypherParsingError, _>(char('(')).parse(input) {
        if !ident.eq_ignore_ascii_case("id") {
            return Err(OpenCypherParsingError::unsupported(
                input,
                format!("function '{}' (only id() is available)", ident),
            )
            .fail());
        }
        let (rest, var) = ws(parse_identifier).parse(rest)?;
        let (rest, _) = ws(char(')')).parse(rest)?;
        return Ok((
            rest,
            NonArithmeticOperatorExpression::property_of(Variable(var), PropertyKey(SYS_ID)),
        ));
    }

    // Property access: `v.prop`.
    if let Ok((rest, _)) = char::<_, OpenCypherParsingError>('.').parse(input) {
        let (rest, key) = parse_identifier(rest).map_err(|_| {
            OpenCypherParsingError::new(rest, "expected a property name after '.'").fail()
        })?;
        return Ok((
            rest,
            NonArithmeticOperatorExpression::property_of(Variable(ident), PropertyKey(key)),
        ));
    }

    // Label predicate: `v:Label1:Label2`.
    let mut labels = Labels::new();
    let mut remaining_input = input;
    while let Ok((rest, _)) = char::<_, OpenCypherParsingError>(':').parse(remaining_input) {
        let (rest, label) = parse_identifier(rest).map_err(|_| {
            OpenCypherParsingError::new(rest, "expected a label name after ':'").fail()
        })?;
        labels.insert(Label(label));
        remaining_input = rest;
    }

    Ok((
        remaining_input,
        NonArithmeticOperatorExpression {
            atom: Atom::Variable(Variable(ident)),
            property: None,
            labels,
        },
    ))
}

/// The right-hand side of `IN`: a list literal or a parameter.
fn parse_in_list_source(input: &'_ str) -> ExprResult<'_, NonArithmeticOperatorExpression<'_>> {
    let (input, _) = multispace0.parse(input)?;

    if let Ok((rest, name)) = parse_parameter_name(input) {
        return Ok((
            rest,
            NonArithmeticOperatorExpression {
                atom: Atom::Parameter(name),
                property: None,
                labels: Labels::new(),
            },
        ));
    }

    if input.starts_with('[') {
        let (rest, list) = parse_list_literal(input)?;
        return Ok((
            rest,
            NonArithmeticOperatorExpression::literal(Literal::List(list)),
        ));
    }

    Err(OpenCypherParsingError::unsupported(
        input,
        "IN requires a list literal or a list parameter",
    )
    .fail())
}

fn parse_parameter_name(input: &'_ str) -> ExprResult<'_, &'_ str> {
    let (input, _) = char('$').parse(input)?;
    parse_identifier(input)
        .map_err(|_| nom::Err::Error(OpenCypherParsingError::new(input, "expected parameter name")))
}

pub fn parse_list_literal(input: &'_ str) -> ExprResult<'_, ValueList> {
    let (input, _) = ws(char('[')).parse(input)?;

    let mut list = ValueList::Empty;
    let mut remaining_input = input;
    let mut first = true;
    loop {
        if let Ok((rest, _)) = ws::<_, OpenCypherParsingError, _>(char(']')).parse(remaining_input)
        {
            return Ok((rest, list));
        }
        if !first {
            let (rest, _) = ws(char(',')).parse(remaining_input)?;
            remaining_input = rest;
        }
        let (rest, value) = parse_scalar_literal(remaining_input.trim_start()).map_err(|_| {
            OpenCypherParsingError::new(remaining_input, "expected a literal list element").fail()
        })?;
        if let Err(e) = list.push(value) {
            return Err(OpenCypherParsingError::new(remaining_input, e.to_string()).fail());
        }
        remaining_input = rest;
        first = false;
    }
}

/// A scalar literal: an integer, a float, or a quoted string.
pub fn parse_scalar_literal(input: &'_ str) -> ExprResult<'_, Value> {
    alt((parse_string_literal, parse_number_literal)).parse(input)
}

fn parse_string_literal(input: &'_ str) -> ExprResult<'_, Value> {
    let (input, s) = alt((
        nom::sequence::delimited(char('\''), take_until("'"), char('\'')),
        nom::sequence::delimited(char('"'), take_until("\""), char('"')),
    ))
    .parse(input)?;
    Ok((input, Value::String(s.to_string())))
}

fn parse_number_literal(input: &'_ str) -> ExprResult<'_, Value> {
    let (rest, negative) = opt(char('-')).parse(input)?;
    let (rest, digits) = take_while1(|c: char| c.is_ascii_digit()).parse(rest)?;
    let (rest, fraction) = opt((char('.'), take_while1(|c: char| c.is_ascii_digit())))
        .parse(rest)?;

    let mut text = String::new();
    if negative.is_some() {
        text.push('-');
    }
    text.push_str(digits);
    if let Some((_, frac)) = fraction {
        text.push('.');
        text.push_str(frac);
        let parsed: f64 = text
            .parse()
            .map_err(|_| nom::Err::Error(OpenCypherParsingError::new(input, "invalid float")))?;
        return Ok((rest, Value::Float(parsed)));
    }
    let parsed: i64 = text
        .parse()
        .map_err(|_| nom::Err::Error(OpenCypherParsingError::new(input, "invalid integer")))?;
    Ok((rest, Value::Integer(parsed)))
}
