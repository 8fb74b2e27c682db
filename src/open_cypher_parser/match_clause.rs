use nom::{bytes::complete::tag_no_case, combinator::opt, IResult, Parser};

use super::ast::MatchClause;
use super::common::{parse_identifier, ws};
use super::errors::OpenCypherParsingError;
use super::path_pattern::parse_path_pattern;
use super::where_clause::parse_where_clause;

pub fn parse_match_clause(
    input: &'_ str,
) -> IResult<&'_ str, MatchClause<'_>, OpenCypherParsingError<'_>> {
    let (input, _) = ws(tag_no_case("MATCH")).parse(input)?;

    // A pattern introduced by an identifier is either a named path
    // (`p = (...)`) or a path function; neither is implemented.
    if let Ok((rest, name)) = ws::<_, OpenCypherParsingError, _>(parse_identifier).parse(input) {
        let construct = if rest.trim_start().starts_with('=') {
            format!("named paths ('{} = ...')", name)
        } else {
            format!("path function '{}'", name)
        };
        return Err(OpenCypherParsingError::unsupported(input, construct).fail());
    }

    let (input, pattern) = parse_path_pattern(input)?;

    if input.trim_start().starts_with(',') {
        return Err(OpenCypherParsingError::unsupported(
            input,
            "multiple pattern parts in one MATCH",
        )
        .fail());
    }

    let (input, where_clause) = opt(parse_where_clause).parse(input)?;

    Ok((
        input,
        MatchClause {
            pattern,
            where_clause,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_cypher_parser::ast::Variable;

    #[test]
    fn test_parse_match_with_where() {
        let (rest, clause) = parse_match_clause("MATCH (a)-[r]->(b) WHERE a.age < 5").unwrap();
        assert_eq!(rest, "");
        assert_eq!(clause.pattern.first_node.variable, Some(Variable("a")));
        assert!(clause.where_clause.is_some());
    }

    #[test]
    fn test_parse_match_without_where() {
        let (_, clause) = parse_match_clause("MATCH (n)").unwrap();
        assert!(clause.where_clause.is_none());
        assert!(clause.pattern.chain.is_empty());
    }

    #[test]
    fn test_named_path_is_unsupported() {
        assert!(matches!(
            parse_match_clause("MATCH p = (a)-[r]->(b) RETURN p"),
            Err(nom::Err::Failure(_))
        ));
    }

    #[test]
    fn test_multiple_pattern_parts_are_unsupported() {
        assert!(matches!(
            parse_match_clause("MATCH (a), (b) RETURN a"),
            Err(nom::Err::Failure(_))
        ));
    }
}
