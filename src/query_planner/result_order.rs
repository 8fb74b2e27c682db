use crate::open_cypher_parser::ast::PropertyKey;

/// One projected property, remembering its position in the RETURN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClauseTerm<'q> {
    pub position: usize,
    pub property: PropertyKey<'q>,
}

/// For each RETURN position, the (segment, offset) its value comes from.
/// Segments are pattern positions for path queries, or the single variable
/// for scalar queries.
pub type ResultOrder = Vec<(usize, usize)>;

pub fn compute_result_order(segments: &[&[ReturnClauseTerm<'_>]]) -> ResultOrder {
    let total: usize = segments.iter().map(|terms| terms.len()).sum();
    let mut order = vec![(0, 0); total];
    for (segment_index, terms) in segments.iter().enumerate() {
        for (offset, term) in terms.iter().enumerate() {
            order[term.position] = (segment_index, offset);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(position: usize, property: &'static str) -> ReturnClauseTerm<'static> {
        ReturnClauseTerm {
            position,
            property: PropertyKey(property),
        }
    }

    #[test]
    fn test_order_interleaves_segments() {
        // RETURN a.age, b.age, r.since with segments [a], [r], [b].
        let a = vec![term(0, "age")];
        let r = vec![term(2, "since")];
        let b = vec![term(1, "age")];
        let order = compute_result_order(&[&a, &r, &b]);
        assert_eq!(order, vec![(0, 0), (2, 0), (1, 0)]);
    }

    #[test]
    fn test_order_with_duplicate_properties() {
        let a = vec![term(0, "age"), term(1, "age")];
        let order = compute_result_order(&[&a]);
        assert_eq!(order, vec![(0, 0), (0, 1)]);
    }
}
