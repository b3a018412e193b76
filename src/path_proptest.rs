//! Property-based tests for the tree path grammar.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::path::TreePath;
    use proptest::prelude::*;

    /// One dotted segment with an optional subscript chain.
    fn segment_strategy() -> impl Strategy<Value = String> {
        let key = "[a-zA-Z_][a-zA-Z0-9_-]{0,12}";
        let subscript = prop_oneof![
            (0usize..100).prop_map(|i| format!("[{}]", i)),
            Just("[:]".to_string()),
            (0usize..100).prop_map(|i| format!("[{}:]", i)),
            (0usize..100).prop_map(|i| format!("[:{}]", i)),
            ((0usize..50), (0usize..50)).prop_map(|(a, b)| format!("[{}:{}]", a, b)),
        ];
        (key, prop::collection::vec(subscript, 0..3))
            .prop_map(|(k, subs)| format!("{}{}", k, subs.concat()))
    }

    /// A full dotted path expression.
    fn path_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(segment_strategy(), 1..5).prop_map(|segments| segments.join("."))
    }

    proptest! {
        /// Property: every generated expression parses.
        #[test]
        fn valid_expressions_parse(expr in path_strategy()) {
            prop_assert!(TreePath::parse(&expr).is_ok(), "failed to parse '{}'", expr);
        }

        /// Property: parse then display round-trips to the same expression.
        #[test]
        fn parse_display_round_trips(expr in path_strategy()) {
            let path = TreePath::parse(&expr).unwrap();
            prop_assert_eq!(path.to_string(), expr);
        }

        /// Property: parsing is deterministic and re-parsing the rendered
        /// form yields an equal path.
        #[test]
        fn reparse_is_stable(expr in path_strategy()) {
            let first = TreePath::parse(&expr).unwrap();
            let second = TreePath::parse(&first.to_string()).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Property: segment count equals the number of dotted components.
        #[test]
        fn segment_count_matches(segments in prop::collection::vec(segment_strategy(), 1..5)) {
            let expr = segments.join(".");
            let path = TreePath::parse(&expr).unwrap();
            prop_assert_eq!(path.len(), segments.len());
        }

        /// Property: child() appends exactly one plain segment.
        #[test]
        fn child_appends_one_segment(
            expr in path_strategy(),
            key in "[a-zA-Z_][a-zA-Z0-9_]{0,8}",
        ) {
            let path = TreePath::parse(&expr).unwrap();
            let child = path.child(&key);
            prop_assert_eq!(child.len(), path.len() + 1);
            prop_assert!(child.to_string().ends_with(&key));
        }

        /// Property: expressions with an empty segment never parse.
        #[test]
        fn empty_segments_rejected(expr in path_strategy()) {
            prop_assert!(
                TreePath::parse(&format!(".{}", expr)).is_err(),
                "leading dot accepted for '{}'", expr
            );
            prop_assert!(
                TreePath::parse(&format!("{}.", expr)).is_err(),
                "trailing dot accepted for '{}'", expr
            );
            prop_assert!(
                TreePath::parse(&format!("{}..x", expr)).is_err(),
                "double dot accepted for '{}'", expr
            );
        }

        /// Property: malformed subscripts never parse.
        #[test]
        fn malformed_subscripts_rejected(key in "[a-zA-Z_][a-zA-Z0-9_]{0,8}") {
            prop_assert!(
                TreePath::parse(&format!("{}[", key)).is_err(),
                "unclosed subscript accepted for '{}'", key
            );
            prop_assert!(
                TreePath::parse(&format!("{}[]", key)).is_err(),
                "empty subscript accepted for '{}'", key
            );
            prop_assert!(
                TreePath::parse(&format!("{}[a]", key)).is_err(),
                "non-numeric subscript accepted for '{}'", key
            );
            prop_assert!(
                TreePath::parse(&format!("{}[1:2:3]", key)).is_err(),
                "three-part slice accepted for '{}'", key
            );
        }
    }
}
