//! Tree path grammar: dotted segments with optional sequence subscripts
//!
//! A path addresses one location inside a [`crate::tree::ConfigTree`]. The
//! grammar is `a.b.c` where each segment is a key name followed by zero or
//! more bracketed subscripts: `b[2]` indexes into a sequence stored at `b`,
//! and `b[1:3]` takes a sub-range. Subscripts chain (`b[0][2]`) for nested
//! sequences. Keys may contain any character except `.`, `[` and `]`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// A single subscript applied to a sequence value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscript {
    /// `[i]` - a single element.
    Index(usize),
    /// `[start:stop]` - a sub-range; either bound may be omitted.
    Slice(Option<usize>, Option<usize>),
}

impl fmt::Display for Subscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subscript::Index(i) => write!(f, "[{}]", i),
            Subscript::Slice(start, stop) => {
                write!(f, "[")?;
                if let Some(s) = start {
                    write!(f, "{}", s)?;
                }
                write!(f, ":")?;
                if let Some(s) = stop {
                    write!(f, "{}", s)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// One dotted segment: a key name plus its subscripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Mapping key this segment addresses.
    pub key: String,
    /// Sequence subscripts applied after the key lookup, in order.
    pub subscripts: Vec<Subscript>,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        for sub in &self.subscripts {
            write!(f, "{}", sub)?;
        }
        Ok(())
    }
}

/// A parsed tree path, e.g. `project.authors[0].name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePath {
    /// Segments in root-to-leaf order. Never empty for a parsed path.
    pub segments: Vec<PathSegment>,
}

fn subscript_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([0-9]*)(:?)([0-9]*)\]").unwrap())
}

impl TreePath {
    /// Parse a path expression.
    ///
    /// Returns a content error for empty paths, empty segments, and
    /// malformed subscripts.
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(Error::Content {
                path: String::new(),
                message: "empty path expression".to_string(),
            });
        }

        let mut segments = Vec::new();
        for raw in expr.split('.') {
            segments.push(Self::parse_segment(raw, expr)?);
        }
        Ok(Self { segments })
    }

    fn parse_segment(raw: &str, full: &str) -> Result<PathSegment> {
        let bracket = raw.find('[');
        let key = match bracket {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        if key.is_empty() {
            return Err(Error::Content {
                path: full.to_string(),
                message: format!("empty segment in path expression '{}'", full),
            });
        }
        if key.contains(']') {
            return Err(Error::Content {
                path: full.to_string(),
                message: format!("unbalanced bracket in segment '{}'", raw),
            });
        }

        let mut subscripts = Vec::new();
        if let Some(pos) = bracket {
            let rest = &raw[pos..];
            let mut consumed = 0;
            for caps in subscript_regex().captures_iter(rest) {
                let whole = caps.get(0).unwrap();
                if whole.start() != consumed {
                    return Err(Error::Content {
                        path: full.to_string(),
                        message: format!("malformed subscript in segment '{}'", raw),
                    });
                }
                consumed = whole.end();

                let start = &caps[1];
                let colon = &caps[2];
                let stop = &caps[3];
                if colon.is_empty() {
                    let index: usize = start.parse().map_err(|_| Error::Content {
                        path: full.to_string(),
                        message: format!("invalid index in segment '{}'", raw),
                    })?;
                    subscripts.push(Subscript::Index(index));
                } else {
                    let parse_bound = |s: &str| -> Result<Option<usize>> {
                        if s.is_empty() {
                            Ok(None)
                        } else {
                            s.parse().map(Some).map_err(|_| Error::Content {
                                path: full.to_string(),
                                message: format!("invalid slice bound in segment '{}'", raw),
                            })
                        }
                    };
                    subscripts.push(Subscript::Slice(parse_bound(start)?, parse_bound(stop)?));
                }
            }
            if consumed != rest.len() {
                return Err(Error::Content {
                    path: full.to_string(),
                    message: format!("malformed subscript in segment '{}'", raw),
                });
            }
        }

        Ok(PathSegment {
            key: key.to_string(),
            subscripts,
        })
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when the path has no segments (never true for a parsed path).
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a plain key segment, returning the extended path.
    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment {
            key: key.to_string(),
            subscripts: Vec::new(),
        });
        Self { segments }
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_path() {
        let path = TreePath::parse("a.b.c").unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.segments[0].key, "a");
        assert_eq!(path.segments[2].key, "c");
        assert!(path.segments[1].subscripts.is_empty());
    }

    #[test]
    fn test_parse_single_segment() {
        let path = TreePath::parse("project").unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path.segments[0].key, "project");
    }

    #[test]
    fn test_parse_index_subscript() {
        let path = TreePath::parse("a.b[2].c").unwrap();
        assert_eq!(path.segments[1].subscripts, vec![Subscript::Index(2)]);
    }

    #[test]
    fn test_parse_slice_subscript() {
        let path = TreePath::parse("a.b[1:3]").unwrap();
        assert_eq!(
            path.segments[1].subscripts,
            vec![Subscript::Slice(Some(1), Some(3))]
        );
    }

    #[test]
    fn test_parse_open_ended_slices() {
        let path = TreePath::parse("b[:3]").unwrap();
        assert_eq!(
            path.segments[0].subscripts,
            vec![Subscript::Slice(None, Some(3))]
        );

        let path = TreePath::parse("b[1:]").unwrap();
        assert_eq!(
            path.segments[0].subscripts,
            vec![Subscript::Slice(Some(1), None)]
        );

        let path = TreePath::parse("b[:]").unwrap();
        assert_eq!(path.segments[0].subscripts, vec![Subscript::Slice(None, None)]);
    }

    #[test]
    fn test_parse_chained_subscripts() {
        let path = TreePath::parse("matrix[0][2]").unwrap();
        assert_eq!(
            path.segments[0].subscripts,
            vec![Subscript::Index(0), Subscript::Index(2)]
        );
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(TreePath::parse("").is_err());
        assert!(TreePath::parse("  ").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_segment() {
        assert!(TreePath::parse("a..b").is_err());
        assert!(TreePath::parse(".a").is_err());
        assert!(TreePath::parse("a.").is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_subscripts() {
        assert!(TreePath::parse("a[").is_err());
        assert!(TreePath::parse("a[]").is_err());
        assert!(TreePath::parse("a[x]").is_err());
        assert!(TreePath::parse("a[1]b").is_err());
        assert!(TreePath::parse("a]1[").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for expr in ["a.b.c", "a.b[2].c", "x[1:3]", "m[0][2]", "b[:3]", "b[1:]"] {
            let path = TreePath::parse(expr).unwrap();
            assert_eq!(path.to_string(), expr);
            assert_eq!(TreePath::parse(&path.to_string()).unwrap(), path);
        }
    }

    #[test]
    fn test_child() {
        let path = TreePath::parse("a.b").unwrap();
        let extended = path.child("c");
        assert_eq!(extended.to_string(), "a.b.c");
        assert_eq!(path.to_string(), "a.b");
    }
}
