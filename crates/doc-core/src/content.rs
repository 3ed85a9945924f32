//! Content rules: which children a node type accepts and how many.
//!
//! A rule is a whitespace-separated sequence of terms. Each term names a node
//! type or a group, optionally as a parenthesised `|` alternation, followed by
//! an optional quantifier (`?`, `*`, `+`). The empty rule accepts no
//! children. Matching is greedy per term, so rules must not put a broad term
//! in front of a narrower one it would swallow.

use thiserror::Error;

use crate::model::Node;
use crate::registry::PluginRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("invalid content rule `{rule}`: {reason}")]
    InvalidRule { rule: String, reason: String },
    #[error("unknown block type: {0}")]
    UnknownType(String),
    #[error("`{parent}` does not accept `{child}` at position {index}")]
    Unexpected {
        parent: String,
        child: String,
        index: usize,
    },
    #[error("`{parent}` requires at least {min} `{term}` (found {found})")]
    TooFew {
        parent: String,
        term: String,
        min: usize,
        found: usize,
    },
    #[error("`{kind}` has invalid attribute `{attr}`")]
    InvalidAttr { kind: String, attr: String },
    #[error("`{kind}` does not declare attribute `{attr}`")]
    UnknownAttr { kind: String, attr: String },
    #[error("unknown mark `{0}`")]
    UnknownMark(String),
    #[error("`{0}` is atomic and cannot hold children")]
    AtomicWithChildren(String),
    #[error("`{0}` is a container and cannot be stored as an atomic node")]
    NotAtomic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ContentTerm {
    names: Vec<String>,
    min: usize,
    max: Option<usize>,
}

impl ContentTerm {
    fn label(&self) -> String {
        self.names.join(" | ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRule {
    source: String,
    terms: Vec<ContentTerm>,
}

impl ContentRule {
    pub fn empty() -> Self {
        Self {
            source: String::new(),
            terms: Vec::new(),
        }
    }

    pub fn parse(source: &str) -> Result<Self, ContentError> {
        let invalid = |reason: &str| ContentError::InvalidRule {
            rule: source.to_string(),
            reason: reason.to_string(),
        };

        let mut terms = Vec::new();
        let chars: Vec<char> = source.chars().collect();
        let mut ix = 0usize;

        while ix < chars.len() {
            if chars[ix].is_whitespace() {
                ix += 1;
                continue;
            }

            let mut names = Vec::new();
            if chars[ix] == '(' {
                ix += 1;
                loop {
                    while ix < chars.len() && chars[ix].is_whitespace() {
                        ix += 1;
                    }
                    let (name, next) = read_name(&chars, ix);
                    if name.is_empty() {
                        return Err(invalid("expected a name inside parentheses"));
                    }
                    names.push(name);
                    ix = next;
                    while ix < chars.len() && chars[ix].is_whitespace() {
                        ix += 1;
                    }
                    match chars.get(ix) {
                        Some('|') => ix += 1,
                        Some(')') => {
                            ix += 1;
                            break;
                        }
                        _ => return Err(invalid("unterminated group")),
                    }
                }
            } else {
                let (name, next) = read_name(&chars, ix);
                if name.is_empty() {
                    return Err(invalid(&format!("unexpected character `{}`", chars[ix])));
                }
                names.push(name);
                ix = next;
            }

            let (min, max) = match chars.get(ix) {
                Some('?') => {
                    ix += 1;
                    (0, Some(1))
                }
                Some('*') => {
                    ix += 1;
                    (0, None)
                }
                Some('+') => {
                    ix += 1;
                    (1, None)
                }
                _ => (1, Some(1)),
            };

            terms.push(ContentTerm { names, min, max });
        }

        Ok(Self {
            source: source.trim().to_string(),
            terms,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the rule admits no children at all.
    pub fn is_leaf(&self) -> bool {
        self.terms.is_empty()
    }

    /// True when every term names text or the inline group: the node holds
    /// runs of marked text rather than blocks.
    pub fn is_inline(&self) -> bool {
        !self.terms.is_empty()
            && self
                .terms
                .iter()
                .flat_map(|t| t.names.iter())
                .all(|name| name == "text" || name == "inline")
    }

    /// Whether some term of the rule could hold `kind` (ignoring counts).
    pub fn mentions(&self, kind: &str, group: Option<&str>) -> bool {
        self.terms
            .iter()
            .flat_map(|t| t.names.iter())
            .any(|name| name == kind || Some(name.as_str()) == group)
    }

    /// Checks `children` against the rule. `parent` is only used for error
    /// messages.
    pub fn check(
        &self,
        parent: &str,
        children: &[Node],
        registry: &PluginRegistry,
    ) -> Result<(), ContentError> {
        let mut ix = 0usize;
        for term in &self.terms {
            let mut found = 0usize;
            while ix < children.len() && term.max.is_none_or(|max| found < max) {
                if !term_accepts(term, &children[ix], registry) {
                    break;
                }
                found += 1;
                ix += 1;
            }
            if found < term.min {
                return Err(ContentError::TooFew {
                    parent: parent.to_string(),
                    term: term.label(),
                    min: term.min,
                    found,
                });
            }
        }

        if let Some(extra) = children.get(ix) {
            return Err(ContentError::Unexpected {
                parent: parent.to_string(),
                child: extra.kind().to_string(),
                index: ix,
            });
        }
        Ok(())
    }
}

fn term_accepts(term: &ContentTerm, node: &Node, registry: &PluginRegistry) -> bool {
    let kind = node.kind();
    let group = match node {
        Node::Text(_) => Some("inline"),
        Node::Opaque(_) => Some("block"),
        Node::Element(_) | Node::Void(_) => registry.get(kind).and_then(|t| t.group.as_deref()),
    };
    term.names
        .iter()
        .any(|name| name == kind || Some(name.as_str()) == group)
}

fn read_name(chars: &[char], start: usize) -> (String, usize) {
    let mut ix = start;
    while ix < chars.len() && (chars[ix].is_ascii_alphanumeric() || chars[ix] == '_') {
        ix += 1;
    }
    (chars[start..ix].iter().collect(), ix)
}
