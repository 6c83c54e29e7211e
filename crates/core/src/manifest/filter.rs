//! Capability filter expressions
//!
//! Auto features declare the features they depend on as LDAP-style filters in
//! their provisioning capability header, e.g.
//! `(&(type=osgi.subsystem.feature)(osgi.identity=com.example.servlet))`.
//! This module parses those expressions and evaluates them against a set of
//! string properties.
//!
//! Supported: `&`, `|`, `!`, `=`, `~=`, `>=`, `<=`, presence (`attr=*`) and
//! substring (`attr=pre*mid*post`) matches. Attribute names compare
//! case-insensitively. `\` escapes the next character in a value.

use crate::errors::FilterError;
use crate::version::Version;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// A parsed filter expression
#[derive(Debug, Clone)]
pub struct Filter {
    source: String,
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Present(String),
    Compare {
        attr: String,
        op: CompareOp,
        value: String,
    },
    Substring {
        attr: String,
        pattern: Regex,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

impl Filter {
    pub fn parse(source: &str) -> Result<Self, FilterError> {
        let mut parser = Parser {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        };
        parser.skip_ws();
        let root = parser.filter()?;
        parser.skip_ws();
        if parser.pos != parser.chars.len() {
            return Err(parser.error("trailing characters after filter"));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, properties: &HashMap<String, String>) -> bool {
        self.root.matches(properties)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Node {
    fn matches(&self, properties: &HashMap<String, String>) -> bool {
        match self {
            Node::And(children) => children.iter().all(|c| c.matches(properties)),
            Node::Or(children) => children.iter().any(|c| c.matches(properties)),
            Node::Not(child) => !child.matches(properties),
            Node::Present(attr) => lookup(properties, attr).is_some(),
            Node::Substring { attr, pattern } => {
                lookup(properties, attr).is_some_and(|v| pattern.is_match(v))
            }
            Node::Compare { attr, op, value } => {
                let Some(actual) = lookup(properties, attr) else {
                    return false;
                };
                match op {
                    CompareOp::Equal => actual == value,
                    CompareOp::Approx => normalize_approx(actual) == normalize_approx(value),
                    CompareOp::GreaterEq => compare_values(actual, value) != Ordering::Less,
                    CompareOp::LessEq => compare_values(actual, value) != Ordering::Greater,
                }
            }
        }
    }
}

fn lookup<'a>(properties: &'a HashMap<String, String>, attr: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(attr))
        .map(|(_, value)| value.as_str())
}

fn normalize_approx(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn compare_values(actual: &str, expected: &str) -> Ordering {
    if let (Ok(a), Ok(b)) = (actual.trim().parse::<i64>(), expected.trim().parse::<i64>()) {
        return a.cmp(&b);
    }
    if let (Ok(a), Ok(b)) = (Version::parse(actual), Version::parse(expected)) {
        return a.cmp(&b);
    }
    actual.cmp(expected)
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> FilterError {
        FilterError::Parse {
            filter: self.source.to_string(),
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn filter(&mut self) -> Result<Node, FilterError> {
        self.expect('(')?;
        self.skip_ws();
        let node = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Node::And(self.filter_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Node::Or(self.filter_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_ws();
                Node::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.skip_ws();
        self.expect(')')?;
        Ok(node)
    }

    fn filter_list(&mut self) -> Result<Vec<Node>, FilterError> {
        let mut nodes = Vec::new();
        self.skip_ws();
        while self.peek() == Some('(') {
            nodes.push(self.filter()?);
            self.skip_ws();
        }
        if nodes.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(nodes)
    }

    fn item(&mut self) -> Result<Node, FilterError> {
        let mut attr = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '>' | '<' | '(' | ')') {
                break;
            }
            attr.push(c);
            self.pos += 1;
        }
        let attr = attr.trim().to_string();
        if attr.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                CompareOp::Equal
            }
            Some(c @ ('~' | '>' | '<')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '~' => CompareOp::Approx,
                    '>' => CompareOp::GreaterEq,
                    _ => CompareOp::LessEq,
                }
            }
            _ => return Err(self.error("expected comparison operator")),
        };

        // pieces separated by unescaped '*'
        let mut pieces = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unexpected end of value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    let Some(escaped) = self.peek() else {
                        return Err(self.error("dangling escape"));
                    };
                    if let Some(piece) = pieces.last_mut() {
                        piece.push(escaped);
                    }
                    self.pos += 1;
                }
                Some('*') => {
                    pieces.push(String::new());
                    self.pos += 1;
                }
                Some(c) => {
                    if let Some(piece) = pieces.last_mut() {
                        piece.push(c);
                    }
                    self.pos += 1;
                }
            }
        }

        if pieces.len() == 1 {
            let value = pieces.pop().unwrap_or_default();
            return Ok(Node::Compare { attr, op, value });
        }
        if op != CompareOp::Equal {
            return Err(self.error("wildcards are only allowed with '='"));
        }
        if pieces.len() == 2 && pieces.iter().all(String::is_empty) {
            return Ok(Node::Present(attr));
        }

        let body = pieces
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join(".*");
        let pattern = Regex::new(&format!("^(?s:{body})$"))
            .map_err(|e| self.error(&format!("invalid substring pattern: {e}")))?;
        Ok(Node::Substring { attr, pattern })
    }
}
