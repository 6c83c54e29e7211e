//! Header clause grammar
//!
//! Manifest headers such as `Subsystem-SymbolicName` and `Subsystem-Content`
//! hold comma-separated clauses. Each clause has one or more names followed by
//! `key=value` attributes and `key:=value` directives, separated by `;`.
//! Values may be double-quoted to protect `,` `;` and `=`.
//!
//! ```rust
//! use featurekit_core::manifest::header::parse_header;
//!
//! let clauses = parse_header(r#"com.example.a; version="[1,2)"; start-phase:=SERVICE, com.example.b"#);
//! assert_eq!(clauses.len(), 2);
//! assert_eq!(clauses[0].name(), "com.example.a");
//! assert_eq!(clauses[0].attribute("version"), Some("[1,2)"));
//! assert_eq!(clauses[0].directive("start-phase"), Some("SERVICE"));
//! ```

use indexmap::IndexMap;

/// One clause of a header value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderClause {
    pub names: Vec<String>,
    pub attributes: IndexMap<String, String>,
    pub directives: IndexMap<String, String>,
}

impl HeaderClause {
    /// First name of the clause
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn directive(&self, key: &str) -> Option<&str> {
        self.directives.get(key).map(String::as_str)
    }
}

/// Parse a header value into its clauses; empty clauses are dropped
pub fn parse_header(value: &str) -> Vec<HeaderClause> {
    split_unquoted(value, ',')
        .into_iter()
        .filter_map(|clause| parse_clause(&clause))
        .collect()
}

fn parse_clause(text: &str) -> Option<HeaderClause> {
    let mut clause = HeaderClause::default();

    for piece in split_unquoted(text, ';') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match find_unquoted(piece, '=') {
            Some(eq) => {
                let value = unquote(&piece[eq + 1..]);
                let key = &piece[..eq];
                if let Some(key) = key.strip_suffix(':') {
                    clause.directives.insert(key.trim().to_string(), value);
                } else {
                    // drop a `:Type` suffix such as `version:Version`
                    let key = key.split(':').next().unwrap_or(key);
                    clause.attributes.insert(key.trim().to_string(), value);
                }
            }
            None => clause.names.push(unquote(piece)),
        }
    }

    if clause.names.is_empty() && clause.attributes.is_empty() && clause.directives.is_empty() {
        None
    } else {
        Some(clause)
    }
}

/// Split a comma-separated list value, trimming and dropping empty items
pub fn split_list(value: &str) -> Vec<String> {
    split_unquoted(value, ',')
        .into_iter()
        .map(|item| unquote(&item))
        .filter(|item| !item.is_empty())
        .collect()
}

fn split_unquoted(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c == separator && !quoted => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn find_unquoted(text: &str, target: char) -> Option<usize> {
    let mut quoted = false;
    for (idx, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            c if c == target && !quoted => return Some(idx),
            _ => {}
        }
    }
    None
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}
