//! SCIM filter expressions (RFC 7644 §3.4.2.2)
//!
//! Hand-rolled lexer and recursive-descent parser producing a small AST:
//! comparisons, `and`/`or`/`not`, and parenthesized groups over dotted
//! attribute paths. Rendering an AST back to text preserves semantics.

use crate::error::ScimError;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Co,
    Sw,
    Ew,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "co" => Some(Self::Co),
            "sw" => Some(Self::Sw),
            "ew" => Some(Self::Ew),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            _ => None,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Co => "co",
            Self::Sw => "sw",
            Self::Ew => "ew",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Self::Num(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Null => write!(f, "null"),
        }
    }
}

/// Dotted attribute path, e.g. `name.givenName`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPath {
    pub segments: Vec<String>,
}

impl AttrPath {
    fn parse(raw: &str) -> Result<Self, ScimError> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(ScimError::invalid_filter(format!(
                "malformed attribute path \"{}\"",
                raw
            )));
        }
        for segment in &segments {
            let mut chars = segment.chars();
            let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
            let tail_ok = segment
                .chars()
                .skip(1)
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !head_ok || !tail_ok {
                return Err(ScimError::invalid_filter(format!(
                    "malformed attribute path \"{}\"",
                    raw
                )));
            }
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Compare {
        attr: AttrPath,
        op: CompareOp,
        value: Literal,
    },
    /// `attr pr`: attribute present and non-null.
    Present { attr: AttrPath },
    Logical {
        op: LogicalOp,
        children: Vec<FilterNode>,
    },
    Not { child: Box<FilterNode> },
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { attr, op, value } => write!(f, "{} {} {}", attr, op, value),
            Self::Present { attr } => write!(f, "{} pr", attr),
            Self::Logical { op, children } => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|c| match c {
                        FilterNode::Logical { .. } => format!("({})", c),
                        _ => c.to_string(),
                    })
                    .collect();
                write!(f, "{}", parts.join(&format!(" {} ", op)))
            }
            Self::Not { child } => write!(f, "not ({})", child),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ScimError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => s.push('"'),
                            Some('\\') => s.push('\\'),
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => {
                                return Err(ScimError::invalid_filter(format!(
                                    "unknown escape \\{}",
                                    other
                                )))
                            }
                            None => {
                                return Err(ScimError::invalid_filter("unterminated string"))
                            }
                        },
                        Some(other) => s.push(other),
                        None => return Err(ScimError::invalid_filter("unterminated string")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '[' | ']' => {
                return Err(ScimError::invalid_filter(
                    "value-path selectors are not supported in filters",
                ));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | ':') {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if word.is_empty() {
                    return Err(ScimError::invalid_filter(format!(
                        "unexpected character '{}'",
                        c
                    )));
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    // orExpr = andExpr ("or" andExpr)*
    fn parse_or(&mut self) -> Result<FilterNode, ScimError> {
        let mut children = vec![self.parse_and()?];
        while self.peek_keyword("or") {
            self.next();
            children.push(self.parse_and()?);
        }
        if children.len() == 1 {
            Ok(children.pop().expect("one child"))
        } else {
            Ok(FilterNode::Logical {
                op: LogicalOp::Or,
                children,
            })
        }
    }

    // andExpr = unary ("and" unary)*
    fn parse_and(&mut self) -> Result<FilterNode, ScimError> {
        let mut children = vec![self.parse_unary()?];
        while self.peek_keyword("and") {
            self.next();
            children.push(self.parse_unary()?);
        }
        if children.len() == 1 {
            Ok(children.pop().expect("one child"))
        } else {
            Ok(FilterNode::Logical {
                op: LogicalOp::And,
                children,
            })
        }
    }

    // unary = "not" "(" orExpr ")" | "(" orExpr ")" | comparison
    fn parse_unary(&mut self) -> Result<FilterNode, ScimError> {
        if self.peek_keyword("not") {
            self.next();
            self.expect(Token::LParen)?;
            let child = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(FilterNode::Not {
                child: Box::new(child),
            });
        }
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    // comparison = attrPath "pr" | attrPath op literal
    fn parse_comparison(&mut self) -> Result<FilterNode, ScimError> {
        let attr = match self.next() {
            Some(Token::Word(w)) => AttrPath::parse(&w)?,
            other => {
                return Err(ScimError::invalid_filter(format!(
                    "expected attribute path, found {:?}",
                    other
                )))
            }
        };

        let op_word = match self.next() {
            Some(Token::Word(w)) => w,
            other => {
                return Err(ScimError::invalid_filter(format!(
                    "expected operator after {}, found {:?}",
                    attr, other
                )))
            }
        };

        if op_word.eq_ignore_ascii_case("pr") {
            return Ok(FilterNode::Present { attr });
        }

        let op = CompareOp::parse(&op_word).ok_or_else(|| {
            ScimError::invalid_filter(format!("unknown operator \"{}\"", op_word))
        })?;

        let value = match self.next() {
            Some(Token::Str(s)) => Literal::Str(s),
            Some(Token::Word(w)) => {
                if w.eq_ignore_ascii_case("true") {
                    Literal::Bool(true)
                } else if w.eq_ignore_ascii_case("false") {
                    Literal::Bool(false)
                } else if w.eq_ignore_ascii_case("null") {
                    Literal::Null
                } else if let Ok(n) = w.parse::<f64>() {
                    Literal::Num(n)
                } else {
                    return Err(ScimError::invalid_filter(format!(
                        "invalid literal \"{}\"",
                        w
                    )));
                }
            }
            other => {
                return Err(ScimError::invalid_filter(format!(
                    "expected literal, found {:?}",
                    other
                )))
            }
        };

        Ok(FilterNode::Compare { attr, op, value })
    }

    fn expect(&mut self, token: Token) -> Result<(), ScimError> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => Err(ScimError::invalid_filter(format!(
                "expected {:?}, found {:?}",
                token, other
            ))),
        }
    }
}

/// Parse a filter expression into its AST.
pub fn parse(input: &str) -> Result<FilterNode, ScimError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ScimError::invalid_filter("empty filter"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ScimError::invalid_filter("trailing tokens after filter"));
    }
    Ok(node)
}

/// Render an AST back to filter text. `parse(render(ast))` preserves
/// semantics.
pub fn render(node: &FilterNode) -> String {
    node.to_string()
}

/// Evaluate a filter against a SCIM resource representation. Attribute
/// names match case-insensitively; string comparisons are case-insensitive
/// (SCIM default, caseExact=false).
pub fn matches(node: &FilterNode, resource: &Value) -> bool {
    match node {
        FilterNode::Logical { op, children } => match op {
            LogicalOp::And => children.iter().all(|c| matches(c, resource)),
            LogicalOp::Or => children.iter().any(|c| matches(c, resource)),
        },
        FilterNode::Not { child } => !matches(child, resource),
        FilterNode::Present { attr } => resolve(resource, attr)
            .map(|v| !v.is_null())
            .unwrap_or(false),
        FilterNode::Compare { attr, op, value } => resolve(resource, attr)
            .map(|actual| compare(&actual, *op, value))
            .unwrap_or(false),
    }
}

fn resolve(resource: &Value, attr: &AttrPath) -> Option<Value> {
    let mut current = resource.clone();
    for segment in &attr.segments {
        let obj = current.as_object()?;
        let (_, next) = obj
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(segment))?;
        current = next.clone();
    }
    Some(current)
}

fn compare(actual: &Value, op: CompareOp, literal: &Literal) -> bool {
    // Multi-valued attributes match when any element matches.
    if let Value::Array(items) = actual {
        return items.iter().any(|item| compare(item, op, literal));
    }

    match (actual, literal) {
        (Value::String(a), Literal::Str(b)) => {
            let a_low = a.to_lowercase();
            let b_low = b.to_lowercase();
            match op {
                CompareOp::Eq => a_low == b_low,
                CompareOp::Ne => a_low != b_low,
                CompareOp::Co => a_low.contains(&b_low),
                CompareOp::Sw => a_low.starts_with(&b_low),
                CompareOp::Ew => a_low.ends_with(&b_low),
                CompareOp::Gt => a_low > b_low,
                CompareOp::Ge => a_low >= b_low,
                CompareOp::Lt => a_low < b_low,
                CompareOp::Le => a_low <= b_low,
            }
        }
        (Value::Number(a), Literal::Num(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            match op {
                CompareOp::Eq => a == *b,
                CompareOp::Ne => a != *b,
                CompareOp::Gt => a > *b,
                CompareOp::Ge => a >= *b,
                CompareOp::Lt => a < *b,
                CompareOp::Le => a <= *b,
                _ => false,
            }
        }
        (Value::Bool(a), Literal::Bool(b)) => match op {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => false,
        },
        (Value::Null, Literal::Null) => matches!(op, CompareOp::Eq),
        _ => matches!(op, CompareOp::Ne),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_simple_comparison() {
        let node = parse(r#"userName eq "jdoe""#).unwrap();
        assert_eq!(
            node,
            FilterNode::Compare {
                attr: AttrPath {
                    segments: vec!["userName".to_string()]
                },
                op: CompareOp::Eq,
                value: Literal::Str("jdoe".to_string()),
            }
        );
    }

    #[test]
    fn parses_boolean_logic_with_grouping() {
        let node = parse(r#"active eq true and (userName sw "j" or emails co "example.org")"#)
            .unwrap();
        match &node {
            FilterNode::Logical { op, children } => {
                assert_eq!(*op, LogicalOp::And);
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], FilterNode::Logical { op: LogicalOp::Or, .. }));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn parses_not_and_pr() {
        let node = parse(r#"not (emails pr)"#).unwrap();
        assert!(matches!(node, FilterNode::Not { .. }));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let node = parse(r#"a eq 1 or b eq 2 and c eq 3"#).unwrap();
        match node {
            FilterNode::Logical { op, children } => {
                assert_eq!(op, LogicalOp::Or);
                assert!(matches!(
                    &children[1],
                    FilterNode::Logical { op: LogicalOp::And, .. }
                ));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_filters() {
        assert!(parse("").is_err());
        assert!(parse(r#"userName"#).is_err());
        assert!(parse(r#"userName eq"#).is_err());
        assert!(parse(r#"userName zz "x""#).is_err());
        assert!(parse(r#"(userName eq "a""#).is_err());
        assert!(parse(r#"emails[type eq "work"] pr"#).is_err());
    }

    #[test]
    fn evaluation_on_fixed_resources() {
        let user = json!({
            "userName": "JDoe",
            "active": true,
            "name": {"givenName": "Jane", "familyName": "Doe"},
            "emails": [{"value": "jane@example.com"}, {"value": "jdoe@corp.example"}]
        });

        assert!(matches(&parse(r#"userName eq "jdoe""#).unwrap(), &user));
        assert!(matches(&parse(r#"name.givenName sw "Ja""#).unwrap(), &user));
        assert!(matches(&parse(r#"emails.value co "corp""#).unwrap(), &user));
        assert!(matches(&parse(r#"active eq true"#).unwrap(), &user));
        assert!(!matches(&parse(r#"name.familyName eq "Smith""#).unwrap(), &user));
        assert!(matches(&parse(r#"not (nickName pr)"#).unwrap(), &user));
    }

    #[test]
    fn render_roundtrip_preserves_result_set() {
        let users: Vec<Value> = vec![
            json!({"userName": "jdoe", "active": true, "age": 31}),
            json!({"userName": "asmith", "active": false, "age": 45}),
            json!({"userName": "jroe", "active": true, "age": 19}),
        ];

        let filters = [
            r#"userName sw "j""#,
            r#"active eq true and age gt 20"#,
            r#"not (active eq true) or userName eq "jroe""#,
            r#"age ge 19 and age le 45 and userName co "o""#,
        ];

        for raw in filters {
            let ast = parse(raw).unwrap();
            let rendered = render(&ast);
            let reparsed = parse(&rendered).unwrap();
            let before: Vec<bool> = users.iter().map(|u| matches(&ast, u)).collect();
            let after: Vec<bool> = users.iter().map(|u| matches(&reparsed, u)).collect();
            assert_eq!(before, after, "round-trip changed semantics for {}", raw);
        }
    }

    proptest::proptest! {
        // Render -> parse is the identity on the AST for word-ish strings.
        #[test]
        fn roundtrip_identity(attr in "[a-z][a-zA-Z0-9]{0,8}", value in "[a-zA-Z0-9 ]{0,12}") {
            let ast = FilterNode::Compare {
                attr: AttrPath { segments: vec![attr] },
                op: CompareOp::Eq,
                value: Literal::Str(value),
            };
            let reparsed = parse(&render(&ast)).unwrap();
            proptest::prop_assert_eq!(ast, reparsed);
        }
    }
}
