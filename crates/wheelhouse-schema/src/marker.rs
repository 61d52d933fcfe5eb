//! Environment markers (`python_version >= "3.8" and extra == "socks"`).

use crate::name::canonicalize_name;
use crate::specifier::Specifier;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Variable → value map a marker is evaluated against.
pub type MarkerContext = HashMap<String, String>;

/// Errors produced while parsing or evaluating markers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    /// The marker text does not follow the grammar.
    #[error("invalid marker '{input}': {reason}")]
    Syntax {
        /// The full marker text.
        input: String,
        /// What went wrong.
        reason: String,
    },

    /// The marker names a variable the context does not define.
    #[error("undefined marker variable '{0}'")]
    UndefinedVariable(String),

    /// The operator cannot compare the two values.
    #[error("cannot evaluate '{lhs}' {op} '{rhs}'")]
    InvalidComparison {
        /// Left-hand value.
        lhs: String,
        /// Operator.
        op: MarkerOperator,
        /// Right-hand value.
        rhs: String,
    },
}

const VARIABLES: &[&str] = &[
    "implementation_name",
    "implementation_version",
    "os_name",
    "platform_machine",
    "platform_python_implementation",
    "platform_release",
    "platform_system",
    "platform_version",
    "python_full_version",
    "python_version",
    "sys_platform",
    "extra",
];

// Legacy spellings still found in old wheels.
fn variable_alias(name: &str) -> &str {
    match name {
        "os.name" => "os_name",
        "sys.platform" => "sys_platform",
        "platform.version" => "platform_version",
        "platform.machine" => "platform_machine",
        "platform.python_implementation" | "python_implementation" => {
            "platform_python_implementation"
        }
        other => other,
    }
}

/// Comparison operator inside a marker expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerOperator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `~=`
    Compatible,
    /// `===`
    ArbitraryEqual,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

impl MarkerOperator {
    fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Compatible => "~=",
            Self::ArbitraryEqual => "===",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

impl fmt::Display for MarkerOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerValue {
    /// An environment variable such as `python_version`.
    Variable(String),
    /// A quoted string literal.
    Literal(String),
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => f.write_str(name),
            Self::Literal(text) if text.contains('"') => write!(f, "'{text}'"),
            Self::Literal(text) => write!(f, "\"{text}\""),
        }
    }
}

/// A parsed marker expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerTree {
    /// `lhs op rhs`
    Expression {
        /// Left operand.
        lhs: MarkerValue,
        /// Operator.
        op: MarkerOperator,
        /// Right operand.
        rhs: MarkerValue,
    },
    /// Every branch must hold.
    And(Vec<MarkerTree>),
    /// At least one branch must hold.
    Or(Vec<MarkerTree>),
}

impl MarkerTree {
    /// Parse marker text.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::Syntax`] when the text does not follow the
    /// marker grammar or names an unknown variable.
    pub fn parse(input: &str) -> Result<Self, MarkerError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
        };
        let tree = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(tree)
    }

    /// Evaluate against `context`.
    ///
    /// A missing `extra` variable evaluates as the empty string; any other
    /// missing variable is an error.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError::UndefinedVariable`] or
    /// [`MarkerError::InvalidComparison`].
    pub fn evaluate(&self, context: &MarkerContext) -> Result<bool, MarkerError> {
        match self {
            Self::And(branches) => {
                for branch in branches {
                    if !branch.evaluate(context)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(branches) => {
                for branch in branches {
                    if branch.evaluate(context)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Expression { lhs, op, rhs } => {
                let is_extra = matches!(lhs, MarkerValue::Variable(v) if v == "extra")
                    || matches!(rhs, MarkerValue::Variable(v) if v == "extra");
                let mut left = resolve(lhs, context)?;
                let mut right = resolve(rhs, context)?;
                if is_extra {
                    left = canonicalize_name(&left);
                    right = canonicalize_name(&right);
                }
                compare(&left, *op, &right)
            }
        }
    }

    /// Evaluate once per extra (and once with no extra) and report whether
    /// any evaluation holds.
    ///
    /// # Errors
    ///
    /// Propagates the first evaluation error.
    pub fn evaluate_with_extras<'a, I>(
        &self,
        base: &MarkerContext,
        extras: I,
    ) -> Result<bool, MarkerError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut context = base.clone();
        context.insert("extra".to_string(), String::new());
        if self.evaluate(&context)? {
            return Ok(true);
        }
        for extra in extras {
            context.insert("extra".to_string(), extra.to_string());
            if self.evaluate(&context)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `true` when the expression references the `extra` variable.
    pub fn mentions_extra(&self) -> bool {
        match self {
            Self::Expression { lhs, rhs, .. } => [lhs, rhs]
                .iter()
                .any(|v| matches!(v, MarkerValue::Variable(name) if name == "extra")),
            Self::And(branches) | Self::Or(branches) => {
                branches.iter().any(MarkerTree::mentions_extra)
            }
        }
    }
}

fn resolve(value: &MarkerValue, context: &MarkerContext) -> Result<String, MarkerError> {
    match value {
        MarkerValue::Literal(text) => Ok(text.clone()),
        MarkerValue::Variable(name) => match context.get(name) {
            Some(v) => Ok(v.clone()),
            None if name == "extra" => Ok(String::new()),
            None => Err(MarkerError::UndefinedVariable(name.clone())),
        },
    }
}

fn compare(lhs: &str, op: MarkerOperator, rhs: &str) -> Result<bool, MarkerError> {
    if !matches!(op, MarkerOperator::In | MarkerOperator::NotIn)
        && let (Ok(spec), Ok(version)) = (
            Specifier::parse(&format!("{op}{rhs}")),
            Version::parse(lhs),
        )
    {
        return Ok(spec.matches(&version));
    }

    Ok(match op {
        MarkerOperator::Equal => lhs == rhs,
        MarkerOperator::NotEqual => lhs != rhs,
        MarkerOperator::Less => lhs < rhs,
        MarkerOperator::LessEqual => lhs <= rhs,
        MarkerOperator::Greater => lhs > rhs,
        MarkerOperator::GreaterEqual => lhs >= rhs,
        MarkerOperator::In => rhs.contains(lhs),
        MarkerOperator::NotIn => !rhs.contains(lhs),
        MarkerOperator::Compatible | MarkerOperator::ArbitraryEqual => {
            return Err(MarkerError::InvalidComparison {
                lhs: lhs.to_string(),
                op,
                rhs: rhs.to_string(),
            });
        }
    })
}

impl fmt::Display for MarkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Self::And(branches) => {
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    if matches!(branch, Self::Or(_)) {
                        write!(f, "({branch})")?;
                    } else {
                        write!(f, "{branch}")?;
                    }
                }
                Ok(())
            }
            Self::Or(branches) => {
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{branch}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for MarkerTree {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Op(MarkerOperator),
    Ident(String),
    Str(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, MarkerError> {
    let syntax = |reason: &str| MarkerError::Syntax {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| syntax("unterminated string"))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '=' | '!' | '<' | '>' | '~' => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let (op, len) = if rest.starts_with("===") {
                    (MarkerOperator::ArbitraryEqual, 3)
                } else if rest.starts_with("==") {
                    (MarkerOperator::Equal, 2)
                } else if rest.starts_with("!=") {
                    (MarkerOperator::NotEqual, 2)
                } else if rest.starts_with("<=") {
                    (MarkerOperator::LessEqual, 2)
                } else if rest.starts_with(">=") {
                    (MarkerOperator::GreaterEqual, 2)
                } else if rest.starts_with("~=") {
                    (MarkerOperator::Compatible, 2)
                } else if c == '<' {
                    (MarkerOperator::Less, 1)
                } else if c == '>' {
                    (MarkerOperator::Greater, 1)
                } else {
                    return Err(syntax("unknown operator"));
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "in" => tokens.push(Token::Op(MarkerOperator::In)),
                    "not" => {
                        if tokens_after_not_is_in(&chars, i) {
                            while chars[i].is_whitespace() {
                                i += 1;
                            }
                            i += 2;
                            tokens.push(Token::Op(MarkerOperator::NotIn));
                        } else {
                            return Err(syntax("expected 'in' after 'not'"));
                        }
                    }
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            _ => return Err(syntax("unexpected character")),
        }
    }
    Ok(tokens)
}

fn tokens_after_not_is_in(chars: &[char], mut i: usize) -> bool {
    let start = i;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i > start
        && chars.get(i) == Some(&'i')
        && chars.get(i + 1) == Some(&'n')
        && chars
            .get(i + 2)
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> MarkerError {
        MarkerError::Syntax {
            input: self.input.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<MarkerTree, MarkerError> {
        let mut branches = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            branches.push(self.parse_and()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            MarkerTree::Or(branches)
        })
    }

    fn parse_and(&mut self) -> Result<MarkerTree, MarkerError> {
        let mut branches = vec![self.parse_atom()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            branches.push(self.parse_atom()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            MarkerTree::And(branches)
        })
    }

    fn parse_atom(&mut self) -> Result<MarkerTree, MarkerError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            if self.advance() != Some(Token::RParen) {
                return Err(self.error("expected ')'"));
            }
            return Ok(inner);
        }
        let lhs = self.parse_value()?;
        let op = match self.advance() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error("expected a comparison operator")),
        };
        let rhs = self.parse_value()?;
        Ok(MarkerTree::Expression { lhs, op, rhs })
    }

    fn parse_value(&mut self) -> Result<MarkerValue, MarkerError> {
        match self.advance() {
            Some(Token::Str(text)) => Ok(MarkerValue::Literal(text)),
            Some(Token::Ident(name)) => {
                let name = variable_alias(&name);
                if VARIABLES.contains(&name) {
                    Ok(MarkerValue::Variable(name.to_string()))
                } else {
                    Err(self.error(&format!("unknown variable '{name}'")))
                }
            }
            _ => Err(self.error("expected a variable or a quoted string")),
        }
    }
}

/// The host values markers are evaluated against.
///
/// Defaults describe a CPython 3.12 interpreter on `x86_64` Linux.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerEnvironment {
    /// `sys.implementation.name`
    pub implementation_name: String,
    /// `sys.implementation.version`
    pub implementation_version: String,
    /// `os.name`
    pub os_name: String,
    /// `platform.machine()`
    pub platform_machine: String,
    /// `platform.python_implementation()`
    pub platform_python_implementation: String,
    /// `platform.release()`
    pub platform_release: String,
    /// `platform.system()`
    pub platform_system: String,
    /// `platform.version()`
    pub platform_version: String,
    /// Full interpreter version, e.g. `3.12.1`.
    pub python_full_version: String,
    /// `major.minor` interpreter version.
    pub python_version: String,
    /// `sys.platform`
    pub sys_platform: String,
}

impl Default for MarkerEnvironment {
    fn default() -> Self {
        Self {
            implementation_name: "cpython".to_string(),
            implementation_version: "3.12.0".to_string(),
            os_name: "posix".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: String::new(),
            platform_system: "Linux".to_string(),
            platform_version: String::new(),
            python_full_version: "3.12.0".to_string(),
            python_version: "3.12".to_string(),
            sys_platform: "linux".to_string(),
        }
    }
}

impl MarkerEnvironment {
    /// Build an evaluation context, optionally with an `extra` value.
    pub fn to_context(&self, extra: Option<&str>) -> MarkerContext {
        let pairs = [
            ("implementation_name", &self.implementation_name),
            ("implementation_version", &self.implementation_version),
            ("os_name", &self.os_name),
            ("platform_machine", &self.platform_machine),
            (
                "platform_python_implementation",
                &self.platform_python_implementation,
            ),
            ("platform_release", &self.platform_release),
            ("platform_system", &self.platform_system),
            ("platform_version", &self.platform_version),
            ("python_full_version", &self.python_full_version),
            ("python_version", &self.python_version),
            ("sys_platform", &self.sys_platform),
        ];
        let mut context: MarkerContext = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        context.insert("extra".to_string(), extra.unwrap_or_default().to_string());
        context
    }

    /// The `(major, minor)` pair of `python_version`, if it parses.
    pub fn python_minor(&self) -> Option<(u64, u64)> {
        let version = Version::parse(&self.python_version).ok()?;
        let release = version.release();
        Some((*release.first()?, release.get(1).copied().unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(marker: &str, extra: Option<&str>) -> bool {
        MarkerTree::parse(marker)
            .unwrap()
            .evaluate(&MarkerEnvironment::default().to_context(extra))
            .unwrap()
    }

    #[test]
    fn test_version_comparisons() {
        assert!(eval("python_version >= '3.8'", None));
        assert!(eval("python_version > '3.9'", None));
        assert!(!eval("python_version < '3.10'", None));
        assert!(eval("python_full_version ~= '3.12.0'", None));
    }

    #[test]
    fn test_string_comparisons() {
        assert!(eval("sys_platform == 'linux'", None));
        assert!(eval("os_name != \"nt\"", None));
        assert!(eval("'linux' in sys_platform", None));
        assert!(eval("platform_machine not in 'arm64 aarch64'", None));
        assert!(eval("os.name == 'posix'", None));
    }

    #[test]
    fn test_precedence_and_parentheses() {
        assert!(eval("os_name == 'nt' and sys_platform == 'win32' or os_name == 'posix'", None));
        assert!(!eval("os_name == 'nt' and (sys_platform == 'win32' or os_name == 'posix')", None));
    }

    #[test]
    fn test_extra_is_canonicalized() {
        assert!(eval("extra == 'Socks_Proxy'", Some("socks-proxy")));
        assert!(!eval("extra == 'socks'", None));
    }

    #[test]
    fn test_evaluate_with_extras() {
        let marker = MarkerTree::parse("extra == 'test' or extra == 'docs'").unwrap();
        let base = MarkerEnvironment::default().to_context(None);
        assert!(!marker.evaluate_with_extras(&base, Vec::<&str>::new()).unwrap());
        assert!(marker.evaluate_with_extras(&base, ["docs"]).unwrap());
        assert!(marker.mentions_extra());
    }

    #[test]
    fn test_errors() {
        assert!(MarkerTree::parse("python_version >=").is_err());
        assert!(MarkerTree::parse("unknown_var == '1'").is_err());
        assert!(MarkerTree::parse("(os_name == 'nt'").is_err());
        assert!(MarkerTree::parse("os_name == 'nt").is_err());

        let marker = MarkerTree::parse("os_name == 'nt'").unwrap();
        assert_eq!(
            marker.evaluate(&MarkerContext::new()),
            Err(MarkerError::UndefinedVariable("os_name".to_string()))
        );

        let marker = MarkerTree::parse("os_name ~= 'posix'").unwrap();
        assert!(marker.evaluate(&MarkerEnvironment::default().to_context(None)).is_err());
    }

    #[test]
    fn test_display() {
        let marker =
            MarkerTree::parse("python_version<'3.8' and (os_name=='nt' or extra=='x')").unwrap();
        assert_eq!(
            marker.to_string(),
            "python_version < \"3.8\" and (os_name == \"nt\" or extra == \"x\")"
        );
    }
}
