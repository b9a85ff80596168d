//! Query DSL
//!
//! Queries are dot-chained calls such as
//! `from(landing).to(purchase).visited(cart).visitedAny(promo,email).exclude(churn)`.
//! The same grammar (minus the path/selection calls) is used for the
//! conditions attached to `conditional_p` entries on edges.

use crate::error::ParseError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known DSL functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    From,
    To,
    Visited,
    VisitedAny,
    Exclude,
    Nodes,
    Compare,
    Context,
    Case,
    Window,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "from" => Some(Function::From),
            "to" => Some(Function::To),
            "visited" => Some(Function::Visited),
            "visitedAny" => Some(Function::VisitedAny),
            "exclude" => Some(Function::Exclude),
            "nodes" => Some(Function::Nodes),
            "compare" => Some(Function::Compare),
            "context" => Some(Function::Context),
            "case" => Some(Function::Case),
            "window" => Some(Function::Window),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Function::From => "from",
            Function::To => "to",
            Function::Visited => "visited",
            Function::VisitedAny => "visitedAny",
            Function::Exclude => "exclude",
            Function::Nodes => "nodes",
            Function::Compare => "compare",
            Function::Context => "context",
            Function::Case => "case",
            Function::Window => "window",
        }
    }

    /// Functions allowed inside an edge condition
    fn allowed_in_condition(&self) -> bool {
        matches!(
            self,
            Function::Visited
                | Function::VisitedAny
                | Function::Exclude
                | Function::Context
                | Function::Case
        )
    }
}

/// A path-constraining clause, kept in the order it was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "nodes", rename_all = "snake_case")]
pub enum Clause {
    Visited(Vec<String>),
    VisitedAny(Vec<String>),
    Exclude(Vec<String>),
}

/// `context(key:value)` filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFilter {
    pub key: String,
    pub value: String,
}

/// `case(case_id:variant)` selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSelector {
    pub case_id: String,
    pub variant: String,
}

/// `window(start:end)`; either bound may be open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Structured form of a DSL query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Nodes that must all be visited (one entry per id, across all calls)
    pub visited: Vec<String>,
    /// One group per `visitedAny` call
    pub visited_any: Vec<Vec<String>>,
    pub exclude: Vec<String>,
    pub nodes: Vec<String>,
    pub compare: Vec<String>,
    pub context: Vec<ContextFilter>,
    pub cases: Vec<CaseSelector>,
    pub window: Option<QueryWindow>,
    /// visited/visitedAny/exclude calls in written order
    pub clauses: Vec<Clause>,
}

impl ParsedQuery {
    /// Every node referenced by the selection, deduplicated in first-seen order.
    ///
    /// Excluded nodes are not part of the selection.
    pub fn selected_nodes(&self) -> Vec<String> {
        let mut selected: Vec<String> = Vec::new();
        let mut push = |id: &String| {
            if !selected.contains(id) {
                selected.push(id.clone());
            }
        };
        if let Some(from) = &self.from {
            push(from);
        }
        self.visited.iter().for_each(&mut push);
        self.visited_any.iter().flatten().for_each(&mut push);
        self.nodes.iter().for_each(&mut push);
        self.compare.iter().for_each(&mut push);
        if let Some(to) = &self.to {
            push(to);
        }
        selected
    }

    /// Copy with every node reference passed through `node` and every case
    /// id through `case`.
    pub fn renamed<N, C>(&self, node: N, case: C) -> ParsedQuery
    where
        N: Fn(&str) -> String,
        C: Fn(&str) -> String,
    {
        let ids = |list: &[String]| list.iter().map(|id| node(id)).collect::<Vec<_>>();
        ParsedQuery {
            from: self.from.as_deref().map(&node),
            to: self.to.as_deref().map(&node),
            visited: ids(&self.visited),
            visited_any: self.visited_any.iter().map(|group| ids(group)).collect(),
            exclude: ids(&self.exclude),
            nodes: ids(&self.nodes),
            compare: ids(&self.compare),
            context: self.context.clone(),
            cases: self
                .cases
                .iter()
                .map(|selector| CaseSelector {
                    case_id: case(&selector.case_id),
                    variant: selector.variant.clone(),
                })
                .collect(),
            window: self.window.clone(),
            clauses: self
                .clauses
                .iter()
                .map(|clause| match clause {
                    Clause::Visited(list) => Clause::Visited(ids(list)),
                    Clause::VisitedAny(list) => Clause::VisitedAny(ids(list)),
                    Clause::Exclude(list) => Clause::Exclude(ids(list)),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &ParsedQuery::default()
    }
}

fn join(ids: &[String]) -> String {
    ids.join(",")
}

fn format_date(date: &Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

impl fmt::Display for ParsedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(from) = &self.from {
            parts.push(format!("from({})", from));
        }
        if let Some(to) = &self.to {
            parts.push(format!("to({})", to));
        }
        for clause in &self.clauses {
            parts.push(match clause {
                Clause::Visited(ids) => format!("visited({})", join(ids)),
                Clause::VisitedAny(ids) => format!("visitedAny({})", join(ids)),
                Clause::Exclude(ids) => format!("exclude({})", join(ids)),
            });
        }
        if !self.nodes.is_empty() {
            parts.push(format!("nodes({})", join(&self.nodes)));
        }
        if !self.compare.is_empty() {
            parts.push(format!("compare({})", join(&self.compare)));
        }
        if !self.context.is_empty() {
            let pairs: Vec<String> = self
                .context
                .iter()
                .map(|c| format!("{}:{}", c.key, c.value))
                .collect();
            parts.push(format!("context({})", pairs.join(",")));
        }
        if !self.cases.is_empty() {
            let pairs: Vec<String> = self
                .cases
                .iter()
                .map(|c| format!("{}:{}", c.case_id, c.variant))
                .collect();
            parts.push(format!("case({})", pairs.join(",")));
        }
        if let Some(window) = &self.window {
            parts.push(format!(
                "window({}:{})",
                format_date(&window.start),
                format_date(&window.end)
            ));
        }
        write!(f, "{}", parts.join("."))
    }
}

/// A single `name(args)` call with source positions
struct Call {
    function: Function,
    name_pos: usize,
    args: Vec<(usize, String)>,
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Scanner { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn rest_fragment(&self) -> String {
        self.input[self.pos..].chars().take(16).collect()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(message, self.pos, self.rest_fragment())
    }

    fn calls(&mut self) -> Result<Vec<Call>, ParseError> {
        let mut calls = Vec::new();
        self.skip_ws();
        if self.at_end() {
            return Ok(calls);
        }

        loop {
            self.skip_ws();
            calls.push(self.call()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some('.') => {
                    self.bump();
                }
                Some(')') => return Err(self.error("Unbalanced parenthesis: unexpected ')'")),
                Some(_) => return Err(self.error("Expected '.' between calls")),
            }
        }

        Ok(calls)
    }

    fn call(&mut self) -> Result<Call, ParseError> {
        let name_pos = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let name = &self.input[name_pos..self.pos];
        if name.is_empty() {
            return Err(self.error("Expected function name"));
        }
        let function = Function::lookup(name).ok_or_else(|| {
            ParseError::syntax(format!("Unknown function '{}'", name), name_pos, name)
        })?;

        self.skip_ws();
        if self.peek() != Some('(') {
            return Err(self.error(format!("Expected '(' after '{}'", name)));
        }
        self.bump();

        let mut args = Vec::new();
        let mut arg_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::syntax(
                        format!("Unbalanced parenthesis: '{}(' is never closed", name),
                        name_pos,
                        &self.input[name_pos..],
                    ))
                }
                Some('(') => return Err(self.error("Unbalanced parenthesis: unexpected '('")),
                Some(',') | Some(')') => {
                    let raw = &self.input[arg_start..self.pos];
                    let trimmed = raw.trim();
                    let offset = arg_start + (raw.len() - raw.trim_start().len());
                    let closing = self.peek() == Some(')');
                    if !(trimmed.is_empty() && closing && args.is_empty()) {
                        args.push((offset, trimmed.to_string()));
                    }
                    self.bump();
                    if closing {
                        break;
                    }
                    arg_start = self.pos;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }

        Ok(Call {
            function,
            name_pos,
            args,
        })
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn identifier(pos: usize, value: &str) -> Result<String, ParseError> {
    if value.is_empty() {
        return Err(ParseError::syntax("Empty identifier", pos, value));
    }
    if !is_identifier(value) {
        return Err(ParseError::syntax(
            format!("Invalid identifier '{}'", value),
            pos,
            value,
        ));
    }
    Ok(value.to_string())
}

fn key_value(pos: usize, value: &str) -> Result<(String, String), ParseError> {
    let (key, val) = value.split_once(':').ok_or_else(|| {
        ParseError::syntax(format!("Expected 'key:value', got '{}'", value), pos, value)
    })?;
    Ok((identifier(pos, key.trim())?, identifier(pos, val.trim())?))
}

fn parse_date(pos: usize, value: &str) -> Result<Option<NaiveDate>, ParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d-%b-%y"))
        .map(Some)
        .map_err(|_| ParseError::syntax(format!("Invalid date '{}'", value), pos, value))
}

fn identifiers(call: &Call) -> Result<Vec<String>, ParseError> {
    if call.args.is_empty() {
        return Err(ParseError::syntax(
            format!("'{}' requires at least one node id", call.function.name()),
            call.name_pos,
            call.function.name(),
        ));
    }
    call.args
        .iter()
        .map(|(pos, arg)| identifier(*pos, arg))
        .collect()
}

fn single_identifier(call: &Call) -> Result<String, ParseError> {
    let mut ids = identifiers(call)?;
    if ids.len() != 1 {
        return Err(ParseError::syntax(
            format!("'{}' takes exactly one node id", call.function.name()),
            call.name_pos,
            call.function.name(),
        ));
    }
    Ok(ids.remove(0))
}

fn build(calls: Vec<Call>) -> Result<ParsedQuery, ParseError> {
    let mut query = ParsedQuery::default();

    for call in calls {
        match call.function {
            Function::From | Function::To => {
                let id = single_identifier(&call)?;
                let slot = if call.function == Function::From {
                    &mut query.from
                } else {
                    &mut query.to
                };
                if slot.is_some() {
                    return Err(ParseError::syntax(
                        format!("'{}' may appear at most once", call.function.name()),
                        call.name_pos,
                        call.function.name(),
                    ));
                }
                *slot = Some(id);
            }
            Function::Visited => {
                let ids = identifiers(&call)?;
                for id in &ids {
                    if !query.visited.contains(id) {
                        query.visited.push(id.clone());
                    }
                }
                query.clauses.push(Clause::Visited(ids));
            }
            Function::VisitedAny => {
                let ids = identifiers(&call)?;
                query.visited_any.push(ids.clone());
                query.clauses.push(Clause::VisitedAny(ids));
            }
            Function::Exclude => {
                let ids = identifiers(&call)?;
                for id in &ids {
                    if !query.exclude.contains(id) {
                        query.exclude.push(id.clone());
                    }
                }
                query.clauses.push(Clause::Exclude(ids));
            }
            Function::Nodes => query.nodes.extend(identifiers(&call)?),
            Function::Compare => query.compare.extend(identifiers(&call)?),
            Function::Context | Function::Case => {
                if call.args.is_empty() {
                    return Err(ParseError::syntax(
                        format!("'{}' requires key:value arguments", call.function.name()),
                        call.name_pos,
                        call.function.name(),
                    ));
                }
                for (pos, arg) in &call.args {
                    let (key, value) = key_value(*pos, arg)?;
                    if call.function == Function::Context {
                        query.context.push(ContextFilter { key, value });
                    } else {
                        query.cases.push(CaseSelector {
                            case_id: key,
                            variant: value,
                        });
                    }
                }
            }
            Function::Window => {
                if call.args.len() != 1 || query.window.is_some() {
                    return Err(ParseError::syntax(
                        "'window' takes a single start:end argument and may appear once",
                        call.name_pos,
                        "window",
                    ));
                }
                let (pos, arg) = &call.args[0];
                let (start, end) = arg.split_once(':').ok_or_else(|| {
                    ParseError::syntax("Expected 'start:end' window", *pos, arg.as_str())
                })?;
                query.window = Some(QueryWindow {
                    start: parse_date(*pos, start)?,
                    end: parse_date(*pos, end)?,
                });
            }
        }
    }

    Ok(query)
}

/// Parses a DSL query string.
///
/// # Errors
/// Returns a syntax [`ParseError`] on unbalanced parentheses, unknown
/// function names, invalid identifiers, or repeated `from`/`to`.
pub fn parse(query: &str) -> Result<ParsedQuery, ParseError> {
    let calls = Scanner::new(query).calls()?;
    build(calls)
}

/// Parses the condition of a `conditional_p` entry.
///
/// Only `visited`, `visitedAny`, `exclude`, `context` and `case` are allowed.
pub fn parse_condition(condition: &str) -> Result<ParsedQuery, ParseError> {
    let calls = Scanner::new(condition).calls()?;
    if calls.is_empty() {
        return Err(ParseError::syntax("Empty condition", 0, condition));
    }
    if let Some(call) = calls.iter().find(|c| !c.function.allowed_in_condition()) {
        return Err(ParseError::syntax(
            format!("'{}' is not allowed in a condition", call.function.name()),
            call.name_pos,
            call.function.name(),
        ));
    }
    build(calls)
}
