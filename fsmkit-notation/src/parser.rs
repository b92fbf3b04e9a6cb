//! Table-description parser.
//!
//! A description has a header of `#key:value` directives and a body of
//! declarations:
//!
//! ```text
//! #FSM:CDPLAYER
//! #nameSpace:demo.player
//! #vctString:1.0
//! Begin,Playing:"onEntry: spin up",Paused,Stopped;
//! initial->Begin;
//! Begin->Playing:startPlaying;
//! Playing->Paused:pause[hasDisc]/"dim display";
//! ```
//!
//! Whitespace outside double quotes is insignificant, so declarations may span
//! lines. The first `;`-terminated segment lists states; each later segment is
//! one transition. Parsing is best-effort: problems are collected as
//! [`Diagnostic`]s against the line they start on and the remaining
//! declarations are still processed.

use crate::error::NotationError;
use fsmkit_core::{table::is_reserved_state_name, CoreError, Table};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::Path;

const FORWARD_MARKERS: [&str; 4] = ["->", "=>", ">>", "=="];
const BACKWARD_MARKERS: [&str; 3] = ["<-", "<=", "<<"];

const CLASS_KEY: &str = "FSM";
const NAMESPACE_KEY: &str = "nameSpace";
const VERSION_KEY: &str = "vctString";

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => f.write_str("note"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A problem found while parsing, tied to a 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.severity, self.message)
    }
}

/// Header directive values. The first occurrence of each directive wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Header {
    pub class_id: Option<String>,
    pub namespace: Option<String>,
    pub version: Option<String>,
}

impl Header {
    fn read_line(&mut self, line: usize, text: &str, diagnostics: &mut Vec<Diagnostic>) {
        let directive = text.trim_start_matches('#');
        let (key, value) = match directive.split_once(':') {
            Some(kv) => kv,
            None => {
                let key = directive.split_whitespace().next().unwrap_or_default();
                if [CLASS_KEY, NAMESPACE_KEY, VERSION_KEY].contains(&key) {
                    diagnostics.push(error(
                        line,
                        format!("malformed header directive '#{}': expected ':'", key),
                    ));
                }
                return;
            }
        };

        let key = key.trim();
        let slot = match key {
            CLASS_KEY => &mut self.class_id,
            NAMESPACE_KEY => &mut self.namespace,
            VERSION_KEY => &mut self.version,
            _ => return,
        };

        let value = value.trim();
        if value.is_empty() {
            diagnostics.push(warning(line, format!("empty value for '#{}'", key)));
        } else if slot.is_some() {
            diagnostics.push(note(line, format!("repeated '#{}' ignored", key)));
        } else {
            *slot = Some(value.to_string());
        }
    }

    /// Returns true if every required directive is present.
    pub fn is_complete(&self) -> bool {
        self.class_id.is_some() && self.namespace.is_some() && self.version.is_some()
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.class_id.is_none() {
            missing.push(CLASS_KEY);
        }
        if self.namespace.is_none() {
            missing.push(NAMESPACE_KEY);
        }
        if self.version.is_none() {
            missing.push(VERSION_KEY);
        }
        missing
    }
}

/// Result of parsing a description.
#[derive(Debug)]
pub struct ParseOutput {
    /// The table, or `None` if a required header directive is missing.
    pub table: Option<Table>,
    pub header: Header,
    /// Diagnostics in line order.
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }
}

/// Parses a description held in memory.
pub fn parse(input: &str) -> ParseOutput {
    let mut diagnostics = Vec::new();
    let mut header = Header::default();
    let mut body = Vec::new();

    for (index, text) in input.lines().enumerate() {
        let line = index + 1;
        if text.starts_with('#') {
            header.read_line(line, text, &mut diagnostics);
        } else {
            body.push((line, text));
        }
    }

    for key in header.missing() {
        diagnostics.push(error(1, format!("missing required header directive '#{}'", key)));
    }

    let mut table = Table::new(header.class_id.clone().unwrap_or_default());
    if let Some(namespace) = &header.namespace {
        table = table.with_namespace(namespace.clone());
    }
    if let Some(version) = &header.version {
        table = table.with_version(version.clone());
    }

    let mut builder = Builder {
        table,
        diagnostics,
    };
    let mut segments = split_body(&body, &mut builder.diagnostics).into_iter();
    match segments.next() {
        Some(states) => builder.declare_states(&states),
        None => builder
            .diagnostics
            .push(note(body.first().map(|(l, _)| *l).unwrap_or(1), "no states declared")),
    }
    for segment in segments {
        builder.declare_transition(&segment);
    }

    let Builder {
        table,
        mut diagnostics,
    } = builder;
    diagnostics.sort_by_key(|d| d.line);

    for d in &diagnostics {
        tracing::debug!("{}", d);
    }

    ParseOutput {
        table: header.is_complete().then_some(table),
        header,
        diagnostics,
    }
}

/// Reads and parses a description file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<ParseOutput, NotationError> {
    let path = path.as_ref();
    let input = std::fs::read_to_string(path).map_err(|source| NotationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&input))
}

/// One `;`-terminated declaration with whitespace outside quotes removed.
#[derive(Debug, PartialEq, Eq)]
struct Segment {
    line: usize,
    text: String,
}

fn split_body(lines: &[(usize, &str)], diagnostics: &mut Vec<Diagnostic>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut start = None;
    let mut in_quotes = false;
    let mut quote_line = 0;

    for &(line, text) in lines {
        for c in text.chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    if in_quotes {
                        quote_line = line;
                    }
                    start.get_or_insert(line);
                    current.push(c);
                }
                ';' if !in_quotes => segments.push(Segment {
                    line: start.take().unwrap_or(line),
                    text: std::mem::take(&mut current),
                }),
                c if c.is_whitespace() && !in_quotes => {}
                c => {
                    start.get_or_insert(line);
                    current.push(c);
                }
            }
        }
        if in_quotes {
            current.push('\n');
        }
    }

    if in_quotes {
        diagnostics.push(error(quote_line, "unterminated quoted text"));
    }
    if !current.is_empty() {
        let line = start.unwrap_or(quote_line);
        diagnostics.push(warning(line, "missing ';' after final declaration"));
        segments.push(Segment {
            line,
            text: current,
        });
    }

    segments
}

struct Builder {
    table: Table,
    diagnostics: Vec<Diagnostic>,
}

impl Builder {
    fn declare_states(&mut self, segment: &Segment) {
        for declaration in split_outside_quotes(&segment.text, ',') {
            if declaration.is_empty() {
                continue;
            }

            let (name, annotation) = split_once_outside_quotes(declaration, ':');
            let name = unquote(name);
            if is_reserved_state_name(&name) {
                self.diagnostics.push(note(
                    segment.line,
                    format!("reserved name '{}' is not declared as a state", name),
                ));
                continue;
            }

            let id = match self.table.add_state(name.as_str()) {
                Ok(id) => id,
                Err(e @ CoreError::DuplicateState { .. }) => {
                    self.diagnostics.push(warning(segment.line, e.to_string()));
                    continue;
                }
                Err(e) => {
                    self.diagnostics.push(error(segment.line, e.to_string()));
                    continue;
                }
            };

            let Some(annotation) = annotation.map(unquote) else {
                continue;
            };
            if let Some(state) = self.table.state_mut(id) {
                if let Some(text) = entry_hint(&annotation) {
                    state.set_entry_annotation(text);
                }
                if let Some(text) = exit_hint(&annotation) {
                    state.set_exit_annotation(text);
                }
            }
        }
    }

    fn declare_transition(&mut self, segment: &Segment) {
        if segment.text.is_empty() {
            return;
        }

        let clause = match ClauseParser::new(&segment.text).parse() {
            Ok(clause) => clause,
            Err(reason) => {
                self.diagnostics.push(error(
                    segment.line,
                    format!("{} in '{}'", reason, segment.text),
                ));
                return;
            }
        };
        let line = segment.line;

        if matches!(clause.source.as_str(), "initial" | "pseudo-initial") {
            self.declare_initial(line, &clause);
            return;
        }
        if clause.target == "final" {
            if let Err(e) = self.table.ensure_state(&clause.source) {
                self.diagnostics.push(error(line, e.to_string()));
            } else {
                self.diagnostics.push(note(
                    line,
                    format!("transition from '{}' to final is not materialized", clause.source),
                ));
            }
            return;
        }

        let Some(event) = clause.event.as_deref() else {
            self.diagnostics.push(error(
                line,
                format!("missing event in '{}'", segment.text),
            ));
            return;
        };

        let ids = self
            .table
            .ensure_state(&clause.source)
            .and_then(|from| Ok((from, self.table.ensure_state(&clause.target)?)));
        let (from, to) = match ids {
            Ok(ids) => ids,
            Err(e) => {
                self.diagnostics.push(error(line, e.to_string()));
                return;
            }
        };

        match self.table.add_transition(from, event, to) {
            Ok(transition) => {
                if let Some(guard) = &clause.guard {
                    transition.set_guard_annotation(guard.clone());
                }
                if let Some(action) = &clause.action {
                    transition.set_action_annotation(action.clone());
                }
            }
            Err(e @ CoreError::DuplicateTransition { .. }) => {
                self.diagnostics.push(warning(line, format!("{}, ignored", e)));
            }
            Err(e) => self.diagnostics.push(error(line, e.to_string())),
        }
    }

    fn declare_initial(&mut self, line: usize, clause: &Clause) {
        let id = match self.table.ensure_state(&clause.target) {
            Ok(id) => id,
            Err(e) => {
                self.diagnostics.push(error(line, e.to_string()));
                return;
            }
        };

        if let Some(previous) = self.table.initial_state() {
            if previous != id {
                let name = self
                    .table
                    .state(previous)
                    .map(|s| s.name().to_string())
                    .unwrap_or_default();
                self.diagnostics.push(warning(
                    line,
                    format!(
                        "initial state redefined from '{}' to '{}'",
                        name, clause.target
                    ),
                ));
            }
        }
        if clause.event.is_some() {
            self.diagnostics
                .push(note(line, "event on the initial transition is ignored"));
        }

        if let Err(e) = self.table.set_initial_state(id) {
            self.diagnostics.push(error(line, e.to_string()));
        }
    }
}

/// A transition declaration with its direction resolved.
#[derive(Debug, PartialEq, Eq)]
struct Clause {
    source: String,
    target: String,
    event: Option<String>,
    guard: Option<String>,
    action: Option<String>,
}

/// Recursive-descent parser for one transition declaration:
/// `left MARKER right [: event [ '[' guard ']' ] [ '/' action ]]`.
struct ClauseParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ClauseParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<Clause, String> {
        let left = self.parse_name("source")?;
        let forward = self.parse_marker()?;
        let right = self.parse_name("target")?;

        let (source, target) = if forward {
            (left, right)
        } else {
            (right, left)
        };
        let mut clause = Clause {
            source,
            target,
            event: None,
            guard: None,
            action: None,
        };

        if self.peek_char() == Some(':') {
            self.pos += 1;
            let event = unquote(self.take_until(&['[', '/']));
            if event.is_empty() {
                return Err("expected event name after ':'".to_string());
            }
            clause.event = Some(event);

            if self.peek_char() == Some('[') {
                self.pos += 1;
                let guard = unquote(self.take_until(&[']']));
                if self.peek_char() != Some(']') {
                    return Err("expected ']' to close guard".to_string());
                }
                self.pos += 1;
                clause.guard = non_empty(guard);
            }

            if self.peek_char() == Some('/') {
                self.pos += 1;
                let input = self.input;
                clause.action = non_empty(unquote(&input[self.pos..]));
                self.pos = input.len();
            }
        }

        match self.peek_char() {
            Some(c) => Err(format!("unexpected '{}' at column {}", c, self.pos + 1)),
            None => Ok(clause),
        }
    }

    fn parse_name(&mut self, role: &str) -> Result<String, String> {
        let input = self.input;
        let start = self.pos;
        let mut in_quotes = false;

        while let Some(c) = self.peek_char() {
            if c == '"' {
                in_quotes = !in_quotes;
            } else if !in_quotes && (c == ':' || self.marker().is_some()) {
                break;
            }
            self.pos += c.len_utf8();
        }

        let name = unquote(&input[start..self.pos]);
        if name.is_empty() {
            return Err(format!("expected {} state name", role));
        }
        Ok(name)
    }

    fn parse_marker(&mut self) -> Result<bool, String> {
        match self.marker() {
            Some((forward, len)) => {
                self.pos += len;
                Ok(forward)
            }
            None => Err("expected direction marker (-> => >> == <- <= <<)".to_string()),
        }
    }

    /// Returns the direction and length of a marker at the cursor.
    fn marker(&self) -> Option<(bool, usize)> {
        FORWARD_MARKERS
            .iter()
            .find(|m| self.peek_str(m))
            .map(|m| (true, m.len()))
            .or_else(|| {
                BACKWARD_MARKERS
                    .iter()
                    .find(|m| self.peek_str(m))
                    .map(|m| (false, m.len()))
            })
    }

    fn take_until(&mut self, stops: &[char]) -> &'a str {
        let input = self.input;
        let start = self.pos;
        let mut in_quotes = false;

        while let Some(c) = self.peek_char() {
            if c == '"' {
                in_quotes = !in_quotes;
            } else if !in_quotes && stops.contains(&c) {
                break;
            }
            self.pos += c.len_utf8();
        }

        &input[start..self.pos]
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }
}

static ENTRY_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:on)?[Ee]ntry(?:\(\))?[/\\: ](.*)").expect("entry hint pattern")
});

static EXIT_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:on)?[Ee]xit(?:\(\))?[/\\: ](.*)").expect("exit hint pattern")
});

/// Extracts an entry hint: optional `on`, `Entry` or `entry`, optional `()`,
/// then one of `/ \ :` or a space, followed by the hint up to end of line.
pub fn entry_hint(annotation: &str) -> Option<String> {
    hint(&ENTRY_HINT, annotation)
}

/// Extracts an exit hint, matched like [`entry_hint`].
pub fn exit_hint(annotation: &str) -> Option<String> {
    hint(&EXIT_HINT, annotation)
}

// The first match decides, even when it carries no text.
fn hint(pattern: &Regex, annotation: &str) -> Option<String> {
    let captures = pattern.captures(annotation)?;
    let text = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
    non_empty(text.to_string())
}

fn split_outside_quotes(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (i, c) in text.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn split_once_outside_quotes(text: &str, separator: char) -> (&str, Option<&str>) {
    let mut in_quotes = false;
    for (i, c) in text.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            return (&text[..i], Some(&text[i + c.len_utf8()..]));
        }
    }
    (text, None)
}

fn unquote(text: &str) -> String {
    text.replace('"', "")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn note(line: usize, message: impl Into<String>) -> Diagnostic {
    diagnostic(line, Severity::Note, message)
}

fn warning(line: usize, message: impl Into<String>) -> Diagnostic {
    diagnostic(line, Severity::Warning, message)
}

fn error(line: usize, message: impl Into<String>) -> Diagnostic {
    diagnostic(line, Severity::Error, message)
}

fn diagnostic(line: usize, severity: Severity, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        line,
        severity,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "#FSM:TEST\n#nameSpace:demo\n#vctString:1.0\n";

    fn parse_body(body: &str) -> ParseOutput {
        parse(&format!("{}{}", HEADER, body))
    }

    fn transition<'t>(table: &'t Table, from: &str, event: &str) -> &'t fsmkit_core::Transition {
        table
            .state_named(from)
            .and_then(|s| s.transition(event))
            .unwrap_or_else(|| panic!("no transition {} on {}", from, event))
    }

    #[test]
    fn test_minimal_description() {
        let output = parse_body("a,b;a->b:go[ready]/logIt;");
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

        let table = output.table.unwrap();
        assert_eq!(table.class_id(), "TEST");
        assert_eq!(table.namespace(), Some("demo"));
        assert_eq!(table.version(), Some("1.0"));

        let names: Vec<&str> = table.states().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let t = transition(&table, "a", "go");
        assert_eq!(t.to, "b");
        // `[ready]` is stored without its brackets.
        assert_eq!(t.guard.as_deref(), Some("ready"));
        assert_eq!(t.action.as_deref(), Some("logIt"));
        assert_eq!(t.id(), "a__go__b");
        assert!(table.accepts_event("go"));
        assert_eq!(table.transitions().count(), 1);
    }

    #[test]
    fn test_missing_header_yields_no_table() {
        let output = parse("#FSM:TEST\n#vctString:1.0\na,b;a->b:go;");
        assert!(output.table.is_none());
        assert_eq!(output.header.class_id.as_deref(), Some("TEST"));
        assert!(output
            .errors()
            .any(|d| d.message.contains("#nameSpace")));
    }

    #[test]
    fn test_header_first_value_wins() {
        let output = parse("#FSM:FIRST\n#FSM:SECOND\n#nameSpace: demo \n#vctString:2\na;");
        let table = output.table.unwrap();
        assert_eq!(table.class_id(), "FIRST");
        assert_eq!(table.namespace(), Some("demo"));
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.line == 2 && d.severity == Severity::Note));
    }

    #[test]
    fn test_malformed_header() {
        let output = parse("#FSM TEST\n#nameSpace:demo\n#vctString:1.0\n# a comment\na;");
        assert!(output.table.is_none());
        let first = output.errors().next().unwrap();
        assert_eq!(first.line, 1);
        assert!(first.message.contains("malformed"));
    }

    #[test]
    fn test_direction_markers() {
        for marker in FORWARD_MARKERS {
            let output = parse_body(&format!("a,b;a{}b:go;", marker));
            let table = output.table.unwrap();
            assert_eq!(transition(&table, "a", "go").to, "b", "marker {}", marker);
        }
        for marker in BACKWARD_MARKERS {
            let output = parse_body(&format!("a,b;a{}b:go;", marker));
            let table = output.table.unwrap();
            assert_eq!(transition(&table, "b", "go").to, "a", "marker {}", marker);
            assert!(table.state_named("a").unwrap().is_terminal());
        }
    }

    #[test]
    fn test_initial_and_final() {
        let output = parse_body("Begin,Stopped;\ninitial->Begin;\nBegin->Stopped:stop;\nStopped->final;");
        let table = output.table.unwrap();

        let initial = table.initial_state().unwrap();
        assert_eq!(table.state(initial).unwrap().name(), "Begin");
        assert!(table.state_named("initial").is_none());
        assert!(table.state_named("final").is_none());
        assert!(table.state_named("Stopped").unwrap().is_terminal());
        assert!(output
            .diagnostics
            .iter()
            .all(|d| d.severity == Severity::Note));
    }

    #[test]
    fn test_initial_redefined() {
        let output = parse_body("a,b;\ninitial->a;\ninitial->b;");
        let table = output.table.unwrap();
        assert_eq!(table.state(table.initial_state().unwrap()).unwrap().name(), "b");
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.line == 6));
    }

    #[test]
    fn test_lazy_state_creation() {
        let output = parse_body("Idle;\nIdle->Busy:work;\nDone<-Busy:finish;");
        let table = output.table.unwrap();
        let names: Vec<&str> = table.states().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Idle", "Busy", "Done"]);
        assert_eq!(transition(&table, "Busy", "finish").to, "Done");
    }

    #[test]
    fn test_reserved_names_in_state_list() {
        let output = parse_body("initial,a,final,pseudo-initial;");
        let table = output.table.unwrap();
        assert_eq!(table.state_count(), 1);
        assert_eq!(
            output
                .diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Note)
                .count(),
            3
        );
    }

    #[test]
    fn test_state_annotations() {
        let body = "Playing:\"onEntry: spin up\nonExit()/spin down\",\nPaused:entry/dim,\nStopped:\"no hints here\";";
        let output = parse_body(body);
        let table = output.table.unwrap();

        let playing = table.state_named("Playing").unwrap();
        assert_eq!(playing.entry_annotation(), Some("spin up"));
        assert_eq!(playing.exit_annotation(), Some("spin down"));

        let paused = table.state_named("Paused").unwrap();
        assert_eq!(paused.entry_annotation(), Some("dim"));
        assert_eq!(paused.exit_annotation(), None);

        let stopped = table.state_named("Stopped").unwrap();
        assert_eq!(stopped.entry_annotation(), None);
    }

    #[test]
    fn test_whitespace_outside_quotes() {
        let output = parse_body("a , b ;\n  a -> b : go [ ready ] / \"log it\" ;");
        let table = output.table.unwrap();
        let t = transition(&table, "a", "go");
        assert_eq!(t.guard.as_deref(), Some("ready"));
        assert_eq!(t.action.as_deref(), Some("log it"));
    }

    #[test]
    fn test_best_effort_continues() {
        let body = "a,b,c;\na b:go;\na->:go;\na->b:;\nb->c:next;";
        let output = parse_body(body);
        let table = output.table.as_ref().unwrap();

        // Whitespace is insignificant, so "a b:go" reads as "ab:go" with no marker.
        let error_lines: Vec<usize> = output.errors().map(|d| d.line).collect();
        assert_eq!(error_lines, vec![5, 6, 7]);
        assert_eq!(transition(&table, "b", "next").to, "c");
        assert_eq!(table.transitions().count(), 1);
    }

    #[test]
    fn test_duplicate_transition_warning() {
        let output = parse_body("a,b,c;\na->b:go;\na->c:go;");
        let table = output.table.unwrap();
        assert_eq!(transition(&table, "a", "go").to, "b");
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.line == 6));
    }

    #[test]
    fn test_duplicate_state_warning() {
        let output = parse_body("a,b,a;");
        assert_eq!(output.table.unwrap().state_count(), 2);
        assert_eq!(output.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_missing_event() {
        let output = parse_body("a,b;\na->b;");
        assert!(output.errors().any(|d| d.message.contains("missing event")));
    }

    #[test]
    fn test_unterminated_quote() {
        let output = parse_body("a:\"onEntry: x;\nb;");
        assert!(output.errors().any(|d| d.message.contains("unterminated")));
    }

    #[test]
    fn test_missing_final_semicolon() {
        let output = parse_body("a,b;\na->b:go");
        let table = output.table.unwrap();
        assert_eq!(transition(&table, "a", "go").to, "b");
        assert_eq!(output.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_hint_patterns() {
        assert_eq!(entry_hint("onEntry: start").as_deref(), Some("start"));
        assert_eq!(entry_hint("entry()/start").as_deref(), Some("start"));
        assert_eq!(entry_hint("Entry\\start").as_deref(), Some("start"));
        assert_eq!(entry_hint("onentry start motor").as_deref(), Some("start motor"));
        assert_eq!(entry_hint("entry(): "), None);
        assert_eq!(entry_hint("sentry duty"), Some("duty".to_string()));
        assert_eq!(entry_hint("entryway"), None);
        assert_eq!(exit_hint("onEntry: a\nonExit: b").as_deref(), Some("b"));
        assert_eq!(exit_hint("Exit()x"), None);
        assert_eq!(exit_hint("onExit()\\park head\r\nmore").as_deref(), Some("park head"));
        assert_eq!(entry_hint("entry: \nentry: second"), None);
    }

    #[test]
    fn test_sample_tables() {
        let player = parse(include_str!("../../tables/cdplayer.fsm"));
        assert!(!player.has_errors(), "{:?}", player.diagnostics);
        let table = player.table.unwrap();
        assert_eq!(table.state_count(), 4);
        assert_eq!(table.transitions().count(), 7);

        let playing = table.state_named("Playing").unwrap();
        assert_eq!(playing.entry_annotation(), Some("spin up the disc"));
        assert_eq!(playing.exit_annotation(), Some("park the head"));
        assert_eq!(
            table.state_named("Paused").unwrap().entry_annotation(),
            Some("dim the display")
        );
        let start = transition(&table, "Begin", "startPlaying");
        assert_eq!(start.guard.as_deref(), Some("disc loaded"));
        assert_eq!(
            transition(&table, "Paused", "stop").action.as_deref(),
            Some("reset position")
        );

        let actor = parse(include_str!("../../tables/actor.fsm"));
        assert!(!actor.has_errors(), "{:?}", actor.diagnostics);
        let table = actor.table.unwrap();
        assert_eq!(table.class_id(), "ACTOR");
        assert_eq!(table.transitions().count(), 7);
        assert_eq!(table.state(table.initial_state().unwrap()).unwrap().name(), "InWings");
        assert!(table.state_named("Ended").unwrap().is_terminal());
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.fsm");
        std::fs::write(
            &path,
            "#FSM:CDPLAYER\n#nameSpace:demo\n#vctString:1\nBegin,Playing;\ninitial->Begin;\nBegin->Playing:startPlaying;\n",
        )
        .unwrap();

        let output = parse_file(&path).unwrap();
        assert!(!output.has_errors());
        assert_eq!(output.table.unwrap().class_id(), "CDPLAYER");

        let missing = parse_file(dir.path().join("missing.fsm"));
        assert!(matches!(missing, Err(NotationError::Io { .. })));
    }
}
