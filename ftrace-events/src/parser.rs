//! # Parser
//!
//! Turns a raw trace pipe line into an [`Event`]. The parser is best effort
//! and tuned to the format the kernel uses when writing to the trace pipe:
//!
//! ```text
//!   <comm>-<pid> [(<tgid>)] [<cpu>] [<flags>] <secs>.<usecs>: <event>: <payload>
//! ```
//!
//! The payload of a kprobe event starts with the probed symbol between
//! parenthesis, followed by the fetched arguments, e.g.
//! `(SyS_execve+0x0/0x40) arg0="/bin/ls" arg1=(fault)`. Other events only
//! have a list of `key=value` fields.

use std::collections::BTreeMap;

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Event, FAULT_SENTINEL};

static EVENT_RE: Lazy<Regex> = Lazy::new(|| {
    // Unwrap as the expression is static and covered by tests.
    Regex::new(concat!(
        r"^\s*(?:(?P<comm>.+?)-(?P<pid>\d+)\s+)?",
        r"(?:\(\s*[\d-]+\)\s+)?",
        r"\[(?P<cpu>\d+)\]\s+",
        r"(?:\S+\s+)?",
        r"(?P<ts>\d+\.\d+):\s+",
        r"(?P<name>[^:\s]+):",
        r"(?:\s+(?P<payload>.*))?$",
    ))
    .unwrap()
});

/// Errors returned when a trace line can't be turned into an event.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not follow the trace pipe format.
    #[error("Could not parse event data '{line}'")]
    Malformed { line: String },
    /// The probed symbol of a syscall event is not terminated.
    #[error("Unterminated symbol name in event data '{line}'")]
    UnterminatedSymbol { line: String },
}

impl ParseError {
    /// Returns the line which failed to parse.
    pub fn line(&self) -> &str {
        match self {
            ParseError::Malformed { line } | ParseError::UnterminatedSymbol { line } => line,
        }
    }
}

/// Parse a single trace pipe line into an event.
pub fn parse_event(line: &str) -> Result<Event, ParseError> {
    let caps = EVENT_RE
        .captures(line.trim_end_matches(['\r', '\n', '\t', ' ']))
        .ok_or_else(|| ParseError::Malformed {
            line: line.to_string(),
        })?;

    // The name group is mandatory in the expression.
    let mut name = caps["name"].to_string();
    let pid = caps.name("pid").and_then(|p| p.as_str().parse::<u32>().ok());
    let mut payload = caps.name("payload").map_or("", |p| p.as_str());

    let is_syscall = payload.starts_with('(');
    if is_syscall {
        let (symbol, rest) = match payload.split_once(") ") {
            Some((symbol, rest)) => (symbol, rest),
            None => match payload.strip_suffix(')') {
                Some(symbol) => (symbol, ""),
                None => {
                    return Err(ParseError::UnterminatedSymbol {
                        line: line.to_string(),
                    })
                }
            },
        };

        // Remove the leading '(' and the symbol offset, if any
        // ("SyS_execve+0x0/0x40").
        name = symbol[1..]
            .split('+')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        payload = rest;
    }

    Ok(Event {
        pid,
        name,
        is_syscall,
        args: parse_args(payload),
    })
}

/// Parse a list of `key=value` fields. Values can be quoted, in which case
/// they can contain spaces. Parsing stops at the first faulty value, as the
/// kernel can't fetch the following arguments either.
fn parse_args(mut data: &str) -> BTreeMap<String, String> {
    let mut args = BTreeMap::new();

    loop {
        data = data.trim_start();
        if data.is_empty() {
            break;
        }

        let (key, tail) = match data.split_once('=') {
            Some(kv) => kv,
            None => break,
        };
        // Anything not being part of a key=value pair is ignored.
        let key = key.rsplit(char::is_whitespace).next().unwrap_or_default();

        let (value, rest) = match tail.strip_prefix('"') {
            Some(quoted) => match closing_quote(quoted) {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => {
                    trace!("Unterminated quoted value for '{key}'");
                    break;
                }
            },
            None => tail.split_once(' ').unwrap_or((tail, "")),
        };

        if value == FAULT_SENTINEL {
            trace!("Argument '{key}' could not be fetched, ignoring the following ones");
            break;
        }

        if !key.is_empty() {
            args.insert(key.to_string(), value.to_string());
        }
        data = rest;
    }

    args
}

/// Find the offset of the first unescaped double quote.
fn closing_quote(data: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in data.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(i),
            _ => escaped = false,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn sub_event() {
        let event = parse_event(r#"foo-123 [001] .... 1.1: myevent: a="x y" b=2"#).unwrap();

        assert_eq!(event.pid, Some(123));
        assert_eq!(event.name, "myevent");
        assert!(!event.is_syscall);
        assert_eq!(
            event.args,
            BTreeMap::from([
                ("a".to_string(), "x y".to_string()),
                ("b".to_string(), "2".to_string()),
            ])
        );
    }

    #[test]
    fn sched_event() {
        let event = parse_event(
            "            bash-2183  [003] d... 14301.436412: sched_process_fork: comm=bash pid=2183 child_comm=bash child_pid=2211",
        )
        .unwrap();

        assert_eq!(event.pid, Some(2183));
        assert_eq!(event.name, "sched_process_fork");
        assert!(!event.is_syscall);
        assert_eq!(event.args.len(), 4);
        assert_eq!(event.args["child_pid"], "2211");
        assert_eq!(event.args["comm"], "bash");
    }

    #[test]
    fn syscall() {
        let event = parse_event(
            r#"            bash-2211  [000] d... 14301.437014: test_probe: (SyS_execve+0x0/0x40) arg0="/bin/ls" arg1="--color=auto" arg2="-l" arg3="/tmp/some dir""#,
        )
        .unwrap();

        assert_eq!(event.pid, Some(2211));
        assert_eq!(event.name, "SyS_execve");
        assert!(event.is_syscall);
        assert_eq!(event.args.len(), 4);
        assert_eq!(event.args["arg0"], "/bin/ls");
        assert_eq!(event.args["arg1"], "--color=auto");
        assert_eq!(event.args["arg2"], "-l");
        assert_eq!(event.args["arg3"], "/tmp/some dir");
        assert_eq!(event.argv(), vec!["/bin/ls", "--color=auto", "-l", "/tmp/some dir"]);
    }

    #[test]
    fn syscall_fault() {
        let event = parse_event(
            r#"ls-12 [001] .... 2.5: p1: (sys_execve+0x0/0x40) arg0="/bin/ls" arg1="-a" arg2=(fault) arg3="ghost" arg4=(fault)"#,
        )
        .unwrap();

        assert!(event.is_syscall);
        assert_eq!(event.args.len(), 2);
        assert_eq!(event.args["arg0"], "/bin/ls");
        assert_eq!(event.args["arg1"], "-a");
        assert!(!event.args.contains_key("arg3"));
        assert!(!event.args.values().any(|v| v == FAULT_SENTINEL));
    }

    #[test]
    fn syscall_first_arg_fault() {
        let event =
            parse_event(r#"ls-12 [001] .... 2.5: p1: (sys_execve+0x0/0x40) arg0=(fault) arg1="x""#)
                .unwrap();
        assert!(event.is_syscall);
        assert!(event.args.is_empty());
    }

    #[test_case("(SyS_execve+0x0/0x40)", "SyS_execve" ; "offset suffix")]
    #[test_case("(__x64_sys_execve+0x0/0x50)", "__x64_sys_execve" ; "x64 wrapper")]
    #[test_case("(do_sys_open)", "do_sys_open" ; "no suffix")]
    #[test_case("( execve +0x4/0x10)", "execve" ; "surrounding spaces")]
    fn syscall_name(symbol: &str, name: &str) {
        let event = parse_event(&format!("sh-1 [000] .... 0.1: p1: {symbol} arg0=\"x\"")).unwrap();
        assert_eq!(event.name, name);
        assert_eq!(event.args.len(), 1);

        // Symbol ending the payload.
        let event = parse_event(&format!("sh-1 [000] .... 0.1: p1: {symbol}")).unwrap();
        assert_eq!(event.name, name);
        assert!(event.args.is_empty());
    }

    #[test]
    fn embedded_colon() {
        let event =
            parse_event(r#"cat-77 [002] .... 10.000001: myevent: path="/a:b" addr=ff:ee"#).unwrap();
        assert_eq!(event.name, "myevent");
        assert_eq!(event.args["path"], "/a:b");
        assert_eq!(event.args["addr"], "ff:ee");
    }

    #[test]
    fn escaped_quote() {
        let event = parse_event(r#"cat-77 [002] .... 10.1: ev: s="say \"hi\" now" n=1"#).unwrap();
        assert_eq!(event.args["s"], r#"say \"hi\" now"#);
        assert_eq!(event.args["n"], "1");
    }

    #[test]
    fn empty_payload() {
        let event = parse_event("cat-77 [002] .... 10.1: myevent:").unwrap();
        assert_eq!(event.name, "myevent");
        assert!(event.args.is_empty());

        let event = parse_event("cat-77 [002] .... 10.1: myevent: ").unwrap();
        assert!(event.args.is_empty());
    }

    #[test]
    fn optional_columns() {
        // No comm-pid column.
        let event = parse_event("[001] .... 1.1: myevent: a=1").unwrap();
        assert_eq!(event.pid, None);
        assert_eq!(event.args["a"], "1");

        // No flags column, tgid column.
        let event = parse_event("my-comm-with-dashes-99 (   99) [001] 1.1: myevent: a=1").unwrap();
        assert_eq!(event.pid, Some(99));
        assert_eq!(event.name, "myevent");
    }

    #[test]
    fn unterminated_quote() {
        let event = parse_event(r#"cat-77 [002] .... 10.1: ev: a=1 b="never ends c=3"#).unwrap();
        assert_eq!(event.args.len(), 1);
        assert_eq!(event.args["a"], "1");
    }

    #[test_case("" ; "empty line")]
    #[test_case("# tracer: nop" ; "header")]
    #[test_case("CPU:1 [LOST 12 EVENTS]" ; "lost events")]
    #[test_case("foo-123 [001] .... notatime: ev: a=1" ; "bad timestamp")]
    fn malformed(line: &str) {
        match parse_event(line) {
            Err(ParseError::Malformed { line: l }) => assert_eq!(l, line),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn unterminated_symbol() {
        let line = "sh-1 [000] .... 0.1: p1: (sys_execve+0x0/0x40 arg0=\"x\"";
        let err = parse_event(line).unwrap_err();
        assert_eq!(err, ParseError::UnterminatedSymbol { line: line.to_string() });
        assert_eq!(err.line(), line);
    }
}
