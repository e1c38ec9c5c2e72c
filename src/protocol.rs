//! Line-oriented wire protocol: `<COMMAND>|<name>|<deps>\n` in, `OK`/`FAIL`/`ERROR` out.
//!
//! This module performs no I/O — it is a pure parse/format layer between the
//! Session Handler (which owns framing) and the Index Store (which owns
//! semantics).

use thiserror::Error;

/// Why a request line failed to parse.
///
/// Every variant collapses to the same `ERROR` response on the wire; the
/// enum exists purely so the session can log *why* at `trace` level.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ParseError {
    #[error("expected exactly two '|' separators, found {0}")]
    WrongSeparatorCount(usize),

    #[error("unrecognized command {0:?}")]
    UnknownCommand(String),

    #[error("package name is empty")]
    EmptyName,

    #[error("whitespace inside name or deps field")]
    Whitespace,

    #[error("trailing comma in deps list")]
    TrailingComma,

    #[error("deps field must be empty for this command")]
    UnexpectedDeps,

    #[error("empty dependency name in deps list")]
    EmptyDep,
}

/// One of the three request commands, fully parsed and validated.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Command {
    Index { name: String, deps: Vec<String> },
    Remove { name: String },
    Query { name: String },
}

/// Response code sent back to the client, one per request line.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Response {
    Ok,
    Fail,
    Error,
}

impl Response {
    /// Render as the exact line to write, including the trailing `\n`.
    pub fn as_line(self) -> &'static str {
        match self {
            Response::Ok => "OK\n",
            Response::Fail => "FAIL\n",
            Response::Error => "ERROR\n",
        }
    }
}

fn has_whitespace(s: &str) -> bool {
    s.chars().any(|c| c.is_whitespace())
}

fn parse_deps(raw: &str) -> Result<Vec<String>, ParseError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    if has_whitespace(raw) {
        return Err(ParseError::Whitespace);
    }
    if raw.ends_with(',') {
        return Err(ParseError::TrailingComma);
    }
    let mut deps = Vec::new();
    for part in raw.split(',') {
        if part.is_empty() {
            return Err(ParseError::EmptyDep);
        }
        deps.push(part.to_string());
    }
    Ok(deps)
}

/// Parse one already-unterminated request line (the `\n` has been stripped
/// by the session's framing) into a [`Command`].
pub fn parse_request(line: &str) -> Result<Command, ParseError> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() != 3 {
        return Err(ParseError::WrongSeparatorCount(parts.len().saturating_sub(1)));
    }
    let (command, name, deps) = (parts[0], parts[1], parts[2]);

    if name.is_empty() {
        return Err(ParseError::EmptyName);
    }
    if has_whitespace(name) {
        return Err(ParseError::Whitespace);
    }

    match command {
        "INDEX" => {
            let deps = parse_deps(deps)?;
            Ok(Command::Index {
                name: name.to_string(),
                deps,
            })
        }
        "REMOVE" => {
            if !deps.is_empty() {
                return Err(ParseError::UnexpectedDeps);
            }
            Ok(Command::Remove {
                name: name.to_string(),
            })
        }
        "QUERY" => {
            if !deps.is_empty() {
                return Err(ParseError::UnexpectedDeps);
            }
            Ok(Command::Query {
                name: name.to_string(),
            })
        }
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_with_deps() {
        let cmd = parse_request("INDEX|cloog|gmp,isl").unwrap();
        assert_eq!(
            cmd,
            Command::Index {
                name: "cloog".into(),
                deps: vec!["gmp".into(), "isl".into()],
            }
        );
    }

    #[test]
    fn index_empty_deps() {
        let cmd = parse_request("INDEX|gmp|").unwrap();
        assert_eq!(
            cmd,
            Command::Index {
                name: "gmp".into(),
                deps: vec![],
            }
        );
    }

    #[test]
    fn remove_and_query() {
        assert_eq!(
            parse_request("REMOVE|gmp|").unwrap(),
            Command::Remove { name: "gmp".into() }
        );
        assert_eq!(
            parse_request("QUERY|cloog|").unwrap(),
            Command::Query { name: "cloog".into() }
        );
    }

    #[test]
    fn wrong_separator_count() {
        assert_eq!(
            parse_request("HELLO").unwrap_err(),
            ParseError::WrongSeparatorCount(0)
        );
        assert!(matches!(
            parse_request("INDEX|a|b|c"),
            Err(ParseError::WrongSeparatorCount(_))
        ));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_request("BLINDEX|a|b").unwrap_err(),
            ParseError::UnknownCommand("BLINDEX".into())
        );
    }

    #[test]
    fn empty_name() {
        assert_eq!(parse_request("INDEX||a").unwrap_err(), ParseError::EmptyName);
    }

    #[test]
    fn whitespace_in_name_or_deps() {
        assert_eq!(
            parse_request("INDEX|a b|").unwrap_err(),
            ParseError::Whitespace
        );
        assert_eq!(
            parse_request("INDEX|a|b c").unwrap_err(),
            ParseError::Whitespace
        );
    }

    #[test]
    fn deps_on_remove_or_query_is_error() {
        assert_eq!(
            parse_request("REMOVE|a|b").unwrap_err(),
            ParseError::UnexpectedDeps
        );
        assert_eq!(
            parse_request("QUERY|a|b").unwrap_err(),
            ParseError::UnexpectedDeps
        );
    }

    #[test]
    fn trailing_comma_is_error() {
        assert_eq!(
            parse_request("INDEX|a|b,").unwrap_err(),
            ParseError::TrailingComma
        );
    }

    #[test]
    fn duplicate_deps_pass_through_uncollapsed() {
        // collapsing duplicates is the store's job, not the codec's
        let cmd = parse_request("INDEX|a|b,b,c").unwrap();
        assert_eq!(
            cmd,
            Command::Index {
                name: "a".into(),
                deps: vec!["b".into(), "b".into(), "c".into()],
            }
        );
    }

    #[test]
    fn response_lines() {
        assert_eq!(Response::Ok.as_line(), "OK\n");
        assert_eq!(Response::Fail.as_line(), "FAIL\n");
        assert_eq!(Response::Error.as_line(), "ERROR\n");
    }
}
