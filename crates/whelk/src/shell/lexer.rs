//! Command-line tokenizer with quoting, variable expansion, and
//! redirection operators.
//!
//! A line is split on top-level whitespace. Single quotes group verbatim,
//! double quotes group with `$NAME` expansion, and bare `$NAME` outside
//! quotes expands from the shell environment (unset names expand to the
//! empty string). `>` and `>>` are redirection operators only when they
//! appear as their own unquoted whitespace-delimited token.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors from tokenizing a command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A quote was opened but never closed.
    #[error("unterminated quote")]
    UnterminatedQuote,
    /// A redirection operator with no target token after it.
    #[error("syntax error near unexpected token `newline'")]
    MissingRedirectTarget,
}

/// How redirected stdout is applied to the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `>` replaces the target's content.
    Overwrite,
    /// `>>` appends to the target's content.
    Append,
}

/// A stdout redirection parsed off the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    /// Target path, still relative to the shell's working directory.
    pub target: String,
}

/// A tokenized command line: argv plus an optional redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub argv: Vec<String>,
    pub redirect: Option<Redirect>,
}

impl ParsedCommand {
    /// Whether the line held no words at all (blank or whitespace-only).
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }
}

/// One raw token plus whether any part of it was quoted. Quoting shields a
/// token from being interpreted as a redirection operator.
#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
}

/// Tokenize a command line against the given environment.
pub fn parse(line: &str, env: &BTreeMap<String, String>) -> Result<ParsedCommand, ParseError> {
    let tokens = split_tokens(line, env)?;

    let mut argv = Vec::new();
    let mut redirect = None;
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        let kind = match token.text.as_str() {
            ">" if !token.quoted => Some(RedirectKind::Overwrite),
            ">>" if !token.quoted => Some(RedirectKind::Append),
            _ => None,
        };
        match kind {
            Some(kind) => {
                let target = iter.next().ok_or(ParseError::MissingRedirectTarget)?;
                redirect = Some(Redirect {
                    kind,
                    target: target.text,
                });
            }
            None => argv.push(token.text),
        }
    }

    Ok(ParsedCommand { argv, redirect })
}

fn split_tokens(line: &str, env: &BTreeMap<String, String>) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quoted = false;

    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => {
                if started {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                    started = false;
                    quoted = false;
                }
            }
            '\'' => {
                started = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(ParseError::UnterminatedQuote),
                    }
                }
            }
            '"' => {
                started = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('$') => expand_variable(&mut chars, &mut current, env),
                        Some(c) => current.push(c),
                        None => return Err(ParseError::UnterminatedQuote),
                    }
                }
            }
            '$' => {
                started = true;
                expand_variable(&mut chars, &mut current, env);
            }
            c => {
                started = true;
                current.push(c);
            }
        }
    }
    if started {
        tokens.push(Token {
            text: current,
            quoted,
        });
    }
    Ok(tokens)
}

/// Expand a `$NAME` or `${NAME}` reference at the cursor. A `$` that does
/// not start a valid name is kept literal.
fn expand_variable(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    out: &mut String,
    env: &BTreeMap<String, String>,
) {
    let braced = chars.peek() == Some(&'{');
    if braced {
        chars.next();
        let mut name = String::new();
        for c in chars.by_ref() {
            if c == '}' {
                if let Some(value) = env.get(&name) {
                    out.push_str(value);
                }
                return;
            }
            name.push(c);
        }
        // Unclosed brace: keep everything literal.
        out.push_str("${");
        out.push_str(&name);
        return;
    }

    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        let valid = if name.is_empty() {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };
        if !valid {
            break;
        }
        name.push(c);
        chars.next();
    }

    if name.is_empty() {
        out.push('$');
    } else if let Some(value) = env.get(&name) {
        out.push_str(value);
    }
}
