//! # Textual pre-processing of config files.
//!
//! Config files may carry `{{ ... }}` directives that are expanded against
//! the ambient environment before YAML parsing. Exactly three functions are
//! supported:
//!
//! - `env "NAME"` — the value of the variable, nil when unset.
//! - `default a b ...` — the first non-nil argument.
//! - `required v` — the argument, or an expansion error when nil.
//!
//! Arguments are quoted literals or parenthesized sub-calls, so
//! `{{ default (env "PORT") "8080" }}` works. A nil result renders as the
//! empty string. Text without directives passes through untouched, which
//! makes expansion idempotent on already-expanded files.
//!
//! Expansion runs twice per startup: once to learn the secret commands, and
//! again after secrets have been exported so their values resolve.

use crate::error::ConfigError;

/// A directive value: `None` means nil (e.g. an unset variable).
type Value = Option<String>;

/// Expands every `{{ ... }}` directive in `source`.
pub fn expand(source: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| ConfigError::Template {
            reason: "unterminated {{ directive".to_string(),
        })?;
        let body = &after[..end];
        let value = eval_call(&mut Tokens::new(body))
            .map_err(|reason| ConfigError::Template { reason })?;
        out.push_str(value.as_deref().unwrap_or(""));
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Cursor over the inside of one directive.
struct Tokens<'a> {
    rest: &'a str,
}

enum Token<'a> {
    Word(&'a str),
    Literal(String),
    Open,
    Close,
}

impl<'a> Tokens<'a> {
    fn new(body: &'a str) -> Self {
        Self { rest: body }
    }

    fn next(&mut self) -> Result<Option<Token<'a>>, String> {
        self.rest = self.rest.trim_start();
        let mut chars = self.rest.chars();
        let Some(first) = chars.next() else {
            return Ok(None);
        };

        match first {
            '(' => {
                self.rest = &self.rest[1..];
                Ok(Some(Token::Open))
            }
            ')' => {
                self.rest = &self.rest[1..];
                Ok(Some(Token::Close))
            }
            '"' => {
                let inner = &self.rest[1..];
                let close = inner
                    .find('"')
                    .ok_or_else(|| "unterminated string literal".to_string())?;
                let literal = inner[..close].to_string();
                self.rest = &inner[close + 1..];
                Ok(Some(Token::Literal(literal)))
            }
            _ => {
                let len = self
                    .rest
                    .find(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == '"')
                    .unwrap_or(self.rest.len());
                let word = &self.rest[..len];
                self.rest = &self.rest[len..];
                Ok(Some(Token::Word(word)))
            }
        }
    }
}

/// Evaluates one function call: a function word followed by its arguments,
/// consuming tokens until the body (or a closing paren) runs out.
fn eval_call(tokens: &mut Tokens<'_>) -> Result<Value, String> {
    let func = match tokens.next()? {
        Some(Token::Word(w)) => w.to_string(),
        Some(_) => return Err("expected a function name".to_string()),
        None => return Err("empty directive".to_string()),
    };

    let mut args: Vec<Value> = Vec::new();
    loop {
        match tokens.next()? {
            Some(Token::Literal(s)) => args.push(Some(s)),
            Some(Token::Open) => {
                let inner = eval_call(tokens)?;
                args.push(inner);
            }
            Some(Token::Close) | None => break,
            Some(Token::Word(w)) => {
                return Err(format!("unexpected bare word {w:?} in arguments"));
            }
        }
    }

    apply(&func, args)
}

fn apply(func: &str, args: Vec<Value>) -> Result<Value, String> {
    match func {
        "env" => match args.as_slice() {
            [Some(name)] => Ok(std::env::var(name).ok()),
            _ => Err("env takes exactly one string argument".to_string()),
        },
        "default" => {
            if args.is_empty() {
                return Err("default needs at least one argument".to_string());
            }
            match args.into_iter().flatten().next() {
                Some(v) => Ok(Some(v)),
                None => Err("default: all arguments are nil".to_string()),
            }
        }
        "required" => match args.as_slice() {
            [Some(v)] => Ok(Some(v.clone())),
            [None] => Err("required argument is missing".to_string()),
            _ => Err("required takes exactly one argument".to_string()),
        },
        other => Err(format!("unknown template function {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        let text = "processes:\n  main_processes: []\n";
        assert_eq!(expand(text).unwrap(), text);
    }

    #[test]
    fn expansion_is_idempotent_without_directives() {
        let text = "a: b\nc: d\n";
        let once = expand(text).unwrap();
        assert_eq!(expand(&once).unwrap(), once);
    }

    #[test]
    fn env_resolves_and_unset_renders_empty() {
        std::env::set_var("LAUNCH_TPL_TEST", "hello");
        assert_eq!(expand(r#"x: {{ env "LAUNCH_TPL_TEST" }}"#).unwrap(), "x: hello");
        assert_eq!(expand(r#"x: {{ env "LAUNCH_TPL_UNSET" }}"#).unwrap(), "x: ");
    }

    #[test]
    fn default_picks_first_non_nil() {
        std::env::remove_var("LAUNCH_TPL_GONE");
        let out = expand(r#"p: {{ default (env "LAUNCH_TPL_GONE") "8080" }}"#).unwrap();
        assert_eq!(out, "p: 8080");

        std::env::set_var("LAUNCH_TPL_PORT", "9090");
        let out = expand(r#"p: {{ default (env "LAUNCH_TPL_PORT") "8080" }}"#).unwrap();
        assert_eq!(out, "p: 9090");
    }

    #[test]
    fn required_fails_on_nil() {
        std::env::remove_var("LAUNCH_TPL_MISSING");
        let err = expand(r#"{{ required (env "LAUNCH_TPL_MISSING") }}"#).unwrap_err();
        assert!(err.to_string().contains("required argument is missing"));
    }

    #[test]
    fn unknown_function_is_an_error() {
        assert!(expand(r#"{{ lower "X" }}"#).is_err());
    }

    #[test]
    fn unterminated_directive_is_an_error() {
        assert!(expand("x: {{ env \"A\"").is_err());
    }
}
