use thiserror::Error;

use crate::extract::normalize;

/// Keywords that never appear in a read-only statement
const DENIED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE", "MERGE", "UPSERT",
    "INTO", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "COPY", "CALL", "EXEC", "EXECUTE", "LOCK",
];

/// Keywords a read-only statement may open with
const ALLOWED_LEADERS: &[&str] = &["SELECT", "WITH"];

/// Why a statement was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("statement is empty")]
    Empty,

    #[error("statement must start with SELECT or WITH, found {0}")]
    NotReadOnly(String),

    #[error("statement contains the keyword {0}")]
    DeniedKeyword(&'static str),

    #[error("only a single statement is allowed")]
    MultipleStatements,

    #[error("statement has an unterminated literal or comment")]
    Unterminated,
}

/// Whether `statement` is a single read-only query
pub fn is_read_only(statement: &str) -> bool {
    classify(statement).is_ok()
}

/// Classify a statement, explaining any refusal
///
/// The statement must open with an allowed keyword and must not contain a
/// denied keyword or a statement separator anywhere outside string literals,
/// quoted identifiers and comments. A leading `SELECT` alone proves nothing:
/// `SELECT ... ; DROP ...` and `SELECT ... INTO` are both refused.
pub fn classify(statement: &str) -> Result<(), Rejection> {
    let statement = normalize(statement);
    let tokens = scan(&statement)?;

    let Some(first) = tokens.first() else {
        return Err(Rejection::Empty);
    };

    match first {
        Token::Word(word) if ALLOWED_LEADERS.contains(&word.as_str()) => {}
        Token::Word(word) => return Err(Rejection::NotReadOnly(word.clone())),
        Token::Separator => return Err(Rejection::NotReadOnly(";".to_owned())),
    }

    for token in &tokens {
        match token {
            Token::Separator => return Err(Rejection::MultipleStatements),
            Token::Word(word) => {
                if let Some(denied) = DENIED_KEYWORDS.iter().copied().find(|denied| *denied == word.as_str()) {
                    return Err(Rejection::DeniedKeyword(denied));
                }
            }
        }
    }

    Ok(())
}

/// Significant tokens of a statement
#[derive(Debug, PartialEq, Eq)]
enum Token {
    /// A bare word, upper-cased
    Word(String),
    /// `;`
    Separator,
}

/// Split a statement into bare words and separators
///
/// String literals, quoted identifiers and comments are skipped entirely, so
/// a keyword inside `'...'` or `-- ...` is never seen.
fn scan(statement: &str) -> Result<Vec<Token>, Rejection> {
    let mut tokens = Vec::new();
    let mut chars = statement.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => skip_quoted(&mut chars, c)?,
            '[' => skip_quoted(&mut chars, ']')?,
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                let mut closed = false;
                for c in chars.by_ref() {
                    if previous == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    previous = c;
                }
                if !closed {
                    return Err(Rejection::Unterminated);
                }
            }
            ';' => tokens.push(Token::Separator),
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' || next == '$' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word.to_ascii_uppercase()));
            }
            // Numbers glued to letters (e.g. `1e5`) must not start a word
            c if c.is_ascii_digit() => {
                while chars.peek().is_some_and(|next| next.is_alphanumeric() || *next == '.' || *next == '_') {
                    chars.next();
                }
            }
            _ => {}
        }
    }

    Ok(tokens)
}

/// Consume a quoted run up to `close`; a doubled `close` is an escaped quote
fn skip_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, close: char) -> Result<(), Rejection> {
    while let Some(c) = chars.next() {
        if c == close {
            if chars.peek() == Some(&close) {
                chars.next();
                continue;
            }
            return Ok(());
        }
    }

    Err(Rejection::Unterminated)
}
