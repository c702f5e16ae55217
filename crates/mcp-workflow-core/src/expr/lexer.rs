//! Expression tokenizer.

use crate::error::{Result, WorkflowError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    /// `$name` builtin function reference.
    Function(String),
    True,
    False,
    Null,
    And,
    Or,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '=' => {
                // JSONata-style `=` with `==` tolerated
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                tokens.push(Token::Eq);
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err(unexpected(c, source));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(WorkflowError::expression(format!(
                                "unterminated string in expression: {source}"
                            )))
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = chars.get(i + 1).copied().ok_or_else(|| {
                                WorkflowError::expression(format!(
                                    "dangling escape in expression: {source}"
                                ))
                            })?;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                            i += 2;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                if end == start {
                    return Err(unexpected(c, source));
                }
                tokens.push(Token::Function(chars[start..end].iter().collect()));
                i = end;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut end = i;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    // `1.x` is a path step, not a decimal point
                    if chars[end] == '.'
                        && !chars.get(end + 1).is_some_and(|c| c.is_ascii_digit())
                    {
                        break;
                    }
                    end += 1;
                }
                let text: String = chars[start..end].iter().collect();
                let number = text.parse().map_err(|_| {
                    WorkflowError::expression(format!("invalid number {text:?} in: {source}"))
                })?;
                tokens.push(Token::Number(number));
                i = end;
            }
            c if is_ident_start(c) => {
                let start = i;
                let mut end = i;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let word: String = chars[start..end].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Ident(word),
                });
                i = end;
            }
            _ => return Err(unexpected(c, source)),
        }
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn unexpected(c: char, source: &str) -> WorkflowError {
    WorkflowError::expression(format!("unexpected character {c:?} in expression: {source}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_path() {
        let tokens = tokenize("x.y").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Ident("x".into()), Token::Dot, Token::Ident("y".into())]
        );
    }

    #[test]
    fn test_tokenize_function_call() {
        let tokens = tokenize("$string(a * 2)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Function("string".into()),
                Token::LParen,
                Token::Ident("a".into()),
                Token::Star,
                Token::Number(2.0),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(tokenize("==").unwrap(), vec![Token::Eq]);
        assert_eq!(tokenize("=").unwrap(), vec![Token::Eq]);
        assert_eq!(tokenize("!=").unwrap(), vec![Token::Ne]);
        assert_eq!(tokenize("<=").unwrap(), vec![Token::Le]);
        assert!(tokenize("!").is_err());
        assert!(tokenize("@").is_err());
    }

    #[test]
    fn test_tokenize_strings() {
        assert_eq!(tokenize("\"a b\"").unwrap(), vec![Token::Str("a b".into())]);
        assert_eq!(tokenize("'a'").unwrap(), vec![Token::Str("a".into())]);
        assert!(tokenize("\"open").is_err());
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(tokenize("1.5").unwrap(), vec![Token::Number(1.5)]);
        assert_eq!(tokenize("10").unwrap(), vec![Token::Number(10.0)]);
    }
}
