//! Tokenizer for APL source text
//!
//! Produces a flat token stream with line positions for diagnostics.
//! Whitespace and newlines separate tokens and are otherwise ignored.

use crate::error::CompileError;

/// Token kinds, including the reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // literals and identifiers
    Ident,
    Integer,
    Real,

    // reserved words
    Int,
    Float,
    Void,
    Main,
    If,
    Else,
    While,
    Return,

    // punctuation and operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    Semicolon,
    Comma,
    Assign,
    Amp,
    Star,
    Plus,
    Minus,
    Slash,
    Not,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
}

/// A token with its source text and 0-indexed line number.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
        }
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    match word {
        "int" => Some(TokenKind::Int),
        "float" => Some(TokenKind::Float),
        "void" => Some(TokenKind::Void),
        "main" => Some(TokenKind::Main),
        "if" => Some(TokenKind::If),
        "else" => Some(TokenKind::Else),
        "while" => Some(TokenKind::While),
        "return" => Some(TokenKind::Return),
        _ => None,
    }
}

/// Tokenize a full source file.
///
/// An unrecognized character is a terminal syntax error (the run is
/// single-shot; there is no skip-and-continue).
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // identifiers and reserved words
        if c == '_' || c.is_ascii_alphabetic() {
            let start = i;
            while i < chars.len() && (chars[i] == '_' || chars[i].is_ascii_alphanumeric()) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let kind = keyword(&word).unwrap_or(TokenKind::Ident);
            tokens.push(Token::new(kind, word, line));
            continue;
        }

        // numbers: `12`, `12.5`, `12.`, `.5`
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            let start = i;
            let mut seen_dot = false;
            while i < chars.len() {
                if chars[i].is_ascii_digit() {
                    i += 1;
                } else if chars[i] == '.' && !seen_dot {
                    seen_dot = true;
                    i += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let kind = if seen_dot {
                TokenKind::Real
            } else {
                TokenKind::Integer
            };
            tokens.push(Token::new(kind, text, line));
            continue;
        }

        // two-character operators first (maximal munch)
        let next = chars.get(i + 1).copied();
        let two = match (c, next) {
            ('<', Some('=')) => Some((TokenKind::Le, "<=")),
            ('>', Some('=')) => Some((TokenKind::Ge, ">=")),
            ('=', Some('=')) => Some((TokenKind::EqEq, "==")),
            ('!', Some('=')) => Some((TokenKind::Ne, "!=")),
            ('&', Some('&')) => Some((TokenKind::AndAnd, "&&")),
            ('|', Some('|')) => Some((TokenKind::OrOr, "||")),
            _ => None,
        };
        if let Some((kind, text)) = two {
            tokens.push(Token::new(kind, text, line));
            i += 2;
            continue;
        }

        let one = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            ';' => Some(TokenKind::Semicolon),
            ',' => Some(TokenKind::Comma),
            '=' => Some(TokenKind::Assign),
            '&' => Some(TokenKind::Amp),
            '*' => Some(TokenKind::Star),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '/' => Some(TokenKind::Slash),
            '!' => Some(TokenKind::Not),
            '<' => Some(TokenKind::Lt),
            '>' => Some(TokenKind::Gt),
            _ => None,
        };
        match one {
            Some(kind) => {
                tokens.push(Token::new(kind, c.to_string(), line));
                i += 1;
            }
            None => {
                return Err(CompileError::Syntax(format!(
                    "illegal character '{}' at line {}",
                    c,
                    line + 1
                )));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            kinds("int floaty void main"),
            vec![
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::Void,
                TokenKind::Main
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let toks = tokenize("12 3.5 .5 7.").expect("tokenize failed");
        assert_eq!(toks[0].kind, TokenKind::Integer);
        assert_eq!(toks[1].kind, TokenKind::Real);
        assert_eq!(toks[2].kind, TokenKind::Real);
        assert_eq!(toks[2].text, ".5");
        assert_eq!(toks[3].kind, TokenKind::Real);
        assert_eq!(toks[3].text, "7.");
    }

    #[test]
    fn test_maximal_munch_operators() {
        assert_eq!(
            kinds("< <= == = != && & || !"),
            vec![
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::EqEq,
                TokenKind::Assign,
                TokenKind::Ne,
                TokenKind::AndAnd,
                TokenKind::Amp,
                TokenKind::OrOr,
                TokenKind::Not
            ]
        );
    }

    #[test]
    fn test_line_tracking() {
        let toks = tokenize("int a;\nwhile (a)\n  a = 1;").expect("tokenize failed");
        assert_eq!(toks[0].line, 0);
        let while_tok = toks.iter().find(|t| t.kind == TokenKind::While).unwrap();
        assert_eq!(while_tok.line, 1);
        let one = toks.iter().find(|t| t.text == "1").unwrap();
        assert_eq!(one.line, 2);
    }

    #[test]
    fn test_illegal_character() {
        let err = tokenize("int a @ b;").unwrap_err();
        assert!(err.to_string().contains("illegal character '@'"));
    }
}
