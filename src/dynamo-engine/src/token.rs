// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Tokenizer for a single equation statement. The input has already been
//! upper-cased and stripped of spaces by the line reader and dispatcher.
//! The `=` between the two sides of an equation is an ordinary token
//! here; the expression parser splits it out.

use std::str::CharIndices;

use lazy_static::lazy_static;
use regex::Regex;

use crate::common::Result;
use crate::parse_err;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
    Plus,
    Minus,
    Mul,
    Div,
    LParen,
    RParen,
    Comma,
    Eq,
    Ident(&'input str),
    Num(&'input str),
}

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.bump_n(1)
    }

    fn bump_n(&mut self, n: usize) -> Option<(usize, char)> {
        assert!(n > 0);
        self.lookahead = self.chars.nth(n - 1);
        self.lookahead
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> usize
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => return self.text.len(),
                Some((idx, c)) => {
                    if keep_going(c) {
                        self.bump();
                    } else {
                        return idx;
                    }
                }
            }
        }
    }

    /// An identifier is a head of letters, digits and underscores,
    /// optionally followed by a dotted index (`COFFEE.K`). A dot is only
    /// consumed when a letter follows, so `X.5` stays two tokens.
    fn identifierish(&mut self, idx0: usize) -> Token<'input> {
        let mut end = self.take_while(|c| c.is_alphanumeric() || c == '_');
        if let Some((dot, '.')) = self.lookahead {
            let next_is_letter = self.text[dot + 1..]
                .chars()
                .next()
                .map(|c| c.is_alphabetic())
                .unwrap_or(false);
            if next_is_letter {
                self.bump();
                end = self.take_while(|c| c.is_alphabetic());
            }
        }
        Token::Ident(&self.text[idx0..end])
    }

    fn number(&mut self, idx0: usize) -> Token<'input> {
        lazy_static! {
            static ref NUMBER_RE: Regex =
                Regex::new(r"^(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?").unwrap();
        }
        let m = NUMBER_RE.find(&self.text[idx0..]).unwrap();
        self.bump_n(m.end());
        Token::Num(&self.text[idx0..idx0 + m.end()])
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Token<'input>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, c) = self.lookahead?;
        let tok = match c {
            '+' => {
                self.bump();
                Token::Plus
            }
            '-' => {
                self.bump();
                Token::Minus
            }
            '*' => {
                self.bump();
                Token::Mul
            }
            '/' => {
                self.bump();
                Token::Div
            }
            '(' => {
                self.bump();
                Token::LParen
            }
            ')' => {
                self.bump();
                Token::RParen
            }
            ',' => {
                self.bump();
                Token::Comma
            }
            '=' => {
                self.bump();
                Token::Eq
            }
            c if c.is_alphabetic() || c == '_' => self.identifierish(idx),
            c if c.is_ascii_digit() => self.number(idx),
            '.' => {
                // a leading dot starts a number only when a digit follows
                let digit_next = self.text[idx + 1..]
                    .chars()
                    .next()
                    .map(|c| c.is_ascii_digit())
                    .unwrap_or(false);
                if digit_next {
                    self.number(idx)
                } else {
                    return Some(parse_err!(Syntax, "unexpected '.'"));
                }
            }
            c if "^%<>&|!".contains(c) => {
                return Some(parse_err!(InvalidOp, "'{}'", c))
            }
            c => return Some(parse_err!(Syntax, "unexpected character '{}'", c)),
        };
        Some(Ok(tok))
    }
}

/// Collect all tokens of a statement, failing on the first bad character.
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    Lexer::new(text).collect()
}

#[cfg(test)]
mod tests {
    use super::Token::*;
    use super::*;

    fn toks(text: &str) -> Vec<Token> {
        tokenize(text).unwrap()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            vec![Ident("A"), Eq, Ident("B"), Plus, Num("2"), Mul, LParen, Ident("C"), Minus, Num("1"), RParen],
            toks("A=B+2*(C-1)")
        );
    }

    #[test]
    fn test_indexed_idents() {
        assert_eq!(
            vec![Ident("COFFEE.K"), Eq, Ident("COFFEE.J"), Plus, Ident("DT"), Mul, Ident("CHNG.JK")],
            toks("COFFEE.K=COFFEE.J+DT*CHNG.JK")
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(vec![Num("0.2")], toks("0.2"));
        assert_eq!(vec![Num(".125")], toks(".125"));
        assert_eq!(vec![Num("1E3")], toks("1E3"));
        assert_eq!(vec![Num("2.5E-2")], toks("2.5E-2"));
        assert_eq!(vec![Num("3.")], toks("3."));
    }

    #[test]
    fn test_dot_not_followed_by_letter() {
        // X.5 is the identifier X followed by the number .5
        assert_eq!(vec![Ident("X"), Num(".5")], toks("X.5"));
    }

    #[test]
    fn test_generated_names() {
        assert_eq!(vec![Ident("_1"), Comma, Ident("_2")], toks("_1,_2"));
    }

    #[test]
    fn test_bad_char() {
        use crate::common::ErrorCode;
        assert!(tokenize("A=B^2").unwrap_err().is_a(ErrorCode::InvalidOp));
        assert!(tokenize("A=B?2").unwrap_err().is_a(ErrorCode::Syntax));
    }
}
