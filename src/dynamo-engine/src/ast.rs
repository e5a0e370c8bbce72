// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Expression trees and the recursive-descent parser for the equation
//! grammar:
//!
//! ```text
//! expr    = sum ;
//! sum     = prod , { ("+" | "-") , prod } ;
//! prod    = unary , { ("*" | "/") , unary } ;
//! unary   = ["-"] , atom ;
//! atom    = NUMBER | call | name | "(" , expr , ")" ;
//! call    = IDENT , "(" , [ expr , { "," , expr } ] , ")" ;
//! name    = IDENT , [ "." , IDENT ] ;
//! ```

use std::fmt;

use crate::common::Result;
use crate::name::Name;
use crate::parse_err;
use crate::token::{tokenize, Token};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negative,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Numeric literal with its source spelling preserved.
    Const(String, f64),
    Var(Name),
    /// Function call; hidden per-call variables are appended to the
    /// argument list when the enclosing equation is built.
    App(String, Vec<Expr>),
    Op1(UnaryOp, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Const(text, _) => write!(f, "{}", text),
            Expr::Var(name) => write!(f, "{}", name.qualified()),
            Expr::App(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Op1(UnaryOp::Negative, r) => write!(f, "-{}", r),
            Expr::Op2(op, l, r) => {
                let op = match op {
                    BinaryOp::Add => '+',
                    BinaryOp::Sub => '-',
                    BinaryOp::Mul => '*',
                    BinaryOp::Div => '/',
                };
                write!(f, "({}{}{})", l, op, r)
            }
        }
    }
}

struct Parser<'input> {
    toks: Vec<Token<'input>>,
    pos: usize,
    strict: bool,
}

impl<'input> Parser<'input> {
    fn peek(&self) -> Option<Token<'input>> {
        self.toks.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token<'input>> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, tok: Token) -> Result<()> {
        match self.bump() {
            Some(t) if t == tok => Ok(()),
            Some(t) => parse_err!(Syntax, "expected {:?}, found {:?}", tok, t),
            None => parse_err!(Syntax, "unexpected end of statement"),
        }
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut lhs = self.prod()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.prod()?;
            lhs = Expr::Op2(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn prod(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Mul) => BinaryOp::Mul,
                Some(Token::Div) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Op2(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if let Some(Token::Minus) = self.peek() {
            self.bump();
            let inner = self.atom()?;
            return Ok(Expr::Op1(UnaryOp::Negative, Box::new(inner)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.bump() {
            Some(Token::Num(text)) => match text.parse::<f64>() {
                Ok(v) => Ok(Expr::Const(text.to_string(), v)),
                Err(_) => parse_err!(NotANumber, "{}", text),
            },
            Some(Token::Ident(text)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.bump();
                    let args = self.call_args()?;
                    Ok(Expr::App(text.to_string(), args))
                } else {
                    Ok(Expr::Var(Name::parse(text, self.strict)?))
                }
            }
            Some(Token::LParen) => {
                let inner = self.sum()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(t) => parse_err!(Syntax, "unexpected {:?}", t),
            None => parse_err!(Syntax, "unexpected end of statement"),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.sum()?);
            match self.bump() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(t) => return parse_err!(Syntax, "unexpected {:?} in argument list", t),
                None => return parse_err!(Syntax, "unterminated argument list"),
            }
        }
    }
}

/// Rewrite the adjacent-parenthesis multiplication shortcut `)(` into an
/// explicit multiplication before tokenizing.
fn expand_shortcuts(text: &str) -> String {
    text.replace(")(", ")*(")
}

/// Parse a full `LHS=RHS` statement into two expression trees.
pub fn parse_equation(text: &str, strict: bool) -> Result<(Expr, Expr)> {
    let text = expand_shortcuts(text);
    let toks = tokenize(&text)?;
    let mut p = Parser {
        toks,
        pos: 0,
        strict,
    };
    let lhs = p.sum()?;
    p.expect(Token::Eq)?;
    let rhs = p.sum()?;
    if p.pos != p.toks.len() {
        return parse_err!(Syntax, "trailing input after expression");
    }
    Ok((lhs, rhs))
}

/// Parse a bare right-hand-side expression.
pub fn parse_expr(text: &str, strict: bool) -> Result<Expr> {
    let text = expand_shortcuts(text);
    let toks = tokenize(&text)?;
    let mut p = Parser {
        toks,
        pos: 0,
        strict,
    };
    let expr = p.sum()?;
    if p.pos != p.toks.len() {
        return parse_err!(Syntax, "trailing input after expression");
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::name::{Kind, Stage};

    #[test]
    fn test_precedence() {
        let e = parse_expr("A+B*C", true).unwrap();
        assert_eq!("(A+(B*C))", e.to_string());
        let e = parse_expr("(A+B)*C", true).unwrap();
        assert_eq!("((A+B)*C)", e.to_string());
    }

    #[test]
    fn test_unary_negation() {
        let e = parse_expr("-A+B", true).unwrap();
        assert_eq!("(-A+B)", e.to_string());
        let e = parse_expr("A*-2", true).unwrap();
        assert_eq!("(A*-2)", e.to_string());
    }

    #[test]
    fn test_paren_multiplication_shortcut() {
        let e = parse_expr("(DT)(CHNG.JK)", true).unwrap();
        assert_eq!("(DT*CHNG.JK)", e.to_string());
    }

    #[test]
    fn test_equation_split() {
        let (lhs, rhs) = parse_equation("COFFEE.K=COFFEE.J+DT*CHNG.JK", true).unwrap();
        match lhs {
            Expr::Var(name) => {
                assert_eq!("COFFEE", name.text);
                assert_eq!(Kind::Level, name.kind);
                assert_eq!(Stage::New, name.stage);
            }
            other => panic!("expected variable target, got {:?}", other),
        }
        assert_eq!("(COFFEE.J+(DT*CHNG.JK))", rhs.to_string());
    }

    #[test]
    fn test_call() {
        let e = parse_expr("TABLE(TAB,X.K,0,1,0.2)", true).unwrap();
        match &e {
            Expr::App(name, args) => {
                assert_eq!("TABLE", name);
                assert_eq!(5, args.len());
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_call() {
        let e = parse_expr("MAX(0,MIN(A.K,B.K))", true).unwrap();
        assert_eq!("MAX(0,MIN(A.K,B.K))", e.to_string());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_expr("A+", true).unwrap_err().is_a(ErrorCode::Syntax));
        assert!(parse_expr("(A", true).unwrap_err().is_a(ErrorCode::Syntax));
        assert!(parse_expr("A B", true).is_err());
        assert!(parse_equation("A", true).unwrap_err().is_a(ErrorCode::Syntax));
    }

    #[test]
    fn test_double_operator_is_syntax_error() {
        assert!(parse_equation("INV.K=INV.J+DT**CHNG.JK", true)
            .unwrap_err()
            .is_a(ErrorCode::Syntax));
    }
}
