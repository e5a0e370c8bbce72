// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Line-structured reader for DYNAMO source decks.
//!
//! Every statement is one physical line: the first whitespace-delimited
//! token is the mode, the remainder the statement body. Lines whose
//! first character is `X` continue the pending statement. Equation-like
//! modes may carry a trailing free-form comment after the body.

use std::io::{BufRead, BufReader, Read};

use crate::common::Result;
use crate::model::Model;
use crate::parse_err;

/// Max. length of a source line in strict mode.
pub const MAX_LINE_LENGTH: usize = 72;

/// One statement from the source stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub mode: String,
    pub stmt: String,
    pub comment: String,
}

impl Line {
    pub fn new(mode: &str, stmt: &str) -> Self {
        Line {
            mode: mode.to_string(),
            stmt: stmt.to_string(),
            comment: String::new(),
        }
    }
}

// trim and collapse runs of spaces
fn compact(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for part in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}

impl Model {
    /// Read a DYNAMO source stream into the model, dispatching each
    /// complete statement. The attached source line of a statement is
    /// that of its first physical line.
    pub fn parse<R: Read>(&mut self, src: R) -> Result<()> {
        let reader = BufReader::new(src);
        let mut pending = String::new();
        let mut pending_no = 0;
        let mut line_no = 0;
        for line in reader.lines() {
            line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    return parse_err!(Syntax, "{}", err).map_err(|e| e.with_line(line_no))
                }
            };
            if self.strict && line.len() > MAX_LINE_LENGTH {
                return parse_err!(LineLength, "{} characters", line.len())
                    .map_err(|e| e.with_line(line_no));
            }
            let line = line.to_uppercase();
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with('X') {
                pending.push_str(line[1..].trim());
                continue;
            }
            self.flush_statement(&pending, pending_no)?;
            pending = line;
            pending_no = line_no;
        }
        self.flush_statement(&pending, pending_no)
    }

    fn flush_statement(&mut self, input: &str, line_no: usize) -> Result<()> {
        if input.is_empty() {
            return Ok(());
        }
        let (mode, rest) = match input.split_once(' ') {
            Some(parts) => parts,
            // a bare mode token carries no statement
            None => return Ok(()),
        };
        let rest = rest.trim();
        let mut line = Line::new(mode, rest);
        if mode.len() == 1 && "CNARLST".contains(mode) {
            if let Some((stmt, comment)) = rest.split_once(' ') {
                line.stmt = stmt.to_string();
                line.comment = compact(comment);
            }
        }
        self.add_statement(&line).map_err(|e| e.with_line(line_no))
    }
}
