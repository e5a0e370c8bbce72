// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::cmp::Ordering;
use std::fmt;
use std::{error, result};

use float_cmp::approx_eq;

/// Tolerance used wherever two model values are compared for equality.
pub const EPSILON: f64 = 1e-9;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // parsing
    LineLength,
    InvalidSpace,
    InvalidMode,
    InvalidName,
    InvalidIndex,
    NameLength,
    Syntax,
    InvalidOp,
    TableTooSmall,
    UnknownFunction,
    InvalidNumArgs,
    MacroDepth,
    NotANumber,
    // modeling
    DependencyLoop,
    EqnBadTargetStage,
    EqnBadMode,
    EqnOverwrite,
    EqnBadTargetKind,
    EqnBadDependClass,
    UnknownEqn,
    FunctionArg,
    NoVariable,
    VariableExists,
    NoSuchTable,
    WrongTableSize,
    NoTime,
    MaxRetry,
    MissingDef,
    NoData,
    EqnAmbigious,
    NotAvailable,
    // output
    PlotRange,
    PlotMode,
    PlotNoVar,
    PrintMode,
    PrintNoVar,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let msg = match self {
            LineLength => "Line too long",
            InvalidSpace => "Space in equation",
            InvalidMode => "Line does not start with a valid mode",
            InvalidName => "Invalid variable name",
            InvalidIndex => "Invalid variable index",
            NameLength => "Variable name too long",
            Syntax => "Syntax error",
            InvalidOp => "Unknown operand",
            TableTooSmall => "Not enough table elements",
            UnknownFunction => "Unknown function",
            InvalidNumArgs => "Invalid number of arguments",
            MacroDepth => "Invalid nesting for macro function",
            NotANumber => "Not a number",
            DependencyLoop => "Equations have cyclic dependencies",
            EqnBadTargetStage => "Wrong stage for equation target",
            EqnBadMode => "Wrong mode for equation",
            EqnOverwrite => "Equation overwrite",
            EqnBadTargetKind => "Wrong kind for equation target",
            EqnBadDependClass => "Wrong class for equation dependency",
            UnknownEqn => "No defining equation for variable found",
            FunctionArg => "Invalid function argument",
            NoVariable => "No variable found",
            VariableExists => "Variable already known",
            NoSuchTable => "No such table",
            WrongTableSize => "Table size mismatch",
            NoTime => "No TIME defined",
            MaxRetry => "Retry limit reached",
            MissingDef => "Missing definition of value",
            NoData => "No data available",
            EqnAmbigious => "Ambiguous equations for variable",
            NotAvailable => "Not available",
            PlotRange => "Range failure",
            PlotMode => "Unknown plotting mode",
            PlotNoVar => "No such plot variable",
            PrintMode => "Unknown printing mode",
            PrintNoVar => "No such print variable",
        };
        write!(f, "{}", msg)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Parsing,
    Model,
    Output,
}

/// Error is the failure side of every fallible operation in the
/// interpreter. The source line is attached by the highest layer that
/// knows it (the line reader and the statement dispatcher).
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
    pub line: Option<usize>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
            line: None,
        }
    }

    /// Attach a source line, unless a deeper layer already did.
    pub fn with_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    pub fn is_a(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        match self.details {
            Some(ref details) => write!(f, "{}: {}", self.code, details),
            None => write!(f, "{}", self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! parse_err {
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Parsing, ErrorCode::$code, None))
    }};
    ($code:tt, $($arg:tt)*) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Parsing,
            ErrorCode::$code,
            Some(format!($($arg)*)),
        ))
    }};
}

#[macro_export]
macro_rules! model_err {
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Model, ErrorCode::$code, None))
    }};
    ($code:tt, $($arg:tt)*) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Model,
            ErrorCode::$code,
            Some(format!($($arg)*)),
        ))
    }};
}

#[macro_export]
macro_rules! out_err {
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Output, ErrorCode::$code, None))
    }};
    ($code:tt, $($arg:tt)*) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Output,
            ErrorCode::$code,
            Some(format!($($arg)*)),
        ))
    }};
}

/// Three-way compare with the model-wide epsilon tolerance. Values
/// closer than [EPSILON] are considered equal.
pub fn compare(a: f64, b: f64) -> Ordering {
    if approx_eq!(f64, a, b, epsilon = EPSILON) {
        Ordering::Equal
    } else if a > b {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

/// Epsilon-tolerant equality.
pub fn approx(a: f64, b: f64) -> bool {
    compare(a, b) == Ordering::Equal
}
