// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Interpreter core for the DYNAMO system-dynamics modeling language.
//!
//! DYNAMO models continuous systems as difference equations over levels
//! (state), rates (flows), auxiliaries and constants, advanced with
//! Euler steps of a model-defined DT. This crate ingests a source deck,
//! builds a typed equation graph, orders it by dependencies and drives
//! the deterministic step loop; print and plot sinks sample the state
//! once per period.
//!
//! ```no_run
//! use dynamo_engine::Model;
//!
//! let deck = "\
//! L  COFFEE.K=COFFEE.J+DT*CHNG.JK
//! R  CHNG.KL=CONST*(ROOM-COFFEE.K)
//! C  CONST=0.2
//! C  ROOM=20
//! N  COFFEE=90
//! SPEC DT=1/LENGTH=10/PRTPER=1
//! RUN COOLING
//! ";
//! let mut mdl = Model::new();
//! mdl.parse(deck.as_bytes()).unwrap();
//! mdl.quit().unwrap();
//! ```

pub mod ast;
pub mod common;
pub mod equation;
pub mod eqnlist;
pub mod functions;
pub mod model;
pub mod name;
pub mod output;
pub mod parse;
pub mod plotter;
pub mod printer;
pub mod table;
pub mod token;

pub use common::{Error, ErrorCode, ErrorKind, Result};
pub use eqnlist::EqnList;
pub use equation::Equation;
pub use model::{Model, State};
pub use name::Name;
pub use output::DebugSink;
pub use parse::Line;
pub use plotter::{PlotFormat, Plotter};
pub use printer::{PrintFormat, Printer};
pub use table::Table;
