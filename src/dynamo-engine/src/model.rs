// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The model: equation list, tables, the two-state value ring and the
//! runtime loop.
//!
//! Statements stream in through [crate::parse]; `RUN` triggers a
//! simulation of everything gathered so far, `EDIT` recalls a stashed
//! equation list for selective replacement. Within a step the loop
//! evaluates auxiliaries and rates against the current state, promotes
//! it to the previous state, then computes levels and supplements.

use std::cmp::Ordering;
use std::collections::HashMap;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{compare, Result};
use crate::equation::Equation;
use crate::eqnlist::EqnList;
use crate::name::{AutoVars, Kind, Name, Stage};
use crate::output::DebugSink;
use crate::parse::Line;
use crate::plotter::Plotter;
use crate::printer::Printer;
use crate::table::Table;
use crate::{model_err, parse_err};

/// A collection of named variable values.
pub type State = HashMap<String, f64>;

/// Reserved names that never participate in dependency resolution.
pub const SYSTEM_NAMES: [&str; 5] = ["TIME", "DT", "LENGTH", "PLTPER", "PRTPER"];

const SYSTEM_DEFAULTS: [(&str, f64); 5] = [
    ("TIME", 0.0),
    ("DT", 0.1),
    ("LENGTH", 10.0),
    ("PLTPER", 0.0),
    ("PRTPER", 0.0),
];

pub struct Model {
    pub title: String,
    pub run_id: String,
    pub verbose: bool,
    pub strict: bool,
    pub equations: EqnList,
    pub tables: HashMap<String, Table>,
    pub previous: State,
    pub current: State,
    printer: Printer,
    plotter: Plotter,
    debug: DebugSink,
    stack: HashMap<String, EqnList>,
    editing: bool,
    autos: AutoVars,
    rng: StdRng,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::with_sinks(Printer::disabled(), Plotter::disabled(), DebugSink::disabled())
    }

    /// A model whose NOISE sequence is reproducible.
    pub fn with_seed(seed: u64) -> Self {
        let mut mdl = Self::new();
        mdl.rng = StdRng::seed_from_u64(seed);
        mdl
    }

    pub fn with_sinks(printer: Printer, plotter: Plotter, debug: DebugSink) -> Self {
        Model {
            title: String::new(),
            run_id: String::new(),
            verbose: false,
            strict: true,
            equations: EqnList::new(),
            tables: HashMap::new(),
            previous: State::new(),
            current: State::new(),
            printer,
            plotter,
            debug,
            stack: HashMap::new(),
            editing: false,
            autos: AutoVars::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Release the output handles. Every sink is closed even when an
    /// earlier one fails; the first failure is reported.
    pub fn quit(&mut self) -> Result<()> {
        let debug = self.debug.close();
        let print = self.printer.close();
        let plot = self.plotter.close();
        debug.and(print).and(plot)
    }

    //------------------------------------------------------------------
    // state access
    //------------------------------------------------------------------

    /// Read a variable per its stage: NONE and NEW from the current
    /// state, OLD from the previous one.
    pub fn get(&self, name: &Name) -> Result<f64> {
        let state = match name.stage {
            Stage::None | Stage::New => &self.current,
            Stage::Old => &self.previous,
        };
        match state.get(&name.text) {
            Some(v) => Ok(*v),
            None => model_err!(NoVariable, "{}", name.text),
        }
    }

    /// Assign a variable. All writes land in the current state; the
    /// previous state is only ever produced by promotion.
    pub fn set(&mut self, name: &Name, val: f64) {
        self.debug.trace(format_args!(">    {} = {}\n", name, val));
        self.current.insert(name.text.clone(), val);
    }

    /// Raw read of the current state, for system names and the hidden
    /// variables of stateful functions.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.current.get(key).copied()
    }

    pub fn set_value(&mut self, key: &str, val: f64) {
        self.current.insert(key.to_string(), val);
    }

    /// Promote the current state to the previous one.
    pub fn step_state(&mut self) {
        self.previous = self.current.clone();
    }

    pub fn is_system(&self, name: &str) -> bool {
        SYSTEM_NAMES.contains(&name) || self.tables.contains_key(name)
    }

    /// Uniform noise in [-0.5, 0.5).
    pub fn noise(&mut self) -> f64 {
        self.rng.gen::<f64>() - 0.5
    }

    //------------------------------------------------------------------
    // statement dispatch
    //------------------------------------------------------------------

    /// Insert a source statement into the model. Equations accumulate;
    /// `RUN` executes and stashes them, `EDIT` recalls a stash.
    pub fn add_statement(&mut self, line: &Line) -> Result<()> {
        if line.stmt.is_empty() {
            return Ok(());
        }
        self.debug
            .trace(format_args!("AddStmt: [{}] {}\n", line.mode, line.stmt));
        match line.mode.as_str() {
            "*" => self.title = line.stmt.clone(),
            "NOTE" => {}
            "L" | "R" | "C" | "N" | "A" | "S" => {
                let strict = self.strict;
                for eqn in Equation::from_statement(line, strict, &mut self.autos)? {
                    self.add_equation(eqn)?;
                }
            }
            "T" => {
                let stmt = self.prep_line(&line.stmt)?;
                let (name, values) = match stmt.split_once('=') {
                    Some(parts) => parts,
                    None => return parse_err!(Syntax, "{}", stmt),
                };
                let data = values
                    .replace('/', ",")
                    .split(',')
                    .map(|v| match v.parse::<f64>() {
                        Ok(v) => Ok(v),
                        Err(_) => parse_err!(NotANumber, "'{}'", v),
                    })
                    .collect::<Result<Vec<f64>>>()?;
                self.tables.insert(name.to_string(), Table::new(data)?);
            }
            "SPEC" => {
                // each KEY=value pair becomes an ordinary constant
                // equation, so downstream logic treats them uniformly
                let stmt = self.prep_line(&line.stmt)?;
                let strict = self.strict;
                for def in stmt.replace('/', ",").split(',') {
                    if !def.contains('=') {
                        return parse_err!(Syntax, "{}", def);
                    }
                    let synth = Line::new("C", def);
                    for eqn in Equation::from_statement(&synth, strict, &mut self.autos)? {
                        self.add_equation(eqn)?;
                    }
                }
            }
            "PRINT" => {
                let stmt = self.prep_line(&line.stmt)?;
                self.printer.prepare(&stmt)?;
            }
            "PLOT" => {
                let stmt = self.prep_line(&line.stmt)?;
                self.plotter.prepare(&stmt)?;
            }
            "RUN" => {
                self.editing = false;
                self.run_id = line.stmt.clone();
                self.run()?;
                self.output()?;
                self.stack
                    .insert(self.run_id.clone(), self.equations.clone());
            }
            "EDIT" => {
                let list = match self.stack.get(&line.stmt) {
                    Some(list) => list.clone(),
                    None => return model_err!(NotAvailable, "run '{}'", line.stmt),
                };
                self.equations = list;
                self.editing = true;
                self.printer.reset();
                self.plotter.reset();
                self.previous.clear();
                self.current.clear();
            }
            mode => return parse_err!(InvalidMode, "{}", mode),
        }
        Ok(())
    }

    fn add_equation(&mut self, eqn: Equation) -> Result<()> {
        // statement-level target discipline; N, A and S were already
        // re-classified by the equation constructor
        match eqn.mode {
            'C' => {
                if eqn.target.kind != Kind::Const {
                    return model_err!(EqnBadTargetKind, "{}", eqn.target);
                }
            }
            'L' | 'R' => {
                let want = if eqn.mode == 'L' { Kind::Level } else { Kind::Rate };
                if eqn.target.kind != want {
                    return model_err!(EqnBadTargetKind, "{}", eqn.target);
                }
                if eqn.target.stage != Stage::New {
                    return model_err!(EqnBadTargetStage, "{}", eqn.target);
                }
            }
            _ => {}
        }
        if self.editing {
            self.equations.replace(eqn);
        } else if self.equations.contains(&eqn) {
            return model_err!(EqnOverwrite, "{}", eqn);
        } else {
            self.equations.add(eqn);
        }
        Ok(())
    }

    /// Statements other than equations tolerate spaces only in lax mode.
    fn prep_line(&self, stmt: &str) -> Result<String> {
        if stmt.contains(' ') {
            if self.strict {
                return parse_err!(InvalidSpace);
            }
            return Ok(stmt.replace(' ', ""));
        }
        Ok(stmt.to_string())
    }

    //------------------------------------------------------------------
    // runtime
    //------------------------------------------------------------------

    /// Execute the model: sort and validate the equations, initialize,
    /// then iterate epochs until TIME passes LENGTH.
    pub fn run(&mut self) -> Result<()> {
        let sorted = self.equations.sort(self)?;
        sorted.validate(self)?;
        self.equations = sorted;
        self.equations.dump(self.verbose);

        // cheap clone of the Rc list, so evaluation can borrow the
        // model mutably
        let eqns = self.equations.clone();
        let (init, runtime) = eqns.split_init();

        info!("   Initializing:");
        for eqn in init {
            if "CNRA".contains(eqn.mode) {
                eqn.eval(self)?;
            }
        }
        for (name, val) in SYSTEM_DEFAULTS {
            self.current.entry(name.to_string()).or_insert(val);
        }
        self.check_model(&eqns);

        self.printer.start(&self.current)?;
        self.plotter.start(&self.current)?;

        let dt = self.current["DT"];
        let length = self.current["LENGTH"];
        let t0 = self.current["TIME"];
        if dt <= 0.0 {
            return model_err!(MissingDef, "DT must be positive, got {}", dt);
        }

        info!("   Iterating epochs:");
        let mut epoch: usize = 1;
        loop {
            let t = t0 + (epoch - 1) as f64 * dt;
            if compare(t, length) == Ordering::Greater {
                break;
            }
            for eqn in runtime {
                if eqn.mode == 'A' || eqn.mode == 'R' {
                    eqn.eval(self)?;
                }
            }
            self.step_state();
            for eqn in runtime {
                if eqn.mode == 'L' {
                    eqn.eval(self)?;
                }
            }
            for eqn in runtime {
                if eqn.mode == 'S' {
                    eqn.eval(self)?;
                }
            }
            self.printer.add(epoch, &self.current)?;
            self.plotter.add(epoch, &self.current)?;
            if let Some(time) = self.current.get_mut("TIME") {
                *time += dt;
            }
            epoch += 1;
        }
        debug!("run '{}' finished after {} epochs", self.run_id, epoch - 1);
        Ok(())
    }

    /// Emit the collected samples.
    pub fn output(&mut self) -> Result<()> {
        self.printer.generate(&self.title, &self.run_id)?;
        self.plotter.generate(&self.title, &self.run_id)?;
        Ok(())
    }

    /// Post-initialization consistency diagnostics. Nothing here fails
    /// the run; historic decks are full of harmless violations.
    fn check_model(&self, eqns: &EqnList) {
        info!("   Checking levels:");
        let mut ok = true;
        for eqn in eqns.iter().filter(|e| e.mode == 'L') {
            if !self.current.contains_key(&eqn.target.text) {
                warn!("     {} not initialized", eqn.target.text);
                ok = false;
            }
        }
        for eqn in eqns.iter().filter(|e| e.mode == 'N') {
            let lively = eqns
                .iter()
                .any(|e| "LRA".contains(e.mode) && e.target.text == eqn.target.text);
            if !lively {
                warn!("     {} has no equation", eqn.target.text);
                ok = false;
            }
        }
        for eqn in eqns.iter().filter(|e| e.mode != 'S') {
            let name = &eqn.target.text;
            if self.is_system(name) {
                continue;
            }
            let used = eqns
                .iter()
                .filter(|e| e.target.text != *name)
                .any(|e| e.reads(name));
            if !used {
                debug!("     {} is not used", name);
            }
        }
        if ok {
            info!("      No problems detected.");
        }
    }
}
