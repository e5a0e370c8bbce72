// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Equations pair a classified target with a checked formula.
//!
//! Building an equation walks the right-hand side once: every identifier
//! lands in either the dependency set (must be computed earlier in the
//! same step) or the reference set (read from the previous step, no
//! ordering constraint). Stage OLD references never constrain the sort;
//! function slots can override the rule per argument (see
//! [crate::functions::DepMode]).

use std::fmt;

use log::debug;

use crate::ast::{parse_equation, BinaryOp, Expr, UnaryOp};
use crate::common::Result;
use crate::functions::{self, DepMode};
use crate::model::Model;
use crate::name::{AutoVars, Kind, Name, Stage};
use crate::parse::Line;
use crate::{model_err, parse_err};

#[derive(Clone, Debug)]
pub struct Equation {
    pub target: Name,
    pub mode: char,
    pub formula: Expr,
    pub dependencies: Vec<Name>,
    pub references: Vec<Name>,
    stmt: String,
}

impl Equation {
    /// Convert a statement into one or more equations. Constant
    /// statements may carry several assignments in one line
    /// (`C A=1,B=2/C=3`), split from the right so each fragment parses
    /// on its own.
    pub fn from_statement(line: &Line, strict: bool, autos: &mut AutoVars) -> Result<Vec<Equation>> {
        let mode = match line.mode.as_str() {
            m if m.len() == 1 && "CNLRAS".contains(m) => m.chars().next().unwrap(),
            m => return model_err!(EqnBadMode, "{}", m),
        };
        let mut stmt = line.stmt.clone();
        if stmt.contains(' ') {
            if strict {
                return parse_err!(InvalidSpace);
            }
            stmt.retain(|c| c != ' ');
        }

        if mode == 'C' && stmt.matches('=').count() > 1 {
            let mut eqns = Vec::new();
            let mut rest = stmt.as_str();
            loop {
                let eq = match rest.rfind('=') {
                    Some(pos) => pos,
                    None => return parse_err!(Syntax, "{}", rest),
                };
                let delim = rest[..eq].rfind(|c| c == ',' || c == '/');
                match delim {
                    Some(pos) => {
                        eqns.extend(Self::single(&rest[pos + 1..], mode, strict, autos)?);
                        rest = &rest[..pos];
                    }
                    None => {
                        eqns.extend(Self::single(rest, mode, strict, autos)?);
                        break;
                    }
                }
            }
            eqns.reverse();
            return Ok(eqns);
        }

        Self::single(&stmt, mode, strict, autos)
    }

    fn single(stmt: &str, mode: char, strict: bool, autos: &mut AutoVars) -> Result<Vec<Equation>> {
        let (lhs, mut rhs) = parse_equation(stmt, strict)?;
        let mut target = match lhs {
            Expr::Var(name) => name,
            other => return parse_err!(Syntax, "invalid equation target '{}'", other),
        };

        // re-classify the target per statement mode
        match mode {
            'N' => {
                if target.kind != Kind::Const {
                    return model_err!(EqnBadTargetKind, "{}", target.qualified());
                }
                target.kind = Kind::Init;
            }
            'A' => {
                if target.kind != Kind::Level && target.kind != Kind::Rate {
                    return model_err!(EqnBadTargetKind, "{}", target.qualified());
                }
                if target.stage != Stage::New {
                    return model_err!(EqnBadTargetStage, "{}", target.qualified());
                }
                if target.kind == Kind::Rate {
                    debug!("relabeling rate {} as auxiliary", target.qualified());
                }
                target.kind = Kind::Aux;
            }
            'S' => {
                if target.kind != Kind::Level {
                    return model_err!(EqnBadTargetKind, "{}", target.qualified());
                }
                if target.stage != Stage::New {
                    return model_err!(EqnBadTargetStage, "{}", target.qualified());
                }
                target.kind = Kind::Suppl;
            }
            _ => {}
        }

        let mut eqn = Equation {
            target,
            mode,
            formula: Expr::Const(String::new(), 0.0),
            dependencies: Vec::new(),
            references: Vec::new(),
            stmt: stmt.to_string(),
        };
        eqn.walk(&mut rhs, DepMode::Normal, 0, autos)?;
        eqn.formula = rhs;
        Ok(vec![eqn])
    }

    /// Recursive walk of the right-hand side: record identifiers,
    /// resolve function calls against the registry and allocate their
    /// hidden variables.
    fn walk(
        &mut self,
        expr: &mut Expr,
        mode: DepMode,
        depth: usize,
        autos: &mut AutoVars,
    ) -> Result<()> {
        match expr {
            Expr::Const(_, _) => {}
            Expr::Var(name) => {
                let mut name = name.clone();
                if self.mode == 'N' {
                    // initializers read everything as time-invariant
                    name.stage = Stage::None;
                }
                if (mode == DepMode::Normal && name.stage != Stage::Old) || mode == DepMode::Enforce
                {
                    self.dependencies.push(name);
                } else {
                    self.references.push(name);
                }
            }
            Expr::Op1(UnaryOp::Negative, r) => self.walk(r, mode, depth, autos)?,
            Expr::Op2(_, l, r) => {
                self.walk(l, mode, depth, autos)?;
                self.walk(r, mode, depth, autos)?;
            }
            Expr::App(fname, args) => {
                let f = functions::has_function(fname, args)?;
                if f.internals > 0 && depth > 0 {
                    return parse_err!(MacroDepth, "{}", fname);
                }
                for (i, arg) in args.iter_mut().enumerate() {
                    self.walk(arg, f.dep_mode(i), depth + 1, autos)?;
                }
                for _ in 0..f.internals {
                    let text = autos.next();
                    self.references.push(Name {
                        text: text.clone(),
                        kind: Kind::Level,
                        stage: Stage::Old,
                    });
                    args.push(Expr::Var(Name {
                        text,
                        kind: Kind::Const,
                        stage: Stage::None,
                    }));
                }
            }
        }
        Ok(())
    }

    /// True if the named variable is among this equation's dependencies.
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.text == name)
    }

    /// True if the named variable appears anywhere on the right side.
    pub fn reads(&self, name: &str) -> bool {
        self.depends_on(name) || self.references.iter().any(|r| r.text == name)
    }

    /// Evaluate the formula against the model state and assign the
    /// result to the target.
    pub fn eval(&self, mdl: &mut Model) -> Result<()> {
        let val = eval_expr(&self.formula, mdl)?;
        mdl.set(&self.target, val);
        Ok(())
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'{}:{}'", self.mode, self.stmt)
    }
}

/// Recursive evaluation of an expression for the current model state.
pub fn eval_expr(expr: &Expr, mdl: &mut Model) -> Result<f64> {
    Ok(match expr {
        Expr::Const(_, v) => *v,
        Expr::Var(name) => mdl.get(name)?,
        Expr::Op1(UnaryOp::Negative, r) => -eval_expr(r, mdl)?,
        Expr::Op2(op, l, r) => {
            let l = eval_expr(l, mdl)?;
            let r = eval_expr(r, mdl)?;
            match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
            }
        }
        Expr::App(fname, args) => {
            // function arguments travel as strings: names keep their
            // spelling, literals pass verbatim, anything else is
            // evaluated eagerly
            let mut strs = Vec::with_capacity(args.len());
            for arg in args {
                strs.push(match arg {
                    Expr::Var(name) => name.qualified(),
                    Expr::Const(text, _) => text.clone(),
                    other => eval_expr(other, mdl)?.to_string(),
                });
            }
            functions::call(fname, &strs, mdl)?
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::parse::Line;

    fn eqn(mode: &str, stmt: &str) -> Equation {
        let mut autos = AutoVars::new();
        let line = Line::new(mode, stmt);
        Equation::from_statement(&line, true, &mut autos)
            .unwrap()
            .remove(0)
    }

    fn eqn_err(mode: &str, stmt: &str) -> ErrorCode {
        let mut autos = AutoVars::new();
        let line = Line::new(mode, stmt);
        Equation::from_statement(&line, true, &mut autos)
            .unwrap_err()
            .code
    }

    fn dep_names(e: &Equation) -> Vec<&str> {
        e.dependencies.iter().map(|n| n.text.as_str()).collect()
    }

    fn ref_names(e: &Equation) -> Vec<&str> {
        e.references.iter().map(|n| n.text.as_str()).collect()
    }

    #[test]
    fn test_level_deps_and_refs() {
        let e = eqn("L", "INV.K=INV.J+DT*CHNG.JK");
        assert_eq!(Kind::Level, e.target.kind);
        assert_eq!(Stage::New, e.target.stage);
        // old-stage reads are references, not ordering constraints
        assert_eq!(vec!["DT"], dep_names(&e));
        assert_eq!(vec!["INV", "CHNG"], ref_names(&e));
    }

    #[test]
    fn test_rate_deps() {
        let e = eqn("R", "IR.KL=S.K*I.K*C/TOT");
        assert_eq!(vec!["S", "I", "C", "TOT"], dep_names(&e));
        assert!(e.references.is_empty());
    }

    #[test]
    fn test_init_forces_stage_none() {
        let e = eqn("N", "COFFEE=ROOM");
        assert_eq!(Kind::Init, e.target.kind);
        assert_eq!(Stage::None, e.dependencies[0].stage);
    }

    #[test]
    fn test_aux_reclassification() {
        let e = eqn("A", "FRAC.K=INV.K/TOT");
        assert_eq!(Kind::Aux, e.target.kind);
        assert_eq!(eqn_err("A", "FRAC.J=1"), ErrorCode::EqnBadTargetStage);
        assert_eq!(eqn_err("A", "FRAC=1"), ErrorCode::EqnBadTargetKind);
    }

    #[test]
    fn test_suppl_reclassification() {
        let e = eqn("S", "TOTAL.K=INV.K+BACK.K");
        assert_eq!(Kind::Suppl, e.target.kind);
        assert_eq!(eqn_err("S", "TOTAL.KL=1"), ErrorCode::EqnBadTargetKind);
    }

    #[test]
    fn test_space_rejected_in_strict_mode() {
        assert_eq!(eqn_err("L", "INV.K = INV.J"), ErrorCode::InvalidSpace);
    }

    #[test]
    fn test_multi_assignment_constants() {
        let mut autos = AutoVars::new();
        let line = Line::new("C", "A=1,B=2/C=3");
        let eqns = Equation::from_statement(&line, true, &mut autos).unwrap();
        assert_eq!(3, eqns.len());
        let targets: Vec<&str> = eqns.iter().map(|e| e.target.text.as_str()).collect();
        assert_eq!(vec!["A", "B", "C"], targets);
    }

    #[test]
    fn test_delay_enforces_rate_dependency() {
        let e = eqn("R", "OUT.KL=DELAY1(IN.JK,5)");
        // spelled .JK, but sequenced before us anyway
        assert_eq!(vec!["IN"], dep_names(&e));
        // two hidden state variables
        assert_eq!(vec!["_1", "_2"], ref_names(&e));
        match &e.formula {
            Expr::App(_, args) => assert_eq!(4, args.len()),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_smooth_skips_input_dependency() {
        let e = eqn("A", "AVG.K=SMOOTH(X.K,4)");
        assert!(dep_names(&e).is_empty());
        assert_eq!(vec!["X", "_1"], ref_names(&e));
    }

    #[test]
    fn test_delay_argument_check() {
        assert_eq!(eqn_err("R", "OUT.KL=DELAY1(IN.K,5)"), ErrorCode::FunctionArg);
        assert_eq!(eqn_err("R", "OUT.KL=DELAY1(IN.JK)"), ErrorCode::InvalidNumArgs);
        assert_eq!(eqn_err("R", "OUT.KL=NOSUCH(1)"), ErrorCode::UnknownFunction);
    }

    #[test]
    fn test_stateful_call_must_be_top_level() {
        assert_eq!(
            eqn_err("A", "Y.K=MAX(0,SMOOTH(X.K,4))"),
            ErrorCode::MacroDepth
        );
    }

    #[test]
    fn test_eval_arithmetic() {
        let mut mdl = Model::new();
        mdl.set_value("A", 6.0);
        mdl.set_value("B", 2.0);
        let e = eqn("A", "Y.K=A*(B+1)-B/2");
        e.eval(&mut mdl).unwrap();
        assert_eq!(Some(17.0), mdl.value("Y"));
    }

    #[test]
    fn test_eval_nested_function_argument() {
        let mut mdl = Model::new();
        mdl.set_value("A", 9.0);
        let e = eqn("A", "Y.K=SQRT(A*4)");
        e.eval(&mut mdl).unwrap();
        assert_eq!(Some(6.0), mdl.value("Y"));
    }
}
