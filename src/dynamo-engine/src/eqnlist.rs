// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The equation list: deduplication, dependency-ordered sorting and
//! cross-equation validation.
//!
//! Sorting partitions equations into an initialization bucket (`C`, `N`),
//! a runtime bucket (`A`, `R`, `L`) and the supplementaries (`S`, kept in
//! declaration order). Each bucket is ordered with Kahn's algorithm over
//! the dependency relation; the set of nodes left over on failure is the
//! cycle report.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use log::{info, warn};

use crate::common::Result;
use crate::equation::Equation;
use crate::model::Model;
use crate::model_err;
use crate::name::{Class, Kind, Name, Stage, NAME_MATCH, NAME_SAMEVAR};

#[derive(Clone, Default, Debug)]
pub struct EqnList {
    eqns: Vec<Rc<Equation>>,
}

impl EqnList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.eqns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eqns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Equation>> {
        self.eqns.iter()
    }

    pub fn add(&mut self, eqn: Equation) {
        self.eqns.push(Rc::new(eqn));
    }

    /// Two equations match when their targets match exactly, or when
    /// they share the bare name across a `C`/`N` pair -- an initializer
    /// may shadow a constant declaration.
    fn matches(a: &Equation, b: &Equation) -> bool {
        let m = a.target.compare(&b.target);
        if m == NAME_MATCH {
            return true;
        }
        m & NAME_SAMEVAR != 0
            && matches!((a.mode, b.mode), ('C', 'N') | ('N', 'C'))
    }

    pub fn contains(&self, eqn: &Equation) -> bool {
        self.eqns.iter().any(|e| Self::matches(e, eqn))
    }

    pub fn replace(&mut self, eqn: Equation) {
        let eqn = Rc::new(eqn);
        for e in self.eqns.iter_mut() {
            if Self::matches(e, &eqn) {
                *e = eqn;
                return;
            }
        }
        self.eqns.push(eqn);
    }

    /// Split off the initialization prefix: everything up to the last
    /// equation of mode `C` or `N`.
    pub fn split_init(&self) -> (&[Rc<Equation>], &[Rc<Equation>]) {
        let pos = self
            .eqns
            .iter()
            .rposition(|e| e.mode == 'C' || e.mode == 'N')
            .map(|p| p + 1)
            .unwrap_or(0);
        self.eqns.split_at(pos)
    }

    /// Topologically sort the list into a new one. Bucket membership is
    /// decided by mode; a name that resolves in neither its own bucket
    /// nor the sibling bucket has no defining equation.
    pub fn sort(&self, mdl: &Model) -> Result<EqnList> {
        let mut init: Vec<usize> = Vec::new();
        let mut run: Vec<usize> = Vec::new();
        let mut suppl: Vec<usize> = Vec::new();
        for (i, eqn) in self.eqns.iter().enumerate() {
            let bucket: (&mut Vec<usize>, usize) = match eqn.mode {
                'C' | 'N' => (&mut init, 1),
                'A' | 'R' | 'L' => (&mut run, 2),
                'S' => (&mut suppl, 3),
                _ => return model_err!(EqnBadMode, "{}", eqn),
            };
            let (list, tag) = bucket;
            if list
                .iter()
                .any(|&j| self.eqns[j].target.text == eqn.target.text)
            {
                return model_err!(VariableExists, "[{}] {}", tag, eqn.target.text);
            }
            list.push(i);
        }

        let mut sorted = EqnList::new();
        let init_order = self.sort_bucket(mdl, &init, &run)?;
        let run_order = self.sort_bucket(mdl, &run, &init)?;
        for i in init_order.into_iter().chain(run_order).chain(suppl) {
            sorted.eqns.push(self.eqns[i].clone());
        }
        Ok(sorted)
    }

    /// Kahn's algorithm over one bucket. Ready equations are taken in
    /// declaration order, which keeps the result deterministic.
    fn sort_bucket(&self, mdl: &Model, bucket: &[usize], sibling: &[usize]) -> Result<Vec<usize>> {
        let by_name: HashMap<&str, usize> = bucket
            .iter()
            .map(|&i| (self.eqns[i].target.text.as_str(), i))
            .collect();

        // per equation: the set of bucket positions it waits for
        let mut deps: HashMap<usize, Vec<usize>> = HashMap::new();
        for &i in bucket {
            let mut wait = Vec::new();
            for d in &self.eqns[i].dependencies {
                if mdl.is_system(&d.text) {
                    continue;
                }
                match by_name.get(d.text.as_str()) {
                    Some(&j) if j != i => {
                        if !wait.contains(&j) {
                            wait.push(j);
                        }
                    }
                    Some(_) => {}
                    None => {
                        let external = sibling
                            .iter()
                            .any(|&j| self.eqns[j].target.text == d.text);
                        if !external {
                            return model_err!(UnknownEqn, "{}", d.text);
                        }
                    }
                }
            }
            deps.insert(i, wait);
        }

        let mut order = Vec::with_capacity(bucket.len());
        let mut pending: Vec<usize> = bucket.to_vec();
        while !pending.is_empty() {
            let ready: Vec<usize> = pending
                .iter()
                .copied()
                .filter(|i| deps[i].is_empty())
                .collect();
            if ready.is_empty() {
                // every remaining equation is part of a cycle
                let mut report = String::new();
                info!("Cyclic dependencies detected:");
                for &i in &pending {
                    info!(">> {}", self.eqns[i]);
                    let _ = write!(report, " {}", self.eqns[i]);
                }
                return model_err!(DependencyLoop, "{}", report.trim_start());
            }
            pending.retain(|i| !deps[i].is_empty());
            for &n in &ready {
                for wait in deps.values_mut() {
                    wait.retain(|&m| m != n);
                }
            }
            order.extend(ready);
        }
        Ok(order)
    }

    /// Enforce the class compatibility table between every equation's
    /// target and its dependencies.
    pub fn validate(&self, mdl: &Model) -> Result<()> {
        let mut by_display: HashMap<String, &Rc<Equation>> = HashMap::new();
        for eqn in &self.eqns {
            let key = eqn.target.to_string();
            if by_display.insert(key, eqn).is_some() {
                return model_err!(EqnAmbigious, "{}", eqn.target);
            }
        }
        for eqn in &self.eqns {
            self.validate_eqn(mdl, eqn, &by_display)?;
        }
        Ok(())
    }

    fn validate_eqn(
        &self,
        mdl: &Model,
        eqn: &Equation,
        list: &HashMap<String, &Rc<Equation>>,
    ) -> Result<()> {
        const fn class(kind: Kind, stage: Stage) -> Class {
            Class { kind, stage }
        }
        const NONE_C: Class = class(Kind::Const, Stage::None);
        const NONE_I: Class = class(Kind::Init, Stage::None);

        let (target, legal, warn_only): (Class, &[Class], bool) = match eqn.mode {
            'C' => (NONE_C, &[NONE_C], false),
            'N' => (NONE_I, &[NONE_C, NONE_I], true),
            'L' => (
                class(Kind::Level, Stage::New),
                &[
                    NONE_C,
                    NONE_I,
                    class(Kind::Level, Stage::Old),
                    class(Kind::Aux, Stage::Old),
                    class(Kind::Rate, Stage::Old),
                ],
                false,
            ),
            'R' => (
                class(Kind::Rate, Stage::New),
                &[
                    NONE_C,
                    NONE_I,
                    class(Kind::Level, Stage::New),
                    class(Kind::Aux, Stage::New),
                    class(Kind::Rate, Stage::Old),
                ],
                true,
            ),
            'A' => (
                class(Kind::Aux, Stage::New),
                &[
                    NONE_C,
                    NONE_I,
                    class(Kind::Aux, Stage::New),
                    class(Kind::Level, Stage::New),
                    class(Kind::Rate, Stage::Old),
                ],
                false,
            ),
            'S' => (
                class(Kind::Suppl, Stage::New),
                &[
                    NONE_C,
                    NONE_I,
                    class(Kind::Aux, Stage::New),
                    class(Kind::Level, Stage::New),
                    class(Kind::Suppl, Stage::New),
                    class(Kind::Rate, Stage::Old),
                ],
                false,
            ),
            _ => return model_err!(EqnBadMode, "{}", eqn),
        };

        if eqn.target.kind != target.kind {
            return model_err!(EqnBadTargetKind, "{}", eqn.target);
        }
        if eqn.target.stage != target.stage {
            return model_err!(EqnBadTargetStage, "{}", eqn.target);
        }
        for d in &eqn.dependencies {
            if mdl.is_system(&d.text) {
                continue;
            }
            if let Err(err) = Self::check_dependency(d, legal, list) {
                if warn_only && err.is_a(crate::common::ErrorCode::EqnBadDependClass) {
                    warn!("{} in {}", err, eqn);
                    continue;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn check_dependency(
        d: &Name,
        legal: &[Class],
        list: &HashMap<String, &Rc<Equation>>,
    ) -> Result<()> {
        let key = d.to_string();
        let defining = match list.get(&key) {
            Some(e) => e,
            None => {
                // a missing constant may be covered by an initializer,
                // a missing level by an auxiliary
                let alt = if key.ends_with("/C") {
                    format!("{}/I", d.text)
                } else if key.ends_with("/L") {
                    format!("{}/A", d.text)
                } else {
                    key.clone()
                };
                match list.get(&alt) {
                    Some(e) => e,
                    None => return model_err!(UnknownEqn, "{}", key),
                }
            }
        };
        let found = legal
            .iter()
            .any(|cl| defining.target.kind == cl.kind && d.stage == cl.stage);
        if !found {
            return model_err!(EqnBadDependClass, "{}", d);
        }
        Ok(())
    }

    /// Log a human-readable summary of the list.
    pub fn dump(&self, verbose: bool) {
        let mut cnt: HashMap<char, usize> = HashMap::new();
        for e in &self.eqns {
            *cnt.entry(e.mode).or_insert(0) += 1;
        }
        info!("-----------------------------------");
        info!("   Number of equations: {:4}", self.len());
        info!("       LEVEL equations: {:4}", cnt.get(&'L').unwrap_or(&0));
        info!("        RATE equations: {:4}", cnt.get(&'R').unwrap_or(&0));
        info!("         AUX equations: {:4}", cnt.get(&'A').unwrap_or(&0));
        info!("       SUPPL equations: {:4}", cnt.get(&'S').unwrap_or(&0));
        info!("       CONST equations: {:4}", cnt.get(&'C').unwrap_or(&0));
        info!("        INIT equations: {:4}", cnt.get(&'N').unwrap_or(&0));
        info!("-----------------------------------");
        if verbose {
            for (i, e) in self.eqns.iter().enumerate() {
                info!("   {:5}: {}", i + 1, e);
                if !e.dependencies.is_empty() {
                    let deps: Vec<String> =
                        e.dependencies.iter().map(|d| d.to_string()).collect();
                    info!("          Deps={:?}", deps);
                }
                if !e.references.is_empty() {
                    let refs: Vec<String> =
                        e.references.iter().map(|r| r.to_string()).collect();
                    info!("          Refs={:?}", refs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::name::AutoVars;
    use crate::parse::Line;

    fn build(lines: &[(&str, &str)]) -> EqnList {
        let mut autos = AutoVars::new();
        let mut list = EqnList::new();
        for (mode, stmt) in lines {
            for e in Equation::from_statement(&Line::new(mode, stmt), true, &mut autos).unwrap() {
                list.add(e);
            }
        }
        list
    }

    fn targets(list: &EqnList) -> Vec<&str> {
        list.iter().map(|e| e.target.text.as_str()).collect()
    }

    #[test]
    fn test_dedup_matching() {
        let list = build(&[("L", "INV.K=INV.J+DT*CHNG.JK")]);
        let dup = build(&[("L", "INV.K=CONST*INV.J")]);
        assert!(list.contains(dup.iter().next().unwrap()));
        // an N equation matches a C declaration of the same name
        let c = build(&[("C", "COFFEE=90")]);
        let n = build(&[("N", "COFFEE=ROOM")]);
        assert!(c.contains(n.iter().next().unwrap()));
    }

    #[test]
    fn test_sort_orders_dependencies() {
        let mdl = Model::new();
        let list = build(&[
            ("R", "IR.KL=S.K*I.K*C/TOT"),
            ("A", "I.K=TOT-S.K"),
            ("L", "S.K=S.J+(DT)(-IR.JK)"),
            ("C", "C=.1"),
            ("C", "TOT=1000"),
            ("N", "S=1000"),
        ]);
        let sorted = list.sort(&mdl).unwrap();
        // init bucket in declaration order (no dependencies among them),
        // then the run bucket topologically: the level is free, the
        // auxiliary feeds the rate
        assert_eq!(
            vec!["C", "TOT", "S", "S", "I", "IR"],
            targets(&sorted)
        );
    }

    #[test]
    fn test_sort_reports_cycles() {
        let mdl = Model::new();
        let list = build(&[
            ("L", "INV.K=INV.J+DT*CHNG.JK+TEST.K"),
            ("L", "TEST.K=CONST*INV.K"),
            ("R", "CHNG.KL=0"),
            ("C", "CONST=1"),
        ]);
        let err = list.sort(&mdl).unwrap_err();
        assert!(err.is_a(ErrorCode::DependencyLoop));
        let report = err.details.unwrap();
        assert!(report.contains("INV.K"), "{}", report);
        assert!(report.contains("TEST.K"), "{}", report);
    }

    #[test]
    fn test_sort_unknown_dependency() {
        let mdl = Model::new();
        let list = build(&[("R", "IR.KL=GHOST.K*2")]);
        let err = list.sort(&mdl).unwrap_err();
        assert!(err.is_a(ErrorCode::UnknownEqn));
    }

    #[test]
    fn test_sort_rejects_duplicate_targets() {
        let mdl = Model::new();
        let list = build(&[("A", "X.K=1*DT"), ("A", "X.K=2*DT")]);
        assert!(list.sort(&mdl).unwrap_err().is_a(ErrorCode::VariableExists));
    }

    #[test]
    fn test_validate_constant_from_constant() {
        let mdl = Model::new();
        let list = build(&[("C", "A=1"), ("C", "B=2*A")]);
        let sorted = list.sort(&mdl).unwrap();
        sorted.validate(&mdl).unwrap();
        // and the derived constant sorts after its source
        let order = targets(&sorted);
        assert_eq!(vec!["A", "B"], order);
    }

    #[test]
    fn test_validate_accepts_classic_model() {
        let mdl = Model::new();
        let list = build(&[
            ("L", "COFFEE.K=COFFEE.J+DT*CHNG.JK"),
            ("R", "CHNG.KL=CONST*(ROOM-COFFEE.K)"),
            ("C", "CONST=0.2"),
            ("C", "ROOM=20"),
            ("N", "COFFEE=90"),
        ]);
        let sorted = list.sort(&mdl).unwrap();
        sorted.validate(&mdl).unwrap();
    }

    #[test]
    fn test_validate_init_fallback() {
        // CHNG.KL reads COFFEE.K whose level equation is missing, but an
        // auxiliary of the same name covers it
        let mdl = Model::new();
        let list = build(&[
            ("A", "COFFEE.K=ROOM*2"),
            ("R", "CHNG.KL=CONST*(ROOM-COFFEE.K)"),
            ("C", "CONST=0.2"),
            ("C", "ROOM=20"),
        ]);
        let sorted = list.sort(&mdl).unwrap();
        sorted.validate(&mdl).unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_class() {
        // a level may only read old-stage values: EXTRA.K resolves to an
        // auxiliary, which is current-stage and therefore illegal here
        let mdl = Model::new();
        let list = build(&[
            ("L", "INV.K=INV.J+DT*EXTRA.K"),
            ("A", "EXTRA.K=2*DT"),
        ]);
        let sorted = list.sort(&mdl).unwrap();
        assert!(sorted
            .validate(&mdl)
            .unwrap_err()
            .is_a(ErrorCode::EqnBadDependClass));
    }

    #[test]
    fn test_split_init() {
        let mdl = Model::new();
        let list = build(&[
            ("L", "COFFEE.K=COFFEE.J+DT*CHNG.JK"),
            ("R", "CHNG.KL=CONST*(ROOM-COFFEE.K)"),
            ("C", "CONST=0.2"),
            ("C", "ROOM=20"),
            ("N", "COFFEE=90"),
        ]);
        let sorted = list.sort(&mdl).unwrap();
        let (init, run) = sorted.split_init();
        assert_eq!(3, init.len());
        assert_eq!(2, run.len());
        assert!(init.iter().all(|e| e.mode == 'C' || e.mode == 'N'));
    }
}
