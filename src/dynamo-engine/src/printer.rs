// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Print sink: records selected variables every PRTPER and emits either
//! the classic DYNAMO column print or delimited text, depending on the
//! output file extension.
//!
//! A `PRINT` statement lists variables separated by `,`, grouped into
//! shared columns by `/`. A group may pin its column with an `N)`
//! prefix; sub-columns of a group print stacked and share one scale.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use log::{info, warn};

use crate::common::{approx, Result};
use crate::model::State;
use crate::{model_err, out_err, parse_err};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrintFormat {
    /// Classic DYNAMO column print (`.prt`).
    Columns,
    /// Semicolon-delimited text (`.csv`).
    Csv,
}

/// A recorded time series for one printed variable.
struct PrintVar {
    min: f64,
    max: f64,
    values: Vec<f64>,
    scale: f64,
}

impl PrintVar {
    fn new() -> Self {
        PrintVar {
            min: 0.0,
            max: 0.0,
            values: Vec::new(),
            scale: 1.0,
        }
    }

    fn add(&mut self, y: f64) {
        if self.values.is_empty() {
            self.min = y;
            self.max = y;
        } else if y < self.min {
            self.min = y;
        } else if y > self.max {
            self.max = y;
        }
        self.values.push(y);
    }

    fn reset(&mut self) {
        self.values.clear();
        self.min = 0.0;
        self.max = 0.0;
        self.scale = 1.0;
    }

    /// Power-of-ten scale that keeps printed values to a few digits.
    fn calc_scale(&mut self) {
        let bound = self.max.abs().max(self.min.abs());
        if bound <= 0.0 {
            self.scale = 1.0;
            return;
        }
        let x = bound.log10().round() as i32 - 2;
        self.scale = if x > 0 { 10f64.powi(x) } else { 1.0 };
    }
}

/// One ordered list of variables sharing a print column.
struct PrintCol {
    vars: Vec<String>,
    scale: f64,
}

impl PrintCol {
    fn new() -> Self {
        PrintCol {
            vars: Vec::new(),
            scale: -1.0,
        }
    }
}

/// One PRINT statement's worth of output.
struct PrintJob {
    stmt: String,
    cols: BTreeMap<usize, PrintCol>,
}

pub struct Printer {
    out: Option<Box<dyn Write>>,
    format: PrintFormat,
    steps: usize,
    vars: HashMap<String, PrintVar>,
    jobs: Vec<PrintJob>,
    xnum: usize,
    adding: bool,
}

impl Printer {
    pub fn disabled() -> Self {
        Self::build(None, PrintFormat::Columns)
    }

    pub fn to_file(path: &Path) -> io::Result<Self> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => PrintFormat::Csv,
            _ => PrintFormat::Columns,
        };
        Ok(Self::build(Some(Box::new(File::create(path)?)), format))
    }

    pub fn to_writer(out: Box<dyn Write>, format: PrintFormat) -> Self {
        Self::build(Some(out), format)
    }

    fn build(out: Option<Box<dyn Write>>, format: PrintFormat) -> Self {
        Printer {
            out,
            format,
            steps: 0,
            vars: HashMap::new(),
            jobs: Vec::new(),
            xnum: 0,
            adding: true,
        }
    }

    /// Parse a PRINT statement into a job.
    pub fn prepare(&mut self, stmt: &str) -> Result<()> {
        if !self.adding {
            // a fresh round of PRINT statements replaces the old jobs
            self.vars.clear();
            self.jobs.clear();
            self.adding = true;
        }
        let mut job = PrintJob {
            stmt: stmt.to_string(),
            cols: BTreeMap::new(),
        };
        self.vars.insert("TIME".to_string(), PrintVar::new());
        let mut time_col = PrintCol::new();
        time_col.vars.push("TIME".to_string());
        job.cols.insert(0, time_col);

        let groups: Vec<&str> = stmt.split('/').collect();
        if groups.len() == 1 {
            // flat list: one variable per column
            for (pos, label) in groups[0].split(',').enumerate() {
                self.vars.insert(label.to_string(), PrintVar::new());
                let mut col = PrintCol::new();
                col.vars.push(label.to_string());
                job.cols.insert(pos + 1, col);
            }
        } else {
            for (pos, group) in groups.iter().enumerate() {
                let mut group = *group;
                let mut colno = pos + 1;
                if let Some(delim) = group.find(')') {
                    colno = match group[..delim].parse::<usize>() {
                        Ok(n) => n,
                        Err(_) => return parse_err!(NotANumber, "'{}'", &group[..delim]),
                    };
                    group = &group[delim + 1..];
                }
                let mut col = PrintCol::new();
                for label in group.split(',') {
                    self.vars.insert(label.to_string(), PrintVar::new());
                    col.vars.push(label.to_string());
                }
                job.cols.insert(colno, col);
            }
        }
        self.jobs.push(job);
        Ok(())
    }

    /// Derive the sampling stride from PRTPER and DT.
    pub fn start(&mut self, state: &State) -> Result<()> {
        if self.out.is_none() {
            return Ok(());
        }
        let pp = match state.get("PRTPER") {
            Some(v) => *v,
            None => return model_err!(MissingDef, "PRTPER"),
        };
        let dt = match state.get("DT") {
            Some(v) => *v,
            None => return model_err!(MissingDef, "DT"),
        };
        self.steps = (pp / dt) as usize;
        if !approx(pp, self.steps as f64 * dt) {
            warn!("PRTPER {} is not a multiple of DT {}", pp, dt);
        }
        Ok(())
    }

    /// Record the configured variables for this epoch; a no-op on
    /// epochs outside the sampling stride.
    pub fn add(&mut self, epoch: usize, state: &State) -> Result<()> {
        if self.out.is_none() {
            return Ok(());
        }
        if self.steps > 1 && epoch % self.steps != 1 {
            return Ok(());
        }
        for (name, var) in self.vars.iter_mut() {
            match state.get(name) {
                Some(v) => var.add(*v),
                None => return model_err!(NoVariable, "{} [printer]", name),
            }
        }
        self.xnum += 1;
        Ok(())
    }

    /// Emit the collected samples for every job.
    pub fn generate(&mut self, title: &str, run_id: &str) -> Result<()> {
        let out = match self.out.as_mut() {
            Some(out) => out,
            None => return Ok(()),
        };
        if self.xnum == 0 {
            return out_err!(NoData, "no samples recorded");
        }
        info!("      Generating print(s)...");
        for var in self.vars.values_mut() {
            var.calc_scale();
        }
        for job in &self.jobs {
            for col in job.cols.values() {
                for name in &col.vars {
                    if !self.vars.contains_key(name) {
                        return out_err!(PrintNoVar, "{}", name);
                    }
                }
            }
        }
        for job in &mut self.jobs {
            for col in job.cols.values_mut() {
                // sub-columns share the widest member scale
                col.scale = col
                    .vars
                    .iter()
                    .map(|name| self.vars[name].scale)
                    .fold(col.scale, f64::max);
            }
            let res = match self.format {
                PrintFormat::Columns => {
                    print_columns(out, job, &self.vars, self.xnum, title, run_id)
                }
                PrintFormat::Csv => print_csv(out, job, &self.vars, self.xnum),
            };
            if let Err(err) = res {
                return out_err!(NoData, "print: {}", err);
            }
        }
        self.adding = false;
        Ok(())
    }

    pub fn reset(&mut self) {
        for var in self.vars.values_mut() {
            var.reset();
        }
        self.adding = false;
        self.xnum = 0;
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            if let Err(err) = out.flush() {
                return out_err!(NoData, "printer: {}", err);
            }
        }
        Ok(())
    }
}

/// Exponent label for a column scale, DYNAMO style: `E+03`.
fn scale_label(scale: f64) -> String {
    let exp = if scale <= 0.0 {
        0
    } else {
        scale.log10().round() as i32
    };
    format!("E{:+03}", exp)
}

fn print_columns(
    out: &mut Box<dyn Write>,
    job: &PrintJob,
    vars: &HashMap<String, PrintVar>,
    xnum: usize,
    title: &str,
    run_id: &str,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "      PRINT {}", job.stmt)?;
    writeln!(out)?;
    if !title.is_empty() {
        writeln!(out, "***** {} *****", title)?;
        writeln!(out)?;
    }
    if !run_id.is_empty() {
        writeln!(out, "Print results for run '{}'", run_id)?;
        writeln!(out)?;
    }
    let maxcol = job.cols.keys().max().copied().unwrap_or(0);
    let maxsub = job.cols.values().map(|c| c.vars.len()).max().unwrap_or(0);
    // header: one row per sub-column position
    for sub in 0..maxsub {
        for col in 0..=maxcol {
            match job.cols.get(&col).and_then(|c| c.vars.get(sub)) {
                Some(name) => write!(out, "  {:>7}", name)?,
                None => write!(out, "         ")?,
            }
        }
        writeln!(out)?;
    }
    // scale row
    for col in 0..=maxcol {
        match job.cols.get(&col) {
            Some(c) => write!(out, "  {:>7}", scale_label(c.scale))?,
            None => write!(out, "         ")?,
        }
    }
    writeln!(out)?;
    // data
    for x in 0..xnum {
        for sub in 0..maxsub {
            for col in 0..=maxcol {
                match job.cols.get(&col) {
                    Some(c) if sub < c.vars.len() => {
                        let val = vars[&c.vars[sub]].values[x] / c.scale;
                        write!(out, "  {:7.3}", val)?;
                    }
                    _ => write!(out, "         ")?,
                }
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

fn print_csv(
    out: &mut Box<dyn Write>,
    job: &PrintJob,
    vars: &HashMap<String, PrintVar>,
    xnum: usize,
) -> io::Result<()> {
    let labels: Vec<&str> = job
        .cols
        .values()
        .flat_map(|c| c.vars.iter().map(|s| s.as_str()))
        .collect();
    writeln!(out, "{}", labels.join(";"))?;
    for x in 0..xnum {
        let row: Vec<String> = labels
            .iter()
            .map(|name| format!("{:.6}", vars[*name].values[x]))
            .collect();
        writeln!(out, "{}", row.join(";"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Captures sink output for inspection after the printer is done.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn state(pairs: &[(&str, f64)]) -> State {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_disabled_printer_is_inert() {
        let mut prt = Printer::disabled();
        prt.prepare("S,I,R").unwrap();
        prt.start(&state(&[])).unwrap();
        prt.add(1, &state(&[])).unwrap();
        prt.generate("", "").unwrap();
        prt.close().unwrap();
    }

    #[test]
    fn test_csv_output() {
        let buf = SharedBuf::default();
        let mut prt = Printer::to_writer(Box::new(buf.clone()), PrintFormat::Csv);
        prt.prepare("COFFEE").unwrap();
        prt.start(&state(&[("PRTPER", 1.0), ("DT", 1.0)])).unwrap();
        for (t, v) in [(0.0, 90.0), (1.0, 76.0)] {
            prt.add(t as usize + 1, &state(&[("TIME", t), ("COFFEE", v)]))
                .unwrap();
        }
        prt.generate("", "").unwrap();
        let text = buf.contents();
        assert!(text.starts_with("TIME;COFFEE\n"), "{}", text);
        assert!(text.contains("1.000000;76.000000"), "{}", text);
    }

    #[test]
    fn test_sampling_stride() {
        let buf = SharedBuf::default();
        let mut prt = Printer::to_writer(Box::new(buf.clone()), PrintFormat::Csv);
        prt.prepare("X").unwrap();
        // PRTPER = 2 * DT: every other epoch is recorded
        prt.start(&state(&[("PRTPER", 0.5), ("DT", 0.25)])).unwrap();
        for epoch in 1..=6 {
            prt.add(epoch, &state(&[("TIME", epoch as f64), ("X", 1.0)]))
                .unwrap();
        }
        assert_eq!(3, prt.xnum);
    }

    #[test]
    fn test_columns_output_has_header_and_scale() {
        let buf = SharedBuf::default();
        let mut prt = Printer::to_writer(Box::new(buf.clone()), PrintFormat::Columns);
        prt.prepare("COFFEE").unwrap();
        prt.start(&state(&[("PRTPER", 1.0), ("DT", 1.0)])).unwrap();
        prt.add(1, &state(&[("TIME", 0.0), ("COFFEE", 90.0)])).unwrap();
        prt.generate("COOLING", "RUN1").unwrap();
        let text = buf.contents();
        assert!(text.contains("***** COOLING *****"), "{}", text);
        assert!(text.contains("COFFEE"), "{}", text);
        assert!(text.contains("E+00"), "{}", text);
    }

    #[test]
    fn test_column_groups_with_index() {
        let buf = SharedBuf::default();
        let mut prt = Printer::to_writer(Box::new(buf.clone()), PrintFormat::Columns);
        prt.prepare("1)S,I/2)R").unwrap();
        let job = &prt.jobs[0];
        assert_eq!(vec!["S", "I"], job.cols[&1].vars);
        assert_eq!(vec!["R"], job.cols[&2].vars);
    }

    #[test]
    fn test_missing_variable() {
        let buf = SharedBuf::default();
        let mut prt = Printer::to_writer(Box::new(buf), PrintFormat::Csv);
        prt.prepare("GHOST").unwrap();
        prt.start(&state(&[("PRTPER", 1.0), ("DT", 1.0)])).unwrap();
        let err = prt.add(1, &state(&[("TIME", 0.0)])).unwrap_err();
        assert!(err.is_a(crate::common::ErrorCode::NoVariable));
    }

    #[test]
    fn test_generate_without_samples() {
        let buf = SharedBuf::default();
        let mut prt = Printer::to_writer(Box::new(buf), PrintFormat::Csv);
        prt.prepare("X").unwrap();
        let err = prt.generate("", "").unwrap_err();
        assert!(err.is_a(crate::common::ErrorCode::NoData));
    }
}
