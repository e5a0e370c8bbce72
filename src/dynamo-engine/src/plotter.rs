// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Plot sink: records selected variables every PLTPER and renders either
//! the classic DYNAMO ASCII plot or a gnuplot script emitting SVG.
//!
//! A `PLOT` statement assigns one plotting symbol per variable
//! (`S=*,I=+`); `/` separates groups sharing a y-scale, and a group may
//! carry an explicit scale as `(lo,hi)`. Groups without one auto-range
//! over the recorded data, widened to bounds from the log-10 factor set
//! {0.5, 1, 2, 5, 10}.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use log::{info, warn};

use crate::common::{approx, Result};
use crate::model::State;
use crate::{model_err, out_err, parse_err};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlotFormat {
    /// Classic DYNAMO ASCII plot (`.plt`).
    Ascii,
    /// gnuplot script producing SVG (`.gnuplot`).
    Gnuplot,
}

struct PlotVar {
    sym: char,
    min: f64,
    max: f64,
    values: Vec<f64>,
}

impl PlotVar {
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
}

/// Variables sharing one y-scale.
struct PlotGroup {
    min: f64,
    max: f64,
    valid: bool,
    vars: Vec<String>,
}

impl PlotGroup {
    fn new() -> Self {
        PlotGroup {
            min: 0.0,
            max: 0.0,
            valid: false,
            vars: Vec::new(),
        }
    }

    /// Position of a value on the axis, normalized to [0, 1].
    fn norm(&self, y: f64) -> f64 {
        (y - self.min) / (self.max - self.min)
    }
}

pub struct Plotter {
    out: Option<Box<dyn Write>>,
    format: PlotFormat,
    stmt: String,
    steps: usize,
    x0: f64,
    dx: f64,
    vars: HashMap<String, PlotVar>,
    grps: Vec<PlotGroup>,
    xnum: usize,
}

impl Plotter {
    pub fn disabled() -> Self {
        Self::build(None, PlotFormat::Ascii)
    }

    pub fn to_file(path: &Path) -> io::Result<Self> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gnuplot") => PlotFormat::Gnuplot,
            _ => PlotFormat::Ascii,
        };
        Ok(Self::build(Some(Box::new(File::create(path)?)), format))
    }

    pub fn to_writer(out: Box<dyn Write>, format: PlotFormat) -> Self {
        Self::build(Some(out), format)
    }

    fn build(out: Option<Box<dyn Write>>, format: PlotFormat) -> Self {
        Plotter {
            out,
            format,
            stmt: String::new(),
            steps: 0,
            x0: 0.0,
            dx: 0.0,
            vars: HashMap::new(),
            grps: Vec::new(),
            xnum: 0,
        }
    }

    /// Parse a PLOT statement: scale groups, members and symbols.
    pub fn prepare(&mut self, stmt: &str) -> Result<()> {
        self.stmt = stmt.to_string();
        for group in stmt.split('/') {
            let mut group = group;
            let mut pg = PlotGroup::new();
            if let Some(pos) = group.find('(') {
                let scale: Vec<&str> = group[pos..].trim_matches(|c| c == '(' || c == ')').split(',').collect();
                if scale.len() != 2 {
                    return parse_err!(Syntax, "scale '{}'", &group[pos..]);
                }
                pg.min = match scale[0].parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => return parse_err!(NotANumber, "'{}'", scale[0]),
                };
                pg.max = match scale[1].parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => return parse_err!(NotANumber, "'{}'", scale[1]),
                };
                pg.valid = true;
                group = &group[..pos];
            }
            for def in group.split(',') {
                let (name, sym) = match def.split_once('=') {
                    Some(parts) => parts,
                    None => return parse_err!(Syntax, "'{}'", def),
                };
                let sym = match sym.chars().next() {
                    Some(c) => c,
                    None => return parse_err!(Syntax, "missing symbol for '{}'", name),
                };
                self.vars.insert(
                    name.to_string(),
                    PlotVar {
                        sym,
                        min: 0.0,
                        max: 0.0,
                        values: Vec::new(),
                    },
                );
                pg.vars.push(name.to_string());
            }
            self.grps.push(pg);
        }
        Ok(())
    }

    /// Derive the sampling stride and x-axis stepping.
    pub fn start(&mut self, state: &State) -> Result<()> {
        if self.out.is_none() {
            return Ok(());
        }
        let x0 = match state.get("TIME") {
            Some(v) => *v,
            None => return model_err!(MissingDef, "TIME"),
        };
        let pp = match state.get("PLTPER") {
            Some(v) => *v,
            None => return model_err!(MissingDef, "PLTPER"),
        };
        let dt = match state.get("DT") {
            Some(v) => *v,
            None => return model_err!(MissingDef, "DT"),
        };
        let steps = (pp / dt) as usize;
        if !approx(pp, steps as f64 * dt) {
            warn!("PLTPER {} is not a multiple of DT {}", pp, dt);
        }
        self.x0 = x0;
        self.dx = if steps > 1 { pp } else { dt };
        self.steps = steps;
        Ok(())
    }

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
                None => return model_err!(NoVariable, "{} [plotter]", name),
            }
        }
        self.xnum += 1;
        Ok(())
    }

    /// Calibrate the group ranges, then render.
    pub fn generate(&mut self, title: &str, run_id: &str) -> Result<()> {
        if self.out.is_none() {
            return Ok(());
        }
        if self.xnum == 0 {
            return out_err!(NoData, "no samples recorded");
        }
        info!("      Generating plot(s)...");
        for grp in &mut self.grps {
            if !grp.valid {
                for name in &grp.vars {
                    let pv = match self.vars.get(name) {
                        Some(pv) => pv,
                        None => return out_err!(PlotNoVar, "{}", name),
                    };
                    grp.min = grp.min.min(pv.min);
                    grp.max = grp.max.max(pv.max);
                }
                grp.valid = true;
            }
            if grp.max - grp.min <= 0.0 {
                // constant series still need a drawable band
                grp.max = grp.min + 1.0;
            }
            // segment width from the log-factor ladder; the plot is
            // four segments wide
            let w = 4.0 * calib((grp.max - grp.min) / 4.0, 1);
            let ymin = calib(grp.min, -1).copysign(grp.min);
            let ymax = calib(grp.max, 1).copysign(grp.max);
            if grp.max < ymin + w {
                grp.min = ymin;
                grp.max = ymin + w;
            } else if grp.min < ymax - w {
                grp.max = ymax;
                grp.min = ymax - w;
            } else {
                return out_err!(PlotRange, "[{}, {}]", grp.min, grp.max);
            }
        }
        let out = self.out.as_mut().unwrap();
        let res = match self.format {
            PlotFormat::Ascii => plot_ascii(
                out, &self.stmt, &self.grps, &self.vars, self.xnum, self.x0, self.dx, run_id,
            ),
            PlotFormat::Gnuplot => plot_gnuplot(
                out, &self.grps, &self.vars, self.xnum, self.x0, self.dx, title, run_id,
            ),
        };
        if let Err(err) = res {
            return out_err!(NoData, "plot: {}", err);
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for var in self.vars.values_mut() {
            var.values.clear();
            var.min = 0.0;
            var.max = 0.0;
        }
        for grp in &mut self.grps {
            grp.valid = false;
            grp.min = 0.0;
            grp.max = 0.0;
        }
        self.xnum = 0;
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            if let Err(err) = out.flush() {
                return out_err!(NoData, "plotter: {}", err);
            }
        }
        Ok(())
    }
}

/// Range bounds equidistant in log scale.
const LOG_FACTOR: [f64; 5] = [0.5, 1.0, 2.0, 5.0, 10.0];

/// Snap a magnitude to the enclosing log-factor bound. A negative side
/// picks the bound below a positive value instead of the one above.
fn calib(y: f64, side: i32) -> f64 {
    if y == 0.0 {
        return 0.0;
    }
    let yl = y.abs().log10();
    let yb = yl.floor();
    let yf = yl - yb;
    let mut yk: usize = 1;
    if yf > 0.699 {
        yk = 4;
    } else if yf > 0.301 {
        yk = 3;
    } else if yf > 0.0 {
        yk = 2;
    }
    if side < 0 && y > 0.0 {
        yk -= 1;
    }
    LOG_FACTOR[yk] * 10f64.powf(yb)
}

const SCALE_SUFFIX: [char; 5] = [' ', 'K', 'M', 'G', 'T'];

/// Short axis label with an engineering suffix for large magnitudes.
fn format_scaled(x: f64) -> String {
    let mut v = x;
    let mut i = 0;
    while v.abs() >= 1000.0 && i < SCALE_SUFFIX.len() - 1 {
        i += 1;
        v /= 1000.0;
    }
    if i == 0 {
        format!("{:.2}", v)
    } else {
        format!("{:.1}{}", v, SCALE_SUFFIX[i])
    }
}

#[allow(clippy::too_many_arguments)]
fn plot_ascii(
    out: &mut Box<dyn Write>,
    stmt: &str,
    grps: &[PlotGroup],
    vars: &HashMap<String, PlotVar>,
    xnum: usize,
    x0: f64,
    dx: f64,
    run_id: &str,
) -> io::Result<()> {
    writeln!(out, "Plot for '{}'", run_id)?;
    writeln!(out, "         {}", stmt)?;
    writeln!(out)?;
    // one y-axis scale per group, with the symbol legend
    for grp in grps {
        let legend: Vec<String> = grp
            .vars
            .iter()
            .map(|v| format!("{}={}", v, vars[v].sym))
            .collect();
        let w = (grp.max - grp.min) / 4.0;
        write!(out, "{:>12}", format_scaled(grp.min))?;
        for seg in 1..=4 {
            write!(out, "{:>25}", format_scaled(grp.min + seg as f64 * w))?;
        }
        writeln!(out, " {}", legend.join(","))?;
    }
    // graph body, one line per sample
    for i in 0..xnum {
        let x = x0 + i as f64 * dx;
        let mut line = axis_line(x, i);
        for grp in grps {
            for v in &grp.vars {
                let pv = &vars[v];
                let pos = (100.0 * grp.norm(pv.values[i])).round() as isize + 11;
                if (11..=111).contains(&pos) {
                    line[pos as usize] = pv.sym;
                } else {
                    warn!(
                        "y={} outside plot range ({}, {})",
                        pv.values[i], grp.min, grp.max
                    );
                }
            }
        }
        writeln!(out, "{}", line.into_iter().collect::<String>())?;
    }
    Ok(())
}

/// A horizontal graph line without data points: every tenth line is
/// dashed and labeled, the rest carry segment dots.
fn axis_line(x: f64, i: usize) -> Vec<char> {
    let mut body = vec![' '; 102];
    for (j, c) in body.iter_mut().enumerate() {
        if i % 10 == 0 {
            if j % 2 == 0 {
                *c = '-';
            }
        } else if j % 25 == 0 {
            *c = '.';
        }
    }
    let mut line: Vec<char> = if i % 10 == 0 {
        format!("{:10.3}", x).chars().collect()
    } else {
        vec![' '; 10]
    };
    line.extend(body);
    line
}

#[allow(clippy::too_many_arguments)]
fn plot_gnuplot(
    out: &mut Box<dyn Write>,
    grps: &[PlotGroup],
    vars: &HashMap<String, PlotVar>,
    xnum: usize,
    x0: f64,
    dx: f64,
    title: &str,
    run_id: &str,
) -> io::Result<()> {
    writeln!(out, "set terminal svg size 1024,768 dynamic")?;
    if title.is_empty() {
        writeln!(out, "set title '{}'", run_id)?;
    } else {
        writeln!(out, "set title '{} ({})'", title, run_id)?;
    }
    writeln!(out, "set xlabel 'TIME'")?;
    writeln!(out, "set key outside")?;
    let mut plots = Vec::new();
    for (gi, grp) in grps.iter().enumerate() {
        let axis = if gi == 0 { "x1y1" } else { "x1y2" };
        for v in &grp.vars {
            plots.push(format!("'-' using 1:2 with lines axes {} title '{}'", axis, v));
        }
    }
    writeln!(out, "plot {}", plots.join(", \\\n     "))?;
    for grp in grps {
        for v in &grp.vars {
            let pv = &vars[v];
            for i in 0..xnum {
                writeln!(out, "{} {}", x0 + i as f64 * dx, pv.values[i])?;
            }
            writeln!(out, "e")?;
        }
    }
    Ok(())
}
