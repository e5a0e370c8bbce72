// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs::File;
use std::path::PathBuf;

use log::{info, LevelFilter};
use pico_args::Arguments;

use dynamo_engine::{DebugSink, Model, Plotter, Printer};

const VERSION: &str = "1.0";
const EXIT_FAILURE: i32 = 1;

macro_rules! die(
    ($($arg:tt)*) => { {
        eprintln!($($arg)*);
        std::process::exit(EXIT_FAILURE)
    } }
);

fn usage() -> ! {
    let argv0 = std::env::args()
        .next()
        .unwrap_or_else(|| "dynamo".to_string());
    die!(
        concat!(
            "dynamo {}: Run DYNAMO system dynamics models.\n\
             \n\
             USAGE:\n",
            "    {} [OPTION...] SOURCE\n",
            "\n\
             OPTIONS:\n",
            "    -h, --help       show this message\n",
            "    -v               verbose diagnostics\n",
            "    -d PATH          debug output file ('-' for stdout)\n",
            "    -p PATH          printer output (.prt classic, .csv delimited)\n",
            "    -g PATH          plotter output (.plt classic, .gnuplot SVG script)\n",
        ),
        VERSION,
        argv0
    );
}

#[derive(Default, Debug)]
struct Args {
    path: Option<PathBuf>,
    debug: Option<String>,
    print: Option<PathBuf>,
    plot: Option<PathBuf>,
    verbose: bool,
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let mut parsed = Arguments::from_env();
    if parsed.contains(["-h", "--help"]) {
        usage();
    }

    let mut args = Args {
        verbose: parsed.contains("-v"),
        debug: parsed.opt_value_from_str("-d")?,
        print: parsed.opt_value_from_str("-p")?,
        plot: parsed.opt_value_from_str("-g")?,
        ..Default::default()
    };

    let free = parsed.finish();
    if free.len() != 1 {
        eprintln!("error: exactly one DYNAMO source file required");
        usage();
    }
    args.path = Some(PathBuf::from(&free[0]));

    Ok(args)
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {}", err);
            usage();
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_timestamp(None)
        .init();

    info!("-----------------------------------");
    info!("DYNAMO interpreter v{}", VERSION);
    info!("-----------------------------------");

    let debug = match args.debug.as_deref() {
        None => DebugSink::disabled(),
        Some("-") => DebugSink::to_stdout(),
        Some(path) => match DebugSink::to_file(path.as_ref()) {
            Ok(sink) => sink,
            Err(err) => die!("error: debug file: {}", err),
        },
    };
    let printer = match args.print.as_deref() {
        None => Printer::disabled(),
        Some(path) => match Printer::to_file(path) {
            Ok(printer) => printer,
            Err(err) => die!("error: printer file: {}", err),
        },
    };
    let plotter = match args.plot.as_deref() {
        None => Plotter::disabled(),
        Some(path) => match Plotter::to_file(path) {
            Ok(plotter) => plotter,
            Err(err) => die!("error: plotter file: {}", err),
        },
    };

    let path = args.path.unwrap();
    info!("Reading source file '{}'...", path.display());
    let src = match File::open(&path) {
        Ok(src) => src,
        Err(err) => die!("error: {}: {}", path.display(), err),
    };

    info!("Processing system model...");
    let mut mdl = Model::with_sinks(printer, plotter, debug);
    mdl.verbose = args.verbose;
    if let Err(err) = mdl.parse(src) {
        let _ = mdl.quit();
        die!("error: {}", err);
    }
    info!("   Model processing completed.");
    if let Err(err) = mdl.quit() {
        die!("error: {}", err);
    }
    info!("Done.");
}
