// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Debug sink: structured evaluation traces, written to a file or to
//! standard output when configured, dropped otherwise.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::common::Result;
use crate::out_err;

pub struct DebugSink {
    out: Option<Box<dyn Write>>,
    console: bool,
}

impl DebugSink {
    pub fn disabled() -> Self {
        DebugSink {
            out: None,
            console: false,
        }
    }

    pub fn to_stdout() -> Self {
        DebugSink {
            out: Some(Box::new(io::stdout())),
            console: true,
        }
    }

    pub fn to_file(path: &Path) -> io::Result<Self> {
        Ok(DebugSink {
            out: Some(Box::new(File::create(path)?)),
            console: false,
        })
    }

    /// Write one trace record. Traces are best-effort; a sink that
    /// cannot take data reports the problem at close time.
    pub fn trace(&mut self, args: fmt::Arguments) {
        if let Some(out) = self.out.as_mut() {
            let _ = out.write_fmt(args);
        }
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            if !self.console {
                if let Err(err) = out.flush() {
                    return out_err!(NoData, "debug sink: {}", err);
                }
            }
        }
        Ok(())
    }
}
