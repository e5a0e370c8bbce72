// Copyright 2025 The Dynamo Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Indexed identifiers.
//!
//! A name consists of a simple text part and an optional index separated
//! by a dot. The index encodes the temporal stage of the reference:
//! `.J`/`.JK` read the previous step, `.K`/`.KL` the current one. Bare
//! names start out as constants and are re-classified by the statement
//! that encloses them. In strict mode the text part is limited to six
//! characters, as historic DYNAMO compilers required.

use std::fmt;

use crate::common::Result;
use crate::parse_err;

/// Max. length of the text part in strict mode.
pub const MAX_NAME_LENGTH: usize = 6;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Const,
    Init,
    Level,
    Rate,
    Aux,
    Suppl,
}

impl Kind {
    /// Single-letter tag used in display keys like `INV/L`.
    pub fn letter(&self) -> char {
        match self {
            Kind::Const => 'C',
            Kind::Init => 'I',
            Kind::Level => 'L',
            Kind::Rate => 'R',
            Kind::Aux => 'A',
            Kind::Suppl => 'S',
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    None,
    Old,
    New,
}

/// Classification of a variable: the (kind, stage) pair the validation
/// tables in the equation list are expressed over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Class {
    pub kind: Kind,
    pub stage: Stage,
}

// Results for Name::compare
pub const NAME_SAMEVAR: u8 = 1;
pub const NAME_SAMEKIND: u8 = 2;
pub const NAME_SAMESTAGE: u8 = 4;
pub const NAME_MATCH: u8 = 7;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Name {
    pub text: String,
    pub kind: Kind,
    pub stage: Stage,
}

impl Name {
    /// Parse an identifier like `COFFEE`, `SHPMT.JK` or `INV.K`. The
    /// strict flag enforces the classic six-character limit and the
    /// leading letter (or underscore, for generated variables).
    pub fn parse(text: &str, strict: bool) -> Result<Name> {
        let (head, index) = match text.find('.') {
            Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
            None => (text, None),
        };
        if strict {
            if head.len() > MAX_NAME_LENGTH {
                return parse_err!(NameLength, "{}", head.len());
            }
            match head.chars().next() {
                Some(c) if c.is_alphabetic() || c == '_' => {}
                _ => return parse_err!(InvalidName, "{}", text),
            }
        } else if head.is_empty() {
            return parse_err!(InvalidName, "{}", text);
        }
        let mut name = Name {
            text: head.to_string(),
            kind: Kind::Const,
            stage: Stage::None,
        };
        if let Some(idx) = index {
            name.set_index(idx)?;
        }
        Ok(name)
    }

    fn set_index(&mut self, idx: &str) -> Result<()> {
        match idx {
            "J" => {
                self.kind = Kind::Level;
                self.stage = Stage::Old;
            }
            "JK" => {
                self.kind = Kind::Rate;
                self.stage = Stage::Old;
            }
            "K" => {
                self.kind = Kind::Level;
                self.stage = Stage::New;
            }
            "KL" => {
                self.kind = Kind::Rate;
                self.stage = Stage::New;
            }
            _ => return parse_err!(InvalidIndex, "{}", idx),
        }
        Ok(())
    }

    /// The index this name would be spelled with in source text.
    pub fn index(&self) -> &'static str {
        match (self.kind, self.stage) {
            (Kind::Level, Stage::Old) => "J",
            (Kind::Rate, Stage::Old) => "JK",
            (Kind::Level, Stage::New) => "K",
            (Kind::Rate, Stage::New) => "KL",
            _ => "",
        }
    }

    /// Source spelling, index included: `SHPMT.JK`.
    pub fn qualified(&self) -> String {
        let idx = self.index();
        if idx.is_empty() {
            self.text.clone()
        } else {
            format!("{}.{}", self.text, idx)
        }
    }

    /// Bitset comparison over variable text, kind and stage; the value
    /// [NAME_MATCH] is a full match.
    pub fn compare(&self, other: &Name) -> u8 {
        let mut m = 0;
        if self.text == other.text {
            m |= NAME_SAMEVAR;
        }
        if self.kind == other.kind {
            m |= NAME_SAMEKIND;
        }
        if self.stage == other.stage {
            m |= NAME_SAMESTAGE;
        }
        m
    }
}

impl fmt::Display for Name {
    /// Display key used for cross-equation lookups: `INV/L`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.text, self.kind.letter())
    }
}

/// Allocator for the hidden per-call variables of stateful functions.
/// Fresh names are `_1`, `_2`, ... in parse order. The counter is
/// model-scoped so re-parsing the same source yields the same names.
#[derive(Default, Debug)]
pub struct AutoVars {
    last: usize,
}

impl AutoVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> String {
        self.last += 1;
        format!("_{}", self.last)
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    #[test]
    fn test_parse_bare() {
        let n = Name::parse("COFFEE", true).unwrap();
        assert_eq!("COFFEE", n.text);
        assert_eq!(Kind::Const, n.kind);
        assert_eq!(Stage::None, n.stage);
        assert_eq!("COFFEE/C", n.to_string());
    }

    #[test]
    fn test_parse_indexed() {
        let cases = [
            ("INV.J", Kind::Level, Stage::Old),
            ("INV.K", Kind::Level, Stage::New),
            ("CHNG.JK", Kind::Rate, Stage::Old),
            ("CHNG.KL", Kind::Rate, Stage::New),
        ];
        for (text, kind, stage) in cases {
            let n = Name::parse(text, true).unwrap();
            assert_eq!(kind, n.kind, "{}", text);
            assert_eq!(stage, n.stage, "{}", text);
            assert_eq!(text, n.qualified());
        }
    }

    #[test]
    fn test_parse_rejects() {
        assert!(Name::parse("INVENTARLISTE.K", true)
            .unwrap_err()
            .is_a(ErrorCode::NameLength));
        assert!(Name::parse("INV.L", true)
            .unwrap_err()
            .is_a(ErrorCode::InvalidIndex));
        assert!(Name::parse("1BAD", true)
            .unwrap_err()
            .is_a(ErrorCode::InvalidName));
        // lax mode allows long names
        assert!(Name::parse("INVENTARLISTE.K", false).is_ok());
    }

    #[test]
    fn test_compare() {
        let a = Name::parse("INV.K", true).unwrap();
        let b = Name::parse("INV.K", true).unwrap();
        let c = Name::parse("INV.J", true).unwrap();
        let d = Name::parse("CHNG.JK", true).unwrap();
        assert_eq!(NAME_MATCH, a.compare(&b));
        assert_eq!(NAME_SAMEVAR | NAME_SAMEKIND, a.compare(&c));
        assert_eq!(0, a.compare(&d));
    }

    #[test]
    fn test_display_round_trip() {
        // NAME/K display reconstructs (text, kind) for every kind letter
        for text in ["S", "COFFEE", "_1"] {
            let n = Name::parse(text, true).unwrap();
            let shown = n.to_string();
            let bare = shown.strip_suffix("/C").unwrap();
            let again = Name::parse(bare, true).unwrap();
            assert_eq!(n, again);
        }
    }

    #[test]
    fn test_auto_vars() {
        let mut autos = AutoVars::new();
        assert_eq!("_1", autos.next());
        assert_eq!("_2", autos.next());
        autos.reset();
        assert_eq!("_1", autos.next());
    }
}
