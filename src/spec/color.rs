//! Sample colors as written in definitions files.
//!
//! Accepted forms: a palette index (`2`), a named palette constant (`kRed`),
//! a constant with an offset (`kAzure+1`, `kGray-2`), or a hex triplet
//! (`#5790fc`).

use crate::error::{AnalysisError, Result};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Palette index, as used by ROOT.
    Index(u32),
    Rgb(u8, u8, u8),
}

/// Named palette constants and their indices.
const NAMED: &[(&str, u32)] = &[
    ("kWhite", 0),
    ("kBlack", 1),
    ("kGray", 920),
    ("kRed", 632),
    ("kGreen", 416),
    ("kBlue", 600),
    ("kYellow", 400),
    ("kMagenta", 616),
    ("kCyan", 432),
    ("kOrange", 800),
    ("kSpring", 820),
    ("kTeal", 840),
    ("kAzure", 860),
    ("kViolet", 880),
    ("kPink", 900),
];

/// Base RGB of the color wheel entries in `NAMED`.
const WHEEL: &[(u32, (u8, u8, u8))] = &[
    (920, (204, 204, 204)),
    (632, (255, 0, 0)),
    (416, (0, 255, 0)),
    (600, (0, 0, 255)),
    (400, (255, 255, 0)),
    (616, (255, 0, 255)),
    (432, (0, 255, 255)),
    (800, (255, 204, 0)),
    (820, (204, 255, 0)),
    (840, (0, 255, 204)),
    (860, (0, 204, 255)),
    (880, (204, 0, 255)),
    (900, (255, 0, 204)),
];

/// Classic palette entries 0..=9.
const BASIC: [(u8, u8, u8); 10] = [
    (255, 255, 255),
    (0, 0, 0),
    (255, 0, 0),
    (0, 255, 0),
    (0, 0, 255),
    (255, 255, 0),
    (255, 0, 255),
    (0, 255, 255),
    (89, 212, 84),
    (89, 84, 217),
];

impl Color {
    /// Approximate screen color. Wheel offsets darken (`+n`) or lighten
    /// (`-n`) the base hue; unknown indices render gray.
    pub fn rgb(&self) -> (u8, u8, u8) {
        match *self {
            Color::Rgb(r, g, b) => (r, g, b),
            Color::Index(i) if (i as usize) < BASIC.len() => BASIC[i as usize],
            Color::Index(i) => {
                let Some(&(base, rgb)) = WHEEL
                    .iter()
                    .find(|(base, _)| i + 10 >= *base && i <= base + 4)
                else {
                    return (128, 128, 128);
                };
                let offset = i as i64 - base as i64;
                let shade = |c: u8| -> u8 {
                    let c = c as f64;
                    let v = if offset >= 0 {
                        c * (1.0 - 0.15 * offset as f64)
                    } else {
                        c + (255.0 - c) * 0.09 * (-offset) as f64
                    };
                    v.round().clamp(0.0, 255.0) as u8
                };
                (shade(rgb.0), shade(rgb.1), shade(rgb.2))
            }
        }
    }

    pub fn css(&self) -> String {
        let (r, g, b) = self.rgb();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

impl FromStr for Color {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let unknown = || AnalysisError::UnknownColor(s.to_string());

        let hex = Regex::new(r"^#([0-9a-fA-F]{2})([0-9a-fA-F]{2})([0-9a-fA-F]{2})$")?;
        if let Some(caps) = hex.captures(s) {
            let channel = |i: usize| u8::from_str_radix(&caps[i], 16).map_err(|_| unknown());
            return Ok(Color::Rgb(channel(1)?, channel(2)?, channel(3)?));
        }

        let indexed = Regex::new(r"^(k[A-Za-z]+|\d+)\s*(?:([+-])\s*(\d+))?$")?;
        let caps = indexed.captures(s).ok_or_else(unknown)?;
        let base = match &caps[1] {
            name if name.starts_with('k') => NAMED
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, i)| *i)
                .ok_or_else(unknown)?,
            digits => digits.parse::<u32>().map_err(|_| unknown())?,
        };
        let offset: u32 = match caps.get(3) {
            Some(m) => m.as_str().parse().map_err(|_| unknown())?,
            None => 0,
        };
        let index = match caps.get(2).map(|m| m.as_str()) {
            Some("-") => base.checked_sub(offset).ok_or_else(unknown)?,
            _ => base + offset,
        };
        Ok(Color::Index(index))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Index(i) => write!(f, "{}", i),
            Color::Rgb(..) => f.write_str(&self.css()),
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.css())
    }
}
