//! Declarative layout input.
//!
//! A manifest is a JSON document listing regions and sections in placement
//! order:
//!
//! ```json
//! {
//!     "regions": [
//!         { "name": "FLASH", "origin": "0x08001000", "length": "1M" },
//!         { "name": "RAM", "origin": "0x20080000", "length": "1536K" }
//!     ],
//!     "sections": [
//!         { "name": "text", "storage": "FLASH" },
//!         { "name": "flexspi_code", "storage": "FLASH", "run": "RAM", "align": 8 }
//!     ]
//! }
//! ```
//!
//! Numbers may be JSON integers or strings in decimal or `0x` hex, with `_`
//! separators and an optional `K`, `M` or `G` suffix.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::error::Diagnostics;
use crate::{FrozenRegionTable, RegionID, RegionTable, Section, SectionList, Word};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid number for {field}: {value}")]
    InvalidNumber { field: String, value: String },
    #[error(transparent)]
    Layout(#[from] Diagnostics),
}

/// An integer given either as a JSON number or as a string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(u64),
    Text(String),
}

impl Number {
    pub fn value(&self) -> Option<u64> {
        match self {
            Number::Int(value) => Some(*value),
            Number::Text(text) => parse_number(text),
        }
    }

    fn to_word<W: Word, F: FnOnce() -> String>(&self, field: F) -> Result<W, ManifestError> {
        self.value()
            .and_then(|value| W::from_u128(u128::from(value)))
            .ok_or_else(|| ManifestError::InvalidNumber {
                field: field(),
                value: match self {
                    Number::Int(value) => value.to_string(),
                    Number::Text(text) => format!("{:?}", text),
                },
            })
    }
}

/// Parse `"0x0800_1000"`, `"4096"`, `"2K"`, `"1M"` and friends.
pub fn parse_number(text: &str) -> Option<u64> {
    let text: String = text.trim().chars().filter(|&c| c != '_').collect();
    let (digits, scale) = match text.chars().last()? {
        'k' | 'K' => (&text[..text.len() - 1], 1u64 << 10),
        'm' | 'M' => (&text[..text.len() - 1], 1 << 20),
        'g' | 'G' => (&text[..text.len() - 1], 1 << 30),
        _ => (text.as_str(), 1),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u64>().ok()?,
    };
    value.checked_mul(scale)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionEntry {
    pub name: String,
    pub origin: Number,
    pub length: Number,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionEntry {
    pub name: String,
    /// Region the section's bytes are stored in
    pub storage: String,
    /// Region the section is copied to and run from
    #[serde(default)]
    pub run: Option<String>,
    /// Defaults to the size of an address word
    #[serde(default)]
    pub align: Option<Number>,
    #[serde(default)]
    pub retain: bool,
    /// Absent for sections sized by the compiled program
    #[serde(default)]
    pub size: Option<Number>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub regions: Vec<RegionEntry>,
    #[serde(default)]
    pub sections: Vec<SectionEntry>,
}

impl Manifest {
    pub fn parse_str(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let json = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&json)
    }

    /// Build the frozen region table and the section list.
    ///
    /// Region problems abort before any section is looked at. Section
    /// problems are collected across the whole list.
    pub fn build<W: Word>(&self) -> Result<(FrozenRegionTable<W>, SectionList<W>), ManifestError> {
        let mut table = RegionTable::new();
        let mut diagnostics = Diagnostics::new();
        for entry in &self.regions {
            let origin = entry
                .origin
                .to_word::<W, _>(|| format!("region {:?} origin", entry.name))?;
            let length = entry
                .length
                .to_word::<W, _>(|| format!("region {:?} length", entry.name))?;
            if let Err(err) = table.define(&entry.name, origin, length) {
                diagnostics.push(err);
            }
        }
        let regions = diagnostics.into_result(table)?.freeze()?;

        let mut sections = SectionList::new();
        let mut diagnostics = Diagnostics::new();
        for entry in &self.sections {
            let section = entry.to_section::<W>()?;
            if let Err(err) = sections.append(section) {
                diagnostics.push(err);
            }
        }
        let sections = diagnostics.into_result(sections)?;

        tracing::debug!(
            regions = regions.len(),
            sections = sections.len(),
            "loaded manifest"
        );
        Ok((regions, sections))
    }
}

impl SectionEntry {
    fn to_section<W: Word>(&self) -> Result<Section<W>, ManifestError> {
        let mut section = Section::new(&self.name, RegionID::from(self.storage.as_str()));
        if let Some(align) = &self.align {
            let align = align.to_word::<W, _>(|| format!("section {:?} align", self.name))?;
            section = section.align(align);
        }
        if let Some(run) = &self.run {
            section = section.run_from(RegionID::from(run.as_str()));
        }
        if let Some(size) = &self.size {
            let size = size.to_word::<W, _>(|| format!("section {:?} size", self.name))?;
            section = section.fixed(size);
        }
        if self.retain {
            section = section.retain();
        }
        Ok(section)
    }
}

/// Section sizes reported by the compiled program, `{"text": 4096, ...}`
pub fn parse_sizes(json: &str) -> Result<BTreeMap<String, u64>, ManifestError> {
    let raw: BTreeMap<String, Number> = serde_json::from_str(json)?;
    raw.into_iter()
        .map(|(name, size)| match size.value() {
            Some(value) => Ok((name, value)),
            None => Err(ManifestError::InvalidNumber {
                field: format!("size of {:?}", name),
                value: format!("{:?}", size),
            }),
        })
        .collect()
}

pub fn sizes_from_path(path: &Path) -> Result<BTreeMap<String, u64>, ManifestError> {
    let json = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_sizes(&json)
}
