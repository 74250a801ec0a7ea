use serde::Serialize;
use thiserror::Error;

/// Every way a layout can be rejected.
///
/// Addresses and sizes are carried widened to `u128` so the error type does
/// not depend on the target's [`Word`](crate::Word).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("duplicate region, {0:?} already defined")]
    DuplicateRegion(String),

    #[error("region {region:?} is invalid: {detail}")]
    InvalidRegion { region: String, detail: String },

    #[error("region {region:?} is unknown{}", section_suffix(.section))]
    UnknownRegion {
        region: String,
        section: Option<String>,
    },

    #[error("duplicate section, {0:?} already defined")]
    DuplicateSection(String),

    #[error("size of section {section:?} is unavailable")]
    MissingContent { section: String },

    #[error("section {section:?} alignment {align:#x} is not a power of two")]
    InvalidAlignment { section: String, align: u128 },

    #[error(
        "section {section:?} needs [{start:#X}, {end:#X}) but region {region:?} ends at {limit:#X}"
    )]
    RegionOverflow {
        region: String,
        section: String,
        start: u128,
        end: u128,
        limit: u128,
    },

    #[error("region {first:?} overlaps region {second:?}")]
    RegionOverlap { first: String, second: String },
}

fn section_suffix(section: &Option<String>) -> String {
    match section {
        Some(section) => format!(" (referenced by section {:?})", section),
        None => String::new(),
    }
}

/// Flat classification of a [`LayoutError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    DuplicateRegion,
    InvalidRegion,
    UnknownRegion,
    DuplicateSection,
    MissingContent,
    InvalidAlignment,
    RegionOverflow,
    RegionOverlap,
}

impl LayoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayoutError::DuplicateRegion(_) => ErrorKind::DuplicateRegion,
            LayoutError::InvalidRegion { .. } => ErrorKind::InvalidRegion,
            LayoutError::UnknownRegion { .. } => ErrorKind::UnknownRegion,
            LayoutError::DuplicateSection(_) => ErrorKind::DuplicateSection,
            LayoutError::MissingContent { .. } => ErrorKind::MissingContent,
            LayoutError::InvalidAlignment { .. } => ErrorKind::InvalidAlignment,
            LayoutError::RegionOverflow { .. } => ErrorKind::RegionOverflow,
            LayoutError::RegionOverlap { .. } => ErrorKind::RegionOverlap,
        }
    }

    /// Region the violation is attributed to, if any.
    ///
    /// For [`LayoutError::RegionOverlap`] this is the region declared first.
    pub fn region(&self) -> Option<&str> {
        match self {
            LayoutError::DuplicateRegion(name) => Some(name),
            LayoutError::InvalidRegion { region, .. }
            | LayoutError::UnknownRegion { region, .. }
            | LayoutError::RegionOverflow { region, .. } => Some(region),
            LayoutError::RegionOverlap { first, .. } => Some(first),
            _ => None,
        }
    }

    /// Section the violation is attributed to, if any.
    pub fn section(&self) -> Option<&str> {
        match self {
            LayoutError::UnknownRegion { section, .. } => section.as_deref(),
            LayoutError::DuplicateSection(name) => Some(name),
            LayoutError::MissingContent { section }
            | LayoutError::InvalidAlignment { section, .. }
            | LayoutError::RegionOverflow { section, .. } => Some(section),
            _ => None,
        }
    }

    pub fn to_record(&self) -> DiagnosticRecord {
        DiagnosticRecord {
            kind: self.kind(),
            region: self.region().map(String::from),
            section: self.section().map(String::from),
            detail: self.to_string(),
        }
    }
}

/// Serializable `{kind, region?, section?, detail}` form of a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub detail: String,
}

/// Ordered list of violations found in one pass.
///
/// Never empty when returned as an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("layout rejected with {} violation(s)", .0.len())]
pub struct Diagnostics(Vec<LayoutError>);

impl Diagnostics {
    pub(crate) fn new() -> Self {
        Diagnostics(Vec::new())
    }

    pub(crate) fn push(&mut self, error: LayoutError) {
        self.0.push(error);
    }

    /// `Ok(value)` when nothing was collected, otherwise `Err(self)`
    pub(crate) fn into_result<T>(self, value: T) -> Result<T, Diagnostics> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LayoutError> {
        self.0.iter()
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.0.iter().map(LayoutError::to_record).collect()
    }

    pub fn into_inner(self) -> Vec<LayoutError> {
        self.0
    }
}

impl From<LayoutError> for Diagnostics {
    fn from(error: LayoutError) -> Self {
        Diagnostics(vec![error])
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a LayoutError;
    type IntoIter = std::slice::Iter<'a, LayoutError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Failure to produce a linker script
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Layout(#[from] Diagnostics),
    #[error("failed to write linker script: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_region_and_section() {
        let err = LayoutError::RegionOverflow {
            region: "FLASH".into(),
            section: "text".into(),
            start: 0x100,
            end: 0x220,
            limit: 0x200,
        };
        let record = err.to_record();
        assert_eq!(record.kind, ErrorKind::RegionOverflow);
        assert_eq!(record.region.as_deref(), Some("FLASH"));
        assert_eq!(record.section.as_deref(), Some("text"));
        assert!(record.detail.contains("0x220"), "{}", record.detail);
    }

    #[test]
    fn unknown_region_mentions_section() {
        let err = LayoutError::UnknownRegion {
            region: "SRAM".into(),
            section: Some("data".into()),
        };
        assert_eq!(
            err.to_string(),
            "region \"SRAM\" is unknown (referenced by section \"data\")"
        );
    }

    #[test]
    fn empty_diagnostics_are_ok() {
        assert_eq!(Diagnostics::new().into_result(7), Ok(7));
        let mut diags = Diagnostics::new();
        diags.push(LayoutError::DuplicateSection("bss".into()));
        assert_eq!(diags.clone().into_result(()), Err(diags));
    }
}
