use serde::Serialize;

use crate::Word;

/// Final addresses of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement<W: Word> {
    pub name: String,
    pub storage_region: String,
    /// Set only when the section runs from a different region than it is
    /// stored in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_region: Option<String>,
    pub load_address: W,
    pub run_address: W,
    pub size: W,
    pub align: W,
    pub retained: bool,
}

impl<W: Word> Placement<W> {
    /// `true` for "copy now, execute later" sections
    pub fn is_split(&self) -> bool {
        self.run_region.is_some()
    }
}

/// Capacity consumed in one region, alignment padding included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionUsage<W: Word> {
    pub name: String,
    pub origin: W,
    pub length: W,
    pub used: W,
    pub free: W,
}

/// The resolved placement of every live section, in declaration order.
///
/// A `LayoutMap` is only ever produced whole by
/// [`LayoutEngine::resolve`](crate::LayoutEngine::resolve) and is read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutMap<W: Word> {
    sections: Vec<Placement<W>>,
    regions: Vec<RegionUsage<W>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    discarded: Vec<String>,
}

impl<W: Word> LayoutMap<W> {
    pub(crate) fn new(
        sections: Vec<Placement<W>>,
        regions: Vec<RegionUsage<W>>,
        discarded: Vec<String>,
    ) -> Self {
        LayoutMap {
            sections,
            regions,
            discarded,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Placement<W>> {
        self.sections.iter().find(|placement| placement.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Placement<W>> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Per region usage, in region declaration order
    pub fn usage(&self) -> &[RegionUsage<W>] {
        &self.regions
    }

    pub fn usage_of(&self, region: &str) -> Option<&RegionUsage<W>> {
        self.regions.iter().find(|usage| usage.name == region)
    }

    /// Sections dropped because nothing referenced them and they were not
    /// retained
    pub fn discarded(&self) -> &[String] {
        &self.discarded
    }

    /// Sections whose bytes are stored in `region`
    pub fn stored_in<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a Placement<W>> {
        self.sections
            .iter()
            .filter(move |placement| placement.storage_region == region)
    }

    /// Sections that run from `region` after being copied there
    pub fn copied_into<'a>(
        &'a self,
        region: &'a str,
    ) -> impl Iterator<Item = &'a Placement<W>> {
        self.sections
            .iter()
            .filter(move |placement| placement.run_region.as_deref() == Some(region))
    }
}

impl<'a, W: Word> IntoIterator for &'a LayoutMap<W> {
    type Item = &'a Placement<W>;
    type IntoIter = std::slice::Iter<'a, Placement<W>>;

    fn into_iter(self) -> Self::IntoIter {
        self.sections.iter()
    }
}
