use std::collections::HashMap;

use crate::error::{Diagnostics, LayoutError};
use crate::{RegionID, Word};

/// Region description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region<W: Word> {
    pub(crate) name: String,
    pub(crate) origin: W,
    pub(crate) size: W,
}

impl<W: Word> Region<W> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> RegionID {
        RegionID(self.name.clone())
    }

    pub fn origin(&self) -> W {
        self.origin
    }

    /// Capacity in bytes
    pub fn size(&self) -> W {
        self.size
    }

    /// Exclusive end address, widened. Always representable in `W` for a
    /// region accepted by [`RegionTable::define`].
    pub(crate) fn end(&self) -> u128 {
        self.origin.to_u128() + self.size.to_u128()
    }

    /// `true` when `[start, start + len)` lies entirely inside this region
    pub fn contains(&self, start: W, len: W) -> bool {
        let start = start.to_u128();
        start >= self.origin.to_u128() && start + len.to_u128() <= self.end()
    }

    fn intersects(&self, other: &Region<W>) -> bool {
        self.origin.to_u128() < other.end() && other.origin.to_u128() < self.end()
    }
}

/// Named memory regions in declaration order.
///
/// Regions may be added until the table is frozen; only a
/// [`FrozenRegionTable`] can be handed to the layout engine.
#[derive(Debug, Clone, Default)]
pub struct RegionTable<W: Word> {
    regions: Vec<Region<W>>,
    index: HashMap<String, usize>,
}

impl<W: Word> RegionTable<W> {
    pub fn new() -> Self {
        RegionTable {
            regions: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a named memory region
    pub fn define(&mut self, name: &str, origin: W, size: W) -> Result<RegionID, LayoutError> {
        if self.index.contains_key(name) {
            return Err(LayoutError::DuplicateRegion(name.to_string()));
        }
        if size.to_u128() == 0 {
            return Err(LayoutError::InvalidRegion {
                region: name.to_string(),
                detail: String::from("length must be non-zero"),
            });
        }
        let end = origin.to_u128() + size.to_u128();
        if end > W::MAX.to_u128() {
            return Err(LayoutError::InvalidRegion {
                region: name.to_string(),
                detail: format!(
                    "origin {:#X} + length {:#X} exceeds the {}-bit address space",
                    origin,
                    size,
                    W::BITS
                ),
            });
        }

        tracing::debug!(region = name, "defined region at {:#X}, {:#X} bytes", origin, size);
        self.index.insert(name.to_string(), self.regions.len());
        self.regions.push(Region {
            name: name.to_string(),
            origin,
            size,
        });
        Ok(RegionID(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Result<&Region<W>, LayoutError> {
        lookup(&self.regions, &self.index, name)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Check that no two regions intersect and lock the table.
    ///
    /// Every overlapping pair is reported, the earlier-declared region first.
    pub fn freeze(self) -> Result<FrozenRegionTable<W>, Diagnostics> {
        let mut diagnostics = Diagnostics::new();
        for (i, first) in self.regions.iter().enumerate() {
            for second in &self.regions[i + 1..] {
                if first.intersects(second) {
                    tracing::warn!(first = %first.name, second = %second.name, "regions overlap");
                    diagnostics.push(LayoutError::RegionOverlap {
                        first: first.name.clone(),
                        second: second.name.clone(),
                    });
                }
            }
        }
        diagnostics.into_result(FrozenRegionTable {
            regions: self.regions,
            index: self.index,
        })
    }
}

/// A validated set of pairwise disjoint regions.
#[derive(Debug, Clone)]
pub struct FrozenRegionTable<W: Word> {
    regions: Vec<Region<W>>,
    index: HashMap<String, usize>,
}

impl<W: Word> FrozenRegionTable<W> {
    pub fn lookup(&self, name: &str) -> Result<&Region<W>, LayoutError> {
        lookup(&self.regions, &self.index, name)
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region<W>> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn lookup<'a, W: Word>(
    regions: &'a [Region<W>],
    index: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a Region<W>, LayoutError> {
    index
        .get(name)
        .map(|&i| &regions[i])
        .ok_or_else(|| LayoutError::UnknownRegion {
            region: name.to_string(),
            section: None,
        })
}
