use std::collections::HashSet;

use crate::error::{Diagnostics, LayoutError};
use crate::map::{LayoutMap, Placement, RegionUsage};
use crate::region::{FrozenRegionTable, Region};
use crate::section::{NoSizes, Section, SectionList, SizeProvider};
use crate::{RegionID, Word};

/// Packs an ordered section list into a frozen region table.
///
/// Each region keeps one cursor starting at its origin. Sections are visited
/// in declaration order; a section's load address is its storage region's
/// cursor rounded up to the section alignment, and when it runs from another
/// region its run address is taken from that region's cursor the same way.
/// Storage and run placements into the same region share the cursor, so a
/// copied section never lands on top of something stored there.
///
/// The engine is consumed by [`LayoutEngine::resolve`], which yields either a
/// complete [`LayoutMap`] or every violation found.
pub struct LayoutEngine<'a, W: Word> {
    regions: &'a FrozenRegionTable<W>,
    sections: &'a SectionList<W>,
    sizes: &'a dyn SizeProvider,
    referenced: Option<HashSet<String>>,
}

impl<'a, W: Word> LayoutEngine<'a, W> {
    pub fn new(regions: &'a FrozenRegionTable<W>, sections: &'a SectionList<W>) -> Self {
        LayoutEngine {
            regions,
            sections,
            sizes: &NoSizes,
            referenced: None,
        }
    }

    /// Source of sizes for linker sized sections
    pub fn sizes(mut self, sizes: &'a dyn SizeProvider) -> Self {
        self.sizes = sizes;
        self
    }

    /// Only place sections named here, plus retained sections.
    ///
    /// Without this every declared section is placed.
    pub fn keep_only<I, S>(mut self, referenced: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.referenced = Some(referenced.into_iter().map(Into::into).collect());
        self
    }

    fn is_live(&self, section: &Section<W>) -> bool {
        section.retain
            || self
                .referenced
                .as_ref()
                .map_or(true, |referenced| referenced.contains(&section.name))
    }

    fn region_index(&self, section: &Section<W>, id: &RegionID) -> Result<usize, LayoutError> {
        self.regions
            .position(id.as_str())
            .ok_or_else(|| LayoutError::UnknownRegion {
                region: id.as_str().to_string(),
                section: Some(section.name.clone()),
            })
    }

    /// Compute every address in one pass.
    pub fn resolve(self) -> Result<LayoutMap<W>, Diagnostics> {
        let regions: Vec<&Region<W>> = self.regions.iter().collect();
        let mut cursors: Vec<u128> = regions.iter().map(|r| r.origin.to_u128()).collect();
        let mut diagnostics = Diagnostics::new();
        let mut placements = Vec::with_capacity(self.sections.len());
        let mut discarded = Vec::new();

        for section in self.sections.iter() {
            if !self.is_live(section) {
                tracing::debug!(section = %section.name, "discarding unreferenced section");
                discarded.push(section.name.clone());
                continue;
            }

            let storage = self
                .region_index(section, &section.storage)
                .map_err(|err| diagnostics.push(err));
            let run = section.split_run().map(|run| {
                self.region_index(section, run)
                    .map_err(|err| diagnostics.push(err))
            });
            let size = section
                .resolve_size(self.sizes)
                .map_err(|err| diagnostics.push(err));

            let (Ok(storage), Ok(size)) = (storage, size) else {
                continue;
            };
            let run = match run {
                Some(Ok(run)) => Some(run),
                Some(Err(())) => continue,
                None => None,
            };

            let load = place(&mut cursors[storage], regions[storage], section, size)
                .map_err(|err| diagnostics.push(err));
            let run_address = match run {
                Some(run) => place(&mut cursors[run], regions[run], section, size)
                    .map(Some)
                    .map_err(|err| diagnostics.push(err)),
                None => Ok(None),
            };

            let (Ok(load), Ok(run_address)) = (load, run_address) else {
                continue;
            };
            let run_address = run_address.unwrap_or(load);

            tracing::debug!(
                section = %section.name,
                "load {:#X}, run {:#X}, {:#X} bytes",
                load,
                run_address,
                size
            );
            placements.push(Placement {
                name: section.name.clone(),
                storage_region: regions[storage].name.clone(),
                run_region: run.map(|run| regions[run].name.clone()),
                load_address: narrow(load),
                run_address: narrow(run_address),
                size: narrow(size),
                align: section.align,
                retained: section.retain,
            });
        }

        if !diagnostics.is_empty() {
            tracing::warn!(violations = diagnostics.len(), "layout failed");
            return Err(diagnostics);
        }

        let usage = regions
            .iter()
            .zip(&cursors)
            .map(|(region, &cursor)| {
                let used = cursor - region.origin.to_u128();
                RegionUsage {
                    name: region.name.clone(),
                    origin: region.origin,
                    length: region.size,
                    used: narrow(used),
                    free: narrow(region.size.to_u128() - used),
                }
            })
            .collect();

        tracing::info!(
            sections = placements.len(),
            discarded = discarded.len(),
            "layout resolved"
        );
        Ok(LayoutMap::new(placements, usage, discarded))
    }
}

/// Round `value` up to the next multiple of `align`, a power of two.
pub(crate) fn align_up(value: u128, align: u128) -> u128 {
    (value + align - 1) & !(align - 1)
}

/// Claim `size` bytes at the region's cursor.
///
/// The cursor advances even when the section overflows so that later
/// sections in the same region are checked against the layout as declared.
fn place<W: Word>(
    cursor: &mut u128,
    region: &Region<W>,
    section: &Section<W>,
    size: u128,
) -> Result<u128, LayoutError> {
    let start = align_up(*cursor, section.align.to_u128());
    let end = start + size;
    *cursor = end;
    if end > region.end() {
        tracing::debug!(section = %section.name, region = %region.name, "section overflows region");
        return Err(LayoutError::RegionOverflow {
            region: region.name.clone(),
            section: section.name.clone(),
            start,
            end,
            limit: region.end(),
        });
    }
    Ok(start)
}

/// Only called on values bounded by an accepted region's end.
fn narrow<W: Word>(value: u128) -> W {
    W::from_u128(value).unwrap_or(W::MAX)
}
