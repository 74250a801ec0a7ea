use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::LayoutError;
use crate::{RegionID, SectionID, Word};

/// SectionSize describes where the size of a section comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionSize<W: Word> {
    /// The size is supplied at resolve time by a [`SizeProvider`], usually
    /// by introspecting the compiled program's section of the same name
    Linker,

    /// A fixed section size, known when the layout is declared
    Fixed(W),
}

/// Supplies the size of linker sized sections by name.
pub trait SizeProvider {
    fn section_size(&self, name: &str) -> Option<u64>;
}

/// Provides no sizes; every [`SectionSize::Linker`] section is missing content.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSizes;

impl SizeProvider for NoSizes {
    fn section_size(&self, _name: &str) -> Option<u64> {
        None
    }
}

impl SizeProvider for HashMap<String, u64> {
    fn section_size(&self, name: &str) -> Option<u64> {
        self.get(name).copied()
    }
}

impl SizeProvider for BTreeMap<String, u64> {
    fn section_size(&self, name: &str) -> Option<u64> {
        self.get(name).copied()
    }
}

impl<P: SizeProvider + ?Sized> SizeProvider for &P {
    fn section_size(&self, name: &str) -> Option<u64> {
        (**self).section_size(name)
    }
}

/// Section describe where in memory certain parts of the program should be
/// placed, including if they are loaded from another Region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<W: Word> {
    /// Name given to the section
    pub(crate) name: String,

    /// Region the section's bytes are stored in (load memory region)
    pub(crate) storage: RegionID,

    /// Optional region the program executes or accesses this section from.
    /// When absent the run address is the load address.
    pub(crate) run: Option<RegionID>,

    /// Required start alignment in bytes, a power of two
    pub(crate) align: W,

    /// Placed even when nothing references it
    pub(crate) retain: bool,

    pub(crate) size: SectionSize<W>,
}

impl<W: Word> Section<W> {
    /// A linker sized section stored in, and run from, `storage`, aligned
    /// to the machine word.
    pub fn new(name: &str, storage: RegionID) -> Self {
        Section {
            name: String::from(name),
            storage,
            run: None,
            align: W::from_u128(std::mem::size_of::<W>() as u128).unwrap_or(W::ONE),
            retain: false,
            size: SectionSize::Linker,
        }
    }

    /// Copy the section into `run` before use; its run address is placed in
    /// that region while its bytes remain stored in the storage region.
    pub fn run_from(mut self, run: RegionID) -> Self {
        self.run = Some(run);
        self
    }

    pub fn align(mut self, align: W) -> Self {
        self.align = align;
        self
    }

    pub fn fixed(mut self, size: W) -> Self {
        self.size = SectionSize::Fixed(size);
        self
    }

    /// Keep this section even if it is otherwise unreferenced
    pub fn retain(mut self) -> Self {
        self.retain = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &RegionID {
        &self.storage
    }

    /// The run region, only when it differs from the storage region
    pub fn split_run(&self) -> Option<&RegionID> {
        self.run.as_ref().filter(|run| **run != self.storage)
    }

    pub fn alignment(&self) -> W {
        self.align
    }

    pub fn is_retained(&self) -> bool {
        self.retain
    }

    pub fn size(&self) -> SectionSize<W> {
        self.size
    }

    /// Resolve the section's byte count, widened
    pub(crate) fn resolve_size<P: SizeProvider + ?Sized>(
        &self,
        sizes: &P,
    ) -> Result<u128, LayoutError> {
        let missing = || LayoutError::MissingContent {
            section: self.name.clone(),
        };
        match self.size {
            SectionSize::Fixed(size) => Ok(size.to_u128()),
            SectionSize::Linker => {
                let size = sizes.section_size(&self.name).ok_or_else(missing)?;
                // a size that cannot be expressed in the target's word is as
                // good as absent
                W::from_u128(size as u128).ok_or_else(missing)?;
                Ok(size as u128)
            }
        }
    }
}

/// Sections in placement order.
///
/// The order sections are appended is the order they are packed into each
/// region.
#[derive(Debug, Clone, Default)]
pub struct SectionList<W: Word> {
    sections: Vec<Section<W>>,
    names: HashSet<String>,
}

impl<W: Word> SectionList<W> {
    pub fn new() -> Self {
        SectionList {
            sections: Vec::new(),
            names: HashSet::new(),
        }
    }

    pub fn append(&mut self, section: Section<W>) -> Result<SectionID, LayoutError> {
        if self.names.contains(&section.name) {
            return Err(LayoutError::DuplicateSection(section.name));
        }
        if !section.align.to_u128().is_power_of_two() {
            return Err(LayoutError::InvalidAlignment {
                section: section.name,
                align: section.align.to_u128(),
            });
        }
        let name = section.name.clone();
        self.names.insert(name.clone());
        self.sections.push(section);
        Ok(SectionID(name))
    }

    pub fn get(&self, name: &str) -> Option<&Section<W>> {
        self.sections.iter().find(|section| section.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Section<W>> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FLASH, RAM};

    fn flash() -> RegionID {
        RegionID::from(FLASH)
    }

    #[test]
    fn defaults_to_word_alignment() {
        let narrow = Section::<u32>::new("text", flash());
        assert_eq!(narrow.alignment(), 4);
        let wide = Section::<u64>::new("text", flash());
        assert_eq!(wide.alignment(), 8);
        assert_eq!(narrow.size(), SectionSize::Linker);
        assert!(!narrow.is_retained());
    }

    #[test]
    fn run_region_equal_to_storage_is_not_a_split() {
        let section = Section::<u32>::new("data", flash()).run_from(flash());
        assert_eq!(section.split_run(), None);
        let section = Section::<u32>::new("data", flash()).run_from(RegionID::from(RAM));
        assert_eq!(section.split_run(), Some(&RegionID::from(RAM)));
    }

    #[test]
    fn rejects_duplicate_section() {
        let mut list = SectionList::<u32>::new();
        list.append(Section::new("text", flash())).unwrap();
        assert_eq!(
            list.append(Section::new("text", flash())),
            Err(LayoutError::DuplicateSection("text".into()))
        );
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        let mut list = SectionList::<u32>::new();
        for align in [0, 3, 12] {
            assert_eq!(
                list.append(Section::new("text", flash()).align(align)),
                Err(LayoutError::InvalidAlignment {
                    section: "text".into(),
                    align: align as u128
                })
            );
        }
        list.append(Section::new("text", flash()).align(1)).unwrap();
    }

    #[test]
    fn keeps_declaration_order() {
        let mut list = SectionList::<u32>::new();
        for name in ["vector_table", "text", "rodata"] {
            list.append(Section::new(name, flash())).unwrap();
        }
        let names: Vec<&str> = list.iter().map(Section::name).collect();
        assert_eq!(names, ["vector_table", "text", "rodata"]);
    }

    #[test]
    fn linker_sizes_come_from_provider() {
        let mut sizes = HashMap::new();
        sizes.insert(String::from("text"), 0x200u64);
        let text = Section::<u32>::new("text", flash());
        assert_eq!(text.resolve_size(&sizes), Ok(0x200));
        let bss = Section::<u32>::new("bss", flash());
        assert_eq!(
            bss.resolve_size(&sizes),
            Err(LayoutError::MissingContent {
                section: "bss".into()
            })
        );
        let fcb = Section::<u32>::new("fcb", flash()).fixed(0x200);
        assert_eq!(fcb.resolve_size(&NoSizes), Ok(0x200));
    }

    #[test]
    fn oversized_provider_value_is_missing() {
        let mut sizes = HashMap::new();
        sizes.insert(String::from("text"), u64::from(u32::MAX) + 1);
        let text = Section::<u32>::new("text", flash());
        assert!(text.resolve_size(&sizes).is_err());
    }
}
