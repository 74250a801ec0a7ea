//! Plans where every section of a firmware image lives before any of it
//! runs, and generates the linker script that pins it there.
//!
//! Memory is carved into named, fixed capacity regions (boot headers, key
//! storage, program flash, RAM, ...). Sections are packed into their region
//! in declaration order with explicit alignment. A section may be stored in
//! one region and run from another, the "copy now, execute later" split used
//! for code that must run from RAM while the flash it lives in is busy.
//!
//! Based on ideas from Jorge Aparicio
//! * https://github.com/rust-embedded/cortex-m-rt/issues/164
//! * https://github.com/japaric/cortex-m-rt-ld

use std::fmt::{self, Debug, Display, LowerHex, UpperHex};
use std::fs::File;
use std::hash::Hash;
use std::io::{BufWriter, Write};

use serde::Serialize;

mod engine;
mod error;
pub mod generate;
pub mod manifest;
mod map;
mod region;
mod section;

pub use engine::LayoutEngine;
pub use error::{DiagnosticRecord, Diagnostics, ErrorKind, GenerateError, LayoutError};
pub use map::{LayoutMap, Placement, RegionUsage};
pub use region::{FrozenRegionTable, Region, RegionTable};
pub use section::{NoSizes, Section, SectionList, SectionSize, SizeProvider};

/// Machine word trait, used for addresses, alignment, and sizing
pub trait Word:
    UpperHex + LowerHex + Debug + Display + Hash + Ord + Default + Serialize + Copy + Send + Sync + 'static
{
    const ONE: Self;
    const MAX: Self;
    const BITS: u32;

    /// Widen without loss; all layout arithmetic happens at this width
    fn to_u128(self) -> u128;

    /// Narrow, `None` when `value` does not fit
    fn from_u128(value: u128) -> Option<Self>;
}

impl Word for u32 {
    const ONE: Self = 1;
    const MAX: Self = u32::MAX;
    const BITS: u32 = u32::BITS;

    fn to_u128(self) -> u128 {
        u128::from(self)
    }

    fn from_u128(value: u128) -> Option<Self> {
        u32::try_from(value).ok()
    }
}

impl Word for u64 {
    const ONE: Self = 1;
    const MAX: Self = u64::MAX;
    const BITS: u32 = u64::BITS;

    fn to_u128(self) -> u128 {
        u128::from(self)
    }

    fn from_u128(value: u128) -> Option<Self> {
        u64::try_from(value).ok()
    }
}

/// Commonly used FLASH region name
pub const FLASH: &str = "FLASH";

/// Commonly used RAM region name
pub const RAM: &str = "RAM";

/// An ID given to a region
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionID(String);

impl RegionID {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RegionID {
    fn from(name: &str) -> Self {
        RegionID(String::from(name))
    }
}

impl fmt::Display for RegionID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ID given to a section
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionID(String);

impl SectionID {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// LinkerScript is a buildable descriptor of memory regions and the
/// sections placed in them, including which sections are copied from
/// where they are stored to where they run.
#[derive(Debug, Default)]
pub struct LinkerScript<W: Word> {
    regions: RegionTable<W>,
    sections: SectionList<W>,
}

impl<W: Word> LinkerScript<W> {
    /// Create a new LinkerScript which can be mutated
    pub fn new() -> Self {
        LinkerScript {
            regions: RegionTable::new(),
            sections: SectionList::new(),
        }
    }

    /// Add a named memory region
    pub fn region(&mut self, name: &str, origin: W, size: W) -> Result<RegionID, LayoutError> {
        self.regions.define(name, origin, size)
    }

    /// Add a section, placed after every section already added to the
    /// same regions
    pub fn section(&mut self, section: Section<W>) -> Result<SectionID, LayoutError> {
        self.sections.append(section)
    }

    /// Fixed size boot configuration block, such as a flash configuration
    /// block or a key store. Boot ROMs read these at fixed offsets so they
    /// are always kept.
    pub fn boot_config(
        &mut self,
        size: W,
        name: &str,
        region: RegionID,
    ) -> Result<SectionID, LayoutError> {
        self.section(Section::new(name, region).fixed(size).retain())
    }

    /// Vector table, stored in `storage` and optionally copied to `run`,
    /// in which case VTOR must be pointed at the run address.
    pub fn vector_table(
        &mut self,
        storage: RegionID,
        run: Option<RegionID>,
    ) -> Result<SectionID, LayoutError> {
        let align = W::from_u128(0x80).unwrap_or(W::ONE);
        let mut section = Section::new("vector_table", storage).align(align).retain();
        if let Some(run) = run {
            section = section.run_from(run);
        }
        self.section(section)
    }

    /// Check the regions and compute every section's addresses
    pub fn resolve(self, sizes: &dyn SizeProvider) -> Result<LayoutMap<W>, Diagnostics> {
        let regions = self.regions.freeze()?;
        LayoutEngine::new(&regions, &self.sections)
            .sizes(sizes)
            .resolve()
    }

    /// Generate a linker script pinning every section at its resolved
    /// address.
    ///
    /// The function places a linker script file, called `link.x`, in
    /// the current working directory. A rejected layout leaves any existing
    /// `link.x` untouched.
    pub fn generate(self, sizes: &dyn SizeProvider) -> Result<(), GenerateError> {
        let map = self.resolve(sizes)?;
        let mut link_x = BufWriter::new(File::create("link.x")?);
        generate::link::render(&map, &mut link_x)?;
        link_x.flush()?;
        Ok(())
    }

    /// Write the linker script into the writer, `link_x`
    pub fn write<Wr: Write>(
        self,
        sizes: &dyn SizeProvider,
        link_x: &mut Wr,
    ) -> Result<(), GenerateError> {
        let map = self.resolve(sizes)?;
        generate::link::render(&map, link_x)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sizes() -> HashMap<String, u64> {
        let mut sizes = HashMap::new();
        sizes.insert(String::from("vector_table"), 0x1c0);
        sizes.insert(String::from("text"), 0x2400);
        sizes.insert(String::from("data"), 0x40);
        sizes.insert(String::from("bss"), 0x100);
        sizes
    }

    fn script() -> LinkerScript<u32> {
        let mut ls = LinkerScript::<u32>::new();
        let fcb = ls.region("FCB", 0x0800_0400, 0x200).unwrap();
        let flash = ls.region(FLASH, 0x0800_1000, 0x10_0000).unwrap();
        let ram = ls.region(RAM, 0x2008_0000, 0x18_0000).unwrap();
        ls.boot_config(0x200, "fcb", fcb).unwrap();
        ls.vector_table(flash.clone(), None).unwrap();
        ls.section(Section::new("text", flash.clone())).unwrap();
        ls.section(Section::new("data", flash).run_from(ram.clone()))
            .unwrap();
        ls.section(Section::new("bss", ram)).unwrap();
        ls
    }

    #[test]
    fn generate_ok() {
        let mut out = Vec::new();
        script().write(&sizes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\tFCB : ORIGIN = 0x8000400, LENGTH = 0x200"));
        assert!(text.contains("KEEP(*(.fcb .fcb.*))"));
        assert!(text.contains("__load_data = LOADADDR(.data);"));
    }

    #[test]
    fn resolve_places_split_data() {
        let map = script().resolve(&sizes()).unwrap();
        let data = map.get("data").unwrap();
        assert_eq!(data.load_address, 0x0800_35c0);
        assert_eq!(data.run_address, 0x2008_0000);
        assert_eq!(map.get("bss").unwrap().load_address, 0x2008_0040);
    }

    #[test]
    fn rejects_overlapping_regions_before_placement() {
        let mut ls = LinkerScript::<u32>::new();
        ls.region("A", 0x1000, 0x10).unwrap();
        let b = ls.region("B", 0x1008, 0x10).unwrap();
        // would also be missing content, but overlap aborts first
        ls.section(Section::new("text", b)).unwrap();
        match ls.resolve(&NoSizes) {
            Err(diags) => assert_eq!(
                diags.into_inner(),
                vec![LayoutError::RegionOverlap {
                    first: "A".into(),
                    second: "B".into()
                }]
            ),
            result => panic!("Expected region overlap, but got {:?}", result),
        }
    }

    #[test]
    fn write_reports_layout_failures() {
        let mut ls = LinkerScript::<u32>::new();
        let flash = ls.region(FLASH, 0x0, 512).unwrap();
        ls.section(Section::new("text", flash)).unwrap();
        match ls.write(&NoSizes, &mut Vec::new()) {
            Err(GenerateError::Layout(diags)) => {
                let kinds: Vec<ErrorKind> = diags.iter().map(LayoutError::kind).collect();
                assert_eq!(kinds, [ErrorKind::MissingContent]);
            }
            result => panic!("Expected missing content, but got {:?}", result),
        }
    }
}
