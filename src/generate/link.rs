use crate::{LayoutMap, Placement, RegionUsage, Word};
use std::io::{Error, Write};

/// render one output section pinned at its resolved address
fn render_section<W: Word, Wr: Write>(
    out: &mut Wr,
    placement: &Placement<W>,
) -> Result<(), Error> {
    let name = &placement.name;
    if placement.is_split() {
        writeln!(
            out,
            "\t.{} {:#X} : AT({:#X})",
            name, placement.run_address, placement.load_address
        )?;
    } else {
        writeln!(out, "\t.{} {:#X} :", name, placement.load_address)?;
    }
    writeln!(out, "\t{{")?;
    writeln!(out, "\t\t__start_{} = .;", name)?;
    if placement.retained {
        writeln!(out, "\t\tKEEP(*(.{} .{}.*));", name, name)?;
    } else {
        writeln!(out, "\t\t*(.{} .{}.*);", name, name)?;
    }
    writeln!(out, "\t\t. = __start_{} + {:#X};", name, placement.size)?;
    writeln!(out, "\t\t__end_{} = .;", name)?;
    match &placement.run_region {
        Some(run) => {
            // the load address is pinned by `AT(..)`; ld rejects a second `AT>`
            writeln!(out, "\t}} > {}", run)?;
            writeln!(out, "\t__load_{} = LOADADDR(.{});", name, name)?;
        }
        None => writeln!(out, "\t}} > {}", placement.storage_region)?,
    }
    writeln!(out)?;
    Ok(())
}

/// render the origin, size and consumed bytes of a region as symbols
fn render_region_symbols<W: Word, Wr: Write>(
    out: &mut Wr,
    usage: &RegionUsage<W>,
) -> Result<(), Error> {
    writeln!(out, "\t__{}_origin = {:#X};", usage.name, usage.origin)?;
    writeln!(out, "\t__{}_size = {:#X};", usage.name, usage.length)?;
    writeln!(out, "\t__{}_used = {:#X};", usage.name, usage.used)?;
    Ok(())
}

/// Generate a linker script from a resolved LayoutMap
///
/// Regions and sections are written in declaration order so the same map
/// always renders to the same bytes.
pub fn render<W: Word, Wr: Write>(map: &LayoutMap<W>, out: &mut Wr) -> Result<(), Error> {
    writeln!(out, "/* Generated by imxrt-rt-layout, do not edit */")?;
    writeln!(out)?;

    writeln!(out, "MEMORY {{")?;
    for region in map.usage() {
        writeln!(
            out,
            "\t{} : ORIGIN = {:#X}, LENGTH = {:#X}",
            region.name, region.origin, region.length
        )?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "SECTIONS {{")?;
    for region in map.usage() {
        render_region_symbols(out, region)?;
    }
    writeln!(out)?;
    for placement in map {
        render_section(out, placement)?;
    }
    writeln!(out, "}}")?;

    Ok(())
}
