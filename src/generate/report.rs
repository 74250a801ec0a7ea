use crate::{LayoutMap, Word};
use std::io::{Error, Write};

/// Write a human readable summary of a resolved layout: one line per
/// section followed by per region usage.
pub fn render<W: Word, Wr: Write>(map: &LayoutMap<W>, out: &mut Wr) -> Result<(), Error> {
    let width = map
        .iter()
        .map(|placement| placement.name.len())
        .chain(map.usage().iter().map(|usage| usage.name.len()))
        .max()
        .unwrap_or(0);
    let digits = (W::BITS / 4) as usize + 2;

    writeln!(
        out,
        "{:<width$}  {:>digits$}  {:>digits$}  {:>digits$}  placement",
        "section", "load", "run", "size",
    )?;
    for placement in map {
        let location = match &placement.run_region {
            Some(run) => format!("{} -> {}", placement.storage_region, run),
            None => placement.storage_region.clone(),
        };
        writeln!(
            out,
            "{:<width$}  {:>#digits$x}  {:>#digits$x}  {:>#digits$x}  {}",
            placement.name,
            placement.load_address,
            placement.run_address,
            placement.size,
            location,
        )?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "{:<width$}  {:>digits$}  {:>digits$}  {:>digits$}",
        "region", "origin", "used", "free",
    )?;
    for usage in map.usage() {
        writeln!(
            out,
            "{:<width$}  {:>#digits$x}  {:>#digits$x}  {:>#digits$x}",
            usage.name, usage.origin, usage.used, usage.free,
        )?;
    }

    if !map.discarded().is_empty() {
        writeln!(out)?;
        writeln!(out, "discarded: {}", map.discarded().join(", "))?;
    }
    Ok(())
}
