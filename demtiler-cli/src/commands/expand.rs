//! `demtiler expand`: covering boxes for an arbitrary area.

use std::io::Write;

use demtiler::{BoundingBox, Output, OutputConfig, ZoomRange};

use super::common::{parse_numbers, stdout, write_line, FormatArg};
use crate::error::CliError;

/// Prints one `RegionTile` per zoom in `[start, end)` as JSON Lines.
pub fn run(bbox: &str, zooms: &str, format: FormatArg) -> Result<(), CliError> {
    let [minx, miny, maxx, maxy] = parse_numbers::<f64, 4>("bbox", bbox)?;
    let [start, end] = parse_numbers::<u8, 2>("zooms", zooms)?;

    let bbox = BoundingBox::new(minx, miny, maxx, maxy)?;
    let zoom_range = ZoomRange::new(start, end)?;

    let config = OutputConfig::new(format.into());
    let output = Output::new(&config, &[]);

    let mut out = stdout();
    for region_tile in output.expand_tile(&bbox, zoom_range)? {
        write_line(&mut out, &region_tile)?;
    }
    out.flush()?;
    Ok(())
}
