//! `demtiler tiles` and `demtiler downloads`: emit job descriptors.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use demtiler::JobDescriptor;
use tracing::info;

use super::common::{format_selected, http_client, load_config, stdout, write_line, FormatArg};
use crate::error::CliError;

/// Prints a render descriptor for every tile of every selected output.
pub fn run_tiles(config_path: Option<&Path>, format: Option<FormatArg>) -> Result<(), CliError> {
    let config = load_config(config_path, http_client()?)?;
    let mut out = stdout();
    let mut count = 0usize;

    for output in config.outputs().filter(|o| format_selected(format, o.format())) {
        for tile in output.generate_tiles() {
            write_line(&mut out, &tile.freeze_dry())?;
            count += 1;
        }
    }

    out.flush()?;
    info!(tiles = count, "Listed tile jobs");
    Ok(())
}

/// Prints a fetch descriptor for every source file any selected tile needs,
/// each file once.
pub fn run_downloads(
    config_path: Option<&Path>,
    format: Option<FormatArg>,
) -> Result<(), CliError> {
    let config = load_config(config_path, http_client()?)?;
    config.sources.get_index()?;

    let mut out = stdout();
    let mut seen: HashSet<JobDescriptor> = HashSet::new();

    for output in config.outputs().filter(|o| format_selected(format, o.format())) {
        for tile in output.generate_tiles() {
            for file in config.sources.downloads_for(&tile.region_tile())? {
                let descriptor = file.freeze_dry();
                if seen.insert(descriptor.clone()) {
                    write_line(&mut out, &descriptor)?;
                }
            }
        }
    }

    out.flush()?;
    info!(files = seen.len(), "Listed download jobs");
    Ok(())
}
