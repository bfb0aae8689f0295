//! Region images on disk: one little-endian `.bin` file per region.

use std::fs;
use std::io;
use std::path::Path;

use nef_core::RegionImage;

const SYSTEM: &str = "system.bin";
const BIAS: &str = "bias.bin";
const ENCODERS: &str = "encoders.bin";
const DECODERS: &str = "decoders.bin";
const KEYS: &str = "keys.bin";
const INPUT_FILTERS: &str = "input_filters.bin";
const INPUT_ROUTES: &str = "input_routes.bin";
const INHIBITORY_GAINS: &str = "inhibitory_gains.bin";
const INHIBITION_FILTERS: &str = "inhibition_filters.bin";
const INHIBITION_ROUTES: &str = "inhibition_routes.bin";
const MODULATORY_FILTERS: &str = "modulatory_filters.bin";
const MODULATORY_ROUTES: &str = "modulatory_routes.bin";
const PES: &str = "pes.bin";

pub fn write_image(dir: &Path, image: &RegionImage) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let required: [(&str, &[u8]); 10] = [
        (SYSTEM, &image.system),
        (BIAS, &image.bias),
        (ENCODERS, &image.encoders),
        (DECODERS, &image.decoders),
        (KEYS, &image.keys),
        (INPUT_FILTERS, &image.input_filters),
        (INPUT_ROUTES, &image.input_routes),
        (INHIBITORY_GAINS, &image.inhibitory_gains),
        (INHIBITION_FILTERS, &image.inhibition_filters),
        (INHIBITION_ROUTES, &image.inhibition_routes),
    ];
    for (name, bytes) in required {
        fs::write(dir.join(name), bytes)?;
    }

    let optional = [
        (MODULATORY_FILTERS, &image.modulatory_filters),
        (MODULATORY_ROUTES, &image.modulatory_routes),
        (PES, &image.pes),
    ];
    for (name, bytes) in optional {
        let path = dir.join(name);
        match bytes {
            Some(bytes) => fs::write(path, bytes)?,
            None if path.exists() => fs::remove_file(path)?,
            None => {}
        }
    }
    Ok(())
}

fn read_optional(dir: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
    match fs::read(dir.join(name)) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn read_image(dir: &Path) -> io::Result<RegionImage> {
    let read = |name: &str| fs::read(dir.join(name));
    Ok(RegionImage {
        system: read(SYSTEM)?,
        bias: read(BIAS)?,
        encoders: read(ENCODERS)?,
        decoders: read(DECODERS)?,
        keys: read(KEYS)?,
        input_filters: read(INPUT_FILTERS)?,
        input_routes: read(INPUT_ROUTES)?,
        inhibitory_gains: read_optional(dir, INHIBITORY_GAINS)?.unwrap_or_default(),
        inhibition_filters: read_optional(dir, INHIBITION_FILTERS)?.unwrap_or_default(),
        inhibition_routes: read_optional(dir, INHIBITION_ROUTES)?.unwrap_or_default(),
        modulatory_filters: read_optional(dir, MODULATORY_FILTERS)?,
        modulatory_routes: read_optional(dir, MODULATORY_ROUTES)?,
        pes: read_optional(dir, PES)?,
    })
}
