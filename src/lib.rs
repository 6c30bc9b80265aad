use log::debug;
use serde::Serialize;
use wasm_bindgen::prelude::*;

pub mod aps;
pub mod bps;
pub mod checksum;
pub mod error;
pub mod format;
pub mod ips;
pub mod ppf;
pub mod progress;
pub mod star_rod;
pub mod stream;
pub mod ups;
pub mod vcdiff;
pub mod yay0;

pub use error::{PatchError, Result};
pub use format::PatchFormat;
pub use progress::{NoProgress, ProgressSink};

use progress::Progress;

/// Detects the format of `patch` and applies it to `source`, returning the
/// reconstructed target.
pub fn decode(source: &[u8], patch: &[u8], verify_checksums: bool) -> Result<Vec<u8>> {
    decode_with_progress(source, patch, verify_checksums, &mut NoProgress)
}

pub fn decode_with_progress(
    source: &[u8],
    patch: &[u8],
    verify_checksums: bool,
    sink: &mut dyn ProgressSink,
) -> Result<Vec<u8>> {
    let format = PatchFormat::try_from(patch)?;
    debug!(
        "{} patch, {:#x} byte(s) against {:#x} byte source",
        format.name(),
        patch.len(),
        source.len()
    );

    let target = format.apply(source, patch, verify_checksums, &mut Progress::new(sink))?;
    debug!("target is {:#x} byte(s)", target.len());
    Ok(target)
}

#[derive(Serialize)]
struct PatchInfo {
    format: PatchFormat,
    name: &'static str,
    has_checksums: bool,
}

#[wasm_bindgen]
pub fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
pub fn patch_rom(
    source: Vec<u8>,
    patch: Vec<u8>,
    ignore_checksums: bool,
) -> std::result::Result<Vec<u8>, String> {
    decode(&source, &patch, !ignore_checksums).map_err(|e| e.to_string())
}

#[wasm_bindgen]
pub fn patch_info(patch: &[u8]) -> std::result::Result<JsValue, JsValue> {
    let format = PatchFormat::try_from(patch).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let info = PatchInfo {
        format,
        name: format.name(),
        has_checksums: format.has_checksums(),
    };
    Ok(serde_wasm_bindgen::to_value(&info)?)
}
