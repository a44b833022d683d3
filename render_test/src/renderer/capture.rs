/// Screenshot and buffer dump output shared by all backends

use std::fmt::Write as _;
use std::path::Path;
use crate::error::Result;
use crate::renderer::binding_state::BindingState;

/// Write tightly packed RGBA8 pixels as a lossless PNG
pub fn write_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        crate::render_bail!(
            "render_test::capture",
            Capture,
            "pixel data is {} bytes, expected {} for {}x{} RGBA8",
            rgba.len(),
            expected,
            width,
            height
        );
    }
    let image = match image::RgbaImage::from_raw(width, height, rgba.to_vec()) {
        Some(image) => image,
        None => crate::render_bail!("render_test::capture", Capture, "could not wrap {}x{} pixels", width, height),
    };
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| crate::render_fail!("render_test::capture", Capture, "{}: {}", path.display(), e))?;
    crate::render_debug!("render_test::capture", "screenshot written to {}", path.display());
    Ok(())
}

/// Format buffers as one uppercase hex 32-bit word per line
///
/// Words are little-endian; a trailing partial word is zero-padded.
pub fn format_buffer_dump<B: AsRef<[u8]>>(buffers: &[B]) -> String {
    let mut out = String::new();
    for buffer in buffers {
        for chunk in buffer.as_ref().chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            // Writing to a String cannot fail
            let _ = writeln!(out, "{:X}", u32::from_le_bytes(word));
        }
    }
    out
}

/// Read every buffer of a binding state back and write the dump to `path`
///
/// Resources are visited in slot order. The caller must have waited for the device to
/// finish writing them.
pub fn serialize_binding_state(state: &dyn BindingState, path: &Path) -> Result<()> {
    let mut contents = Vec::with_capacity(state.resources().len());
    for resource in state.resources() {
        let bytes = resource.buffer.read_contents().map_err(|e| {
            crate::render_fail!(
                "render_test::capture",
                Capture,
                "reading binding {}: {}",
                resource.binding,
                e
            )
        })?;
        contents.push(bytes);
    }
    std::fs::write(path, format_buffer_dump(&contents))
        .map_err(|e| crate::render_fail!("render_test::capture", Capture, "{}: {}", path.display(), e))?;
    crate::render_debug!(
        "render_test::capture",
        "{} buffers serialized to {}",
        contents.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
