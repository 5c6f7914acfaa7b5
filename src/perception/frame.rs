//! Camera frame loading: decode any supported image and re-encode it as PNG
//! so the VLM always receives `data:image/png;base64,...`.
use std::path::Path;

use crate::errors::{NavError, NavResult};

#[derive(Debug)]
pub struct Frame {
    /// PNG bytes of the frame.
    pub image_bytes: Vec<u8>,
    /// Base64-encoded PNG.
    pub image_base64: String,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.image_base64)
    }
}

/// Load the image at `path` and normalise it to PNG.
pub fn load_frame(path: &Path) -> NavResult<Frame> {
    let img = image::open(path)
        .map_err(|e| NavError::Perception(format!("load {}: {e}", path.display())))?;
    let (width, height) = (img.width(), img.height());

    let mut png_bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut png_bytes),
        image::ImageFormat::Png,
    )
    .map_err(|e| NavError::Perception(format!("PNG encode: {e}")))?;

    let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &png_bytes);

    tracing::debug!(
        path = %path.display(),
        width,
        height,
        png_len = png_bytes.len(),
        "frame encoded"
    );

    Ok(Frame {
        image_bytes: png_bytes,
        image_base64: b64,
        width,
        height,
    })
}

/// The state key for a frame: its file name without directories.
pub fn frame_key(path: &Path) -> NavResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| NavError::Perception(format!("{} has no file name", path.display())))
}
