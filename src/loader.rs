use std::path::Path;

use image::RgbImage;

use crate::error::{DiagnosisError, Result};

/// Reads an image file and decodes it to RGB.
///
/// A path that is absent, or is not a regular file, is reported as
/// [`DiagnosisError::MissingImage`]; anything the decoder rejects becomes
/// [`DiagnosisError::DecodeFailure`].
pub fn load(path: &Path) -> Result<RgbImage> {
    if !path.is_file() {
        return Err(DiagnosisError::MissingImage {
            path: path.to_path_buf(),
        });
    }
    let image = image::open(path).map_err(|source| DiagnosisError::DecodeFailure {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!(
        "Decoded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image.to_rgb8())
}
