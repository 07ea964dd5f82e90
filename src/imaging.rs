//! Image resizing into fixed web presets.
//!
//! An uploaded image is resized to each requested preset with a Lanczos
//! filter and written as `<slug>_<w>x<h>.webp` into the output directory.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use miette::Diagnostic;
use thiserror::Error;

/// Errors from the image processor.
#[derive(Debug, Error, Diagnostic)]
pub enum ImageError {
    #[error("unsupported image file: \"{filename}\"")]
    #[diagnostic(
        code(libris::image::unsupported),
        help("Upload a jpg, jpeg, png or webp image.")
    )]
    Unsupported { filename: String },

    #[error("unknown image size: \"{size}\"")]
    #[diagnostic(
        code(libris::image::unknown_size),
        help("Sizes are written WIDTHxHEIGHT and must be one of the listed presets.")
    )]
    UnknownSize { size: String },

    #[error("no image sizes selected")]
    #[diagnostic(
        code(libris::image::no_sizes),
        help("Please select at least one size.")
    )]
    NoSizes,

    #[error("image title is empty")]
    #[diagnostic(
        code(libris::image::empty_title),
        help("The title names the output files and must contain a letter or digit.")
    )]
    EmptyTitle,

    #[error("failed to decode image: {message}")]
    #[diagnostic(
        code(libris::image::decode),
        help("The upload is not a readable image, or it is truncated.")
    )]
    Decode { message: String },

    #[error("failed to save image to {path}: {message}")]
    #[diagnostic(
        code(libris::image::save),
        help("Check that the image output directory exists and is writable.")
    )]
    Save { path: String, message: String },
}

pub type ImageResult<T> = std::result::Result<T, ImageError>;

/// Image extensions accepted for processing.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Every selectable output size with its display label.
pub const SIZE_PRESETS: &[(&str, &str)] = &[
    ("3840x2160", "16:9 (3840x2160)"),
    ("3200x1800", "16:9 (3200x1800)"),
    ("2560x1440", "16:9 (2560x1440)"),
    ("1920x1080", "16:9 (1920x1080)"),
    ("1280x720", "16:9 (1280x720)"),
    ("960x540", "16:9 (960x540)"),
    ("640x360", "16:9 (640x360)"),
    ("480x270", "16:9 (480x270)"),
    ("320x180", "16:9 (320x180)"),
    ("160x90", "16:9 (160x90)"),
    ("80x45", "16:9 (80x45)"),
    ("2048x2048", "1:1 (2048x2048)"),
    ("1024x1024", "1:1 (1024x1024)"),
    ("512x512", "1:1 (512x512)"),
    ("256x256", "1:1 (256x256)"),
    ("128x128", "1:1 (128x128)"),
    ("64x64", "1:1 (64x64)"),
    ("32x32", "1:1 (32x32)"),
    ("2048x3072", "2:3 (2048x3072)"),
    ("1024x1536", "2:3 (1024x1536)"),
    ("512x768", "2:3 (512x768)"),
    ("256x384", "2:3 (256x384)"),
    ("128x192", "2:3 (128x192)"),
    ("64x96", "2:3 (64x96)"),
    ("32x48", "2:3 (32x48)"),
    ("3072x2048", "3:2 (3072x2048)"),
    ("1536x1024", "3:2 (1536x1024)"),
    ("768x512", "3:2 (768x512)"),
    ("384x256", "3:2 (384x256)"),
    ("192x128", "3:2 (192x128)"),
    ("96x64", "3:2 (96x64)"),
    ("48x32", "3:2 (48x32)"),
    ("1600x2000", "4:5 (1600x2000)"),
    ("1280x1600", "4:5 (1280x1600)"),
    ("1024x1280", "4:5 (1024x1280)"),
    ("800x1000", "4:5 (800x1000)"),
    ("640x800", "4:5 (640x800)"),
    ("512x640", "4:5 (512x640)"),
    ("256x320", "4:5 (256x320)"),
    ("128x160", "4:5 (128x160)"),
    ("2560x2048", "5:4 (2560x2048)"),
    ("1280x1024", "5:4 (1280x1024)"),
    ("640x512", "5:4 (640x512)"),
    ("320x256", "5:4 (320x256)"),
    ("160x128", "5:4 (160x128)"),
    ("80x64", "5:4 (80x64)"),
    ("40x32", "5:4 (40x32)"),
    ("2880x5120", "9:16 (2880x5120)"),
    ("2160x3840", "9:16 (2160x3840)"),
    ("1440x2560", "9:16 (1440x2560)"),
    ("720x1280", "9:16 (720x1280)"),
    ("360x640", "9:16 (360x640)"),
    ("180x320", "9:16 (180x320)"),
    ("90x160", "9:16 (90x160)"),
    ("45x80", "9:16 (45x80)"),
    ("1920x1080", "Background Image (1920x1080)"),
    ("1280x720", "Hero Image (1280x720)"),
    ("250x250", "Website Banner (250x250)"),
    ("1200x630", "Blog Image (1200x630)"),
    ("250x100", "Logo Rectangle (250x100)"),
    ("100x100", "Logo Square (100x100)"),
    ("16x16", "Favicon (16x16)"),
    ("32x32", "Social Media Icons (32x32)"),
    ("1600x500", "Lightbox Images (1600x500)"),
    ("150x150", "Thumbnail Image (150x150)"),
];

/// An output size drawn from [`SIZE_PRESETS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = ImageError;

    fn from_str(s: &str) -> ImageResult<Self> {
        let s = s.trim();
        let unknown = || ImageError::UnknownSize { size: s.to_string() };
        if !SIZE_PRESETS.iter().any(|(preset, _)| *preset == s) {
            return Err(unknown());
        }
        let (w, h) = s.split_once('x').ok_or_else(unknown)?;
        Ok(Self {
            width: w.parse().map_err(|_| unknown())?,
            height: h.parse().map_err(|_| unknown())?,
        })
    }
}

/// Parse a list of preset strings, rejecting an empty selection.
pub fn parse_sizes<S: AsRef<str>>(sizes: &[S]) -> ImageResult<Vec<ImageSize>> {
    if sizes.is_empty() {
        return Err(ImageError::NoSizes);
    }
    sizes.iter().map(|s| s.as_ref().parse()).collect()
}

/// Whether `filename` carries an accepted image extension.
pub fn is_allowed_image(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Lowercase, ASCII-alphanumeric words joined by `-`.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Output filename for one rendition.
pub fn output_filename(slug: &str, size: ImageSize) -> String {
    format!("{slug}_{size}.webp")
}

/// Resize `data` to every size and save each as WebP under `output_dir`.
///
/// Returns one human-readable line per saved file.
pub fn process_image(
    data: &[u8],
    sizes: &[ImageSize],
    title: &str,
    output_dir: &Path,
) -> ImageResult<Vec<String>> {
    if sizes.is_empty() {
        return Err(ImageError::NoSizes);
    }
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(ImageError::EmptyTitle);
    }

    let source = image::load_from_memory(data).map_err(|e| ImageError::Decode {
        message: e.to_string(),
    })?;
    std::fs::create_dir_all(output_dir).map_err(|e| ImageError::Save {
        path: output_dir.display().to_string(),
        message: e.to_string(),
    })?;

    let mut results = Vec::with_capacity(sizes.len());
    for &size in sizes {
        let filename = output_filename(&slug, size);
        let path = output_dir.join(&filename);
        save_rendition(&source, size, &path)?;
        tracing::info!(file = %filename, %size, "saved image rendition");
        results.push(format!("Saved {filename} to {}", path.display()));
    }
    Ok(results)
}

fn save_rendition(source: &DynamicImage, size: ImageSize, path: &Path) -> ImageResult<()> {
    let resized = source.resize_exact(size.width, size.height, FilterType::Lanczos3);
    DynamicImage::ImageRgba8(resized.to_rgba8())
        .save_with_format(path, ImageFormat::WebP)
        .map_err(|e| ImageError::Save {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}
