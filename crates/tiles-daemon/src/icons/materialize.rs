//! Turning arbitrary bytes into a stored 128×128 PNG icon.

use anyhow::Context;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tiles_proto::platform;
use tracing::debug;

pub const ICON_SIZE: u32 = 128;

const DEFAULT_ICON_COLOR: Rgba<u8> = Rgba([230, 230, 230, 255]);

/// What ends up on disk: either a normalized image or the caller's bytes as-is.
pub enum IconPayload {
    Decoded(RgbaImage),
    Raw(Vec<u8>),
}

impl IconPayload {
    /// Decode and normalize to RGBA 128×128. Anything `image` can't read is
    /// kept raw.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match image::load_from_memory(bytes) {
            Ok(img) => {
                let rgba = img.to_rgba8();
                Self::Decoded(imageops::resize(&rgba, ICON_SIZE, ICON_SIZE, FilterType::Lanczos3))
            }
            Err(e) => {
                debug!("Icon bytes not decodable ({}), storing raw", e);
                Self::Raw(bytes.to_vec())
            }
        }
    }

    /// File contents for this payload. A PNG encode failure yields `fallback`.
    fn into_file_bytes(self, fallback: &[u8]) -> Vec<u8> {
        match self {
            Self::Decoded(img) => {
                let mut buf = Cursor::new(Vec::new());
                match img.write_to(&mut buf, ImageFormat::Png) {
                    Ok(()) => buf.into_inner(),
                    Err(e) => {
                        debug!("PNG encode failed ({}), storing raw", e);
                        fallback.to_vec()
                    }
                }
            }
            Self::Raw(bytes) => bytes,
        }
    }
}

/// The flat directory holding every icon file.
#[derive(Debug, Clone)]
pub struct IconDir {
    dir: PathBuf,
}

impl IconDir {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Store `bytes` as `filename` and return its public path. Only a failed
    /// write is an error; undecodable input is written unchanged.
    pub fn materialize(&self, bytes: &[u8], filename: &str) -> anyhow::Result<String> {
        // Never let a caller-supplied name escape the icon directory
        let filename = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .context("icon filename is empty")?;

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create icon dir {:?}", self.dir))?;

        let path = self.dir.join(filename);
        let contents = IconPayload::from_bytes(bytes).into_file_bytes(bytes);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write icon {:?}", path))?;

        Ok(platform::icon_public_path(filename))
    }

    /// [`IconDir::materialize`] on the blocking pool.
    pub async fn store(&self, bytes: Vec<u8>, filename: String) -> anyhow::Result<String> {
        let icons = self.clone();
        tokio::task::spawn_blocking(move || icons.materialize(&bytes, &filename)).await?
    }

    /// Write the plain grey default icon unless one already exists.
    pub fn ensure_default(&self) -> anyhow::Result<()> {
        let path = self.dir.join(platform::DEFAULT_ICON_FILE);
        if path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        RgbaImage::from_pixel(ICON_SIZE, ICON_SIZE, DEFAULT_ICON_COLOR)
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("Failed to write default icon {:?}", path))?;
        Ok(())
    }
}

/// PNG-encoded solid square, for tests.
#[cfg(test)]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}
