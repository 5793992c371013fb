//! Small offline commands

use anyhow::{Context, Result};
use quickchat_core::backend::{FileFlagStore, FlagStore};
use quickchat_core::config::ClientConfig;
use quickchat_core::image_codec::{encode_profile_image, ProfileImage};
use std::path::Path;

/// Validated configuration as TOML
pub fn render_config(config: &ClientConfig) -> Result<String> {
    config.validate()?;
    Ok(config.to_toml()?)
}

/// Value of the durable "signed in" flag
pub fn signed_in(config: &ClientConfig) -> Result<bool> {
    let store = FileFlagStore::open(config.storage.flags_path())?;
    Ok(store.get_flag(&config.auth.signed_in_flag))
}

/// Base64 JPEG of the image at `path`
pub fn encode_image_file(path: &Path, quality: u8) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let image = ProfileImage::from_bytes(&bytes)?;
    Ok(encode_profile_image(&image, quality)?)
}
