/// Texture channel classification
pub mod texture;
/// Decal vs tiled material usage
pub mod tiling;

pub use texture::{
    KeywordMatch, TEXTURE_EXTENSIONS, TextureChannel, classify_texture_file, has_texture_extension,
    match_channel,
};
pub use tiling::{UsageTag, classify_usage, match_usage};
