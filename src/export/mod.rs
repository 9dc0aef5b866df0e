#[cfg(feature = "json")]
pub mod manifest;
#[cfg(feature = "textures")]
pub mod texture;
