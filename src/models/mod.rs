/// Material instances (`.materialbin` and embedded `MatI` blobs)
pub mod materialbin;
/// Mesh containers (`.modelbin`)
pub mod modelbin;
/// Texture containers (`.swatchbin`)
pub mod swatchbin;
/// Vertex layouts and attribute formats
pub mod vertex_format;
