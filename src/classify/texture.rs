//! Semantic texture channel classification from file and slot names.
//!
//! Names are lower-cased and split into tokens on `_`, `-`, `.` and
//! whitespace. Two passes run over [`CHANNEL_KEYWORDS`], which is ordered by
//! channel priority:
//!
//! 1. a token equal to a keyword
//! 2. a keyword of at least [`MIN_SUBSTRING_KEYWORD_LEN`] characters
//!    appearing anywhere in the name (catches `carbonnormal`, `paintdiffuse`)
//!
//! The first hit wins, so a name carrying keywords of several channels lands
//! on the highest priority one. Short tokens like `ao` or `col` only ever
//! match whole tokens; as substrings they would hit far too many words.

use std::fmt;

/// Bumped whenever [`CHANNEL_KEYWORDS`] changes meaning.
pub const KEYWORD_TABLE_VERSION: u32 = 1;

/// Keywords shorter than this are only matched as whole tokens.
pub const MIN_SUBSTRING_KEYWORD_LEN: usize = 4;

/// File extensions (lower case, with the dot) accepted as texture sources,
/// in preference order.
pub const TEXTURE_EXTENSIONS: &[&str] = &[
    ".swatchbin",
    ".png",
    ".jpg",
    ".jpeg",
    ".tga",
    ".dds",
    ".bmp",
    ".tif",
    ".tiff",
    ".exr",
    ".hdr",
];

/// Lower-cased extension of `name` including the dot, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    file.rfind('.')
        .filter(|i| *i > 0)
        .map(|i| file[i..].to_ascii_lowercase())
}

pub fn has_texture_extension(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| TEXTURE_EXTENSIONS.contains(&ext.as_str()))
}

/// Rank of an extension in [`TEXTURE_EXTENSIONS`]; non-texture extensions
/// sort last.
pub fn texture_extension_rank(name: &str) -> usize {
    extension_of(name)
        .and_then(|ext| TEXTURE_EXTENSIONS.iter().position(|e| *e == ext))
        .unwrap_or(TEXTURE_EXTENSIONS.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureChannel {
    BaseColor,
    Normal,
    Roughness,
    Metallic,
    AmbientOcclusion,
    Alpha,
    Emission,
    Specular,
    Mask,
    Unknown,
}

impl TextureChannel {
    /// Channels whose texels are data rather than colour.
    pub fn is_non_color(self) -> bool {
        !matches!(
            self,
            TextureChannel::BaseColor | TextureChannel::Emission | TextureChannel::Unknown
        )
    }

    /// Compact name used for generated image names, e.g. `BaseColor`.
    pub fn short_name(self) -> &'static str {
        match self {
            TextureChannel::BaseColor => "BaseColor",
            TextureChannel::Normal => "Normal",
            TextureChannel::Roughness => "Roughness",
            TextureChannel::Metallic => "Metallic",
            TextureChannel::AmbientOcclusion => "AO",
            TextureChannel::Alpha => "Alpha",
            TextureChannel::Emission => "Emission",
            TextureChannel::Specular => "Specular",
            TextureChannel::Mask => "Mask",
            TextureChannel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TextureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextureChannel::BaseColor => "base color",
            TextureChannel::Normal => "normal",
            TextureChannel::Roughness => "roughness",
            TextureChannel::Metallic => "metallic",
            TextureChannel::AmbientOcclusion => "ambient occlusion",
            TextureChannel::Alpha => "alpha",
            TextureChannel::Emission => "emission",
            TextureChannel::Specular => "specular",
            TextureChannel::Mask => "mask",
            TextureChannel::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Channel keyword table in priority order. Within a channel, longer and
/// more specific keywords come first.
pub const CHANNEL_KEYWORDS: &[(TextureChannel, &[&str])] = &[
    (
        TextureChannel::Normal,
        &["normalmap", "normal", "norm", "nrml", "nrm", "nor", "bump"],
    ),
    (
        TextureChannel::Roughness,
        &["roughness", "glossiness", "rough", "gloss", "glos", "rgh"],
    ),
    (
        TextureChannel::Metallic,
        &["metalness", "metallic", "metal", "met"],
    ),
    (
        TextureChannel::AmbientOcclusion,
        &["occlusion", "ambient", "icao", "lcao", "cao", "ao"],
    ),
    (
        TextureChannel::Alpha,
        &["transparency", "opacity", "alpha", "opac"],
    ),
    (
        TextureChannel::Emission,
        &["emissive", "emission", "emis", "emit", "glow", "emm"],
    ),
    (
        TextureChannel::Specular,
        &["reflectiontint", "reflection", "specular", "spec"],
    ),
    (TextureChannel::Mask, &["mask"]),
    (
        TextureChannel::BaseColor,
        &[
            "basecolor", "albedo", "diffuse", "diff", "base", "color", "colour", "col",
        ],
    ),
];

/// A classification together with the keyword that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordMatch {
    pub channel: TextureChannel,
    pub keyword: &'static str,
}

impl KeywordMatch {
    /// Longer keywords are more specific.
    pub fn specificity(&self) -> usize {
        self.keyword.len()
    }
}

fn tokens(name: &str) -> Vec<&str> {
    name.split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Strip a trailing file extension, if it looks like one.
fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 9 && !ext.contains(['/', '\\']) => {
            stem
        }
        _ => name,
    }
}

/// Classify a name (file name or parameter name) and report the keyword hit.
pub fn match_channel(name: &str) -> Option<KeywordMatch> {
    let lowered = strip_extension(name).to_lowercase();
    let tokens = tokens(&lowered);

    for (channel, keywords) in CHANNEL_KEYWORDS {
        if let Some(keyword) = keywords.iter().copied().find(|kw| tokens.contains(kw)) {
            return Some(KeywordMatch {
                channel: *channel,
                keyword,
            });
        }
    }

    for (channel, keywords) in CHANNEL_KEYWORDS {
        if let Some(keyword) = keywords
            .iter()
            .copied()
            .filter(|kw| kw.len() >= MIN_SUBSTRING_KEYWORD_LEN)
            .find(|kw| lowered.contains(*kw))
        {
            return Some(KeywordMatch {
                channel: *channel,
                keyword,
            });
        }
    }

    None
}

/// Classify a texture file name (no directory). Unmatched names are
/// [`TextureChannel::Unknown`].
pub fn classify_texture_file(file_name: &str) -> TextureChannel {
    match_channel(file_name)
        .map(|m| m.channel)
        .unwrap_or(TextureChannel::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_examples() {
        assert_eq!(classify_texture_file("carbon_nrml_01.png"), TextureChannel::Normal);
        assert_eq!(classify_texture_file("base_diff.jpg"), TextureChannel::BaseColor);
        assert_eq!(
            classify_texture_file("panel_icao.tga"),
            TextureChannel::AmbientOcclusion
        );
        assert_eq!(classify_texture_file("unlabeled.png"), TextureChannel::Unknown);
    }

    #[test]
    fn higher_priority_channel_wins() {
        // ao outranks the base colour token
        assert_eq!(
            classify_texture_file("paint_diff_ao.png"),
            TextureChannel::AmbientOcclusion
        );
        assert_eq!(classify_texture_file("body_col_nrm.dds"), TextureChannel::Normal);
        assert_eq!(
            classify_texture_file("seat_rough_metal.png"),
            TextureChannel::Roughness
        );
    }

    #[test]
    fn substring_match_needs_long_keyword() {
        assert_eq!(
            classify_texture_file("carbonnormal.png"),
            TextureChannel::Normal
        );
        // "ao" inside a word is not a token
        assert_eq!(classify_texture_file("chaos.png"), TextureChannel::Unknown);
    }

    #[test]
    fn reports_matched_keyword() {
        let hit = match_channel("diffuse_map").unwrap();
        assert_eq!(hit.channel, TextureChannel::BaseColor);
        assert_eq!(hit.keyword, "diffuse");
        assert_eq!(hit.specificity(), 7);
    }

    #[test]
    fn forza_suffixes() {
        assert_eq!(classify_texture_file("grille_opac.png"), TextureChannel::Alpha);
        assert_eq!(classify_texture_file("light_emis.png"), TextureChannel::Emission);
        assert_eq!(classify_texture_file("tyre_glos.png"), TextureChannel::Roughness);
        assert_eq!(classify_texture_file("body_mask.png"), TextureChannel::Mask);
    }

    #[test]
    fn texture_extensions() {
        assert!(has_texture_extension("Game:\\Media\\Cars\\body.SWATCHBIN"));
        assert!(has_texture_extension("a/b/c.tga"));
        assert!(!has_texture_extension("paint.materialbin"));
        assert!(!has_texture_extension(".png"));
        assert!(texture_extension_rank("x.swatchbin") < texture_extension_rank("x.png"));
        assert_eq!(texture_extension_rank("x.txt"), TEXTURE_EXTENSIONS.len());
    }

    #[test]
    fn non_color_channels() {
        assert!(TextureChannel::Normal.is_non_color());
        assert!(TextureChannel::AmbientOcclusion.is_non_color());
        assert!(!TextureChannel::BaseColor.is_non_color());
        assert!(!TextureChannel::Emission.is_non_color());
    }
}
