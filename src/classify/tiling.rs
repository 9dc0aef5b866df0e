//! Decal vs tiled usage guess from a material name.
//!
//! The game data has no explicit "this is a decal" flag, so this is a
//! keyword heuristic. Decal keywords are checked first and short-circuit;
//! tiled keywords come second; anything else is treated as a decal so an
//! unrecognized material never gets a repeating UV remap.

use std::fmt;

/// Bumped whenever [`USAGE_KEYWORDS`] changes meaning.
pub const KEYWORD_TABLE_VERSION: u32 = 1;

/// UV scale requested for tiled materials.
pub const DEFAULT_TILING_SCALE: [f32; 2] = [4.0, 4.0];

/// Name of the custom property the usage tag is persisted under.
pub const USAGE_PROPERTY: &str = "forza_usage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UsageTag {
    Decal,
    Tiled,
}

impl UsageTag {
    pub fn as_str(self) -> &'static str {
        match self {
            UsageTag::Decal => "DECAL",
            UsageTag::Tiled => "TILED",
        }
    }

    /// UV scale to apply, if this usage wants a remap.
    pub fn tiling_scale(self) -> Option<[f32; 2]> {
        match self {
            UsageTag::Decal => None,
            UsageTag::Tiled => Some(DEFAULT_TILING_SCALE),
        }
    }
}

impl fmt::Display for UsageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword sets in evaluation order.
pub const USAGE_KEYWORDS: &[(UsageTag, &[&str])] = &[
    (
        UsageTag::Decal,
        &[
            "decal", "badge", "emblem", "logo", "symbol", "icon", "gauge", "speedo", "tacho",
            "needle", "number", "num_", "plate", "license", "licence", "sticker", "label",
            "font", "letter", "digit", "hud", "screen", "display", "v8biturbo", "v8_biturbo",
        ],
    ),
    (
        UsageTag::Tiled,
        &[
            "carbon", "cfibre", "cf_", "ptn_", "ptn", "pattern", "grid", "checker", "chequer",
            "stripe", "zigzag", "zig_zag", "noise", "grain", "cloth", "fabric", "leather",
            "alcantara", "suede", "carpet", "brushed", "machined", "ridges", "scratch",
            "plastic", "rubber", "textured", "dtl_", "detail", "tiling", "tiled",
        ],
    ),
];

/// The usage tag together with the keyword that decided it (`None` when the
/// default applied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageMatch {
    pub usage: UsageTag,
    pub keyword: Option<&'static str>,
}

pub fn match_usage(material_name: &str) -> UsageMatch {
    let lowered = material_name.to_lowercase();
    for (usage, keywords) in USAGE_KEYWORDS {
        if let Some(keyword) = keywords.iter().copied().find(|kw| lowered.contains(*kw)) {
            return UsageMatch {
                usage: *usage,
                keyword: Some(keyword),
            };
        }
    }
    UsageMatch {
        usage: UsageTag::Decal,
        keyword: None,
    }
}

pub fn classify_usage(material_name: &str) -> UsageTag {
    match_usage(material_name).usage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_examples() {
        assert_eq!(classify_usage("carbonfiber_001"), UsageTag::Tiled);
        assert_eq!(classify_usage("badge_chrome_01"), UsageTag::Decal);
        assert_eq!(classify_usage("mystery_material"), UsageTag::Decal);
    }

    #[test]
    fn decal_keywords_short_circuit() {
        // both sets match; decal wins
        let hit = match_usage("carbon_logo");
        assert_eq!(hit.usage, UsageTag::Decal);
        assert_eq!(hit.keyword, Some("logo"));
    }

    #[test]
    fn default_has_no_keyword() {
        assert_eq!(match_usage("body_paint").keyword, None);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(classify_usage("Interior_PTN_Hex"), UsageTag::Tiled);
        assert_eq!(classify_usage("RUBBER_trim"), UsageTag::Tiled);
    }

    #[test]
    fn tiled_requests_remap() {
        assert_eq!(UsageTag::Tiled.tiling_scale(), Some([4.0, 4.0]));
        assert_eq!(UsageTag::Decal.tiling_scale(), None);
        assert_eq!(UsageTag::Tiled.to_string(), "TILED");
    }
}
