//! Material instances: embedded `MatI` blobs and standalone `.materialbin`
//! files.
//!
//! Both are bundles holding an optional parent reference (`MATI`/`MATL`) and
//! a shader parameter table (`MTPR`/`DFPR`). Parameters are keyed by a 32-bit
//! name hash; the few hashes the importer cares about get readable names.

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::classify::texture::{KeywordMatch, TextureChannel, has_texture_extension, match_channel};
use crate::data::Version;
use crate::data::bundle::{Blob, BlobTag, Bundle};
use crate::data::stream::BinaryStream;
use crate::error::{DecodeError, DecodeResult};

pub const DIFFUSE_MAP_HASH: u32 = 0x6DD9_8CD9;
pub const DIFFUSE_COLOR_HASH: u32 = 0xEF5C_CE09;
pub const NORMAL_MAP_HASH: u32 = 0x8C65_8791;

/// Name used for a material instance without `Name` metadata.
pub const DEFAULT_MATERIAL_NAME: &str = "Material";

/// Readable name for a parameter hash.
pub fn parameter_name(hash: u32) -> String {
    match hash {
        DIFFUSE_MAP_HASH => "diffuse_map".to_string(),
        DIFFUSE_COLOR_HASH => "diffuse_color".to_string(),
        NORMAL_MAP_HASH => "normal_map".to_string(),
        other => format!("param_{other:08X}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamValue {
    Float(f32),
    Vector2([f32; 2]),
    Color([f32; 4]),
    Bool(bool),
    Int(i32),
    /// Texture reference, a virtual game path or a bare file name.
    Texture(String),
    /// A parameter whose payload the importer does not interpret (samplers,
    /// gradients and the 16-byte opaque types), tagged with its raw type.
    Opaque(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderParameter {
    pub version: Version,
    pub hash: u32,
    pub ty: u8,
    pub guid: Option<[u8; 16]>,
    pub value: ParamValue,
}

impl ShaderParameter {
    pub fn parse(s: &mut BinaryStream<'_>) -> DecodeResult<Self> {
        let version = Version::read(s)?;
        let hash = s.read_u32()?;
        if version.is_at_least(3, 1) && s.read_u8()? != 0 {
            s.skip(4)?;
        }
        let type_offset = s.absolute_offset();
        let ty = s.read_u8()?;
        let guid = if version.is_at_least(3, 0) {
            Some(s.read_array::<16>()?)
        } else {
            None
        };

        let value = match ty {
            0 | 5 | 9 => {
                s.skip(16)?;
                ParamValue::Opaque(ty)
            }
            1 => ParamValue::Color([s.read_f32()?, s.read_f32()?, s.read_f32()?, s.read_f32()?]),
            2 => ParamValue::Float(s.read_f32()?),
            3 => ParamValue::Bool(s.read_u32()? != 0),
            4 => ParamValue::Int(s.read_i32()?),
            6 => {
                let path = s.read_7bit_string()?;
                s.skip(4)?;
                ParamValue::Texture(path)
            }
            7 => {
                s.skip(8)?;
                if version.is_at_least(1, 1) {
                    s.skip(4)?;
                }
                ParamValue::Opaque(ty)
            }
            8 => {
                let len = s.read_u32()? as usize;
                s.skip(len.saturating_mul(4))?;
                ParamValue::Opaque(ty)
            }
            11 => {
                let value = [s.read_f32()?, s.read_f32()?];
                if !version.is_at_least(2, 0) {
                    s.skip(8)?;
                }
                ParamValue::Vector2(value)
            }
            other => {
                return Err(DecodeError::UnknownParameterType {
                    ty: other,
                    offset: type_offset,
                });
            }
        };

        Ok(Self {
            version,
            hash,
            ty,
            guid,
            value,
        })
    }

    pub fn name(&self) -> String {
        parameter_name(self.hash)
    }
}

/// Decoded parameter table. A record that fails to decode ends the table;
/// the records before it are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    pub parameters: Vec<ShaderParameter>,
    /// Declared record count.
    pub declared: usize,
    /// Why decoding stopped early.
    pub error: Option<DecodeError>,
}

/// Parse an `MTPR`/`DFPR` blob.
pub fn parse_parameters(blob: &Blob<'_>) -> DecodeResult<ParameterTable> {
    read_parameter_table(&mut blob.stream(), blob.version)
}

fn read_parameter_table(
    s: &mut BinaryStream<'_>,
    version: Version,
) -> DecodeResult<ParameterTable> {
    let declared = if version.is_at_least(2, 1) {
        s.read_u16()? as usize
    } else {
        s.read_u8()? as usize
    };
    let mut table = ParameterTable {
        declared,
        ..Default::default()
    };
    for _ in 0..declared {
        match ShaderParameter::parse(s) {
            Ok(parameter) => table.parameters.push(parameter),
            Err(e) => {
                table.error = Some(e);
                break;
            }
        }
    }
    Ok(table)
}

/// Whether a string parameter refers to a texture: either its name belongs
/// to the slot vocabulary, or the value looks like a file path.
pub fn is_texture_reference(slot_name: &str, value: &str) -> bool {
    if value.trim().is_empty() {
        return false;
    }
    let name = slot_name.to_ascii_lowercase();
    let named_like_slot = ["map", "tex", "diff", "normal", "swatch"]
        .iter()
        .any(|kw| name.contains(kw));
    let looks_like_path = value.contains(['\\', '/', ':']) || has_texture_extension(value);
    named_like_slot || looks_like_path
}

/// Base name of a virtual or native path, either separator.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// Base name without its extension.
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}

/// A decoded material instance.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MaterialRecord {
    /// Internal name, from the `Name` metadata.
    pub name: String,
    /// Parent reference as stored in the file.
    pub parent_path: Option<String>,
    /// Stem of the parent file name, e.g. `carbon_fiber_01`.
    pub source_file: Option<String>,
    pub parameters: IndexMap<String, ParamValue>,
    /// Texture slots by parameter name, holding the raw reference string.
    pub texture_slots: IndexMap<String, String>,
    /// Set when the parameter table was cut short; `parameters` holds the
    /// records decoded before the failure.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub parameter_error: Option<DecodeError>,
}

/// A texture slot attributed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSlot {
    pub slot_name: String,
    pub reference: String,
    pub channel: TextureChannel,
    pub keyword: &'static str,
}

/// Result of attributing a record's texture slots to channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSlots {
    /// At most one slot per channel, in slot order.
    pub assigned: Vec<ChannelSlot>,
    /// Slots that lost to a more specific slot for the same channel, paired
    /// with the slot name that kept it.
    pub discarded: Vec<(ChannelSlot, String)>,
    /// Slots neither the slot name nor the reference could classify.
    pub unclassified: Vec<(String, String)>,
}

impl MaterialRecord {
    /// Decode a material bundle (the payload of a `MatI` blob or a whole
    /// `.materialbin` file). `name` becomes the record's internal name.
    pub fn parse(name: impl Into<String>, stream: BinaryStream<'_>) -> DecodeResult<Self> {
        let bundle = Bundle::parse_stream(stream)?;
        Self::from_bundle(name, &bundle)
    }

    pub fn from_bundle(name: impl Into<String>, bundle: &Bundle<'_>) -> DecodeResult<Self> {
        let mut record = MaterialRecord {
            name: name.into(),
            ..Default::default()
        };

        if let Some(blob) = bundle.first_of(BlobTag::ParentInstance, BlobTag::ParentMaterial) {
            let path = blob.stream().read_7bit_string()?;
            if !path.is_empty() {
                record.source_file = Some(file_stem(&path).to_string());
                record.parent_path = Some(path);
            }
        }

        if let Some(blob) =
            bundle.first_of(BlobTag::MaterialParameters, BlobTag::DefaultParameters)
        {
            let table = parse_parameters(blob)?;
            for parameter in table.parameters {
                record.insert(parameter.name(), parameter.value);
            }
            record.parameter_error = table.error;
        }

        Ok(record)
    }

    fn insert(&mut self, name: String, value: ParamValue) {
        match &value {
            ParamValue::Texture(path) if is_texture_reference(&name, path) => {
                self.texture_slots.insert(name.clone(), path.clone());
            }
            _ => {
                self.texture_slots.shift_remove(&name);
            }
        }
        self.parameters.insert(name, value);
    }

    /// Layer this record over `parent`: parameters from both, with this
    /// record winning where both define the same name. Identity fields stay
    /// this record's.
    pub fn inherit(&mut self, parent: &MaterialRecord) {
        let own = std::mem::take(&mut self.parameters);
        self.texture_slots.clear();
        for (name, value) in parent.parameters.iter().chain(own.iter()) {
            self.insert(name.clone(), value.clone());
        }
    }

    /// Name the material is created under.
    pub fn display_name(&self, use_file_names: bool) -> &str {
        match (&self.source_file, use_file_names) {
            (Some(file), true) => file,
            _ => &self.name,
        }
    }

    pub fn base_color(&self) -> Option<[f32; 4]> {
        match self.parameters.get("diffuse_color") {
            Some(ParamValue::Color(c)) => Some(*c),
            _ => None,
        }
    }

    /// Attribute every texture slot to a channel, by slot name first and
    /// the referenced file name second. When two slots land on the same
    /// channel the longer keyword match wins; ties keep the earlier slot.
    pub fn channel_slots(&self) -> ChannelSlots {
        let mut out = ChannelSlots::default();
        let mut by_channel: IndexMap<TextureChannel, ChannelSlot> = IndexMap::new();

        for (slot_name, reference) in &self.texture_slots {
            let hit: Option<KeywordMatch> =
                match_channel(slot_name).or_else(|| match_channel(file_name(reference)));
            let Some(hit) = hit else {
                out.unclassified.push((slot_name.clone(), reference.clone()));
                continue;
            };
            let candidate = ChannelSlot {
                slot_name: slot_name.clone(),
                reference: reference.clone(),
                channel: hit.channel,
                keyword: hit.keyword,
            };

            match by_channel.entry(hit.channel) {
                Entry::Vacant(e) => {
                    e.insert(candidate);
                }
                Entry::Occupied(mut e) => {
                    if candidate.keyword.len() > e.get().keyword.len() {
                        let loser = e.insert(candidate);
                        let winner = e.get().slot_name.clone();
                        out.discarded.push((loser, winner));
                    } else {
                        let winner = e.get().slot_name.clone();
                        out.discarded.push((candidate, winner));
                    }
                }
            }
        }

        out.assigned = by_channel.into_values().collect();
        out
    }
}

/// Decode a standalone `.materialbin` file.
pub fn parse_materialbin(data: &[u8], name: impl Into<String>) -> DecodeResult<MaterialRecord> {
    MaterialRecord::parse(name, BinaryStream::new(data))
}
