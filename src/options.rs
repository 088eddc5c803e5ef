//! Packing options and their fixed-width encoding.
//!
//! Layout (36 bytes, little-endian):
//! ```text
//! packMode u32 | width u32 | height u32 | padding f64 |
//! combine u8 | rescale u8 | preRotate u8 | fullRotation u8 |
//! rotationStep u32 | tilesX u32 | tilesY u32
//! ```
//!
//! # Example
//!
//! ```
//! use uvpack_bridge::options::{PackOptions, RotationStep, ENCODED_OPTIONS_SIZE};
//!
//! let options = PackOptions::builder()
//!     .size(2048, 2048)
//!     .rotation_step(RotationStep::Deg45)
//!     .build()
//!     .unwrap();
//! assert_eq!(options.encode().len(), ENCODED_OPTIONS_SIZE);
//! ```

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::error::{PackError, Result};
use crate::protocol::{WireReader, BOOL_SIZE, F64_SIZE, U32_SIZE};

/// Encoded size of [`PackOptions`]: six u32, one f64, four bools.
pub const ENCODED_OPTIONS_SIZE: usize = 6 * U32_SIZE + F64_SIZE + 4 * BOOL_SIZE;

/// Smallest accepted sheet width/height.
pub const MIN_SHEET_SIZE: u32 = 8;

/// Packing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackMode {
    /// Best compromise for speed and space usage.
    #[default]
    Efficient,
    /// Slowest but maximal space usage.
    HighQuality,
}

impl PackMode {
    /// Wire tag.
    pub fn as_u32(self) -> u32 {
        match self {
            PackMode::Efficient => 0,
            PackMode::HighQuality => 1,
        }
    }

    /// Parse a wire tag.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(PackMode::Efficient),
            1 => Some(PackMode::HighQuality),
            _ => None,
        }
    }

    /// Resolve a host enum identifier (`"OP0"`, `"OP1"`). Unknown ids fall
    /// back to [`PackMode::Efficient`].
    pub fn from_engine_id(id: &str) -> Self {
        match id {
            "OP1" => PackMode::HighQuality,
            _ => PackMode::Efficient,
        }
    }
}

/// Chart rotation increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStep {
    /// No rotation.
    None,
    /// 90 degrees.
    #[default]
    Deg90,
    /// 45 degrees.
    Deg45,
    /// 23 degrees.
    Deg23,
}

impl RotationStep {
    /// Wire tag.
    pub fn as_u32(self) -> u32 {
        match self {
            RotationStep::None => 0,
            RotationStep::Deg90 => 1,
            RotationStep::Deg45 => 2,
            RotationStep::Deg23 => 3,
        }
    }

    /// Parse a wire tag.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(RotationStep::None),
            1 => Some(RotationStep::Deg90),
            2 => Some(RotationStep::Deg45),
            3 => Some(RotationStep::Deg23),
            _ => None,
        }
    }

    /// Step in degrees.
    pub fn degrees(self) -> u32 {
        match self {
            RotationStep::None => 0,
            RotationStep::Deg90 => 90,
            RotationStep::Deg45 => 45,
            RotationStep::Deg23 => 23,
        }
    }
}

/// Packing configuration sent with every request.
///
/// Fields are private; the numeric minimums are checked by
/// [`PackOptionsBuilder::build`], and again when a session starts so that
/// deserialized options are covered too.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackOptions {
    pack_mode: PackMode,
    width: u32,
    height: u32,
    padding: f64,
    combine: bool,
    rescale: bool,
    pre_rotate: bool,
    full_rotation: bool,
    rotation_step: RotationStep,
    tiles_x: u32,
    tiles_y: u32,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            pack_mode: PackMode::Efficient,
            width: 1024,
            height: 1024,
            padding: 2.0,
            combine: true,
            rescale: true,
            pre_rotate: true,
            full_rotation: false,
            rotation_step: RotationStep::Deg90,
            tiles_x: 1,
            tiles_y: 1,
        }
    }
}

impl PackOptions {
    /// Start from the default options.
    pub fn builder() -> PackOptionsBuilder {
        PackOptionsBuilder::new()
    }

    pub fn pack_mode(&self) -> PackMode {
        self.pack_mode
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn padding(&self) -> f64 {
        self.padding
    }

    pub fn combine(&self) -> bool {
        self.combine
    }

    pub fn rescale(&self) -> bool {
        self.rescale
    }

    pub fn pre_rotate(&self) -> bool {
        self.pre_rotate
    }

    pub fn full_rotation(&self) -> bool {
        self.full_rotation
    }

    pub fn rotation_step(&self) -> RotationStep {
        self.rotation_step
    }

    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    /// Check the numeric minimums. Deserialized options go through this too.
    pub fn validate(&self) -> Result<()> {
        if self.width < MIN_SHEET_SIZE || self.height < MIN_SHEET_SIZE {
            return Err(PackError::Configuration(format!(
                "Sheet size {}x{} is below the minimum of {}",
                self.width, self.height, MIN_SHEET_SIZE
            )));
        }
        if !(self.padding >= 0.0) {
            return Err(PackError::Configuration(format!(
                "Padding must be non-negative, got {}",
                self.padding
            )));
        }
        if self.tiles_x < 1 || self.tiles_y < 1 {
            return Err(PackError::Configuration(format!(
                "Tile grid {}x{} must have at least one tile",
                self.tiles_x, self.tiles_y
            )));
        }
        Ok(())
    }

    /// Append the fixed-width encoding to `buf`.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.pack_mode.as_u32());
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        buf.put_f64_le(self.padding);
        buf.put_u8(self.combine as u8);
        buf.put_u8(self.rescale as u8);
        buf.put_u8(self.pre_rotate as u8);
        buf.put_u8(self.full_rotation as u8);
        buf.put_u32_le(self.rotation_step.as_u32());
        buf.put_u32_le(self.tiles_x);
        buf.put_u32_le(self.tiles_y);
    }

    /// Encode into a new buffer of exactly [`ENCODED_OPTIONS_SIZE`] bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENCODED_OPTIONS_SIZE);
        self.encode_into(&mut buf);
        buf
    }

    /// Inverse of [`encode`](Self::encode). Unknown enum tags are protocol errors.
    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let mode_tag = reader.read_u32()?;
        let pack_mode = PackMode::from_u32(mode_tag)
            .ok_or_else(|| PackError::Protocol(format!("Unknown pack mode {}", mode_tag)))?;
        let width = reader.read_u32()?;
        let height = reader.read_u32()?;
        let padding = reader.read_f64()?;
        let combine = reader.read_bool()?;
        let rescale = reader.read_bool()?;
        let pre_rotate = reader.read_bool()?;
        let full_rotation = reader.read_bool()?;
        let rotation_tag = reader.read_u32()?;
        let rotation_step = RotationStep::from_u32(rotation_tag).ok_or_else(|| {
            PackError::Protocol(format!("Unknown rotation step {}", rotation_tag))
        })?;
        let tiles_x = reader.read_u32()?;
        let tiles_y = reader.read_u32()?;

        Ok(Self {
            pack_mode,
            width,
            height,
            padding,
            combine,
            rescale,
            pre_rotate,
            full_rotation,
            rotation_step,
            tiles_x,
            tiles_y,
        })
    }
}

/// Fluent builder for [`PackOptions`].
#[derive(Debug, Clone, Default)]
pub struct PackOptionsBuilder {
    options: PackOptions,
}

impl PackOptionsBuilder {
    /// Create a builder seeded with the default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pack_mode(mut self, mode: PackMode) -> Self {
        self.options.pack_mode = mode;
        self
    }

    /// Set both sheet dimensions.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.options.width = width;
        self.options.height = height;
        self
    }

    pub fn padding(mut self, padding: f64) -> Self {
        self.options.padding = padding;
        self
    }

    /// Pack all objects into one sheet.
    pub fn combine(mut self, combine: bool) -> Self {
        self.options.combine = combine;
        self
    }

    pub fn rescale(mut self, rescale: bool) -> Self {
        self.options.rescale = rescale;
        self
    }

    pub fn pre_rotate(mut self, pre_rotate: bool) -> Self {
        self.options.pre_rotate = pre_rotate;
        self
    }

    pub fn full_rotation(mut self, full_rotation: bool) -> Self {
        self.options.full_rotation = full_rotation;
        self
    }

    pub fn rotation_step(mut self, step: RotationStep) -> Self {
        self.options.rotation_step = step;
        self
    }

    /// Set the UDIM-style tile grid.
    pub fn tiles(mut self, tiles_x: u32, tiles_y: u32) -> Self {
        self.options.tiles_x = tiles_x;
        self.options.tiles_y = tiles_y;
        self
    }

    /// Validate and return the options.
    pub fn build(self) -> Result<PackOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
