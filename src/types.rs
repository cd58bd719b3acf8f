use std::fmt;

use strum::{EnumIter, IntoEnumIterator};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ WHAT IS A TYPE? ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The dimensionality of a vector, or of a matrix row or column.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Dimension{
  // dimensionality must be defined in ascending order top to bottom
  // so that derive(PartialOrd) can work correctly
  One,
  Two,
  Three,
  Four
}

impl Dimension{
  pub fn count(self)->u32{
    match self {
      Dimension::One => 1,
      Dimension::Two => 2,
      Dimension::Three => 3,
      Dimension::Four => 4,
    }
  }

  pub fn from_count(count: u32)->Option<Self>{
    match count {
      1 => Some(Dimension::One),
      2 => Some(Dimension::Two),
      3 => Some(Dimension::Three),
      4 => Some(Dimension::Four),
      _ => None,
    }
  }
}

/// The component type of scalars, vectors and matrices.
#[derive(EnumIter, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ScalarKind{
  Bool,
  Int,
  Uint,
  Half,
  Float,
  Double,
}

impl ScalarKind{
  /// The HLSL spelling, used as the prefix of vector and matrix names.
  pub fn hlsl_name(self)->&'static str{
    match self {
      ScalarKind::Bool => "bool",
      ScalarKind::Int => "int",
      ScalarKind::Uint => "uint",
      ScalarKind::Half => "half",
      ScalarKind::Float => "float",
      ScalarKind::Double => "double",
    }
  }

  /// Size of one component inside a constant buffer. Halves are stored as floats.
  pub fn size(self)->u32{
    match self {
      ScalarKind::Double => 8,
      _ => 4,
    }
  }
}

#[derive(EnumIter, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TextureKind{
  Texture1D,
  Texture2D,
  Texture3D,
  TextureCube,
  Texture2DArray,
}

impl TextureKind{
  pub fn hlsl_name(self)->&'static str{
    match self {
      TextureKind::Texture1D => "Texture1D",
      TextureKind::Texture2D => "Texture2D",
      TextureKind::Texture3D => "Texture3D",
      TextureKind::TextureCube => "TextureCube",
      TextureKind::Texture2DArray => "Texture2DArray",
    }
  }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum SamplerKind{
  State,
  Comparison,
}

/// The types understood by the parser. Anything that is not a built-in type
/// name is taken to be the name of a struct.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type{
  Void,
  Scalar(ScalarKind),
  /// A vector of two to four components.
  Vector(ScalarKind, Dimension),
  /// A matrix with the given number of rows and columns.
  Matrix(ScalarKind, Dimension, Dimension),
  Texture(TextureKind),
  Sampler(SamplerKind),
  Struct(String),
}

impl Type{
  /// Resolve a type name as written in the source.
  pub fn from_name(name: &str)->Self{
    if name == "void" {
      return Type::Void;
    }
    if let Some(texture) = TextureKind::iter().find(|t| t.hlsl_name() == name) {
      return Type::Texture(texture);
    }
    match name {
      "SamplerState" | "sampler" => return Type::Sampler(SamplerKind::State),
      "SamplerComparisonState" => return Type::Sampler(SamplerKind::Comparison),
      "dword" => return Type::Scalar(ScalarKind::Uint),
      _ => (),
    }
    ScalarKind::iter()
      .find_map(|kind| name.strip_prefix(kind.hlsl_name()).and_then(|rest| Self::numeric(kind, rest)))
      .unwrap_or_else(|| Type::Struct(name.to_owned()))
  }

  fn numeric(kind: ScalarKind, dimensions: &str)->Option<Self>{
    let digit = |s: &str| s.parse::<u32>().ok().and_then(Dimension::from_count);
    if dimensions.is_empty() {
      return Some(Type::Scalar(kind));
    }
    match dimensions.split_once('x') {
      Some((rows, columns)) => Some(Type::Matrix(kind, digit(rows)?, digit(columns)?)),
      None => match digit(dimensions)? {
        Dimension::One => Some(Type::Scalar(kind)),
        dim => Some(Type::Vector(kind, dim)),
      },
    }
  }

  pub fn scalar_kind(&self)->Option<ScalarKind>{
    match self {
      Type::Scalar(kind) | Type::Vector(kind, _) | Type::Matrix(kind, _, _) => Some(*kind),
      _ => None,
    }
  }

  /// True for scalars, vectors and matrices.
  pub fn is_numeric(&self)->bool{
    self.scalar_kind().is_some()
  }

  pub fn is_resource(&self)->bool{
    matches!(self, Type::Texture(_) | Type::Sampler(_))
  }

  // ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ PACKING ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

  /// Size in bytes of a single value inside a constant buffer and whether it
  /// must start on a 16-byte register boundary. Matrices are column-major
  /// unless `row_major` is given; every register but the last one is padded
  /// to 16 bytes. `None` for types that cannot live in a constant buffer, or
  /// structs, which the caller packs member by member.
  pub fn packed_size(&self, row_major: bool)->Option<(u32, bool)>{
    match self {
      Type::Scalar(kind) => Some((kind.size(), false)),
      Type::Vector(kind, dim) => Some((kind.size() * dim.count(), false)),
      Type::Matrix(kind, rows, columns) => {
        let (registers, per_register) = if row_major {
          (rows.count(), columns.count())
        } else {
          (columns.count(), rows.count())
        };
        Some(((registers - 1) * 16 + per_register * kind.size(), true))
      }
      _ => None,
    }
  }
}

impl fmt::Display for Type{
  fn fmt(&self, f: &mut fmt::Formatter<'_>)->fmt::Result{
    match self {
      Type::Void => f.write_str("void"),
      Type::Scalar(kind) => f.write_str(kind.hlsl_name()),
      Type::Vector(kind, dim) => write!(f, "{}{}", kind.hlsl_name(), dim.count()),
      Type::Matrix(kind, rows, columns) => write!(f, "{}{}x{}", kind.hlsl_name(), rows.count(), columns.count()),
      Type::Texture(kind) => f.write_str(kind.hlsl_name()),
      Type::Sampler(SamplerKind::State) => f.write_str("SamplerState"),
      Type::Sampler(SamplerKind::Comparison) => f.write_str("SamplerComparisonState"),
      Type::Struct(name) => f.write_str(name),
    }
  }
}

#[cfg(test)]
mod tests{
  use super::*;

  #[test]
  fn resolve_type_names(){
    assert_eq!(Type::from_name("float3"), Type::Vector(ScalarKind::Float, Dimension::Three));
    assert_eq!(Type::from_name("uint"), Type::Scalar(ScalarKind::Uint));
    assert_eq!(Type::from_name("float1"), Type::Scalar(ScalarKind::Float));
    assert_eq!(Type::from_name("half4x3"), Type::Matrix(ScalarKind::Half, Dimension::Four, Dimension::Three));
    assert_eq!(Type::from_name("Texture2D"), Type::Texture(TextureKind::Texture2D));
    assert_eq!(Type::from_name("SamplerState"), Type::Sampler(SamplerKind::State));
    assert_eq!(Type::from_name("float5"), Type::Struct("float5".into()));
    assert_eq!(Type::from_name("VSIn"), Type::Struct("VSIn".into()));
    assert_eq!(Type::from_name("int2").to_string(), "int2");
  }

  #[test]
  fn packed_sizes(){
    assert_eq!(Type::from_name("float").packed_size(false), Some((4, false)));
    assert_eq!(Type::from_name("float3").packed_size(false), Some((12, false)));
    assert_eq!(Type::from_name("float4x4").packed_size(false), Some((64, true)));
    // three columns of three rows
    assert_eq!(Type::from_name("float3x3").packed_size(false), Some((44, true)));
    // a 4x2 matrix is two registers column-major and four row-major
    assert_eq!(Type::from_name("float4x2").packed_size(false), Some((32, true)));
    assert_eq!(Type::from_name("float4x2").packed_size(true), Some((56, true)));
    assert_eq!(Type::from_name("Texture2D").packed_size(false), None);
  }
}
