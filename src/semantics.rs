use std::fmt;

use strum::{EnumIter, IntoEnumIterator};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ SEMANTICS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The fixed vocabulary of vertex element semantics.
#[derive(EnumIter, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Semantic{
  Position,
  Normal,
  Tangent,
  Binormal,
  TexCoord,
  BlendIndices,
  BlendWeight,
  Color,
}

/// Highest semantic index (exclusive) that fits into a `SemanticMask`.
pub const MAX_SEMANTIC_INDEX: u32 = 8;

impl Semantic{
  pub fn hlsl_name(self)->&'static str{
    match self {
      Semantic::Position => "POSITION",
      Semantic::Normal => "NORMAL",
      Semantic::Tangent => "TANGENT",
      Semantic::Binormal => "BINORMAL",
      Semantic::TexCoord => "TEXCOORD",
      Semantic::BlendIndices => "BLENDINDICES",
      Semantic::BlendWeight => "BLENDWEIGHT",
      Semantic::Color => "COLOR",
    }
  }

  /// The vertex buffer element format a mesh provides for this semantic
  /// unless told otherwise.
  pub fn default_format(self)->ElementFormat{
    match self {
      Semantic::Position | Semantic::Normal | Semantic::Tangent | Semantic::Binormal =>
        ElementFormat::new(ComponentFormat::Float32, 3),
      Semantic::TexCoord => ElementFormat::new(ComponentFormat::Float32, 2),
      Semantic::BlendIndices => ElementFormat::new(ComponentFormat::Uint8, 4),
      Semantic::BlendWeight => ElementFormat::new(ComponentFormat::Float32, 4),
      Semantic::Color => ElementFormat::new(ComponentFormat::Unorm8, 4),
    }
  }
}

impl fmt::Display for Semantic{
  fn fmt(&self, f: &mut fmt::Formatter<'_>)->fmt::Result{
    f.write_str(self.hlsl_name())
  }
}

/// Values produced or consumed by the fixed function parts of the pipeline.
#[derive(EnumIter, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum SystemValue{
  Position,
  Target,
  Depth,
  VertexId,
  InstanceId,
  IsFrontFace,
}

impl SystemValue{
  pub fn hlsl_name(self)->&'static str{
    match self {
      SystemValue::Position => "SV_Position",
      SystemValue::Target => "SV_Target",
      SystemValue::Depth => "SV_Depth",
      SystemValue::VertexId => "SV_VertexID",
      SystemValue::InstanceId => "SV_InstanceID",
      SystemValue::IsFrontFace => "SV_IsFrontFace",
    }
  }

  pub fn pssl_name(self)->&'static str{
    match self {
      SystemValue::Position => "S_POSITION",
      SystemValue::Target => "S_TARGET_OUTPUT",
      SystemValue::Depth => "S_DEPTH_OUTPUT",
      SystemValue::VertexId => "S_VERTEX_ID",
      SystemValue::InstanceId => "S_INSTANCE_ID",
      SystemValue::IsFrontFace => "S_FRONT_FACE",
    }
  }

  /// Only render targets are indexed.
  pub fn is_indexed(self)->bool{
    self == SystemValue::Target
  }
}

/// A resolved semantic annotation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum SemanticTag{
  Vertex(Semantic, u32),
  System(SystemValue, u32),
}

impl SemanticTag{
  /// Resolve a semantic as written in the source. Matching ignores case and
  /// a trailing decimal index is split off, so `texcoord1` is `TEXCOORD` with
  /// index 1.
  pub fn parse(text: &str)->Option<Self>{
    let upper = text.to_ascii_uppercase();
    let digits = upper.len() - upper.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (name, index) = upper.split_at(upper.len() - digits);
    let index = if index.is_empty() { 0 } else { index.parse().ok()? };

    if let Some(value) = SystemValue::iter().find(|v| v.hlsl_name().eq_ignore_ascii_case(name)) {
      if index != 0 && !value.is_indexed() {
        return None;
      }
      return Some(SemanticTag::System(value, index));
    }
    Semantic::iter()
      .find(|s| s.hlsl_name() == name)
      .map(|s| SemanticTag::Vertex(s, index))
  }

  pub fn is_system(&self)->bool{
    matches!(self, SemanticTag::System(..))
  }

  pub fn index(&self)->u32{
    match self {
      SemanticTag::Vertex(_, index) | SemanticTag::System(_, index) => *index,
    }
  }

  /// Canonical spelling, e.g. `TEXCOORD1` or `SV_Target0`.
  pub fn canonical_name(&self)->String{
    match self {
      SemanticTag::Vertex(semantic, index) => format!("{}{}", semantic.hlsl_name(), index),
      SemanticTag::System(value, index) if value.is_indexed() => format!("{}{}", value.hlsl_name(), index),
      SemanticTag::System(value, _) => value.hlsl_name().to_owned(),
    }
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ ELEMENT FORMATS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ComponentFormat{
  Float32,
  Uint8,
  /// Unsigned byte normalized to `[0, 1]`.
  Unorm8,
}

impl ComponentFormat{
  pub fn size(self)->u32{
    match self {
      ComponentFormat::Float32 => 4,
      ComponentFormat::Uint8 | ComponentFormat::Unorm8 => 1,
    }
  }
}

/// Layout of one element in a vertex buffer.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ElementFormat{
  pub component: ComponentFormat,
  pub count: u32,
}

impl ElementFormat{
  pub fn new(component: ComponentFormat, count: u32)->Self{
    Self { component, count }
  }

  pub fn size(&self)->u32{
    self.component.size() * self.count
  }
}

impl fmt::Display for ElementFormat{
  fn fmt(&self, f: &mut fmt::Formatter<'_>)->fmt::Result{
    let component = match self.component {
      ComponentFormat::Float32 => "float32",
      ComponentFormat::Uint8 => "uint8",
      ComponentFormat::Unorm8 => "unorm8",
    };
    write!(f, "{}x{}", self.count, component)
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ SEMANTIC MASK ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The set of vertex semantics consumed by a shader, one bit per semantic
/// and index. A mesh can be drawn with a shader if its mask is a superset of
/// the shader's.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct SemanticMask(pub u64);

impl SemanticMask{
  fn bit(semantic: Semantic, index: u32)->u64{
    1 << (semantic as u32 * MAX_SEMANTIC_INDEX + index)
  }

  /// Panics if `index` is not below `MAX_SEMANTIC_INDEX`. Validated vertex
  /// inputs never are.
  pub fn insert(&mut self, semantic: Semantic, index: u32){
    assert!(index < MAX_SEMANTIC_INDEX, "semantic index {} out of range", index);
    self.0 |= Self::bit(semantic, index);
  }

  pub fn contains(&self, semantic: Semantic, index: u32)->bool{
    index < MAX_SEMANTIC_INDEX && self.0 & Self::bit(semantic, index) != 0
  }

  pub fn covers(&self, other: SemanticMask)->bool{
    self.0 & other.0 == other.0
  }

  pub fn is_empty(&self)->bool{
    self.0 == 0
  }

  /// The semantics in the mask, ordered by semantic then index.
  pub fn iter(&self)->impl Iterator<Item = (Semantic, u32)> + '_{
    Semantic::iter()
      .flat_map(|s| (0..MAX_SEMANTIC_INDEX).map(move |i| (s, i)))
      .filter(|(s, i)| self.contains(*s, *i))
  }
}

#[cfg(test)]
mod tests{
  use super::*;

  #[test]
  fn parse_semantics(){
    assert_eq!(SemanticTag::parse("POSITION"), Some(SemanticTag::Vertex(Semantic::Position, 0)));
    assert_eq!(SemanticTag::parse("TexCoord3"), Some(SemanticTag::Vertex(Semantic::TexCoord, 3)));
    assert_eq!(SemanticTag::parse("SV_POSITION"), Some(SemanticTag::System(SystemValue::Position, 0)));
    assert_eq!(SemanticTag::parse("sv_target1"), Some(SemanticTag::System(SystemValue::Target, 1)));
    assert_eq!(SemanticTag::parse("SV_VertexID"), Some(SemanticTag::System(SystemValue::VertexId, 0)));
    assert_eq!(SemanticTag::parse("BOGUS"), None);
    assert_eq!(SemanticTag::parse("TEXCOORD9"), Some(SemanticTag::Vertex(Semantic::TexCoord, 9)));
    assert_eq!(SemanticTag::parse("TEXCOORD99999999999"), None);
    assert_eq!(SemanticTag::parse("SV_Depth1"), None);
    assert_eq!(SemanticTag::parse("123"), None);
  }

  #[test]
  fn canonical_names(){
    assert_eq!(SemanticTag::parse("texcoord").unwrap().canonical_name(), "TEXCOORD0");
    assert_eq!(SemanticTag::parse("SV_TARGET").unwrap().canonical_name(), "SV_Target0");
    assert_eq!(SemanticTag::parse("sv_position").unwrap().canonical_name(), "SV_Position");
  }

  #[test]
  fn default_formats(){
    assert_eq!(Semantic::Position.default_format(), ElementFormat::new(ComponentFormat::Float32, 3));
    assert_eq!(Semantic::Color.default_format().size(), 4);
    assert_eq!(Semantic::TexCoord.default_format().to_string(), "2xfloat32");
  }

  #[test]
  fn mask_covers(){
    let mut mesh = SemanticMask::default();
    mesh.insert(Semantic::Position, 0);
    mesh.insert(Semantic::TexCoord, 0);
    mesh.insert(Semantic::TexCoord, 1);
    let mut shader = SemanticMask::default();
    shader.insert(Semantic::Position, 0);
    shader.insert(Semantic::TexCoord, 1);
    assert!(mesh.covers(shader));
    assert!(!shader.covers(mesh));
    assert!(!shader.contains(Semantic::TexCoord, 0));
    assert_eq!(shader.iter().collect::<Vec<_>>(), vec![(Semantic::Position, 0), (Semantic::TexCoord, 1)]);
    let mut last = SemanticMask::default();
    last.insert(Semantic::Color, 7);
    assert_eq!(last.0, 1 << 63);
  }
}
