use std::{fmt, str::FromStr};

use log::debug;
use strum::{EnumIter, IntoEnumIterator};

use crate::ast::{
  Declaration, Function, Interpolation, Parameter, ParameterModifier, ShaderScope, StructDecl,
  Variable, GLOBALS_BUFFER,
};
use crate::error::ValidationError;
use crate::preprocessor::{BlockId, Guard, Node};
use crate::semantics::{ElementFormat, SemanticMask, SemanticTag, SystemValue, MAX_SEMANTIC_INDEX};
use crate::types::Type;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ STAGES ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[derive(EnumIter, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ShaderStage{
  Vertex,
  Hull,
  Domain,
  Geometry,
  Pixel,
  Compute,
}

impl ShaderStage{
  pub fn name(self)->&'static str{
    match self {
      ShaderStage::Vertex => "vertex",
      ShaderStage::Hull => "hull",
      ShaderStage::Domain => "domain",
      ShaderStage::Geometry => "geometry",
      ShaderStage::Pixel => "pixel",
      ShaderStage::Compute => "compute",
    }
  }
}

impl fmt::Display for ShaderStage{
  fn fmt(&self, f: &mut fmt::Formatter<'_>)->fmt::Result{
    f.write_str(self.name())
  }
}

impl FromStr for ShaderStage{
  type Err = String;

  fn from_str(s: &str)->Result<Self, Self::Err>{
    let s = s.to_ascii_lowercase();
    if s == "fragment" {
      return Ok(ShaderStage::Pixel);
    }
    ShaderStage::iter()
      .find(|stage| stage.name() == s)
      .ok_or_else(|| format!("unknown shader stage '{}'", s))
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ DESCRIPTION ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Where a value of the stage interface lives in the entry point signature.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ElementSource{
  Parameter(String),
  /// A field of a struct-typed parameter.
  Field{ parameter: String, field: String },
  Return,
  /// A field of a struct-typed return value.
  ReturnField(String),
}

impl ElementSource{
  /// The name of the value itself, the field name for struct members.
  pub fn leaf_name(&self)->&str{
    match self {
      ElementSource::Parameter(name) | ElementSource::ReturnField(name) => name,
      ElementSource::Field { field, .. } => field,
      ElementSource::Return => "return",
    }
  }
}

/// One value crossing the boundary of the stage.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct InterfaceElement{
  pub source: ElementSource,
  pub ty: Type,
  /// The semantic as written.
  pub semantic_name: String,
  pub tag: SemanticTag,
  /// Vertex buffer slot for inputs, varying slot for outputs. System values
  /// have none.
  pub location: Option<u32>,
  /// Vertex buffer element format. Only set for non system inputs.
  pub format: Option<ElementFormat>,
  pub interpolation: Option<Interpolation>,
  /// Conditions around the struct field the element comes from.
  pub guard: Guard,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ConstantBufferMember{
  pub name: String,
  pub ty: Type,
  pub array: Option<u32>,
  pub row_major: bool,
  /// Byte offset from the start of the buffer.
  pub offset: u32,
  pub size: u32,
  pub guard: Guard,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ConstantBufferLayout{
  pub name: String,
  pub slot: u32,
  pub members: Vec<ConstantBufferMember>,
  /// Total size, a multiple of 16 bytes.
  pub size: u32,
}

impl ConstantBufferLayout{
  pub fn is_globals(&self)->bool{
    self.name == GLOBALS_BUFFER
  }

  pub fn member(&self, name: &str)->Option<&ConstantBufferMember>{
    self.members.iter().find(|m| m.name == name)
  }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ResourceBinding{
  pub name: String,
  pub ty: Type,
  pub slot: u32,
}

/// The validated summary of a shader's bindings and interface, consumed by a
/// renderer to allocate constant buffers, check vertex layouts and bind
/// resources. Two validations of the same source and entry point compare equal.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ShaderInstanceDescription{
  pub entry_point: String,
  pub stage: ShaderStage,
  pub inputs: Vec<InterfaceElement>,
  pub outputs: Vec<InterfaceElement>,
  /// Vertex semantics consumed by the inputs. Empty for every stage but
  /// the vertex stage.
  pub semantic_mask: SemanticMask,
  pub constant_buffers: Vec<ConstantBufferLayout>,
  pub textures: Vec<ResourceBinding>,
  pub samplers: Vec<ResourceBinding>,
}

impl ShaderInstanceDescription{
  pub fn constant_buffer(&self, name: &str)->Option<&ConstantBufferLayout>{
    self.constant_buffers.iter().find(|b| b.name == name)
  }

  pub fn texture(&self, name: &str)->Option<&ResourceBinding>{
    self.textures.iter().find(|t| t.name == name)
  }

  pub fn sampler(&self, name: &str)->Option<&ResourceBinding>{
    self.samplers.iter().find(|s| s.name == name)
  }

  pub fn input(&self, source: &ElementSource)->Option<&InterfaceElement>{
    self.inputs.iter().find(|e| &e.source == source)
  }

  pub fn output(&self, source: &ElementSource)->Option<&InterfaceElement>{
    self.outputs.iter().find(|e| &e.source == source)
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ VALIDATE ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Direction{
  Input,
  Output,
}

/// Resolve a semantic for a direction of a stage. Besides the table, the
/// legacy spellings `POSITION` (vertex output), `COLOR` and `DEPTH` (pixel
/// output) map to their system values.
fn resolve_semantic(text: &str, stage: ShaderStage, direction: Direction)->Option<SemanticTag>{
  use crate::semantics::Semantic;
  if stage == ShaderStage::Pixel && direction == Direction::Output && text.eq_ignore_ascii_case("DEPTH") {
    return Some(SemanticTag::System(SystemValue::Depth, 0));
  }
  let tag = SemanticTag::parse(text)?;
  Some(match (stage, direction, tag) {
    (ShaderStage::Vertex, Direction::Output, SemanticTag::Vertex(Semantic::Position, 0)) =>
      SemanticTag::System(SystemValue::Position, 0),
    (ShaderStage::Pixel, Direction::Output, SemanticTag::Vertex(Semantic::Color, index)) =>
      SemanticTag::System(SystemValue::Target, index),
    _ => tag,
  })
}

struct Interface<'a>{
  scope: &'a ShaderScope,
  stage: ShaderStage,
  inputs: Vec<InterfaceElement>,
  outputs: Vec<InterfaceElement>,
}

impl<'a> Interface<'a>{
  fn struct_decl(&self, name: &str)->Result<&'a StructDecl, ValidationError>{
    self.scope.find_struct(name).ok_or_else(|| ValidationError::UnknownStruct(name.to_owned()))
  }

  fn push(
    &mut self,
    direction: Direction,
    source: ElementSource,
    ty: &Type,
    semantic: Option<&str>,
    interpolation: Option<Interpolation>,
    guard: &Guard,
    display_name: &str,
  )->Result<(), ValidationError>{
    if !ty.is_numeric() {
      return Err(ValidationError::UnsupportedParameterType { name: display_name.to_owned(), type_name: ty.to_string() });
    }
    let semantic = semantic.ok_or_else(|| ValidationError::MissingSemantic(display_name.to_owned()))?;
    let unknown = || ValidationError::UnknownSemantic { name: display_name.to_owned(), semantic: semantic.to_owned() };
    let tag = resolve_semantic(semantic, self.stage, direction).ok_or_else(unknown)?;
    // vertex inputs must fit the semantic mask
    if let (ShaderStage::Vertex, Direction::Input, SemanticTag::Vertex(_, index)) = (self.stage, direction, tag) {
      if index >= MAX_SEMANTIC_INDEX {
        return Err(unknown());
      }
    }
    let list = match direction {
      Direction::Input => &mut self.inputs,
      Direction::Output => &mut self.outputs,
    };
    let location = if tag.is_system() {
      None
    } else {
      Some(list.iter().filter(|e| e.location.is_some()).count() as u32)
    };
    let format = match (direction, tag) {
      (Direction::Input, SemanticTag::Vertex(semantic, _)) => Some(semantic.default_format()),
      _ => None,
    };
    list.push(InterfaceElement {
      source,
      ty: ty.clone(),
      semantic_name: semantic.to_owned(),
      tag,
      location,
      format,
      interpolation,
      guard: guard.clone(),
    });
    Ok(())
  }

  fn parameter(&mut self, parameter: &Parameter)->Result<(), ValidationError>{
    let directions: &[Direction] = match parameter.modifier {
      ParameterModifier::In => &[Direction::Input],
      ParameterModifier::Out => &[Direction::Output],
      ParameterModifier::InOut => &[Direction::Input, Direction::Output],
      ParameterModifier::Uniform => {
        return Err(ValidationError::UnsupportedParameterType {
          name: parameter.name.clone(),
          type_name: format!("uniform {}", parameter.ty),
        });
      }
    };
    for direction in directions.iter().copied(){
      match &parameter.ty {
        Type::Struct(name) => {
          let decl = self.struct_decl(name)?;
          for field in &decl.fields{
            let source = ElementSource::Field { parameter: parameter.name.clone(), field: field.name.clone() };
            let display = format!("{}.{}", parameter.name, field.name);
            self.push(direction, source, &field.ty, field.semantic.as_deref(), field.interpolation, &field.guard, &display)?;
          }
        }
        ty => {
          let source = ElementSource::Parameter(parameter.name.clone());
          let unguarded = Guard::default();
          self.push(direction, source, ty, parameter.semantic.as_deref(), parameter.interpolation, &unguarded, &parameter.name)?;
        }
      }
    }
    Ok(())
  }

  fn return_value(&mut self, function: &Function)->Result<(), ValidationError>{
    match &function.return_type {
      Type::Void => Ok(()),
      Type::Struct(name) => {
        let decl = self.struct_decl(name)?;
        for field in &decl.fields{
          let display = format!("{}.{}", function.name, field.name);
          self.push(
            Direction::Output,
            ElementSource::ReturnField(field.name.clone()),
            &field.ty,
            field.semantic.as_deref(),
            field.interpolation,
            &field.guard,
            &display,
          )?;
        }
        Ok(())
      }
      ty => {
        let unguarded = Guard::default();
        self.push(Direction::Output, ElementSource::Return, ty, function.semantic.as_deref(), None, &unguarded, &function.name)
      }
    }
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ PACKING ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

const REGISTER: u32 = 16;

fn round_up(value: u32, to: u32)->u32{
  value.div_ceil(to) * to
}

/// Packs values into 16-byte registers the way HLSL constant buffers do.
struct Packer<'a>{
  scope: &'a ShaderScope,
  offset: u32,
}

impl<'a> Packer<'a>{
  /// Size of one value and whether it must start a new register.
  fn value_size(&self, name: &str, ty: &Type, row_major: bool)->Result<(u32, bool), ValidationError>{
    if let Type::Struct(struct_name) = ty {
      let decl = self.scope.find_struct(struct_name)
        .ok_or_else(|| ValidationError::UnknownStruct(struct_name.clone()))?;
      let mut inner = Packer { scope: self.scope, offset: 0 };
      for field in &decl.fields{
        inner.place(&field.name, &field.ty, field.array, field.row_major)?;
      }
      return Ok((inner.offset, true));
    }
    ty.packed_size(row_major)
      .ok_or_else(|| ValidationError::UnknownConstantType { name: name.to_owned(), type_name: ty.to_string() })
  }

  /// Reserve space for a member, returning its offset and size.
  fn place(&mut self, name: &str, ty: &Type, array: Option<u32>, row_major: bool)->Result<(u32, u32), ValidationError>{
    let (element, starts_register) = self.value_size(name, ty, row_major)?;
    let (size, starts_register) = match array {
      Some(count) => (round_up(element, REGISTER) * (count - 1) + element, true),
      None => (element, starts_register),
    };
    let straddles = size > 0 && self.offset / REGISTER != (self.offset + size - 1) / REGISTER;
    if starts_register || straddles {
      self.offset = round_up(self.offset, REGISTER);
    }
    let offset = self.offset;
    self.offset += size;
    // the member after an aggregate starts a new register
    if starts_register {
      self.offset = round_up(self.offset, REGISTER);
    }
    Ok((offset, size))
  }
}

fn layout_buffer(scope: &ShaderScope, name: &str, slot: u32, members: &[&Variable])->Result<ConstantBufferLayout, ValidationError>{
  let mut packer = Packer { scope, offset: 0 };
  let mut laid_out = Vec::with_capacity(members.len());
  for member in members{
    let (offset, size) = packer.place(&member.name, &member.ty, member.array, member.row_major)?;
    laid_out.push(ConstantBufferMember {
      name: member.name.clone(),
      ty: member.ty.clone(),
      array: member.array,
      row_major: member.row_major,
      offset,
      size,
      guard: member.guard.clone(),
    });
  }
  Ok(ConstantBufferLayout { name: name.to_owned(), slot, members: laid_out, size: round_up(packer.offset, REGISTER) })
}

/// Fails if one block defines the entry point more than once. Definitions in
/// different conditional blocks are alternatives and allowed.
fn check_duplicate_entries(scope: &ShaderScope, id: BlockId)->Result<(), ValidationError>{
  let block = scope.blocks.block(id);
  let definitions = block.elements()
    .filter(|d| matches!(d, Declaration::Function(f) if f.is_entry_point))
    .count();
  if definitions > 1 {
    return Err(ValidationError::DuplicateEntryPoint(scope.entry_point.clone()));
  }
  for node in block.contents(){
    if let Node::Block(child) = node {
      check_duplicate_entries(scope, *child)?;
    }
  }
  Ok(())
}

/// Compute the Shader Instance Description of the scope's entry point for a
/// stage. Declarations, struct fields and cbuffer members count regardless
/// of the conditions around them, in source order.
pub fn validate(scope: &ShaderScope, stage: ShaderStage)->Result<ShaderInstanceDescription, ValidationError>{
  check_duplicate_entries(scope, scope.blocks.root())?;
  let entry = scope.entry_function()
    .ok_or_else(|| ValidationError::EntryPointNotFound(scope.entry_point.clone()))?;

  let mut interface = Interface { scope, stage, inputs: vec![], outputs: vec![] };
  for parameter in &entry.parameters{
    interface.parameter(parameter)?;
  }
  interface.return_value(entry)?;

  let mut semantic_mask = SemanticMask::default();
  if stage == ShaderStage::Vertex {
    for input in &interface.inputs{
      if let SemanticTag::Vertex(semantic, index) = input.tag {
        semantic_mask.insert(semantic, index);
      }
    }
  }

  // loose globals form the first buffer, explicit ones follow in order
  let mut constant_buffers = vec![];
  let globals: Vec<&Variable> = scope.globals().collect();
  if !globals.is_empty() {
    constant_buffers.push(layout_buffer(scope, GLOBALS_BUFFER, 0, &globals)?);
  }
  for buffer in scope.constant_buffers(){
    let members: Vec<&Variable> = buffer.members.iter().collect();
    let slot = constant_buffers.len() as u32;
    constant_buffers.push(layout_buffer(scope, &buffer.name, slot, &members)?);
  }

  let mut textures = vec![];
  let mut samplers = vec![];
  for resource in scope.resources(){
    let list = match resource.ty {
      Type::Sampler(_) => &mut samplers,
      _ => &mut textures,
    };
    let slot = list.len() as u32;
    list.push(ResourceBinding { name: resource.name.clone(), ty: resource.ty.clone(), slot });
  }

  debug!(
    "validated '{}' for {} stage: {} inputs, {} outputs, {} constant buffers, {} textures, {} samplers",
    entry.name, stage, interface.inputs.len(), interface.outputs.len(),
    constant_buffers.len(), textures.len(), samplers.len()
  );
  Ok(ShaderInstanceDescription {
    entry_point: entry.name.clone(),
    stage,
    inputs: interface.inputs,
    outputs: interface.outputs,
    semantic_mask,
    constant_buffers,
    textures,
    samplers,
  })
}

#[cfg(test)]
mod tests{
  use super::*;
  use crate::parse::parse_shader;
  use crate::semantics::{ComponentFormat, Semantic};

  fn describe(source: &str, stage: ShaderStage)->Result<ShaderInstanceDescription, ValidationError>{
    validate(&parse_shader(source, "Main").unwrap(), stage)
  }

  const VERTEX: &str = "
struct VSIn {
  float3 Position : POSITION;
  float3 Normal : normal;
  float2 UV : TEXCOORD1;
};
struct VSOut {
  float4 Position : SV_Position;
  float2 UV : TEXCOORD0;
};
VSOut Main(VSIn IN, uint id : SV_VertexID) {
  VSOut o;
  o.Position = float4(IN.Position, 1.0);
  o.UV = IN.UV;
  return o;
}
";

  #[test]
  fn resolve_vertex_inputs(){
    let description = describe(VERTEX, ShaderStage::Vertex).unwrap();
    let position = &description.inputs[0];
    assert_eq!(position.source, ElementSource::Field { parameter: "IN".into(), field: "Position".into() });
    assert_eq!(position.location, Some(0));
    assert_eq!(position.format, Some(ElementFormat::new(ComponentFormat::Float32, 3)));
    assert_eq!(description.inputs[2].tag, SemanticTag::Vertex(Semantic::TexCoord, 1));
    assert_eq!(description.inputs[2].location, Some(2));
    let id = &description.inputs[3];
    assert_eq!(id.tag, SemanticTag::System(SystemValue::VertexId, 0));
    assert_eq!(id.location, None);

    assert!(description.semantic_mask.contains(Semantic::Position, 0));
    assert!(description.semantic_mask.contains(Semantic::Normal, 0));
    assert!(description.semantic_mask.contains(Semantic::TexCoord, 1));
    assert!(!description.semantic_mask.contains(Semantic::TexCoord, 0));

    assert_eq!(description.outputs.len(), 2);
    assert_eq!(description.outputs[0].location, None);
    assert_eq!(description.outputs[1].source, ElementSource::ReturnField("UV".into()));
    assert_eq!(description.outputs[1].location, Some(0));
  }

  #[test]
  fn position_parameter_resolves(){
    let description = describe("float4 Main(float3 p : POSITION) : SV_POSITION { return float4(p, 1.0); }", ShaderStage::Vertex).unwrap();
    assert_eq!(description.inputs[0].format, Some(Semantic::Position.default_format()));
    assert!(description.semantic_mask.contains(Semantic::Position, 0));
    assert_eq!(description.outputs[0].tag, SemanticTag::System(SystemValue::Position, 0));
  }

  #[test]
  fn semantic_errors(){
    let error = describe("float4 Main(float3 p : BOGUS) : SV_POSITION { return 0; }", ShaderStage::Vertex).unwrap_err();
    assert_eq!(error, ValidationError::UnknownSemantic { name: "p".into(), semantic: "BOGUS".into() });
    let error = describe("float4 Main(float3 p) : SV_POSITION { return 0; }", ShaderStage::Vertex).unwrap_err();
    assert_eq!(error, ValidationError::MissingSemantic("p".into()));
    let error = describe("float4 Main(Texture2D t) : SV_POSITION { return 0; }", ShaderStage::Vertex).unwrap_err();
    assert!(matches!(error, ValidationError::UnsupportedParameterType { .. }));
    let error = describe("float4 Main(Missing m) : SV_POSITION { return 0; }", ShaderStage::Vertex).unwrap_err();
    assert_eq!(error, ValidationError::UnknownStruct("Missing".into()));
    let error = describe("float4 Other() : SV_POSITION { return 0; }", ShaderStage::Vertex).unwrap_err();
    assert_eq!(error, ValidationError::EntryPointNotFound("Main".into()));
  }

  #[test]
  fn pixel_legacy_outputs(){
    let source = "void Main(float2 uv : TEXCOORD0, out float4 c : COLOR1, out float d : DEPTH) { c = 1; d = 0; }";
    let description = describe(source, ShaderStage::Pixel).unwrap();
    assert_eq!(description.outputs[0].tag, SemanticTag::System(SystemValue::Target, 1));
    assert_eq!(description.outputs[1].tag, SemanticTag::System(SystemValue::Depth, 0));
  }

  #[test]
  fn constant_buffer_packing(){
    let source = "
float4 Tint;
float Scale;
cbuffer PerObject {
  float4x4 World;
  float3 Offset;
  float Weight;
  float2 Pair;
  float3 Straddle;
  float Values[3];
  float Last;
};
float4 Main() : SV_Target { return Tint; }
";
    let description = describe(source, ShaderStage::Pixel).unwrap();
    let globals = description.constant_buffer("$Globals").unwrap();
    assert_eq!(globals.slot, 0);
    assert_eq!(globals.member("Scale").unwrap().offset, 16);
    assert_eq!(globals.size, 32);

    let buffer = description.constant_buffer("PerObject").unwrap();
    assert_eq!(buffer.slot, 1);
    let offsets: Vec<_> = buffer.members.iter().map(|m| (m.offset, m.size)).collect();
    assert_eq!(offsets, vec![(0, 64), (64, 12), (76, 4), (80, 8), (96, 12), (112, 36), (160, 4)]);
    assert_eq!(buffer.size, 176);
  }

  #[test]
  fn empty_struct_members_do_not_straddle(){
    let source = "
struct Empty { };
cbuffer B {
  Empty e;
  float x;
};
float4 Main() : SV_Target { return x; }
";
    let buffer = describe(source, ShaderStage::Pixel).unwrap().constant_buffers.remove(0);
    let offsets: Vec<_> = buffer.members.iter().map(|m| (m.name.as_str(), m.offset, m.size)).collect();
    assert_eq!(offsets, vec![("e", 0, 0), ("x", 0, 4)]);
    assert_eq!(buffer.size, 16);
  }

  #[test]
  fn conditional_members_keep_their_guards(){
    let source = "
struct VSIn {
  float3 Position : POSITION;
#ifdef SKIN
  float4 Weights : BLENDWEIGHT;
#endif
  float2 UV : TEXCOORD0;
};
cbuffer Bones {
  float Count;
#ifdef SKIN
  float4x4 Palette[2];
#endif
};
float4 Main(VSIn IN) : SV_Position { return float4(IN.Position, Count); }
";
    let description = describe(source, ShaderStage::Vertex).unwrap();
    let weights = &description.inputs[1];
    assert_eq!(weights.tag, SemanticTag::Vertex(Semantic::BlendWeight, 0));
    assert_eq!(weights.guard.wrap(""), "#ifdef SKIN\n#endif\n");
    // conditional members still take a slot
    assert_eq!(weights.location, Some(1));
    assert_eq!(description.inputs[2].location, Some(2));
    assert!(description.inputs[2].guard.is_empty());
    assert!(description.semantic_mask.contains(Semantic::BlendWeight, 0));

    let bones = description.constant_buffer("Bones").unwrap();
    assert!(bones.members[0].guard.is_empty());
    assert_eq!((bones.members[1].offset, bones.members[1].guard.is_empty()), (16, false));
  }

  #[test]
  fn high_semantic_indices_outside_vertex_inputs(){
    let pixel = "float4 Main(float2 uv : TEXCOORD9) : SV_Target { return float4(uv, 0, 1); }";
    let description = describe(pixel, ShaderStage::Pixel).unwrap();
    assert_eq!(description.inputs[0].tag, SemanticTag::Vertex(Semantic::TexCoord, 9));
    assert!(description.semantic_mask.is_empty());

    let vertex_output = "
struct VSOut { float4 Position : SV_Position; float2 UV : TEXCOORD9; };
VSOut Main(float3 p : POSITION) { VSOut o; o.Position = float4(p, 1.0); o.UV = 0; return o; }
";
    let description = describe(vertex_output, ShaderStage::Vertex).unwrap();
    assert_eq!(description.outputs[1].tag, SemanticTag::Vertex(Semantic::TexCoord, 9));
    assert_eq!(description.semantic_mask.iter().collect::<Vec<_>>(), vec![(Semantic::Position, 0)]);

    let vertex_input = "float4 Main(float2 uv : TEXCOORD9) : SV_Position { return float4(uv, 0, 1); }";
    let error = describe(vertex_input, ShaderStage::Vertex).unwrap_err();
    assert_eq!(error, ValidationError::UnknownSemantic { name: "uv".into(), semantic: "TEXCOORD9".into() });
  }

  #[test]
  fn resource_slots_per_kind(){
    let source = "Texture2D A; SamplerState S; TextureCube B; SamplerComparisonState C;
float4 Main() : SV_Target { return 0; }";
    let description = describe(source, ShaderStage::Pixel).unwrap();
    let textures: Vec<_> = description.textures.iter().map(|t| (t.name.as_str(), t.slot)).collect();
    let samplers: Vec<_> = description.samplers.iter().map(|s| (s.name.as_str(), s.slot)).collect();
    assert_eq!(textures, vec![("A", 0), ("B", 1)]);
    assert_eq!(samplers, vec![("S", 0), ("C", 1)]);
    assert!(description.constant_buffers.is_empty());
  }

  #[test]
  fn validation_is_deterministic(){
    let first = describe(VERTEX, ShaderStage::Vertex).unwrap();
    let second = describe(VERTEX, ShaderStage::Vertex).unwrap();
    assert_eq!(first, second);
    assert_eq!(format!("{:?}", first), format!("{:?}", second));
  }

  #[test]
  fn duplicate_entry_in_one_block(){
    let source = "#if A\nvoid Main() {}\nvoid Main() {}\n#endif\n";
    let error = describe(source, ShaderStage::Vertex).unwrap_err();
    assert_eq!(error, ValidationError::DuplicateEntryPoint("Main".into()));
  }

  #[test]
  fn parse_stage_names(){
    assert_eq!("Pixel".parse::<ShaderStage>(), Ok(ShaderStage::Pixel));
    assert_eq!("fragment".parse::<ShaderStage>(), Ok(ShaderStage::Pixel));
    assert!("tessellation".parse::<ShaderStage>().is_err());
  }
}
