use std::sync::OnceLock;

use ahash::AHashSet;

use crate::ast::{BodyItem, Declaration, Function, Interpolation, ParameterModifier, ShaderScope, GLOBALS_BUFFER};
use crate::error::GenerationError;
use crate::semantics::{SemanticTag, SystemValue};
use crate::types::{ScalarKind, TextureKind, Type};
use crate::validate::{ConstantBufferLayout, ElementSource, InterfaceElement, ShaderInstanceDescription, ShaderStage};

use super::{emit_declarations, emit_directives, mangle, render_block, render_inline, translate, Backend, Dialect, TargetProfile};

static RESERVED: OnceLock<AHashSet<&'static str>> = OnceLock::new();

/// C++ and Metal words that are plain identifiers in HLSL.
fn is_reserved(word: &str)->bool{
  RESERVED.get_or_init(|| {
    [
      "auto", "class", "delete", "new", "namespace", "operator", "private", "protected", "public", "template",
      "this", "throw", "try", "catch", "typename", "using", "virtual", "friend", "explicit", "mutable",
      "constexpr", "nullptr", "union", "enum", "typedef", "goto", "sizeof", "alignas", "alignof", "decltype",
      "static_assert", "thread_local", "device", "constant", "thread", "threadgroup", "kernel", "vertex",
      "fragment", "metal", "main", "mix", "fract", "dfdx", "dfdy", "sample", "texture", "stage_input",
      "stage_output", "entry_result",
    ].into_iter().collect()
  }).contains(word) || word.contains("__")
}

fn name(word: &str)->String{
  if is_reserved(word) { mangle(word) } else { word.to_owned() }
}

fn buffer_type(layout: &ConstantBufferLayout)->String{
  if layout.is_globals() { "Globals".to_owned() } else { name(&layout.name) }
}

fn buffer_parameter(layout: &ConstantBufferLayout)->String{
  format!("cb_{}", buffer_type(layout))
}

fn system_field(tag: &SemanticTag)->String{
  format!("sv_{}", tag.canonical_name().trim_start_matches("SV_"))
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ DIALECT ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

struct MetalDialect<'a>{
  description: &'a ShaderInstanceDescription,
  scope: &'a ShaderScope,
  /// Resources are only reachable from the entry point, which receives them
  /// as parameters.
  entry: bool,
  /// Parameters and locals of the function being translated. They shadow
  /// constant buffer members and resources.
  locals: AHashSet<String>,
}

impl<'a> MetalDialect<'a>{
  fn new(description: &'a ShaderInstanceDescription, scope: &'a ShaderScope, entry: bool)->Self{
    Self { description, scope, entry, locals: AHashSet::new() }
  }

  /// The parameter names of `function` and every name declared in its body,
  /// that is an identifier following a type name.
  fn declared_names(&self, function: &Function)->AHashSet<String>{
    let mut names: AHashSet<String> = function.parameters.iter().map(|p| p.name.clone()).collect();
    let lexemes: Vec<_> = function.body.iter()
      .filter_map(|item| match item {
        BodyItem::Token(lexeme) => Some(lexeme),
        BodyItem::Directive(_) => None,
      })
      .collect();
    for pair in lexemes.windows(2){
      let (ty, declared) = (pair[0], pair[1]);
      if !ty.is_identifier() || !declared.is_identifier() {
        continue;
      }
      let is_type = match Type::from_name(&ty.raw_text) {
        Type::Struct(struct_name) => self.scope.find_struct(&struct_name).is_some(),
        Type::Void => false,
        _ => true,
      };
      if is_type {
        names.insert(declared.raw_text.clone());
      }
    }
    names
  }

  fn unsupported(&self, construct: impl Into<String>)->GenerationError{
    GenerationError::construct(TargetProfile::Metal, construct)
  }

  fn metal_type(&self, ty: &Type)->Result<String, GenerationError>{
    let scalar = |kind: ScalarKind| match kind {
      ScalarKind::Double => Err(self.unsupported("double")),
      kind => Ok(kind.hlsl_name()),
    };
    Ok(match ty {
      Type::Void => "void".to_owned(),
      Type::Scalar(kind) => scalar(*kind)?.to_owned(),
      Type::Vector(kind, dim) => format!("{}{}", scalar(*kind)?, dim.count()),
      Type::Matrix(kind @ (ScalarKind::Float | ScalarKind::Half), rows, columns) =>
        format!("{}{}x{}", kind.hlsl_name(), columns.count(), rows.count()),
      Type::Matrix(kind, _, _) => return Err(self.unsupported(format!("{} matrices", kind.hlsl_name()))),
      Type::Texture(kind) => match kind {
        TextureKind::Texture1D => "texture1d<float>",
        TextureKind::Texture2D => "texture2d<float>",
        TextureKind::Texture3D => "texture3d<float>",
        TextureKind::TextureCube => "texturecube<float>",
        TextureKind::Texture2DArray => "texture2d_array<float>",
      }.to_owned(),
      Type::Sampler(_) => "sampler".to_owned(),
      Type::Struct(struct_name) => name(struct_name),
    })
  }

  fn buffer_of(&self, member: &str)->Option<&'a ConstantBufferLayout>{
    self.description.constant_buffers.iter().find(|b| b.member(member).is_some())
  }

  fn is_resource(&self, word: &str)->bool{
    self.description.texture(word).is_some() || self.description.sampler(word).is_some()
  }
}

impl Dialect for MetalDialect<'_>{
  fn target(&self)->TargetProfile{
    TargetProfile::Metal
  }

  fn word(&self, word: &str, member: bool)->Result<String, GenerationError>{
    if member {
      return Ok(name(word));
    }
    if let ty @ (Type::Scalar(_) | Type::Vector(..) | Type::Matrix(..)) = Type::from_name(word) {
      return self.metal_type(&ty);
    }
    if self.locals.contains(word) {
      return Ok(name(word));
    }
    let buffer = self.buffer_of(word);
    if (buffer.is_some() || self.is_resource(word)) && !self.entry {
      return Err(self.unsupported(format!("resource '{}' used outside the entry point", word)));
    }
    Ok(match buffer {
      Some(layout) => format!("{}.{}", buffer_parameter(layout), name(word)),
      None => name(word),
    })
  }

  fn call(&self, function: &str, args: &[String])->Result<Option<String>, GenerationError>{
    let renamed = match function {
      "lerp" => "mix",
      "frac" => "fract",
      "ddx" => "dfdx",
      "ddy" => "dfdy",
      "mul" if args.len() == 2 => return Ok(Some(format!("({} * {})", args[0], args[1]))),
      "clip" | "tex2D" | "tex2Dlod" | "texCUBE" => return Err(self.unsupported(format!("intrinsic '{}'", function))),
      _ => return Ok(None),
    };
    Ok(Some(format!("{}({})", renamed, args.join(", "))))
  }

  fn method(&self, object: &str, method: &str, args: &[String])->Result<Option<String>, GenerationError>{
    if self.description.texture(object).is_none() {
      return Ok(None);
    }
    Ok(Some(match (method, args) {
      ("Sample", [sampler, uv]) => format!("{}.sample({}, {})", object, sampler, uv),
      ("SampleLevel", [sampler, uv, lod]) => format!("{}.sample({}, {}, level({}))", object, sampler, uv, lod),
      ("SampleBias", [sampler, uv, bias]) => format!("{}.sample({}, {}, bias({}))", object, sampler, uv, bias),
      _ => return Err(self.unsupported(format!("texture method '{}' with {} arguments", method, args.len()))),
    }))
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ DECLARATIONS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

fn array_suffix(array: Option<u32>)->String{
  array.map(|n| format!("[{}]", n)).unwrap_or_default()
}

impl MetalDialect<'_>{
  fn buffer_struct(&self, layout: &ConstantBufferLayout, out: &mut String)->Result<(), GenerationError>{
    out.push_str(&format!("struct {} {{\n", buffer_type(layout)));
    for member in &layout.members{
      if member.row_major {
        return Err(self.unsupported("row_major matrices"));
      }
      let line = format!("  {} {}{};\n", self.metal_type(&member.ty)?, name(&member.name), array_suffix(member.array));
      out.push_str(&member.guard.wrap(&line));
    }
    out.push_str("};\n");
    Ok(())
  }

  /// Extra parameters giving the entry point access to every resource.
  fn resource_parameters(&self)->Result<Vec<(String, String)>, GenerationError>{
    let mut parameters = vec![];
    for layout in &self.description.constant_buffers{
      parameters.push((format!("constant {}&", buffer_type(layout)), buffer_parameter(layout)));
    }
    for resource in self.description.textures.iter().chain(&self.description.samplers){
      parameters.push((self.metal_type(&resource.ty)?, name(&resource.name)));
    }
    Ok(parameters)
  }

  fn function(&self, function: &Function, out: &mut String)->Result<(), GenerationError>{
    let mut parameters = vec![];
    for parameter in &function.parameters{
      let ty = self.metal_type(&parameter.ty)?;
      parameters.push(match parameter.modifier {
        ParameterModifier::In => format!("{} {}", ty, name(&parameter.name)),
        ParameterModifier::Out | ParameterModifier::InOut => format!("thread {}& {}", ty, name(&parameter.name)),
        ParameterModifier::Uniform => return Err(self.unsupported("uniform parameters")),
      });
    }
    let function_name = if function.is_entry_point {
      for (ty, parameter) in self.resource_parameters()?{
        parameters.push(format!("{} {}", ty, parameter));
      }
      format!("{}_impl", name(&function.name))
    } else {
      name(&function.name)
    };
    let scoped = MetalDialect { locals: self.declared_names(function), ..*self };
    let body = render_block(&translate(&function.body, &scoped)?, 1);
    out.push_str(&format!(
      "{} {}({}) {{\n{}}}\n\n",
      self.metal_type(&function.return_type)?, function_name, parameters.join(", "), body
    ));
    Ok(())
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ WRAPPER ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

fn interpolation_attribute(element: &InterfaceElement)->&'static str{
  match element.interpolation {
    Some(Interpolation::NoInterpolation) => ", flat",
    Some(Interpolation::Centroid) => ", centroid_perspective",
    Some(Interpolation::NoPerspective) => ", center_no_perspective",
    _ => "",
  }
}

/// Where the stage function finds an input.
enum InputSlot{
  /// A field of the `[[stage_in]]` struct, with its declaration.
  StageIn(String, String),
  /// A parameter of the stage function, with its declaration.
  Parameter(String, String),
}

impl MetalDialect<'_>{
  fn input_slot(&self, stage: ShaderStage, element: &InterfaceElement)->Result<InputSlot, GenerationError>{
    let ty = self.metal_type(&element.ty)?;
    let canonical = element.tag.canonical_name();
    Ok(match (stage, element.tag) {
      (ShaderStage::Vertex, SemanticTag::Vertex(..)) => {
        let field = format!("in_{}", canonical);
        let location = element.location.unwrap_or_default();
        InputSlot::StageIn(field.clone(), format!("{} {} [[attribute({})]]", ty, field, location))
      }
      (_, SemanticTag::Vertex(..)) => {
        let field = format!("v_{}", canonical);
        InputSlot::StageIn(field.clone(), format!("{} {} [[user({}){}]]", ty, field, canonical, interpolation_attribute(element)))
      }
      (ShaderStage::Pixel, SemanticTag::System(SystemValue::Position, _)) => {
        let field = system_field(&element.tag);
        InputSlot::StageIn(field.clone(), format!("float4 {} [[position]]", field))
      }
      (ShaderStage::Vertex, SemanticTag::System(value @ (SystemValue::VertexId | SystemValue::InstanceId), _)) => {
        let field = system_field(&element.tag);
        let attribute = if value == SystemValue::VertexId { "vertex_id" } else { "instance_id" };
        InputSlot::Parameter(field.clone(), format!("uint {} [[{}]]", field, attribute))
      }
      (ShaderStage::Pixel, SemanticTag::System(SystemValue::IsFrontFace, _)) => {
        let field = system_field(&element.tag);
        InputSlot::Parameter(field.clone(), format!("bool {} [[front_facing]]", field))
      }
      _ => return Err(self.unsupported(format!("{} stage input '{}'", stage, element.semantic_name))),
    })
  }

  /// Field name and declaration of an output in the returned struct.
  fn output_field(&self, stage: ShaderStage, element: &InterfaceElement)->Result<(String, String), GenerationError>{
    let ty = self.metal_type(&element.ty)?;
    let canonical = element.tag.canonical_name();
    let field = match element.tag {
      SemanticTag::Vertex(..) => format!("v_{}", canonical),
      SemanticTag::System(..) => system_field(&element.tag),
    };
    let attribute = match (stage, element.tag) {
      (ShaderStage::Vertex, SemanticTag::Vertex(..)) => format!("user({}){}", canonical, interpolation_attribute(element)),
      (ShaderStage::Vertex, SemanticTag::System(SystemValue::Position, _)) => "position".to_owned(),
      (ShaderStage::Pixel, SemanticTag::System(SystemValue::Target, index)) => format!("color({})", index),
      (ShaderStage::Pixel, SemanticTag::System(SystemValue::Depth, _)) => "depth(any)".to_owned(),
      _ => return Err(self.unsupported(format!("{} stage output '{}'", stage, element.semantic_name))),
    };
    Ok((field.clone(), format!("{} {} [[{}]]", ty, field, attribute)))
  }

  fn value_of(source: &ElementSource)->String{
    match source {
      ElementSource::Return => "entry_result".to_owned(),
      ElementSource::ReturnField(field) => format!("entry_result.{}", name(field)),
      ElementSource::Parameter(parameter) => name(parameter),
      ElementSource::Field { parameter, field } => format!("{}.{}", name(parameter), name(field)),
    }
  }

  /// The `vertex` or `fragment` function named after the entry point. It
  /// gathers the stage inputs, calls the entry point and fills the outputs.
  fn stage_function(&self, entry: &Function, out: &mut String)->Result<(), GenerationError>{
    let stage = self.description.stage;
    let entry_name = name(&entry.name);
    let (input_struct, output_struct) = (format!("{}_Input", entry_name), format!("{}_Output", entry_name));

    let mut stage_in = String::new();
    let mut parameters = vec![];
    let mut reads = vec![];
    for input in &self.description.inputs{
      let value = match self.input_slot(stage, input)? {
        InputSlot::StageIn(field, declaration) => {
          stage_in.push_str(&input.guard.wrap(&format!("  {};\n", declaration)));
          format!("stage_input.{}", field)
        }
        InputSlot::Parameter(field, declaration) => {
          parameters.push(declaration);
          field
        }
      };
      reads.push((input, format!("{}({})", self.metal_type(&input.ty)?, value)));
    }
    let mut outputs = String::new();
    let mut writes = vec![];
    for output in &self.description.outputs{
      let (field, declaration) = self.output_field(stage, output)?;
      outputs.push_str(&output.guard.wrap(&format!("  {};\n", declaration)));
      writes.push(output.guard.wrap(&format!("  stage_output.{} = {};\n", field, Self::value_of(&output.source))));
    }

    if !stage_in.is_empty() {
      out.push_str(&format!("struct {} {{\n{}}};\n\n", input_struct, stage_in));
      parameters.insert(0, format!("{} stage_input [[stage_in]]", input_struct));
    }
    if !outputs.is_empty() {
      out.push_str(&format!("struct {} {{\n{}}};\n\n", output_struct, outputs));
    }
    let layouts = self.description.constant_buffers.iter().map(|l| (l, format!("buffer({})", l.slot)));
    for (layout, attribute) in layouts{
      parameters.push(format!("constant {}& {} [[{}]]", buffer_type(layout), buffer_parameter(layout), attribute));
    }
    for texture in &self.description.textures{
      parameters.push(format!("{} {} [[texture({})]]", self.metal_type(&texture.ty)?, name(&texture.name), texture.slot));
    }
    for sampler in &self.description.samplers{
      parameters.push(format!("sampler {} [[sampler({})]]", name(&sampler.name), sampler.slot));
    }

    let qualifier = if stage == ShaderStage::Vertex { "vertex" } else { "fragment" };
    let returns = if outputs.is_empty() { "void".to_owned() } else { output_struct.clone() };
    out.push_str(&format!("{} {} {}({}) {{\n", qualifier, returns, entry_name, parameters.join(", ")));

    let mut arguments = vec![];
    for parameter in &entry.parameters{
      let local = name(&parameter.name);
      out.push_str(&format!("  {} {};\n", self.metal_type(&parameter.ty)?, local));
      if matches!(parameter.modifier, ParameterModifier::In | ParameterModifier::InOut) {
        for (input, value) in &reads{
          let owned = match &input.source {
            ElementSource::Parameter(owner) | ElementSource::Field { parameter: owner, .. } => owner == &parameter.name,
            _ => false,
          };
          if owned {
            out.push_str(&input.guard.wrap(&format!("  {} = {};\n", Self::value_of(&input.source), value)));
          }
        }
      }
      arguments.push(local);
    }
    for (_, parameter) in self.resource_parameters()?{
      arguments.push(parameter);
    }
    let call = format!("{}_impl({})", entry_name, arguments.join(", "));
    match &entry.return_type {
      Type::Void => out.push_str(&format!("  {};\n", call)),
      ty => out.push_str(&format!("  {} entry_result = {};\n", self.metal_type(ty)?, call)),
    }
    if !outputs.is_empty() {
      out.push_str(&format!("  {} stage_output;\n", output_struct));
      for write in writes{
        out.push_str(&write);
      }
      out.push_str("  return stage_output;\n");
    }
    out.push_str("}\n");
    Ok(())
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ BACKEND ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Generates Metal Shading Language. Constant buffers become structs passed
/// by reference, and the entry point is wrapped into a stage function.
pub struct MetalBackend;

impl Backend for MetalBackend{
  fn target(&self)->TargetProfile{
    TargetProfile::Metal
  }

  fn generate(&self, scope: &ShaderScope, description: &ShaderInstanceDescription)->Result<String, GenerationError>{
    let stage = description.stage;
    if !matches!(stage, ShaderStage::Vertex | ShaderStage::Pixel) {
      return Err(GenerationError::UnsupportedStage { target: TargetProfile::Metal, stage });
    }
    let helpers = MetalDialect::new(description, scope, false);
    let entry_dialect = MetalDialect::new(description, scope, true);
    let entry = scope.entry_function()
      .ok_or_else(|| helpers.unsupported(format!("missing entry point '{}'", description.entry_point)))?;

    let mut out = String::from("#include <metal_stdlib>\nusing namespace metal;\n\n");
    if let Some(globals) = description.constant_buffer(GLOBALS_BUFFER) {
      helpers.buffer_struct(globals, &mut out)?;
    }
    emit_declarations(scope, &mut out, |declaration, out| {
      match declaration {
        Declaration::Struct(decl) => {
          out.push_str(&format!("struct {} {{\n", name(&decl.name)));
          for field in &decl.fields{
            emit_directives(&field.directives, out);
            out.push_str(&format!("  {} {}{};\n", helpers.metal_type(&field.ty)?, name(&field.name), array_suffix(field.array)));
          }
          emit_directives(&decl.trailing_directives, out);
          out.push_str("};\n");
        }
        Declaration::ConstantBuffer(buffer) => {
          if let Some(layout) = description.constant_buffer(&buffer.name) {
            helpers.buffer_struct(layout, out)?;
          }
        }
        // members of the globals struct, or parameters of the entry point
        Declaration::Global(_) | Declaration::Resource(_) => (),
        Declaration::Constant(constant) => {
          let value = render_inline(&translate(&constant.initializer, &helpers)?);
          out.push_str(&format!(
            "constant {} {}{} = {};\n",
            helpers.metal_type(&constant.ty)?, name(&constant.name), array_suffix(constant.array), value
          ));
        }
        Declaration::Function(function) if function.is_entry_point => entry_dialect.function(function, out)?,
        Declaration::Function(function) => helpers.function(function, out)?,
        Declaration::Directive(directive) => out.push_str(&format!("#{}\n", directive.text)),
      }
      Ok(())
    })?;
    entry_dialect.stage_function(entry, &mut out)?;
    Ok(out)
  }
}
