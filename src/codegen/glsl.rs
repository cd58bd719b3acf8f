use std::sync::OnceLock;

use ahash::AHashSet;

use crate::ast::{
  BodyItem, Constant, ConstantBuffer, Declaration, Function, Interpolation, ParameterModifier, ShaderScope,
  StructDecl, Variable,
};
use crate::error::GenerationError;
use crate::lexeme::{ContentType, Lexeme};
use crate::semantics::{SemanticTag, SystemValue};
use crate::types::{ScalarKind, TextureKind, Type};
use crate::validate::{ElementSource, InterfaceElement, ShaderInstanceDescription, ShaderStage};

use super::{emit_declarations, emit_directives, mangle, render_block, render_inline, translate, Backend, Dialect, GlslProfile, TargetProfile, Token};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ RESERVED WORDS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// GLSL keywords and built-in functions that are plain identifiers in HLSL.
static RESERVED: OnceLock<AHashSet<String>> = OnceLock::new();

fn reserved()->&'static AHashSet<String>{
  RESERVED.get_or_init(|| {
    let words = [
      "attribute", "varying", "uniform", "buffer", "shared", "layout", "centroid", "flat", "smooth",
      "noperspective", "patch", "sample", "subroutine", "invariant", "precise", "highp", "mediump", "lowp",
      "precision", "coherent", "volatile", "restrict", "readonly", "writeonly", "input", "output", "filter",
      "active", "common", "partition", "superp", "union", "enum", "typedef", "template", "this", "goto",
      "inline", "noinline", "public", "external", "interface", "long", "short", "fixed", "unsigned", "main",
      "texture", "texture2D", "texture3D", "textureCube", "textureLod", "texelFetch", "mix", "fract", "mod",
      "dFdx", "dFdy", "inversesqrt", "sampler1D", "sampler2D", "sampler3D", "samplerCube", "sampler2DArray",
      "sampler2DShadow", "image2D", "atomic_uint", "entry_result",
    ];
    let mut set: AHashSet<String> = words.iter().map(|w| w.to_string()).collect();
    for n in 2..=4{
      for prefix in ["", "i", "u", "b", "d"]{
        set.insert(format!("{}vec{}", prefix, n));
      }
      set.insert(format!("mat{}", n));
      set.insert(format!("dmat{}", n));
      for m in 2..=4{
        set.insert(format!("mat{}x{}", n, m));
        set.insert(format!("dmat{}x{}", n, m));
      }
    }
    set
  })
}

fn is_reserved(word: &str)->bool{
  word.starts_with("gl_") || word.contains("__") || reserved().contains(word)
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ DIALECT ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

struct GlslDialect{
  profile: GlslProfile,
  /// Translated texture names and their kinds.
  textures: Vec<(String, TextureKind)>,
}

impl GlslDialect{
  fn new(profile: GlslProfile, description: &ShaderInstanceDescription)->Self{
    let mut dialect = Self { profile, textures: vec![] };
    let textures = description.textures.iter()
      .filter_map(|t| match t.ty {
        Type::Texture(kind) => Some((dialect.name(&t.name), kind)),
        _ => None,
      })
      .collect();
    dialect.textures = textures;
    dialect
  }

  fn unsupported(&self, construct: impl Into<String>)->GenerationError{
    GenerationError::construct(self.target(), construct)
  }

  /// A user identifier, renamed if it is reserved in GLSL.
  fn name(&self, name: &str)->String{
    if is_reserved(name) { mangle(name) } else { name.to_owned() }
  }

  fn scalar(&self, kind: ScalarKind)->Result<&'static str, GenerationError>{
    match kind {
      ScalarKind::Uint if self.profile == GlslProfile::Es2 => Err(self.unsupported("uint")),
      ScalarKind::Double if self.profile.is_es() => Err(self.unsupported("double")),
      ScalarKind::Bool => Ok("bool"),
      ScalarKind::Int => Ok("int"),
      ScalarKind::Uint => Ok("uint"),
      ScalarKind::Half | ScalarKind::Float => Ok("float"),
      ScalarKind::Double => Ok("double"),
    }
  }

  fn glsl_type(&self, ty: &Type)->Result<String, GenerationError>{
    Ok(match ty {
      Type::Void => "void".to_owned(),
      Type::Scalar(kind) => self.scalar(*kind)?.to_owned(),
      Type::Vector(kind, dim) => {
        self.scalar(*kind)?;
        let prefix = match kind {
          ScalarKind::Bool => "b",
          ScalarKind::Int => "i",
          ScalarKind::Uint => "u",
          ScalarKind::Half | ScalarKind::Float => "",
          ScalarKind::Double => "d",
        };
        format!("{}vec{}", prefix, dim.count())
      }
      // an HLSL matrix with R rows and C columns has C columns of R rows in GLSL
      Type::Matrix(kind, rows, columns) => {
        let prefix = match kind {
          ScalarKind::Half | ScalarKind::Float => "",
          ScalarKind::Double if !self.profile.is_es() => "d",
          _ => return Err(self.unsupported(format!("{} matrices", kind.hlsl_name()))),
        };
        if self.profile == GlslProfile::Es2 && rows != columns {
          return Err(self.unsupported("non-square matrices"));
        }
        if rows == columns {
          format!("{}mat{}", prefix, rows.count())
        } else {
          format!("{}mat{}x{}", prefix, columns.count(), rows.count())
        }
      }
      Type::Texture(kind) => self.sampler_type(*kind)?.to_owned(),
      Type::Sampler(_) => return Err(self.unsupported("separate sampler objects")),
      Type::Struct(name) => self.name(name),
    })
  }

  fn sampler_type(&self, kind: TextureKind)->Result<&'static str, GenerationError>{
    match kind {
      TextureKind::Texture1D if self.profile.is_es() => Err(self.unsupported("Texture1D")),
      TextureKind::Texture3D | TextureKind::Texture2DArray if self.profile == GlslProfile::Es2 =>
        Err(self.unsupported(kind.hlsl_name())),
      TextureKind::Texture1D => Ok("sampler1D"),
      TextureKind::Texture2D => Ok("sampler2D"),
      TextureKind::Texture3D => Ok("sampler3D"),
      TextureKind::TextureCube => Ok("samplerCube"),
      TextureKind::Texture2DArray => Ok("sampler2DArray"),
    }
  }

  fn array_suffix(array: Option<u32>)->String{
    array.map(|n| format!("[{}]", n)).unwrap_or_default()
  }

  /// Interpolation qualifier of a varying, with a trailing space.
  fn interpolation(&self, element: &InterfaceElement)->Result<&'static str, GenerationError>{
    let integer = matches!(element.ty.scalar_kind(), Some(ScalarKind::Int | ScalarKind::Uint | ScalarKind::Bool));
    if self.profile == GlslProfile::Es2 {
      if integer || element.interpolation == Some(Interpolation::NoInterpolation) {
        return Err(self.unsupported(format!("flat varying '{}'", element.semantic_name)));
      }
      return Ok("");
    }
    Ok(match element.interpolation {
      _ if integer => "flat ",
      Some(Interpolation::NoInterpolation) => "flat ",
      Some(Interpolation::Centroid) => "centroid ",
      Some(Interpolation::NoPerspective) if self.profile.is_es() => {
        return Err(self.unsupported("noperspective"));
      }
      Some(Interpolation::NoPerspective) => "noperspective ",
      Some(Interpolation::Linear) | None => "",
    })
  }

  fn texture_kind(&self, object: &str)->Option<TextureKind>{
    self.textures.iter().find(|(name, _)| name == object).map(|(_, kind)| *kind)
  }

  fn sample_function(&self, kind: TextureKind)->&'static str{
    match (self.profile, kind) {
      (GlslProfile::Es2, TextureKind::TextureCube) => "textureCube",
      (GlslProfile::Es2, _) => "texture2D",
      _ => "texture",
    }
  }
}

impl Dialect for GlslDialect{
  fn target(&self)->TargetProfile{
    TargetProfile::Glsl(self.profile)
  }

  fn word(&self, word: &str, member: bool)->Result<String, GenerationError>{
    if !member {
      match Type::from_name(word) {
        Type::Struct(_) => (),
        ty => return self.glsl_type(&ty),
      }
    }
    Ok(self.name(word))
  }

  fn number(&self, lexeme: &Lexeme)->Result<String, GenerationError>{
    let raw = lexeme.raw_text.as_str();
    if lexeme.content_type == ContentType::FloatConstant {
      let digits = raw.trim_end_matches(['f', 'F', 'h', 'H', 'l', 'L']);
      let exponent = !digits.starts_with("0x") && digits.contains(['e', 'E']);
      return Ok(if digits.contains('.') || exponent { digits.to_owned() } else { format!("{}.0", digits) });
    }
    let digits = raw.trim_end_matches(['l', 'L']);
    if digits.ends_with(['u', 'U']) && self.profile == GlslProfile::Es2 {
      return Err(self.unsupported("uint"));
    }
    Ok(digits.to_owned())
  }

  fn call(&self, name: &str, args: &[String])->Result<Option<String>, GenerationError>{
    let renamed = match name {
      "lerp" => "mix",
      "frac" => "fract",
      "ddx" => "dFdx",
      "ddy" => "dFdy",
      "rsqrt" => "inversesqrt",
      "atan2" => "atan",
      "fmod" => "mod",
      "saturate" if args.len() == 1 => return Ok(Some(format!("clamp({}, 0.0, 1.0)", args[0]))),
      "mul" if args.len() == 2 => return Ok(Some(format!("({} * {})", args[0], args[1]))),
      "clip" | "tex2D" | "tex2Dlod" | "texCUBE" => return Err(self.unsupported(format!("intrinsic '{}'", name))),
      _ => return Ok(None),
    };
    Ok(Some(format!("{}({})", renamed, args.join(", "))))
  }

  fn method(&self, object: &str, method: &str, args: &[String])->Result<Option<String>, GenerationError>{
    let kind = match self.texture_kind(object) {
      Some(kind) => kind,
      None => return Ok(None),
    };
    let es2 = self.profile == GlslProfile::Es2;
    Ok(Some(match (method, args) {
      ("Sample", [_, uv]) => format!("{}({}, {})", self.sample_function(kind), object, uv),
      ("SampleBias", [_, uv, bias]) => format!("{}({}, {}, {})", self.sample_function(kind), object, uv, bias),
      ("SampleLevel", [_, uv, lod]) if !es2 => format!("textureLod({}, {}, {})", object, uv, lod),
      _ => return Err(self.unsupported(format!("texture method '{}' with {} arguments", method, args.len()))),
    }))
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ DECLARATIONS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl GlslDialect{
  fn declaration(&self, declaration: &Declaration, description: &ShaderInstanceDescription, out: &mut String)->Result<(), GenerationError>{
    match declaration {
      Declaration::Struct(decl) => self.struct_declaration(decl, out),
      Declaration::ConstantBuffer(buffer) => self.constant_buffer(buffer, description, out),
      Declaration::Global(variable) => {
        if variable.row_major {
          return Err(self.unsupported("row_major matrices outside a cbuffer"));
        }
        out.push_str(&format!("uniform {} {}{};\n", self.glsl_type(&variable.ty)?, self.name(&variable.name), Self::array_suffix(variable.array)));
        Ok(())
      }
      Declaration::Resource(resource) => {
        if let Type::Texture(_) = resource.ty {
          let binding = match (self.profile, description.texture(&resource.name)) {
            (GlslProfile::Desktop430, Some(texture)) => format!("layout(binding = {}) ", texture.slot),
            _ => String::new(),
          };
          out.push_str(&format!("{}uniform {} {};\n", binding, self.glsl_type(&resource.ty)?, self.name(&resource.name)));
        }
        // samplers are combined with their textures
        Ok(())
      }
      Declaration::Constant(constant) => self.constant(constant, out),
      Declaration::Function(function) => self.function(function, out),
      Declaration::Directive(directive) => {
        out.push_str(&format!("#{}\n", directive.text));
        Ok(())
      }
    }
  }

  fn struct_declaration(&self, decl: &StructDecl, out: &mut String)->Result<(), GenerationError>{
    out.push_str(&format!("struct {} {{\n", self.name(&decl.name)));
    for field in &decl.fields{
      emit_directives(&field.directives, out);
      out.push_str(&format!("  {} {}{};\n", self.glsl_type(&field.ty)?, self.name(&field.name), Self::array_suffix(field.array)));
    }
    emit_directives(&decl.trailing_directives, out);
    out.push_str("};\n");
    Ok(())
  }

  fn member(&self, member: &Variable, block: bool)->Result<String, GenerationError>{
    let layout = match (member.row_major, block) {
      (true, true) => "layout(row_major) ",
      (true, false) => return Err(self.unsupported("row_major matrices without uniform blocks")),
      (false, _) => "",
    };
    let storage = if block { "  " } else { "uniform " };
    Ok(format!("{}{}{} {}{};\n", storage, layout, self.glsl_type(&member.ty)?, self.name(&member.name), Self::array_suffix(member.array)))
  }

  fn constant_buffer(&self, buffer: &ConstantBuffer, description: &ShaderInstanceDescription, out: &mut String)->Result<(), GenerationError>{
    if self.profile == GlslProfile::Es2 {
      for member in &buffer.members{
        emit_directives(&member.directives, out);
        out.push_str(&self.member(member, false)?);
      }
      emit_directives(&buffer.trailing_directives, out);
      return Ok(());
    }
    let layout = match (self.profile, description.constant_buffer(&buffer.name)) {
      (GlslProfile::Desktop430, Some(layout)) => format!("std140, binding = {}", layout.slot),
      _ => "std140".to_owned(),
    };
    out.push_str(&format!("layout({}) uniform {} {{\n", layout, self.name(&buffer.name)));
    for member in &buffer.members{
      emit_directives(&member.directives, out);
      out.push_str(&self.member(member, true)?);
    }
    emit_directives(&buffer.trailing_directives, out);
    out.push_str("};\n");
    Ok(())
  }

  fn constant(&self, constant: &Constant, out: &mut String)->Result<(), GenerationError>{
    let ty = self.glsl_type(&constant.ty)?;
    let tokens = translate(&constant.initializer, self)?;
    let value = match (constant.array, tokens.first(), tokens.last()) {
      (Some(count), Some(Token::Punct(open)), Some(Token::Punct(close))) if open == "{" && close == "}" => {
        if self.profile == GlslProfile::Es2 {
          return Err(self.unsupported("constant arrays"));
        }
        let inner = &tokens[1..tokens.len() - 1];
        if inner.iter().any(|t| matches!(t, Token::Punct(p) if p == "{")) {
          return Err(self.unsupported("nested initializer lists"));
        }
        format!("{}[{}]({})", ty, count, render_inline(inner))
      }
      _ => render_inline(&tokens),
    };
    out.push_str(&format!("const {} {}{} = {};\n", ty, self.name(&constant.name), Self::array_suffix(constant.array), value));
    Ok(())
  }

  fn function(&self, function: &Function, out: &mut String)->Result<(), GenerationError>{
    let mut parameters = vec![];
    for parameter in &function.parameters{
      let qualifier = match parameter.modifier {
        ParameterModifier::In => "",
        ParameterModifier::Out => "out ",
        ParameterModifier::InOut => "inout ",
        ParameterModifier::Uniform => return Err(self.unsupported("uniform parameters")),
      };
      parameters.push(format!("{}{} {}", qualifier, self.glsl_type(&parameter.ty)?, self.name(&parameter.name)));
    }
    let body = render_block(&translate(&function.body, self)?, 1);
    out.push_str(&format!(
      "{} {}({}) {{\n{}}}\n\n",
      self.glsl_type(&function.return_type)?, self.name(&function.name), parameters.join(", "), body
    ));
    Ok(())
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ STAGE INTERFACE ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

fn varying_name(tag: &SemanticTag)->String{
  format!("v_{}", tag.canonical_name())
}

impl GlslDialect{
  fn location(&self, element: &InterfaceElement)->String{
    element.location.map(|n| format!("layout(location = {}) ", n)).unwrap_or_default()
  }

  fn input_declaration(&self, stage: ShaderStage, element: &InterfaceElement)->Result<String, GenerationError>{
    let ty = self.glsl_type(&element.ty)?;
    if stage == ShaderStage::Vertex {
      let name = format!("in_{}", element.tag.canonical_name());
      if self.profile == GlslProfile::Es2 {
        if element.ty.scalar_kind() != Some(ScalarKind::Float) && element.ty.scalar_kind() != Some(ScalarKind::Half) {
          return Err(self.unsupported(format!("integer vertex input '{}'", element.semantic_name)));
        }
        return Ok(format!("attribute {} {};\n", ty, name));
      }
      return Ok(format!("{}in {} {};\n", self.location(element), ty, name));
    }
    let interpolation = self.interpolation(element)?;
    let name = varying_name(&element.tag);
    Ok(match self.profile {
      GlslProfile::Es2 => format!("varying {} {};\n", ty, name),
      GlslProfile::Es3 => format!("{}in {} {};\n", interpolation, ty, name),
      _ => format!("{}{}in {} {};\n", self.location(element), interpolation, ty, name),
    })
  }

  fn output_declaration(&self, element: &InterfaceElement)->Result<String, GenerationError>{
    let ty = self.glsl_type(&element.ty)?;
    let interpolation = self.interpolation(element)?;
    let name = varying_name(&element.tag);
    Ok(match self.profile {
      GlslProfile::Es2 => format!("varying {} {};\n", ty, name),
      GlslProfile::Es3 => format!("{}out {} {};\n", interpolation, ty, name),
      _ => format!("{}{}out {} {};\n", self.location(element), interpolation, ty, name),
    })
  }

  /// The expression reading an input inside `main`.
  fn input_value(&self, stage: ShaderStage, element: &InterfaceElement)->Result<String, GenerationError>{
    let builtin = match (stage, element.tag) {
      (ShaderStage::Vertex, SemanticTag::Vertex(..)) => return Ok(format!("in_{}", element.tag.canonical_name())),
      (_, SemanticTag::Vertex(..)) => return Ok(varying_name(&element.tag)),
      (ShaderStage::Vertex, SemanticTag::System(SystemValue::VertexId, _)) if self.profile != GlslProfile::Es2 => "gl_VertexID",
      (ShaderStage::Vertex, SemanticTag::System(SystemValue::InstanceId, _)) if self.profile != GlslProfile::Es2 => "gl_InstanceID",
      (ShaderStage::Pixel, SemanticTag::System(SystemValue::Position, _)) => "gl_FragCoord",
      (ShaderStage::Pixel, SemanticTag::System(SystemValue::IsFrontFace, _)) => "gl_FrontFacing",
      _ => return Err(self.unsupported(format!("{} stage input '{}'", stage, element.semantic_name))),
    };
    Ok(format!("{}({})", self.glsl_type(&element.ty)?, builtin))
  }

  /// The variable an output is written to inside `main`.
  fn output_target(&self, stage: ShaderStage, element: &InterfaceElement, fragment_data: bool)->Result<String, GenerationError>{
    Ok(match (stage, element.tag) {
      (ShaderStage::Vertex, SemanticTag::Vertex(..)) => varying_name(&element.tag),
      (ShaderStage::Vertex, SemanticTag::System(SystemValue::Position, _)) => "gl_Position".to_owned(),
      (ShaderStage::Pixel, SemanticTag::System(SystemValue::Target, index)) => match self.profile {
        GlslProfile::Es2 if fragment_data => format!("gl_FragData[{}]", index),
        GlslProfile::Es2 => "gl_FragColor".to_owned(),
        _ => format!("out_Target{}", index),
      },
      (ShaderStage::Pixel, SemanticTag::System(SystemValue::Depth, _)) if self.profile != GlslProfile::Es2 => "gl_FragDepth".to_owned(),
      _ => return Err(self.unsupported(format!("{} stage output '{}'", stage, element.semantic_name))),
    })
  }

  fn interface(&self, description: &ShaderInstanceDescription, out: &mut String)->Result<(), GenerationError>{
    let stage = description.stage;
    for input in &description.inputs{
      if !input.tag.is_system() {
        out.push_str(&input.guard.wrap(&self.input_declaration(stage, input)?));
      }
    }
    for output in &description.outputs{
      let declaration = match output.tag {
        SemanticTag::Vertex(..) if stage == ShaderStage::Vertex => self.output_declaration(output)?,
        SemanticTag::System(SystemValue::Target, index) if self.profile != GlslProfile::Es2 => {
          format!("layout(location = {}) out {} out_Target{};\n", index, self.glsl_type(&output.ty)?, index)
        }
        _ => continue,
      };
      out.push_str(&output.guard.wrap(&declaration));
    }
    out.push('\n');
    Ok(())
  }

  fn value_of(&self, source: &ElementSource)->String{
    match source {
      ElementSource::Return => "entry_result".to_owned(),
      ElementSource::ReturnField(field) => format!("entry_result.{}", self.name(field)),
      ElementSource::Parameter(name) => self.name(name),
      ElementSource::Field { parameter, field } => format!("{}.{}", self.name(parameter), self.name(field)),
    }
  }

  /// `void main()` reading the inputs, calling the entry point and writing
  /// its results to the outputs.
  fn main(&self, scope: &ShaderScope, description: &ShaderInstanceDescription, out: &mut String)->Result<(), GenerationError>{
    let stage = description.stage;
    let entry = scope.entry_function()
      .ok_or_else(|| self.unsupported(format!("missing entry point '{}'", description.entry_point)))?;
    out.push_str("void main() {\n");
    let mut arguments = vec![];
    for parameter in &entry.parameters{
      let name = self.name(&parameter.name);
      let reads = matches!(parameter.modifier, ParameterModifier::In | ParameterModifier::InOut);
      match &parameter.ty {
        Type::Struct(_) => {
          out.push_str(&format!("  {} {};\n", self.glsl_type(&parameter.ty)?, name));
          if reads {
            for input in &description.inputs{
              if let ElementSource::Field { parameter: owner, .. } = &input.source {
                if owner == &parameter.name {
                  let read = format!("  {} = {};\n", self.value_of(&input.source), self.input_value(stage, input)?);
                  out.push_str(&input.guard.wrap(&read));
                }
              }
            }
          }
        }
        ty => {
          let source = ElementSource::Parameter(parameter.name.clone());
          match description.input(&source) {
            Some(input) if reads => {
              out.push_str(&format!("  {} {} = {};\n", self.glsl_type(ty)?, name, self.input_value(stage, input)?));
            }
            _ => out.push_str(&format!("  {} {};\n", self.glsl_type(ty)?, name)),
          }
        }
      }
      arguments.push(name);
    }
    let call = format!("{}({})", self.name(&entry.name), arguments.join(", "));
    match entry.return_type {
      Type::Void => out.push_str(&format!("  {};\n", call)),
      ref ty => out.push_str(&format!("  {} entry_result = {};\n", self.glsl_type(ty)?, call)),
    }
    let fragment_data = description.outputs.iter()
      .any(|o| matches!(o.tag, SemanticTag::System(SystemValue::Target, index) if index > 0));
    for output in &description.outputs{
      let write = format!("  {} = {};\n", self.output_target(stage, output, fragment_data)?, self.value_of(&output.source));
      out.push_str(&output.guard.wrap(&write));
    }
    out.push_str("}\n");
    Ok(())
  }
}

fn uses_derivatives(scope: &ShaderScope)->bool{
  scope.functions().flat_map(|f| f.body.iter()).any(|item| match item {
    BodyItem::Token(lexeme) => lexeme.is_identifier() && matches!(lexeme.raw_text.as_str(), "ddx" | "ddy" | "fwidth"),
    BodyItem::Directive(_) => false,
  })
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ BACKEND ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Generates GLSL for one of the GLSL profiles. The entry point is kept as a
/// function and called from a generated `void main()`.
pub struct GlslBackend{
  profile: GlslProfile,
}

impl GlslBackend{
  pub fn new(profile: GlslProfile)->Self{
    Self { profile }
  }
}

impl Backend for GlslBackend{
  fn target(&self)->TargetProfile{
    TargetProfile::Glsl(self.profile)
  }

  fn generate(&self, scope: &ShaderScope, description: &ShaderInstanceDescription)->Result<String, GenerationError>{
    let stage = description.stage;
    if !matches!(stage, ShaderStage::Vertex | ShaderStage::Pixel) {
      return Err(GenerationError::UnsupportedStage { target: self.target(), stage });
    }
    let dialect = GlslDialect::new(self.profile, description);
    let mut out = String::new();
    out.push_str(self.profile.version_directive());
    out.push('\n');
    if self.profile == GlslProfile::Es2 && stage == ShaderStage::Pixel && uses_derivatives(scope) {
      out.push_str("#extension GL_OES_standard_derivatives : enable\n");
    }
    if self.profile.is_es() {
      out.push_str("precision highp float;\n");
    }
    out.push('\n');
    dialect.interface(description, &mut out)?;
    emit_declarations(scope, &mut out, |declaration, out| dialect.declaration(declaration, description, out))?;
    dialect.main(scope, description, &mut out)?;
    Ok(out)
  }
}

#[cfg(test)]
mod tests{
  use super::*;
  use crate::parse::parse_shader;
  use crate::validate::validate;

  fn glsl(source: &str, stage: ShaderStage, profile: GlslProfile)->Result<String, GenerationError>{
    let scope = parse_shader(source, "Main").unwrap();
    let description = validate(&scope, stage).unwrap();
    GlslBackend::new(profile).generate(&scope, &description)
  }

  const VERTEX: &str = "
cbuffer Camera : register(b0) {
  float4x4 ViewProj;
  row_major float3x4 Bones;
};
struct VSIn { float3 Position : POSITION; float2 UV : TEXCOORD0; };
struct VSOut { float4 Position : SV_Position; float2 UV : TEXCOORD0; };
VSOut Main(VSIn input) {
  VSOut o;
  o.Position = mul(float4(input.Position, 1.0f), ViewProj);
  o.UV = frac(input.UV);
  return o;
}
";

  #[test]
  fn vertex_stage_desktop(){
    let out = glsl(VERTEX, ShaderStage::Vertex, GlslProfile::Desktop430).unwrap();
    assert!(out.starts_with("#version 430 core\n"));
    assert!(out.contains("layout(location = 0) in vec3 in_POSITION0;"));
    assert!(out.contains("layout(location = 1) in vec2 in_TEXCOORD0;"));
    assert!(out.contains("layout(location = 0) out vec2 v_TEXCOORD0;"));
    assert!(out.contains("layout(std140, binding = 0) uniform Camera {\n  mat4 ViewProj;\n  layout(row_major) mat4x3 Bones;\n};"));
    assert!(out.contains("o.Position = (vec4(input_"));
    assert!(out.contains("fract("));
    assert!(out.contains("gl_Position = entry_result.Position;"));
    assert!(!out.contains("float4"));
  }

  #[test]
  fn reserved_names_are_mangled_consistently(){
    let out = glsl(VERTEX, ShaderStage::Vertex, GlslProfile::Desktop410).unwrap();
    let mangled = mangle("input");
    assert!(out.contains(&format!("VSOut Main(VSIn {})", mangled)));
    assert!(out.contains(&format!("{}.Position = in_POSITION0;", mangled)));
    assert!(out.contains("layout(std140) uniform Camera"));
  }

  #[test]
  fn es2_uses_attributes_and_plain_uniforms(){
    let source = "
float4 Tint;
Texture2D Diffuse;
SamplerState Linear;
float4 Main(float2 uv : TEXCOORD0) : SV_Target {
  return Diffuse.Sample(Linear, uv) * Tint + ddx(uv.x);
}
";
    let out = glsl(source, ShaderStage::Pixel, GlslProfile::Es2).unwrap();
    assert!(out.starts_with("#version 100\n#extension GL_OES_standard_derivatives : enable\nprecision highp float;\n"));
    assert!(out.contains("varying vec2 v_TEXCOORD0;"));
    assert!(out.contains("uniform vec4 Tint;"));
    assert!(out.contains("uniform sampler2D Diffuse;"));
    assert!(!out.contains("Linear;"));
    assert!(out.contains("texture2D(Diffuse, uv)"));
    assert!(out.contains("dFdx(uv.x)"));
    assert!(out.contains("gl_FragColor = entry_result;"));
    assert!(!out.contains("layout("));
  }

  #[test]
  fn es3_fragment_outputs(){
    let source = "void Main(float4 pos : SV_Position, out float4 a : SV_Target0, out float4 b : SV_Target1) { a = pos; b = 1; }";
    let out = glsl(source, ShaderStage::Pixel, GlslProfile::Es3).unwrap();
    assert!(out.contains("layout(location = 1) out vec4 out_Target1;"));
    assert!(out.contains("vec4 pos = vec4(gl_FragCoord);"));
    assert!(out.contains("  Main(pos, a, b);\n"));
    assert!(out.contains("out_Target0 = a;"));
  }

  #[test]
  fn unsupported_constructs(){
    let uint_input = "float4 Main(uint id : SV_VertexID) : SV_Position { return 0; }";
    let error = glsl(uint_input, ShaderStage::Vertex, GlslProfile::Es2).unwrap_err();
    assert!(matches!(error, GenerationError::UnsupportedConstruct { .. }));
    assert!(glsl(uint_input, ShaderStage::Vertex, GlslProfile::Es3).is_ok());

    let volume = "Texture3D Volume; float4 Main() : SV_Target { return 0; }";
    assert!(glsl(volume, ShaderStage::Pixel, GlslProfile::Es2).is_err());
    assert!(glsl(volume, ShaderStage::Pixel, GlslProfile::Desktop410).is_ok());

    let hull = "float4 Main() : SV_Position { return 0; }";
    let error = glsl(hull, ShaderStage::Hull, GlslProfile::Desktop430).unwrap_err();
    assert!(matches!(error, GenerationError::UnsupportedStage { stage: ShaderStage::Hull, .. }));
  }

  #[test]
  fn conditional_fields_guard_the_interface(){
    let source = "
cbuffer Skin {
#ifdef SKIN
  float4x4 Palette[2];
#endif
};
struct VSIn {
  float3 Position : POSITION;
#ifdef SKIN
  float4 Weights : BLENDWEIGHT;
#endif
};
struct VSOut {
  float4 Position : SV_Position;
#ifdef FOG
  float Fog : TEXCOORD0;
#endif
};
VSOut Main(VSIn IN) {
  VSOut o;
  o.Position = float4(IN.Position, 1.0);
#ifdef FOG
  o.Fog = 0.5;
#endif
  return o;
}
";
    let out = glsl(source, ShaderStage::Vertex, GlslProfile::Desktop430).unwrap();
    assert!(out.contains("#ifdef SKIN\nlayout(location = 1) in vec4 in_BLENDWEIGHT0;\n#endif\n"));
    assert!(out.contains("#ifdef FOG\nlayout(location = 0) out float v_TEXCOORD0;\n#endif\n"));
    assert!(out.contains("layout(std140, binding = 0) uniform Skin {\n#ifdef SKIN\n  mat4 Palette[2];\n#endif\n};\n"));
    assert!(out.contains("struct VSIn {\n  vec3 Position;\n#ifdef SKIN\n  vec4 Weights;\n#endif\n};\n"));
    assert!(out.contains("#ifdef SKIN\n  IN.Weights = in_BLENDWEIGHT0;\n#endif\n"));
    assert!(out.contains("#ifdef FOG\n  v_TEXCOORD0 = entry_result.Fog;\n#endif\n"));
  }

  #[test]
  fn conditions_are_rewrapped(){
    let source = "#if defined(SKINNED)\nfloat4 Tint;\n#else\nfloat4 Other;\n#endif\nfloat4 Main() : SV_Target {\n#ifdef RED\n return float4(1, 0, 0, 1);\n#endif\n return 0;\n}";
    let out = glsl(source, ShaderStage::Pixel, GlslProfile::Desktop410).unwrap();
    assert!(out.contains("#if defined(SKINNED)\nuniform vec4 Tint;\n#else\nuniform vec4 Other;\n#endif\n"));
    assert!(out.contains("#ifdef RED\n  return vec4(1, 0, 0, 1);\n#endif\n  return 0;\n"));
  }
}
