use crate::ast::{Declaration, Function, Interpolation, ParameterModifier, ShaderScope};
use crate::error::GenerationError;
use crate::semantics::SemanticTag;
use crate::types::Type;
use crate::validate::ShaderInstanceDescription;

use super::{emit_declarations, emit_directives, render_block, render_inline, translate, Backend, Dialect, TargetProfile};

/// Re-serializes the scope as HLSL, or as PSSL which shares its syntax but
/// spells system values, constant buffers and interpolation modifiers its own
/// way. Registers come from the description.
pub struct HlslBackend{
  target: TargetProfile,
}

impl HlslBackend{
  /// `target` is either `Hlsl` or `Pssl`.
  pub fn new(target: TargetProfile)->Self{
    Self { target }
  }

  fn pssl(&self)->bool{
    self.target == TargetProfile::Pssl
  }

  fn semantic(&self, semantic: &Option<String>)->String{
    let text = match semantic {
      Some(text) => text,
      None => return String::new(),
    };
    match SemanticTag::parse(text) {
      Some(SemanticTag::System(value, index)) if self.pssl() => {
        if value.is_indexed() {
          format!(" : {}{}", value.pssl_name(), index)
        } else {
          format!(" : {}", value.pssl_name())
        }
      }
      _ => format!(" : {}", text),
    }
  }

  fn interpolation(&self, interpolation: Option<Interpolation>)->&'static str{
    match (interpolation, self.pssl()) {
      (None, _) => "",
      (Some(Interpolation::Linear), _) => "linear ",
      (Some(Interpolation::Centroid), _) => "centroid ",
      (Some(Interpolation::NoInterpolation), false) => "nointerpolation ",
      (Some(Interpolation::NoInterpolation), true) => "nointerp ",
      (Some(Interpolation::NoPerspective), false) => "noperspective ",
      (Some(Interpolation::NoPerspective), true) => "nopersp ",
    }
  }

  fn row_major(row_major: bool)->&'static str{
    if row_major { "row_major " } else { "" }
  }

  fn array_suffix(array: Option<u32>)->String{
    array.map(|n| format!("[{}]", n)).unwrap_or_default()
  }

  fn function(&self, function: &Function, out: &mut String)->Result<(), GenerationError>{
    let parameters: Vec<String> = function.parameters.iter().map(|parameter| {
      let modifier = match parameter.modifier {
        ParameterModifier::In => "",
        ParameterModifier::Out => "out ",
        ParameterModifier::InOut => "inout ",
        ParameterModifier::Uniform => "uniform ",
      };
      format!(
        "{}{}{} {}{}",
        modifier, self.interpolation(parameter.interpolation), parameter.ty, parameter.name, self.semantic(&parameter.semantic)
      )
    }).collect();
    let body = render_block(&translate(&function.body, self)?, 1);
    out.push_str(&format!(
      "{} {}({}){} {{\n{}}}\n\n",
      function.return_type, function.name, parameters.join(", "), self.semantic(&function.semantic), body
    ));
    Ok(())
  }

  fn declaration(&self, declaration: &Declaration, description: &ShaderInstanceDescription, out: &mut String)->Result<(), GenerationError>{
    match declaration {
      Declaration::Struct(decl) => {
        out.push_str(&format!("struct {} {{\n", decl.name));
        for field in &decl.fields{
          emit_directives(&field.directives, out);
          out.push_str(&format!(
            "  {}{}{} {}{}{};\n",
            self.interpolation(field.interpolation), Self::row_major(field.row_major), field.ty, field.name,
            Self::array_suffix(field.array), self.semantic(&field.semantic)
          ));
        }
        emit_directives(&decl.trailing_directives, out);
        out.push_str("};\n");
      }
      Declaration::ConstantBuffer(buffer) => {
        let keyword = if self.pssl() { "ConstantBuffer" } else { "cbuffer" };
        let register = description.constant_buffer(&buffer.name)
          .map(|layout| format!(" : register(b{})", layout.slot))
          .unwrap_or_default();
        out.push_str(&format!("{} {}{} {{\n", keyword, buffer.name, register));
        for member in &buffer.members{
          emit_directives(&member.directives, out);
          out.push_str(&format!(
            "  {}{} {}{};\n",
            Self::row_major(member.row_major), member.ty, member.name, Self::array_suffix(member.array)
          ));
        }
        emit_directives(&buffer.trailing_directives, out);
        out.push_str("};\n");
      }
      Declaration::Global(variable) => {
        out.push_str(&format!(
          "{}{} {}{};\n",
          Self::row_major(variable.row_major), variable.ty, variable.name, Self::array_suffix(variable.array)
        ));
      }
      Declaration::Resource(resource) => {
        let register = match resource.ty {
          Type::Sampler(_) => description.sampler(&resource.name).map(|s| format!(" : register(s{})", s.slot)),
          _ => description.texture(&resource.name).map(|t| format!(" : register(t{})", t.slot)),
        };
        out.push_str(&format!("{} {}{};\n", resource.ty, resource.name, register.unwrap_or_default()));
      }
      Declaration::Constant(constant) => {
        let value = render_inline(&translate(&constant.initializer, self)?);
        out.push_str(&format!(
          "static const {} {}{} = {};\n",
          constant.ty, constant.name, Self::array_suffix(constant.array), value
        ));
      }
      Declaration::Function(function) => self.function(function, out)?,
      Declaration::Directive(directive) => out.push_str(&format!("#{}\n", directive.text)),
    }
    Ok(())
  }
}

impl Dialect for HlslBackend{
  fn target(&self)->TargetProfile{
    self.target
  }

  fn word(&self, word: &str, _member: bool)->Result<String, GenerationError>{
    Ok(word.to_owned())
  }

  fn keeps_attributes(&self)->bool{
    true
  }
}

impl Backend for HlslBackend{
  fn target(&self)->TargetProfile{
    self.target
  }

  fn generate(&self, scope: &ShaderScope, description: &ShaderInstanceDescription)->Result<String, GenerationError>{
    let mut out = String::new();
    emit_declarations(scope, &mut out, |declaration, out| self.declaration(declaration, description, out))?;
    Ok(out)
  }
}

#[cfg(test)]
mod tests{
  use super::*;
  use crate::parse::parse_shader;
  use crate::validate::{validate, ShaderStage};

  const SOURCE: &str = "
float4 Tint;
cbuffer Lights : register(b7) { float3 Direction; row_major float4x4 Shadow; };
Texture2D Diffuse : register(t4);
SamplerState Linear;
struct PSIn { float4 Position : SV_Position; nointerpolation float2 UV : TEXCOORD0; };
static const float Weights[2] = { 0.25, 0.75 };
float4 Main(PSIn IN) : SV_Target {
  [unroll] for (int i = 0; i < 2; i++) { Tint.x += Weights[i]; }
  return Diffuse.Sample(Linear, IN.UV) * Tint;
}
";

  fn generate(target: TargetProfile)->String{
    let scope = parse_shader(SOURCE, "Main").unwrap();
    let description = validate(&scope, ShaderStage::Pixel).unwrap();
    HlslBackend::new(target).generate(&scope, &description).unwrap()
  }

  #[test]
  fn hlsl_registers_follow_declaration_order(){
    let out = generate(TargetProfile::Hlsl);
    assert!(out.starts_with("float4 Tint;\ncbuffer Lights : register(b1) {\n  float3 Direction;\n  row_major float4x4 Shadow;\n};\n"));
    assert!(out.contains("Texture2D Diffuse : register(t0);"));
    assert!(out.contains("SamplerState Linear : register(s0);"));
    assert!(out.contains("  nointerpolation float2 UV : TEXCOORD0;"));
    assert!(out.contains("static const float Weights[2] = { 0.25, 0.75 };"));
    assert!(out.contains("float4 Main(PSIn IN) : SV_Target {\n  [unroll] for (int i = 0; i < 2; i++) {\n"));
    assert!(out.contains("return Diffuse.Sample(Linear, IN.UV) * Tint;"));
  }

  #[test]
  fn member_conditions_are_kept(){
    let source = "
cbuffer Fog {
#ifdef FOG
  float4 FogColor;
#endif
};
struct PSIn {
  float4 Position : SV_Position;
#ifdef FOG
  float Depth : TEXCOORD0;
#endif
};
float4 Main(PSIn IN) : SV_Target { return 0; }
";
    let scope = parse_shader(source, "Main").unwrap();
    let description = validate(&scope, ShaderStage::Pixel).unwrap();
    let out = HlslBackend::new(TargetProfile::Hlsl).generate(&scope, &description).unwrap();
    assert!(out.contains("cbuffer Fog : register(b0) {\n#ifdef FOG\n  float4 FogColor;\n#endif\n};\n"));
    assert!(out.contains("struct PSIn {\n  float4 Position : SV_Position;\n#ifdef FOG\n  float Depth : TEXCOORD0;\n#endif\n};\n"));
  }

  #[test]
  fn pssl_spelling(){
    let out = generate(TargetProfile::Pssl);
    assert!(out.contains("ConstantBuffer Lights : register(b1) {"));
    assert!(out.contains("float4 Position : S_POSITION;"));
    assert!(out.contains("nointerp float2 UV : TEXCOORD0;"));
    assert!(out.contains("float4 Main(PSIn IN) : S_TARGET_OUTPUT0 {"));
  }
}
