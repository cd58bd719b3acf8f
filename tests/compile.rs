use std::sync::Arc;

use shadercross::{
  codegen::{GlslProfile, TargetProfile},
  compile, describe,
  error::{CompileError, GenerationError, ToolchainError, ValidationError},
  semantics::Semantic,
  toolchain::{Platform, Toolchain, ToolchainRequest},
  validate::{ElementSource, ShaderStage},
  Compilation, CompileOptions, CompileRequest, CompileState,
};

const VERTEX: &str =
  "struct VSIn { float3 Position : POSITION; }; float4 Main(VSIn IN) : SV_POSITION { return float4(IN.Position,1.0); }";

const CONDITIONAL: &str = "
#if defined(FANCY)
float Scale(float x) { return x * 2.0; }
#else
float Scale(float x) { return x; }
#endif
struct VSIn { float3 Position : POSITION; };
float4 Main(VSIn IN) : SV_Position { return float4(IN.Position * Scale(1.0), 1.0); }
";

fn request(source: &str, target: TargetProfile)->CompileRequest{
  CompileRequest {
    source: source.to_owned(),
    entry_point: "Main".to_owned(),
    stage: ShaderStage::Vertex,
    target,
  }
}

#[test]
fn glsl_430_vertex_inputs(){
  let shader = compile(VERTEX, "Main", ShaderStage::Vertex, TargetProfile::Glsl(GlslProfile::Desktop430), &CompileOptions::default())
    .unwrap();
  assert!(shader.source.contains("vec3"));
  assert!(!shader.source.contains("float3"));
  assert!(shader.source.contains("layout(location = 0) in vec3"));
  assert!(shader.bytecode.is_none());
}

#[test]
fn glsl_es2_has_no_locations(){
  let shader = compile(VERTEX, "Main", ShaderStage::Vertex, TargetProfile::Glsl(GlslProfile::Es2), &CompileOptions::default())
    .unwrap();
  assert!(shader.source.starts_with("#version 100\n"));
  assert!(!shader.source.contains("layout(location"));
  assert!(shader.source.contains("attribute vec3"));
}

#[test]
fn position_semantic_is_described(){
  let description = describe(VERTEX, "Main", ShaderStage::Vertex).unwrap();
  let position = description
    .input(&ElementSource::Field { parameter: "IN".into(), field: "Position".into() })
    .unwrap();
  assert_eq!(position.format.map(|f| f.to_string()), Some("3xfloat32".to_owned()));
  assert!(description.semantic_mask.contains(Semantic::Position, 0));
  assert_eq!(description.semantic_mask.iter().count(), 1);

  let bogus = "float4 Main(float3 p : BOGUS) : SV_Position { return float4(p, 1.0); }";
  assert!(matches!(
    describe(bogus, "Main", ShaderStage::Vertex),
    Err(CompileError::Validation(ValidationError::UnknownSemantic { .. }))
  ));
}

#[test]
fn compilation_steps_through_every_phase(){
  let mut compilation = Compilation::new(request(VERTEX, TargetProfile::Hlsl), CompileOptions::default());
  assert!(matches!(compilation.state(), CompileState::Pending));
  assert!(matches!(compilation.step(), CompileState::Parsed(_)));
  assert!(matches!(compilation.step(), CompileState::Validated(..)));
  assert!(matches!(compilation.step(), CompileState::Translating(..)));
  assert!(matches!(compilation.step(), CompileState::Translated(_)));
  // terminal
  assert!(matches!(compilation.step(), CompileState::Translated(_)));
  assert!(compilation.run().unwrap().source.contains("float4 Main(VSIn IN) : SV_POSITION {"));
}

#[test]
fn failure_is_terminal(){
  let mut compilation = Compilation::new(request("float4 Main( {", TargetProfile::Hlsl), CompileOptions::default());
  let first = match compilation.step() {
    CompileState::Failed(error) => error.clone(),
    state => panic!("expected a failure, got {:?}", state),
  };
  assert!(matches!(first, CompileError::Syntax(_)));
  assert!(matches!(compilation.step(), CompileState::Failed(error) if *error == first));
  assert_eq!(compilation.run().unwrap_err(), first);
}

#[test]
fn targets_are_gated_by_platform(){
  let options = CompileOptions { platform: Some(Platform::Linux), toolchain: None };
  let error = compile(VERTEX, "Main", ShaderStage::Vertex, TargetProfile::Metal, &options).unwrap_err();
  assert_eq!(
    error,
    CompileError::Generation(GenerationError::UnsupportedTarget { target: TargetProfile::Metal, platform: Platform::Linux })
  );
  assert!(compile(VERTEX, "Main", ShaderStage::Vertex, TargetProfile::Glsl(GlslProfile::Desktop410), &options).is_ok());
}

#[test]
fn toolchain_produces_bytecode(){
  let toolchain = |source: &str, request: &ToolchainRequest| -> Result<Vec<u8>, ToolchainError> {
    assert_eq!(request.stage, ShaderStage::Vertex);
    Ok(source.bytes().rev().collect())
  };
  let options = CompileOptions { platform: None, toolchain: Some(Arc::new(toolchain) as Arc<dyn Toolchain>) };
  let shader = compile(VERTEX, "Main", ShaderStage::Vertex, TargetProfile::Hlsl, &options).unwrap();
  let expected: Vec<u8> = shader.source.bytes().rev().collect();
  assert_eq!(shader.bytecode, Some(expected));

  let failing = |_: &str, _: &ToolchainRequest| -> Result<Vec<u8>, ToolchainError> {
    Err(ToolchainError { tool: "fxc".into(), diagnostics: "error X3000".into() })
  };
  let options = CompileOptions { platform: None, toolchain: Some(Arc::new(failing) as Arc<dyn Toolchain>) };
  let error = compile(VERTEX, "Main", ShaderStage::Vertex, TargetProfile::Hlsl, &options).unwrap_err();
  assert!(matches!(error, CompileError::Toolchain(ToolchainError { ref tool, .. }) if tool == "fxc"));
}

#[test]
fn compiling_is_deterministic(){
  for target in TargetProfile::all(){
    let first = compile(CONDITIONAL, "Main", ShaderStage::Vertex, target, &CompileOptions::default()).unwrap();
    let second = compile(CONDITIONAL, "Main", ShaderStage::Vertex, target, &CompileOptions::default()).unwrap();
    assert_eq!(first, second);
  }
}

#[test]
fn conditions_survive_every_target(){
  for target in TargetProfile::all(){
    let shader = compile(CONDITIONAL, "Main", ShaderStage::Vertex, target, &CompileOptions::default())
      .unwrap_or_else(|e| panic!("{}: {}", target, e));
    let if_at = shader.source.find("#if defined(FANCY)").unwrap();
    let else_at = shader.source.find("#else").unwrap();
    let endif_at = shader.source.find("#endif").unwrap();
    assert!(if_at < else_at && else_at < endif_at, "{}", target);
  }
}

#[test]
fn consecutive_leading_groups_compile(){
  let source = "#ifdef SKIN\nfloat4 A;\n#endif\n#ifdef FOG\nfloat4 B;\n#endif\nfloat4 Main() : SV_Target { return A + B; }\n";
  let shader = compile(source, "Main", ShaderStage::Pixel, TargetProfile::Hlsl, &CompileOptions::default()).unwrap();
  assert!(shader.source.starts_with("#ifdef SKIN\nfloat4 A;\n#endif\n#ifdef FOG\nfloat4 B;\n#endif\nfloat4 Main()"));
  let globals = shader.description.constant_buffer("$Globals").unwrap();
  assert_eq!(globals.members.len(), 2);
}

#[test]
fn conditional_struct_fields_survive_every_target(){
  let source = "
struct VSIn {
  float3 Position : POSITION;
#ifdef SKIN
  float4 Weights : BLENDWEIGHT;
#endif
};
float4 Main(VSIn IN) : SV_Position { return float4(IN.Position, 1.0); }
";
  for target in TargetProfile::all(){
    let shader = compile(source, "Main", ShaderStage::Vertex, target, &CompileOptions::default())
      .unwrap_or_else(|e| panic!("{}: {}", target, e));
    let guarded = shader.source.find("#ifdef SKIN").unwrap_or_else(|| panic!("{}", target));
    assert!(shader.source[guarded..].contains("#endif"), "{}", target);
  }
  assert!(matches!(
    describe("struct S {\n#ifdef SKIN\n  float a;\n};\nvoid Main() {}", "Main", ShaderStage::Vertex),
    Err(CompileError::Syntax(_))
  ));
}
