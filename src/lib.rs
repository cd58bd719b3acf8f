use std::sync::Arc;

use log::debug;

use codegen::TargetProfile;
use error::{CompileError, GenerationError};
use toolchain::{Platform, Toolchain, ToolchainRequest};
use validate::{ShaderInstanceDescription, ShaderStage};

pub mod lexeme;
pub mod options;
pub mod lexer;
pub mod preprocessor;
pub mod types;
pub mod ast;
pub mod parse;
pub mod semantics;
pub mod validate;
pub mod codegen;
pub mod toolchain;
pub mod error;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ CONFIGURATION ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Settings shared by every compile request of a build.
#[derive(Clone, Default)]
pub struct CompileOptions{
  /// The platform shaders are built for. Targets unavailable on it are
  /// rejected; `None` allows every target.
  pub platform: Option<Platform>,
  /// The native compiler producing byte code. Without one, compiling stops
  /// at the translated source.
  pub toolchain: Option<Arc<dyn Toolchain>>,
}

/// One shader to compile: which entry point of which source, for which stage
/// and target.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CompileRequest{
  pub source: String,
  pub entry_point: String,
  pub stage: ShaderStage,
  pub target: TargetProfile,
}

#[derive(Clone, PartialEq, Debug)]
/// The result of a successful compilation.
pub struct CompiledShader{
  pub source: String,
  /// Present when a toolchain was configured.
  pub bytecode: Option<Vec<u8>>,
  pub description: ShaderInstanceDescription,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ STATE MACHINE ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[derive(Clone, PartialEq, Debug)]
pub enum CompileState{
  Pending,
  Parsed(ast::ShaderScope),
  Validated(ast::ShaderScope, ShaderInstanceDescription),
  /// Source was generated and waits for the toolchain.
  Translating(String, ShaderInstanceDescription),
  Translated(CompiledShader),
  /// Holds the first error. No later step leaves this state.
  Failed(CompileError),
}

impl CompileState{
  pub fn is_terminal(&self)->bool{
    matches!(self, CompileState::Translated(_) | CompileState::Failed(_))
  }

  fn name(&self)->&'static str{
    match self {
      CompileState::Pending => "pending",
      CompileState::Parsed(_) => "parsed",
      CompileState::Validated(..) => "validated",
      CompileState::Translating(..) => "translating",
      CompileState::Translated(_) => "translated",
      CompileState::Failed(_) => "failed",
    }
  }
}

/// A compile request moving through parsing, validation, translation and the
/// optional toolchain one phase at a time.
pub struct Compilation{
  request: CompileRequest,
  options: CompileOptions,
  state: CompileState,
}

impl Compilation{
  pub fn new(request: CompileRequest, options: CompileOptions)->Self{
    Self { request, options, state: CompileState::Pending }
  }

  pub fn request(&self)->&CompileRequest{
    &self.request
  }

  pub fn state(&self)->&CompileState{
    &self.state
  }

  fn check_platform(&self)->Result<(), GenerationError>{
    match self.options.platform {
      Some(platform) if !self.request.target.supported_on(platform) => {
        Err(GenerationError::UnsupportedTarget { target: self.request.target, platform })
      }
      _ => Ok(()),
    }
  }

  fn advance(&self, state: CompileState)->Result<CompileState, CompileError>{
    let request = &self.request;
    Ok(match state {
      CompileState::Pending => CompileState::Parsed(parse::parse_shader(&request.source, &request.entry_point)?),
      CompileState::Parsed(scope) => {
        let description = validate::validate(&scope, request.stage)?;
        CompileState::Validated(scope, description)
      }
      CompileState::Validated(scope, description) => {
        self.check_platform()?;
        let source = codegen::generate(request.target, &scope, &description)?;
        CompileState::Translating(source, description)
      }
      CompileState::Translating(source, description) => {
        let bytecode = match &self.options.toolchain {
          Some(toolchain) => {
            let toolchain_request = ToolchainRequest {
              target: request.target,
              stage: request.stage,
              entry_point: request.entry_point.clone(),
            };
            Some(toolchain.compile(&source, &toolchain_request)?)
          }
          None => None,
        };
        CompileState::Translated(CompiledShader { source, bytecode, description })
      }
      terminal => terminal,
    })
  }

  /// Run the next phase. Terminal states are left as they are.
  pub fn step(&mut self)->&CompileState{
    if !self.state.is_terminal() {
      let state = std::mem::replace(&mut self.state, CompileState::Pending);
      self.state = self.advance(state).unwrap_or_else(CompileState::Failed);
      debug!("'{}' for {} is {}", self.request.entry_point, self.request.target, self.state.name());
    }
    &self.state
  }

  /// Step until a terminal state is reached.
  pub fn run(&mut self)->Result<&CompiledShader, CompileError>{
    while !self.step().is_terminal() {}
    match &self.state {
      CompileState::Translated(shader) => Ok(shader),
      CompileState::Failed(error) => Err(error.clone()),
      _ => unreachable!("run stops at terminal states"),
    }
  }
}

/// Compiles the function `entry_point` of an HLSL-like `source` as `stage`
/// for `target`, returning the translated source together with its resource
/// description.
///
/// This is the main entry point of the library.
pub fn compile(
  source: &str,
  entry_point: &str,
  stage: ShaderStage,
  target: TargetProfile,
  options: &CompileOptions,
)->Result<CompiledShader, CompileError>{
  let request = CompileRequest {
    source: source.to_owned(),
    entry_point: entry_point.to_owned(),
    stage,
    target,
  };
  let mut compilation = Compilation::new(request, options.clone());
  let shader = compilation.run()?;
  Ok(shader.clone())
}

/// Parse and validate only, for callers that need the bindings of a shader.
pub fn describe(source: &str, entry_point: &str, stage: ShaderStage)->Result<ShaderInstanceDescription, CompileError>{
  let scope = parse::parse_shader(source, entry_point)?;
  Ok(validate::validate(&scope, stage)?)
}
