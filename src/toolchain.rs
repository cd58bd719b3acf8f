use std::{fmt, fs, path::PathBuf, process::Command, str::FromStr, sync::atomic::{AtomicUsize, Ordering}};

use log::{debug, warn};
use strum::{EnumIter, IntoEnumIterator};

use crate::{codegen::TargetProfile, error::ToolchainError, validate::ShaderStage};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ PLATFORMS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The platform a shader is built for, which decides the available targets.
#[derive(EnumIter, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Platform{
  Windows,
  Linux,
  MacOs,
  Ios,
  Android,
  Web,
  PlayStation,
}

impl Platform{
  pub fn name(self)->&'static str{
    match self {
      Platform::Windows => "windows",
      Platform::Linux => "linux",
      Platform::MacOs => "macos",
      Platform::Ios => "ios",
      Platform::Android => "android",
      Platform::Web => "web",
      Platform::PlayStation => "playstation",
    }
  }

  /// The platform this binary was compiled for, if it is one of the known ones.
  pub fn current()->Option<Self>{
    if cfg!(target_os = "windows") {
      Some(Platform::Windows)
    } else if cfg!(target_os = "macos") {
      Some(Platform::MacOs)
    } else if cfg!(target_os = "ios") {
      Some(Platform::Ios)
    } else if cfg!(target_os = "android") {
      Some(Platform::Android)
    } else if cfg!(target_os = "linux") {
      Some(Platform::Linux)
    } else if cfg!(target_family = "wasm") {
      Some(Platform::Web)
    } else {
      None
    }
  }
}

impl fmt::Display for Platform{
  fn fmt(&self, f: &mut fmt::Formatter<'_>)->fmt::Result{
    f.write_str(self.name())
  }
}

impl FromStr for Platform{
  type Err = String;

  fn from_str(s: &str)->Result<Self, Self::Err>{
    Platform::iter()
      .find(|p| p.name().eq_ignore_ascii_case(s))
      .ok_or_else(|| format!("unknown platform '{}'", s))
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ TOOLCHAINS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// What a native compiler is asked to build.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ToolchainRequest{
  pub target: TargetProfile,
  pub stage: ShaderStage,
  pub entry_point: String,
}

/// A native shader compiler turning translated source into byte code.
pub trait Toolchain: Send + Sync{
  fn compile(&self, source: &str, request: &ToolchainRequest)->Result<Vec<u8>, ToolchainError>;
}

impl<F> Toolchain for F
where F: Fn(&str, &ToolchainRequest)->Result<Vec<u8>, ToolchainError> + Send + Sync
{
  fn compile(&self, source: &str, request: &ToolchainRequest)->Result<Vec<u8>, ToolchainError>{
    self(source, request)
  }
}

static INVOCATIONS: AtomicUsize = AtomicUsize::new(0);

/// Runs an external compiler described by a command line. The arguments may
/// contain the placeholders `{input}`, `{output}`, `{entry}` and `{stage}`.
/// The translated source is written to a temporary input file and the byte
/// code is read back from the output file once the command succeeds.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExternalToolchain{
  program: String,
  arguments: Vec<String>,
}

impl ExternalToolchain{
  /// Split a command line at whitespace. Quoting is not supported.
  pub fn new(command_line: &str)->Result<Self, ToolchainError>{
    let mut words = command_line.split_whitespace().map(str::to_owned);
    let program = words.next().ok_or_else(|| ToolchainError {
      tool: String::new(),
      diagnostics: "empty toolchain command".to_owned(),
    })?;
    Ok(Self { program, arguments: words.collect() })
  }

  fn error(&self, diagnostics: impl Into<String>)->ToolchainError{
    ToolchainError { tool: self.program.clone(), diagnostics: diagnostics.into() }
  }

  fn temporary_paths(request: &ToolchainRequest)->(PathBuf, PathBuf){
    let id = INVOCATIONS.fetch_add(1, Ordering::Relaxed);
    let stem = format!("shadercross-{}-{}-{}", std::process::id(), id, request.entry_point);
    let directory = std::env::temp_dir();
    (directory.join(format!("{}.{}", stem, request.target)), directory.join(format!("{}.out", stem)))
  }

  fn run(&self, input: &PathBuf, output: &PathBuf, request: &ToolchainRequest)->Result<Vec<u8>, ToolchainError>{
    let arguments: Vec<String> = self.arguments.iter().map(|argument| {
      argument
        .replace("{input}", &input.to_string_lossy())
        .replace("{output}", &output.to_string_lossy())
        .replace("{entry}", &request.entry_point)
        .replace("{stage}", request.stage.name())
    }).collect();
    debug!("running {} {}", self.program, arguments.join(" "));
    let result = Command::new(&self.program)
      .args(&arguments)
      .output()
      .map_err(|e| self.error(format!("could not start: {}", e)))?;
    if !result.status.success() {
      let mut diagnostics = String::from_utf8_lossy(&result.stderr).trim().to_owned();
      if diagnostics.is_empty() {
        diagnostics = String::from_utf8_lossy(&result.stdout).trim().to_owned();
      }
      if diagnostics.is_empty() {
        diagnostics = format!("exited with {}", result.status);
      }
      return Err(self.error(diagnostics));
    }
    fs::read(output).map_err(|e| self.error(format!("no output at {}: {}", output.display(), e)))
  }
}

impl Toolchain for ExternalToolchain{
  fn compile(&self, source: &str, request: &ToolchainRequest)->Result<Vec<u8>, ToolchainError>{
    let (input, output) = Self::temporary_paths(request);
    fs::write(&input, source).map_err(|e| self.error(format!("could not write {}: {}", input.display(), e)))?;
    let result = self.run(&input, &output, request);
    for path in [&input, &output]{
      if path.exists() && fs::remove_file(path).is_err() {
        warn!("could not remove temporary file {}", path.display());
      }
    }
    result
  }
}

#[cfg(test)]
mod tests{
  use super::*;
  use crate::codegen::GlslProfile;

  fn request()->ToolchainRequest{
    ToolchainRequest {
      target: TargetProfile::Glsl(GlslProfile::Desktop430),
      stage: ShaderStage::Vertex,
      entry_point: "Main".to_owned(),
    }
  }

  #[test]
  fn platform_names(){
    for platform in Platform::iter(){
      assert_eq!(platform.name().parse::<Platform>(), Ok(platform));
    }
    assert_eq!("MacOS".parse::<Platform>(), Ok(Platform::MacOs));
    assert!("amiga".parse::<Platform>().is_err());
  }

  #[test]
  fn closures_are_toolchains(){
    let toolchain = |source: &str, request: &ToolchainRequest| -> Result<Vec<u8>, ToolchainError> {
      Ok(format!("{}:{}", request.entry_point, source.len()).into_bytes())
    };
    assert_eq!(toolchain.compile("abc", &request()), Ok(b"Main:3".to_vec()));
  }

  #[test]
  fn empty_command_line(){
    assert!(ExternalToolchain::new("   ").is_err());
  }

  #[cfg(unix)]
  #[test]
  fn external_copy(){
    let toolchain = ExternalToolchain::new("cp {input} {output}").unwrap();
    assert_eq!(toolchain.compile("void main() {}", &request()), Ok(b"void main() {}".to_vec()));
  }

  #[cfg(unix)]
  #[test]
  fn external_failures(){
    let error = ExternalToolchain::new("false {input}").unwrap().compile("", &request()).unwrap_err();
    assert_eq!(error.tool, "false");
    let error = ExternalToolchain::new("shadercross-missing-compiler").unwrap().compile("", &request()).unwrap_err();
    assert!(error.diagnostics.starts_with("could not start"));
  }
}
