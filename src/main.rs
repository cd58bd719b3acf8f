use std::{fs, io::{self, Read}, path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use log::{error, info};

use shadercross::{
  codegen::TargetProfile, compile, describe, toolchain::{ExternalToolchain, Platform, Toolchain}, validate::ShaderStage,
  CompileOptions,
};

/// Cross-compile an HLSL-like shader to HLSL, PSSL, GLSL or Metal.
#[derive(Parser, Debug)]
#[command(name = "shadercross", version)]
struct Cli{
  /// Shader source file, or `-` to read standard input.
  source: PathBuf,
  /// Name of the entry point function.
  #[arg(short, long, default_value = "Main")]
  entry: String,
  /// vertex, hull, domain, geometry, pixel or compute.
  #[arg(short, long, default_value = "vertex")]
  stage: ShaderStage,
  /// hlsl, pssl, metal, glsl410, glsl430, glsles2 or glsles3.
  #[arg(short, long, default_value = "glsl430")]
  target: TargetProfile,
  /// Reject targets that are not available on this platform.
  #[arg(short, long)]
  platform: Option<Platform>,
  /// Write the translated source here instead of standard output.
  #[arg(short, long)]
  output: Option<PathBuf>,
  /// Native compiler command with {input} {output} {entry} {stage} placeholders.
  /// Its byte code is written to the output path with a `.bin` extension.
  #[arg(long)]
  toolchain: Option<String>,
  /// Print the resource description instead of translating.
  #[arg(long)]
  describe: bool,
  /// Log every compile phase.
  #[arg(short, long)]
  verbose: bool,
}

fn read_source(path: &PathBuf)->io::Result<String>{
  if path.as_os_str() == "-" {
    let mut source = String::new();
    io::stdin().read_to_string(&mut source)?;
    Ok(source)
  } else {
    fs::read_to_string(path)
  }
}

fn run(cli: &Cli)->Result<(), String>{
  let source = read_source(&cli.source).map_err(|e| format!("could not read {}: {}", cli.source.display(), e))?;
  if cli.describe {
    let description = describe(&source, &cli.entry, cli.stage).map_err(|e| e.to_string())?;
    println!("{:#?}", description);
    return Ok(());
  }

  let toolchain = match &cli.toolchain {
    Some(command_line) => Some(ExternalToolchain::new(command_line).map_err(|e| e.to_string())?),
    None => None,
  };
  let options = CompileOptions {
    platform: cli.platform,
    toolchain: toolchain.map(|t| Arc::new(t) as Arc<dyn Toolchain>),
  };
  let shader = compile(&source, &cli.entry, cli.stage, cli.target, &options).map_err(|e| e.to_string())?;

  match &cli.output {
    Some(path) => {
      fs::write(path, &shader.source).map_err(|e| format!("could not write {}: {}", path.display(), e))?;
      info!("wrote {}", path.display());
      if let Some(bytecode) = &shader.bytecode {
        let binary = path.with_extension("bin");
        fs::write(&binary, bytecode).map_err(|e| format!("could not write {}: {}", binary.display(), e))?;
        info!("wrote {} bytes of byte code to {}", bytecode.len(), binary.display());
      }
    }
    None => print!("{}", shader.source),
  }
  Ok(())
}

fn main()->ExitCode{
  let cli = Cli::parse();
  let default_filter = if cli.verbose { "debug" } else { "warn" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

  match run(&cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(message) => {
      error!("{}", message);
      ExitCode::FAILURE
    }
  }
}
