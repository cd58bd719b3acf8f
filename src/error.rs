use thiserror::Error;

use crate::{lexeme::Lexeme, codegen::TargetProfile, validate::ShaderStage, toolchain::Platform};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ DEFINE CUSTOM ERROR ENUMS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// A malformed token: bad escape sequence, unterminated literal or comment,
/// malformed number.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{message} at line {line}, column {column}")]
pub struct LexError{
  pub line: usize,
  pub column: usize,
  pub message: String,
}

impl LexError{
  pub fn new(line: usize, column: usize, message: impl Into<String>)->Self{
    Self { line, column, message: message.into() }
  }
}

/// The token stream does not match the grammar at a decision point. This includes
/// unmatched or unexpected preprocessor directives.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{message}")]
pub struct SyntaxError{
  pub line: usize,
  pub column: usize,
  pub message: String,
}

impl SyntaxError{
  /// Returns a SyntaxError, filling a predefined template with the expected
  /// construct and properties of the lexeme found. These include its line
  /// and column in the input, its text and its content type.
  pub fn expected(expected: &str, found: &Lexeme)->Self{
    Self {
      line: found.line,
      column: found.column,
      message: format!(
        "Expected {} at line {}, column {}. Instead found '{}', which is a '{:?}'",
        expected, found.line, found.column, found.raw_text, found.content_type
      ),
    }
  }

  /// Returns a SyntaxError at a position with a free-form message.
  pub fn at(line: usize, column: usize, message: impl AsRef<str>)->Self{
    Self {
      line,
      column,
      message: format!("{} at line {}, column {}", message.as_ref(), line, column),
    }
  }
}

/// The parsed shader does not describe a valid stage interface.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ValidationError{
  #[error("Entry point '{0}' not found")]
  EntryPointNotFound(String),
  #[error("Entry point '{0}' is defined more than once")]
  DuplicateEntryPoint(String),
  #[error("Unknown semantic '{semantic}' on '{name}'")]
  UnknownSemantic{ name: String, semantic: String },
  #[error("'{0}' has no semantic")]
  MissingSemantic(String),
  #[error("Parameter '{name}' has unsupported type '{type_name}'")]
  UnsupportedParameterType{ name: String, type_name: String },
  #[error("Struct '{0}' is not declared")]
  UnknownStruct(String),
  #[error("Unknown type '{type_name}' for constant '{name}'")]
  UnknownConstantType{ name: String, type_name: String },
}

/// A backend cannot represent a construct for its target profile.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum GenerationError{
  #[error("Target {target} is not supported on platform {platform}")]
  UnsupportedTarget{ target: TargetProfile, platform: Platform },
  #[error("Target {target} has no {stage} stage")]
  UnsupportedStage{ target: TargetProfile, stage: ShaderStage },
  #[error("Target {target} cannot represent {construct}")]
  UnsupportedConstruct{ target: TargetProfile, construct: String },
}

impl GenerationError{
  pub fn construct(target: TargetProfile, construct: impl Into<String>)->Self{
    GenerationError::UnsupportedConstruct { target, construct: construct.into() }
  }
}

/// The native compiler invocation failed.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{tool} failed: {diagnostics}")]
pub struct ToolchainError{
  pub tool: String,
  pub diagnostics: String,
}

/// An enum representing all types of errors that may occur
/// in the compilation process. All compile passes that may fail
/// should return one of these kinds of errors as the error variant
/// of a Result<>.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum CompileError{
  #[error("Lexical error: {0}")]
  Lex(#[from] LexError),
  #[error("Syntax error: {0}")]
  Syntax(#[from] SyntaxError),
  #[error("Validation error: {0}")]
  Validation(#[from] ValidationError),
  #[error("Generation error: {0}")]
  Generation(#[from] GenerationError),
  #[error("Toolchain error: {0}")]
  Toolchain(#[from] ToolchainError),
}
