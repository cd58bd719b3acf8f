use crate::{lexeme::Lexeme, preprocessor::{BlockTree, Guard, RawDirective}, types::Type};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~ DEFINE THE ABSTRACT SYNTAX TREE ~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Line and column of the first lexeme of a declaration.
pub type SourceStart = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation{
  Linear,
  NoInterpolation,
  Centroid,
  NoPerspective,
}

#[derive(Debug, Clone, PartialEq)]
/// A field of a struct declaration, optionally annotated with a semantic.
pub struct StructField{
  pub name: String,
  pub ty: Type,
  pub array: Option<u32>,
  pub semantic: Option<String>,
  pub interpolation: Option<Interpolation>,
  pub row_major: bool,
  /// Preprocessor lines right before the field, without the `#`.
  pub directives: Vec<String>,
  /// The conditional groups the field is declared in.
  pub guard: Guard,
  pub source_start: SourceStart,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl{
  pub name: String,
  pub fields: Vec<StructField>,
  /// Preprocessor lines between the last field and the closing brace.
  pub trailing_directives: Vec<String>,
  pub source_start: SourceStart,
}

#[derive(Debug, Clone, PartialEq)]
/// A variable living in a constant buffer, either declared inside a
/// `cbuffer` block or loose at the top level.
pub struct Variable{
  pub name: String,
  pub ty: Type,
  pub array: Option<u32>,
  pub row_major: bool,
  /// Preprocessor lines right before a `cbuffer` member. Always empty for
  /// loose globals, whose conditions live in the block tree.
  pub directives: Vec<String>,
  pub guard: Guard,
  pub source_start: SourceStart,
}

/// Name of the constant buffer collecting loose top-level variables.
pub const GLOBALS_BUFFER: &str = "$Globals";

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantBuffer{
  pub name: String,
  pub members: Vec<Variable>,
  pub trailing_directives: Vec<String>,
  pub source_start: SourceStart,
}

#[derive(Debug, Clone, PartialEq)]
/// A texture or sampler declaration.
pub struct Resource{
  pub name: String,
  pub ty: Type,
  pub source_start: SourceStart,
}

#[derive(Debug, Clone, PartialEq)]
/// A `static const` global, passed through with its initializer.
pub struct Constant{
  pub name: String,
  pub ty: Type,
  pub array: Option<u32>,
  pub initializer: Vec<BodyItem>,
  pub source_start: SourceStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterModifier{
  In,
  Out,
  InOut,
  Uniform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter{
  pub name: String,
  pub ty: Type,
  pub modifier: ParameterModifier,
  pub semantic: Option<String>,
  pub interpolation: Option<Interpolation>,
  pub source_start: SourceStart,
}

#[derive(Debug, Clone, PartialEq)]
/// Something inside a function body: a lexeme or a preprocessor line that is
/// passed through verbatim.
pub enum BodyItem{
  Token(Lexeme),
  Directive(String),
}

#[derive(Debug, Clone, PartialEq)]
/// A function definition. The body is kept as the span of lexemes between
/// the braces and is translated token by token.
pub struct Function{
  pub name: String,
  pub return_type: Type,
  pub parameters: Vec<Parameter>,
  pub semantic: Option<String>,
  pub body: Vec<BodyItem>,
  pub is_entry_point: bool,
  pub source_start: SourceStart,
}

#[derive(Debug, Clone, PartialEq)]
/// A top level declaration, the element type of the block tree.
pub enum Declaration{
  Struct(StructDecl),
  ConstantBuffer(ConstantBuffer),
  /// A loose variable, member of the implicit `$Globals` buffer.
  Global(Variable),
  Resource(Resource),
  Constant(Constant),
  Function(Function),
  /// A non-conditional preprocessor line such as `#define`.
  Directive(RawDirective),
}

#[derive(Debug, Clone, PartialEq)]
/// The parsed shader: every declaration, nested in the conditional blocks
/// they appeared in.
pub struct ShaderScope{
  pub blocks: BlockTree<Declaration>,
  pub entry_point: String,
}

impl ShaderScope{
  /// All declarations in source order, regardless of conditions.
  pub fn declarations(&self)->Vec<&Declaration>{
    self.blocks.elements()
  }

  pub fn structs(&self)->impl Iterator<Item = &StructDecl>{
    self.declarations().into_iter().filter_map(|d| match d {
      Declaration::Struct(s) => Some(s),
      _ => None,
    })
  }

  pub fn find_struct(&self, name: &str)->Option<&StructDecl>{
    self.structs().find(|s| s.name == name)
  }

  pub fn functions(&self)->impl Iterator<Item = &Function>{
    self.declarations().into_iter().filter_map(|d| match d {
      Declaration::Function(f) => Some(f),
      _ => None,
    })
  }

  /// The first definition of the active entry point.
  pub fn entry_function(&self)->Option<&Function>{
    self.functions().find(|f| f.is_entry_point)
  }

  pub fn resources(&self)->impl Iterator<Item = &Resource>{
    self.declarations().into_iter().filter_map(|d| match d {
      Declaration::Resource(r) => Some(r),
      _ => None,
    })
  }

  pub fn globals(&self)->impl Iterator<Item = &Variable>{
    self.declarations().into_iter().filter_map(|d| match d {
      Declaration::Global(v) => Some(v),
      _ => None,
    })
  }

  pub fn constant_buffers(&self)->impl Iterator<Item = &ConstantBuffer>{
    self.declarations().into_iter().filter_map(|d| match d {
      Declaration::ConstantBuffer(c) => Some(c),
      _ => None,
    })
  }
}
