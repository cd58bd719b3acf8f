use std::{fmt, str::FromStr};

use ahash::RandomState;
use log::trace;
use radix_fmt::radix;
use strum::{EnumIter, IntoEnumIterator};

use crate::ast::{BodyItem, Declaration, ShaderScope};
use crate::error::GenerationError;
use crate::lexeme::{ContentType, Lexeme};
use crate::options::{Keyword, Operator};
use crate::toolchain::Platform;
use crate::validate::ShaderInstanceDescription;

mod glsl;
mod hlsl;
mod metal;

pub use glsl::GlslBackend;
pub use hlsl::HlslBackend;
pub use metal::MetalBackend;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ TARGET PROFILES ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[derive(EnumIter, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum GlslProfile{
  Desktop410,
  Desktop430,
  /// OpenGL ES 2.0, GLSL ES 1.00
  Es2,
  /// OpenGL ES 3.0, GLSL ES 3.00
  Es3,
}

impl GlslProfile{
  pub fn name(self)->&'static str{
    match self {
      GlslProfile::Desktop410 => "glsl410",
      GlslProfile::Desktop430 => "glsl430",
      GlslProfile::Es2 => "glsles2",
      GlslProfile::Es3 => "glsles3",
    }
  }

  pub fn version_directive(self)->&'static str{
    match self {
      GlslProfile::Desktop410 => "#version 410 core",
      GlslProfile::Desktop430 => "#version 430 core",
      GlslProfile::Es2 => "#version 100",
      GlslProfile::Es3 => "#version 300 es",
    }
  }

  pub fn is_es(self)->bool{
    matches!(self, GlslProfile::Es2 | GlslProfile::Es3)
  }
}

/// The language a shader is cross-compiled to.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TargetProfile{
  Hlsl,
  Pssl,
  Metal,
  Glsl(GlslProfile),
}

impl TargetProfile{
  pub fn all()->Vec<TargetProfile>{
    let mut all = vec![TargetProfile::Hlsl, TargetProfile::Pssl, TargetProfile::Metal];
    all.extend(GlslProfile::iter().map(TargetProfile::Glsl));
    all
  }

  pub fn name(self)->&'static str{
    match self {
      TargetProfile::Hlsl => "hlsl",
      TargetProfile::Pssl => "pssl",
      TargetProfile::Metal => "metal",
      TargetProfile::Glsl(profile) => profile.name(),
    }
  }

  /// Whether the native toolchain or driver of `platform` consumes this target.
  pub fn supported_on(self, platform: Platform)->bool{
    use Platform::*;
    match self {
      TargetProfile::Hlsl => platform == Windows,
      TargetProfile::Pssl => platform == PlayStation,
      TargetProfile::Metal => matches!(platform, MacOs | Ios),
      TargetProfile::Glsl(GlslProfile::Desktop410) => matches!(platform, Windows | Linux | MacOs),
      TargetProfile::Glsl(GlslProfile::Desktop430) => matches!(platform, Windows | Linux),
      TargetProfile::Glsl(GlslProfile::Es2 | GlslProfile::Es3) => matches!(platform, Android | Ios | Web),
    }
  }
}

impl fmt::Display for TargetProfile{
  fn fmt(&self, f: &mut fmt::Formatter<'_>)->fmt::Result{
    f.write_str(self.name())
  }
}

impl FromStr for TargetProfile{
  type Err = String;

  fn from_str(s: &str)->Result<Self, Self::Err>{
    let s = s.to_ascii_lowercase();
    TargetProfile::all()
      .into_iter()
      .find(|target| target.name() == s)
      .ok_or_else(|| format!("unknown target '{}'", s))
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ DISPATCH ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// A code generator for one target profile. Backends only see the parsed
/// scope and its description.
pub trait Backend{
  fn target(&self)->TargetProfile;
  fn generate(&self, scope: &ShaderScope, description: &ShaderInstanceDescription)->Result<String, GenerationError>;
}

pub fn backend(target: TargetProfile)->Box<dyn Backend>{
  match target {
    TargetProfile::Hlsl | TargetProfile::Pssl => Box::new(HlslBackend::new(target)),
    TargetProfile::Metal => Box::new(MetalBackend),
    TargetProfile::Glsl(profile) => Box::new(GlslBackend::new(profile)),
  }
}

/// Translate a validated scope to `target`.
pub fn generate(target: TargetProfile, scope: &ShaderScope, description: &ShaderInstanceDescription)->Result<String, GenerationError>{
  let source = backend(target).generate(scope, description)?;
  trace!("generated {} bytes of {} for '{}'", source.len(), target, description.entry_point);
  Ok(source)
}

/// Emit every declaration, wrapped in the conditional blocks it was found in.
pub(crate) fn emit_declarations<F>(scope: &ShaderScope, out: &mut String, mut emit: F)->Result<(), GenerationError>
where F: FnMut(&Declaration, &mut String)->Result<(), GenerationError>
{
  scope.blocks.emit(out, &mut emit)
}

/// Write the preprocessor lines kept in front of a struct or cbuffer member.
pub(crate) fn emit_directives(directives: &[String], out: &mut String){
  for directive in directives{
    out.push_str(&format!("#{}\n", directive));
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ BODY TRANSLATION ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// A piece of translated output.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) enum Token{
  Word(String),
  Keyword(String),
  Punct(String),
  /// A preprocessor line, without the `#`.
  Directive(String),
}

impl Token{
  fn text(&self)->&str{
    match self {
      Token::Word(text) | Token::Keyword(text) | Token::Punct(text) | Token::Directive(text) => text,
    }
  }
}

/// How a backend spells the words and calls of a function body.
pub(crate) trait Dialect{
  fn target(&self)->TargetProfile;

  /// Translate an identifier. `member` is set for names following a `.`.
  fn word(&self, word: &str, member: bool)->Result<String, GenerationError>;

  fn number(&self, lexeme: &Lexeme)->Result<String, GenerationError>{
    Ok(lexeme.raw_text.clone())
  }

  /// Replace a call `name(args)` as a whole, `None` keeps it.
  fn call(&self, _name: &str, _args: &[String])->Result<Option<String>, GenerationError>{
    Ok(None)
  }

  /// Replace a method call `object.method(args)` as a whole, `None` keeps it.
  fn method(&self, _object: &str, _method: &str, _args: &[String])->Result<Option<String>, GenerationError>{
    Ok(None)
  }

  /// Whether `[unroll]`-style statement attributes are kept.
  fn keeps_attributes(&self)->bool{
    false
  }
}

fn lexeme_at(items: &[BodyItem], i: usize)->Option<&Lexeme>{
  match items.get(i) {
    Some(BodyItem::Token(lexeme)) => Some(lexeme),
    _ => None,
  }
}

fn operator_at(items: &[BodyItem], i: usize, op: Operator)->bool{
  lexeme_at(items, i).map_or(false, |l| l.is_operator(op.id()))
}

fn identifier_at(items: &[BodyItem], i: usize)->bool{
  lexeme_at(items, i).map_or(false, |l| l.is_identifier())
}

fn opens_group(lexeme: &Lexeme)->bool{
  [Operator::LeftParen, Operator::LeftBracket, Operator::LeftBrace].iter().any(|op| lexeme.is_operator(op.id()))
}

fn closes_group(lexeme: &Lexeme)->bool{
  [Operator::RightParen, Operator::RightBracket, Operator::RightBrace].iter().any(|op| lexeme.is_operator(op.id()))
}

/// If a statement attribute such as `[unroll]` or `[loop(4)]` starts at `i`,
/// the index following it.
fn attribute_end(items: &[BodyItem], i: usize)->Option<usize>{
  if !operator_at(items, i, Operator::LeftBracket) || !identifier_at(items, i + 1) {
    return None;
  }
  let statement_start = i == 0 || matches!(items.get(i - 1), Some(BodyItem::Directive(_))) ||
    [Operator::Semicolon, Operator::LeftBrace, Operator::RightBrace, Operator::RightBracket]
      .iter()
      .any(|op| operator_at(items, i - 1, *op));
  if !statement_start {
    return None;
  }
  let mut depth = 0usize;
  for (offset, item) in items[i..].iter().enumerate(){
    let lexeme = match item {
      BodyItem::Token(lexeme) => lexeme,
      BodyItem::Directive(_) => return None,
    };
    if opens_group(lexeme) {
      depth += 1;
    } else if closes_group(lexeme) {
      depth -= 1;
      if depth == 0 {
        let end = i + offset + 1;
        let next = lexeme_at(items, end)?;
        let statements = [Keyword::For, Keyword::While, Keyword::Do, Keyword::If, Keyword::Switch];
        let follows = statements.iter().any(|k| next.is_keyword(k.id())) || next.is_operator(Operator::LeftBracket.id());
        return follows.then_some(end);
      }
    }
  }
  None
}

/// Translate the arguments of the call whose `(` is at `open`, returning them
/// and the index of the closing `)`.
fn arguments(items: &[BodyItem], open: usize, dialect: &dyn Dialect)->Result<(Vec<String>, usize), GenerationError>{
  let mut depth = 0usize;
  let mut start = open + 1;
  let mut args = vec![];
  for (i, item) in items.iter().enumerate().skip(open){
    let lexeme = match item {
      BodyItem::Token(lexeme) => lexeme,
      BodyItem::Directive(_) => {
        return Err(GenerationError::construct(dialect.target(), "a preprocessor directive inside a call"));
      }
    };
    if opens_group(lexeme) {
      depth += 1;
    } else if closes_group(lexeme) {
      depth -= 1;
      if depth == 0 {
        if i > start || !args.is_empty() {
          args.push(render_inline(&translate(&items[start..i], dialect)?));
        }
        return Ok((args, i));
      }
    } else if depth == 1 && lexeme.is_operator(Operator::Comma.id()) {
      args.push(render_inline(&translate(&items[start..i], dialect)?));
      start = i + 1;
    }
  }
  Err(GenerationError::construct(dialect.target(), "an unbalanced call"))
}

/// Translate a function body or initializer lexeme by lexeme.
pub(crate) fn translate(items: &[BodyItem], dialect: &dyn Dialect)->Result<Vec<Token>, GenerationError>{
  let mut tokens = vec![];
  let mut i = 0;
  while i < items.len(){
    let lexeme = match &items[i] {
      BodyItem::Directive(text) => {
        tokens.push(Token::Directive(text.clone()));
        i += 1;
        continue;
      }
      BodyItem::Token(lexeme) => lexeme,
    };
    if !dialect.keeps_attributes() {
      if let Some(end) = attribute_end(items, i) {
        i = end;
        continue;
      }
    }
    match lexeme.content_type {
      ContentType::Identifier => {
        let member = i > 0 && operator_at(items, i - 1, Operator::Dot);
        if !member && operator_at(items, i + 1, Operator::Dot) && identifier_at(items, i + 2)
          && operator_at(items, i + 3, Operator::LeftParen)
        {
          let (args, close) = arguments(items, i + 3, dialect)?;
          let object = dialect.word(&lexeme.raw_text, false)?;
          let method = lexeme_at(items, i + 2).map(|l| l.raw_text.as_str()).unwrap_or_default();
          if let Some(text) = dialect.method(&object, method, &args)? {
            tokens.push(Token::Word(text));
            i = close + 1;
            continue;
          }
        }
        if !member && operator_at(items, i + 1, Operator::LeftParen) {
          let (args, close) = arguments(items, i + 1, dialect)?;
          if let Some(text) = dialect.call(&lexeme.raw_text, &args)? {
            tokens.push(Token::Word(text));
            i = close + 1;
            continue;
          }
        }
        tokens.push(Token::Word(dialect.word(&lexeme.raw_text, member)?));
      }
      ContentType::IntConstant | ContentType::FloatConstant => tokens.push(Token::Word(dialect.number(lexeme)?)),
      ContentType::Operator => tokens.push(Token::Punct(lexeme.raw_text.clone())),
      ContentType::Keyword => tokens.push(Token::Keyword(lexeme.raw_text.clone())),
      _ => tokens.push(Token::Word(lexeme.raw_text.clone())),
    }
    i += 1;
  }
  Ok(tokens)
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ RENDERING ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

fn needs_space(previous: &Token, next: &Token)->bool{
  let (p, n) = (previous.text(), next.text());
  if matches!(previous, Token::Punct(_)) && matches!(p, "(" | "[" | "." | "!" | "~") {
    return false;
  }
  if matches!(next, Token::Punct(_)) && matches!(n, "," | ";" | ")" | "]" | ".") {
    return false;
  }
  let callable = matches!(previous, Token::Word(_)) || matches!(p, ")" | "]");
  !(callable && matches!(n, "(" | "[" | "++" | "--"))
}

/// Render tokens on one line.
pub(crate) fn render_inline(tokens: &[Token])->String{
  let mut out = String::new();
  let mut previous: Option<&Token> = None;
  for token in tokens{
    if previous.map_or(false, |p| needs_space(p, token)) {
      out.push(' ');
    }
    out.push_str(token.text());
    previous = Some(token);
  }
  out
}

/// Render the statements of a body indented by `depth` levels, one statement
/// per line. Directives always start a line of their own.
pub(crate) fn render_block(tokens: &[Token], depth: usize)->String{
  let mut out = String::new();
  let mut depth = depth;
  let mut parens = 0usize;
  let mut line_start = true;
  let mut previous: Option<&Token> = None;
  for (i, token) in tokens.iter().enumerate(){
    if let Token::Directive(directive) = token {
      if !line_start {
        out.push('\n');
      }
      out.push('#');
      out.push_str(directive);
      out.push('\n');
      line_start = true;
      previous = None;
      continue;
    }
    let text = token.text();
    let punct = matches!(token, Token::Punct(_));
    if punct && text == "}" {
      if !line_start {
        out.push('\n');
        line_start = true;
      }
      depth = depth.saturating_sub(1);
    }
    if line_start {
      out.push_str(&"  ".repeat(depth));
    } else if previous.map_or(false, |p| needs_space(p, token)) {
      out.push(' ');
    }
    out.push_str(text);
    line_start = false;

    let newline = match (punct, text) {
      (true, "(") => { parens += 1; false }
      (true, ")") => { parens = parens.saturating_sub(1); false }
      (true, "{") => { depth += 1; true }
      (true, ";") => parens == 0,
      (true, "}") => !matches!(tokens.get(i + 1).map(Token::text), Some(";" | "else" | "while" | "," | ")")),
      _ => false,
    };
    if newline {
      out.push('\n');
      line_start = true;
    }
    previous = Some(token);
  }
  if !line_start {
    out.push('\n');
  }
  out
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ NAMING ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Rename an identifier that collides with a word reserved by a target. The
/// suffix is a hash with fixed seeds so a name is always renamed the same way.
pub(crate) fn mangle(name: &str)->String{
  let state = RandomState::with_seeds(0x5ead_e4c0, 0x0c0d_e9e4, 0x7a4e_e75a, 0x51a3_e45e);
  let hash = state.hash_one(name) as u32;
  format!("{}_{}", name, radix(hash, 36))
}

#[cfg(test)]
mod tests{
  use super::*;
  use crate::lexer::StreamedLexer;
  use crate::options::c_family;

  fn items(source: &str)->Vec<BodyItem>{
    StreamedLexer::from_text(source, c_family()).map(|l| BodyItem::Token(l.unwrap())).collect()
  }

  struct Upper;

  impl Dialect for Upper{
    fn target(&self)->TargetProfile{
      TargetProfile::Hlsl
    }
    fn word(&self, word: &str, member: bool)->Result<String, GenerationError>{
      Ok(if member { word.to_owned() } else { word.to_uppercase() })
    }
    fn call(&self, name: &str, args: &[String])->Result<Option<String>, GenerationError>{
      Ok((name == "twice").then(|| format!("({0} + {0})", args.join(", "))))
    }
    fn method(&self, object: &str, method: &str, args: &[String])->Result<Option<String>, GenerationError>{
      Ok((method == "Sample").then(|| format!("sample({}, {})", object, args.join(", "))))
    }
  }

  #[test]
  fn target_names_round_trip(){
    for target in TargetProfile::all(){
      assert_eq!(target.to_string().parse::<TargetProfile>(), Ok(target));
    }
    assert_eq!("GLSL430".parse::<TargetProfile>(), Ok(TargetProfile::Glsl(GlslProfile::Desktop430)));
    assert!("spirv".parse::<TargetProfile>().is_err());
  }

  #[test]
  fn platform_gating(){
    assert!(TargetProfile::Metal.supported_on(Platform::Ios));
    assert!(!TargetProfile::Metal.supported_on(Platform::Windows));
    assert!(!TargetProfile::Glsl(GlslProfile::Desktop430).supported_on(Platform::MacOs));
    assert!(TargetProfile::Glsl(GlslProfile::Es2).supported_on(Platform::Web));
    assert!(TargetProfile::Pssl.supported_on(Platform::PlayStation));
  }

  #[test]
  fn translate_calls_and_members(){
    let tokens = translate(&items("return twice(a.b) + t.Sample(s, uv.xy);"), &Upper).unwrap();
    assert_eq!(render_inline(&tokens), "return (A.b + A.b) + sample(T, S, UV.xy);");
  }

  #[test]
  fn statement_attributes_are_dropped(){
    let tokens = translate(&items("[unroll] for (i = 0; i < 4; i++) { x[i] = 0; }"), &Upper).unwrap();
    assert_eq!(render_inline(&tokens), "for (I = 0; I < 4; I++) { X[I] = 0; }");
  }

  #[test]
  fn render_statements_per_line(){
    let mut body = items("if (a) { b = 1; } else { c(); }");
    body.insert(0, BodyItem::Directive("if FOO".into()));
    body.push(BodyItem::Directive("endif".into()));
    let tokens = translate(&body, &Upper).unwrap();
    assert_eq!(
      render_block(&tokens, 1),
      "#if FOO\n  if (A) {\n    B = 1;\n  } else {\n    C();\n  }\n#endif\n"
    );
  }

  #[test]
  fn unbalanced_calls_fail(){
    assert!(translate(&items("f(a, (b)"), &Upper).is_err());
  }

  #[test]
  fn mangling_is_stable(){
    let first = mangle("texture");
    assert!(first.starts_with("texture_"));
    assert_eq!(first, mangle("texture"));
    assert_ne!(first, mangle("sampler"));
  }
}
