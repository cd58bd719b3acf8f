use log::{debug, warn};

use crate::ast::{
  BodyItem, Constant, ConstantBuffer, Declaration, Function, Interpolation, Parameter,
  ParameterModifier, Resource, ShaderScope, StructDecl, StructField, Variable,
};
use crate::error::{CompileError, LexError, SyntaxError};
use crate::lexeme::{ContentType, Lexeme};
use crate::lexer::StreamedLexer;
use crate::options::{c_family, Keyword, Operator};
use crate::preprocessor::{consider_directives, BlockTree, Directive, DirectiveSource, Guard, RawDirective};
use crate::types::Type;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ TOKEN STREAM ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// A lexer with one lexeme of lookahead.
pub struct TokenStream<'o, I: Iterator<Item = char>>{
  lexer: StreamedLexer<'o, I>,
  peeked: Option<Lexeme>,
  deferred: Option<RawDirective>,
}

impl<'o, I: Iterator<Item = char>> TokenStream<'o, I>{
  pub fn new(lexer: StreamedLexer<'o, I>)->Self{
    Self { lexer, peeked: None, deferred: None }
  }

  pub fn peek(&mut self)->Result<&Lexeme, LexError>{
    let lexeme = match self.peeked.take() {
      Some(lexeme) => lexeme,
      None => self.lexer.next_lexeme()?,
    };
    Ok(self.peeked.insert(lexeme))
  }

  pub fn next(&mut self)->Result<Lexeme, LexError>{
    match self.peeked.take() {
      Some(lexeme) => Ok(lexeme),
      None => self.lexer.next_lexeme(),
    }
  }

  pub fn take_deferred(&mut self)->Option<RawDirective>{
    self.deferred.take()
  }

  /// Consume the next lexeme if it is the given operator.
  pub fn eat_operator(&mut self, op: Operator)->Result<bool, LexError>{
    let found = self.peek()?.is_operator(op.id());
    if found {
      self.next()?;
    }
    Ok(found)
  }

  /// Consume the next lexeme if it is the given keyword.
  pub fn eat_keyword(&mut self, keyword: Keyword)->Result<bool, LexError>{
    let found = self.peek()?.is_keyword(keyword.id());
    if found {
      self.next()?;
    }
    Ok(found)
  }

  pub fn expect_operator(&mut self, op: Operator)->Result<Lexeme, CompileError>{
    let lexeme = self.next()?;
    if lexeme.is_operator(op.id()) {
      Ok(lexeme)
    } else {
      Err(SyntaxError::expected(&format!("'{}'", op.text()), &lexeme).into())
    }
  }

  pub fn expect_identifier(&mut self, what: &str)->Result<Lexeme, CompileError>{
    let lexeme = self.next()?;
    if lexeme.is_identifier() {
      Ok(lexeme)
    } else {
      Err(SyntaxError::expected(what, &lexeme).into())
    }
  }
}

impl<'o, I: Iterator<Item = char>> DirectiveSource for TokenStream<'o, I>{
  fn peek_lexeme(&mut self)->Result<&Lexeme, LexError>{
    self.peek()
  }

  fn next_lexeme(&mut self)->Result<Lexeme, LexError>{
    self.next()
  }

  fn read_raw_line(&mut self)->String{
    self.lexer.read_raw_line()
  }

  fn defer_directive(&mut self, directive: RawDirective){
    self.deferred = Some(directive);
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ PARSER ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Builds a `ShaderScope` from HLSL-like source. The first syntax error
/// aborts the parse.
pub struct ShaderParser<'s>{
  tokens: TokenStream<'static, std::str::Chars<'s>>,
  blocks: BlockTree<Declaration>,
  entry_point: String,
  entry_defined_unconditionally: bool,
}

impl<'s> ShaderParser<'s>{
  pub fn new(source: &'s str, entry_point: &str)->Self{
    Self {
      tokens: TokenStream::new(StreamedLexer::from_text(source, c_family())),
      blocks: BlockTree::new(),
      entry_point: entry_point.to_owned(),
      entry_defined_unconditionally: false,
    }
  }

  pub fn parse(mut self)->Result<ShaderScope, CompileError>{
    loop {
      consider_directives(&mut self.tokens, &mut self.blocks)?;
      if let Some(directive) = self.tokens.take_deferred() {
        self.blocks.push_element(Declaration::Directive(directive));
        continue;
      }
      if self.tokens.eat_operator(Operator::Semicolon)? {
        continue;
      }
      let next = self.tokens.peek()?;
      if next.is_end() {
        let (line, column) = (next.line, next.column);
        self.blocks.finish(line, column)?;
        break;
      }
      let declaration = self.declaration()?;
      self.blocks.push_element(declaration);
    }
    debug!("parsed {} declarations", self.blocks.elements().len());
    Ok(ShaderScope { blocks: self.blocks, entry_point: self.entry_point })
  }

  fn declaration(&mut self)->Result<Declaration, CompileError>{
    let first = self.tokens.peek()?.clone();
    if first.is_keyword(Keyword::Struct.id()) {
      return Ok(Declaration::Struct(self.struct_declaration()?));
    }
    if first.is_keyword(Keyword::Cbuffer.id()) {
      return Ok(Declaration::ConstantBuffer(self.constant_buffer()?));
    }
    if first.is_keyword(Keyword::Static.id()) || first.is_keyword(Keyword::Const.id()) {
      return Ok(Declaration::Constant(self.constant()?));
    }

    let row_major = self.matrix_order()?;
    let ty = self.type_name()?;
    let name = self.tokens.expect_identifier("a declaration name")?;
    if self.tokens.peek()?.is_operator(Operator::LeftParen.id()) {
      return Ok(Declaration::Function(self.function(ty, name)?));
    }

    let array = self.array_size()?;
    if ty.is_resource() {
      self.register_hint(&name)?;
      self.tokens.expect_operator(Operator::Semicolon)?;
      if array.is_some() {
        return Err(SyntaxError::at(name.line, name.column, "Resource arrays are not supported").into());
      }
      return Ok(Declaration::Resource(Resource { name: name.raw_text, ty, source_start: (first.line, first.column) }));
    }
    self.tokens.expect_operator(Operator::Semicolon)?;
    Ok(Declaration::Global(Variable {
      name: name.raw_text,
      ty,
      array,
      row_major,
      directives: vec![],
      guard: Guard::default(),
      source_start: (first.line, first.column),
    }))
  }

  // ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ PIECES ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

  fn type_name(&mut self)->Result<Type, CompileError>{
    let lexeme = self.tokens.expect_identifier("a type name")?;
    Ok(Type::from_name(&lexeme.raw_text))
  }

  /// `row_major` / `column_major`, defaulting to column-major.
  fn matrix_order(&mut self)->Result<bool, CompileError>{
    if self.tokens.eat_keyword(Keyword::RowMajor)? {
      return Ok(true);
    }
    self.tokens.eat_keyword(Keyword::ColumnMajor)?;
    Ok(false)
  }

  fn interpolation(&mut self)->Result<Option<Interpolation>, CompileError>{
    let modifiers = [
      (Keyword::Linear, Interpolation::Linear),
      (Keyword::Nointerpolation, Interpolation::NoInterpolation),
      (Keyword::Centroid, Interpolation::Centroid),
      (Keyword::Noperspective, Interpolation::NoPerspective),
    ];
    for (keyword, interpolation) in modifiers{
      if self.tokens.eat_keyword(keyword)? {
        return Ok(Some(interpolation));
      }
    }
    Ok(None)
  }

  /// An optional `[N]` array declarator.
  fn array_size(&mut self)->Result<Option<u32>, CompileError>{
    if !self.tokens.eat_operator(Operator::LeftBracket)? {
      return Ok(None);
    }
    let size = self.tokens.next()?;
    let count = size.try_int_value()
      .and_then(|n| u32::try_from(n).ok())
      .filter(|n| *n > 0)
      .ok_or_else(|| SyntaxError::expected("a positive array size", &size))?;
    self.tokens.expect_operator(Operator::RightBracket)?;
    Ok(Some(count))
  }

  /// An optional `: SEMANTIC` annotation.
  fn semantic(&mut self)->Result<Option<String>, CompileError>{
    if !self.tokens.eat_operator(Operator::Colon)? {
      return Ok(None);
    }
    Ok(Some(self.tokens.expect_identifier("a semantic")?.raw_text))
  }

  /// Skip `: register(...)` or `: packoffset(...)`. Bindings are assigned by
  /// declaration order, so explicit registers are ignored.
  fn register_hint(&mut self, name: &Lexeme)->Result<(), CompileError>{
    if !self.tokens.eat_operator(Operator::Colon)? {
      return Ok(());
    }
    let keyword = self.tokens.next()?;
    if !keyword.is_keyword(Keyword::Register.id()) && !keyword.is_keyword(Keyword::Packoffset.id()) {
      return Err(SyntaxError::expected("'register' or 'packoffset'", &keyword).into());
    }
    self.tokens.expect_operator(Operator::LeftParen)?;
    let mut hint = String::new();
    loop {
      let lexeme = self.tokens.next()?;
      if lexeme.is_operator(Operator::RightParen.id()) {
        break;
      }
      if lexeme.is_end() {
        return Err(SyntaxError::expected("')'", &lexeme).into());
      }
      hint.push_str(&lexeme.raw_text);
    }
    warn!("ignoring {}({}) on '{}', bindings follow declaration order", keyword.raw_text, hint, name.raw_text);
    Ok(())
  }

  /// Read the preprocessor lines in front of a struct or cbuffer member,
  /// tracking the conditional groups they open and close in `guard`.
  fn member_directives(&mut self, guard: &mut Guard)->Result<Vec<String>, CompileError>{
    let mut directives = vec![];
    while self.tokens.peek()?.is_operator(Operator::Hash.id()) {
      let hash = self.tokens.next()?;
      let text = self.tokens.read_raw_line().trim().to_owned();
      let directive = Directive::classify(&text)
        .map_err(|e| SyntaxError::at(hash.line, hash.column, format!("Malformed directive '#{}': {}", text, e)))?;
      guard.apply(&directive, hash.line, hash.column)?;
      directives.push(text);
    }
    Ok(directives)
  }

  /// Consume the closing brace of a member list if it is next. Every group
  /// opened inside the braces must be closed by then.
  fn close_members(&mut self, guard: &Guard, owner: &Lexeme)->Result<bool, CompileError>{
    let next = self.tokens.peek()?;
    if !next.is_operator(Operator::RightBrace.id()) {
      return Ok(false);
    }
    if !guard.is_empty() {
      let message = format!("Unterminated #if in the body of '{}'", owner.raw_text);
      return Err(SyntaxError::at(next.line, next.column, message).into());
    }
    self.tokens.next()?;
    Ok(true)
  }

  fn struct_declaration(&mut self)->Result<StructDecl, CompileError>{
    let keyword = self.tokens.next()?;
    let name = self.tokens.expect_identifier("a struct name")?;
    self.tokens.expect_operator(Operator::LeftBrace)?;
    let mut fields = vec![];
    let mut guard = Guard::default();
    let trailing_directives = loop {
      let directives = self.member_directives(&mut guard)?;
      if self.close_members(&guard, &name)? {
        break directives;
      }
      let start = self.tokens.peek()?.clone();
      let interpolation = self.interpolation()?;
      let row_major = self.matrix_order()?;
      let ty = self.type_name()?;
      let field = self.tokens.expect_identifier("a field name")?;
      let array = self.array_size()?;
      let semantic = self.semantic()?;
      self.tokens.expect_operator(Operator::Semicolon)?;
      fields.push(StructField {
        name: field.raw_text,
        ty,
        array,
        semantic,
        interpolation,
        row_major,
        directives,
        guard: guard.clone(),
        source_start: (start.line, start.column),
      });
    };
    self.tokens.expect_operator(Operator::Semicolon)?;
    Ok(StructDecl { name: name.raw_text, fields, trailing_directives, source_start: (keyword.line, keyword.column) })
  }

  fn constant_buffer(&mut self)->Result<ConstantBuffer, CompileError>{
    let keyword = self.tokens.next()?;
    let name = self.tokens.expect_identifier("a constant buffer name")?;
    self.register_hint(&name)?;
    self.tokens.expect_operator(Operator::LeftBrace)?;
    let mut members = vec![];
    let mut guard = Guard::default();
    let trailing_directives = loop {
      let directives = self.member_directives(&mut guard)?;
      if self.close_members(&guard, &name)? {
        break directives;
      }
      let start = self.tokens.peek()?.clone();
      let row_major = self.matrix_order()?;
      let ty = self.type_name()?;
      let member = self.tokens.expect_identifier("a constant buffer member name")?;
      if ty.is_resource() {
        return Err(SyntaxError::at(member.line, member.column, "Resources cannot be declared inside a cbuffer").into());
      }
      let array = self.array_size()?;
      self.register_hint(&member)?;
      self.tokens.expect_operator(Operator::Semicolon)?;
      members.push(Variable {
        name: member.raw_text,
        ty,
        array,
        row_major,
        directives,
        guard: guard.clone(),
        source_start: (start.line, start.column),
      });
    };
    self.tokens.eat_operator(Operator::Semicolon)?;
    Ok(ConstantBuffer { name: name.raw_text, members, trailing_directives, source_start: (keyword.line, keyword.column) })
  }

  fn constant(&mut self)->Result<Constant, CompileError>{
    let start = self.tokens.peek()?.clone();
    self.tokens.eat_keyword(Keyword::Static)?;
    if !self.tokens.eat_keyword(Keyword::Const)? {
      let found = self.tokens.next()?;
      return Err(SyntaxError::expected("'const' (only static const globals are supported)", &found).into());
    }
    let ty = self.type_name()?;
    let name = self.tokens.expect_identifier("a constant name")?;
    let array = self.array_size()?;
    self.tokens.expect_operator(Operator::Assign)?;
    let mut initializer = vec![];
    let mut depth = 0usize;
    loop {
      let lexeme = self.tokens.next()?;
      if lexeme.is_end() {
        return Err(SyntaxError::expected("';'", &lexeme).into());
      }
      if depth == 0 && lexeme.is_operator(Operator::Semicolon.id()) {
        break;
      }
      if lexeme.is_operator(Operator::LeftBrace.id()) {
        depth += 1;
      } else if lexeme.is_operator(Operator::RightBrace.id()) {
        depth = depth.saturating_sub(1);
      }
      initializer.push(BodyItem::Token(lexeme));
    }
    Ok(Constant { name: name.raw_text, ty, array, initializer, source_start: (start.line, start.column) })
  }

  // ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ FUNCTIONS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

  fn parameter(&mut self)->Result<Parameter, CompileError>{
    let start = self.tokens.peek()?.clone();
    let mut modifier = ParameterModifier::In;
    let mut interpolation = None;
    loop {
      if self.tokens.eat_keyword(Keyword::In)? {
        modifier = ParameterModifier::In;
      } else if self.tokens.eat_keyword(Keyword::Out)? {
        modifier = ParameterModifier::Out;
      } else if self.tokens.eat_keyword(Keyword::Inout)? {
        modifier = ParameterModifier::InOut;
      } else if self.tokens.eat_keyword(Keyword::Uniform)? {
        modifier = ParameterModifier::Uniform;
      } else if let Some(found) = self.interpolation()? {
        interpolation = Some(found);
      } else {
        break;
      }
    }
    let ty = self.type_name()?;
    let name = self.tokens.expect_identifier("a parameter name")?;
    let semantic = self.semantic()?;
    Ok(Parameter { name: name.raw_text, ty, modifier, semantic, interpolation, source_start: (start.line, start.column) })
  }

  fn function(&mut self, return_type: Type, name: Lexeme)->Result<Function, CompileError>{
    self.tokens.expect_operator(Operator::LeftParen)?;
    let mut parameters = vec![];
    if !self.tokens.eat_operator(Operator::RightParen)? {
      if self.tokens.peek()?.raw_text == "void" {
        self.tokens.next()?;
      } else {
        loop {
          parameters.push(self.parameter()?);
          if !self.tokens.eat_operator(Operator::Comma)? {
            break;
          }
        }
      }
      self.tokens.expect_operator(Operator::RightParen)?;
    }
    let semantic = self.semantic()?;
    self.tokens.expect_operator(Operator::LeftBrace)?;
    let body = self.body()?;

    let is_entry_point = name.raw_text == self.entry_point;
    let root = self.blocks.root();
    let unconditional = self.blocks.cursor() == root && self.blocks.block(root).pre_condition.is_none();
    if is_entry_point && unconditional {
      if self.entry_defined_unconditionally {
        return Err(SyntaxError::at(name.line, name.column, format!("Entry point '{}' is defined twice", name.raw_text)).into());
      }
      self.entry_defined_unconditionally = true;
    }
    Ok(Function {
      name: name.raw_text,
      return_type,
      parameters,
      semantic,
      body,
      is_entry_point,
      source_start: (name.line, name.column),
    })
  }

  /// Collect the lexemes up to the brace closing the body. Preprocessor lines
  /// inside the body are kept verbatim.
  fn body(&mut self)->Result<Vec<BodyItem>, CompileError>{
    let mut body = vec![];
    let mut depth = 0usize;
    loop {
      let lexeme = self.tokens.next()?;
      match lexeme.content_type {
        ContentType::EndOfStream => return Err(SyntaxError::expected("'}' closing the function body", &lexeme).into()),
        ContentType::Operator if lexeme.is_operator(Operator::Hash.id()) => {
          let text = self.tokens.read_raw_line();
          body.push(BodyItem::Directive(text.trim().to_owned()));
          continue;
        }
        ContentType::Operator if lexeme.is_operator(Operator::LeftBrace.id()) => depth += 1,
        ContentType::Operator if lexeme.is_operator(Operator::RightBrace.id()) => {
          if depth == 0 {
            return Ok(body);
          }
          depth -= 1;
        }
        _ => (),
      }
      body.push(BodyItem::Token(lexeme));
    }
  }
}

/// Parse a shader source. The function called `entry_point` is marked as the
/// active entry point; other functions are kept as helpers.
pub fn parse_shader(source: &str, entry_point: &str)->Result<ShaderScope, CompileError>{
  ShaderParser::new(source, entry_point).parse()
}
