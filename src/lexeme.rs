use std::fmt;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ WHAT IS A LEXEME? ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The classification of a lexeme.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ContentType{
  Identifier,
  Keyword,
  Operator,
  Comment,
  StringConstant,
  CharConstant,
  IntConstant,
  FloatConstant,
  Unknown,
  EndOfStream,
}

/// The decoded value of a lexeme. Which variant is present depends on the
/// content type: keywords and operators carry their table id, char constants
/// the decoded character and numeric constants their decoded value.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Payload{
  None,
  Char(char),
  Int(i64),
  Float(f64),
  Id(u16),
}

#[derive(Clone, PartialEq, Debug)]
/// A classified token with its position in the source code, the verbatim
/// source slice it was read from and a decoded payload.
pub struct Lexeme{
  pub line: usize,
  pub column: usize,
  pub content_type: ContentType,
  pub raw_text: String,
  pub payload: Payload,
}

impl Lexeme{
  pub fn new(line: usize, column: usize, content_type: ContentType, raw_text: String, payload: Payload)->Self{
    Self { line, column, content_type, raw_text, payload }
  }

  /// The sentinel returned once the input is exhausted.
  pub fn end_of_stream(line: usize, column: usize)->Self{
    Self::new(line, column, ContentType::EndOfStream, String::new(), Payload::None)
  }

  pub fn is_end(&self)->bool{
    self.content_type == ContentType::EndOfStream
  }

  pub fn is_identifier(&self)->bool{
    self.content_type == ContentType::Identifier
  }

  /// True if this is the keyword with the given table id.
  pub fn is_keyword(&self, id: u16)->bool{
    self.content_type == ContentType::Keyword && self.payload == Payload::Id(id)
  }

  /// True if this is the operator with the given table id.
  pub fn is_operator(&self, id: u16)->bool{
    self.content_type == ContentType::Operator && self.payload == Payload::Id(id)
  }

  // ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ PAYLOAD ACCESS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

  pub fn try_char_value(&self)->Option<char>{
    match (self.content_type, self.payload) {
      (ContentType::CharConstant, Payload::Char(c)) => Some(c),
      _ => None,
    }
  }

  pub fn try_int_value(&self)->Option<i64>{
    match (self.content_type, self.payload) {
      (ContentType::IntConstant, Payload::Int(i)) => Some(i),
      _ => None,
    }
  }

  pub fn try_float_value(&self)->Option<f64>{
    match (self.content_type, self.payload) {
      (ContentType::FloatConstant, Payload::Float(f)) => Some(f),
      _ => None,
    }
  }

  pub fn try_id(&self)->Option<u16>{
    match (self.content_type, self.payload) {
      (ContentType::Keyword | ContentType::Operator, Payload::Id(id)) => Some(id),
      _ => None,
    }
  }

  /// The decoded character of a char constant.
  ///
  /// # Panics
  /// If the lexeme is not a `CharConstant`.
  #[track_caller]
  pub fn char_value(&self)->char{
    match self.try_char_value() {
      Some(c) => c,
      None => self.wrong_accessor("char"),
    }
  }

  /// The decoded value of an int constant.
  ///
  /// # Panics
  /// If the lexeme is not an `IntConstant`.
  #[track_caller]
  pub fn int_value(&self)->i64{
    match self.try_int_value() {
      Some(i) => i,
      None => self.wrong_accessor("int"),
    }
  }

  /// The decoded value of a float constant.
  ///
  /// # Panics
  /// If the lexeme is not a `FloatConstant`.
  #[track_caller]
  pub fn float_value(&self)->f64{
    match self.try_float_value() {
      Some(f) => f,
      None => self.wrong_accessor("float"),
    }
  }

  /// The table id of a keyword or operator.
  ///
  /// # Panics
  /// If the lexeme is neither a `Keyword` nor an `Operator`.
  #[track_caller]
  pub fn id(&self)->u16{
    match self.try_id() {
      Some(id) => id,
      None => self.wrong_accessor("keyword/operator id"),
    }
  }

  #[track_caller]
  fn wrong_accessor(&self, wanted: &str)->!{
    panic!(
      "lexeme '{}' at line {}, column {} is a {:?} and has no {} payload",
      self.raw_text, self.line, self.column, self.content_type, wanted
    )
  }
}

impl fmt::Display for Lexeme{
  fn fmt(&self, f: &mut fmt::Formatter<'_>)->fmt::Result{
    if self.is_end() {
      f.write_str("<end of stream>")
    } else {
      f.write_str(&self.raw_text)
    }
  }
}
