use std::sync::OnceLock;

use ahash::{AHashMap, AHashSet};
use strum::{EnumIter, FromRepr, IntoEnumIterator, IntoStaticStr};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ LEXER OPTIONS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The table driving a `StreamedLexer`: keywords and operators with their ids,
/// comment markers and quote characters.
///
/// Options are immutable once constructed. The canned presets live in statics
/// and are shared by reference between every lexer of a compile unit, and
/// between concurrently running compiles.
#[derive(Debug, Clone)]
pub struct LexerOptions{
  keywords: Vec<(u16, String)>,
  operators: Vec<(u16, String)>,
  line_comment: Option<String>,
  block_comment: Option<(String, String)>,
  string_quote: Option<char>,
  char_quote: Option<char>,
  extra_identifier_chars: Vec<char>,

  keyword_lookup: AHashMap<String, u16>,
  operator_lookup: AHashMap<String, u16>,
  // every prefix of every operator and comment start marker, complete ones included
  prefixes: AHashSet<String>,
}

impl LexerOptions{
  /// Creates a table from keyword and operator lists. Ids need not be unique
  /// across the two lists, but must be within each list.
  pub fn new(
    keywords: Vec<(u16, String)>,
    operators: Vec<(u16, String)>,
    line_comment: Option<String>,
    block_comment: Option<(String, String)>,
    string_quote: Option<char>,
    char_quote: Option<char>,
  )->Self{
    let keyword_lookup = keywords.iter().map(|(id, s)| (s.clone(), *id)).collect();
    let operator_lookup: AHashMap<String, u16> = operators.iter().map(|(id, s)| (s.clone(), *id)).collect();

    let mut prefixes = AHashSet::new();
    let markers = operators.iter().map(|(_, s)| s.as_str())
      .chain(line_comment.as_deref())
      .chain(block_comment.as_ref().map(|(start, _)| start.as_str()));
    for marker in markers{
      for (i, c) in marker.char_indices(){
        prefixes.insert(marker[..i + c.len_utf8()].to_owned());
      }
    }

    Self {
      keywords,
      operators,
      line_comment,
      block_comment,
      string_quote,
      char_quote,
      extra_identifier_chars: vec![],
      keyword_lookup,
      operator_lookup,
      prefixes,
    }
  }

  /// Allow additional characters inside (but not at the start of) identifiers.
  pub fn with_identifier_chars(mut self, chars: &str)->Self{
    self.extra_identifier_chars = chars.chars().collect();
    self
  }

  pub fn keywords(&self)->&[(u16, String)]{
    &self.keywords
  }

  pub fn operators(&self)->&[(u16, String)]{
    &self.operators
  }

  pub fn string_quote(&self)->Option<char>{
    self.string_quote
  }

  pub fn char_quote(&self)->Option<char>{
    self.char_quote
  }

  pub fn block_comment(&self)->Option<(&str, &str)>{
    self.block_comment.as_ref().map(|(s, e)| (s.as_str(), e.as_str()))
  }

  pub fn keyword_id(&self, text: &str)->Option<u16>{
    self.keyword_lookup.get(text).copied()
  }

  pub fn operator_id(&self, text: &str)->Option<u16>{
    self.operator_lookup.get(text).copied()
  }

  /// True if `text` is a prefix of some operator or comment start marker.
  pub fn is_marker_prefix(&self, text: &str)->bool{
    self.prefixes.contains(text)
  }

  pub fn is_line_comment(&self, text: &str)->bool{
    self.line_comment.as_deref() == Some(text)
  }

  pub fn is_block_comment_start(&self, text: &str)->bool{
    self.block_comment.as_ref().is_some_and(|(start, _)| start == text)
  }

  pub fn is_identifier_start(&self, c: char)->bool{
    c.is_alphabetic() || c == '_'
  }

  pub fn is_identifier_char(&self, c: char)->bool{
    c.is_alphanumeric() || c == '_' || self.extra_identifier_chars.contains(&c)
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ C-FAMILY PRESET ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Keywords of the C family preset, as understood by the shader parser.
/// Type names such as `float3` are identifiers, not keywords.
#[derive(EnumIter, IntoStaticStr, FromRepr, PartialEq, Eq, Hash, Debug, Copy, Clone)]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum Keyword{
  Struct,
  Cbuffer,
  Register,
  Packoffset,
  Return,
  If,
  Else,
  For,
  While,
  Do,
  Break,
  Continue,
  Discard,
  Switch,
  Case,
  Default,
  Static,
  Const,
  In,
  Out,
  Inout,
  Uniform,
  True,
  False,
  RowMajor,
  ColumnMajor,
  Linear,
  Nointerpolation,
  Centroid,
  Noperspective,
}

impl Keyword{
  pub fn id(self)->u16{
    self as u16
  }
}

/// Operators and punctuation of the C family preset.
#[derive(EnumIter, IntoStaticStr, FromRepr, PartialEq, Eq, Hash, Debug, Copy, Clone)]
#[repr(u16)]
pub enum Operator{
  #[strum(serialize = "#")] Hash,
  #[strum(serialize = "##")] HashHash,
  #[strum(serialize = "(")] LeftParen,
  #[strum(serialize = ")")] RightParen,
  #[strum(serialize = "[")] LeftBracket,
  #[strum(serialize = "]")] RightBracket,
  #[strum(serialize = "{")] LeftBrace,
  #[strum(serialize = "}")] RightBrace,
  #[strum(serialize = ";")] Semicolon,
  #[strum(serialize = ",")] Comma,
  #[strum(serialize = ":")] Colon,
  #[strum(serialize = "::")] ColonColon,
  #[strum(serialize = ".")] Dot,
  #[strum(serialize = "?")] Question,
  #[strum(serialize = "->")] Arrow,
  #[strum(serialize = "+")] Plus,
  #[strum(serialize = "-")] Minus,
  #[strum(serialize = "*")] Star,
  #[strum(serialize = "/")] Slash,
  #[strum(serialize = "%")] Percent,
  #[strum(serialize = "++")] PlusPlus,
  #[strum(serialize = "--")] MinusMinus,
  #[strum(serialize = "+=")] PlusAssign,
  #[strum(serialize = "-=")] MinusAssign,
  #[strum(serialize = "*=")] StarAssign,
  #[strum(serialize = "/=")] SlashAssign,
  #[strum(serialize = "%=")] PercentAssign,
  #[strum(serialize = "=")] Assign,
  #[strum(serialize = "==")] Equal,
  #[strum(serialize = "!=")] NotEqual,
  #[strum(serialize = "<")] Less,
  #[strum(serialize = ">")] Greater,
  #[strum(serialize = "<=")] LessEqual,
  #[strum(serialize = ">=")] GreaterEqual,
  #[strum(serialize = "<<")] ShiftLeft,
  #[strum(serialize = ">>")] ShiftRight,
  #[strum(serialize = "<<=")] ShiftLeftAssign,
  #[strum(serialize = ">>=")] ShiftRightAssign,
  #[strum(serialize = "&")] Ampersand,
  #[strum(serialize = "|")] Pipe,
  #[strum(serialize = "^")] Caret,
  #[strum(serialize = "~")] Tilde,
  #[strum(serialize = "!")] Bang,
  #[strum(serialize = "&&")] AndAnd,
  #[strum(serialize = "||")] OrOr,
  #[strum(serialize = "&=")] AndAssign,
  #[strum(serialize = "|=")] OrAssign,
  #[strum(serialize = "^=")] XorAssign,
}

impl Operator{
  pub fn id(self)->u16{
    self as u16
  }

  pub fn text(self)->&'static str{
    self.into()
  }
}

static C_FAMILY:OnceLock<LexerOptions> = OnceLock::new();
/// The preset for C, C++, C#, HLSL and GLSL sources.
pub fn c_family()->&'static LexerOptions{
  C_FAMILY.get_or_init(||{
    LexerOptions::new(
      Keyword::iter().map(|k| (k.id(), <&str>::from(k).to_owned())).collect(),
      Operator::iter().map(|o| (o.id(), o.text().to_owned())).collect(),
      Some("//".to_owned()),
      Some(("/*".to_owned(), "*/".to_owned())),
      Some('"'),
      Some('\''),
    )
  })
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ XML-FAMILY PRESET ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Operators of the XML family preset.
#[derive(EnumIter, IntoStaticStr, FromRepr, PartialEq, Eq, Hash, Debug, Copy, Clone)]
#[repr(u16)]
pub enum XmlOperator{
  #[strum(serialize = "<")] Open,
  #[strum(serialize = ">")] Close,
  #[strum(serialize = "</")] OpenEnd,
  #[strum(serialize = "/>")] CloseEmpty,
  #[strum(serialize = "<?")] OpenDeclaration,
  #[strum(serialize = "?>")] CloseDeclaration,
  #[strum(serialize = "<!")] OpenDoctype,
  #[strum(serialize = "=")] Assign,
  #[strum(serialize = "/")] Slash,
  #[strum(serialize = "?")] Question,
  #[strum(serialize = "!")] Bang,
}

static XML_FAMILY:OnceLock<LexerOptions> = OnceLock::new();
/// The preset for XML-like documents.
pub fn xml_family()->&'static LexerOptions{
  XML_FAMILY.get_or_init(||{
    LexerOptions::new(
      vec![],
      XmlOperator::iter().map(|o| (o as u16, <&str>::from(o).to_owned())).collect(),
      None,
      Some(("<!--".to_owned(), "-->".to_owned())),
      Some('"'),
      None,
    ).with_identifier_chars("-:.")
  })
}

#[cfg(test)]
mod tests{
  use super::*;

  #[test]
  fn c_family_tables(){
    let options = c_family();
    assert_eq!(options.keyword_id("cbuffer"), Some(Keyword::Cbuffer.id()));
    assert_eq!(options.keyword_id("row_major"), Some(Keyword::RowMajor.id()));
    assert_eq!(options.keyword_id("float3"), None);
    assert_eq!(options.operator_id(">>="), Some(Operator::ShiftRightAssign.id()));
    assert!(options.is_marker_prefix("/"));
    assert!(options.is_marker_prefix("/*"));
    assert!(!options.is_marker_prefix("/+"));
  }

  #[test]
  fn xml_family_marker_prefixes(){
    let options = xml_family();
    assert!(options.is_marker_prefix("<!-"));
    assert_eq!(options.operator_id("<!-"), None);
    assert!(options.is_block_comment_start("<!--"));
    assert!(options.is_identifier_char('-'));
  }
}
