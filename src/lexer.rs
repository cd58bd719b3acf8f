use std::iter::{Fuse, Peekable};

use crate::{error::LexError, lexeme::{ContentType, Lexeme, Payload}, options::LexerOptions};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ STREAMED LEXER ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Turns a stream of characters into a lazy sequence of lexemes, driven by a
/// `LexerOptions` table.
///
/// The lexer tracks the 1-based line and column of every lexeme it produces.
/// `\r\n`, a bare `\r` and a bare `\n` all count as a single line break. Up to
/// one character can be pushed back with `revert_character`, which is all the
/// lookahead operator and number classification need.
pub struct StreamedLexer<'o, I: Iterator<Item = char>>{
  source: Peekable<Fuse<I>>,
  options: &'o LexerOptions,
  pushback: Option<char>,
  line: usize,
  column: usize,
  // position before the last character read, restored on revert
  previous: (usize, usize),
  emit_comments: bool,
}

impl<'o, 's> StreamedLexer<'o, std::str::Chars<'s>>{
  /// Create a lexer reading from a string slice.
  pub fn from_text(source: &'s str, options: &'o LexerOptions)->Self{
    Self::new(source.chars(), options)
  }
}

impl<'o, I: Iterator<Item = char>> StreamedLexer<'o, I>{
  pub fn new(source: I, options: &'o LexerOptions)->Self{
    Self {
      source: source.fuse().peekable(),
      options,
      pushback: None,
      line: 1,
      column: 1,
      previous: (1, 1),
      emit_comments: false,
    }
  }

  pub fn options(&self)->&'o LexerOptions{
    self.options
  }

  /// When set, comments are returned as `Comment` lexemes instead of being skipped.
  pub fn set_emit_comments(&mut self, emit: bool){
    self.emit_comments = emit;
  }

  /// The position of the next character to be read.
  pub fn cursor_position(&self)->(usize, usize){
    (self.line, self.column)
  }

  // ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ CHARACTER LEVEL ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

  /// Read the next character, normalising every line break to `\n`.
  pub fn read_character(&mut self)->Option<char>{
    let c = match self.pushback.take() {
      Some(c) => c,
      None => {
        let c = self.source.next()?;
        if c == '\r' {
          if self.source.peek() == Some(&'\n') {
            self.source.next();
          }
          '\n'
        } else {
          c
        }
      }
    };
    self.previous = (self.line, self.column);
    if c == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(c)
  }

  /// Un-consume the character returned by the last `read_character` call so
  /// that it is read again next time.
  ///
  /// # Panics
  /// If a character is already pushed back.
  pub fn revert_character(&mut self, c: char){
    assert!(self.pushback.is_none(), "only one character of pushback is supported");
    self.pushback = Some(c);
    (self.line, self.column) = self.previous;
  }

  fn revert_option(&mut self, c: Option<char>){
    if let Some(c) = c {
      self.revert_character(c);
    }
  }

  /// Read verbatim text up to the end of the current line. The line break is
  /// consumed but not returned. A backslash directly before a line break
  /// continues the line; the continuation is kept in the returned text.
  pub fn read_raw_line(&mut self)->String{
    let mut text = String::new();
    while let Some(c) = self.read_character(){
      if c == '\n' {
        if text.ends_with('\\') {
          text.push(c);
          continue;
        }
        break;
      }
      text.push(c);
    }
    text
  }

  // ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ LEXEME LEVEL ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

  /// Produce the next lexeme. Once the input is exhausted an `EndOfStream`
  /// lexeme is returned, on this and every following call.
  pub fn next_lexeme(&mut self)->Result<Lexeme, LexError>{
    loop {
      self.skip_whitespace();
      let (line, column) = self.cursor_position();
      let Some(c) = self.read_character() else {
        return Ok(Lexeme::end_of_stream(line, column));
      };

      if self.options.is_identifier_start(c) {
        return Ok(self.identifier(c, line, column));
      }
      if c.is_ascii_digit() {
        return self.number(String::from(c), line, column);
      }
      if c == '.' {
        let next = self.read_character();
        if next.is_some_and(|n| n.is_ascii_digit()) {
          let mut text = String::from('.');
          text.extend(next);
          return self.number(text, line, column);
        }
        self.revert_option(next);
      }
      if Some(c) == self.options.string_quote() {
        return self.string(c, line, column);
      }
      if Some(c) == self.options.char_quote() {
        return self.character(c, line, column);
      }
      if self.options.is_marker_prefix(&c.to_string()) {
        match self.operator_or_comment(c, line, column)? {
          Some(lexeme) => return Ok(lexeme),
          // a skipped comment, look for the next lexeme
          None => continue,
        }
      }
      return Ok(Lexeme::new(line, column, ContentType::Unknown, c.to_string(), Payload::None));
    }
  }

  fn skip_whitespace(&mut self){
    while let Some(c) = self.read_character(){
      if !c.is_whitespace() {
        self.revert_character(c);
        break;
      }
    }
  }

  fn identifier(&mut self, first: char, line: usize, column: usize)->Lexeme{
    let mut text = String::from(first);
    while let Some(c) = self.read_character(){
      if self.options.is_identifier_char(c) {
        text.push(c);
      } else {
        self.revert_character(c);
        break;
      }
    }
    match self.options.keyword_id(&text) {
      Some(id) => Lexeme::new(line, column, ContentType::Keyword, text, Payload::Id(id)),
      None => Lexeme::new(line, column, ContentType::Identifier, text, Payload::None),
    }
  }

  /// Longest match against the operator table and the comment markers.
  /// Returns `None` for a comment that was skipped.
  fn operator_or_comment(&mut self, first: char, line: usize, column: usize)->Result<Option<Lexeme>, LexError>{
    let mut text = String::from(first);
    loop {
      let next = self.read_character();
      match next {
        Some(c) if self.options.is_marker_prefix(&format!("{}{}", text, c)) => text.push(c),
        _ => {
          self.revert_option(next);
          break;
        }
      }
    }

    if self.options.is_line_comment(&text) {
      while let Some(c) = self.read_character(){
        if c == '\n' {
          self.revert_character(c);
          break;
        }
        text.push(c);
      }
      return Ok(self.comment(text, line, column));
    }
    if self.options.is_block_comment_start(&text) {
      let options = self.options;
      let end = options.block_comment().map(|(_, end)| end).unwrap_or_default();
      let start_len = text.len();
      loop {
        match self.read_character() {
          Some(c) => text.push(c),
          None => return Err(LexError::new(line, column, "Unterminated block comment")),
        }
        // the end marker may not overlap the start marker, as in `/*/`
        if text.len() >= start_len + end.len() && text.ends_with(end) {
          break;
        }
      }
      return Ok(self.comment(text, line, column));
    }

    match self.options.operator_id(&text) {
      Some(id) => Ok(Some(Lexeme::new(line, column, ContentType::Operator, text, Payload::Id(id)))),
      None => Err(LexError::new(line, column, format!("Incomplete operator '{}'", text))),
    }
  }

  fn comment(&self, text: String, line: usize, column: usize)->Option<Lexeme>{
    if self.emit_comments {
      Some(Lexeme::new(line, column, ContentType::Comment, text, Payload::None))
    } else {
      None
    }
  }

  fn read_digits(&mut self, text: &mut String, radix: u32)->usize{
    let mut count = 0;
    while let Some(c) = self.read_character(){
      if c.is_digit(radix) {
        text.push(c);
        count += 1;
      } else {
        self.revert_character(c);
        break;
      }
    }
    count
  }

  /// Consume an integer or floating literal. `text` holds the characters
  /// already consumed: a digit, or a dot followed by a digit.
  fn number(&mut self, mut text: String, line: usize, column: usize)->Result<Lexeme, LexError>{
    let malformed = |text: &str| LexError::new(line, column, format!("Malformed numeric literal '{}'", text));
    let mut is_float = text.starts_with('.');
    let mut is_hex = false;

    if text == "0" {
      let next = self.read_character();
      match next {
        Some(x @ ('x' | 'X')) => {
          text.push(x);
          is_hex = true;
          if self.read_digits(&mut text, 16) == 0 {
            return Err(malformed(&text));
          }
        }
        _ => self.revert_option(next),
      }
    }

    if !is_hex {
      self.read_digits(&mut text, 10);
      if !is_float {
        let next = self.read_character();
        if next == Some('.') {
          text.push('.');
          is_float = true;
          self.read_digits(&mut text, 10);
        } else {
          self.revert_option(next);
        }
      }
      let next = self.read_character();
      match next {
        Some(e @ ('e' | 'E')) => {
          text.push(e);
          is_float = true;
          let sign = self.read_character();
          match sign {
            Some(s @ ('+' | '-')) => text.push(s),
            _ => self.revert_option(sign),
          }
          if self.read_digits(&mut text, 10) == 0 {
            return Err(malformed(&text));
          }
        }
        _ => self.revert_option(next),
      }
    }

    // suffixes, and identifier characters glued to the literal
    let digits_end = text.len();
    while let Some(c) = self.read_character(){
      if self.options.is_identifier_char(c) {
        text.push(c);
      } else {
        self.revert_character(c);
        break;
      }
    }
    let suffix = text[digits_end..].to_owned();
    let digits = &text[..digits_end];
    match suffix.as_str() {
      "" => (),
      "u" | "U" | "l" | "L" | "ul" | "UL" | "lu" | "LU" if !is_float => (),
      "f" | "F" | "h" | "H" | "lf" | "LF" if !is_hex => is_float = true,
      _ => return Err(malformed(&text)),
    }

    if is_float {
      let mut normalised = digits.replace(".e", ".0e").replace(".E", ".0E");
      if normalised.ends_with('.') {
        normalised.push('0');
      }
      let value = normalised.parse::<f64>().map_err(|_| malformed(&text))?;
      Ok(Lexeme::new(line, column, ContentType::FloatConstant, text, Payload::Float(value)))
    } else {
      let value = if is_hex {
        u64::from_str_radix(&digits[2..], 16).map(|v| v as i64)
      } else {
        digits.parse::<i64>()
      }.map_err(|_| malformed(&text))?;
      Ok(Lexeme::new(line, column, ContentType::IntConstant, text, Payload::Int(value)))
    }
  }

  /// Decode the escape sequence following a backslash.
  fn escape(&mut self, text: &mut String, line: usize, column: usize)->Result<char, LexError>{
    let unterminated = || LexError::new(line, column, "Unterminated escape sequence");
    let c = self.read_character().ok_or_else(unterminated)?;
    text.push(c);
    let decoded = match c {
      'n' => '\n',
      't' => '\t',
      'r' => '\r',
      'a' => '\x07',
      'b' => '\x08',
      'f' => '\x0c',
      'v' => '\x0b',
      '\\' | '"' | '\'' | '?' => c,
      'x' => {
        let mut digits = String::new();
        if self.read_digits(&mut digits, 16) == 0 {
          return Err(unterminated());
        }
        text.push_str(&digits);
        u32::from_str_radix(&digits, 16).ok()
          .and_then(char::from_u32)
          .ok_or_else(|| LexError::new(line, column, format!("Invalid escape sequence '\\x{}'", digits)))?
      }
      '0'..='7' => {
        let mut digits = String::from(c);
        while digits.len() < 3 {
          let next = self.read_character();
          match next {
            Some(d @ '0'..='7') => digits.push(d),
            _ => {
              self.revert_option(next);
              break;
            }
          }
        }
        text.push_str(&digits[1..]);
        u32::from_str_radix(&digits, 8).ok()
          .and_then(char::from_u32)
          .ok_or_else(|| LexError::new(line, column, format!("Invalid escape sequence '\\{}'", digits)))?
      }
      '\n' => return Err(unterminated()),
      other => return Err(LexError::new(line, column, format!("Unknown escape sequence '\\{}'", other))),
    };
    Ok(decoded)
  }

  /// Read a quoted literal, returning the verbatim text and the decoded content.
  fn quoted(&mut self, quote: char, line: usize, column: usize)->Result<(String, String), LexError>{
    let mut text = String::from(quote);
    let mut decoded = String::new();
    loop {
      let c = match self.read_character() {
        Some('\n') | None => return Err(LexError::new(line, column, "Unterminated literal")),
        Some(c) => c,
      };
      text.push(c);
      if c == quote {
        return Ok((text, decoded));
      }
      if c == '\\' {
        decoded.push(self.escape(&mut text, line, column)?);
      } else {
        decoded.push(c);
      }
    }
  }

  fn string(&mut self, quote: char, line: usize, column: usize)->Result<Lexeme, LexError>{
    let (text, _) = self.quoted(quote, line, column)?;
    Ok(Lexeme::new(line, column, ContentType::StringConstant, text, Payload::None))
  }

  fn character(&mut self, quote: char, line: usize, column: usize)->Result<Lexeme, LexError>{
    let (text, decoded) = self.quoted(quote, line, column)?;
    let mut chars = decoded.chars();
    match (chars.next(), chars.next()) {
      (Some(c), None) => Ok(Lexeme::new(line, column, ContentType::CharConstant, text, Payload::Char(c))),
      _ => Err(LexError::new(line, column, format!("Malformed character literal {}", text))),
    }
  }
}

impl<'o, I: Iterator<Item = char>> Iterator for StreamedLexer<'o, I>{
  type Item = Result<Lexeme, LexError>;

  /// Yields lexemes until the end of the stream, which is not yielded itself.
  fn next(&mut self)->Option<Self::Item>{
    match self.next_lexeme() {
      Ok(lexeme) if lexeme.is_end() => None,
      other => Some(other),
    }
  }
}

#[cfg(test)]
mod tests{
  use super::*;
  use crate::options::{c_family, xml_family, Operator, Keyword};

  fn lex_all(source: &str)->Vec<Lexeme>{
    StreamedLexer::from_text(source, c_family())
      .collect::<Result<Vec<_>, _>>()
      .expect("source should lex")
  }

  #[test]
  fn longest_operator_match(){
    let lexemes = lex_all("a >>= b > c");
    assert_eq!(lexemes.len(), 5);
    assert!(lexemes[1].is_operator(Operator::ShiftRightAssign.id()));
    assert_eq!(lexemes[1].raw_text, ">>=");
    assert!(lexemes[3].is_operator(Operator::Greater.id()));
  }

  #[test]
  fn keywords_and_identifiers(){
    let lexemes = lex_all("struct float3 cbuffer");
    assert!(lexemes[0].is_keyword(Keyword::Struct.id()));
    assert!(lexemes[1].is_identifier());
    assert!(lexemes[2].is_keyword(Keyword::Cbuffer.id()));
  }

  #[test]
  fn numeric_literals_round_trip(){
    for (text, value) in [("0", 0), ("42", 42), ("0x1F", 31), ("7u", 7), ("9223372036854775807", i64::MAX)]{
      let lexemes = lex_all(text);
      assert_eq!(lexemes.len(), 1, "{}", text);
      assert_eq!(lexemes[0].int_value(), value, "{}", text);
    }
    for (text, value) in [("1.0", 1.0), (".5", 0.5), ("3.", 3.0), ("2.5e3", 2500.0), ("1e-2", 0.01), ("0.25f", 0.25), ("4h", 4.0), ("1.e2", 100.0)]{
      let lexemes = lex_all(text);
      assert_eq!(lexemes.len(), 1, "{}", text);
      assert_eq!(lexemes[0].float_value(), value, "{}", text);
      assert_eq!(lexemes[0].raw_text, text);
    }
  }

  #[test]
  fn malformed_numbers(){
    for text in ["1e", "0x", "12abc", "1.5u", "0x1f2h"]{
      let result = StreamedLexer::from_text(text, c_family()).next_lexeme();
      assert!(result.is_err(), "{} should not lex", text);
    }
  }

  #[test]
  fn string_and_char_literals(){
    let lexemes = lex_all(r#""a\"b\n" '\n' '\x41' '\101' 'z'"#);
    assert_eq!(lexemes[0].content_type, ContentType::StringConstant);
    assert_eq!(lexemes[0].raw_text, r#""a\"b\n""#);
    assert_eq!(lexemes[1].char_value(), '\n');
    assert_eq!(lexemes[2].char_value(), 'A');
    assert_eq!(lexemes[3].char_value(), 'A');
    assert_eq!(lexemes[4].char_value(), 'z');
  }

  #[test]
  fn unterminated_literals_and_comments(){
    for text in ["\"abc", "'a", "\"a\nb\"", "/* never closed", "'\\q'"]{
      let error = StreamedLexer::from_text(text, c_family()).next_lexeme().unwrap_err();
      assert_eq!((error.line, error.column), (1, 1), "{}", text);
    }
  }

  #[test]
  fn comments_keep_positions(){
    let lexemes = lex_all("a /* one\ntwo\r\nthree */ b // tail\n  c");
    assert_eq!((lexemes[0].line, lexemes[0].column), (1, 1));
    assert_eq!((lexemes[1].line, lexemes[1].column), (3, 10));
    assert_eq!((lexemes[2].line, lexemes[2].column), (4, 3));
  }

  #[test]
  fn line_breaks_count_once(){
    let lexemes = lex_all("a\r\nb\rc\nd");
    let lines: Vec<usize> = lexemes.iter().map(|l| l.line).collect();
    assert_eq!(lines, vec![1, 2, 3, 4]);
  }

  #[test]
  fn raw_comment_mode(){
    let mut lexer = StreamedLexer::from_text("x // note\n/* block */", c_family());
    lexer.set_emit_comments(true);
    lexer.next_lexeme().unwrap();
    let line = lexer.next_lexeme().unwrap();
    assert_eq!(line.content_type, ContentType::Comment);
    assert_eq!(line.raw_text, "// note");
    let block = lexer.next_lexeme().unwrap();
    assert_eq!(block.raw_text, "/* block */");
    assert_eq!(block.line, 2);
  }

  #[test]
  fn end_of_stream_is_idempotent(){
    let mut lexer = StreamedLexer::from_text("x", c_family());
    assert!(lexer.next_lexeme().unwrap().is_identifier());
    for _ in 0..3{
      assert!(lexer.next_lexeme().unwrap().is_end());
    }
  }

  #[test]
  fn revert_character_rereads(){
    let mut lexer = StreamedLexer::from_text("ab", c_family());
    let a = lexer.read_character().unwrap();
    lexer.revert_character(a);
    assert_eq!(lexer.cursor_position(), (1, 1));
    assert_eq!(lexer.next_lexeme().unwrap().raw_text, "ab");
  }

  #[test]
  fn raw_line_follows_continuations(){
    let mut lexer = StreamedLexer::from_text("if A && \\\n B\nnext", c_family());
    assert_eq!(lexer.read_raw_line(), "if A && \\\n B");
    let next = lexer.next_lexeme().unwrap();
    assert_eq!((next.raw_text.as_str(), next.line), ("next", 3));
  }

  #[test]
  fn unknown_characters(){
    let lexemes = lex_all("a $ b");
    assert_eq!(lexemes[1].content_type, ContentType::Unknown);
    assert_eq!(lexemes[1].raw_text, "$");
  }

  #[test]
  fn xml_preset(){
    let lexemes: Vec<Lexeme> = StreamedLexer::from_text("<a-b x=\"1\"/><!-- c -->", xml_family())
      .collect::<Result<_, _>>().unwrap();
    let texts: Vec<&str> = lexemes.iter().map(|l| l.raw_text.as_str()).collect();
    assert_eq!(texts, vec!["<", "a-b", "x", "=", "\"1\"", "/>"]);
    let broken = StreamedLexer::from_text("<!-x", xml_family()).next_lexeme();
    assert!(broken.is_err());
  }
}
