use log::trace;
use pest::Parser;

use crate::{error::{CompileError, LexError, SyntaxError}, lexeme::Lexeme, options::Operator};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ CLASSIFY DIRECTIVES ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[derive(pest_derive::Parser)]
#[grammar = "directive.pest"]
struct DirectiveParser;

/// A preprocessor directive, holding the verbatim text that followed the `#`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive{
  /// `#if`, `#ifdef` or `#ifndef`
  If(String),
  Elif(String),
  Else(String),
  Endif(String),
  /// Any directive the block tree does not track, e.g. `#pragma` or `#define`.
  Other(String),
}

impl Directive{
  /// Classify the text following a `#`.
  pub fn classify(text: &str)->Result<Self, String>{
    let mut pairs = DirectiveParser::parse(Rule::directive, text).map_err(|e| e.to_string())?;
    let kind = pairs.next()
      .and_then(|directive| directive.into_inner().next())
      .map(|pair| pair.as_rule());
    let text = text.to_owned();
    Ok(match kind {
      Some(Rule::if_directive) => Directive::If(text),
      Some(Rule::elif_directive) => Directive::Elif(text),
      Some(Rule::else_directive) => Directive::Else(text),
      Some(Rule::endif_directive) => Directive::Endif(text),
      _ => Directive::Other(text),
    })
  }

  pub fn text(&self)->&str{
    match self {
      Directive::If(text) | Directive::Elif(text) | Directive::Else(text) |
      Directive::Endif(text) | Directive::Other(text) => text,
    }
  }
}

/// A directive that was read from the source but is not tracked by the block
/// tree. It is handed back to the parser to be kept as a passthrough line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirective{
  pub line: usize,
  pub column: usize,
  pub text: String,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ MEMBER GUARDS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The conditional groups open at a member of a struct or cbuffer body. A
/// group holds its `#if` followed by the `#elif`/`#else` branches seen so far,
/// so its last directive is the branch the member sits in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Guard(Vec<Vec<String>>);

impl Guard{
  pub fn is_empty(&self)->bool{
    self.0.is_empty()
  }

  /// Track a directive read between two members. Non-conditional directives
  /// leave the guard as it is.
  pub fn apply(&mut self, directive: &Directive, line: usize, column: usize)->Result<(), SyntaxError>{
    match directive {
      Directive::If(text) => self.0.push(vec![text.clone()]),
      Directive::Elif(text) | Directive::Else(text) => {
        self.0.last_mut()
          .ok_or_else(|| SyntaxError::at(line, column, format!("Unexpected #{}, no matching #if", text)))?
          .push(text.clone());
      }
      Directive::Endif(_) => {
        self.0.pop().ok_or_else(|| SyntaxError::at(line, column, "Unmatched #endif"))?;
      }
      Directive::Other(_) => (),
    }
    Ok(())
  }

  /// Surround generated lines with the directives selecting the member.
  pub fn wrap(&self, lines: &str)->String{
    let mut out = String::new();
    for directive in self.0.iter().flatten(){
      out.push_str(&format!("#{}\n", directive));
    }
    out.push_str(lines);
    for _ in &self.0{
      out.push_str("#endif\n");
    }
    out
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ BLOCK TREE ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Index of a block in its `BlockTree`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct BlockId(usize);

/// An entry of a block: either an element belonging directly to the block or
/// a nested conditional block. Keeping both in one list preserves their
/// relative order for re-emission.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<E>{
  Element(E),
  Block(BlockId),
}

/// A conditional compilation region.
#[derive(Debug, Clone, PartialEq)]
pub struct Block<E>{
  /// Text of the directive that opened the block, e.g. `if FOO` or `else`.
  pub pre_condition: Option<String>,
  /// Text of the `#endif` that closed the block.
  pub post_condition: Option<String>,
  contents: Vec<Node<E>>,
  parent: Option<BlockId>,
}

impl<E> Block<E>{
  fn new(pre_condition: Option<String>, parent: Option<BlockId>)->Self{
    Self { pre_condition, post_condition: None, contents: vec![], parent }
  }

  /// Child blocks count as content, so a group following another one at the
  /// same level opens a sibling instead of conditioning the whole block.
  fn has_content(&self)->bool{
    self.pre_condition.is_some() || !self.contents.is_empty()
  }

  pub fn parent(&self)->Option<BlockId>{
    self.parent
  }

  pub fn contents(&self)->&[Node<E>]{
    &self.contents
  }

  pub fn elements(&self)->impl Iterator<Item = &E>{
    self.contents.iter().filter_map(|node| match node {
      Node::Element(e) => Some(e),
      Node::Block(_) => None,
    })
  }

  pub fn children(&self)->impl Iterator<Item = BlockId> + '_{
    self.contents.iter().filter_map(|node| match node {
      Node::Block(id) => Some(*id),
      Node::Element(_) => None,
    })
  }
}

/// The tree of nested `#if/#elif/#else/#endif` regions of a source, stored
/// in an arena. A cursor points at the block new elements are added to.
///
/// Sibling branches of one conditional group (`#if`, `#elif`, `#else`) are
/// sibling blocks; only the last one carries the `#endif` as post condition.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTree<E>{
  blocks: Vec<Block<E>>,
  root: BlockId,
  cursor: BlockId,
  synthesized_roots: usize,
}

impl<E> Default for BlockTree<E>{
  fn default()->Self{
    Self::new()
  }
}

impl<E> BlockTree<E>{
  pub fn new()->Self{
    Self { blocks: vec![Block::new(None, None)], root: BlockId(0), cursor: BlockId(0), synthesized_roots: 0 }
  }

  pub fn root(&self)->BlockId{
    self.root
  }

  pub fn cursor(&self)->BlockId{
    self.cursor
  }

  pub fn block(&self, id: BlockId)->&Block<E>{
    &self.blocks[id.0]
  }

  /// Number of blocks between the cursor and the root.
  pub fn depth(&self)->usize{
    let mut depth = 0;
    let mut current = self.block(self.cursor).parent;
    while let Some(parent) = current{
      depth += 1;
      current = self.block(parent).parent;
    }
    depth
  }

  /// How many times an unconditioned root had to be put above a conditioned one.
  pub fn synthesized_roots(&self)->usize{
    self.synthesized_roots
  }

  pub fn push_element(&mut self, element: E){
    self.blocks[self.cursor.0].contents.push(Node::Element(element));
  }

  /// All elements in source order, regardless of the conditions around them.
  pub fn elements(&self)->Vec<&E>{
    let mut result = vec![];
    self.collect_elements(self.root, &mut result);
    result
  }

  fn collect_elements<'a>(&'a self, id: BlockId, result: &mut Vec<&'a E>){
    for node in &self.block(id).contents{
      match node {
        Node::Element(e) => result.push(e),
        Node::Block(child) => self.collect_elements(*child, result),
      }
    }
  }

  fn open_block(&mut self, parent: BlockId, pre_condition: String)->BlockId{
    let id = BlockId(self.blocks.len());
    self.blocks.push(Block::new(Some(pre_condition), Some(parent)));
    self.blocks[parent.0].contents.push(Node::Block(id));
    self.cursor = id;
    id
  }

  /// Put a fresh unconditioned root above the current root.
  fn synthesize_root(&mut self){
    let old_root = self.root;
    let new_root = BlockId(self.blocks.len());
    let mut block = Block::new(None, None);
    block.contents.push(Node::Block(old_root));
    self.blocks.push(block);
    self.blocks[old_root.0].parent = Some(new_root);
    self.root = new_root;
    self.synthesized_roots += 1;
    trace!("synthesized root {:?} above {:?}", new_root, old_root);
  }

  /// Apply a conditional directive, moving the cursor. `line` and `column`
  /// locate the directive for error messages.
  pub fn apply(&mut self, directive: Directive, line: usize, column: usize)->Result<(), SyntaxError>{
    let current = self.cursor;
    match directive {
      Directive::Endif(text) => {
        if current == self.root && self.block(current).pre_condition.is_some() {
          self.synthesize_root();
        }
        let block = &mut self.blocks[current.0];
        let parent = block.parent
          .ok_or_else(|| SyntaxError::at(line, column, "Unmatched #endif"))?;
        block.post_condition = Some(text);
        self.cursor = parent;
      }
      Directive::If(text) => {
        if self.block(current).has_content() {
          self.open_block(current, text);
        } else {
          self.blocks[current.0].pre_condition = Some(text);
        }
      }
      Directive::Elif(text) | Directive::Else(text) => {
        if current == self.root {
          if self.block(current).pre_condition.is_none() {
            return Err(SyntaxError::at(line, column, format!("Unexpected #{}, no matching #if", text)));
          }
          self.synthesize_root();
        }
        let parent = self.block(current).parent
          .ok_or_else(|| SyntaxError::at(line, column, format!("Unexpected #{}, no matching #if", text)))?;
        self.open_block(parent, text);
      }
      Directive::Other(text) => {
        return Err(SyntaxError::at(line, column, format!("#{} is not a conditional directive", text)));
      }
    }
    trace!("block cursor at {:?}, depth {}", self.cursor, self.depth());
    Ok(())
  }

  /// Check that every conditional region was closed.
  pub fn finish(&self, line: usize, column: usize)->Result<(), SyntaxError>{
    let root = self.block(self.root);
    if self.cursor != self.root || root.pre_condition.is_some() {
      return Err(SyntaxError::at(line, column, "Unterminated #if at end of input"));
    }
    Ok(())
  }

  /// Re-emit the tree, writing every directive around the output of
  /// `emit_element` for the elements inside the region.
  pub fn emit<Err>(
    &self,
    out: &mut String,
    emit_element: &mut dyn FnMut(&E, &mut String)->Result<(), Err>,
  )->Result<(), Err>{
    self.emit_block(self.root, out, emit_element)
  }

  fn emit_block<Err>(
    &self,
    id: BlockId,
    out: &mut String,
    emit_element: &mut dyn FnMut(&E, &mut String)->Result<(), Err>,
  )->Result<(), Err>{
    let block = self.block(id);
    if let Some(pre) = &block.pre_condition {
      out.push_str(&format!("#{}\n", pre));
    }
    for node in &block.contents{
      match node {
        Node::Element(e) => emit_element(e, out)?,
        Node::Block(child) => self.emit_block(*child, out, emit_element)?,
      }
    }
    if let Some(post) = &block.post_condition {
      out.push_str(&format!("#{}\n", post));
    }
    Ok(())
  }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ CONSIDER DIRECTIVES ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// A lexeme stream with one lexeme of lookahead that can also hand out the
/// raw text of the rest of the current line.
pub trait DirectiveSource{
  fn peek_lexeme(&mut self)->Result<&Lexeme, LexError>;
  fn next_lexeme(&mut self)->Result<Lexeme, LexError>;
  fn read_raw_line(&mut self)->String;
  /// Hand a directive the block tree does not track back to the parser.
  fn defer_directive(&mut self, directive: RawDirective);
}

/// If the next lexeme is a `#`, read the directive and record it in the tree.
///
/// Returns `true` when there is nothing (more) for the block tree to do at
/// this point: the next lexeme is not a `#`, or the directive was not a
/// conditional one and was deferred to the parser.
pub fn consider_directive<E, S: DirectiveSource>(source: &mut S, tree: &mut BlockTree<E>)->Result<bool, CompileError>{
  if !source.peek_lexeme()?.is_operator(Operator::Hash.id()) {
    return Ok(true);
  }
  let hash = source.next_lexeme()?;
  let text = source.read_raw_line().trim().to_owned();
  let directive = Directive::classify(&text)
    .map_err(|e| SyntaxError::at(hash.line, hash.column, format!("Malformed directive '#{}': {}", text, e)))?;
  trace!("directive #{} at line {}", text, hash.line);
  match directive {
    Directive::Other(text) => {
      source.defer_directive(RawDirective { line: hash.line, column: hash.column, text });
      Ok(true)
    }
    conditional => {
      tree.apply(conditional, hash.line, hash.column)?;
      Ok(false)
    }
  }
}

/// Drain every conditional directive pending at the cursor.
pub fn consider_directives<E, S: DirectiveSource>(source: &mut S, tree: &mut BlockTree<E>)->Result<(), CompileError>{
  while !consider_directive(source, tree)? {}
  Ok(())
}

#[cfg(test)]
mod tests{
  use super::*;
  use crate::{lexer::StreamedLexer, options::c_family};

  /// A directive source over a lexer, with the elements being identifiers.
  struct Source<'a>{
    lexer: StreamedLexer<'static, std::str::Chars<'a>>,
    peeked: Option<Lexeme>,
    deferred: Vec<RawDirective>,
  }

  impl<'a> Source<'a>{
    fn new(text: &'a str)->Self{
      Self { lexer: StreamedLexer::from_text(text, c_family()), peeked: None, deferred: vec![] }
    }
  }

  impl DirectiveSource for Source<'_>{
    fn peek_lexeme(&mut self)->Result<&Lexeme, LexError>{
      if self.peeked.is_none() {
        self.peeked = Some(self.lexer.next_lexeme()?);
      }
      Ok(self.peeked.as_ref().unwrap())
    }
    fn next_lexeme(&mut self)->Result<Lexeme, LexError>{
      match self.peeked.take() {
        Some(lexeme) => Ok(lexeme),
        None => self.lexer.next_lexeme(),
      }
    }
    fn read_raw_line(&mut self)->String{
      self.lexer.read_raw_line()
    }
    fn defer_directive(&mut self, directive: RawDirective){
      self.deferred.push(directive);
    }
  }

  fn build(text: &str)->Result<BlockTree<String>, CompileError>{
    let mut source = Source::new(text);
    let mut tree = BlockTree::new();
    loop {
      consider_directives(&mut source, &mut tree)?;
      source.deferred.clear();
      let lexeme = source.next_lexeme()?;
      if lexeme.is_end() {
        tree.finish(lexeme.line, lexeme.column)?;
        return Ok(tree);
      }
      tree.push_element(lexeme.raw_text);
    }
  }

  fn emit(tree: &BlockTree<String>)->String{
    let mut out = String::new();
    tree.emit::<()>(&mut out, &mut |e, out| { out.push_str(e); out.push('\n'); Ok(()) }).unwrap();
    out
  }

  #[test]
  fn classify_directives(){
    assert_eq!(Directive::classify("if FOO").unwrap(), Directive::If("if FOO".into()));
    assert_eq!(Directive::classify("ifdef FOO").unwrap(), Directive::If("ifdef FOO".into()));
    assert_eq!(Directive::classify("if(FOO)").unwrap(), Directive::If("if(FOO)".into()));
    assert_eq!(Directive::classify("elif BAR > 2").unwrap(), Directive::Elif("elif BAR > 2".into()));
    assert_eq!(Directive::classify("else").unwrap(), Directive::Else("else".into()));
    assert_eq!(Directive::classify("endif // FOO").unwrap(), Directive::Endif("endif // FOO".into()));
    assert_eq!(Directive::classify("pragma once").unwrap(), Directive::Other("pragma once".into()));
    assert_eq!(Directive::classify("iffy").unwrap(), Directive::Other("iffy".into()));
    assert!(Directive::classify("if").is_err());
  }

  #[test]
  fn nested_blocks_unwind_to_root(){
    let tree = build("a\n#if A\nb\n#if B\nc\n#elif C\nd\n#else\ne\n#endif\nf\n#endif\ng\n").unwrap();
    assert_eq!(tree.depth(), 0);
    assert_eq!(tree.synthesized_roots(), 0);
    let root = tree.block(tree.root());
    assert_eq!(root.children().count(), 1);
    let outer = tree.block(root.children().next().unwrap());
    assert_eq!(outer.pre_condition.as_deref(), Some("if A"));
    assert_eq!(outer.post_condition.as_deref(), Some("endif"));
    let branches: Vec<_> = outer.children().map(|id| tree.block(id).pre_condition.clone().unwrap()).collect();
    assert_eq!(branches, vec!["if B", "elif C", "else"]);
    for id in outer.children(){
      assert_eq!(tree.block(id).parent(), Some(root.children().next().unwrap()));
    }
    assert_eq!(emit(&tree), "a\n#if A\nb\n#if B\nc\n#elif C\nd\n#else\ne\n#endif\nf\n#endif\ng\n");
  }

  #[test]
  fn leading_if_is_wrapped_once(){
    let tree = build("#if A\nx\n#elif B\ny\n#else\nz\n#endif\nw\n").unwrap();
    assert_eq!(tree.synthesized_roots(), 1);
    assert_eq!(tree.depth(), 0);
    assert!(tree.block(tree.root()).pre_condition.is_none());
    assert_eq!(emit(&tree), "#if A\nx\n#elif B\ny\n#else\nz\n#endif\nw\n");
  }

  #[test]
  fn leading_if_without_else(){
    let tree = build("#ifdef A\nx\n#endif\n").unwrap();
    assert_eq!(tree.synthesized_roots(), 1);
    assert_eq!(emit(&tree), "#ifdef A\nx\n#endif\n");
  }

  #[test]
  fn consecutive_leading_groups_stay_siblings(){
    let tree = build("#if A\nx\n#endif\n#if B\ny\n#endif\n").unwrap();
    assert_eq!(tree.synthesized_roots(), 1);
    let root = tree.block(tree.root());
    assert!(root.pre_condition.is_none());
    let groups: Vec<_> = root.children().map(|id| tree.block(id).pre_condition.clone().unwrap()).collect();
    assert_eq!(groups, vec!["if A", "if B"]);
    assert_eq!(emit(&tree), "#if A\nx\n#endif\n#if B\ny\n#endif\n");
  }

  #[test]
  fn group_after_else_branch_stays_sibling(){
    let tree = build("#if A\nx\n#else\ny\n#endif\n#if B\nz\n#endif\n").unwrap();
    assert_eq!(tree.depth(), 0);
    let root = tree.block(tree.root());
    assert!(root.pre_condition.is_none());
    assert_eq!(root.children().count(), 3);
    assert_eq!(emit(&tree), "#if A\nx\n#else\ny\n#endif\n#if B\nz\n#endif\n");
  }

  #[test]
  fn guards_follow_member_branches(){
    let mut guard = Guard::default();
    assert_eq!(guard.wrap("x;\n"), "x;\n");
    for text in ["ifdef A", "if B", "else", "define C 1"]{
      guard.apply(&Directive::classify(text).unwrap(), 1, 1).unwrap();
    }
    assert_eq!(guard.wrap("x;\n"), "#ifdef A\n#if B\n#else\nx;\n#endif\n#endif\n");
    guard.apply(&Directive::classify("endif").unwrap(), 1, 1).unwrap();
    assert_eq!(guard.wrap("x;\n"), "#ifdef A\nx;\n#endif\n");
    guard.apply(&Directive::classify("endif").unwrap(), 1, 1).unwrap();
    assert!(guard.is_empty());
    assert!(guard.apply(&Directive::classify("endif").unwrap(), 4, 1).is_err());
    assert!(guard.apply(&Directive::classify("else").unwrap(), 4, 1).is_err());
  }

  #[test]
  fn unmatched_endif_is_an_error(){
    let error = build("a\n#endif\n").unwrap_err();
    assert!(matches!(error, CompileError::Syntax(SyntaxError { line: 2, .. })));
    assert!(build("#if A\na\n#endif\n#endif\n").is_err());
  }

  #[test]
  fn else_without_if_is_an_error(){
    assert!(build("#else\na\n#endif\n").is_err());
    assert!(build("a\n#elif B\n").is_err());
  }

  #[test]
  fn unterminated_if_is_an_error(){
    assert!(build("a\n#if A\nb\n").is_err());
    assert!(build("#if A\nb\n").is_err());
  }

  #[test]
  fn other_directives_are_deferred(){
    let mut source = Source::new("#pragma once\nx");
    let mut tree: BlockTree<String> = BlockTree::new();
    assert!(consider_directive(&mut source, &mut tree).unwrap());
    assert_eq!(source.deferred, vec![RawDirective { line: 1, column: 1, text: "pragma once".into() }]);
    assert_eq!(source.next_lexeme().unwrap().raw_text, "x");
  }
}
