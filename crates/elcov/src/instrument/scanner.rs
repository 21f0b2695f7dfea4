//! Lexical statement and function instrumenter
//!
//! Walks JavaScript source once, tracking bracket nesting and just enough
//! grammar context (statement position, function bodies, regex versus
//! division) to place istanbul-style counters without building a syntax
//! tree. Counters are spliced in on the line they count, so original line
//! numbers survive instrumentation.
//!
//! ## Output shape
//!
//! ```text
//! var __cov_1a2b = ...; __cov_1a2b.s['1']++;var x = 1;
//! function f() {
//!   __cov_1a2b.f['1']++;__cov_1a2b.s['3']++;return x;
//! }
//! ```

use super::{Instrument, Instrumented};
use crate::coverage::{FileCoverage, FunctionMeta, Position, Range};
use crate::digest::sha256_hex;
use crate::result::{ElcovError, ElcovResult};
use std::path::Path;

/// Global object property holding every file's counters
const DEFAULT_COVERAGE_VARIABLE: &str = "__coverage__";

const KEYWORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "export", "extends", "finally", "for", "function", "if", "import",
    "in", "instanceof", "let", "new", "return", "switch", "throw", "try", "typeof", "var",
    "void", "while", "with", "yield",
];

/// Words that behave like literal operands
const LITERAL_WORDS: &[&str] = &["this", "super", "true", "false", "null"];

/// Longest first
const OPERATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "+", "-", "*", "/", "%", "&", "|", "^", "!", "~", "<", ">",
    "=", "?", ":", ";", ",", ".", "@",
];

/// Built-in [`Instrument`] implementation
///
/// Tracks statements and `function`-keyword functions. Arrow functions and
/// methods are counted through their statements only, and branch maps are
/// left empty.
#[derive(Debug, Clone)]
pub struct StatementInstrumenter {
    coverage_variable: String,
}

impl Default for StatementInstrumenter {
    fn default() -> Self {
        Self {
            coverage_variable: DEFAULT_COVERAGE_VARIABLE.to_string(),
        }
    }
}

impl StatementInstrumenter {
    /// Create an instrumenter writing to `globalThis.__coverage__`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different global property for the counters
    #[must_use]
    pub fn with_coverage_variable(mut self, name: impl Into<String>) -> Self {
        self.coverage_variable = name.into();
        self
    }

    fn preamble(&self, counter: &str, key: &str, state: &FileCoverage) -> ElcovResult<String> {
        let global = serde_json::to_string(&self.coverage_variable)?;
        let path = serde_json::to_string(key)?;
        let initial = serde_json::to_string(state)?;
        Ok(format!(
            "var {counter} = (Function('return this'))(); \
             if (!{counter}[{global}]) {{ {counter}[{global}] = {{}}; }} \
             {counter} = {counter}[{global}]; \
             if (!({counter}[{path}])) {{ {counter}[{path}] = {initial}; }} \
             {counter} = {counter}[{path}];"
        ))
    }
}

impl Instrument for StatementInstrumenter {
    fn instrument(&self, source: &str, path: &Path) -> ElcovResult<Instrumented> {
        let key = path.to_string_lossy().into_owned();
        let counter = format!("__cov_{}", &sha256_hex(key.as_bytes())[..16]);

        let scan = Scanner::new(source, &counter, FileCoverage::new(key.clone()))
            .run()
            .map_err(|message| ElcovError::instrument(path, message))?;

        let preamble = self.preamble(&counter, &key, &scan.state)?;
        let code = splice(source, &scan.insertions, &preamble);
        Ok(Instrumented {
            code,
            state: scan.state,
        })
    }
}

/// Text spliced into the source at a byte offset
#[derive(Debug)]
enum Insert {
    /// Counter setup; rendered last, once the initial state is complete
    Preamble,
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParenOwner {
    /// `if (`, `for (`, `while (`, ...
    Control,
    /// Parameter list of a `function` keyword function
    Function { id: u32, declaration: bool },
    Other,
}

/// Previous significant token, as far as placement decisions care
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Start,
    Punct(&'static str),
    Dot,
    Arrow,
    Ident,
    Keyword(&'static str),
    Str,
    Literal,
    CloseParen(ParenOwner),
    CloseBracket,
    CloseBrace { closes_statement: bool },
    Increment { postfix: bool },
}

impl Token {
    /// Whether an expression may end with this token
    fn ends_expression(self) -> bool {
        match self {
            Self::Ident | Self::Literal | Self::Str | Self::CloseBracket => true,
            Self::CloseParen(owner) => owner == ParenOwner::Other,
            Self::CloseBrace { closes_statement } => !closes_statement,
            Self::Increment { postfix } => postfix,
            _ => false,
        }
    }

    /// Whether a `/` here starts a regular expression literal
    fn regex_allowed(self) -> bool {
        match self {
            Self::Start | Self::Punct(_) | Self::Arrow | Self::Keyword(_) => true,
            Self::CloseParen(owner) => owner == ParenOwner::Control,
            Self::CloseBrace { closes_statement } => closes_statement,
            Self::Increment { postfix } => !postfix,
            _ => false,
        }
    }
}

/// A `{ ... }` holding statements
#[derive(Debug, Default)]
struct Block {
    expect_statement: bool,
    /// Closing this block ends the enclosing statement
    closes_statement: bool,
    function: Option<u32>,
    /// Inserted before the first non-directive statement
    pending: Option<Insert>,
    prologue: bool,
    open_statement: Option<u32>,
    pending_do: u32,
    label_pending: bool,
    after_label: bool,
    /// Ternary depth while inside a `case ...:` label
    case_label: Option<u32>,
}

impl Block {
    fn program() -> Self {
        Self {
            expect_statement: true,
            pending: Some(Insert::Preamble),
            prologue: true,
            ..Self::default()
        }
    }

    fn statement() -> Self {
        Self {
            expect_statement: true,
            closes_statement: true,
            ..Self::default()
        }
    }

    fn function(function: Option<u32>, closes_statement: bool, pending: Option<Insert>) -> Self {
        Self {
            expect_statement: true,
            closes_statement,
            function,
            pending,
            prologue: true,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
enum Frame {
    Block(Block),
    Paren(ParenOwner),
    Bracket,
    /// Object literal or class body
    Brace,
    TemplateExpr,
}

impl Frame {
    fn describe(&self) -> &'static str {
        match self {
            Self::Block(_) | Self::Brace => "'{'",
            Self::Paren(_) => "'('",
            Self::Bracket => "'['",
            Self::TemplateExpr => "'${'",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme<'a> {
    Word(&'a str),
    Str,
    Number,
    Regex,
    Template,
    /// Template text ending in `${`
    TemplateHead,
    Punct(&'static str),
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
}

/// How a token in statement position was treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Begin {
    None,
    Continuation,
    DoWhile,
    Statement { declaration: bool },
}

#[derive(Debug)]
struct PendingFunction {
    declaration: bool,
    start: Position,
    name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    offset: usize,
    at: Position,
}

struct ScanOutput {
    state: FileCoverage,
    insertions: Vec<(usize, Insert)>,
}

struct Scanner<'a> {
    src: &'a str,
    chars: Vec<char>,
    /// Byte offset of each char, plus the source length
    offsets: Vec<usize>,
    pos: usize,
    line: u32,
    col: u32,
    newline_before: bool,
    prev: Token,
    frames: Vec<Frame>,
    counter: &'a str,
    state: FileCoverage,
    insertions: Vec<(usize, Insert)>,
    next_statement: u32,
    next_function: u32,
    last_end: Position,
    pending_function: Option<PendingFunction>,
    control: Option<ParenOwner>,
    declaration_next: bool,
    class_pending: bool,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str, counter: &'a str, state: FileCoverage) -> Self {
        let (mut offsets, chars): (Vec<usize>, Vec<char>) = src.char_indices().unzip();
        offsets.push(src.len());
        Self {
            src,
            chars,
            offsets,
            pos: 0,
            line: 1,
            col: 0,
            newline_before: false,
            prev: Token::Start,
            frames: vec![Frame::Block(Block::program())],
            counter,
            state,
            insertions: Vec::new(),
            next_statement: 0,
            next_function: 0,
            last_end: Position::new(1, 0),
            pending_function: None,
            control: None,
            declaration_next: false,
            class_pending: false,
        }
    }

    fn run(mut self) -> Result<ScanOutput, String> {
        self.skip_hashbang();
        loop {
            self.skip_trivia()?;
            if self.pos >= self.chars.len() {
                break;
            }
            let start = self.mark();
            let lexeme = self.lex()?;
            self.handle(lexeme, start)?;
            self.last_end = self.here();
        }

        if self.frames.len() != 1 {
            let unclosed = self.frames.last().map_or("'{'", Frame::describe);
            return Err(format!("unexpected end of input, unclosed {unclosed}"));
        }
        let end = self.src.len();
        if let Some(Frame::Block(program)) = self.frames.last_mut() {
            close_statement(program, &mut self.state, self.last_end);
            if let Some(pending) = program.pending.take() {
                // a trailing line comment must not swallow the setup code
                self.insertions.push((end, Insert::Text("\n".to_string())));
                self.insertions.push((end, pending));
            }
        }

        self.insertions.sort_by_key(|(offset, _)| *offset);
        Ok(ScanOutput {
            state: self.state,
            insertions: self.insertions,
        })
    }

    fn handle(&mut self, lexeme: Lexeme<'a>, start: Mark) -> Result<(), String> {
        let control = match lexeme {
            Lexeme::Word("await") => self.control,
            _ => self.control.take(),
        };

        let begin = if self.at_statement_start(lexeme) {
            self.begin_statement(lexeme, start)
        } else {
            Begin::None
        };
        if begin == (Begin::Statement { declaration: true }) {
            self.declaration_next = true;
        }

        match lexeme {
            Lexeme::Word(word) => self.handle_word(word, start, begin),
            Lexeme::Str => self.prev = Token::Str,
            Lexeme::Number | Lexeme::Regex | Lexeme::Template => self.prev = Token::Literal,
            Lexeme::TemplateHead => {
                self.frames.push(Frame::TemplateExpr);
                self.prev = Token::Punct("${");
            }
            Lexeme::Punct(op) => self.handle_punct(op),
            Lexeme::OpenParen => {
                let owner = match self.pending_function.take() {
                    Some(function) => self.register_function(function),
                    None => control.unwrap_or(ParenOwner::Other),
                };
                self.frames.push(Frame::Paren(owner));
                self.prev = Token::Punct("(");
            }
            Lexeme::OpenBracket => {
                self.frames.push(Frame::Bracket);
                self.prev = Token::Punct("[");
            }
            Lexeme::OpenBrace => {
                self.open_brace(matches!(begin, Begin::Statement { .. }));
            }
            Lexeme::CloseParen => match self.frames.pop() {
                Some(Frame::Paren(owner)) => self.prev = Token::CloseParen(owner),
                _ => return Err(unexpected(')', start)),
            },
            Lexeme::CloseBracket => match self.frames.pop() {
                Some(Frame::Bracket) => self.prev = Token::CloseBracket,
                _ => return Err(unexpected(']', start)),
            },
            Lexeme::CloseBrace => self.close_brace(start)?,
        }
        Ok(())
    }

    fn at_statement_start(&self, lexeme: Lexeme<'a>) -> bool {
        let Some(Frame::Block(block)) = self.frames.last() else {
            return false;
        };
        if matches!(
            lexeme,
            Lexeme::Punct(";") | Lexeme::CloseBrace | Lexeme::CloseParen | Lexeme::CloseBracket
        ) {
            return false;
        }
        if block.expect_statement {
            return true;
        }
        if block.case_label.is_some() {
            return false;
        }
        let asi = self.newline_before && self.prev.ends_expression();
        match lexeme {
            // `foo()` followed by `{` can only be a new block statement here
            Lexeme::OpenBrace => {
                !self.class_pending && self.prev == Token::CloseParen(ParenOwner::Other)
            }
            Lexeme::Word(word) => asi && !matches!(word, "in" | "instanceof"),
            Lexeme::Str | Lexeme::Number => asi,
            _ => false,
        }
    }

    fn begin_statement(&mut self, lexeme: Lexeme<'a>, start: Mark) -> Begin {
        let word = match lexeme {
            Lexeme::Word(word) => Some(word),
            _ => None,
        };
        let label = word.is_some_and(|w| !is_reserved(w)) && self.peek_label_colon();
        let async_function = word == Some("async") && self.peek_function_keyword();

        let Some(Frame::Block(block)) = self.frames.last_mut() else {
            return Begin::None;
        };

        match word {
            Some("case" | "default") => {
                close_statement(block, &mut self.state, self.last_end);
                block.expect_statement = false;
                block.case_label = Some(0);
                return Begin::Continuation;
            }
            Some("else" | "catch" | "finally") => {
                block.expect_statement = false;
                return Begin::Continuation;
            }
            Some("while") if block.pending_do > 0 => {
                block.pending_do -= 1;
                block.expect_statement = false;
                return Begin::DoWhile;
            }
            _ => {}
        }

        block.expect_statement = false;
        if block.prologue && lexeme == Lexeme::Str {
            return Begin::Continuation;
        }
        block.prologue = false;

        if let Some(pending) = block.pending.take() {
            self.insertions.push((start.offset, pending));
        }
        if std::mem::take(&mut block.after_label) {
            return Begin::Statement { declaration: false };
        }

        close_statement(block, &mut self.state, self.last_end);
        let declaration = word == Some("function") || async_function;
        self.next_statement += 1;
        let id = self.next_statement;
        self.state.statement_map.insert(
            id.to_string(),
            Range {
                start: start.at,
                end: start.at,
            },
        );
        // declarations are hoisted, so they count as executed on load
        self.state.s.insert(id.to_string(), u64::from(declaration));
        if !declaration {
            let text = format!("{}.s['{id}']++;", self.counter);
            self.insertions.push((start.offset, Insert::Text(text)));
        }
        block.open_statement = Some(id);
        block.label_pending = label;
        Begin::Statement { declaration }
    }

    fn handle_word(&mut self, word: &'a str, start: Mark, begin: Begin) {
        let property = self.prev == Token::Dot
            || (matches!(self.frames.last(), Some(Frame::Brace))
                && matches!(self.prev, Token::Punct("{" | ",")));

        let token = if property {
            Token::Ident
        } else if LITERAL_WORDS.contains(&word) {
            Token::Literal
        } else if let Some(keyword) = keyword(word) {
            Token::Keyword(keyword)
        } else {
            Token::Ident
        };

        match token {
            Token::Keyword("function") => {
                self.pending_function = Some(PendingFunction {
                    declaration: std::mem::take(&mut self.declaration_next),
                    start: start.at,
                    name: None,
                });
            }
            Token::Keyword("class") => self.class_pending = true,
            Token::Keyword("do") => {
                if let Some(Frame::Block(block)) = self.frames.last_mut() {
                    block.pending_do += 1;
                }
            }
            Token::Keyword("if" | "for" | "switch" | "catch" | "with") => {
                self.control = Some(ParenOwner::Control);
            }
            Token::Keyword("while") => {
                self.control = Some(if begin == Begin::DoWhile {
                    ParenOwner::Other
                } else {
                    ParenOwner::Control
                });
            }
            Token::Ident => {
                if let Some(function) = self.pending_function.as_mut() {
                    if function.name.is_none() {
                        function.name = Some(word.to_string());
                    }
                }
            }
            _ => {}
        }
        self.prev = token;
    }

    fn handle_punct(&mut self, op: &'static str) {
        match op {
            "=>" => self.prev = Token::Arrow,
            "." | "?." => self.prev = Token::Dot,
            "++" | "--" => {
                self.prev = Token::Increment {
                    postfix: !self.newline_before && self.prev.ends_expression(),
                };
            }
            _ => {
                if let Some(Frame::Block(block)) = self.frames.last_mut() {
                    match op {
                        ";" => {
                            block.expect_statement = true;
                            block.label_pending = false;
                        }
                        "?" => {
                            if let Some(depth) = block.case_label.as_mut() {
                                *depth += 1;
                            }
                        }
                        ":" => match block.case_label {
                            Some(0) => {
                                block.case_label = None;
                                block.expect_statement = true;
                            }
                            Some(depth) => block.case_label = Some(depth - 1),
                            None if block.label_pending => {
                                block.label_pending = false;
                                block.expect_statement = true;
                                block.after_label = true;
                            }
                            None => {}
                        },
                        _ => {}
                    }
                }
                self.prev = Token::Punct(op);
            }
        }
    }

    fn register_function(&mut self, function: PendingFunction) -> ParenOwner {
        self.next_function += 1;
        let id = self.next_function;
        let name = function
            .name
            .unwrap_or_else(|| format!("(anonymous_{id})"));
        self.state.fn_map.insert(
            id.to_string(),
            FunctionMeta {
                name,
                line: function.start.line,
                loc: Range {
                    start: function.start,
                    end: function.start,
                },
            },
        );
        self.state.f.insert(id.to_string(), 0);
        ParenOwner::Function {
            id,
            declaration: function.declaration,
        }
    }

    fn open_brace(&mut self, starts_statement: bool) {
        let frame = if std::mem::take(&mut self.class_pending) {
            Frame::Brace
        } else if starts_statement {
            Frame::Block(Block::statement())
        } else {
            match self.prev {
                Token::CloseParen(ParenOwner::Control)
                | Token::Keyword("else" | "try" | "catch" | "finally" | "do") => {
                    Frame::Block(Block::statement())
                }
                Token::CloseParen(ParenOwner::Function { id, declaration }) => {
                    let counter = format!("{}.f['{id}']++;", self.counter);
                    Frame::Block(Block::function(
                        Some(id),
                        declaration,
                        Some(Insert::Text(counter)),
                    ))
                }
                Token::CloseParen(ParenOwner::Other) | Token::Arrow => {
                    Frame::Block(Block::function(None, false, None))
                }
                _ => Frame::Brace,
            }
        };
        self.frames.push(frame);
        self.prev = Token::Punct("{");
    }

    fn close_brace(&mut self, start: Mark) -> Result<(), String> {
        if self.frames.len() <= 1 {
            return Err(unexpected('}', start));
        }
        match self.frames.pop() {
            Some(Frame::Block(mut block)) => {
                close_statement(&mut block, &mut self.state, self.last_end);
                if let Some(pending) = block.pending.take() {
                    self.insertions.push((start.offset, pending));
                }
                if let Some(id) = block.function {
                    let end = self.here();
                    if let Some(meta) = self.state.fn_map.get_mut(&id.to_string()) {
                        meta.loc.end = end;
                    }
                }
                if block.closes_statement {
                    if let Some(Frame::Block(parent)) = self.frames.last_mut() {
                        parent.expect_statement = true;
                    }
                }
                self.prev = Token::CloseBrace {
                    closes_statement: block.closes_statement,
                };
            }
            Some(Frame::Brace) => {
                self.prev = Token::CloseBrace {
                    closes_statement: false,
                };
            }
            Some(Frame::TemplateExpr) => {
                if self.scan_template()? {
                    self.frames.push(Frame::TemplateExpr);
                    self.prev = Token::Punct("${");
                } else {
                    self.prev = Token::Literal;
                }
            }
            _ => return Err(unexpected('}', start)),
        }
        Ok(())
    }

    // ---- lexing ----

    fn lex(&mut self) -> Result<Lexeme<'a>, String> {
        let src = self.src;
        let first = self.pos;
        let Some(c) = self.peek() else {
            return Err("unexpected end of input".to_string());
        };
        let lexeme = match c {
            '"' | '\'' => {
                self.scan_string(c)?;
                Lexeme::Str
            }
            '`' => {
                self.bump();
                if self.scan_template()? {
                    Lexeme::TemplateHead
                } else {
                    Lexeme::Template
                }
            }
            '(' | ')' | '[' | ']' | '{' | '}' => {
                self.bump();
                match c {
                    '(' => Lexeme::OpenParen,
                    ')' => Lexeme::CloseParen,
                    '[' => Lexeme::OpenBracket,
                    ']' => Lexeme::CloseBracket,
                    '{' => Lexeme::OpenBrace,
                    _ => Lexeme::CloseBrace,
                }
            }
            '/' if self.prev.regex_allowed() && self.scan_regex() => Lexeme::Regex,
            c if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                self.scan_number();
                Lexeme::Number
            }
            c if is_ident_start(c) || c == '#' || c == '\\' => {
                self.scan_word();
                let from = self.offset_at(first);
                let to = self.offset_at(self.pos);
                Lexeme::Word(&src[from..to])
            }
            _ => Lexeme::Punct(self.scan_operator()?),
        };
        Ok(lexeme)
    }

    fn skip_hashbang(&mut self) {
        if self.peek() == Some('#') && self.peek_at(1) == Some('!') {
            while self.peek().is_some_and(|c| !is_line_terminator(c)) {
                self.bump();
            }
        }
    }

    fn skip_trivia(&mut self) -> Result<(), String> {
        self.newline_before = false;
        while let Some(c) = self.peek() {
            if is_line_terminator(c) {
                self.newline_before = true;
                self.bump();
            } else if is_whitespace(c) {
                self.bump();
            } else if c == '/' && self.peek_at(1) == Some('/') {
                while self.peek().is_some_and(|c| !is_line_terminator(c)) {
                    self.bump();
                }
            } else if c == '/' && self.peek_at(1) == Some('*') {
                let (line, col) = (self.line, self.col);
                self.bump();
                self.bump();
                loop {
                    match self.peek() {
                        None => {
                            return Err(format!(
                                "unterminated comment starting at line {line}, column {col}"
                            ))
                        }
                        Some('*') if self.peek_at(1) == Some('/') => {
                            self.bump();
                            self.bump();
                            break;
                        }
                        Some(c) => {
                            if is_line_terminator(c) {
                                self.newline_before = true;
                            }
                            self.bump();
                        }
                    }
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn scan_string(&mut self, quote: char) -> Result<(), String> {
        let (line, col) = (self.line, self.col);
        self.bump();
        loop {
            match self.peek() {
                None | Some('\n' | '\r') => {
                    return Err(format!(
                        "unterminated string literal at line {line}, column {col}"
                    ))
                }
                Some('\\') => {
                    self.bump();
                    if self.peek() == Some('\r') && self.peek_at(1) == Some('\n') {
                        self.bump();
                    }
                    self.bump();
                }
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => self.bump(),
            }
        }
    }

    /// Scan template text after a backtick or a closing `}`.
    ///
    /// Returns `true` when the text stops at a `${` substitution.
    fn scan_template(&mut self) -> Result<bool, String> {
        let (line, col) = (self.line, self.col);
        loop {
            match self.peek() {
                None => {
                    return Err(format!(
                        "unterminated template literal at line {line}, column {col}"
                    ))
                }
                Some('`') => {
                    self.bump();
                    return Ok(false);
                }
                Some('\\') => {
                    self.bump();
                    self.bump();
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    return Ok(true);
                }
                Some(_) => self.bump(),
            }
        }
    }

    /// Try to scan a regular expression literal; restores the position and
    /// returns `false` when the line ends first.
    fn scan_regex(&mut self) -> bool {
        let saved = (self.pos, self.line, self.col);
        self.bump();
        let mut in_class = false;
        loop {
            match self.peek() {
                None => break,
                Some(c) if is_line_terminator(c) => break,
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some(c) if !is_line_terminator(c) => self.bump(),
                        _ => break,
                    }
                }
                Some('[') => {
                    in_class = true;
                    self.bump();
                }
                Some(']') => {
                    in_class = false;
                    self.bump();
                }
                Some('/') if !in_class => {
                    self.bump();
                    while self.peek().is_some_and(is_ident_part) {
                        self.bump();
                    }
                    return true;
                }
                Some(_) => self.bump(),
            }
        }
        (self.pos, self.line, self.col) = saved;
        false
    }

    fn scan_number(&mut self) {
        let hex = self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X'));
        let mut last = '\0';
        while let Some(c) = self.peek() {
            let exponent_sign = matches!(c, '+' | '-') && matches!(last, 'e' | 'E') && !hex;
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                last = c;
                self.bump();
            } else {
                break;
            }
        }
    }

    fn scan_word(&mut self) {
        self.bump();
        while let Some(c) = self.peek() {
            if is_ident_part(c) {
                self.bump();
            } else if c == '\\' {
                self.bump();
                self.bump();
            } else {
                break;
            }
        }
    }

    fn scan_operator(&mut self) -> Result<&'static str, String> {
        for op in OPERATORS.iter().copied() {
            if op == "?." && self.peek_at(2).is_some_and(|c| c.is_ascii_digit()) {
                continue;
            }
            if op.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c)) {
                for _ in 0..op.len() {
                    self.bump();
                }
                return Ok(op);
            }
        }
        Err(format!(
            "unexpected character {:?} at line {}, column {}",
            self.peek().unwrap_or('\0'),
            self.line,
            self.col
        ))
    }

    // ---- lookahead ----

    /// Index of the next significant char and whether a line break precedes it
    fn lookahead(&self) -> (usize, bool) {
        let mut i = self.pos;
        let mut newline = false;
        while let Some(&c) = self.chars.get(i) {
            let next = self.chars.get(i + 1).copied();
            if is_line_terminator(c) {
                newline = true;
                i += 1;
            } else if is_whitespace(c) {
                i += 1;
            } else if c == '/' && next == Some('/') {
                while self.chars.get(i).is_some_and(|&c| !is_line_terminator(c)) {
                    i += 1;
                }
            } else if c == '/' && next == Some('*') {
                i += 2;
                while i < self.chars.len()
                    && !(self.chars[i] == '*' && self.chars.get(i + 1) == Some(&'/'))
                {
                    newline |= is_line_terminator(self.chars[i]);
                    i += 1;
                }
                i += 2;
            } else {
                break;
            }
        }
        (i, newline)
    }

    fn peek_label_colon(&self) -> bool {
        let (i, _) = self.lookahead();
        self.chars.get(i) == Some(&':')
    }

    fn peek_function_keyword(&self) -> bool {
        const FUNCTION: &str = "function";
        let (i, newline) = self.lookahead();
        let Some(word) = self.chars.get(i..i + FUNCTION.len()) else {
            return false;
        };
        !newline
            && word.iter().copied().eq(FUNCTION.chars())
            && !self
                .chars
                .get(i + FUNCTION.len())
                .is_some_and(|&c| is_ident_part(c))
    }

    // ---- cursor ----

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) {
        let Some(&c) = self.chars.get(self.pos) else {
            return;
        };
        self.pos += 1;
        if c == '\r' && self.peek() == Some('\n') {
            self.col += 1;
        } else if is_line_terminator(c) {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn offset_at(&self, index: usize) -> usize {
        self.offsets.get(index).copied().unwrap_or(self.src.len())
    }

    fn mark(&self) -> Mark {
        Mark {
            offset: self.offset_at(self.pos),
            at: self.here(),
        }
    }
}

fn close_statement(block: &mut Block, state: &mut FileCoverage, end: Position) {
    if let Some(id) = block.open_statement.take() {
        if let Some(range) = state.statement_map.get_mut(&id.to_string()) {
            range.end = end;
        }
    }
}

fn splice(source: &str, insertions: &[(usize, Insert)], preamble: &str) -> String {
    let mut code = String::with_capacity(source.len() + preamble.len() + insertions.len() * 32);
    let mut last = 0;
    for (offset, insert) in insertions {
        code.push_str(&source[last..*offset]);
        code.push_str(match insert {
            Insert::Preamble => preamble,
            Insert::Text(text) => text,
        });
        last = *offset;
    }
    code.push_str(&source[last..]);
    code
}

fn unexpected(c: char, at: Mark) -> String {
    format!(
        "unexpected '{c}' at line {}, column {}",
        at.at.line, at.at.column
    )
}

fn keyword(word: &str) -> Option<&'static str> {
    KEYWORDS.iter().copied().find(|k| *k == word)
}

fn is_reserved(word: &str) -> bool {
    keyword(word).is_some() || LITERAL_WORDS.contains(&word)
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '\u{200c}' | '\u{200d}')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const PATH: &str = "/app/lib/a.js";

    fn instrument(source: &str) -> Instrumented {
        StatementInstrumenter::new()
            .instrument(source, Path::new(PATH))
            .unwrap()
    }

    fn counter() -> String {
        format!("__cov_{}", &sha256_hex(PATH.as_bytes())[..16])
    }

    #[test]
    fn test_counts_simple_statements() {
        let out = instrument("var a = 1;\nvar b = 2;\n");
        let v = counter();

        assert_eq!(out.state.path, PATH);
        assert_eq!(out.state.s.len(), 2);
        assert_eq!(out.state.s["1"], 0);
        assert!(out.code.contains(&format!("{v}.s['1']++;var a = 1;\n")));
        assert!(out.code.contains(&format!("\n{v}.s['2']++;var b = 2;")));
        assert!(out.code.starts_with(&format!("var {v} = ")));
        assert_eq!(out.code.lines().count(), 2);
    }

    #[test]
    fn test_statement_locations() {
        let out = instrument("var a = 1;\n  foo();\n");
        let first = out.state.statement_map["1"];
        let second = out.state.statement_map["2"];
        assert_eq!(first.start, Position::new(1, 0));
        assert_eq!(first.end, Position::new(1, 10));
        assert_eq!(second.start, Position::new(2, 2));
        assert_eq!(second.end, Position::new(2, 8));
    }

    #[test]
    fn test_function_declaration_is_hoisted() {
        let out = instrument("function foo() {\n  return 1;\n}\nfoo();");
        let v = counter();

        assert_eq!(out.state.s["1"], 1);
        assert!(!out.code.contains(&format!("{v}.s['1']++")));
        assert!(out
            .code
            .contains(&format!("{v}.f['1']++;{v}.s['2']++;return 1;")));
        assert!(out.code.contains(&format!("\n{v}.s['3']++;foo();")));

        let meta = &out.state.fn_map["1"];
        assert_eq!(meta.name, "foo");
        assert_eq!(meta.line, 1);
        assert_eq!(meta.loc.end, Position::new(3, 1));
        assert_eq!(out.state.f["1"], 0);
    }

    #[test]
    fn test_nested_function_ends() {
        let out = instrument("function outer() {\n  function inner() {\n  }\n}\n");
        assert_eq!(out.state.fn_map["1"].name, "outer");
        assert_eq!(out.state.fn_map["1"].loc.end, Position::new(4, 1));
        assert_eq!(out.state.fn_map["2"].name, "inner");
        assert_eq!(out.state.fn_map["2"].loc.end, Position::new(3, 3));
    }

    #[test]
    fn test_async_function_declaration() {
        let out = instrument("async function run() {\n  await go();\n}\nrun();");
        assert_eq!(out.state.s["1"], 1);
        assert_eq!(out.state.fn_map["1"].name, "run");
        assert_eq!(out.state.s.len(), 3);
    }

    #[test]
    fn test_anonymous_and_arrow_functions() {
        let out = instrument("var f = function () { return 1; };\nvar g = () => { return 2; };\n");
        assert_eq!(out.state.fn_map.len(), 1);
        assert_eq!(out.state.fn_map["1"].name, "(anonymous_1)");
        assert_eq!(out.state.s.len(), 4);
        assert!(out.state.s.values().all(|hits| *hits == 0));
    }

    #[test]
    fn test_empty_function_body_gets_counter() {
        let out = instrument("var noop = function () {};");
        let v = counter();
        assert!(out.code.contains(&format!("function () {{{v}.f['1']++;}}")));
    }

    #[test]
    fn test_directive_prologue_kept_first() {
        let out = instrument("'use strict';\nfunction f() {\n  \"use strict\";\n  return 1;\n}\n");
        let v = counter();

        assert!(out.code.starts_with("'use strict';\nvar "));
        assert!(out
            .code
            .contains(&format!("\"use strict\";\n  {v}.f['1']++;{v}.s['2']++;return 1;")));
    }

    #[test]
    fn test_asi_starts_new_statement() {
        let out = instrument("a = 1\nb = 2\n");
        let v = counter();
        assert_eq!(out.state.s.len(), 2);
        assert!(out.code.contains(&format!("a = 1\n{v}.s['2']++;b = 2")));
    }

    #[test]
    fn test_unbraced_control_bodies_untouched() {
        let out = instrument("if (x)\n  y()\nelse\n  z()\n");
        assert_eq!(out.state.s.len(), 1);
        assert!(out.code.contains("if (x)\n  y()\nelse\n  z()\n"));
    }

    #[test]
    fn test_do_while_continuation() {
        let out = instrument("do {\n  i++;\n} while (i < 3);\nfoo();");
        let v = counter();
        assert_eq!(out.state.s.len(), 3);
        assert!(out.code.contains("} while (i < 3);"));
        assert!(out.code.contains(&format!("{v}.s['3']++;foo();")));
    }

    #[test]
    fn test_switch_case_labels() {
        let source = "switch (x) {\n  case 1:\n    a();\n    break;\n  default:\n    b();\n}\n";
        let out = instrument(source);
        let v = counter();

        assert_eq!(out.state.s.len(), 4);
        assert!(out.code.contains(&format!("case 1:\n    {v}.s['2']++;a();")));
        assert!(out.code.contains(&format!("default:\n    {v}.s['4']++;b();")));
        assert!(!out.code.contains("++;case"));
        assert!(!out.code.contains("++;default"));
    }

    #[test]
    fn test_labeled_loop() {
        let out = instrument("outer: for (;;) { break outer; }");
        let v = counter();
        assert_eq!(out.state.s.len(), 2);
        assert!(out.code.contains(&format!("{v}.s['1']++;outer: for (;;)")));
        assert!(out.code.contains(&format!("{{ {v}.s['2']++;break outer; }}")));
    }

    #[test]
    fn test_strings_comments_and_regex_skipped() {
        let source = "var s = \"a; b\";\n// c; d\nvar r = /;{/g;\nvar t = `x${ {a: 1}.a }y`;\n";
        let out = instrument(source);
        assert_eq!(out.state.s.len(), 3);
        assert!(out.code.contains("\"a; b\""));
        assert!(out.code.contains("// c; d\n"));
    }

    #[test]
    fn test_division_is_not_regex() {
        let out = instrument("var a = x / 2;\nvar re = /}/;\n");
        assert_eq!(out.state.s.len(), 2);
    }

    #[test]
    fn test_object_literals_are_not_blocks() {
        let out = instrument("var o = { a: 1, b: { c: 2 }, if: 3 };");
        assert_eq!(out.state.s.len(), 1);
    }

    #[test]
    fn test_class_bodies() {
        let out = instrument("class A {\n  m() {\n    return 1;\n  }\n}\nnew A().m();\n");
        assert_eq!(out.state.s.len(), 3);
        assert!(out.state.fn_map.is_empty());
    }

    #[test]
    fn test_columns_count_chars() {
        let out = instrument("var é = \"ü\"; x();");
        let v = counter();
        assert_eq!(
            out.state.statement_map["2"].start,
            Position::new(1, 13)
        );
        assert!(out.code.contains(&format!("; {v}.s['2']++;x();")));
    }

    #[test]
    fn test_hashbang_preserved() {
        let out = instrument("#!/usr/bin/env node\nfoo();\n");
        assert!(out.code.starts_with("#!/usr/bin/env node\nvar __cov_"));
        assert_eq!(
            out.state.statement_map["1"].start,
            Position::new(2, 0)
        );
    }

    #[test]
    fn test_empty_source_still_registers() {
        let out = instrument("// nothing here");
        assert!(out.state.s.is_empty());
        assert!(out.code.starts_with("// nothing here\nvar __cov_"));
        assert!(out.code.contains("\"/app/lib/a.js\""));
    }

    #[test]
    fn test_custom_coverage_variable() {
        let out = StatementInstrumenter::new()
            .with_coverage_variable("__elcov__")
            .instrument("x();", Path::new(PATH))
            .unwrap();
        assert!(out.code.contains("[\"__elcov__\"]"));
    }

    #[test]
    fn test_malformed_sources_rejected() {
        for source in ["function f() {", "}", "var s = \"abc", "/* open", "foo(]", "`a${b"] {
            let err = StatementInstrumenter::new()
                .instrument(source, Path::new(PATH))
                .unwrap_err();
            assert!(
                matches!(err, ElcovError::Instrument { .. }),
                "{source:?} gave {err}"
            );
        }
    }
}
