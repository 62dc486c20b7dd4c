use std::ops;
use std::path::{Path, PathBuf};

use ropey::Rope;
use tower_lsp::lsp_types::{Position, Range};
use tracing::trace;

use super::{
    ConfigClass, DocumentLoader, FileObserver, NoHooks, ParseError, SourceLocation, Value,
};
use crate::config::IncludePrefix;
use crate::paths::resolve_virtual_path;

/// Recursive-descent parser for config files.
///
/// One parser is built per workspace session; the document loader and file
/// observer are the session's collaborators.
pub struct ConfigParser<'a> {
    prefixes: &'a [IncludePrefix],
    loader: &'a dyn DocumentLoader,
    observer: &'a dyn FileObserver,
}

impl<'a> ConfigParser<'a> {
    pub fn new(prefixes: &'a [IncludePrefix]) -> Self {
        ConfigParser {
            prefixes,
            loader: &NoHooks,
            observer: &NoHooks,
        }
    }

    pub fn with_loader(mut self, loader: &'a dyn DocumentLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn FileObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Parse a root file and everything it includes.
    pub fn parse(&self, path: &Path) -> Result<ConfigClass, ParseError> {
        let text = self.read(path).map_err(|err| ParseError {
            file: path.to_path_buf(),
            range: Range::default(),
            message: format!("Failed to read {}: {err}", path.display()),
        })?;
        self.parse_str(path, &text)
    }

    /// Parse `text` as if it were the content of `path`.
    pub fn parse_str(&self, path: &Path, text: &str) -> Result<ConfigClass, ParseError> {
        let mut root = ConfigClass::new(
            "",
            Some(SourceLocation {
                file: path.to_path_buf(),
                range: Range::default(),
            }),
        );
        let mut stack = vec![path.to_path_buf()];
        let mut lexer = Lexer::new(path, text);
        self.parse_body(&mut lexer, &mut root, false, &mut stack)?;
        Ok(root)
    }

    fn read(&self, path: &Path) -> std::io::Result<String> {
        self.observer.file_touched(path);
        match self.loader.load(path) {
            Some(text) => Ok(text),
            None => std::fs::read_to_string(path),
        }
    }

    fn parse_body(
        &self,
        lexer: &mut Lexer,
        scope: &mut ConfigClass,
        nested: bool,
        stack: &mut Vec<PathBuf>,
    ) -> Result<(), ParseError> {
        loop {
            let Some(token) = lexer.next()? else {
                if nested {
                    return Err(lexer.error_at_end(format!(
                        "Missing '}}' for class {}",
                        scope.name
                    )));
                }
                return Ok(());
            };

            match token.kind {
                TokenKind::RBrace if nested => return Ok(()),
                TokenKind::RBrace => return Err(lexer.error(&token, "Unexpected '}'")),
                TokenKind::Semi => continue,
                TokenKind::Directive(ref line) => {
                    self.directive(lexer, &token, line, scope, stack)?
                }
                TokenKind::Word(ref word) if word == "class" => self.class(lexer, scope, stack)?,
                TokenKind::Word(ref word) if word == "delete" => {
                    let name = lexer.expect_word("class name after 'delete'")?;
                    lexer.expect(TokenKind::Semi, "';'")?;
                    scope.classes.shift_remove(&name.0.to_lowercase());
                }
                TokenKind::Word(ref word) if word == "import" => {
                    lexer.expect_word("class name after 'import'")?;
                    lexer.expect(TokenKind::Semi, "';'")?;
                }
                TokenKind::Word(word) => self.assignment(lexer, scope, word)?,
                _ => {
                    return Err(lexer.error(
                        &token,
                        format!("Unexpected '{}'", lexer.source(&token)),
                    ))
                }
            }
        }
    }

    fn class(
        &self,
        lexer: &mut Lexer,
        scope: &mut ConfigClass,
        stack: &mut Vec<PathBuf>,
    ) -> Result<(), ParseError> {
        let (name, name_token) = lexer.expect_word("class name")?;
        let location = SourceLocation {
            file: lexer.file.clone(),
            range: lexer.range(&name_token),
        };

        let mut parent = None;
        let mut next = lexer.next_required("'{' or ';'")?;
        if next.kind == TokenKind::Colon {
            parent = Some(lexer.expect_word("base class name")?.0);
            next = lexer.next_required("'{' or ';'")?;
        }

        let key = name.to_lowercase();
        // The placeholder left by `take` holds the slot until the class is put back.
        let mut class = match scope.classes.get_mut(&key) {
            Some(existing) => std::mem::take(existing),
            None => ConfigClass::new(name.as_str(), Some(location.clone())),
        };
        if class.location.is_none() {
            class.location = Some(location);
        }
        if parent.is_some() {
            class.parent = parent;
        }

        let body = match next.kind {
            TokenKind::Semi => Ok(()),
            TokenKind::LBrace => self
                .parse_body(lexer, &mut class, true, stack)
                .and_then(|()| lexer.expect(TokenKind::Semi, "';' after '}'").map(|_| ())),
            _ => Err(lexer.error(&next, format!("Expected '{{' or ';' after class {name}"))),
        };

        scope.classes.insert(key, class);
        body
    }

    fn assignment(
        &self,
        lexer: &mut Lexer,
        scope: &mut ConfigClass,
        name: String,
    ) -> Result<(), ParseError> {
        let mut op = lexer.next_required("'='")?;
        let mut is_array = false;
        if op.kind == TokenKind::LBracket {
            lexer.expect(TokenKind::RBracket, "']'")?;
            is_array = true;
            op = lexer.next_required("'='")?;
        }

        let append = match op.kind {
            TokenKind::Eq => false,
            TokenKind::PlusEq if is_array => true,
            _ => {
                return Err(lexer.error(
                    &op,
                    format!("Expected '=' after {name}, found '{}'", lexer.source(&op)),
                ))
            }
        };

        let value = self.value(lexer, &[TokenKind::Semi])?;
        lexer.expect(TokenKind::Semi, "';'")?;

        let key = name.to_lowercase();
        let value = match (append, value) {
            (true, Value::Array(items)) => match scope.variables.get_mut(&key) {
                Some(Value::Array(existing)) => {
                    existing.extend(items);
                    return Ok(());
                }
                _ => Value::Array(items),
            },
            (_, value) => value,
        };
        scope.variables.insert(key, value);
        Ok(())
    }

    /// Parse a value, stopping before (not consuming) any `terminators` token.
    fn value(&self, lexer: &mut Lexer, terminators: &[TokenKind]) -> Result<Value, ParseError> {
        if lexer.peek()?.is_some_and(|t| t.kind == TokenKind::LBrace) {
            lexer.next()?;
            return self.array(lexer);
        }

        let mut tokens = vec![];
        loop {
            match lexer.peek()? {
                None => return Err(lexer.error_at_end("Missing ';'")),
                Some(t) if terminators.contains(&t.kind) => break,
                Some(t) if matches!(t.kind, TokenKind::RBrace | TokenKind::Directive(_)) => {
                    let t = t.clone();
                    return Err(lexer.error(&t, "Missing ';'"));
                }
                Some(_) => {
                    if let Some(t) = lexer.next()? {
                        tokens.push(t);
                    }
                }
            }
        }

        Ok(match tokens.as_slice() {
            [] => Value::Raw(String::new()),
            [single] => match &single.kind {
                TokenKind::Str(text) => Value::String(text.clone()),
                TokenKind::Word(word) => match word.parse::<f64>() {
                    Ok(number) => Value::Number(number),
                    Err(_) => Value::Raw(word.clone()),
                },
                _ => Value::Raw(lexer.source(single).to_string()),
            },
            [first, .., last] => Value::Raw(lexer.text[first.span.start..last.span.end].to_string()),
        })
    }

    fn array(&self, lexer: &mut Lexer) -> Result<Value, ParseError> {
        let mut items = vec![];
        loop {
            if lexer.peek()?.is_some_and(|t| t.kind == TokenKind::RBrace) {
                lexer.next()?;
                return Ok(Value::Array(items));
            }

            items.push(self.value(lexer, &[TokenKind::Comma, TokenKind::RBrace])?);

            let separator = lexer.next_required("',' or '}'")?;
            match separator.kind {
                TokenKind::Comma => continue,
                TokenKind::RBrace => return Ok(Value::Array(items)),
                _ => return Err(lexer.error(&separator, "Expected ',' or '}' in array")),
            }
        }
    }

    fn directive(
        &self,
        lexer: &mut Lexer,
        token: &Token,
        line: &str,
        scope: &mut ConfigClass,
        stack: &mut Vec<PathBuf>,
    ) -> Result<(), ParseError> {
        let line = line.trim_start_matches('#').trim_start();
        let Some(target) = line.strip_prefix("include") else {
            // #define, #ifdef and friends are not evaluated
            return Ok(());
        };

        let target = target.trim();
        let target = target
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .or_else(|| target.strip_prefix('<').and_then(|t| t.strip_suffix('>')))
            .ok_or_else(|| lexer.error(token, "Malformed #include"))?;

        let base_dir = lexer.file.parent().unwrap_or(Path::new(""));
        let path = resolve_virtual_path(target, self.prefixes, base_dir);

        if stack.contains(&path) {
            return Err(lexer.error(
                token,
                format!("Recursive #include of {}", path.display()),
            ));
        }

        trace!(file = %path.display(), "Including");
        let text = self.read(&path).map_err(|err| {
            lexer.error(token, format!("Failed to include {}: {err}", path.display()))
        })?;

        stack.push(path.clone());
        let mut included = Lexer::new(&path, &text);
        let result = self.parse_body(&mut included, scope, false, stack);
        stack.pop();
        result
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Word(String),
    Str(String),
    /// A whole preprocessor line, continuations included.
    Directive(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Colon,
    Eq,
    PlusEq,
    Comma,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    span: ops::Range<usize>,
}

struct Lexer<'t> {
    file: PathBuf,
    text: &'t str,
    rope: Rope,
    pos: usize,
    line_start: bool,
    peeked: Option<Option<Token>>,
}

impl<'t> Lexer<'t> {
    fn new(file: &Path, text: &'t str) -> Self {
        Lexer {
            file: file.to_path_buf(),
            text,
            rope: Rope::from_str(text),
            pos: 0,
            line_start: true,
            peeked: None,
        }
    }

    fn source(&self, token: &Token) -> &'t str {
        &self.text[token.span.clone()]
    }

    fn range(&self, token: &Token) -> Range {
        self.range_of(token.span.clone())
    }

    fn range_of(&self, span: ops::Range<usize>) -> Range {
        let position = |byte: usize| {
            let char_idx = self.rope.byte_to_char(byte);
            let line = self.rope.char_to_line(char_idx);
            let line_start = self.rope.char_to_utf16_cu(self.rope.line_to_char(line));
            Position {
                line: line as u32,
                character: (self.rope.char_to_utf16_cu(char_idx) - line_start) as u32,
            }
        };
        Range {
            start: position(span.start),
            end: position(span.end),
        }
    }

    fn error(&self, token: &Token, message: impl Into<String>) -> ParseError {
        ParseError {
            file: self.file.clone(),
            range: self.range(token),
            message: message.into(),
        }
    }

    fn error_at_end(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            file: self.file.clone(),
            range: self.range_of(self.text.len()..self.text.len()),
            message: message.into(),
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>, ParseError> {
        if self.peeked.is_none() {
            let token = self.lex()?;
            self.peeked = Some(token);
        }
        Ok(self.peeked.as_ref().and_then(Option::as_ref))
    }

    fn next(&mut self) -> Result<Option<Token>, ParseError> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lex(),
        }
    }

    fn next_required(&mut self, expected: &str) -> Result<Token, ParseError> {
        self.next()?
            .ok_or_else(|| self.error_at_end(format!("Expected {expected}, found end of file")))
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        let token = self.next_required(expected)?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(self.error(
                &token,
                format!("Expected {expected}, found '{}'", self.source(&token)),
            ))
        }
    }

    fn expect_word(&mut self, expected: &str) -> Result<(String, Token), ParseError> {
        let token = self.next_required(expected)?;
        match &token.kind {
            TokenKind::Word(word) => Ok((word.clone(), token)),
            _ => Err(self.error(
                &token,
                format!("Expected {expected}, found '{}'", self.source(&token)),
            )),
        }
    }

    fn rest(&self) -> &'t str {
        &self.text[self.pos..]
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            let rest = self.rest();
            let Some(c) = rest.chars().next() else {
                return Ok(());
            };

            if c == '\n' {
                self.line_start = true;
                self.pos += 1;
            } else if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else if rest.starts_with("//") {
                self.pos += rest.find('\n').unwrap_or(rest.len());
            } else if rest.starts_with("/*") {
                let start = self.pos;
                match rest[2..].find("*/") {
                    Some(end) => self.pos += end + 4,
                    None => {
                        return Err(ParseError {
                            file: self.file.clone(),
                            range: self.range_of(start..start + 2),
                            message: "Unterminated block comment".into(),
                        })
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    fn lex(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_trivia()?;
        let start = self.pos;
        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            return Ok(None);
        };

        if c == '#' && self.line_start {
            let kind = TokenKind::Directive(self.directive_line());
            return Ok(Some(Token {
                kind,
                span: start..self.pos,
            }));
        }
        self.line_start = false;

        let single = match c {
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ';' => Some(TokenKind::Semi),
            ':' => Some(TokenKind::Colon),
            '=' => Some(TokenKind::Eq),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            self.pos += 1;
            return Ok(Some(Token {
                kind,
                span: start..self.pos,
            }));
        }

        if rest.starts_with("+=") {
            self.pos += 2;
            return Ok(Some(Token {
                kind: TokenKind::PlusEq,
                span: start..self.pos,
            }));
        }

        if c == '"' || c == '\'' {
            let text = self.string(c)?;
            return Ok(Some(Token {
                kind: TokenKind::Str(text),
                span: start..self.pos,
            }));
        }

        self.word();
        Ok(Some(Token {
            kind: TokenKind::Word(self.text[start..self.pos].to_string()),
            span: start..self.pos,
        }))
    }

    fn directive_line(&mut self) -> String {
        let mut line = String::new();
        loop {
            let rest = self.rest();
            let end = rest.find('\n').unwrap_or(rest.len());
            let chunk = rest[..end].trim_end_matches('\r');
            self.pos += end;
            match chunk.strip_suffix('\\') {
                Some(continued) if end < rest.len() => {
                    line.push_str(continued);
                    line.push(' ');
                    self.pos += 1;
                }
                _ => {
                    line.push_str(chunk);
                    return line;
                }
            }
        }
    }

    /// A quoted string. Doubling the quote escapes it.
    fn string(&mut self, quote: char) -> Result<String, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();
        loop {
            let mut chars = self.rest().chars();
            match (chars.next(), chars.next()) {
                (Some(c), Some(next)) if c == quote && next == quote => {
                    text.push(quote);
                    self.pos += 2;
                }
                (Some(c), _) if c == quote => {
                    self.pos += 1;
                    return Ok(text);
                }
                (Some(c), _) => {
                    text.push(c);
                    self.pos += c.len_utf8();
                }
                (None, _) => {
                    return Err(ParseError {
                        file: self.file.clone(),
                        range: self.range_of(start..start + 1),
                        message: "Unterminated string".into(),
                    })
                }
            }
        }
    }

    /// Anything up to the next structural character. Parentheses are kept
    /// balanced so macro calls like `QUOTE(a,b)` stay a single word.
    fn word(&mut self) {
        let mut depth = 0usize;
        while let Some(c) = self.rest().chars().next() {
            let rest = self.rest();
            if depth == 0 {
                let stop = c.is_whitespace()
                    || matches!(c, '{' | '}' | '[' | ']' | ';' | ':' | '=' | ',' | '"' | '\'')
                    || rest.starts_with("//")
                    || rest.starts_with("/*")
                    || rest.starts_with("+=");
                if stop {
                    break;
                }
            }
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                '\n' => break,
                _ => {}
            }
            self.pos += c.len_utf8();
        }
    }
}
