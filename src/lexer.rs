//! Hand-written tokenizer.
//!
//! A `Vec<char>` cursor with a `peek`/`advance` pair, nested `/* ... */`
//! comment handling via a depth counter, and a `Token { kind, span }` product
//! type covering float and character literals plus a full operator set
//! (compound assignment, `::`, `->`).

use crate::diagnostics::{NodeId, SourceMap, SourceSpan};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    StringLiteral(String),
    CharLiteral(char),
    Identifier(String),

    // Keywords
    KwClass,
    KwUnion,
    KwNamespace,
    KwTemplate,
    KwTypedef,
    KwImport,
    KwPublic,
    KwPrivate,
    KwExtern,
    KwNomangle,
    KwReturn,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwLoop,
    KwMatch,
    KwBreak,
    KwContinue,
    KwNew,
    KwDelete,
    KwTrue,
    KwFalse,
    KwVoid,
    KwNull,

    // Punctuation / operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    ColonColon,
    Arrow,
    Dot,
    Ampersand,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Bang,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PlusPlus,
    MinusMinus,
    Pipe,
    PipeArrow,
    Caret,
    Tilde,
    Shl,
    Shr,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub node: NodeId,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct LexError(pub String);

pub struct Lexer<'a> {
    chars: Vec<char>,
    /// Byte offset in the original UTF-8 source corresponding to `chars[pos]`,
    /// indexed in parallel with `chars` (so spans interned into [`SourceMap`]
    /// stay in the byte-offset space it resolves against, even though the
    /// lexer itself scans codepoint-by-codepoint.
    byte_offsets: Vec<usize>,
    pos: usize,
    map: &'a mut SourceMap,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &str, map: &'a mut SourceMap) -> Self {
        let mut chars = Vec::new();
        let mut byte_offsets = Vec::new();
        for (byte_idx, c) in source.char_indices() {
            byte_offsets.push(byte_idx);
            chars.push(c);
        }
        byte_offsets.push(source.len());
        Lexer {
            chars,
            byte_offsets,
            pos: 0,
            map,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn byte_pos(&self, char_pos: usize) -> usize {
        self.byte_offsets[char_pos]
    }

    fn intern(&mut self, start: usize, kind: TokenKind) -> Token {
        let span = SourceSpan {
            start: self.byte_pos(start),
            end: self.byte_pos(self.pos),
        };
        let node = self.map.intern(span);
        Token { kind, node }
    }

    /// Skip whitespace and comments, including nested `/* ... */` blocks
    /// tracked with a depth counter.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.pos;
                    self.advance();
                    self.advance();
                    let mut depth = 1usize;
                    while depth > 0 {
                        match self.advance() {
                            Some('/') if self.peek() == Some('*') => {
                                self.advance();
                                depth += 1;
                            }
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                depth -= 1;
                            }
                            Some(_) => {}
                            None => {
                                return Err(LexError(format!(
                                    "unterminated block comment starting at offset {start}"
                                )));
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn read_escape(&mut self) -> Result<char, LexError> {
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some(other) => Err(LexError(format!("unknown escape sequence '\\{other}'"))),
            None => Err(LexError("unterminated escape sequence".to_string())),
        }
    }

    fn read_string(&mut self, start: usize) -> Result<Token, LexError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => s.push(self.read_escape()?),
                Some(c) => s.push(c),
                None => return Err(LexError("unterminated string literal".to_string())),
            }
        }
        Ok(self.intern(start, TokenKind::StringLiteral(s)))
    }

    fn read_char(&mut self, start: usize) -> Result<Token, LexError> {
        let c = match self.advance() {
            Some('\\') => self.read_escape()?,
            Some(c) => c,
            None => return Err(LexError("unterminated char literal".to_string())),
        };
        match self.advance() {
            Some('\'') => Ok(self.intern(start, TokenKind::CharLiteral(c))),
            _ => Err(LexError("char literal must contain exactly one codepoint".to_string())),
        }
    }

    fn read_number(&mut self, start: usize) -> Result<Token, LexError> {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            let v: f64 = text
                .parse()
                .map_err(|_| LexError(format!("invalid float literal '{text}'")))?;
            Ok(self.intern(start, TokenKind::FloatLiteral(v)))
        } else {
            let v: i64 = text
                .parse()
                .map_err(|_| LexError(format!("invalid integer literal '{text}'")))?;
            Ok(self.intern(start, TokenKind::IntLiteral(v)))
        }
    }

    fn read_identifier_or_keyword(&mut self, start: usize) -> Token {
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = match text.as_str() {
            "class" => TokenKind::KwClass,
            "union" => TokenKind::KwUnion,
            "namespace" => TokenKind::KwNamespace,
            "template" => TokenKind::KwTemplate,
            "typedef" => TokenKind::KwTypedef,
            "import" => TokenKind::KwImport,
            "public" => TokenKind::KwPublic,
            "private" => TokenKind::KwPrivate,
            "extern" => TokenKind::KwExtern,
            "nomangle" => TokenKind::KwNomangle,
            "return" => TokenKind::KwReturn,
            "if" => TokenKind::KwIf,
            "else" => TokenKind::KwElse,
            "while" => TokenKind::KwWhile,
            "for" => TokenKind::KwFor,
            "loop" => TokenKind::KwLoop,
            "match" => TokenKind::KwMatch,
            "break" => TokenKind::KwBreak,
            "continue" => TokenKind::KwContinue,
            "new" => TokenKind::KwNew,
            "delete" => TokenKind::KwDelete,
            "true" => TokenKind::KwTrue,
            "false" => TokenKind::KwFalse,
            "void" => TokenKind::KwVoid,
            "null" => TokenKind::KwNull,
            _ => TokenKind::Identifier(text),
        };
        self.intern(start, kind)
    }

    /// Produce the next token, or `Eof` once the source is exhausted.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(self.intern(start, TokenKind::Eof));
        };

        if c.is_ascii_digit() {
            return self.read_number(start);
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(self.read_identifier_or_keyword(start));
        }
        if c == '"' {
            self.advance();
            return self.read_string(start);
        }
        if c == '\'' {
            self.advance();
            return self.read_char(start);
        }

        self.advance();
        macro_rules! two {
            ($second:expr, $two_kind:expr, $one_kind:expr) => {
                if self.peek() == Some($second) {
                    self.advance();
                    $two_kind
                } else {
                    $one_kind
                }
            };
        }
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => two!(':', TokenKind::ColonColon, TokenKind::Colon),
            '.' => TokenKind::Dot,
            '&' => two!('&', TokenKind::AndAnd, TokenKind::Ampersand),
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    TokenKind::OrOr
                } else if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::PipeArrow
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '*' => two!('=', TokenKind::StarEq, TokenKind::Star),
            '/' => two!('=', TokenKind::SlashEq, TokenKind::Slash),
            '%' => TokenKind::Percent,
            '!' => two!('=', TokenKind::Ne, TokenKind::Bang),
            '<' => {
                if self.peek() == Some('<') {
                    self.advance();
                    TokenKind::Shl
                } else {
                    two!('=', TokenKind::Le, TokenKind::Lt)
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Shr
                } else {
                    two!('=', TokenKind::Ge, TokenKind::Gt)
                }
            }
            '=' => two!('=', TokenKind::EqEq, TokenKind::Eq),
            '+' => {
                if self.peek() == Some('+') {
                    self.advance();
                    TokenKind::PlusPlus
                } else {
                    two!('=', TokenKind::PlusEq, TokenKind::Plus)
                }
            }
            '-' => {
                if self.peek() == Some('-') {
                    self.advance();
                    TokenKind::MinusMinus
                } else if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    two!('=', TokenKind::MinusEq, TokenKind::Minus)
                }
            }
            other => return Err(LexError(format!("unexpected character '{other}'"))),
        };
        Ok(self.intern(start, kind))
    }

    /// Tokenize the whole source, stopping after the first `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            out.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut map = SourceMap::new(std::path::PathBuf::from("test.em"), src.to_string());
        let lexer = Lexer::new(src, &mut map);
        lexer.tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        let ks = kinds("class Foo { }");
        assert_eq!(
            ks,
            vec![
                TokenKind::KwClass,
                TokenKind::Identifier("Foo".to_string()),
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_nested_block_comments() {
        let ks = kinds("/* outer /* inner */ still-comment */ 42");
        assert_eq!(ks, vec![TokenKind::IntLiteral(42), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_nested_comment_errors() {
        let src = "/* outer /* inner */";
        let mut map = SourceMap::new(std::path::PathBuf::from("test.em"), src.to_string());
        let lexer = Lexer::new(src, &mut map);
        assert!(lexer.tokenize().is_err());
    }

    #[test]
    fn lexes_float_and_int_literals() {
        assert_eq!(kinds("3.14"), vec![TokenKind::FloatLiteral(3.14), TokenKind::Eof]);
        assert_eq!(kinds("42"), vec![TokenKind::IntLiteral(42), TokenKind::Eof]);
    }

    #[test]
    fn lexes_string_with_escapes() {
        let ks = kinds(r#""hi\n""#);
        assert_eq!(ks, vec![TokenKind::StringLiteral("hi\n".to_string()), TokenKind::Eof]);
    }

    #[test]
    fn lexes_char_literal() {
        assert_eq!(kinds("'a'"), vec![TokenKind::CharLiteral('a'), TokenKind::Eof]);
    }

    #[test]
    fn lexes_compound_and_double_char_operators() {
        let ks = kinds("+= -= *= /= == != <= >= && || :: -> ++ --");
        assert_eq!(
            ks,
            vec![
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::StarEq,
                TokenKind::SlashEq,
                TokenKind::EqEq,
                TokenKind::Ne,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::ColonColon,
                TokenKind::Arrow,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unknown_character_errors() {
        let mut map = SourceMap::new(std::path::PathBuf::from("test.em"), "`".to_string());
        let lexer = Lexer::new("`", &mut map);
        assert!(lexer.tokenize().is_err());
    }
}
