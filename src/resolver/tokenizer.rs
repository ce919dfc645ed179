//! Lightweight lexer for statement text. It does not parse SQL; it only
//! separates identifiers, literals, parameters and punctuation so that
//! markers inside string literals, quoted identifiers or comments are never
//! mistaken for keywords. Every token keeps its byte span in the source.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TKind {
    /// Bare word: keyword or unquoted identifier.
    Word,
    /// `"..."` identifier; the text keeps its quotes.
    QuotedIdent,
    Str,
    Num,
    /// `$n` positional parameter.
    Param(usize),
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    Op,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tok {
    pub kind: TKind,
    pub span: Range<usize>,
}

impl Tok {
    pub fn text<'a>(&self, src: &'a str) -> &'a str { &src[self.span.clone()] }

    pub fn is_keyword(&self, src: &str, kw: &str) -> bool {
        self.kind == TKind::Word && self.text(src).eq_ignore_ascii_case(kw)
    }

    /// Identifier name: bare words are case-folded, quoted ones keep case.
    pub fn ident(&self, src: &str) -> Option<String> {
        match self.kind {
            TKind::Word => Some(self.text(src).to_lowercase()),
            TKind::QuotedIdent => {
                let raw = self.text(src);
                let inner = raw.strip_prefix('"').unwrap_or(raw);
                let inner = inner.strip_suffix('"').unwrap_or(inner);
                Some(inner.replace("\"\"", "\""))
            }
            _ => None,
        }
    }
}

fn is_word_start(b: u8) -> bool { b.is_ascii_alphabetic() || b == b'_' || b >= 0x80 }
fn is_word_part(b: u8) -> bool { b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80 }

/// Tokenize statement text. Unterminated literals and comments run to the end
/// of input rather than failing; the database reports real syntax errors.
pub fn tokenize(src: &str) -> Vec<Tok> {
    let bytes = src.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() { i += 1; continue; }
        // -- line comment
        if c == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' { i += 1; }
            continue;
        }
        // /* block comment */, nestable
        if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let mut depth = 1usize;
            i += 2;
            while i < bytes.len() && depth > 0 {
                if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') { depth += 1; i += 2; }
                else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') { depth -= 1; i += 2; }
                else { i += 1; }
            }
            continue;
        }
        if c == b'\'' {
            let start = i;
            i = skip_string(bytes, i + 1, false);
            toks.push(Tok { kind: TKind::Str, span: start..i });
            continue;
        }
        // E'..', B'..', X'..', N'..' prefixed literals
        if c.is_ascii_alphabetic() && bytes.get(i + 1) == Some(&b'\'') {
            let start = i;
            let backslash = c == b'e' || c == b'E';
            i = skip_string(bytes, i + 2, backslash);
            toks.push(Tok { kind: TKind::Str, span: start..i });
            continue;
        }
        if c == b'"' {
            let start = i;
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'"' {
                    if bytes.get(i + 1) == Some(&b'"') { i += 2; continue; }
                    i += 1;
                    break;
                }
                i += 1;
            }
            toks.push(Tok { kind: TKind::QuotedIdent, span: start..i });
            continue;
        }
        if c == b'$' {
            let start = i;
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() { j += 1; }
            if j > i + 1 {
                let n = src[i + 1..j].parse::<usize>().unwrap_or(0);
                toks.push(Tok { kind: TKind::Param(n), span: start..j });
                i = j;
                continue;
            }
            // $tag$ ... $tag$ dollar quoting
            let mut k = i + 1;
            while k < bytes.len() && (bytes[k].is_ascii_alphanumeric() || bytes[k] == b'_') { k += 1; }
            if bytes.get(k) == Some(&b'$') {
                let tag = &src[i..=k];
                let body_start = k + 1;
                i = match src[body_start..].find(tag) {
                    Some(off) => body_start + off + tag.len(),
                    None => bytes.len(),
                };
                toks.push(Tok { kind: TKind::Str, span: start..i });
                continue;
            }
            toks.push(Tok { kind: TKind::Op, span: start..start + 1 });
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_') { i += 1; }
            toks.push(Tok { kind: TKind::Num, span: start..i });
            continue;
        }
        if is_word_start(c) {
            let start = i;
            while i < bytes.len() && is_word_part(bytes[i]) { i += 1; }
            toks.push(Tok { kind: TKind::Word, span: start..i });
            continue;
        }
        let kind = match c {
            b'(' => TKind::LParen,
            b')' => TKind::RParen,
            b',' => TKind::Comma,
            b'.' => TKind::Dot,
            b';' => TKind::Semicolon,
            _ => TKind::Op,
        };
        toks.push(Tok { kind, span: i..i + 1 });
        i += 1;
    }
    toks
}

/// Return the index just past the closing quote of a string literal whose
/// body starts at `i`. `''` always escapes a quote; `\` escapes in E'' strings.
fn skip_string(bytes: &[u8], mut i: usize, backslash: bool) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if backslash => i += 2,
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    src: &'a str,
    toks: &'a [Tok],
    idx: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str, toks: &'a [Tok]) -> Self { Cursor { src, toks, idx: 0 } }
    pub fn peek(&self) -> Option<&'a Tok> { self.toks.get(self.idx) }
    pub fn next(&mut self) -> Option<&'a Tok> { let t = self.toks.get(self.idx); if t.is_some() { self.idx += 1; } t }
    pub fn peek_kind(&self) -> Option<&'a TKind> { self.peek().map(|t| &t.kind) }

    pub fn peek_keyword(&self, kw: &str) -> bool { self.peek().map(|t| t.is_keyword(self.src, kw)).unwrap_or(false) }

    /// Consume `kw` if it is next.
    pub fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) { self.idx += 1; true } else { false }
    }

    pub fn eat(&mut self, kind: &TKind) -> bool {
        if self.peek_kind() == Some(kind) { self.idx += 1; true } else { false }
    }

    pub fn ident(&mut self) -> Option<String> {
        let name = self.peek()?.ident(self.src)?;
        self.idx += 1;
        Some(name)
    }
}
