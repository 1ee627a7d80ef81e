//! Brace-exact scanner for `agent { docker { ... } }` blocks.
//!
//! Works on bytes: every token it looks for is ASCII, so every offset it
//! produces is a char boundary of the source text.

use std::ops::Range;

use thiserror::Error;

use crate::label::ImageRef;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("unterminated block opened at byte {0}")]
    UnterminatedBlock(usize),
    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),
    #[error("unterminated block comment starting at byte {0}")]
    UnterminatedComment(usize),
}

/// One `agent { docker { ... } }` occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentBlock {
    /// From the `agent` keyword through the agent block's closing brace.
    pub span: Range<usize>,
    /// Between the docker block's braces.
    pub body: Range<usize>,
    pub image: Option<ImageRef>,
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn keyword_at(src: &[u8], at: usize, kw: &[u8]) -> bool {
    let end = at + kw.len();
    src.get(at..end) == Some(kw)
        && (at == 0 || !is_ident(src[at - 1]))
        && src.get(end).map_or(true, |b| !is_ident(*b))
}

fn skip_ws(src: &[u8], mut at: usize) -> usize {
    while src.get(at).is_some_and(u8::is_ascii_whitespace) {
        at += 1;
    }
    at
}

fn find(src: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    src.get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Index just past the `{` of `kw {` starting at `at`.
fn open_block(src: &[u8], at: usize, kw: &[u8]) -> Option<usize> {
    if !keyword_at(src, at, kw) {
        return None;
    }
    let brace = skip_ws(src, at + kw.len());
    (src.get(brace) == Some(&b'{')).then_some(brace + 1)
}

/// Docker body start when `agent {` followed by `docker {` opens at `at`.
pub(crate) fn container_agent_at(src: &[u8], at: usize) -> Option<usize> {
    let inner = open_block(src, at, b"agent")?;
    open_block(src, skip_ws(src, inner), b"docker")
}

/// Skips a string literal or comment starting at `at`.
/// Returns the index just past it, or `None` if neither starts there.
fn skip_literal(src: &[u8], at: usize) -> Result<Option<usize>, ScanError> {
    match src[at] {
        q @ (b'\'' | b'"') => {
            let triple = [q, q, q];
            if src.get(at..at + 3) == Some(&triple[..]) {
                let end = find(src, at + 3, &triple).ok_or(ScanError::UnterminatedString(at))?;
                return Ok(Some(end + 3));
            }
            let mut i = at + 1;
            while i < src.len() {
                match src[i] {
                    b'\\' => i += 2,
                    b if b == q => return Ok(Some(i + 1)),
                    _ => i += 1,
                }
            }
            Err(ScanError::UnterminatedString(at))
        }
        b'/' if src.get(at + 1) == Some(&b'/') => {
            let end = find(src, at, b"\n").unwrap_or(src.len());
            Ok(Some(end))
        }
        b'/' if src.get(at + 1) == Some(&b'*') => {
            let end = find(src, at + 2, b"*/").ok_or(ScanError::UnterminatedComment(at))?;
            Ok(Some(end + 2))
        }
        _ => Ok(None),
    }
}

/// Index of the `}` closing the block whose `{` sits at `open`.
fn matching_brace(src: &[u8], open: usize) -> Result<usize, ScanError> {
    let mut depth = 0usize;
    let mut at = open;
    while at < src.len() {
        if let Some(next) = skip_literal(src, at)? {
            at = next;
            continue;
        }
        match src[at] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(at);
                }
            }
            _ => {}
        }
        at += 1;
    }
    Err(ScanError::UnterminatedBlock(open))
}

/// First top-level `image '<ref>'` inside a docker body.
fn image_in_body(text: &str, body: Range<usize>) -> Result<Option<ImageRef>, ScanError> {
    let src = text.as_bytes();
    let mut depth = 0usize;
    let mut at = body.start;
    while at < body.end {
        if depth == 0 && keyword_at(src, at, b"image") {
            let value_at = skip_ws(src, at + b"image".len());
            let separated = value_at > at + b"image".len();
            if separated && matches!(src.get(value_at), Some(b'\'' | b'"')) {
                if let Some(end) = skip_literal(src, value_at)? {
                    let q = src[value_at];
                    let triple = end - value_at >= 6 && src[value_at + 1] == q && src[value_at + 2] == q;
                    let quote = if triple { 3 } else { 1 };
                    return Ok(ImageRef::new(&text[value_at + quote..end - quote]));
                }
            }
        }
        if let Some(next) = skip_literal(src, at)? {
            at = next;
            continue;
        }
        match src[at] {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        at += 1;
    }
    Ok(None)
}

fn block_at(text: &str, start: usize) -> Result<Option<AgentBlock>, ScanError> {
    let src = text.as_bytes();
    let Some(body_start) = container_agent_at(src, start) else {
        return Ok(None);
    };
    let docker_close = matching_brace(src, body_start - 1)?;
    let agent_close = skip_ws(src, docker_close + 1);
    if src.get(agent_close) != Some(&b'}') {
        return Ok(None);
    }
    let body = body_start..docker_close;
    let image = image_in_body(text, body.clone())?;
    Ok(Some(AgentBlock { span: start..agent_close + 1, body, image }))
}

/// Iterator over non-overlapping agent blocks, left to right.
/// Yields at most one error, then stops.
pub struct AgentBlocks<'a> {
    text: &'a str,
    at: usize,
}

impl<'a> Iterator for AgentBlocks<'a> {
    type Item = Result<AgentBlock, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(rel) = self.text[self.at..].find("agent") {
            let start = self.at + rel;
            self.at = start + "agent".len();
            match block_at(self.text, start) {
                Ok(Some(block)) => {
                    self.at = block.span.end;
                    return Some(Ok(block));
                }
                Ok(None) => {}
                Err(e) => {
                    self.at = self.text.len();
                    return Some(Err(e));
                }
            }
        }
        self.at = self.text.len();
        None
    }
}

pub fn agent_blocks(text: &str) -> AgentBlocks<'_> {
    AgentBlocks { text, at: 0 }
}
