//! The CSS selector subset used by the interaction layer.
//!
//! Supported grammar:
//!
//! ```text
//! list      := complex ("," complex)*
//! complex   := compound (" " compound)*          descendant combinator only
//! compound  := (tag | "*")? (".class" | "#id" | "[attr]" | ":not(" compound ")")*
//! attr      := name | name op value              op: "=", "^=", "$=", "*="
//! ```
//!
//! That covers every selector the site uses, e.g.
//! `a[href^="#"]:not([href="#"])` or `picture source[type="image/webp"]`.

use crate::dom::{Document, ElementId};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected {found:?} at offset {offset} in selector {input:?}")]
    Unexpected {
        input: String,
        offset: usize,
        found: char,
    },
    #[error("unterminated selector {0:?}")]
    Unterminated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    op: AttrOp,
}

impl AttrTest {
    fn matches(&self, value: Option<&str>) -> bool {
        match (&self.op, value) {
            (_, None) => false,
            (AttrOp::Exists, Some(_)) => true,
            (AttrOp::Equals(v), Some(actual)) => actual == v,
            (AttrOp::Prefix(v), Some(actual)) => !v.is_empty() && actual.starts_with(v.as_str()),
            (AttrOp::Suffix(v), Some(actual)) => !v.is_empty() && actual.ends_with(v.as_str()),
            (AttrOp::Contains(v), Some(actual)) => !v.is_empty() && actual.contains(v.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
    negations: Vec<Compound>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.negations.is_empty()
    }

    fn matches(&self, doc: &Document, id: ElementId) -> bool {
        let el = doc.get(id);
        if let Some(tag) = &self.tag
            && el.tag() != tag
        {
            return false;
        }
        if let Some(want) = &self.id
            && el.attribute("id") != Some(want.as_str())
        {
            return false;
        }
        self.classes.iter().all(|c| el.has_class(c))
            && self.attrs.iter().all(|a| a.matches(el.attribute(&a.name)))
            && !self.negations.iter().any(|n| n.matches(doc, id))
    }
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Vec<Compound>>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        Parser::new(input).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `id` matches any alternative of this selector.
    pub fn matches(&self, doc: &Document, id: ElementId) -> bool {
        self.alternatives
            .iter()
            .any(|chain| matches_chain(doc, id, chain))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Match a descendant chain right to left: the last compound must match the
/// element, each earlier one some (strict) ancestor above the previous match.
fn matches_chain(doc: &Document, id: ElementId, chain: &[Compound]) -> bool {
    let Some((subject, rest)) = chain.split_last() else {
        return false;
    };
    if !subject.matches(doc, id) {
        return false;
    }
    let ancestors = doc.ancestors(id);
    let mut cursor = 0;
    for compound in rest.iter().rev() {
        match ancestors[cursor..]
            .iter()
            .position(|a| compound.matches(doc, *a))
        {
            Some(offset) => cursor += offset + 1,
            None => return false,
        }
    }
    true
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn unexpected(&self) -> SelectorError {
        match self.chars.get(self.pos) {
            Some((offset, found)) => SelectorError::Unexpected {
                input: self.input.to_string(),
                offset: *offset,
                found: *found,
            },
            None => SelectorError::Unterminated(self.input.to_string()),
        }
    }

    fn expect(&mut self, want: char) -> Result<(), SelectorError> {
        if self.peek() == Some(want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn parse(mut self) -> Result<Selector, SelectorError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_ws();
            alternatives.push(self.complex()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => self.pos += 1,
                Some(_) => return Err(self.unexpected()),
            }
        }
        Ok(Selector {
            source: self.input.trim().to_string(),
            alternatives,
        })
    }

    fn complex(&mut self) -> Result<Vec<Compound>, SelectorError> {
        let mut chain = Vec::new();
        loop {
            let compound = self.compound()?;
            if compound.is_empty() {
                return Err(if self.peek().is_none() && chain.is_empty() {
                    SelectorError::Empty
                } else {
                    self.unexpected()
                });
            }
            chain.push(compound);
            let had_ws = self.skip_ws();
            match self.peek() {
                None | Some(',') => return Ok(chain),
                Some(_) if had_ws => continue,
                Some(_) => return Err(self.unexpected()),
            }
        }
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        match self.peek() {
            Some('*') => self.pos += 1,
            Some(c) if is_ident_char(c) => compound.tag = Some(self.ident()?.to_ascii_lowercase()),
            _ => {}
        }
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    let name = self.ident()?;
                    if name != "not" {
                        return Err(self.unexpected());
                    }
                    self.expect('(')?;
                    self.skip_ws();
                    let inner = self.compound()?;
                    if inner.is_empty() {
                        return Err(self.unexpected());
                    }
                    self.skip_ws();
                    self.expect(')')?;
                    compound.negations.push(inner);
                }
                _ => return Ok(compound),
            }
        }
    }

    fn ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected());
        }
        Ok(self.chars[start..self.pos].iter().map(|(_, c)| c).collect())
    }

    fn attribute(&mut self) -> Result<AttrTest, SelectorError> {
        self.skip_ws();
        let name = self.ident()?;
        self.skip_ws();
        let op: fn(String) -> AttrOp = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrTest {
                    name,
                    op: AttrOp::Exists,
                });
            }
            Some('=') => {
                self.pos += 1;
                AttrOp::Equals
            }
            Some(c @ ('^' | '$' | '*')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Contains,
                }
            }
            _ => return Err(self.unexpected()),
        };
        self.skip_ws();
        let value = self.value()?;
        self.skip_ws();
        self.expect(']')?;
        Ok(AttrTest {
            name,
            op: op(value),
        })
    }

    fn value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == q => return Ok(out),
                        Some(c) => out.push(c),
                        None => return Err(SelectorError::Unterminated(self.input.to_string())),
                    }
                }
            }
            _ => self.ident(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}
