//! Selector parsing and matching.
//!
//! Supports the CSS subset that end-to-end suites actually use: type and
//! universal selectors, `#id`, `.class`, attribute conditions
//! (`[a]`, `[a=v]`, `[a*=v]`, `[a^=v]`, `[a$=v]`, `[a~=v]`), descendant and
//! child combinators, and comma-separated selector lists. Text selectors
//! follow the `contains` convention of returning the deepest matching element.

use std::fmt;

use crate::dom::{Document, Element, NodeId};
use crate::result::{LanecheckError, LanecheckResult};

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// CSS selector (e.g. `[data-testid="stage-column"] .card-header`)
    Css(String),
    /// Test ID selector (`data-testid` attribute)
    TestId(String),
    /// `data-cy` attribute selector
    DataCy(String),
    /// Deepest elements whose text contains the string
    Text(String),
    /// CSS selector filtered by text content
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Create a `data-cy` selector
    #[must_use]
    pub fn data_cy(id: impl Into<String>) -> Self {
        Self::DataCy(id.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Filter by text content
    ///
    /// Non-CSS selectors are first expressed as CSS so the filter always applies.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        let css = match self {
            Self::Css(css) | Self::CssWithText { css, .. } => css,
            Self::TestId(id) => attr_css("data-testid", &id),
            Self::DataCy(id) => attr_css("data-cy", &id),
            Self::Text(_) => "*".to_string(),
        };
        Self::CssWithText {
            css,
            text: text.into(),
        }
    }

    /// Parse into a matcher
    pub fn compile(&self) -> LanecheckResult<CompiledSelector> {
        let matcher = match self {
            Self::Css(css) => Matcher::Css(parse_selector_list(css)?),
            Self::TestId(id) => Matcher::Css(vec![Complex::single(Compound::attr_eq("data-testid", id))]),
            Self::DataCy(id) => Matcher::Css(vec![Complex::single(Compound::attr_eq("data-cy", id))]),
            Self::Text(text) => Matcher::Text(text.clone()),
            Self::CssWithText { css, text } => {
                Matcher::CssWithText(parse_selector_list(css)?, text.clone())
            }
        };
        Ok(CompiledSelector { matcher })
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Self::Css(value.to_string())
    }
}

impl From<String> for Selector {
    fn from(value: String) -> Self {
        Self::Css(value)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "{css}"),
            Self::TestId(id) => write!(f, "{}", attr_css("data-testid", id)),
            Self::DataCy(id) => write!(f, "{}", attr_css("data-cy", id)),
            Self::Text(text) => write!(f, "text={text:?}"),
            Self::CssWithText { css, text } => write!(f, "{css}:contains({text:?})"),
        }
    }
}

fn attr_css(name: &str, value: &str) -> String {
    format!("[{name}={value:?}]")
}

/// A parsed selector ready for matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSelector {
    matcher: Matcher,
}

impl CompiledSelector {
    /// Whether `node` matches
    #[must_use]
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match &self.matcher {
            Matcher::Css(list) => list.iter().any(|c| c.matches(doc, node)),
            Matcher::Text(text) => {
                doc.text_content(node).contains(text.as_str())
                    && !doc.get(node).is_some_and(|el| {
                        el.children()
                            .iter()
                            .any(|child| doc.text_content(*child).contains(text.as_str()))
                    })
            }
            Matcher::CssWithText(list, text) => {
                list.iter().any(|c| c.matches(doc, node))
                    && doc.text_content(node).contains(text.as_str())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
    Css(Vec<Complex>),
    Text(String),
    CssWithText(Vec<Complex>, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
    Word(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCondition {
    name: String,
    op: AttrOp,
}

impl AttrCondition {
    fn matches(&self, el: &Element) -> bool {
        let Some(value) = el.attribute(&self.name) else {
            return false;
        };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(v) => value == v,
            AttrOp::Contains(v) => value.contains(v.as_str()),
            AttrOp::Prefix(v) => value.starts_with(v.as_str()),
            AttrOp::Suffix(v) => value.ends_with(v.as_str()),
            AttrOp::Word(v) => value.split_whitespace().any(|w| w == v),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
}

impl Compound {
    fn attr_eq(name: &str, value: &str) -> Self {
        Self {
            attrs: vec![AttrCondition {
                name: name.to_string(),
                op: AttrOp::Equals(value.to_string()),
            }],
            ..Self::default()
        }
    }

    fn matches(&self, el: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if el.tag() != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| el.has_class(c)) && self.attrs.iter().all(|a| a.matches(el))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    combinator: Option<Combinator>,
    compound: Compound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<Part>,
}

impl Complex {
    fn single(compound: Compound) -> Self {
        Self {
            parts: vec![Part {
                combinator: None,
                compound,
            }],
        }
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match self.parts.len() {
            0 => false,
            n => self.match_at(doc, node, n - 1),
        }
    }

    // Right-to-left with backtracking over descendant combinators.
    fn match_at(&self, doc: &Document, node: NodeId, idx: usize) -> bool {
        let part = &self.parts[idx];
        if !doc.get(node).is_some_and(|el| part.compound.matches(el)) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match part.combinator {
            Some(Combinator::Child) => doc
                .get(node)
                .and_then(Element::parent)
                .is_some_and(|parent| self.match_at(doc, parent, idx - 1)),
            Some(Combinator::Descendant) | None => doc
                .ancestors(node)
                .into_iter()
                .any(|ancestor| self.match_at(doc, ancestor, idx - 1)),
        }
    }
}

fn invalid(selector: &str, message: impl Into<String>) -> LanecheckError {
    LanecheckError::InvalidSelector {
        selector: selector.to_string(),
        message: message.into(),
    }
}

fn parse_selector_list(source: &str) -> LanecheckResult<Vec<Complex>> {
    let source = source.trim();
    if source.is_empty() {
        return Err(invalid(source, "empty selector"));
    }
    split_top_level(source, ',')
        .into_iter()
        .map(|part| parse_complex(part.trim(), source))
        .collect()
}

/// Split on `sep` outside brackets and quotes
fn split_top_level(source: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in source.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if c == sep && depth == 0 => {
                parts.push(&source[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}

fn parse_complex(source: &str, whole: &str) -> LanecheckResult<Complex> {
    let chars: Vec<char> = source.chars().collect();
    let mut parts: Vec<Part> = Vec::new();
    let mut pending: Option<Combinator> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            if !parts.is_empty() && pending.is_none() {
                pending = Some(Combinator::Descendant);
            }
            i += 1;
            continue;
        }
        if c == '>' {
            if parts.is_empty() || pending == Some(Combinator::Child) {
                return Err(invalid(whole, "dangling '>' combinator"));
            }
            pending = Some(Combinator::Child);
            i += 1;
            continue;
        }

        let start = i;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        while i < chars.len() {
            let ch = chars[i];
            match (quote, ch) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(ch),
                (None, '[') => depth += 1,
                (None, ']') => depth = depth.saturating_sub(1),
                (None, c) if depth == 0 && (c.is_whitespace() || c == '>') => break,
                _ => {}
            }
            i += 1;
        }
        if quote.is_some() || depth != 0 {
            return Err(invalid(whole, "unterminated attribute selector"));
        }
        let token: String = chars[start..i].iter().collect();
        let compound = parse_compound(&token, whole)?;
        let combinator = if parts.is_empty() {
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        pending = None;
        parts.push(Part {
            combinator,
            compound,
        });
    }

    if parts.is_empty() {
        return Err(invalid(whole, "empty selector in list"));
    }
    if pending == Some(Combinator::Child) {
        return Err(invalid(whole, "dangling '>' combinator"));
    }
    Ok(Complex { parts })
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && is_ident_char(chars[*i]) {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn parse_compound(token: &str, whole: &str) -> LanecheckResult<Compound> {
    let chars: Vec<char> = token.chars().collect();
    let mut compound = Compound::default();
    let mut i = 0;

    if chars.first() == Some(&'*') {
        i = 1;
    } else if chars.first().is_some_and(|c| c.is_ascii_alphabetic()) {
        compound.tag = Some(read_ident(&chars, &mut i).to_ascii_lowercase());
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                let id = read_ident(&chars, &mut i);
                if id.is_empty() {
                    return Err(invalid(whole, "empty id selector"));
                }
                compound.id = Some(id);
            }
            '.' => {
                i += 1;
                let class = read_ident(&chars, &mut i);
                if class.is_empty() {
                    return Err(invalid(whole, "empty class selector"));
                }
                compound.classes.push(class);
            }
            '[' => {
                let close = find_attr_close(&chars, i)
                    .ok_or_else(|| invalid(whole, "unterminated attribute selector"))?;
                let body: String = chars[i + 1..close].iter().collect();
                compound.attrs.push(parse_attr(&body, whole)?);
                i = close + 1;
            }
            ':' => return Err(invalid(whole, "pseudo-classes are not supported")),
            other => return Err(invalid(whole, format!("unexpected character {other:?}"))),
        }
    }
    Ok(compound)
}

fn find_attr_close(chars: &[char], open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, &ch) in chars[open + 1..].iter().enumerate() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, ']') => return Some(open + 1 + offset),
            _ => {}
        }
    }
    None
}

fn parse_attr(body: &str, whole: &str) -> LanecheckResult<AttrCondition> {
    let body = body.trim();
    let Some(eq) = body.find('=') else {
        if body.is_empty() || !body.chars().all(is_ident_char) {
            return Err(invalid(whole, "invalid attribute name"));
        }
        return Ok(AttrCondition {
            name: body.to_string(),
            op: AttrOp::Exists,
        });
    };

    let (lhs, rhs) = body.split_at(eq);
    let rhs = rhs[1..].trim();
    let (name, modifier) = match lhs.trim_end().chars().last() {
        Some(m @ ('*' | '^' | '$' | '~')) => (lhs.trim_end()[..lhs.trim_end().len() - 1].trim(), Some(m)),
        _ => (lhs.trim(), None),
    };
    if name.is_empty() || !name.chars().all(is_ident_char) {
        return Err(invalid(whole, "invalid attribute name"));
    }
    let value = unquote(rhs);
    let op = match modifier {
        None => AttrOp::Equals(value),
        Some('*') => AttrOp::Contains(value),
        Some('^') => AttrOp::Prefix(value),
        Some('$') => AttrOp::Suffix(value),
        Some(_) => AttrOp::Word(value),
    };
    Ok(AttrCondition {
        name: name.to_string(),
        op,
    })
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::El;

    fn board() -> Document {
        Document::new(
            El::new("body").child(
                El::new("div")
                    .class("row")
                    .child(
                        El::new("div")
                            .class("card")
                            .attr("data-testid", "stage-column")
                            .child(El::new("div").class("card-header").text("Screening"))
                            .child(
                                El::new("div").class("card-body").child(
                                    El::new("div")
                                        .class("card")
                                        .attr("data-testid", "candidate-card")
                                        .attr("data-candidate-id", "1")
                                        .child(El::new("div").class("card-title").text("Alice Smith")),
                                ),
                            ),
                    )
                    .child(
                        El::new("div")
                            .class("card")
                            .attr("data-testid", "stage-column")
                            .child(El::new("div").class("card-header").text("Technical"))
                            .child(El::new("div").class("card-body")),
                    )
                    .child(El::new("button").id("back").text("Volver a Posiciones")),
            ),
        )
    }

    fn count(doc: &Document, selector: &Selector) -> usize {
        let compiled = selector.compile().unwrap();
        doc.walk()
            .into_iter()
            .filter(|n| compiled.matches(doc, *n))
            .count()
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_attribute_forms() {
            for css in [
                "[data-testid]",
                "[data-testid=stage-column]",
                "[data-testid=\"stage-column\"]",
                "[data-testid='stage-column']",
                "[data-testid*=column]",
                "[data-testid^=stage]",
                "[data-testid$=column]",
            ] {
                assert!(Selector::css(css).compile().is_ok(), "{css}");
            }
        }

        #[test]
        fn test_parse_rejects_garbage() {
            for css in ["", "div >", "> div", "[data-x", "div:hover", ".", "#", "div >> span"] {
                let err = Selector::css(css).compile().unwrap_err();
                assert_eq!(err.kind(), "InvalidSelector", "{css}");
            }
        }

        #[test]
        fn test_split_respects_quotes() {
            let parts = split_top_level("[title=\"a,b\"], h2", ',');
            assert_eq!(parts.len(), 2);
        }

        #[test]
        fn test_display() {
            assert_eq!(Selector::test_id("x").to_string(), "[data-testid=\"x\"]");
            assert_eq!(Selector::text("Alice").to_string(), "text=\"Alice\"");
        }
    }

    mod match_tests {
        use super::*;

        #[test]
        fn test_type_class_id() {
            let doc = board();
            assert_eq!(count(&doc, &Selector::css("button")), 1);
            assert_eq!(count(&doc, &Selector::css("#back")), 1);
            assert_eq!(count(&doc, &Selector::css(".card")), 3);
            assert_eq!(count(&doc, &Selector::css("div.card-header")), 2);
            assert_eq!(count(&doc, &Selector::css("*")), 11);
        }

        #[test]
        fn test_attribute_match() {
            let doc = board();
            assert_eq!(count(&doc, &Selector::test_id("stage-column")), 2);
            assert_eq!(count(&doc, &Selector::css("[data-testid*=card]")), 1);
            assert_eq!(count(&doc, &Selector::css("[data-candidate-id=\"1\"]")), 1);
            assert_eq!(count(&doc, &Selector::data_cy("position-card")), 0);
        }

        #[test]
        fn test_descendant_and_child() {
            let doc = board();
            assert_eq!(count(&doc, &Selector::css("[data-testid=stage-column] .card-title")), 1);
            assert_eq!(count(&doc, &Selector::css("[data-testid=stage-column] > .card-title")), 0);
            assert_eq!(count(&doc, &Selector::css(".row > .card")), 2);
            assert_eq!(count(&doc, &Selector::css("body .card .card-title")), 1);
        }

        #[test]
        fn test_selector_list() {
            let doc = board();
            assert_eq!(count(&doc, &Selector::css("button, .card-header")), 3);
        }

        #[test]
        fn test_text_matches_deepest() {
            let doc = board();
            assert_eq!(count(&doc, &Selector::text("Alice")), 1);
            assert_eq!(count(&doc, &Selector::text("Nobody")), 0);
        }

        #[test]
        fn test_css_with_text() {
            let doc = board();
            let sel = Selector::test_id("stage-column").with_text("Alice");
            assert_eq!(count(&doc, &sel), 1);
            let sel = Selector::css("button").with_text("Volver");
            assert_eq!(count(&doc, &sel), 1);
        }
    }
}
