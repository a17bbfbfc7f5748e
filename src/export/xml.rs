//! Minimal XML reading and escaping for the xmeml encoding.
//!
//! Only what the exporter itself emits is supported: elements, attributes, text, the five
//! predefined entities and numeric character references. Prolog, doctype and comments are
//! skipped.

use crate::foundation::error::{ClipforgeError, ClipforgeResult};

/// Escape text or attribute content.
pub(crate) fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> ClipforgeResult<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        let end = tail
            .find(';')
            .ok_or_else(|| ClipforgeError::serialization("unterminated xml entity"))?;
        let entity = &tail[1..end];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                let c = code.and_then(char::from_u32).ok_or_else(|| {
                    ClipforgeError::serialization(format!("unknown xml entity '&{entity};'"))
                })?;
                out.push(c);
            }
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[derive(Clone, Debug, Default, PartialEq)]
/// Parsed element.
pub(crate) struct Element {
    pub(crate) name: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) children: Vec<Element>,
    pub(crate) text: String,
}

impl Element {
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub(crate) fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of child `name` parsed as an integer.
    pub(crate) fn child_i64(&self, name: &str) -> ClipforgeResult<i64> {
        let c = self.child(name).ok_or_else(|| {
            ClipforgeError::serialization(format!("<{}> is missing <{name}>", self.name))
        })?;
        c.text.trim().parse().map_err(|_| {
            ClipforgeError::serialization(format!(
                "<{name}> in <{}> is not an integer: '{}'",
                self.name,
                c.text.trim()
            ))
        })
    }
}

/// Parse a document into its root element.
pub(crate) fn parse(doc: &str) -> ClipforgeResult<Element> {
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut rest = doc;

    while !rest.is_empty() {
        let Some(lt) = rest.find('<') else {
            if !rest.trim().is_empty() && stack.is_empty() {
                return Err(ClipforgeError::serialization("text outside the root element"));
            }
            if let Some(top) = stack.last_mut() {
                top.text.push_str(&unescape(rest)?);
            }
            break;
        };
        if lt > 0
            && let Some(top) = stack.last_mut()
        {
            top.text.push_str(&unescape(&rest[..lt])?);
        }
        rest = &rest[lt..];

        if let Some(after) = rest.strip_prefix("<?") {
            rest = skip_past(after, "?>")?;
        } else if let Some(after) = rest.strip_prefix("<!--") {
            rest = skip_past(after, "-->")?;
        } else if let Some(after) = rest.strip_prefix("<!") {
            rest = skip_past(after, ">")?;
        } else if let Some(after) = rest.strip_prefix("</") {
            let end = after
                .find('>')
                .ok_or_else(|| ClipforgeError::serialization("unterminated end tag"))?;
            let name = after[..end].trim();
            let el = stack
                .pop()
                .ok_or_else(|| ClipforgeError::serialization(format!("stray </{name}>")))?;
            if el.name != name {
                return Err(ClipforgeError::serialization(format!(
                    "mismatched </{name}>, expected </{}>",
                    el.name
                )));
            }
            attach(&mut stack, &mut root, el)?;
            rest = &after[end + 1..];
        } else {
            let after = &rest[1..];
            let end = find_tag_end(after)?;
            let (body, self_closing) = match after[..end].strip_suffix('/') {
                Some(b) => (b, true),
                None => (&after[..end], false),
            };
            let el = parse_start_tag(body)?;
            if self_closing {
                attach(&mut stack, &mut root, el)?;
            } else {
                stack.push(el);
            }
            rest = &after[end + 1..];
        }
    }

    if let Some(open) = stack.last() {
        return Err(ClipforgeError::serialization(format!(
            "unclosed <{}>",
            open.name
        )));
    }
    root.ok_or_else(|| ClipforgeError::serialization("empty xml document"))
}

fn skip_past<'a>(s: &'a str, pat: &str) -> ClipforgeResult<&'a str> {
    s.find(pat)
        .map(|i| &s[i + pat.len()..])
        .ok_or_else(|| ClipforgeError::serialization(format!("missing '{pat}'")))
}

fn find_tag_end(s: &str) -> ClipforgeResult<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Ok(i),
            _ => {}
        }
    }
    Err(ClipforgeError::serialization("unterminated start tag"))
}

fn parse_start_tag(body: &str) -> ClipforgeResult<Element> {
    let body = body.trim();
    let name_end = body.find(char::is_whitespace).unwrap_or(body.len());
    let name = &body[..name_end];
    if name.is_empty() {
        return Err(ClipforgeError::serialization("element without a name"));
    }
    let mut attrs = Vec::new();
    let mut rest = body[name_end..].trim_start();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| ClipforgeError::serialization(format!("bad attribute in <{name}>")))?;
        let key = rest[..eq].trim().to_string();
        let value_part = rest[eq + 1..].trim_start();
        let q = value_part
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| ClipforgeError::serialization(format!("unquoted attribute in <{name}>")))?;
        let close = value_part[1..]
            .find(q)
            .ok_or_else(|| ClipforgeError::serialization(format!("unterminated attribute in <{name}>")))?;
        attrs.push((key, unescape(&value_part[1..1 + close])?));
        rest = value_part[close + 2..].trim_start();
    }
    Ok(Element {
        name: name.to_string(),
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> ClipforgeResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_some() {
                return Err(ClipforgeError::serialization("multiple root elements"));
            }
            *root = Some(el);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/export/xml.rs"]
mod tests;
