//! Lenient loader from rendered HTML into a [`Document`].
//!
//! Static documentation generators emit HTML that is close to, but not
//! always, well-formed XML: void elements without a closing slash, omitted
//! `</p>` and `</li>`, named entities such as `&nbsp;`, a bare `&` or `<` in
//! text, and scripts full of `<`. The reader is configured not to insist on
//! matching end names, and the open-element stack is unwound to the nearest
//! matching tag on every end tag. Raw-text elements are skipped by scanning
//! the source for their end tag, and the reader restarts after it.

use std::borrow::Cow;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::document::{Document, Element, NodeId};
use crate::error::{Error, Result};

/// Elements that never have children.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose content is not document text. Their source is skipped
/// unparsed up to the matching end tag.
const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "template", "noscript"];

/// Block elements whose start closes an open `p`.
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "ul", "dd", "dt",
];

/// Elements an implied `</p>` does not reach past.
const P_SCOPE: &[&str] = &["button", "caption", "table", "td", "th"];

/// Elements an implied `</li>` does not reach past.
const LI_SCOPE: &[&str] = &["ol", "ul", "menu", "table", "td", "th"];

/// Elements an implied `</dt>` or `</dd>` does not reach past.
const DL_SCOPE: &[&str] = &["dl", "table", "td", "th"];

fn reader_at(source: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(source);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.allow_dangling_amp = true;
    reader
}

/// Parses `source` into a document rooted at a synthetic `body` element.
///
/// Stray `&` and `<` in text are kept as literal characters.
///
/// # Errors
///
/// Returns [`Error::Html`] when the markup cannot be tokenized at all, such
/// as an unterminated comment or an attribute quote that never closes.
pub fn parse(source: &str) -> Result<Document> {
    let lower = source.to_ascii_lowercase();
    let mut doc = Document::new();
    let mut stack: Vec<NodeId> = vec![doc.root()];
    // Byte offset of the current reader's input within `source`.
    let mut base = 0usize;
    let mut reader = reader_at(source);

    loop {
        let event = reader.read_event().map_err(|err| {
            Error::Html(format!("at byte {}: {err}", base + reader.error_position() as usize))
        })?;
        let resume = match event {
            Event::Start(e) => {
                let after = base + reader.buffer_position() as usize;
                if !is_tag_name(e.name().as_ref()) {
                    push_text(&mut doc, top(&stack), "<")?;
                    Some(tag_open(source, after, e.len(), 1) + 1)
                } else {
                    let element = element_from_start(&reader, &e)?;
                    if SKIPPED_TAGS.contains(&element.tag.as_str()) {
                        Some(skip_raw(&lower, after, &element.tag))
                    } else {
                        close_implied(&doc, &mut stack, &element.tag);
                        let is_void = VOID_TAGS.contains(&element.tag.as_str());
                        let id = doc.create_element(element);
                        doc.append_child(top(&stack), id)?;
                        if !is_void {
                            stack.push(id);
                        }
                        None
                    }
                }
            }
            Event::Empty(e) => {
                if !is_tag_name(e.name().as_ref()) {
                    let after = base + reader.buffer_position() as usize;
                    push_text(&mut doc, top(&stack), "<")?;
                    Some(tag_open(source, after, e.len(), 2) + 1)
                } else {
                    let element = element_from_start(&reader, &e)?;
                    if !SKIPPED_TAGS.contains(&element.tag.as_str()) {
                        close_implied(&doc, &mut stack, &element.tag);
                        let id = doc.create_element(element);
                        doc.append_child(top(&stack), id)?;
                    }
                    None
                }
            }
            Event::End(e) => {
                let tag = decode_tag_name(&reader, e.name().as_ref())?;
                // Unwind to the nearest open element with this tag; ignore
                // stray end tags that match nothing.
                if !VOID_TAGS.contains(&tag.as_str()) {
                    if let Some(pos) = stack.iter().rposition(|n| doc.tag(*n) == Some(tag.as_str())) {
                        if pos > 0 {
                            stack.truncate(pos);
                        }
                    }
                }
                None
            }
            Event::Text(e) => {
                let text = e
                    .decode()
                    .map_err(|err| Error::Html(format!("text decode: {err}")))?;
                push_text(&mut doc, top(&stack), &text)?;
                None
            }
            Event::CData(e) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| Error::Html(format!("cdata decode: {err}")))?;
                push_text(&mut doc, top(&stack), &text)?;
                None
            }
            Event::GeneralRef(e) => {
                let resolved = match e.resolve_char_ref() {
                    Ok(Some(ch)) => ch.to_string(),
                    _ => {
                        let name = e
                            .decode()
                            .map_err(|err| Error::Html(format!("entity decode: {err}")))?;
                        match resolve_html5_entity(&name) {
                            Some(value) => value.to_owned(),
                            None => format!("&{name};"),
                        }
                    }
                };
                push_text(&mut doc, top(&stack), &resolved)?;
                None
            }
            Event::Eof => break,
            _ => None,
        };
        if let Some(pos) = resume {
            if pos >= source.len() {
                break;
            }
            base = pos;
            reader = reader_at(&source[pos..]);
        }
    }

    Ok(doc)
}

/// `true` when `name` can start a real tag rather than a literal `<`.
fn is_tag_name(name: &[u8]) -> bool {
    name.first().is_some_and(u8::is_ascii_alphabetic)
}

/// Offset of the `<` opening a tag that ends at `after`, given the length of
/// its `content` and of its `closing` delimiter (`>` or `/>`).
fn tag_open(source: &str, after: usize, content: usize, closing: usize) -> usize {
    let open = after.saturating_sub(content + closing + 1);
    if source.as_bytes().get(open) == Some(&b'<') {
        open
    } else {
        after
    }
}

/// Offset to resume at after the skipped element `tag` whose start tag ends
/// at `from`. `lower` is the ASCII-lowercased source. An unclosed `head`
/// also ends where `body` starts; any other unclosed element runs to the end.
fn skip_raw(lower: &str, from: usize, tag: &str) -> usize {
    let rest = &lower[from..];
    let close = format!("</{tag}");
    let end = rest.find(&close).map(|i| {
        let gt = rest[i..].find('>').map_or(rest.len(), |g| i + g + 1);
        from + gt
    });
    let body = if tag == "head" {
        rest.find("<body").map(|i| from + i)
    } else {
        None
    };
    match (end, body) {
        (Some(e), Some(b)) => e.min(b),
        (Some(e), None) => e,
        (None, Some(b)) => b,
        (None, None) => lower.len(),
    }
}

/// Pops elements whose end tag is implied by a starting `tag`: an open `p`
/// before a block, an open `li` before the next `li`, an open `dt`/`dd`
/// before the next term or description.
fn close_implied(doc: &Document, stack: &mut Vec<NodeId>, tag: &str) {
    if CLOSES_P.contains(&tag) {
        close_open(doc, stack, &["p"], P_SCOPE);
    }
    match tag {
        "li" => close_open(doc, stack, &["li"], LI_SCOPE),
        "dt" | "dd" => close_open(doc, stack, &["dt", "dd"], DL_SCOPE),
        _ => {}
    }
}

fn close_open(doc: &Document, stack: &mut Vec<NodeId>, targets: &[&str], scope: &[&str]) {
    for pos in (1..stack.len()).rev() {
        let Some(open) = doc.tag(stack[pos]) else {
            continue;
        };
        if targets.contains(&open) {
            stack.truncate(pos);
            return;
        }
        if scope.contains(&open) {
            return;
        }
    }
}

fn top(stack: &[NodeId]) -> NodeId {
    // The root is pushed first and never popped.
    stack[stack.len() - 1]
}

/// Appends `text` to `parent`, extending its last child when that is already
/// a text node so entity references do not fragment a run of text.
fn push_text(doc: &mut Document, parent: NodeId, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let last_text = doc
        .children(parent)
        .last()
        .copied()
        .filter(|n| doc.text(*n).is_some());
    match last_text {
        Some(prev) => doc.push_str(prev, text)?,
        None => {
            let node = doc.create_text(text);
            doc.append_child(parent, node)?;
        }
    }
    Ok(())
}

fn decode_tag_name(reader: &Reader<&[u8]>, raw: &[u8]) -> Result<String> {
    let decoded = reader
        .decoder()
        .decode(raw)
        .map_err(|err| Error::Html(format!("tag name decode: {err}")))?;
    let local_name = decoded.rsplit(':').next().unwrap_or(decoded.as_ref());
    Ok(local_name.to_ascii_lowercase())
}

fn element_from_start(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Element> {
    let tag = decode_tag_name(reader, start.name().as_ref())?;
    let mut element = Element::new(tag);
    for attr in start.html_attributes().flatten() {
        let Ok(key) = reader.decoder().decode(attr.key.as_ref()) else {
            continue;
        };
        let Ok(raw) = reader.decoder().decode(&attr.value) else {
            continue;
        };
        let value: Cow<'_, str> = match unescape_with(&raw, resolve_html5_entity) {
            Ok(v) => v,
            Err(_) => raw.clone(),
        };
        element.set_attr(key.to_ascii_lowercase(), value.into_owned());
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_markup_and_entities() {
        let doc = parse(
            "<article><h1>Intro</h1><p>Fish &amp; chips&nbsp;today</p></article>",
        )
        .unwrap();
        let root = doc.root();
        assert_eq!(doc.text_content(root), "IntroFish & chips\u{a0}today");

        let p = doc
            .descendants(root)
            .find(|n| doc.tag(*n) == Some("p"))
            .unwrap();
        // Entities merge into the surrounding text node.
        assert_eq!(doc.children(p).len(), 1);
    }

    #[test]
    fn void_elements_do_not_swallow_siblings() {
        let doc = parse(r#"<p>see <img src="a.png" alt="Arch diagram"> below<br>next</p>"#)
            .unwrap();
        let img = doc
            .descendants(doc.root())
            .find(|n| doc.tag(*n) == Some("img"))
            .unwrap();
        assert!(doc.children(img).is_empty());
        assert_eq!(doc.attr(img, "alt"), Some("Arch diagram"));
        let p = doc.parent(img).unwrap();
        assert_eq!(doc.tag(p), Some("p"));
        assert_eq!(doc.text_content(p), "see  belownext");
    }

    #[test]
    fn scripts_and_head_are_skipped() {
        let doc = parse(
            "<html><head><title>T</title></head><body><p>kept</p><script>var x = 1;</script></body></html>",
        )
        .unwrap();
        assert_eq!(doc.text_content(doc.root()), "kept");
    }

    #[test]
    fn script_bodies_are_not_markup() {
        let doc = parse(
            "<script>if (a < b) { x = '</p>'; }</script><STYLE>p > a {}</STYLE>\
             <article><p>say hello world today</p></article>",
        )
        .unwrap();
        assert_eq!(doc.text_content(doc.root()), "say hello world today");
        let anchor = crate::types::Anchor::new("hello world", "say", "today");
        assert!(crate::locator::locate(&doc, doc.root(), &anchor).is_some());
    }

    #[test]
    fn unclosed_head_ends_at_body() {
        let doc = parse("<html><head><title>T</title><body><p>kept</p></body></html>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "kept");
    }

    #[test]
    fn bare_ampersands_are_text() {
        let doc = parse("<p>Tom & Jerry</p><p>AT&T</p>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "Tom & JerryAT&T");
    }

    #[test]
    fn bare_less_than_is_text() {
        let doc = parse("<p>if a < b then</p><p>say hello world today</p>").unwrap();
        let p = doc
            .descendants(doc.root())
            .find(|n| doc.tag(*n) == Some("p"))
            .unwrap();
        assert_eq!(doc.text_content(p), "if a < b then");
        assert_eq!(doc.text_content(doc.root()), "if a < b thensay hello world today");
    }

    #[test]
    fn omitted_end_tags_are_implied() {
        let doc = parse("<ul><li>one<li>two</ul><p>first<p>second<div>block</div>").unwrap();
        let root = doc.root();
        let ul = doc
            .descendants(root)
            .find(|n| doc.tag(*n) == Some("ul"))
            .unwrap();
        let items: Vec<_> = doc.children(ul).iter().map(|n| doc.text_content(*n)).collect();
        assert_eq!(items, ["one", "two"]);

        let top_level: Vec<_> = doc.children(root).iter().filter_map(|n| doc.tag(*n)).collect();
        assert_eq!(top_level, ["ul", "p", "p", "div"]);
    }

    #[test]
    fn stray_end_tags_are_ignored() {
        let doc = parse("<div><p>one</span></p><p>two</div>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "onetwo");
    }
}
