// Markdown (de)serialization of block sequences.
//
// Both directions are total: `deserialize` never fails (unknown or
// malformed markup degrades to plain text blocks) and `serialize` is a
// pure rendering. The pair is idempotent under repeated
// deserialize-then-serialize: one pass reaches a textual fixed point.
// Block identifiers are regenerated on every deserialize, so
// identity-level round-tripping is deliberately not promised.

use std::ops::Range;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::block::{Block, BlockKind};

/// Render a block sequence to flat markdown. Blocks are separated by a
/// blank line so adjacent paragraphs survive a re-parse; consecutive todo
/// blocks stay on adjacent lines and re-parse as one tight checklist.
pub fn serialize(blocks: &[Block]) -> String {
    let mut out = String::new();
    for (index, block) in blocks.iter().enumerate() {
        if index > 0 {
            let tight = matches!(block.kind, BlockKind::Todo { .. })
                && matches!(blocks[index - 1].kind, BlockKind::Todo { .. });
            out.push_str(if tight { "\n" } else { "\n\n" });
        }
        out.push_str(&render_block(block));
    }
    out
}

fn render_block(block: &Block) -> String {
    match &block.kind {
        BlockKind::Text => block.content.clone(),
        BlockKind::Heading { level } => {
            format!("{} {}", "#".repeat(usize::from(*level)), block.content)
        }
        BlockKind::Todo { done } => {
            format!("- [{}] {}", if *done { 'x' } else { ' ' }, block.content)
        }
        BlockKind::Image { url } => format!("![{}]({})", block.content, url),
    }
}

/// Parse flat markdown into a block sequence with fresh identifiers.
///
/// ATX headings become heading blocks, task-list items become todo
/// blocks, a paragraph holding exactly one image becomes an image block,
/// and every other top-level element is kept verbatim as a text block.
/// Empty input yields a single empty text block, never an empty sequence.
pub fn deserialize(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut events = Parser::new_ext(text, Options::ENABLE_TASKLISTS).into_offset_iter();

    while let Some((event, range)) = events.next() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                skip_subtree(&mut events);
                if is_atx_heading(text, range.start) {
                    blocks.push(Block::heading(level_to_u8(level), atx_content(&text[range])));
                } else {
                    // Setext headings are kept verbatim, like any other
                    // markup this model doesn't represent.
                    blocks.push(Block::text(text[range].trim_end()));
                }
            }
            Event::Start(Tag::List(_)) => {
                parse_list(text, &mut events, &mut blocks);
            }
            Event::Start(Tag::Paragraph) => {
                blocks.push(parse_paragraph(text, &mut events, range));
            }
            Event::Start(_) => {
                // Code fences, block quotes, HTML blocks, tables: one
                // verbatim text block per top-level element.
                skip_subtree(&mut events);
                blocks.push(Block::text(text[range].trim_end()));
            }
            Event::Rule => {
                blocks.push(Block::text(text[range].trim_end()));
            }
            _ => {}
        }
    }

    if blocks.is_empty() {
        blocks.push(Block::text(""));
    }
    blocks
}

type OffsetEvents<'a> = pulldown_cmark::OffsetIter<'a>;

/// Consume events until the End matching the Start we just saw.
fn skip_subtree(events: &mut OffsetEvents<'_>) {
    let mut depth = 0usize;
    for (event, _) in events.by_ref() {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    return;
                }
                depth -= 1;
            }
            _ => {}
        }
    }
}

/// Walk the items of a top-level list. Task items become todo blocks;
/// anything else is kept verbatim as a text block per item.
fn parse_list(text: &str, events: &mut OffsetEvents<'_>, blocks: &mut Vec<Block>) {
    let mut depth = 0usize;
    while let Some((event, range)) = events.next() {
        match event {
            Event::Start(Tag::Item) if depth == 0 => {
                blocks.push(parse_item(text, events, range));
            }
            Event::Start(_) => depth += 1,
            Event::End(TagEnd::List(_)) if depth == 0 => return,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
}

fn parse_item(text: &str, events: &mut OffsetEvents<'_>, item_range: Range<usize>) -> Block {
    let mut marker: Option<(Range<usize>, bool)> = None;
    let mut depth = 0usize;
    while let Some((event, range)) = events.next() {
        match event {
            // A task marker directly inside the item (or its leading
            // paragraph); markers of nested items sit deeper and are
            // content, not this item's state.
            Event::TaskListMarker(done) if marker.is_none() && depth <= 1 => {
                marker = Some((range, done));
            }
            Event::Start(_) => depth += 1,
            Event::End(TagEnd::Item) if depth == 0 => break,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    match marker {
        Some((marker_range, done)) => {
            Block::todo(done, text[marker_range.end..item_range.end].trim())
        }
        None => Block::text(text[item_range].trim_end()),
    }
}

/// A paragraph is an image block when it consists of exactly one image
/// and nothing else; otherwise it is a verbatim text block.
fn parse_paragraph(
    text: &str,
    events: &mut OffsetEvents<'_>,
    para_range: Range<usize>,
) -> Block {
    let mut inner = Vec::new();
    let mut depth = 0usize;
    while let Some((event, range)) = events.next() {
        match &event {
            Event::End(TagEnd::Paragraph) if depth == 0 => break,
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
        inner.push((event, range));
    }

    if let Some(block) = image_only_paragraph(&inner) {
        return block;
    }
    Block::text(text[para_range].trim_end())
}

fn image_only_paragraph(inner: &[(Event<'_>, Range<usize>)]) -> Option<Block> {
    let (Event::Start(Tag::Image { dest_url, .. }), _) = inner.first()? else {
        return None;
    };
    let (Event::End(TagEnd::Image), _) = inner.last()? else {
        return None;
    };

    let mut alt = String::new();
    for (event, _) in &inner[1..inner.len() - 1] {
        match event {
            Event::Text(t) | Event::Code(t) => alt.push_str(t),
            Event::SoftBreak | Event::HardBreak => alt.push(' '),
            // Styled alt text falls back to a verbatim text block.
            _ => return None,
        }
    }
    Some(Block::image(dest_url.to_string(), alt))
}

/// Heading content from a raw ATX slice: leading hashes, the separating
/// space, and any closing hash sequence are stripped.
fn atx_content(raw: &str) -> &str {
    let s = raw.trim_start().trim_start_matches('#');
    let s = s.strip_prefix(' ').unwrap_or(s).trim_end();
    let closed = s.trim_end_matches('#');
    if closed.len() < s.len() && closed.ends_with(' ') {
        closed.trim_end()
    } else {
        s
    }
}

fn is_atx_heading(text: &str, offset: usize) -> bool {
    let line_start = text[..offset].rfind('\n').map(|index| index + 1).unwrap_or(0);
    text[line_start..]
        .chars()
        .find(|ch| !ch.is_whitespace())
        .map(|ch| ch == '#')
        .unwrap_or(false)
}

fn level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
