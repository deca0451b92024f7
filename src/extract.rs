//! Page content extraction.
//!
//! Walks a page's block tree through a [`NotionApi`] and flattens it into
//! the plain text of a [`Document`](crate::models::Document). Blocks are
//! visited strictly in order, one request at a time; any failed request
//! aborts the whole walk.
//!
//! Children of list items, to-dos, toggles, callouts and quotes are indented
//! by two spaces each time they are spliced into their parent, so the
//! indentation compounds with depth. Children of paragraphs, headings,
//! tables and unknown kinds are spliced as-is.

use std::future::Future;
use std::pin::Pin;

use crate::blocks::{plain_text, Block, BlockKind, MediaBody, RichText};
use crate::notion_api::{NotionApi, NotionError};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const INDENT: &str = "  ";

/// Renders the full content of `page_id` as text.
pub async fn page_text(
    api: &dyn NotionApi,
    token: &str,
    page_id: &str,
) -> Result<String, NotionError> {
    Walker { api, token }.children_text(page_id).await
}

/// How a block's children are joined to its own rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Splice {
    Flat,
    Indented,
    Skip,
}

struct Walker<'a> {
    api: &'a dyn NotionApi,
    token: &'a str,
}

impl<'a> Walker<'a> {
    /// Lists every child of `block_id`, following pagination cursors.
    fn children_text<'b>(&'b self, block_id: &'b str) -> BoxFuture<'b, Result<String, NotionError>> {
        Box::pin(async move {
            let mut out = String::new();
            let mut cursor: Option<String> = None;
            loop {
                let page = self
                    .api
                    .list_block_children(self.token, block_id, cursor.as_deref())
                    .await?;
                for block in &page.results {
                    let text = self.render(block).await?;
                    push_line(&mut out, &text);
                }
                if !page.has_more {
                    break;
                }
                match page.next_cursor.filter(|c| !c.is_empty()) {
                    Some(next) => cursor = Some(next),
                    None => {
                        tracing::warn!(block_id, "has_more set without a next cursor, stopping");
                        break;
                    }
                }
            }
            Ok(out)
        })
    }

    fn render<'b>(&'b self, block: &'b Block) -> BoxFuture<'b, Result<String, NotionError>> {
        Box::pin(async move {
            let (head, splice) = head_text(&block.kind);
            if splice == Splice::Skip {
                return Ok(head);
            }

            let children = self.nested_text(block).await?;
            let children = match splice {
                Splice::Indented => indent(&children),
                _ => children,
            };
            let mut out = head;
            push_line(&mut out, &children);
            Ok(out)
        })
    }

    /// Inline children when the block carries them, otherwise its remote
    /// children when it reports having some.
    async fn nested_text(&self, block: &Block) -> Result<String, NotionError> {
        let inline = block.inline_children();
        if !inline.is_empty() {
            let mut out = String::new();
            for child in inline {
                let text = self.render(child).await?;
                push_line(&mut out, &text);
            }
            return Ok(out);
        }
        if block.has_children {
            return self.children_text(&block.id).await;
        }
        Ok(String::new())
    }
}

fn head_text(kind: &BlockKind) -> (String, Splice) {
    match kind {
        BlockKind::Paragraph { paragraph } => (plain_text(&paragraph.rich_text), Splice::Flat),
        BlockKind::Heading1 { heading_1 } => (prefixed("# ", &heading_1.rich_text), Splice::Flat),
        BlockKind::Heading2 { heading_2 } => (prefixed("## ", &heading_2.rich_text), Splice::Flat),
        BlockKind::Heading3 { heading_3 } => {
            (prefixed("### ", &heading_3.rich_text), Splice::Flat)
        }
        BlockKind::BulletedListItem { bulleted_list_item } => (
            prefixed("• ", &bulleted_list_item.rich_text),
            Splice::Indented,
        ),
        BlockKind::NumberedListItem { numbered_list_item } => (
            prefixed("1. ", &numbered_list_item.rich_text),
            Splice::Indented,
        ),
        BlockKind::ToDo { to_do } => {
            let checkbox = if to_do.checked { "☑ " } else { "☐ " };
            (prefixed(checkbox, &to_do.rich_text), Splice::Indented)
        }
        BlockKind::Toggle { toggle } => (prefixed("▶ ", &toggle.rich_text), Splice::Indented),
        BlockKind::Callout { callout } => (prefixed("💡 ", &callout.rich_text), Splice::Indented),
        BlockKind::Quote { quote } => (prefixed("> ", &quote.rich_text), Splice::Indented),
        BlockKind::Code { code } => (
            format!("```{}\n{}\n```", code.language, plain_text(&code.rich_text)),
            Splice::Skip,
        ),
        BlockKind::Divider => ("---".to_string(), Splice::Skip),
        BlockKind::Table => (String::new(), Splice::Flat),
        BlockKind::TableRow { table_row } => {
            let cells: Vec<String> = table_row.cells.iter().map(|c| plain_text(c)).collect();
            (format!("| {} |", cells.join(" | ")), Splice::Skip)
        }
        BlockKind::ChildPage { child_page } => (format!("📄 {}", child_page.title), Splice::Skip),
        BlockKind::Bookmark { bookmark } => (
            captioned(format!("🔗 {}", bookmark.url), &bookmark.caption),
            Splice::Skip,
        ),
        BlockKind::Embed { embed } => (format!("🔗 {}", embed.url), Splice::Skip),
        BlockKind::Image { image } => (media("🖼 Image", image), Splice::Skip),
        BlockKind::Video { video } => (media("🎥 Video", video), Splice::Skip),
        BlockKind::File { file } => (captioned("📎 File".to_string(), &file.caption), Splice::Skip),
        BlockKind::Unsupported => (String::new(), Splice::Flat),
    }
}

fn prefixed(prefix: &str, runs: &[RichText]) -> String {
    format!("{}{}", prefix, plain_text(runs))
}

fn captioned(mut text: String, caption: &[RichText]) -> String {
    if !caption.is_empty() {
        text.push_str(" - ");
        text.push_str(&plain_text(caption));
    }
    text
}

fn media(label: &str, body: &MediaBody) -> String {
    let mut text = label.to_string();
    if let Some(url) = body.external_url() {
        text.push_str(": ");
        text.push_str(url);
    }
    captioned(text, &body.caption)
}

/// Appends `line` on its own line, ignoring empty renderings.
fn push_line(out: &mut String, line: &str) {
    if line.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(line);
}

/// Prefixes every non-empty line with two spaces.
pub fn indent(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", INDENT, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockPage, TextBody};
    use crate::notion_api::fake::FakeNotion;
    use serde_json::json;

    fn para(id: &str, text: &str) -> Block {
        Block::new(
            id,
            BlockKind::Paragraph {
                paragraph: TextBody::plain(text),
            },
        )
    }

    fn bullet(id: &str, text: &str, children: Vec<Block>) -> Block {
        Block::new(
            id,
            BlockKind::BulletedListItem {
                bulleted_list_item: TextBody::plain(text).with_children(children),
            },
        )
    }

    fn toggle(id: &str, text: &str) -> Block {
        Block::new(
            id,
            BlockKind::Toggle {
                toggle: TextBody::plain(text),
            },
        )
    }

    async fn render(api: &FakeNotion) -> Result<String, NotionError> {
        page_text(api, "secret", "page").await
    }

    #[test]
    fn test_indent_skips_empty_lines() {
        assert_eq!(indent("a\n\nb"), "  a\n\n  b");
        assert_eq!(indent(""), "");
    }

    #[tokio::test]
    async fn test_renders_every_kind() {
        let blocks: Vec<Block> = serde_json::from_value(json!([
            { "id": "1", "type": "paragraph", "paragraph": { "rich_text": [{ "plain_text": "Intro" }] } },
            { "id": "2", "type": "heading_1", "heading_1": { "rich_text": [{ "plain_text": "One" }] } },
            { "id": "3", "type": "heading_2", "heading_2": { "rich_text": [{ "plain_text": "Two" }] } },
            { "id": "4", "type": "heading_3", "heading_3": { "rich_text": [{ "plain_text": "Three" }] } },
            { "id": "5", "type": "numbered_list_item", "numbered_list_item": { "rich_text": [{ "plain_text": "first" }] } },
            { "id": "6", "type": "to_do", "to_do": { "rich_text": [{ "plain_text": "done" }], "checked": true } },
            { "id": "7", "type": "to_do", "to_do": { "rich_text": [{ "plain_text": "open" }], "checked": false } },
            { "id": "8", "type": "callout", "callout": { "rich_text": [{ "plain_text": "note" }] } },
            { "id": "9", "type": "quote", "quote": { "rich_text": [{ "plain_text": "said" }] } },
            { "id": "10", "type": "code", "code": { "rich_text": [{ "plain_text": "fn main() {}" }], "language": "rust" } },
            { "id": "11", "type": "divider", "divider": {} },
            { "id": "12", "type": "child_page", "child_page": { "title": "Sub" } },
            { "id": "13", "type": "bookmark", "bookmark": { "url": "https://a.example", "caption": [{ "plain_text": "docs" }] } },
            { "id": "14", "type": "bookmark", "bookmark": { "url": "https://b.example", "caption": [] } },
            { "id": "15", "type": "embed", "embed": { "url": "https://c.example" } },
            { "id": "16", "type": "image", "image": { "type": "external", "external": { "url": "https://i.example/x.png" }, "caption": [{ "plain_text": "chart" }] } },
            { "id": "17", "type": "video", "video": { "type": "file", "file": { "url": "https://s3/v.mp4" }, "caption": [] } },
            { "id": "18", "type": "file", "file": { "type": "file", "file": { "url": "https://s3/f" }, "caption": [{ "plain_text": "design.pdf" }] } }
        ]))
        .unwrap();
        let api = FakeNotion::new().with_children("page", blocks);

        let expected = [
            "Intro",
            "# One",
            "## Two",
            "### Three",
            "1. first",
            "☑ done",
            "☐ open",
            "💡 note",
            "> said",
            "```rust\nfn main() {}\n```",
            "---",
            "📄 Sub",
            "🔗 https://a.example - docs",
            "🔗 https://b.example",
            "🔗 https://c.example",
            "🖼 Image: https://i.example/x.png - chart",
            "🎥 Video",
            "📎 File - design.pdf",
        ]
        .join("\n");
        assert_eq!(render(&api).await.unwrap(), expected);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_nested_lists_compound_indentation() {
        let api = FakeNotion::new().with_children(
            "page",
            vec![
                bullet(
                    "a",
                    "A",
                    vec![bullet("a1", "A1", vec![bullet("a1a", "A1a", vec![])])],
                ),
                bullet("b", "B", vec![]),
            ],
        );
        assert_eq!(
            render(&api).await.unwrap(),
            "• A\n  • A1\n    • A1a\n• B"
        );
    }

    #[tokio::test]
    async fn test_remote_children_are_fetched() {
        let api = FakeNotion::new()
            .with_children("page", vec![toggle("t", "Details").with_remote_children()])
            .with_children("t", vec![para("p1", "hidden"), para("p2", "more")]);
        assert_eq!(
            render(&api).await.unwrap(),
            "▶ Details\n  hidden\n  more"
        );
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_paragraph_children_are_not_indented() {
        let parent = Block::new(
            "p",
            BlockKind::Paragraph {
                paragraph: TextBody::plain("Parent").with_children(vec![bullet("c", "child", vec![])]),
            },
        );
        let api = FakeNotion::new().with_children("page", vec![parent]);
        assert_eq!(render(&api).await.unwrap(), "Parent\n• child");
    }

    #[tokio::test]
    async fn test_pagination_follows_cursor() {
        let api = FakeNotion::new().with_paged_children(
            "page",
            vec![
                vec![para("1", "first"), para("2", "second")],
                vec![para("3", "third")],
            ],
        );
        assert_eq!(render(&api).await.unwrap(), "first\nsecond\nthird");
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_has_more_without_cursor_stops() {
        let api = FakeNotion::new().with_raw_listing(
            "page",
            vec![BlockPage {
                results: vec![para("1", "only")],
                next_cursor: None,
                has_more: true,
            }],
        );
        assert_eq!(render(&api).await.unwrap(), "only");
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_table_rows_are_spliced_flat() {
        let rows: Vec<Block> = serde_json::from_value(json!([
            { "id": "r1", "type": "table_row", "table_row": { "cells": [[{ "plain_text": "Name" }], [{ "plain_text": "Role" }]] } },
            { "id": "r2", "type": "table_row", "table_row": { "cells": [[{ "plain_text": "Ada" }], [{ "plain_text": "Eng" }]] } }
        ]))
        .unwrap();
        let api = FakeNotion::new()
            .with_children(
                "page",
                vec![Block::new("tbl", BlockKind::Table).with_remote_children()],
            )
            .with_children("tbl", rows);
        assert_eq!(
            render(&api).await.unwrap(),
            "| Name | Role |\n| Ada | Eng |"
        );
    }

    #[tokio::test]
    async fn test_unsupported_kind_keeps_children() {
        let api = FakeNotion::new()
            .with_children(
                "page",
                vec![
                    para("1", "before"),
                    Block::new("cols", BlockKind::Unsupported).with_remote_children(),
                    Block::new("empty", BlockKind::Unsupported),
                    para("2", "after"),
                ],
            )
            .with_children("cols", vec![para("c1", "left"), para("c2", "right")]);
        assert_eq!(
            render(&api).await.unwrap(),
            "before\nleft\nright\nafter"
        );
    }

    #[tokio::test]
    async fn test_nested_failure_aborts_fetch() {
        let api = FakeNotion::new()
            .with_children(
                "page",
                vec![para("1", "visible"), toggle("t", "broken").with_remote_children()],
            )
            .failing("t");
        let err = render(&api).await.unwrap_err();
        assert!(matches!(err, NotionError::Api { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_leaf_kinds_do_not_descend() {
        let api = FakeNotion::new().with_children(
            "page",
            vec![Block::new("d", BlockKind::Divider).with_remote_children()],
        );
        assert_eq!(render(&api).await.unwrap(), "---");
        assert_eq!(api.calls(), 1);
    }
}
