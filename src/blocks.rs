//! Notion content model: pages, blocks and rich text.
//!
//! Blocks arrive from the API as `{"type": "<kind>", "<kind>": {...}}`.
//! [`BlockKind`] mirrors that shape as a closed enum so the renderer in
//! [`crate::extract`] can match on it exhaustively; kinds this crate does not
//! know about land in [`BlockKind::Unsupported`].

use serde::Deserialize;
use std::collections::BTreeMap;

/// One run of inline text. Only the plain-text projection is kept.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain_text: text.into(),
        }
    }
}

/// Concatenates the plain text of every run.
pub fn plain_text(runs: &[RichText]) -> String {
    runs.iter().map(|r| r.plain_text.as_str()).collect()
}

/// A node of the page content tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(default)]
    pub has_children: bool,
    #[serde(flatten)]
    pub kind: BlockKind,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            has_children: false,
            kind,
        }
    }

    /// Marks the block as having children that must be fetched by id.
    pub fn with_remote_children(mut self) -> Self {
        self.has_children = true;
        self
    }

    /// Children delivered inline with the block, if the kind can carry them.
    pub fn inline_children(&self) -> &[Block] {
        match &self.kind {
            BlockKind::Paragraph { paragraph: t }
            | BlockKind::Heading1 { heading_1: t }
            | BlockKind::Heading2 { heading_2: t }
            | BlockKind::Heading3 { heading_3: t }
            | BlockKind::BulletedListItem {
                bulleted_list_item: t,
            }
            | BlockKind::NumberedListItem {
                numbered_list_item: t,
            }
            | BlockKind::Toggle { toggle: t }
            | BlockKind::Callout { callout: t }
            | BlockKind::Quote { quote: t } => &t.children,
            BlockKind::ToDo { to_do } => &to_do.children,
            _ => &[],
        }
    }
}

/// Body shared by every text-bearing block kind.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub children: Vec<Block>,
}

impl TextBody {
    pub fn plain(text: &str) -> Self {
        Self {
            rich_text: vec![RichText::plain(text)],
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToDoBody {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub children: Vec<Block>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CodeBody {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableRowBody {
    #[serde(default)]
    pub cells: Vec<Vec<RichText>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChildPageBody {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkBody {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub caption: Vec<RichText>,
}

/// Where a media block's bytes live.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    External { external: FileLink },
    /// Hosted by Notion behind an expiring URL.
    File { file: FileLink },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileLink {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaBody {
    #[serde(flatten)]
    pub source: Option<MediaSource>,
    #[serde(default)]
    pub caption: Vec<RichText>,
}

impl MediaBody {
    /// URL of an externally hosted file. Hosted URLs expire and are omitted.
    pub fn external_url(&self) -> Option<&str> {
        match &self.source {
            Some(MediaSource::External { external }) => Some(external.url.as_str()),
            _ => None,
        }
    }
}

/// Every block kind the renderer understands.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph {
        paragraph: TextBody,
    },
    #[serde(rename = "heading_1")]
    Heading1 {
        heading_1: TextBody,
    },
    #[serde(rename = "heading_2")]
    Heading2 {
        heading_2: TextBody,
    },
    #[serde(rename = "heading_3")]
    Heading3 {
        heading_3: TextBody,
    },
    BulletedListItem {
        bulleted_list_item: TextBody,
    },
    NumberedListItem {
        numbered_list_item: TextBody,
    },
    ToDo {
        to_do: ToDoBody,
    },
    Toggle {
        toggle: TextBody,
    },
    Callout {
        callout: TextBody,
    },
    Quote {
        quote: TextBody,
    },
    Code {
        code: CodeBody,
    },
    Divider,
    Table,
    TableRow {
        table_row: TableRowBody,
    },
    ChildPage {
        child_page: ChildPageBody,
    },
    Bookmark {
        bookmark: LinkBody,
    },
    Embed {
        embed: LinkBody,
    },
    Image {
        image: MediaBody,
    },
    Video {
        video: MediaBody,
    },
    File {
        file: MediaBody,
    },
    #[serde(other)]
    Unsupported,
}

/// One page of a paginated child-block listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockPage {
    #[serde(default)]
    pub results: Vec<Block>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// A page property. Only the title is interpreted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Property {
    Title {
        #[serde(default)]
        title: Vec<RichText>,
    },
    #[serde(other)]
    Other,
}

/// Page metadata as returned by the page and search endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub last_edited_time: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
}

impl Page {
    /// Title runs joined by a single space, or empty when the page has no
    /// title property.
    pub fn title(&self) -> String {
        let runs = self.properties.values().find_map(|p| match p {
            Property::Title { title } => Some(title),
            Property::Other => None,
        });
        match runs {
            Some(runs) => runs
                .iter()
                .map(|r| r.plain_text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            None => {
                tracing::warn!(page_id = %self.id, "page does not have a title property");
                String::new()
            }
        }
    }
}

/// One entry of a search response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "object", rename_all = "snake_case")]
pub enum SearchObject {
    Page(Page),
    Database {
        id: String,
    },
    #[serde(other)]
    Unsupported,
}

impl SearchObject {
    pub fn kind(&self) -> &'static str {
        match self {
            SearchObject::Page(_) => "page",
            SearchObject::Database { .. } => "database",
            SearchObject::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchObject>,
}
