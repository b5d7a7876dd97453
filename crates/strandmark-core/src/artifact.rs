//! Lightweight scanning of written artifacts.
//!
//! Artifacts arrive as rich-text HTML or plain text with Markdown-style
//! tables and images. This is not a general HTML parser: it recovers the
//! visible text, the first data table and the first embedded image, which
//! is all the rubric grader looks at.

use serde::{Deserialize, Serialize};

/// The parts of an artifact the rubric grader inspects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Visible text with markup removed.
    pub text: String,
    pub table: Option<DataTable>,
    pub image: Option<EmbeddedImage>,
}

impl Artifact {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A data table: header cells plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// An embedded image. `src` may be a URL or an inline data payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedImage {
    pub src: String,
    pub alt: String,
    pub title: String,
}

impl EmbeddedImage {
    /// Everything known about the image, lowercased.
    pub fn payload(&self) -> String {
        format!("{} {} {}", self.src, self.alt, self.title).to_lowercase()
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Open { name: String, attrs: &'a str },
    Close { name: String },
    Text(&'a str),
}

fn tokenize(raw: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = raw;
    while let Some(lt) = rest.find('<') {
        if lt > 0 {
            tokens.push(Token::Text(&rest[..lt]));
        }
        let after = &rest[lt + 1..];
        let Some(gt) = after.find('>') else {
            // Unterminated tag: treat the remainder as text.
            tokens.push(Token::Text(&rest[lt..]));
            return tokens;
        };
        let body = after[..gt].trim();
        rest = &after[gt + 1..];

        if body.starts_with('!') || body.starts_with('?') {
            continue;
        }
        if let Some(closing) = body.strip_prefix('/') {
            tokens.push(Token::Close {
                name: closing.trim().to_lowercase(),
            });
            continue;
        }
        let body = body.trim_end_matches('/');
        let name_end = body
            .find(|c: char| c.is_whitespace())
            .unwrap_or(body.len());
        tokens.push(Token::Open {
            name: body[..name_end].to_lowercase(),
            attrs: &body[name_end..],
        });
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    tokens
}

/// Read `name="value"`, `name='value'` or `name=value` from a tag's
/// attribute string.
fn attribute(attrs: &str, name: &str) -> Option<String> {
    let mut rest = attrs.trim_start();
    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_lowercase();
        rest = rest[key_end..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (value, remainder) = match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let inner = &after_eq[1..];
                    match inner.find(quote) {
                        Some(end) => (&inner[..end], &inner[end + 1..]),
                        None => (inner, ""),
                    }
                }
                _ => {
                    let end = after_eq
                        .find(char::is_whitespace)
                        .unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };
            rest = remainder.trim_start();
            value
        } else {
            ""
        };

        if key == name {
            return Some(decode_entities(value));
        }
    }
    None
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "br" | "div" | "li" | "tr" | "td" | "th" | "h1" | "h2" | "h3" | "h4" | "table"
    )
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct TableBuilder {
    header_rows: Vec<Vec<String>>,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    row_has_header_cell: bool,
    row_has_data_cell: bool,
    cell: Option<String>,
}

impl TableBuilder {
    fn new() -> Self {
        Self {
            header_rows: Vec::new(),
            rows: Vec::new(),
            row: Vec::new(),
            row_has_header_cell: false,
            row_has_data_cell: false,
            cell: None,
        }
    }

    fn end_cell(&mut self) {
        if let Some(cell) = self.cell.take() {
            self.row.push(collapse_whitespace(&decode_entities(&cell)));
        }
    }

    fn end_row(&mut self) {
        self.end_cell();
        if self.row.is_empty() {
            return;
        }
        let row = std::mem::take(&mut self.row);
        if self.row_has_header_cell && !self.row_has_data_cell {
            self.header_rows.push(row);
        } else {
            self.rows.push(row);
        }
        self.row_has_header_cell = false;
        self.row_has_data_cell = false;
    }

    fn finish(mut self) -> DataTable {
        self.end_row();
        let mut rows = self.rows;
        let headers = match self.header_rows.into_iter().next() {
            Some(headers) => headers,
            // Without <th> cells the first row names the columns.
            None if !rows.is_empty() => rows.remove(0),
            None => Vec::new(),
        };
        DataTable { headers, rows }
    }
}

fn scan_html(raw: &str) -> Artifact {
    let mut text = String::new();
    let mut table: Option<DataTable> = None;
    let mut builder: Option<TableBuilder> = None;
    let mut image = None;
    let mut skip_depth = 0usize;

    for token in tokenize(raw) {
        match token {
            Token::Open { name, attrs } => {
                if name == "script" || name == "style" {
                    skip_depth += 1;
                }
                if is_block_tag(&name) {
                    text.push(' ');
                }
                match name.as_str() {
                    "table" if table.is_none() && builder.is_none() => {
                        builder = Some(TableBuilder::new());
                    }
                    "tr" => {
                        if let Some(b) = builder.as_mut() {
                            b.end_row();
                        }
                    }
                    "td" | "th" => {
                        if let Some(b) = builder.as_mut() {
                            b.end_cell();
                            if name == "th" {
                                b.row_has_header_cell = true;
                            } else {
                                b.row_has_data_cell = true;
                            }
                            b.cell = Some(String::new());
                        }
                    }
                    "img" if image.is_none() => {
                        image = Some(EmbeddedImage {
                            src: attribute(attrs, "src").unwrap_or_default(),
                            alt: attribute(attrs, "alt").unwrap_or_default(),
                            title: attribute(attrs, "title").unwrap_or_default(),
                        });
                    }
                    _ => {}
                }
            }
            Token::Close { name } => {
                if (name == "script" || name == "style") && skip_depth > 0 {
                    skip_depth -= 1;
                }
                if is_block_tag(&name) {
                    text.push(' ');
                }
                match name.as_str() {
                    "td" | "th" => {
                        if let Some(b) = builder.as_mut() {
                            b.end_cell();
                        }
                    }
                    "tr" => {
                        if let Some(b) = builder.as_mut() {
                            b.end_row();
                        }
                    }
                    "table" => {
                        if let Some(b) = builder.take() {
                            table = Some(b.finish());
                        }
                    }
                    _ => {}
                }
            }
            Token::Text(chunk) => {
                if skip_depth > 0 {
                    continue;
                }
                text.push_str(chunk);
                if let Some(cell) = builder.as_mut().and_then(|b| b.cell.as_mut()) {
                    cell.push_str(chunk);
                }
            }
        }
    }
    // An unclosed table still counts.
    if let Some(b) = builder.take() {
        table = Some(b.finish());
    }

    Artifact {
        text: collapse_whitespace(&decode_entities(&text)),
        table,
        image,
    }
}

fn split_pipe_row(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

fn is_separator_row(line: &str) -> bool {
    let cells = split_pipe_row(line);
    !cells.is_empty()
        && cells.iter().all(|c| {
            !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':' || ch == ' ')
        })
}

/// First Markdown pipe table in plain text.
fn scan_markdown_table(text: &str) -> Option<DataTable> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| l.trim_start().starts_with('|'))?;
    let block: Vec<&str> = lines[start..]
        .iter()
        .take_while(|l| l.trim_start().starts_with('|'))
        .copied()
        .filter(|l| !is_separator_row(l))
        .collect();
    let (header, rows) = block.split_first()?;
    Some(DataTable {
        headers: split_pipe_row(header),
        rows: rows.iter().map(|r| split_pipe_row(r)).collect(),
    })
}

/// First Markdown image `![alt](src)` in plain text.
fn scan_markdown_image(text: &str) -> Option<EmbeddedImage> {
    let start = text.find("![")?;
    let rest = &text[start + 2..];
    let alt_end = rest.find("](")?;
    let after = &rest[alt_end + 2..];
    let src_end = after.find(')')?;
    let (src, title) = match after[..src_end].split_once(' ') {
        Some((src, title)) => (src, title.trim().trim_matches('"')),
        None => (&after[..src_end], ""),
    };
    Some(EmbeddedImage {
        src: src.to_string(),
        alt: rest[..alt_end].to_string(),
        title: title.to_string(),
    })
}

/// Break an artifact into visible text, first table and first image.
pub fn parse_artifact(raw: &str) -> Artifact {
    let mut artifact = scan_html(raw);
    if artifact.table.is_none() {
        artifact.table = scan_markdown_table(raw);
    }
    if artifact.image.is_none() {
        artifact.image = scan_markdown_image(raw);
    }
    artifact
}
