//! Table row extraction
//!
//! The parsed document is walked once, front to back, as a stream of
//! open/close tag events. Rows (`tr`) become records, data cells (`td`) fill
//! schema columns left to right, and anchors whose href starts with the view
//! or download prefix fill the two reserved link columns.
//!
//! # Row rules
//!
//! | Event | Effect |
//! |-------|--------|
//! | `<tr>` without the `striped` class | start a new record |
//! | `<td>` | start collecting cell text |
//! | text inside a cell | trim, sanitize, append |
//! | `<a href>` matching a prefix | set the view/download column |
//! | `</td>` | store text in the first unfilled column |
//! | `</tr>` | emit the record if it has any column |
//!
//! Header rows built from `th` cells never produce a column and are dropped.

use crate::scrape::job::Job;
use crate::scrape::record::Record;
use crate::url::join_link;
use ego_tree::iter::{Edge, Traverse};
use scraper::{Html, Node};
use thiserror::Error;
use url::Url;

/// Rows carrying this class continue the current record instead of starting one
pub const STRIPED_CLASS: &str = "striped";

/// Extraction failures
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed markup: {0}")]
    Malformed(String),
}

/// Turns page markup into records for one job's schema
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    columns: Vec<String>,
    view_column: String,
    download_column: String,
    view_prefix: String,
    download_prefix: String,
    link_base: Url,
    strict: bool,
}

impl RecordExtractor {
    pub fn new(job: &Job) -> Self {
        Self {
            columns: job.columns.clone(),
            view_column: job.view_column.clone(),
            download_column: job.download_column.clone(),
            view_prefix: job.view_prefix.clone(),
            download_prefix: job.download_prefix.clone(),
            link_base: job.link_base.clone(),
            strict: job.strict_markup,
        }
    }

    /// Parses markup into a document
    ///
    /// The HTML tokenizer recovers from malformed input on its own. In strict
    /// mode the first parse error it reports fails the page instead. A missing
    /// `<!DOCTYPE>` only switches the parser to quirks mode and is not counted.
    pub fn parse(&self, markup: &str) -> Result<Html, ExtractError> {
        if !self.strict {
            return Ok(Html::parse_document(markup));
        }

        let document = if has_doctype(markup) {
            Html::parse_document(markup)
        } else {
            Html::parse_document(&format!("<!DOCTYPE html>{}", markup))
        };
        match document.errors.first() {
            Some(error) => Err(ExtractError::Malformed(error.to_string())),
            None => Ok(document),
        }
    }

    /// Lazily yields the records of `document` in row order
    pub fn records<'a>(&'a self, document: &'a Html) -> Records<'a> {
        Records {
            extractor: self,
            edges: document.tree.root().traverse(),
            row: Record::new(),
            cell: None,
            hidden: 0,
        }
    }

    /// Parses `markup` and collects all of its records
    pub fn extract(&self, markup: &str) -> Result<Vec<Record>, ExtractError> {
        let document = self.parse(markup)?;
        Ok(self.records(&document).collect())
    }

    /// First schema column that cell text may still fill
    fn next_column(&self, record: &Record) -> Option<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .find(|column| !self.is_reserved(column) && !record.contains(column))
    }

    fn is_reserved(&self, column: &str) -> bool {
        column == self.view_column || column == self.download_column
    }

    /// Reserved column and absolute URL for an href, if it matches a prefix
    fn link_value(&self, href: &str) -> Option<(&str, String)> {
        let href = href.trim();
        let column = if href.starts_with(self.view_prefix.as_str()) {
            &self.view_column
        } else if href.starts_with(self.download_prefix.as_str()) {
            &self.download_column
        } else {
            return None;
        };

        Some((column.as_str(), join_link(&self.link_base, href)))
    }
}

/// Iterator over the records of one document
pub struct Records<'a> {
    extractor: &'a RecordExtractor,
    edges: Traverse<'a, Node>,
    row: Record,
    /// Text of the open `td`, if any
    cell: Option<String>,
    /// Depth inside `script`/`style`
    hidden: usize,
}

impl<'a> Records<'a> {
    fn open(&mut self, node: &'a Node) {
        let extractor = self.extractor;
        match node {
            Node::Element(element) => match element.name() {
                "script" | "style" => self.hidden += 1,
                "tr" => {
                    if !element.classes().any(|class| class == STRIPED_CLASS) {
                        self.row = Record::new();
                    }
                }
                "td" => self.cell = Some(String::new()),
                "a" => {
                    if let Some((column, url)) =
                        element.attr("href").and_then(|href| extractor.link_value(href))
                    {
                        self.row.insert(column, url);
                    }
                }
                _ => {}
            },
            Node::Text(text) if self.hidden == 0 => {
                if let Some(cell) = self.cell.as_mut() {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        cell.push_str(&sanitize_text(trimmed));
                    }
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, node: &'a Node) -> Option<Record> {
        let extractor = self.extractor;
        let Node::Element(element) = node else {
            return None;
        };

        match element.name() {
            "script" | "style" => self.hidden = self.hidden.saturating_sub(1),
            "td" => {
                let text = self.cell.take()?;
                match extractor.next_column(&self.row) {
                    Some(column) => self.row.insert(column, text),
                    None => tracing::trace!("Schema exhausted, dropping cell {:?}", text),
                }
            }
            "tr" if !self.row.is_empty() => return Some(std::mem::take(&mut self.row)),
            _ => {}
        }
        None
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        while let Some(edge) = self.edges.next() {
            match edge {
                Edge::Open(node) => self.open(node.value()),
                Edge::Close(node) => {
                    if let Some(record) = self.close(node.value()) {
                        return Some(record);
                    }
                }
            }
        }
        None
    }
}

/// Strips embedded markup from cell text
///
/// Removes tags and drops `script`/`style` blocks with their content. A `<`
/// that does not start a tag is kept as text.
pub fn sanitize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let starts_tag = tail[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');
        if !starts_tag {
            out.push('<');
            rest = &tail[1..];
            continue;
        }

        let lower = tail.to_ascii_lowercase();
        let block = ["script", "style"]
            .into_iter()
            .find(|name| lower[1..].starts_with(name));

        rest = match block {
            Some(name) => match lower.find(&format!("</{}", name)) {
                Some(end) => skip_past_gt(&tail[end..]),
                None => "",
            },
            None => skip_past_gt(tail),
        };
    }

    out.push_str(rest);
    out.trim().to_string()
}

/// True if the markup opens with a doctype declaration
fn has_doctype(markup: &str) -> bool {
    markup
        .trim_start_matches('\u{feff}')
        .trim_start()
        .get(..9)
        .is_some_and(|head| head.eq_ignore_ascii_case("<!doctype"))
}

fn skip_past_gt(s: &str) -> &str {
    match s.find('>') {
        Some(gt) => &s[gt + 1..],
        None => "",
    }
}
