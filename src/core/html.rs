// src/core/html.rs
//! Table extraction on top of `scraper`.
//!
//! `HtmlTableParser` turns one `<table>` fragment into ordered rows of labelled cells.
//! Every cell keeps its attributes, the links/titles found below it and its inner HTML,
//! so adapters can pull structured bits (profile links, flag titles, verdict images)
//! without re-parsing the page. Header cells with `colspan=N` are repeated N times so
//! the body cells line up with their header by column index.

use std::collections::BTreeMap;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::sanitize::normalize_ws;
use crate::error::ParseError;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    pub label: String,
    pub attrs: BTreeMap<String, String>,
    /// `title` attributes of the header cell and its descendants.
    pub titles: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    pub value: String,
    pub attrs: BTreeMap<String, String>,
    pub links: Vec<String>,
    pub titles: Vec<String>,
    pub inner_html: String,
    pub header: Header,
}

impl Cell {
    pub fn has_class(&self, class: &str) -> bool {
        self.attrs
            .get("class")
            .is_some_and(|c| c.split_whitespace().any(|k| k == class))
    }

    pub fn first_link(&self) -> Option<&str> {
        self.links.first().map(String::as_str)
    }

    /// Does anything below this cell match `sel`?
    pub fn contains(&self, sel: &Selector) -> bool {
        Html::parse_fragment(&self.inner_html).select(sel).next().is_some()
    }

    /// Attribute values of descendants matching `sel`.
    pub fn select_attr(&self, sel: &Selector, attr: &str) -> Vec<String> {
        Html::parse_fragment(&self.inner_html)
            .select(sel)
            .filter_map(|e| e.value().attr(attr).map(str::to_string))
            .collect()
    }
}

/// One table row: `(header label, cell)` pairs in column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Cell)>,
}

impl Row {
    /// First cell under `label`.
    pub fn get(&self, label: &str) -> Option<&Cell> {
        self.cells.iter().find(|(l, _)| l == label).map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(l, c)| (l.as_str(), c))
    }
}

pub trait TableParser: Send + Sync {
    fn parse(&self, fragment: &str) -> Result<Vec<Row>, ParseError>;
}

#[derive(Clone, Debug, Default)]
pub struct HtmlTableParser {
    /// Labels handed out, in order, to header cells with no text.
    pub unnamed_fields: Vec<String>,
}

impl HtmlTableParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unnamed_fields(fields: &[&str]) -> Self {
        Self { unnamed_fields: fields.iter().map(|s| s.to_string()).collect() }
    }

    fn read_headers(&self, table: ElementRef<'_>) -> Vec<Header> {
        let mut headers = Vec::new();
        let Some(head_row) = table
            .select(selector!("tr"))
            .find(|tr| tr.select(selector!("th")).next().is_some())
        else {
            return headers;
        };

        let mut unnamed = self.unnamed_fields.iter();
        for th in head_row.select(selector!("th")) {
            let mut label = text_of(th);
            if label.is_empty() {
                if let Some(name) = unnamed.next() {
                    label = name.clone();
                }
            }
            let header = Header { label, attrs: attrs_of(th), titles: titles_of(th) };
            for _ in 0..colspan(th) {
                headers.push(header.clone());
            }
        }
        headers
    }
}

impl TableParser for HtmlTableParser {
    fn parse(&self, fragment: &str) -> Result<Vec<Row>, ParseError> {
        let doc = Html::parse_fragment(fragment);
        let table = doc
            .select(selector!("table"))
            .next()
            .ok_or_else(|| ParseError::MissingTable(s!("no <table> in fragment")))?;

        let headers = self.read_headers(table);

        let mut rows = Vec::new();
        for tr in table.select(selector!("tr")) {
            let mut col = 0usize;
            let mut cells = Vec::new();
            for td in tr.select(selector!("td")) {
                let header = headers.get(col).cloned().unwrap_or_default();
                col += colspan(td);
                let cell = Cell {
                    value: text_of(td),
                    attrs: attrs_of(td),
                    links: td
                        .select(selector!("a[href]"))
                        .filter_map(|a| a.value().attr("href").map(str::to_string))
                        .collect(),
                    titles: titles_of(td),
                    inner_html: td.inner_html(),
                    header,
                };
                cells.push((cell.header.label.clone(), cell));
            }
            if !cells.is_empty() {
                rows.push(Row { cells });
            }
        }
        Ok(rows)
    }
}

/// Outer HTML of the first element matching `css`, if any.
pub fn find_fragment(doc: &str, css: &str) -> Result<Option<String>, ParseError> {
    let sel = Selector::parse(css).map_err(|_| ParseError::Selector(s!(css)))?;
    Ok(Html::parse_document(doc).select(&sel).next().map(|e| e.html()))
}

/// Like `find_fragment` but a missing element is a `ParseError::MissingTable`.
pub fn require_table(doc: &str, css: &str) -> Result<String, ParseError> {
    find_fragment(doc, css)?.ok_or_else(|| ParseError::MissingTable(s!(css)))
}

/// Highest page number captured by group 1 of `re` anywhere in `doc`.
pub fn max_page_number(doc: &str, re: &Regex) -> Option<u32> {
    re.captures_iter(doc)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .max()
}

pub fn text_of(e: ElementRef<'_>) -> String {
    normalize_ws(&e.text().collect::<String>())
}

fn attrs_of(e: ElementRef<'_>) -> BTreeMap<String, String> {
    e.value().attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn titles_of(e: ElementRef<'_>) -> Vec<String> {
    let own = e.value().attr("title").map(str::to_string);
    own.into_iter()
        .chain(
            e.select(selector!("[title]"))
                .filter(|d| d.id() != e.id())
                .filter_map(|d| d.value().attr("title").map(str::to_string)),
        )
        .collect()
}

fn colspan(e: ElementRef<'_>) -> usize {
    e.value()
        .attr("colspan")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}
