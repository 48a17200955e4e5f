/*!
The generic data table: column specs, a fixed-size pager, and rendering of
the current page into plain strings for a template.

There is no sorting and no server-side paging; the caller hands in every row.
*/
use std::ops::Range;

use serde::Serialize;
use serde_json::Value;

pub const PAGE_SIZE: usize = 10;

/// How a column gets its text out of a row.
pub enum Cell<T> {
    /// Key into the row's serialized form.
    Field(&'static str),
    Render(fn(&T) -> String),
}

pub struct Column<T> {
    pub header: &'static str,
    pub cell: Cell<T>,
}

impl<T> Column<T> {
    pub fn field(header: &'static str, key: &'static str) -> Self {
        Column { header, cell: Cell::Field(key) }
    }

    pub fn render(header: &'static str, f: fn(&T) -> String) -> Self {
        Column { header, cell: Cell::Render(f) }
    }
}

/// Page state over a row count. Pages are 1-based; with no rows there are no
/// pages and the current page stays at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pager {
    current: usize,
    len: usize,
}

impl Pager {
    pub fn new(len: usize) -> Self {
        Pager { current: 1, len }
    }

    /// A pager positioned at `page`, clamped into range.
    pub fn at(page: usize, len: usize) -> Self {
        let mut p = Pager { current: page, len };
        p.clamp();
        p
    }

    pub fn total_pages(&self) -> usize {
        self.len.div_ceil(PAGE_SIZE)
    }

    pub fn current(&self) -> usize {
        self.current
    }

    fn clamp(&mut self) {
        self.current = self.current.clamp(1, self.total_pages().max(1));
    }

    /// Follows a change in data length, keeping the page in range.
    pub fn resize(&mut self, len: usize) {
        self.len = len;
        self.clamp();
    }

    pub fn next(&mut self) {
        self.current = (self.current + 1).min(self.total_pages().max(1));
    }

    pub fn prev(&mut self) {
        self.current = self.current.saturating_sub(1).max(1);
    }

    pub fn has_prev(&self) -> bool {
        self.current > 1
    }

    pub fn has_next(&self) -> bool {
        self.current < self.total_pages()
    }

    /// Index range of the current page within the rows.
    pub fn range(&self) -> Range<usize> {
        let start = ((self.current - 1) * PAGE_SIZE).min(self.len);
        let end = (start + PAGE_SIZE).min(self.len);
        start..end
    }

    pub fn slice<'a, R>(&self, rows: &'a [R]) -> &'a [R] {
        let r = self.range();
        &rows[r.start.min(rows.len())..r.end.min(rows.len())]
    }

    pub fn label(&self) -> String {
        let total = self.total_pages();
        let shown = if total > 0 { self.current } else { 0 };
        format!("Page {} of {}", shown, total)
    }
}

#[derive(Debug, Serialize)]
pub struct TableRow {
    pub id: Option<String>,
    pub cells: Vec<String>,
}

/// One rendered page, ready for a template.
#[derive(Debug, Serialize)]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
    pub empty: bool,
    pub page: usize,
    pub total_pages: usize,
    pub label: String,
    pub has_prev: bool,
    pub has_next: bool,
    pub prev_page: usize,
    pub next_page: usize,
}

pub fn display_value(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn render<T: Serialize>(columns: &[Column<T>], rows: &[T], pager: &Pager) -> TableView {
    let page = pager.slice(rows);
    let rendered: Vec<TableRow> = page
        .iter()
        .map(|row| {
            let value = serde_json::to_value(row).unwrap_or(Value::Null);
            let cells = columns
                .iter()
                .map(|c| match &c.cell {
                    Cell::Field(key) => display_value(value.get(*key)),
                    Cell::Render(f) => f(row),
                })
                .collect();
            TableRow {
                id: value.get("id").and_then(Value::as_str).map(str::to_owned),
                cells,
            }
        })
        .collect();

    TableView {
        headers: columns.iter().map(|c| c.header.to_owned()).collect(),
        empty: rendered.is_empty(),
        rows: rendered,
        page: pager.current(),
        total_pages: pager.total_pages(),
        label: pager.label(),
        has_prev: pager.has_prev(),
        has_next: pager.has_next(),
        prev_page: pager.current().saturating_sub(1).max(1),
        next_page: (pager.current() + 1).min(pager.total_pages().max(1)),
    }
}
