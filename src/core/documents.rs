//! Rendered document publishing
//!
//! Documents (quotes, bills, order sheets, project ledgers) are rendered from
//! a JSON context by the template collaborator, converted to PDF, stored in
//! the configured folder and shared read-only. Line items are laid out on
//! fixed-height pages: the first page holds fewer rows than the rest to leave
//! room for the letterhead, and the last page is padded with `null` rows.

use crate::core::aggregator::{OrderDetail, ProjectLedger};
use crate::grid::{BlobStore, FileRef, TemplateRenderer};
use crate::types::value::Money;
use crate::types::{Estimate, LedgerError, OrderItem, PageSize};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};

pub const PDF_MIME: &str = "application/pdf";

/// Kinds of published document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Quote,
    Bill,
    Order,
    Ledger,
}

impl DocumentKind {
    pub fn template(&self) -> &'static str {
        match self {
            DocumentKind::Quote => "quote_template",
            DocumentKind::Bill => "bill_template",
            DocumentKind::Order => "order_template",
            DocumentKind::Ledger => "ledger_template",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Quote => "quote",
            DocumentKind::Bill => "bill",
            DocumentKind::Order => "order",
            DocumentKind::Ledger => "ledger",
        }
    }

    /// `<prefix>_<part>_<part>.pdf` with every part sanitized
    pub fn file_name(&self, parts: &[&str]) -> String {
        let mut name = self.prefix().to_string();
        for part in parts {
            name.push('_');
            name.push_str(&sanitize_file_name(part));
        }
        name.push_str(".pdf");
        name
    }
}

/// Drop characters that are unsafe in file names, then trim
pub fn sanitize_file_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\t' | '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Split items into pages of `size.first` rows, then `size.rest` rows
///
/// The last page is padded with `None` to its full height, and an empty
/// item list still yields one fully padded first page.
pub fn paginate_items<T: Clone>(items: &[T], size: PageSize) -> Vec<Vec<Option<T>>> {
    let first = size.first.max(1);
    let rest = size.rest.max(1);
    let mut pages = Vec::new();
    let mut remaining = items;
    loop {
        let limit = if pages.is_empty() { first } else { rest };
        let take = limit.min(remaining.len());
        let mut page: Vec<Option<T>> = remaining[..take].iter().cloned().map(Some).collect();
        page.resize(limit, None);
        pages.push(page);
        remaining = &remaining[take..];
        if remaining.is_empty() {
            break;
        }
    }
    pages
}

/// Issue date as written on documents: Reiwa era from May 2019, Gregorian before
pub fn issue_date_label(date: NaiveDate) -> String {
    let (year, month, day) = (date.year(), date.month(), date.day());
    if year > 2019 || (year == 2019 && month >= 5) {
        let era_year = year - 2018;
        let era_year = if era_year == 1 {
            "元".to_string()
        } else {
            era_year.to_string()
        };
        format!("令和{}年{}月{}日", era_year, month, day)
    } else {
        format!("{}年{:02}月{:02}日", year, month, day)
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, LedgerError> {
    Ok(serde_json::to_value(value)?)
}

/// Context for a quote or bill
pub fn estimate_context(
    estimate: &Estimate,
    issued: NaiveDate,
    page: PageSize,
) -> Result<Value, LedgerError> {
    let mut header = to_value(&estimate.header)?;
    header["date"] = json!(issue_date_label(issued));
    Ok(json!({
        "header": header,
        "items": to_value(&estimate.items)?,
        "totalAmount": estimate.total(),
        "pages": to_value(&paginate_items(&estimate.items, page))?,
    }))
}

/// Context for an order sheet
pub fn order_context(
    detail: &OrderDetail,
    items: &[OrderItem],
    issued: NaiveDate,
    page: PageSize,
) -> Result<Value, LedgerError> {
    let mut header = to_value(&detail.header)?;
    header["date"] = json!(issue_date_label(issued));
    header["project"] = json!(detail.project);
    header["period"] = json!(detail.period);
    header["payment_terms"] = json!(detail.payment_terms);
    header["expiry"] = json!(detail.expiry);
    let total: Money = items.iter().map(|i| i.amount).sum();
    Ok(json!({
        "header": header,
        "items": to_value(&items)?,
        "totalAmount": total,
        "pages": to_value(&paginate_items(items, page))?,
    }))
}

/// Context for a project ledger
pub fn ledger_context(ledger: &ProjectLedger, printed: NaiveDate) -> Result<Value, LedgerError> {
    let mut context = to_value(ledger)?;
    context["printDate"] = json!(issue_date_label(printed));
    Ok(context)
}

/// Renders, stores and shares documents in one folder
pub struct Publisher<'a> {
    blobs: &'a dyn BlobStore,
    renderer: &'a dyn TemplateRenderer,
    folder: &'a str,
}

impl<'a> Publisher<'a> {
    pub fn new(blobs: &'a dyn BlobStore, renderer: &'a dyn TemplateRenderer, folder: &'a str) -> Self {
        Self {
            blobs,
            renderer,
            folder,
        }
    }

    /// Render `context` with `kind`'s template and publish it as `file_name`
    ///
    /// # Returns
    ///
    /// * `Ok(FileRef)` for the stored, publicly readable PDF
    /// * `Err(LedgerError)` from the renderer or the blob store; nothing is
    ///   shared when rendering fails
    pub fn publish(
        &self,
        kind: DocumentKind,
        file_name: &str,
        context: &Value,
    ) -> Result<FileRef, LedgerError> {
        let html = self.renderer.render(kind.template(), context)?;
        let pdf = self.renderer.html_to_pdf(&html)?;
        let file = self.blobs.create_file(self.folder, file_name, PDF_MIME, &pdf)?;
        self.blobs.set_public_readable(&file)?;
        log::info!("published {} as {}", file_name, file.url);
        Ok(file)
    }

    /// Names of every file in the folder
    pub fn file_names(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self
            .blobs
            .list_files(self.folder)?
            .into_iter()
            .map(|f| f.name)
            .collect())
    }
}
