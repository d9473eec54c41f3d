//! Inference-backed content extraction
//!
//! Invoice fields are read out of scanned images and PDFs, and unit prices
//! are predicted from recent pricing history, by an external inference
//! collaborator. Plain-text invoices never reach the collaborator; they are
//! parsed deterministically by [`parse_text_invoice`].

use crate::core::aggregator::{ActiveProject, Snapshot};
use crate::core::retry::{Exhausted, RetryPolicy};
use crate::types::value::{parse_currency_str, Money};
use crate::types::LedgerError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use thiserror::Error;

/// Binary attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineData {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub prompt: String,
    pub inline: Option<InlineData>,
    /// Expected structured-output schema, if any
    pub response_schema: Option<Value>,
}

/// External text-generation collaborator
///
/// `Err` means the call itself failed (transport error, non-success status);
/// `Ok` carries the response body, which may still hold an `error` field.
pub trait InferenceClient: Send + Sync {
    fn generate(&self, request: InferenceRequest)
        -> impl Future<Output = Result<Value, String>> + Send;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("inference failed after {attempts} attempts: {last_message}")]
    Exhausted { attempts: u32, last_message: String },

    #[error("malformed inference response: {message}")]
    Malformed { message: String },
}

impl From<Exhausted<String>> for InferenceError {
    fn from(exhausted: Exhausted<String>) -> Self {
        InferenceError::Exhausted {
            attempts: exhausted.attempts,
            last_message: exhausted.last,
        }
    }
}

impl From<InferenceError> for LedgerError {
    fn from(error: InferenceError) -> Self {
        LedgerError::upstream("inference", error.to_string())
    }
}

/// Call the collaborator under `policy` and return the response text
///
/// Transport failures and bodies with an `error` field are retried; a body
/// without generated text is malformed and is not.
pub async fn generate_text<C: InferenceClient>(
    client: &C,
    policy: &RetryPolicy,
    request: InferenceRequest,
) -> Result<String, InferenceError> {
    let body = policy
        .run(|_| {
            let request = request.clone();
            async move {
                let body = client.generate(request).await?;
                match body.get("error") {
                    Some(error) => Err(error
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string())),
                    None => Ok(body),
                }
            }
        })
        .await?;

    response_text(&body)
        .map(str::to_string)
        .ok_or_else(|| InferenceError::Malformed {
            message: "response carries no generated text".to_string(),
        })
}

/// First generated text part of a response body
fn response_text(body: &Value) -> Option<&str> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (e.g. "json") on the opening line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Invoice fields read from a document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedInvoice {
    pub construction_id: String,
    pub project: String,
    pub supplier: String,
    pub date: String,
    pub amount: Money,
    pub content: String,
    pub registration_number: String,
}

fn invoice_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "constructionId": { "type": "STRING" },
            "supplier": { "type": "STRING" },
            "date": { "type": "STRING" },
            "amount": { "type": "NUMBER" },
            "content": { "type": "STRING" },
            "registrationNumber": { "type": "STRING", "description": "T followed by 13 digits" }
        }
    })
}

fn invoice_prompt(projects: &[ActiveProject]) -> String {
    let list: Vec<String> = projects
        .iter()
        .map(|p| format!("{}: {}", p.id, p.name))
        .collect();
    format!(
        "You are a construction cost estimator. Extract the invoice details from the attached document.\n\
         Pick the construction id (constructionId) that best matches the document from this list:\n{}\n\
         Fields: constructionId, supplier, date (yyyy/MM/dd), amount (tax included), content, \
         registrationNumber (T followed by 13 digits).",
        list.join("\n")
    )
}

fn text_field(object: &Value, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn parse_extracted(text: &str) -> Result<ExtractedInvoice, InferenceError> {
    let object: Value =
        serde_json::from_str(strip_fences(text)).map_err(|e| InferenceError::Malformed {
            message: e.to_string(),
        })?;
    if !object.is_object() {
        return Err(InferenceError::Malformed {
            message: "expected a JSON object".to_string(),
        });
    }
    Ok(ExtractedInvoice {
        construction_id: text_field(&object, "constructionId"),
        project: text_field(&object, "project"),
        supplier: text_field(&object, "supplier"),
        date: text_field(&object, "date"),
        amount: parse_currency_str(&text_field(&object, "amount")),
        content: text_field(&object, "content"),
        registration_number: text_field(&object, "registrationNumber"),
    })
}

/// Extract invoice fields from an image or PDF
///
/// # Arguments
///
/// * `client` - Inference collaborator
/// * `policy` - Retry policy for transient failures
/// * `document` - The file's bytes and MIME type
/// * `projects` - Open projects offered to the model as construction ids
pub async fn extract_invoice<C: InferenceClient>(
    client: &C,
    policy: &RetryPolicy,
    document: InlineData,
    projects: &[ActiveProject],
) -> Result<ExtractedInvoice, InferenceError> {
    let request = InferenceRequest {
        prompt: invoice_prompt(projects),
        inline: Some(document),
        response_schema: Some(invoice_schema()),
    };
    let text = generate_text(client, policy, request).await?;
    parse_extracted(&text)
}

/// Latest priced estimate lines, newest first, as prompt context
pub fn price_history(snapshot: &Snapshot, limit: usize) -> Vec<String> {
    snapshot
        .estimates
        .iter()
        .rev()
        .flat_map(|e| e.items.iter().rev())
        .filter(|i| !i.product.is_empty() && !i.price.is_zero())
        .take(limit)
        .map(|i| {
            format!(
                "Product: {} | Spec: {} | Unit price: {} | Unit: {}",
                i.product,
                i.spec,
                i.price.normalize(),
                i.unit
            )
        })
        .collect()
}

/// Predict a unit price for a product from pricing history
///
/// The model answers in free text, read with the same tolerant currency
/// parsing as grid cells. An answer without digits predicts 0.
pub async fn predict_unit_price<C: InferenceClient>(
    client: &C,
    policy: &RetryPolicy,
    history: &[String],
    product: &str,
    spec: &str,
) -> Result<Money, InferenceError> {
    let prompt = format!(
        "You are a construction cost estimator. Using the past records below, predict a fair unit price \
         for the new item.\n[Past records]\n{}\n[Item]\nProduct: {}\nSpec: {}\n\
         Answer with the number only. Answer 0 if it cannot be predicted.",
        history.join("\n"),
        product,
        spec
    );
    let request = InferenceRequest {
        prompt,
        inline: None,
        response_schema: None,
    };
    let text = generate_text(client, policy, request).await?;
    Ok(parse_currency_str(&text))
}

#[derive(Clone, Copy)]
enum TextField {
    ConstructionId,
    Project,
    Supplier,
    Amount,
    Content,
    Date,
}

const TEXT_KEYWORDS: [(TextField, &[&str]); 6] = [
    (
        TextField::ConstructionId,
        &["Construction ID", "Construction No", "工事番号", "工事ID", "No"],
    ),
    (
        TextField::Project,
        &["Project", "Site", "現場名", "工事名", "案件名", "件名"],
    ),
    (
        TextField::Supplier,
        &["Supplier", "Vendor", "請求業者", "業者名", "請求元", "会社名"],
    ),
    (
        TextField::Amount,
        &["Amount", "Total", "金額", "請求金額", "合計", "税込金額"],
    ),
    (
        TextField::Content,
        &["Content", "Description", "内容", "但し書き", "品名", "詳細"],
    ),
    (TextField::Date, &["Date", "Invoice Date", "日付", "請求日", "発行日"]),
];

/// Value of `line` for `keyword` in `【keyword】 value` or `keyword: value` form
fn keyword_value<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    if let Some(inner) = line.strip_prefix('【') {
        if let Some((key, value)) = inner.split_once('】') {
            if key.trim() == keyword {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }
    let rest = line.strip_prefix(keyword)?.trim_start();
    let value = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('：'))?
        .trim();
    (!value.is_empty()).then_some(value)
}

/// Parse a plain-text invoice of `【key】 value` / `key: value` lines
///
/// Later lines override earlier ones for the same field.
pub fn parse_text_invoice(text: &str) -> ExtractedInvoice {
    let mut invoice = ExtractedInvoice::default();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        for (field, keywords) in TEXT_KEYWORDS {
            for keyword in keywords {
                let Some(value) = keyword_value(line, keyword) else {
                    continue;
                };
                match field {
                    TextField::ConstructionId => invoice.construction_id = value.to_string(),
                    TextField::Project => invoice.project = value.to_string(),
                    TextField::Supplier => invoice.supplier = value.to_string(),
                    TextField::Amount => invoice.amount = parse_currency_str(value),
                    TextField::Content => invoice.content = value.to_string(),
                    TextField::Date => invoice.date = value.to_string(),
                }
            }
        }
    }
    invoice
}

/// MIME type of an invoice file, judged by its name
pub fn mime_from_name(name: &str) -> Option<&'static str> {
    let extension = name.rsplit_once('.')?.1.to_lowercase();
    match extension.as_str() {
        "txt" => Some("text/plain"),
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Estimate, EstimateItem};
    use parking_lot::Mutex;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays canned responses and records prompts
    #[derive(Default)]
    pub(crate) struct ScriptedClient {
        responses: Mutex<VecDeque<Result<Value, String>>>,
        pub(crate) prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub(crate) fn new(responses: Vec<Result<Value, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn answering(text: &str) -> Self {
            Self::new(vec![Ok(text_body(text))])
        }
    }

    impl InferenceClient for ScriptedClient {
        fn generate(
            &self,
            request: InferenceRequest,
        ) -> impl Future<Output = Result<Value, String>> + Send {
            self.prompts.lock().push(request.prompt);
            let next = self
                .responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err("no scripted response".to_string()));
            async move { next }
        }
    }

    pub(crate) fn text_body(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    fn quick() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10))
    }

    #[rstest]
    #[case::plain("{\"a\":1}", "{\"a\":1}")]
    #[case::fenced("```json\n{\"a\":1}\n```", "{\"a\":1}")]
    #[case::bare_fence("```\n42\n```", "42")]
    #[case::padded("  text  ", "text")]
    fn test_strip_fences(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(strip_fences(raw), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_invoice_after_transient_failures() {
        let client = ScriptedClient::new(vec![
            Err("HTTP 503".to_string()),
            Ok(json!({ "error": { "message": "overloaded" } })),
            Ok(text_body(
                "```json\n{\"constructionId\":\"0000001-00\",\"supplier\":\"North Steel\",\"amount\":\"¥35,000\",\"registrationNumber\":\"T1234567890123\"}\n```",
            )),
        ]);
        let projects = vec![ActiveProject {
            id: "0000001-00".to_string(),
            name: "Acme Riverside".to_string(),
            client: "Acme".to_string(),
            project: "Riverside".to_string(),
        }];
        let document = InlineData {
            mime_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        };
        let invoice = extract_invoice(&client, &quick(), document, &projects)
            .await
            .unwrap();
        assert_eq!(invoice.construction_id, "0000001-00");
        assert_eq!(invoice.amount, Decimal::new(35000, 0));
        assert_eq!(invoice.registration_number, "T1234567890123");
        assert!(client.prompts.lock()[0].contains("0000001-00: Acme Riverside"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_is_distinct_from_malformed() {
        let failing = ScriptedClient::new(vec![]);
        let result = generate_text(
            &failing,
            &quick(),
            InferenceRequest {
                prompt: "x".to_string(),
                inline: None,
                response_schema: None,
            },
        )
        .await;
        assert!(matches!(result, Err(InferenceError::Exhausted { attempts: 3, .. })));

        let garbled = ScriptedClient::answering("not json");
        let document = InlineData {
            mime_type: "application/pdf".to_string(),
            bytes: vec![],
        };
        let result = extract_invoice(&garbled, &quick(), document, &[]).await;
        assert!(matches!(result, Err(InferenceError::Malformed { .. })));

        let empty = ScriptedClient::new(vec![Ok(json!({ "candidates": [] }))]);
        let result = predict_unit_price(&empty, &quick(), &[], "Pipe", "").await;
        assert!(matches!(result, Err(InferenceError::Malformed { .. })));
    }

    #[test]
    fn test_inference_error_becomes_upstream_failure() {
        let error: LedgerError = InferenceError::Malformed {
            message: "bad".to_string(),
        }
        .into();
        assert!(matches!(error, LedgerError::UpstreamFailure { .. }));
    }

    #[tokio::test]
    async fn test_predict_unit_price_parses_free_text() {
        let client = ScriptedClient::answering("About 12,500 yen");
        let history = vec!["Product: Pipe | Spec: 50A | Unit price: 12000 | Unit: m".to_string()];
        let price = predict_unit_price(&client, &quick(), &history, "Pipe", "50A")
            .await
            .unwrap();
        assert_eq!(price, Decimal::new(12500, 0));
        assert!(client.prompts.lock()[0].contains("Unit price: 12000"));
    }

    #[test]
    fn test_price_history_is_newest_first_and_limited() {
        let item = |product: &str, price: i64| EstimateItem {
            product: product.to_string(),
            price: Decimal::new(price, 0),
            ..Default::default()
        };
        let snapshot = Snapshot {
            estimates: vec![
                Estimate {
                    items: vec![item("Old", 1), item("Unpriced", 0)],
                    ..Default::default()
                },
                Estimate {
                    items: vec![item("Mid", 2), item("New", 3)],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let history = price_history(&snapshot, 2);
        assert_eq!(history.len(), 2);
        assert!(history[0].starts_with("Product: New"));
        assert!(history[1].starts_with("Product: Mid"));
    }

    #[test]
    fn test_parse_text_invoice() {
        let text = "【工事番号】 0000001-00\r\n\
                    Supplier: North Steel\n\
                    金額：１２，０００円\n\
                    Description: beams\n\
                    Date: 2024/03/05\n\
                    unrelated line";
        let invoice = parse_text_invoice(text);
        assert_eq!(invoice.construction_id, "0000001-00");
        assert_eq!(invoice.supplier, "North Steel");
        assert_eq!(invoice.amount, Decimal::new(12000, 0));
        assert_eq!(invoice.content, "beams");
        assert_eq!(invoice.date, "2024/03/05");
        assert_eq!(invoice.project, "");
    }

    #[rstest]
    #[case::text("note.TXT", Some("text/plain"))]
    #[case::pdf("scan.pdf", Some("application/pdf"))]
    #[case::jpeg("photo.jpeg", Some("image/jpeg"))]
    #[case::unknown("sheet.xlsx", None)]
    #[case::none("README", None)]
    fn test_mime_from_name(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(mime_from_name(name), expected);
    }
}
