//! Structured payload extraction
//!
//! Vendors that render prices client-side fetch them as JSON. Those bodies
//! (captured by the browser) and JSON embedded in `<script>` tags are walked
//! for objects that look like a price entry: a weight plus a sell price.

use scraper::Selector;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    ExtractionStrategy, PageSnapshot, ParseContext, ParsingConfig, ParsingError, ParsingResult,
    RawEntry, RawPriceTuple, compile_selectors,
};

const WEIGHT_KEYS: &[&str] = &["weight", "berat", "gram", "gramasi", "denomination", "denom"];
const SELL_KEYS: &[&str] = &[
    "sellprice",
    "sellingprice",
    "hargajual",
    "sell",
    "price",
    "harga",
];
const BUY_KEYS: &[&str] = &[
    "buyprice",
    "buybackprice",
    "hargabeli",
    "hargabuyback",
    "buyback",
    "buy",
    "baseprice",
    "hargadasar",
];
const VENDOR_KEYS: &[&str] = &["vendor", "vendorname", "brand", "brandname"];
const NAME_KEYS: &[&str] = &["name", "productname", "title", "category", "categoryname"];

pub struct ApiPayloadStrategy {
    embedded_json: Vec<Selector>,
}

impl ApiPayloadStrategy {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        Ok(Self {
            embedded_json: compile_selectors("embedded_json", &config.embedded_json)?,
        })
    }

    fn payloads(&self, page: &PageSnapshot<'_>) -> Vec<(String, String)> {
        let mut payloads: Vec<(String, String)> = page
            .api_responses
            .iter()
            .filter(|response| (200..300).contains(&response.status))
            .map(|response| (response.url.clone(), response.body.clone()))
            .collect();

        for selector in &self.embedded_json {
            for script in page.document.select(selector) {
                let body = script.text().collect::<String>();
                if !body.trim().is_empty() {
                    payloads.push(("embedded script".to_string(), body));
                }
            }
        }
        payloads
    }
}

impl ExtractionStrategy for ApiPayloadStrategy {
    fn name(&self) -> &'static str {
        "api_payload"
    }

    fn extract(&self, page: &PageSnapshot<'_>, _context: &ParseContext) -> ParsingResult<Vec<RawEntry>> {
        let payloads = self.payloads(page);
        let mut entries = Vec::new();
        let mut parse_errors = Vec::new();

        for (origin, body) in &payloads {
            match serde_json::from_str::<Value>(body) {
                Ok(value) => {
                    let before = entries.len();
                    walk(&value, None, &mut entries);
                    debug!("Payload from {} yielded {} entries", origin, entries.len() - before);
                }
                Err(e) => parse_errors.push(ParsingError::malformed_payload(origin, e)),
            }
        }

        // Non-JSON bodies only matter when nothing else was usable
        if entries.is_empty() && !payloads.is_empty() && parse_errors.len() == payloads.len() {
            if let Some(error) = parse_errors.into_iter().next() {
                return Err(error);
            }
        }

        Ok(entries)
    }
}

fn normalized_key(key: &str) -> String {
    key.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase()
}

fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|wanted| {
        object
            .iter()
            .find(|(key, value)| normalized_key(key) == *wanted && !value.is_null())
            .map(|(_, value)| value)
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => n
            .as_i64()
            .map(|i| i.to_string())
            .or_else(|| n.as_f64().map(|f| f.trunc().to_string())),
        _ => None,
    }
}

/// Weights are sometimes bare numbers (`0.5`); give them a unit.
fn weight_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    if text.chars().any(char::is_alphabetic) {
        Some(text)
    } else {
        Some(format!("{text} gram"))
    }
}

fn tuple_from_object(object: &Map<String, Value>, vendor: Option<&str>) -> Option<RawPriceTuple> {
    let weight = field(object, WEIGHT_KEYS).and_then(weight_text)?;
    let sell_price = field(object, SELL_KEYS).and_then(scalar_text)?;
    let buy_price = field(object, BUY_KEYS).and_then(scalar_text);
    let name = field(object, NAME_KEYS).and_then(scalar_text);

    Some(RawPriceTuple {
        vendor_label: vendor.map(str::to_string),
        product_label: weight.clone(),
        weight: Some(weight),
        buy_price,
        sell_price,
        category_hint: name,
    })
}

/// Depth-first search; a vendor named on a parent object applies to its children.
fn walk(value: &Value, vendor: Option<&str>, out: &mut Vec<RawEntry>) {
    match value {
        Value::Object(object) => {
            let own_vendor = field(object, VENDOR_KEYS).and_then(Value::as_str);
            let vendor = own_vendor.or(vendor);

            if let Some(tuple) = tuple_from_object(object, vendor) {
                out.push(RawEntry::Tuple(tuple));
                return;
            }
            for child in object.values() {
                walk(child, vendor, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, vendor, out);
            }
        }
        // Next.js pages carry JSON inside strings at times
        Value::String(s) if s.trim_start().starts_with('{') || s.trim_start().starts_with('[') => {
            if let Ok(inner) = serde_json::from_str::<Value>(s) {
                walk(&inner, vendor, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fetching::CapturedResponse;
    use scraper::Html;

    fn run(html: &str, responses: &[CapturedResponse]) -> ParsingResult<Vec<RawEntry>> {
        let document = Html::parse_document(html);
        let snapshot = PageSnapshot {
            document: &document,
            api_responses: responses,
            rendered_blocks: &[],
        };
        ApiPayloadStrategy::new(&ParsingConfig::default())
            .unwrap()
            .extract(&snapshot, &ParseContext::default())
    }

    fn tuple(entry: &RawEntry) -> &RawPriceTuple {
        match entry {
            RawEntry::Tuple(t) => t,
            RawEntry::Misaligned { .. } => panic!("expected tuple"),
        }
    }

    #[test]
    fn test_embedded_products_payload() {
        let html = r#"<html><body>
            <script type="application/json">{"products":[
                {"weight":"1 gram","buyPrice":"Rp1.132.000","sellPrice":"Rp1.271.000"},
                {"weight":5,"buyPrice":5560000,"sellPrice":6130000}
            ]}</script></body></html>"#;

        let entries = run(html, &[]).unwrap();
        assert_eq!(entries.len(), 2);
        let first = tuple(&entries[0]);
        assert_eq!(first.weight.as_deref(), Some("1 gram"));
        assert_eq!(first.sell_price, "Rp1.271.000");
        assert_eq!(first.buy_price.as_deref(), Some("Rp1.132.000"));
        let second = tuple(&entries[1]);
        assert_eq!(second.product_label, "5 gram");
        assert_eq!(second.sell_price, "6130000");
    }

    #[test]
    fn test_captured_api_body_inherits_vendor() {
        let body = r#"{"data":[{"vendorName":"GALERI 24","items":[
            {"denomination":"0.5","sellingPrice":"720000","buybackPrice":"640000"},
            {"denomination":"1","sellingPrice":"1400000"}]}]}"#;
        let responses = vec![CapturedResponse {
            url: "https://api.galeri24.co.id/prices".to_string(),
            status: 200,
            body: body.to_string(),
        }];

        let entries = run("<html></html>", &responses).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(tuple(&entries[0]).vendor_label.as_deref(), Some("GALERI 24"));
        assert_eq!(tuple(&entries[0]).product_label, "0.5 gram");
        assert_eq!(tuple(&entries[1]).buy_price, None);
    }

    #[test]
    fn test_unrelated_json_yields_nothing() {
        let html = r#"<script type="application/json">{"config":{"theme":"dark"}}</script>"#;
        assert!(run(html, &[]).unwrap().is_empty());
        assert!(run("<html><body><p>no scripts</p></body></html>", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_only_malformed_payloads_is_an_error() {
        let responses = vec![CapturedResponse {
            url: "https://api.example.test/x".to_string(),
            status: 200,
            body: "<html>not json</html>".to_string(),
        }];
        let error = run("<html></html>", &responses).unwrap_err();
        assert!(matches!(error, ParsingError::MalformedPayload { .. }));
    }
}
