//! Compact, recoverable snapshot of verified items stored in payment metadata.
//!
//! Processor metadata values are capped at 500 characters, so the snapshot
//! degrades through an ordered list of encodings until one fits. The webhook
//! path decodes whatever encoding was stored back into order lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::cart::VerifiedItem;
use crate::models::order::NewOrderItem;
use crate::payments::utils::format_amount;

pub const METADATA_VALUE_LIMIT: usize = 500;
const COMPACT_NAME_LEN: usize = 24;
const MINIMAL_NAME_LEN: usize = 12;

/// Encodings in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotEncoding {
    /// Every field, modifiers with prices
    Full,
    /// Modifier names only, names shortened
    Compact,
    /// No modifiers, names shortened further
    Minimal,
    /// Only the number of lines
    CountOnly,
}

pub const ENCODERS: [SnapshotEncoding; 4] = [
    SnapshotEncoding::Full,
    SnapshotEncoding::Compact,
    SnapshotEncoding::Minimal,
    SnapshotEncoding::CountOnly,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotLine {
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    product_id: Option<String>,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    #[serde(rename = "q")]
    quantity: u32,
    #[serde(rename = "p")]
    unit_price: String,
    #[serde(rename = "m", default, skip_serializing_if = "Vec::is_empty")]
    modifiers: Vec<SnapshotModifier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SnapshotModifier {
    Priced {
        #[serde(rename = "n")]
        name: String,
        #[serde(rename = "p")]
        price: String,
    },
    Named(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CountOnly {
    truncated: bool,
    count: usize,
}

fn shorten(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

impl SnapshotEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotEncoding::Full => "full",
            SnapshotEncoding::Compact => "compact",
            SnapshotEncoding::Minimal => "minimal",
            SnapshotEncoding::CountOnly => "count_only",
        }
    }

    fn line(&self, item: &VerifiedItem) -> SnapshotLine {
        let unit_price = format_amount(item.unit_price);
        match self {
            SnapshotEncoding::Full => SnapshotLine {
                product_id: Some(item.product_id.to_string()),
                name: item.product_name.clone(),
                size: item.size_name.clone(),
                quantity: item.quantity,
                unit_price,
                modifiers: item
                    .modifiers
                    .iter()
                    .map(|m| SnapshotModifier::Priced {
                        name: m.name.clone(),
                        price: format_amount(m.price),
                    })
                    .collect(),
            },
            SnapshotEncoding::Compact => SnapshotLine {
                product_id: None,
                name: shorten(&item.product_name, COMPACT_NAME_LEN),
                size: item.size_name.as_deref().map(|s| shorten(s, COMPACT_NAME_LEN)),
                quantity: item.quantity,
                unit_price,
                modifiers: item
                    .modifiers
                    .iter()
                    .map(|m| SnapshotModifier::Named(shorten(&m.name, COMPACT_NAME_LEN)))
                    .collect(),
            },
            SnapshotEncoding::Minimal | SnapshotEncoding::CountOnly => SnapshotLine {
                product_id: None,
                name: shorten(&item.product_name, MINIMAL_NAME_LEN),
                size: item.size_name.as_deref().map(|s| shorten(s, MINIMAL_NAME_LEN)),
                quantity: item.quantity,
                unit_price,
                modifiers: Vec::new(),
            },
        }
    }

    pub fn encode(&self, items: &[VerifiedItem]) -> Result<String, serde_json::Error> {
        match self {
            SnapshotEncoding::CountOnly => serde_json::to_string(&CountOnly {
                truncated: true,
                count: items.len(),
            }),
            _ => {
                let lines: Vec<SnapshotLine> = items.iter().map(|item| self.line(item)).collect();
                serde_json::to_string(&lines)
            }
        }
    }
}

/// Encode with the first encoding that fits in `budget` characters.
pub fn encode_snapshot(
    items: &[VerifiedItem],
    budget: usize,
) -> Result<(SnapshotEncoding, String), serde_json::Error> {
    let mut last = None;
    for encoding in ENCODERS {
        let encoded = encoding.encode(items)?;
        if encoded.chars().count() <= budget {
            return Ok((encoding, encoded));
        }
        last = Some((encoding, encoded));
    }
    // count-only is a few dozen characters; reaching here means a tiny budget
    Ok(last.unwrap_or((SnapshotEncoding::CountOnly, String::new())))
}

/// A snapshot read back from metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedSnapshot {
    Lines(Vec<NewOrderItem>),
    CountOnly(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot price '{0}' is not a decimal")]
    Price(String),
}

pub fn decode_snapshot(raw: &str) -> Result<DecodedSnapshot, SnapshotError> {
    if let Ok(count_only) = serde_json::from_str::<CountOnly>(raw) {
        return Ok(DecodedSnapshot::CountOnly(count_only.count));
    }

    let lines: Vec<SnapshotLine> = serde_json::from_str(raw)?;
    let items = lines
        .into_iter()
        .map(|line| {
            let unit_price = Decimal::from_str(&line.unit_price)
                .map_err(|_| SnapshotError::Price(line.unit_price.clone()))?;
            let modifiers = line
                .modifiers
                .into_iter()
                .map(|modifier| match modifier {
                    SnapshotModifier::Priced { name, price } => {
                        let price = Decimal::from_str(&price)
                            .map_err(|_| SnapshotError::Price(price.clone()))?;
                        Ok(serde_json::json!({ "name": name, "price": price.to_string() }))
                    }
                    SnapshotModifier::Named(name) => Ok(serde_json::json!({ "name": name })),
                })
                .collect::<Result<Vec<_>, SnapshotError>>()?;

            Ok(NewOrderItem {
                product_id: line.product_id,
                product_name: line.name,
                size_name: line.size,
                quantity: line.quantity.clamp(1, 99) as i32,
                unit_price: unit_price.max(Decimal::ZERO),
                modifiers: serde_json::Value::Array(modifiers),
            })
        })
        .collect::<Result<Vec<_>, SnapshotError>>()?;

    Ok(DecodedSnapshot::Lines(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cart::PricedModifier;
    use crate::models::catalog::ProductType;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn item(name: &str, modifiers: usize) -> VerifiedItem {
        VerifiedItem {
            product_id: Uuid::new_v4(),
            product_name: name.to_string(),
            product_type: ProductType::Drink,
            size_name: Some("Regular".to_string()),
            unit_price: dec!(5.25),
            quantity: 2,
            modifiers: (0..modifiers)
                .map(|i| PricedModifier {
                    name: format!("Extra Shot Number {}", i),
                    price: dec!(0.75),
                })
                .collect(),
        }
    }

    #[test]
    fn small_cart_uses_full_encoding_and_decodes() {
        let items = vec![item("Latte", 1)];
        let (encoding, raw) = encode_snapshot(&items, METADATA_VALUE_LIMIT).unwrap();
        assert_eq!(encoding, SnapshotEncoding::Full);

        let DecodedSnapshot::Lines(lines) = decode_snapshot(&raw).unwrap() else {
            panic!("expected lines");
        };
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, Some(items[0].product_id.to_string()));
        assert_eq!(lines[0].product_name, "Latte");
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[0].unit_price, dec!(5.25));
        assert_eq!(lines[0].modifiers[0]["price"], "0.75");
    }

    #[test]
    fn encodings_degrade_in_order() {
        let medium = vec![item("Honey Lavender Oat Latte Special", 2); 3];
        let (encoding, raw) = encode_snapshot(&medium, METADATA_VALUE_LIMIT).unwrap();
        assert_eq!(encoding, SnapshotEncoding::Compact);
        assert!(raw.chars().count() <= METADATA_VALUE_LIMIT);

        let large = vec![item("Honey Lavender Oat Latte Special", 3); 8];
        let (encoding, _) = encode_snapshot(&large, METADATA_VALUE_LIMIT).unwrap();
        assert_eq!(encoding, SnapshotEncoding::Minimal);

        let huge = vec![item("Honey Lavender Oat Latte Special", 3); 50];
        let (encoding, raw) = encode_snapshot(&huge, METADATA_VALUE_LIMIT).unwrap();
        assert_eq!(encoding, SnapshotEncoding::CountOnly);
        assert_eq!(raw, r#"{"truncated":true,"count":50}"#);
        assert_eq!(decode_snapshot(&raw).unwrap(), DecodedSnapshot::CountOnly(50));
    }

    #[test]
    fn compact_lines_decode_without_prices_on_modifiers() {
        let items = vec![item("Latte", 2)];
        let raw = SnapshotEncoding::Compact.encode(&items).unwrap();
        let DecodedSnapshot::Lines(lines) = decode_snapshot(&raw).unwrap() else {
            panic!("expected lines");
        };
        assert_eq!(lines[0].product_id, None);
        assert_eq!(lines[0].modifiers[1]["name"], "Extra Shot Number 1");
        assert!(lines[0].modifiers[1].get("price").is_none());
    }

    #[test]
    fn minimal_shortens_names_on_char_boundaries() {
        let items = vec![item("Café Crème Brûlée Latte", 1)];
        let raw = SnapshotEncoding::Minimal.encode(&items).unwrap();
        let DecodedSnapshot::Lines(lines) = decode_snapshot(&raw).unwrap() else {
            panic!("expected lines");
        };
        assert_eq!(lines[0].product_name, "Café Crème B");
        assert!(lines[0].modifiers.as_array().unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_snapshot("not json").is_err());
        assert!(decode_snapshot(r#"[{"n":"x","q":1,"p":"abc"}]"#).is_err());
    }
}
