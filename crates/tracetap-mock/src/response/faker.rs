//! Synthetic data for JSON response bodies.
//!
//! Leaf values are regenerated from what their key suggests (`email`,
//! `first_name`, `user_id`, ...). A value that appears twice under the same
//! key renders the same both times within one response. Keys with no
//! recognizable intent, booleans and nulls are left alone.

use chrono::{Duration, Utc};
use fake::faker::address::en::{BuildingNumber, CityName, CountryName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{DomainSuffix, SafeEmail, Username};
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Number, Value};
use std::collections::HashMap;

/// What a key name implies about its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Email,
    Uuid,
    Id,
    FirstName,
    LastName,
    Username,
    FullName,
    Phone,
    City,
    Country,
    PostalCode,
    Street,
    Company,
    Url,
    Timestamp,
    Title,
    Text,
    Price,
    Age,
    Count,
}

fn classify(raw_key: &str) -> Option<FieldKind> {
    let key = raw_key.to_ascii_lowercase();
    let has = |needle: &str| key.contains(needle);

    let kind = if has("email") {
        FieldKind::Email
    } else if has("uuid") || has("guid") {
        FieldKind::Uuid
    } else if key == "id" || key.ends_with("_id") || raw_key.ends_with("Id") {
        FieldKind::Id
    } else if has("first_name") || has("firstname") {
        FieldKind::FirstName
    } else if has("last_name") || has("lastname") || has("surname") {
        FieldKind::LastName
    } else if has("username") || key == "login" || key == "handle" {
        FieldKind::Username
    } else if has("name") && !has("company") {
        FieldKind::FullName
    } else if has("phone") || has("mobile") {
        FieldKind::Phone
    } else if has("city") {
        FieldKind::City
    } else if has("country") {
        FieldKind::Country
    } else if has("zip") || has("postal") {
        FieldKind::PostalCode
    } else if has("street") || has("address") {
        FieldKind::Street
    } else if has("company") || has("organization") {
        FieldKind::Company
    } else if has("url") || has("website") || has("link") {
        FieldKind::Url
    } else if has("date") || key.ends_with("_at") || has("time") {
        FieldKind::Timestamp
    } else if has("title") || has("subject") {
        FieldKind::Title
    } else if has("description") || has("bio") || has("comment") || has("message") || has("text") {
        FieldKind::Text
    } else if has("price") || has("amount") || has("cost") || has("total") || has("balance") {
        FieldKind::Price
    } else if key == "age" {
        FieldKind::Age
    } else if has("count") || has("quantity") || key == "qty" {
        FieldKind::Count
    } else {
        return None;
    };
    Some(kind)
}

/// Replaces leaf values of one JSON document.
pub struct Faker {
    rng: StdRng,
    seen: HashMap<(String, String), Value>,
}

impl Faker {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            seen: HashMap::new(),
        }
    }

    /// Fake a JSON body. Non-JSON text is returned as-is.
    pub fn fake_body(&mut self, body: &str) -> String {
        match serde_json::from_str::<Value>(body) {
            Ok(mut json) => {
                self.walk(None, &mut json);
                serde_json::to_string(&json).unwrap_or_else(|_| body.to_string())
            }
            Err(_) => body.to_string(),
        }
    }

    fn walk(&mut self, key: Option<&str>, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (child_key, child) in map.iter_mut() {
                    self.walk(Some(child_key.as_str()), child);
                }
            }
            // Array elements inherit the key of the array
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.walk(key, item);
                }
            }
            Value::String(_) | Value::Number(_) => {
                if let Some(key) = key {
                    if let Some(replacement) = self.replacement(key, value) {
                        *value = replacement;
                    }
                }
            }
            Value::Bool(_) | Value::Null => {}
        }
    }

    fn replacement(&mut self, key: &str, original: &Value) -> Option<Value> {
        let kind = classify(key)?;
        let cache_key = (key.to_string(), original.to_string());
        if let Some(cached) = self.seen.get(&cache_key) {
            return Some(cached.clone());
        }

        let generated = self.generate(kind, original);
        self.seen.insert(cache_key, generated.clone());
        Some(generated)
    }

    fn generate(&mut self, kind: FieldKind, original: &Value) -> Value {
        let rng = &mut self.rng;

        if let Value::Number(n) = original {
            return Value::Number(match kind {
                FieldKind::Price => Number::from_f64((rng.gen_range(100..100_000) as f64) / 100.0)
                    .unwrap_or_else(|| Number::from(0)),
                FieldKind::Age => Number::from(rng.gen_range(18..90)),
                FieldKind::Count => Number::from(rng.gen_range(0..100)),
                _ if n.is_f64() => Number::from_f64(rng.gen_range(0.0..1000.0))
                    .unwrap_or_else(|| Number::from(0)),
                _ => Number::from(rng.gen_range(1..100_000)),
            });
        }

        let text: String = match kind {
            FieldKind::Email => SafeEmail().fake_with_rng(rng),
            FieldKind::Uuid => uuid::Uuid::from_u128(rng.gen()).to_string(),
            FieldKind::Id => fake_id(original, rng),
            FieldKind::FirstName => FirstName().fake_with_rng(rng),
            FieldKind::LastName => LastName().fake_with_rng(rng),
            FieldKind::Username => Username().fake_with_rng(rng),
            FieldKind::FullName => Name().fake_with_rng(rng),
            FieldKind::Phone => PhoneNumber().fake_with_rng(rng),
            FieldKind::City => CityName().fake_with_rng(rng),
            FieldKind::Country => CountryName().fake_with_rng(rng),
            FieldKind::PostalCode => ZipCode().fake_with_rng(rng),
            FieldKind::Street => {
                let number: String = BuildingNumber().fake_with_rng(rng);
                let street: String = StreetName().fake_with_rng(rng);
                format!("{number} {street}")
            }
            FieldKind::Company => CompanyName().fake_with_rng(rng),
            FieldKind::Url => {
                let word: String = Word().fake_with_rng(rng);
                let suffix: String = DomainSuffix().fake_with_rng(rng);
                format!("https://www.{word}.{suffix}")
            }
            FieldKind::Timestamp => {
                let offset = Duration::seconds(rng.gen_range(0..365 * 24 * 3600));
                (Utc::now() - offset).to_rfc3339()
            }
            FieldKind::Title => Sentence(2..5).fake_with_rng(rng),
            FieldKind::Text => Sentence(5..12).fake_with_rng(rng),
            FieldKind::Price => format!("{:.2}", rng.gen_range(1.0..1000.0)),
            FieldKind::Age => rng.gen_range(18..90).to_string(),
            FieldKind::Count => rng.gen_range(0..100).to_string(),
        };
        Value::String(text)
    }
}

/// Keep the shape of the original identifier.
fn fake_id(original: &Value, rng: &mut StdRng) -> String {
    let original = original.as_str().unwrap_or_default();
    if crate::matching::id::is_uuid(original) {
        uuid::Uuid::from_u128(rng.gen()).to_string()
    } else if !original.is_empty() && original.chars().all(|c| c.is_ascii_digit()) {
        rng.gen_range(1..100_000u32).to_string()
    } else {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let len = original.len().clamp(6, 32);
        (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}
