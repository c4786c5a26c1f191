use serde_json::value::RawValue;
use serde_json::Value;

use crate::rules::OptionalKind;

macro_rules! option {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        pub mod option {
            use super::*;

            struct $name(super::$name);

            impl<'de> Deserialize<'de> for $name {
                fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    super::deserialize(deserializer).map($name)
                }
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<super::$name>, D::Error>
            where
                D: Deserializer<'de>,
            {
                let opt: Option<$name> = Deserialize::deserialize(deserializer)?;
                Ok(opt.map(|v| v.0))
            }
        }
    };
}

/// Numeric dump fields.
///
/// The dumper writes `*big.Int` values as bare JSON integers that routinely
/// exceed `u64`, so the raw token is read and parsed as decimal. Quoted `0x`
/// quantities (as written for `effectiveGasPrice`) are accepted as well.
pub mod quantity {
    use ethers::types::U256;
    use serde::de::{Deserialize, Deserializer, Error};
    use serde_json::value::RawValue;

    option!(U256, "De `Option<U256>` from a nullable JSON integer or hex quantity.");

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Box<RawValue> = Deserialize::deserialize(deserializer)?;
        parse(raw.get()).map_err(D::Error::custom)
    }

    pub fn parse(text: &str) -> Result<U256, String> {
        if text.starts_with('"') {
            let s: String = serde_json::from_str(text).map_err(|e| e.to_string())?;
            return parse_hex(&s);
        }
        U256::from_dec_str(text).map_err(|e| format!("invalid integer {text}: {e:?}"))
    }

    pub fn parse_hex(s: &str) -> Result<U256, String> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| format!("quantity {s} has no 0x prefix"))?;
        if digits.is_empty() {
            return Err(format!("empty quantity {s}"));
        }
        U256::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {s}: {e:?}"))
    }
}

/// Transaction input as written by the dumper: standard base64, `null` when
/// the transaction carries no data.
pub mod base64_bytes {
    use base64::Engine;
    use serde::de::{Deserialize, Deserializer, Error};

    type Payload = Vec<u8>;

    option!(Payload, "De `Option<Vec<u8>>` from a nullable base64 string.");

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Payload, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(D::Error::custom)
    }
}

/// Compares an optional dumped field against its fetched counterpart.
///
/// Quantities match by value, so a dumped decimal integer equals the node's
/// hex form. Everything else must be the same JSON value, with strings
/// compared case-insensitively.
pub fn same_json_value(kind: OptionalKind, dumped: &RawValue, fetched: &Value) -> bool {
    let text = dumped.get();
    if kind == OptionalKind::Quantity {
        let fetched = match fetched.as_str() {
            Some(s) => quantity::parse_hex(s),
            None => return false,
        };
        return matches!((quantity::parse(text), fetched), (Ok(a), Ok(b)) if a == b);
    }
    match (serde_json::from_str::<Value>(text), fetched) {
        (Ok(Value::String(a)), Value::String(b)) => a.eq_ignore_ascii_case(b),
        (Ok(a), b) => &a == b,
        (Err(_), _) => false,
    }
}

/// Renders bytes the way the node does.
pub fn hex_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
