// ── instant_answer: DuckDuckGo instant-answer API ──────────────────────

use super::ToolsService;
use crate::atoms::error::{EngineError, EngineResult};
use log::{info, warn};
use serde::de::{Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;
use std::fmt;

const INSTANT_ANSWER_ENDPOINT: &str = "https://api.duckduckgo.com/";

pub fn instant_answer_url(query: &str) -> String {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("q", query)
        .append_pair("format", "json")
        .append_pair("no_html", "1")
        .append_pair("skip_disambig", "1")
        .finish();
    format!("{}?{}", INSTANT_ANSWER_ENDPOINT, encoded)
}

/// A parsed lookup: `payload` for field access, `pretty` for history.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantAnswer {
    pub payload: Value,
    /// The response pretty-printed with its keys in the order the API sent
    /// them (`Value` sorts keys).
    pub pretty: String,
}

impl InstantAnswer {
    pub fn parse(body: &str) -> EngineResult<Self> {
        let payload: Value = serde_json::from_str(body)?;
        let ordered: OrderedJson = serde_json::from_str(body)?;
        Ok(InstantAnswer { payload, pretty: serde_json::to_string_pretty(&ordered)? })
    }
}

impl ToolsService {
    /// One lookup: proxies first, then a direct fetch if the proxy path
    /// fails or returns something that is not JSON.
    pub async fn instant_answer(&self, query: &str) -> EngineResult<InstantAnswer> {
        let target = instant_answer_url(query);
        info!("[tools] instant answer '{}'", query);

        let proxy_error = match self
            .proxies
            .fetch_text(self.fetcher.as_ref(), &target, Some(self.request_timeout))
            .await
        {
            Ok(body) => match InstantAnswer::parse(&body) {
                Ok(answer) => return Ok(answer),
                Err(e) => e,
            },
            Err(e) => e,
        };
        warn!("[tools] instant answer via proxies failed ({}), trying direct", proxy_error);

        let resp = self.fetcher.get(&target, Some(self.request_timeout)).await?;
        if !resp.is_success() {
            return Err(EngineError::tool(
                "instant_answer",
                format!(
                    "direct request returned HTTP {} after proxies failed: {}",
                    resp.status, proxy_error
                ),
            ));
        }
        InstantAnswer::parse(&resp.body)
    }
}

// ── Order-preserving JSON ──────────────────────────────────────────────

/// JSON tree whose objects keep their source key order.
enum OrderedJson {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<OrderedJson>),
    Object(Vec<(String, OrderedJson)>),
}

struct OrderedVisitor;

impl<'de> Visitor<'de> for OrderedVisitor {
    type Value = OrderedJson;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E>(self) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Null)
    }

    fn visit_none<E>(self) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Null)
    }

    fn visit_bool<E>(self, v: bool) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Number(v.into()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Number(v.into()))
    }

    fn visit_f64<E>(self, v: f64) -> Result<OrderedJson, E> {
        Ok(serde_json::Number::from_f64(v).map_or(OrderedJson::Null, OrderedJson::Number))
    }

    fn visit_str<E>(self, v: &str) -> Result<OrderedJson, E> {
        Ok(OrderedJson::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<OrderedJson, E> {
        Ok(OrderedJson::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<OrderedJson, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(OrderedJson::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<OrderedJson, A::Error> {
        let mut entries = Vec::new();
        while let Some(entry) = map.next_entry::<String, OrderedJson>()? {
            entries.push(entry);
        }
        Ok(OrderedJson::Object(entries))
    }
}

impl<'de> Deserialize<'de> for OrderedJson {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OrderedVisitor)
    }
}

impl Serialize for OrderedJson {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OrderedJson::Null => serializer.serialize_unit(),
            OrderedJson::Bool(b) => serializer.serialize_bool(*b),
            OrderedJson::Number(n) => n.serialize(serializer),
            OrderedJson::String(s) => serializer.serialize_str(s),
            OrderedJson::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            OrderedJson::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}
