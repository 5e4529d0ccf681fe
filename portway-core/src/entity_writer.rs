//! Content negotiation and entity serialization for error (and other)
//! responses, grounded on the source's `server/entity_writer.go`.

use serde::Serialize;

pub const JSON: &str = "application/json";
pub const XML: &str = "text/xml";

/// Offers in preference order; JSON is the default when the client sends no
/// usable `Accept` header.
pub const OFFERS: [&str; 2] = [JSON, XML];

#[derive(Debug, Clone, Copy)]
struct AcceptSpec<'a> {
    value: &'a str,
    q: f32,
}

/// Parses an `Accept` header into media-range/q pairs. Malformed entries are
/// skipped rather than aborting the whole parse.
fn parse_accept(header: &str) -> Vec<AcceptSpec<'_>> {
    let mut specs = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut segments = part.split(';');
        let value = match segments.next() {
            Some(v) => v.trim(),
            None => continue,
        };
        if value.is_empty() {
            continue;
        }
        let mut q = 1.0f32;
        for param in segments {
            let param = param.trim();
            if let Some(raw) = param.strip_prefix("q=") {
                if let Ok(parsed) = raw.trim().parse::<f32>() {
                    q = parsed;
                }
            }
        }
        specs.push(AcceptSpec { value, q });
    }
    specs
}

/// Picks the best offer for the given `Accept` header value, breaking ties by
/// specificity (exact match > type/* > */*) the way the source's
/// `NegotiateContentType` does.
pub fn negotiate_content_type(accept: Option<&str>, offers: &[&str], default_offer: &str) -> String {
    let mut best_offer = default_offer.to_string();
    let mut best_q = -1.0f32;
    let mut best_wild = 3i8;

    let specs = match accept {
        Some(h) => parse_accept(h),
        None => return best_offer,
    };

    for &offer in offers {
        for spec in &specs {
            if spec.q == 0.0 {
                continue;
            }
            if spec.q < best_q {
                continue;
            }
            if spec.value == "*/*" {
                if spec.q > best_q || best_wild > 2 {
                    best_q = spec.q;
                    best_wild = 2;
                    best_offer = offer.to_string();
                }
            } else if let Some(prefix) = spec.value.strip_suffix("/*") {
                if offer.starts_with(prefix) && (spec.q > best_q || best_wild > 1) {
                    best_q = spec.q;
                    best_wild = 1;
                    best_offer = offer.to_string();
                }
            } else if spec.value == offer && (spec.q > best_q || best_wild > 0) {
                best_q = spec.q;
                best_wild = 0;
                best_offer = offer.to_string();
            }
        }
    }

    best_offer
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to serialize entity as json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to serialize entity as xml: {0}")]
    Xml(String),
}

/// Renders `data` as the negotiated content type. Returns (content-type, body).
pub fn write_entity<T: Serialize>(accept: Option<&str>, data: &T) -> Result<(&'static str, Vec<u8>), WriteError> {
    let format = negotiate_content_type(accept, &OFFERS, OFFERS[0]);
    if format == XML {
        // No XML serializer is pulled into the dependency stack for a single
        // error-envelope use; render a minimal hand-built document instead of
        // adding a crate for one wire format nobody but legacy clients ask for.
        let json = serde_json::to_value(data)?;
        Ok(("text/xml", xml_envelope(&json).into_bytes()))
    } else {
        Ok(("application/json", serde_json::to_vec(data)?))
    }
}

fn xml_envelope(value: &serde_json::Value) -> String {
    let mut out = String::from("<error>");
    if let serde_json::Value::Object(map) = value {
        for (k, v) in map {
            let rendered = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("<{k}>{}</{k}>", xml_escape(&rendered)));
        }
    }
    out.push_str("</error>");
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_accept_picks_default() {
        assert_eq!(negotiate_content_type(None, &OFFERS, JSON), JSON);
    }

    #[test]
    fn exact_match_wins_over_wildcard() {
        let accept = "*/*;q=0.9, text/xml;q=0.9";
        assert_eq!(negotiate_content_type(Some(accept), &OFFERS, JSON), XML);
    }

    #[test]
    fn higher_q_wins() {
        let accept = "application/json;q=0.1, text/xml;q=0.8";
        assert_eq!(negotiate_content_type(Some(accept), &OFFERS, JSON), XML);
    }

    #[test]
    fn zero_q_is_excluded() {
        let accept = "text/xml;q=0, application/json;q=0.5";
        assert_eq!(negotiate_content_type(Some(accept), &OFFERS, JSON), JSON);
    }

    #[test]
    fn malformed_accept_falls_back_to_default() {
        assert_eq!(negotiate_content_type(Some(""), &OFFERS, JSON), JSON);
    }
}
