//! Listing, detail and page models
//!
//! Field names on the wire are the API's; the Rust names are ours. Output
//! serializes with the Rust names.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::FetchError;

/// One search result. Identity is `id` (the listing code).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireListing")]
pub struct Listing {
    pub id: String,
    pub title: Option<String>,
    pub organization: Option<String>,
    pub currency: Option<String>,
    pub available_amount: Option<f64>,
    /// Raw closing timestamp as sent by the server
    pub closing: Option<String>,
    /// Offers the authenticated buyer has submitted
    pub own_offers: Option<u32>,
    pub total_offers: Option<u32>,
    pub status: Option<String>,
}

/// Search result as sent by the server. The listing code travels as
/// `codigo`; some responses also carry a numeric internal `id`, used only
/// when `codigo` is absent.
#[derive(Deserialize)]
struct WireListing {
    #[serde(default)]
    codigo: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, alias = "nombre")]
    title: Option<String>,
    #[serde(default, alias = "organismo")]
    organization: Option<String>,
    #[serde(default, alias = "moneda")]
    currency: Option<String>,
    #[serde(default, alias = "montoDisponible", deserialize_with = "amount")]
    available_amount: Option<f64>,
    #[serde(default, alias = "fechaCierre")]
    closing: Option<String>,
    #[serde(default, alias = "cantidadCotizacionesPropias", deserialize_with = "count")]
    own_offers: Option<u32>,
    #[serde(default, alias = "cantidadCotizaciones", deserialize_with = "count")]
    total_offers: Option<u32>,
    #[serde(default, alias = "estado")]
    status: Option<String>,
}

impl TryFrom<WireListing> for Listing {
    type Error = String;

    fn try_from(wire: WireListing) -> Result<Self, Self::Error> {
        let fallback = match wire.id {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let id = wire
            .codigo
            .or(fallback)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or("listing has neither `codigo` nor `id`")?;
        Ok(Self {
            id,
            title: wire.title,
            organization: wire.organization,
            currency: wire.currency,
            available_amount: wire.available_amount,
            closing: wire.closing,
            own_offers: wire.own_offers,
            total_offers: wire.total_offers,
            status: wire.status,
        })
    }
}

impl Listing {
    /// Closing instant, reading offset-less timestamps in `naive_offset`.
    pub fn closing_at(&self, naive_offset: FixedOffset) -> Option<DateTime<Utc>> {
        self.closing
            .as_deref()
            .and_then(|raw| parse_timestamp(raw, naive_offset))
    }
}

/// Parse RFC 3339, or naive ISO-8601 with `T` or space separator. Naive
/// values are local time in `naive_offset`.
pub fn parse_timestamp(raw: &str, naive_offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| naive_offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,
    #[serde(default, alias = "cantidad", deserialize_with = "amount")]
    pub quantity: Option<f64>,
    #[serde(default, alias = "unidadMedida")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(default)]
    pub rut: Option<String>,
    #[serde(default, alias = "unidadCompra")]
    pub purchasing_unit: Option<String>,
}

/// Detail payload of one listing (`payload.detalleSolicitud`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDetail {
    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,
    #[serde(default, alias = "moneda")]
    pub currency: Option<String>,
    #[serde(default, alias = "presupuestoEstimado", deserialize_with = "amount")]
    pub estimated_budget: Option<f64>,
    #[serde(default, alias = "montoDisponible", deserialize_with = "amount")]
    pub available_amount: Option<f64>,
    /// Free-form on the wire: a day count or a structured term
    #[serde(default, alias = "plazoEntrega")]
    pub delivery_terms: Option<Value>,
    #[serde(default, alias = "direccionEntrega")]
    pub delivery_address: Option<String>,
    #[serde(default, alias = "productos")]
    pub items: Vec<LineItem>,
    #[serde(default, alias = "institucion")]
    pub institution: Option<Institution>,
}

impl ListingDetail {
    /// Extract the detail from a full response body.
    pub fn from_response(body: &Value) -> Result<Self, FetchError> {
        let detail = body
            .pointer("/payload/detalleSolicitud")
            .filter(|v| v.is_object())
            .ok_or_else(|| FetchError::Malformed("missing payload.detalleSolicitud".into()))?;
        serde_json::from_value(detail.clone())
            .map_err(|e| FetchError::Malformed(format!("invalid listing detail: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedListing {
    #[serde(flatten)]
    pub listing: Listing,
    pub detail: ListingDetail,
}

/// One search page as reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub page_number: u32,
    pub items: Vec<Listing>,
    pub reported_page_count: Option<u32>,
    pub reported_total: Option<u64>,
}

impl PageResult {
    /// `Ok(None)` when the body lacks `payload.resultados`. An entry that
    /// does not parse as a listing breaks the data contract and fails the
    /// whole page.
    pub fn from_response(page_number: u32, body: &Value) -> Result<Option<Self>, FetchError> {
        let Some(payload) = body.get("payload") else {
            return Ok(None);
        };
        let Some(results) = payload.get("resultados").and_then(Value::as_array) else {
            return Ok(None);
        };
        let items = results
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                Listing::deserialize(raw).map_err(|e| {
                    FetchError::Malformed(format!(
                        "page {page_number} entry {index} is not a listing: {e}"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Self {
            page_number,
            items,
            reported_page_count: payload
                .get("pageCount")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
            reported_total: payload.get("totalRegistros").and_then(Value::as_u64),
        }))
    }
}

/// Accept counts as JSON integers or integer strings. Anything else is
/// unknown.
fn count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept amounts as JSON numbers or numeric strings.
fn amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;
    use serde_json::json;

    fn listing_json() -> Value {
        json!({
            "codigo": "2341-15-COT25",
            "nombre": "Resmas de papel",
            "organismo": "Municipalidad de Ñuñoa",
            "moneda": "CLP",
            "montoDisponible": "1500000",
            "fechaCierre": "2025-03-04T15:00:00",
            "cantidadCotizacionesPropias": 0,
            "cantidadCotizaciones": 2,
            "estado": "Publicada"
        })
    }

    fn utc() -> FixedOffset {
        Utc.fix()
    }

    #[test]
    fn listing_maps_wire_names() {
        let listing: Listing = serde_json::from_value(listing_json()).unwrap();
        assert_eq!(listing.id, "2341-15-COT25");
        assert_eq!(listing.organization.as_deref(), Some("Municipalidad de Ñuñoa"));
        assert_eq!(listing.available_amount, Some(1_500_000.0));
        assert_eq!(listing.own_offers, Some(0));
        assert_eq!(listing.total_offers, Some(2));
        assert_eq!(
            listing.closing_at(utc()),
            Some(Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap())
        );
    }

    #[test]
    fn code_wins_over_numeric_internal_id() {
        let listing: Listing = serde_json::from_value(json!({
            "id": 1042,
            "codigo": "C0-7",
            "cantidadCotizaciones": "0",
            "cantidadCotizacionesPropias": 0
        }))
        .unwrap();
        assert_eq!(listing.id, "C0-7");
        assert_eq!(listing.total_offers, Some(0));
        assert_eq!(listing.own_offers, Some(0));

        let listing: Listing = serde_json::from_value(json!({"id": 1042})).unwrap();
        assert_eq!(listing.id, "1042");
    }

    #[test]
    fn counts_that_are_not_integers_are_unknown() {
        let listing: Listing = serde_json::from_value(json!({
            "codigo": "X",
            "cantidadCotizaciones": "muchas",
            "cantidadCotizacionesPropias": -1
        }))
        .unwrap();
        assert_eq!(listing.total_offers, None);
        assert_eq!(listing.own_offers, None);
    }

    #[test]
    fn listing_serializes_own_names() {
        let listing: Listing = serde_json::from_value(listing_json()).unwrap();
        let out = serde_json::to_value(&listing).unwrap();
        assert_eq!(out["id"], "2341-15-COT25");
        assert!(out.get("codigo").is_none());
    }

    #[test]
    fn timestamps_in_several_shapes() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-04T15:00:00Z", utc()), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04T12:00:00-03:00", utc()), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04 15:00:00", utc()), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04T15:00:00.000", utc()), Some(expected));
        assert_eq!(parse_timestamp("04/03/2025", utc()), None);
        assert_eq!(parse_timestamp("", utc()), None);
    }

    #[test]
    fn naive_timestamps_use_the_given_offset() {
        let santiago = FixedOffset::west_opt(3 * 3600).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 18, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-04T15:00:00", santiago), Some(expected));
        // explicit offsets are not shifted again
        assert_eq!(
            parse_timestamp("2025-03-04T15:00:00Z", santiago),
            Some(Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap())
        );
    }

    #[test]
    fn page_reads_counts() {
        let body = json!({"payload": {
            "resultados": [listing_json(), {"id": 7, "codigo": "2341-16-COT25"}],
            "pageCount": 3,
            "totalRegistros": 120
        }});
        let page = PageResult::from_response(2, &body).unwrap().unwrap();
        assert_eq!(page.page_number, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].id, "2341-16-COT25");
        assert_eq!(page.reported_page_count, Some(3));
        assert_eq!(page.reported_total, Some(120));
    }

    #[test]
    fn unparseable_entry_fails_the_page() {
        let body = json!({"payload": {
            "resultados": [listing_json(), {"nombre": "sin código"}],
            "pageCount": 3
        }});
        let err = PageResult::from_response(2, &body).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(ref msg) if msg.contains("entry 1")), "{err}");
    }

    #[test]
    fn page_without_payload_is_none() {
        for body in [
            json!({}),
            json!({"payload": {}}),
            json!({"payload": {"resultados": "x"}}),
        ] {
            assert!(PageResult::from_response(1, &body).unwrap().is_none(), "{body}");
        }
    }

    #[test]
    fn detail_from_response() {
        let body = json!({"payload": {"detalleSolicitud": {
            "descripcion": "Papel carta",
            "presupuestoEstimado": 900000,
            "plazoEntrega": 10,
            "direccionEntrega": "Av. Irarrázaval 3550",
            "productos": [{"nombre": "Resma", "cantidad": 200}],
            "institucion": {"nombre": "Municipalidad", "rut": "69.070.400-3"}
        }}});
        let detail = ListingDetail::from_response(&body).unwrap();
        assert_eq!(detail.estimated_budget, Some(900_000.0));
        assert_eq!(detail.delivery_terms, Some(json!(10)));
        assert_eq!(detail.items[0].quantity, Some(200.0));
        assert_eq!(detail.institution.unwrap().rut.as_deref(), Some("69.070.400-3"));
    }

    #[test]
    fn detail_missing_is_malformed() {
        let err = ListingDetail::from_response(&json!({"payload": {}})).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }
}
