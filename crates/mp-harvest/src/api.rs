//! Endpoint URLs and search query construction

use chrono::{Days, NaiveDate};
use reqwest::Url;

use crate::error::{Error, Result};

/// Date format the search endpoint expects for `desde`/`hasta`
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Search filters, one per query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilters {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub order_by: String,
    pub page_size: u32,
    pub status: String,
    pub region: Option<String>,
    /// Restrict to the buyer's registered categories (`misRubros`)
    pub my_categories: Option<bool>,
}

impl SearchFilters {
    /// Listings published from `days_back` days before `today` up to `today`.
    pub fn last_days(days_back: u32, today: NaiveDate) -> Self {
        let from = today
            .checked_sub_days(Days::new(days_back.into()))
            .unwrap_or(today);
        Self {
            from,
            to: today,
            order_by: "recent".into(),
            page_size: 50,
            status: "2".into(),
            region: None,
            my_categories: None,
        }
    }
}

/// Base URLs of the listing endpoints.
#[derive(Debug, Clone)]
pub struct Endpoints {
    search: Url,
    detail: Url,
}

impl Endpoints {
    /// `detail_url` is the collection URL; the listing code is appended as a
    /// path segment.
    pub fn new(search_url: &str, detail_url: &str) -> Result<Self> {
        Ok(Self {
            search: parse(search_url)?,
            detail: parse(detail_url)?,
        })
    }

    pub fn search(&self, filters: &SearchFilters, page: u32) -> Url {
        let mut url = self.search.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("desde", &filters.from.format(DATE_FORMAT).to_string())
                .append_pair("hasta", &filters.to.format(DATE_FORMAT).to_string())
                .append_pair("orderBy", &filters.order_by)
                .append_pair("page", &page.to_string())
                .append_pair("size", &filters.page_size.to_string())
                .append_pair("estado", &filters.status);
            if let Some(region) = &filters.region {
                query.append_pair("region", region);
            }
            if let Some(mine) = filters.my_categories {
                query.append_pair("misRubros", if mine { "true" } else { "false" });
            }
        }
        url
    }

    pub fn detail(&self, code: &str) -> Url {
        let mut url = self.detail.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(code);
        }
        url
    }
}

fn parse(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::InvalidEndpoint {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(Error::InvalidEndpoint {
            url: raw.to_string(),
            reason: "not a hierarchical URL".into(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn endpoints() -> Endpoints {
        Endpoints::new(
            "https://api.example.cl/v1/compra-agil?origen=web",
            "https://api.example.cl/v1/compra-agil/",
        )
        .unwrap()
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn last_days_spans_back_from_today() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let filters = SearchFilters::last_days(3, today);
        assert_eq!(filters.from, NaiveDate::from_ymd_opt(2025, 2, 27).unwrap());
        assert_eq!(filters.to, today);
    }

    #[test]
    fn search_url_carries_every_filter() {
        let mut filters =
            SearchFilters::last_days(7, NaiveDate::from_ymd_opt(2025, 1, 9).unwrap());
        filters.region = Some("13".into());
        filters.my_categories = Some(true);

        let url = endpoints().search(&filters, 4);
        let q = query(&url);
        assert_eq!(q["desde"], "02/01/2025");
        assert_eq!(q["hasta"], "09/01/2025");
        assert_eq!(q["orderBy"], "recent");
        assert_eq!(q["page"], "4");
        assert_eq!(q["size"], "50");
        assert_eq!(q["estado"], "2");
        assert_eq!(q["region"], "13");
        assert_eq!(q["misRubros"], "true");
        assert_eq!(q["origen"], "web");
    }

    #[test]
    fn optional_filters_are_omitted() {
        let filters = SearchFilters::last_days(1, NaiveDate::from_ymd_opt(2025, 1, 9).unwrap());
        let q = query(&endpoints().search(&filters, 1));
        assert!(!q.contains_key("region"));
        assert!(!q.contains_key("misRubros"));
    }

    #[test]
    fn detail_appends_escaped_code() {
        let url = endpoints().detail("2341-15-COT25");
        assert_eq!(url.as_str(), "https://api.example.cl/v1/compra-agil/2341-15-COT25");

        let url = endpoints().detail("a/b");
        assert_eq!(url.path(), "/v1/compra-agil/a%2Fb");
    }

    #[test]
    fn rejects_unparseable_urls() {
        let err = Endpoints::new("not a url", "https://ok.cl").unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));
        let err = Endpoints::new("https://ok.cl", "mailto:x@y.cl").unwrap_err();
        assert!(err.to_string().contains("not a hierarchical URL"));
    }
}
