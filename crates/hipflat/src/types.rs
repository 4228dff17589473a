use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("Invalid listing status '{0}'. Accepted values: 'basic_only', 'detailed', 'detail_failed'")]
pub struct ListingStatusParseError(String);

/// How far a record got through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    #[default]
    BasicOnly,
    Detailed,
    DetailFailed,
}

impl FromStr for ListingStatus {
    type Err = ListingStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic_only" => Ok(ListingStatus::BasicOnly),
            "detailed" => Ok(ListingStatus::Detailed),
            "detail_failed" => Ok(ListingStatus::DetailFailed),
            _ => Err(ListingStatusParseError(s.to_string())),
        }
    }
}

impl Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingStatus::BasicOnly => write!(f, "basic only"),
            ListingStatus::Detailed => write!(f, "detailed"),
            ListingStatus::DetailFailed => write!(f, "detail failed"),
        }
    }
}

/// One rental listing, as exported to CSV and the spreadsheet.
///
/// Text fields that the markup did not provide are `None`, flags default to
/// `false`. `property_id` falls back to the last path segment of `url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub property_id: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub monthly_rent: Option<String>,
    pub description: Option<String>,
    pub minimum_stay: Option<String>,
    pub posted_date: Option<String>,
    pub furnished: bool,
    pub floor_area_m2: Option<f64>,
    pub floor: Option<u32>,
    pub sauna: bool,
    pub wifi: bool,
    pub url: String,
    pub line_id: Option<String>,
    pub status: ListingStatus,
}

impl ListingRecord {
    /// Column names, in serialization order.
    pub const HEADER: [&'static str; 15] = [
        "property_id",
        "name",
        "address",
        "monthly_rent",
        "description",
        "minimum_stay",
        "posted_date",
        "furnished",
        "floor_area_m2",
        "floor",
        "sauna",
        "wifi",
        "url",
        "line_id",
        "status",
    ];

    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            property_id: property_id_from_url(&url).unwrap_or_default(),
            url,
            ..Default::default()
        }
    }

    /// Overwrites every field that `fields` carries; absent fields keep their
    /// current value.
    pub fn merge(&mut self, fields: DetailFields) {
        if let Some(id) = fields.property_id {
            self.property_id = id;
        }
        if let Some(date) = fields.posted_date {
            self.posted_date = Some(date);
        }
        if let Some(floor) = fields.floor {
            self.floor = Some(floor);
        }
        if let Some(stay) = fields.minimum_stay {
            self.minimum_stay = Some(stay);
        }
        if let Some(furnished) = fields.furnished {
            self.furnished = furnished;
        }
        if let Some(area) = fields.floor_area_m2 {
            self.floor_area_m2 = Some(area);
        }
        if let Some(description) = fields.description {
            self.description = Some(description);
        }
        if let Some(sauna) = fields.sauna {
            self.sauna = sauna;
        }
        if let Some(wifi) = fields.wifi {
            self.wifi = wifi;
        }
        if let Some(line_id) = fields.line_id {
            self.line_id = Some(line_id);
        }
    }

    /// The record as plain cell values, aligned with [`ListingRecord::HEADER`].
    pub fn to_row(&self) -> Vec<String> {
        fn opt(value: &Option<String>) -> String {
            value.clone().unwrap_or_default()
        }

        vec![
            self.property_id.clone(),
            opt(&self.name),
            opt(&self.address),
            opt(&self.monthly_rent),
            opt(&self.description),
            opt(&self.minimum_stay),
            opt(&self.posted_date),
            self.furnished.to_string(),
            self.floor_area_m2.map(|a| a.to_string()).unwrap_or_default(),
            self.floor.map(|f| f.to_string()).unwrap_or_default(),
            self.sauna.to_string(),
            self.wifi.to_string(),
            self.url.clone(),
            opt(&self.line_id),
            self.status.to_string(),
        ]
    }
}

impl Display for ListingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or("(untitled)"))?;
        if let Some(rent) = &self.monthly_rent {
            write!(f, " - {}", rent)?;
        }
        if let Some(area) = self.floor_area_m2 {
            write!(f, " - {} m²", area)?;
        }
        write!(f, " [{}]", self.status)
    }
}

/// Supplementary values found on a detail page. `None` means "not on the page".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailFields {
    pub property_id: Option<String>,
    pub posted_date: Option<String>,
    pub floor: Option<u32>,
    pub minimum_stay: Option<String>,
    pub furnished: Option<bool>,
    pub floor_area_m2: Option<f64>,
    pub description: Option<String>,
    pub sauna: Option<bool>,
    pub wifi: Option<bool>,
    pub line_id: Option<String>,
}

impl DetailFields {
    pub fn is_empty(&self) -> bool {
        *self == DetailFields::default()
    }
}

pub fn property_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}
