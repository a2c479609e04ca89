use serde::Deserialize;

/// Envelope returned when a search is submitted asynchronously.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequestData {
    pub id: String,
    pub status: String,
}

/// Envelope returned while polling a submitted search.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResultsData {
    pub status: String,
    /// One inner array per submitted query.
    #[serde(default)]
    pub data: Vec<Vec<PlaceResult>>,
}

/// One Google Maps place row. Field names follow the provider's payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceResult {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default, rename = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}
