use std::time::Duration;

use serde::Deserialize;
use ureq::Agent;

use super::{CatalogApi, CatalogError, EntityType, Result, SearchPage};
use crate::config::CatalogConfig;

/// Audio-features endpoint response (entries are null for unknown ids).
#[derive(Debug, Deserialize)]
struct AudioFeaturesResponse {
    #[serde(default)]
    audio_features: Vec<Option<serde_json::Value>>,
}

/// Blocking Web API client. Expects an already-issued bearer token.
pub struct SpotifyClient {
    agent: Agent,
    base_url: String,
    token: Option<String>,
}

impl SpotifyClient {
    pub fn new(config: &CatalogConfig) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.access_token.clone(),
        }
    }

    fn bearer(&self) -> Result<String> {
        self.token
            .as_deref()
            .map(|t| format!("Bearer {t}"))
            .ok_or(CatalogError::NotConnected)
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.agent.get(url.as_str()).header("Authorization", self.bearer()?);
        for (key, value) in query {
            request = request.query(*key, value);
        }
        log::trace!("GET {url} {query:?}");
        let body: serde_json::Value = request.call()?.body_mut().read_json()?;
        Ok(body)
    }
}

impl CatalogApi for SpotifyClient {
    fn is_connected(&self) -> bool {
        if self.token.is_none() {
            log::info!("No catalog access token configured, using offline identifiers");
            return false;
        }
        // Any cheap authenticated call will do
        match self.get_json("browse/categories", &[("limit", "1".to_string())]) {
            Ok(_) => {
                log::info!("Catalog client connected ({})", self.base_url);
                true
            }
            Err(e) => {
                log::warn!("Unable to connect to catalog, check token and settings: {e}");
                false
            }
        }
    }

    fn search(
        &self,
        query: &str,
        entity: EntityType,
        market: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchPage> {
        let body = self.get_json(
            "search",
            &[
                ("q", query.to_string()),
                ("type", entity.as_str().to_string()),
                ("market", market.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )?;
        extract_page(body, entity)
    }

    fn audio_features(&self, ids: &[String]) -> Result<Vec<serde_json::Value>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = self.get_json("audio-features", &[("ids", ids.join(","))])?;
        extract_features(body)
    }

    fn saved_tracks(&self, market: &str, limit: u32, offset: u32) -> Result<SearchPage> {
        let body = self.get_json(
            "me/tracks",
            &[
                ("market", market.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )?;
        serde_json::from_value(body).map_err(|e| CatalogError::Malformed(e.to_string()))
    }
}

/// Pull the paged section (keyed by the plural entity name) out of a search response.
fn extract_page(mut body: serde_json::Value, entity: EntityType) -> Result<SearchPage> {
    let section = body.get_mut(entity.plural()).map(serde_json::Value::take).ok_or_else(|| {
        CatalogError::Malformed(format!("no '{}' section in response", entity.plural()))
    })?;
    serde_json::from_value(section).map_err(|e| CatalogError::Malformed(e.to_string()))
}

fn extract_features(body: serde_json::Value) -> Result<Vec<serde_json::Value>> {
    let resp: AudioFeaturesResponse =
        serde_json::from_value(body).map_err(|e| CatalogError::Malformed(e.to_string()))?;
    Ok(resp.audio_features.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_page() {
        let body = json!({
            "artists": {
                "href": "https://api.spotify.com/v1/search?offset=0&limit=2",
                "items": [{"name": "Mazzy Star", "id": "37w38cCSGgKLdayTRjna4W"}],
                "limit": 2,
                "next": "https://api.spotify.com/v1/search?offset=2&limit=2",
                "offset": 0,
                "total": 3
            }
        });
        let page = extract_page(body, EntityType::Artist).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next.is_some());
        assert_eq!(page.total, Some(3));
    }

    #[test]
    fn test_extract_page_null_next_and_missing_section() {
        let body = json!({"tracks": {"items": [], "next": null}});
        let page = extract_page(body.clone(), EntityType::Track).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next.is_none());

        let missing = extract_page(body, EntityType::Album);
        assert!(matches!(missing, Err(CatalogError::Malformed(_))));
    }

    #[test]
    fn test_extract_features_skips_nulls() {
        let body = json!({"audio_features": [{"id": "a"}, null, {"id": "b"}]});
        let features = extract_features(body).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[1]["id"], "b");
    }

    #[test]
    fn test_no_token_is_not_connected() {
        let client = SpotifyClient::new(&CatalogConfig::default());
        assert!(!client.is_connected());
        assert!(matches!(
            client.search("artist:x", EntityType::Artist, "US", 1, 0),
            Err(CatalogError::NotConnected)
        ));
        assert!(matches!(client.saved_tracks("US", 50, 0), Err(CatalogError::NotConnected)));
    }

    #[test]
    fn test_saved_tracks_page_shape() {
        let body = json!({
            "href": "https://api.spotify.com/v1/me/tracks?offset=0&limit=1",
            "items": [{"added_at": "2021-05-01T10:00:00Z", "track": {"id": "a"}}],
            "limit": 1,
            "next": null,
            "offset": 0,
            "total": 1
        });
        let page: SearchPage = serde_json::from_value(body).unwrap();
        assert_eq!(page.total, Some(1));
        assert_eq!(page.items[0]["track"]["id"], "a");
    }
}
