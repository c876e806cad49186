use crate::core::config::MapConfig;
use crate::core::geo::TileCoord;

/// Trait representing anything that can produce tile URLs for a given coordinate.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `coord`.
    fn url(&self, coord: TileCoord) -> String;
}

/// Expands a URL template such as `https://{s}.tile.example/{z}/{x}/{y}.png`.
///
/// `{s}` rotates through the configured subdomains so neighbouring tiles
/// spread over hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplateSource {
    template: String,
    subdomains: Vec<String>,
}

impl UrlTemplateSource {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            subdomains: Vec::new(),
        }
    }

    pub fn with_subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_config(config: &MapConfig) -> Self {
        Self::new(config.provider_url.clone()).with_subdomains(config.subdomains.iter().cloned())
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn subdomain(&self, coord: TileCoord) -> &str {
        if self.subdomains.is_empty() {
            return "";
        }
        let idx = ((coord.x as usize) + (coord.y as usize)) % self.subdomains.len();
        &self.subdomains[idx]
    }
}

impl TileSource for UrlTemplateSource {
    fn url(&self, coord: TileCoord) -> String {
        self.template
            .replace("{s}", self.subdomain(coord))
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }
}

impl Default for UrlTemplateSource {
    fn default() -> Self {
        Self::from_config(&MapConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_source_is_osm() {
        let coord = TileCoord::new(9371, 12534, 15).unwrap();
        assert_eq!(
            UrlTemplateSource::default().url(coord),
            "https://tile.openstreetmap.org/15/9371/12534.png"
        );
    }

    #[test]
    fn test_subdomains_rotate() {
        let source = UrlTemplateSource::new("https://{s}.tiles.test/{z}/{x}/{y}.png")
            .with_subdomains(["a", "b", "c"]);
        let urls: Vec<String> = (0..3)
            .map(|x| source.url(TileCoord::new(x, 0, 2).unwrap()))
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://a.tiles.test/2/0/0.png",
                "https://b.tiles.test/2/1/0.png",
                "https://c.tiles.test/2/2/0.png",
            ]
        );
    }
}
