//! Region and realm table, and endpoint resolution.

use crate::Result;
use crate::error::Error;

/// Endpoint template used by the Core Services (`iaas`) clients.
pub const IAAS_ENDPOINT_TEMPLATE: &str = "https://iaas.{region}.{secondLevelDomain}";

const COMMERCIAL_REALM: &str = "oc1";

static REALMS: &[(&str, &str)] = &[
    ("oc1", "oraclecloud.com"),
    ("oc2", "oraclegovcloud.com"),
    ("oc3", "oraclegovcloud.com"),
    ("oc4", "oraclegovcloud.uk"),
    ("oc8", "oraclecloud8.com"),
    ("oc9", "oraclecloud9.com"),
    ("oc10", "oraclecloud10.com"),
    ("oc14", "oraclecloud14.com"),
    ("oc19", "oraclecloud.eu"),
    ("oc20", "oraclecloud20.com"),
];

// (region id, short code, realm)
static REGIONS: &[(&str, &str, &str)] = &[
    ("af-johannesburg-1", "jnb", "oc1"),
    ("ap-chuncheon-1", "yny", "oc1"),
    ("ap-hyderabad-1", "hyd", "oc1"),
    ("ap-melbourne-1", "mel", "oc1"),
    ("ap-mumbai-1", "bom", "oc1"),
    ("ap-osaka-1", "kix", "oc1"),
    ("ap-seoul-1", "icn", "oc1"),
    ("ap-singapore-1", "sin", "oc1"),
    ("ap-sydney-1", "syd", "oc1"),
    ("ap-tokyo-1", "nrt", "oc1"),
    ("ca-montreal-1", "yul", "oc1"),
    ("ca-toronto-1", "yyz", "oc1"),
    ("eu-amsterdam-1", "ams", "oc1"),
    ("eu-frankfurt-1", "fra", "oc1"),
    ("eu-madrid-1", "mad", "oc1"),
    ("eu-marseille-1", "mrs", "oc1"),
    ("eu-milan-1", "lin", "oc1"),
    ("eu-paris-1", "cdg", "oc1"),
    ("eu-stockholm-1", "arn", "oc1"),
    ("eu-zurich-1", "zrh", "oc1"),
    ("il-jerusalem-1", "mtz", "oc1"),
    ("me-dubai-1", "dxb", "oc1"),
    ("me-jeddah-1", "jed", "oc1"),
    ("mx-monterrey-1", "mty", "oc1"),
    ("mx-queretaro-1", "qro", "oc1"),
    ("sa-santiago-1", "scl", "oc1"),
    ("sa-saopaulo-1", "gru", "oc1"),
    ("sa-vinhedo-1", "vcp", "oc1"),
    ("uk-cardiff-1", "cwl", "oc1"),
    ("uk-london-1", "lhr", "oc1"),
    ("us-ashburn-1", "iad", "oc1"),
    ("us-chicago-1", "ord", "oc1"),
    ("us-phoenix-1", "phx", "oc1"),
    ("us-sanjose-1", "sjc", "oc1"),
    ("us-langley-1", "lfi", "oc2"),
    ("us-luke-1", "luf", "oc2"),
    ("us-gov-ashburn-1", "ric", "oc3"),
    ("us-gov-chicago-1", "pia", "oc3"),
    ("us-gov-phoenix-1", "tus", "oc3"),
    ("uk-gov-london-1", "ltn", "oc4"),
    ("uk-gov-cardiff-1", "brs", "oc4"),
    ("ap-chiyoda-1", "nja", "oc8"),
    ("ap-ibaraki-1", "ukb", "oc8"),
    ("me-dcc-muscat-1", "mct", "oc9"),
    ("ap-dcc-canberra-1", "wga", "oc10"),
    ("eu-dcc-milan-1", "bgy", "oc14"),
    ("eu-dcc-milan-2", "mxp", "oc14"),
    ("eu-dcc-dublin-1", "ork", "oc14"),
    ("eu-dcc-dublin-2", "snn", "oc14"),
    ("eu-dcc-rating-1", "dus", "oc14"),
    ("eu-dcc-rating-2", "dtm", "oc14"),
    ("eu-frankfurt-2", "str", "oc19"),
    ("eu-madrid-2", "vll", "oc19"),
    ("eu-jovanovac-1", "beg", "oc20"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    id: String,
    realm: &'static str,
    second_level_domain: &'static str,
}

impl Region {
    /// Accepts a region id (`us-ashburn-1`) or short code (`iad`), case-insensitively.
    ///
    /// Well-formed ids missing from the table are assumed to be commercial regions.
    pub fn parse(region: &str) -> Result<Self> {
        let normalized = region.trim().to_ascii_lowercase();
        if let Some((id, _, realm)) = REGIONS
            .iter()
            .find(|(id, short, _)| *id == normalized || *short == normalized)
        {
            return Self::in_realm(id, realm, region);
        }
        if looks_like_region_id(&normalized) {
            return Self::in_realm(&normalized, COMMERCIAL_REALM, region);
        }
        Err(Error::EndpointUnknown {
            service: String::new(),
            region: region.to_owned(),
        })
    }

    fn in_realm(id: &str, realm: &str, original: &str) -> Result<Self> {
        let (realm, second_level_domain) = REALMS
            .iter()
            .find(|(name, _)| *name == realm)
            .copied()
            .ok_or_else(|| Error::EndpointUnknown {
                service: String::new(),
                region: original.to_owned(),
            })?;
        Ok(Self {
            id: id.to_owned(),
            realm,
            second_level_domain,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn realm(&self) -> &'static str {
        self.realm
    }

    pub fn second_level_domain(&self) -> &'static str {
        self.second_level_domain
    }

    /// Fills `{region}` and `{secondLevelDomain}` in an endpoint template.
    pub fn endpoint_for_template(&self, template: &str) -> Result<Endpoint> {
        let url = template
            .replace("{region}", &self.id)
            .replace("{secondLevelDomain}", self.second_level_domain);
        Endpoint::parse(&url)
    }

    pub fn endpoint(&self, service: &str) -> Result<Endpoint> {
        Endpoint::parse(&format!(
            "https://{service}.{}.{}",
            self.id, self.second_level_domain
        ))
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.id)
    }
}

/// Resolves `https://{service}.{region}.{domain}`.
pub fn resolve(service: &str, region: &str) -> Result<Endpoint> {
    Region::parse(region)
        .map_err(|_| Error::EndpointUnknown {
            service: service.to_owned(),
            region: region.to_owned(),
        })?
        .endpoint(service)
}

fn looks_like_region_id(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.split('-').collect();
    let Some((number, words)) = parts.split_last() else {
        return false;
    };
    words.len() >= 2
        && !number.is_empty()
        && number.chars().all(|ch| ch.is_ascii_digit())
        && words
            .iter()
            .all(|word| !word.is_empty() && word.chars().all(|ch| ch.is_ascii_lowercase()))
}

/// Destination of a service client: scheme, host (and port) and API version prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    authority: String,
    base_path: String,
}

impl Endpoint {
    /// Parses an absolute `http`/`https` url; any path becomes the base path.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let url = url::Url::parse(endpoint).map_err(|source| Error::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            message: source.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                message: format!("unsupported scheme {}", url.scheme()),
            });
        }
        let Some(host) = url.host_str() else {
            return Err(Error::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                message: "missing host".to_owned(),
            });
        };
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        Ok(Self {
            scheme: url.scheme().to_owned(),
            authority,
            base_path: url.path().trim_matches('/').to_owned(),
        })
    }

    pub fn with_base_path(mut self, base_path: impl AsRef<str>) -> Self {
        self.base_path = base_path.as_ref().trim_matches('/').to_owned();
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// `scheme://authority`, without the base path.
    pub fn host_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }

    pub(crate) fn url(&self) -> Result<url::Url> {
        let mut text = self.host_url();
        text.push('/');
        url::Url::parse(&text).map_err(|source| Error::InvalidEndpoint {
            endpoint: text.clone(),
            message: source.to_string(),
        })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.base_path.is_empty() {
            write!(formatter, "{}://{}", self.scheme, self.authority)
        } else {
            write!(formatter, "{}://{}/{}", self.scheme, self.authority, self.base_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Endpoint, IAAS_ENDPOINT_TEMPLATE, Region, resolve};
    use crate::error::ErrorCode;

    #[test]
    fn commercial_region_resolves_to_oraclecloud_domain() {
        let endpoint = resolve("iaas", "us-phoenix-1").expect("known region");
        assert_eq!(endpoint.to_string(), "https://iaas.us-phoenix-1.oraclecloud.com");
    }

    #[test]
    fn short_codes_and_case_are_normalized() {
        let region = Region::parse("IAD").expect("short code");
        assert_eq!(region.id(), "us-ashburn-1");
        assert_eq!(Region::parse("Eu-Frankfurt-1").expect("mixed case").id(), "eu-frankfurt-1");
    }

    #[test]
    fn government_and_sovereign_realms_use_their_domains() {
        assert_eq!(
            resolve("iaas", "us-gov-ashburn-1").expect("oc3").authority(),
            "iaas.us-gov-ashburn-1.oraclegovcloud.com"
        );
        assert_eq!(
            resolve("iaas", "uk-gov-london-1").expect("oc4").authority(),
            "iaas.uk-gov-london-1.oraclegovcloud.uk"
        );
        assert_eq!(Region::parse("eu-frankfurt-2").expect("oc19").realm(), "oc19");
    }

    #[test]
    fn unknown_well_formed_region_falls_back_to_commercial_realm() {
        let region = Region::parse("xx-newcity-1").expect("well formed");
        assert_eq!(region.realm(), "oc1");
        assert_eq!(region.second_level_domain(), "oraclecloud.com");
    }

    #[test]
    fn malformed_region_is_endpoint_unknown() {
        let error = resolve("iaas", "not a region").expect_err("malformed");
        assert_eq!(error.code(), ErrorCode::EndpointUnknown);
        assert!(error.to_string().contains("iaas"));
    }

    #[test]
    fn template_substitution_matches_iaas_host() {
        let endpoint = Region::parse("ap-chiyoda-1")
            .expect("oc8")
            .endpoint_for_template(IAAS_ENDPOINT_TEMPLATE)
            .expect("template");
        assert_eq!(endpoint.authority(), "iaas.ap-chiyoda-1.oraclecloud8.com");
    }

    #[test]
    fn override_keeps_port_and_path() {
        let endpoint = Endpoint::parse("http://127.0.0.1:8080/20160918/").expect("override");
        assert_eq!(endpoint.scheme(), "http");
        assert_eq!(endpoint.authority(), "127.0.0.1:8080");
        assert_eq!(endpoint.base_path(), "20160918");
        assert!(Endpoint::parse("ftp://example.com").is_err());
    }
}
