//! Platform configuration, threaded into the client at construction rather
//! than read ambiently at call sites.

/// Hosting-environment values the dashboard needs to build outbound URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Base domain the platform is served under. Both the scoring endpoint
    /// host and per-service visit hosts hang off this value.
    pub base_domain: String,
    /// Address of the identity backend used by the hosting page.
    pub gaia_addr: String,
    /// Address of the challenge router serving the raw challenge listing.
    pub router_url: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_domain: "local.host:8443".into(),
            gaia_addr: "gaia-backend:8081".into(),
            router_url: "router:8082".into(),
        }
    }
}

pub fn load_config() -> PlatformConfig {
    let mut config = PlatformConfig::default();

    if let Ok(v) = std::env::var("BASE_DOMAIN") {
        config.base_domain = v;
    }
    if let Ok(v) = std::env::var("GAIA_ADDR") {
        config.gaia_addr = v;
    }
    if let Ok(v) = std::env::var("ROUTER_URL") {
        config.router_url = v;
    }

    config
}

impl PlatformConfig {
    /// Origin of the scoring service.
    pub fn scoring_origin(&self) -> String {
        format!("https://ctf.{}", self.base_domain)
    }

    /// Outbound link for visiting a related service, opened in a new
    /// browsing context by the render layer.
    pub fn service_visit_url(&self, service_name: &str) -> String {
        format!("https://{service_name}.ctf.{}/", self.base_domain)
    }

    /// Host shown alongside the visit link.
    pub fn service_host(&self, service_name: &str) -> String {
        format!("{service_name}.ctf.{}", self.base_domain)
    }

    /// Endpoint serving the raw challenge listing.
    pub fn challenges_endpoint(&self) -> String {
        format!("http://{}/api/challenges", self.router_url)
    }
}
