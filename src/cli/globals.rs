use secrecy::SecretString;
use url::Url;

#[derive(Clone)]
pub struct GlobalArgs {
    pub admin_secret: SecretString,
    pub relay_url: Url,
}

impl GlobalArgs {
    #[must_use]
    pub const fn new(admin_secret: SecretString, relay_url: Url) -> Self {
        Self {
            admin_secret,
            relay_url,
        }
    }
}

// The relay URL may carry a webhook token in its path or query.
impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("admin_secret", &"***")
            .field("relay_host", &self.relay_url.host_str().unwrap_or("none"))
            .finish()
    }
}
