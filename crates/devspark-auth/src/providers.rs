//! Built-in OAuth provider table.

use devspark_config::ProviderOverride;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Providers the site API facade knows how to start a redirect for.
pub const SITE_PROVIDERS: [&str; 6] = ["google", "github", "microsoft", "apple", "twitter", "discord"];

/// Providers the hosted backend can federate with.
pub const BACKEND_PROVIDERS: [&str; 12] = [
    "google",
    "github",
    "microsoft",
    "apple",
    "twitter",
    "discord",
    "facebook",
    "gitlab",
    "bitbucket",
    "figma",
    "kakao",
    "keycloak",
];

/// OAuth configuration for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    /// Space-delimited scopes.
    pub scope: String,
    pub response_type: String,
}

impl ProviderConfig {
    fn new(name: &str, site_origin: &str, auth_url: &str, token_url: &str, scope: &str) -> Self {
        Self {
            client_id: format!("YOUR_{}_CLIENT_ID", name.to_uppercase()),
            redirect_uri: format!(
                "{}/auth/{}/callback",
                site_origin.trim_end_matches('/'),
                name
            ),
            auth_url: auth_url.to_string(),
            token_url: token_url.to_string(),
            scope: scope.to_string(),
            response_type: "code".to_string(),
        }
    }

    /// Replace only the fields present in `over`.
    pub fn apply(&mut self, over: &ProviderOverride) {
        let fields = [
            (&mut self.client_id, &over.client_id),
            (&mut self.redirect_uri, &over.redirect_uri),
            (&mut self.auth_url, &over.auth_url),
            (&mut self.token_url, &over.token_url),
            (&mut self.scope, &over.scope),
            (&mut self.response_type, &over.response_type),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value.clone();
            }
        }
    }
}

/// Default table with redirect URIs rooted at `site_origin`.
pub fn default_providers(site_origin: &str) -> BTreeMap<String, ProviderConfig> {
    let table = [
        (
            "google",
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            "email profile",
        ),
        (
            "github",
            "https://github.com/login/oauth/authorize",
            "https://github.com/login/oauth/access_token",
            "user:email",
        ),
        (
            "microsoft",
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            "openid profile email",
        ),
        (
            "apple",
            "https://appleid.apple.com/auth/authorize",
            "https://appleid.apple.com/auth/token",
            "name email",
        ),
        (
            "twitter",
            "https://twitter.com/i/oauth2/authorize",
            "https://api.twitter.com/2/oauth2/token",
            "tweet.read users.read",
        ),
        (
            "discord",
            "https://discord.com/api/oauth2/authorize",
            "https://discord.com/api/oauth2/token",
            "identify email",
        ),
    ];

    table
        .into_iter()
        .map(|(name, auth_url, token_url, scope)| {
            (
                name.to_string(),
                ProviderConfig::new(name, site_origin, auth_url, token_url, scope),
            )
        })
        .collect()
}

/// Merge overrides into `providers`. Keys that name no known provider are skipped.
pub fn merge_overrides(
    providers: &mut BTreeMap<String, ProviderConfig>,
    overrides: &BTreeMap<String, ProviderOverride>,
) {
    for (name, over) in overrides {
        match providers.get_mut(name) {
            Some(config) => config.apply(over),
            None => debug!(provider = %name, "Ignoring override for unknown provider"),
        }
    }
}

/// Name the hosted backend uses for a provider on the wire.
pub fn backend_wire_name(provider: &str) -> &str {
    match provider {
        "microsoft" => "azure",
        other => other,
    }
}
