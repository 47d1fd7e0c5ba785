// Delivery target URL parsing

use crate::errors::NotifyError;
use reqwest::Url;

const PUSHOVER_API: &str = "https://api.pushover.net/1/messages.json";
const DISCORD_API: &str = "https://discord.com/api/webhooks";
const NTFY_DEFAULT_HOST: &str = "ntfy.sh";

/// A parsed delivery target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// Generic JSON webhook receiving `{"title", "body"}`
    Webhook { url: String },
    Discord { webhook_url: String },
    Pushover { user_key: String, app_token: String },
    Ntfy { url: String },
}

impl DeliveryTarget {
    /// Parse an opaque target URL such as `pover://user@token`
    pub fn parse(raw: &str) -> Result<Self, NotifyError> {
        let raw = raw.trim();
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| NotifyError::InvalidTarget(redact(raw)))?;

        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(DeliveryTarget::Webhook {
                url: checked_url(raw)?,
            }),
            "json" => Ok(DeliveryTarget::Webhook {
                url: checked_url(&format!("http://{}", rest))?,
            }),
            "jsons" => Ok(DeliveryTarget::Webhook {
                url: checked_url(&format!("https://{}", rest))?,
            }),
            "discord" => {
                let (id, token) = rest
                    .trim_end_matches('/')
                    .split_once('/')
                    .filter(|(id, token)| !id.is_empty() && !token.is_empty())
                    .ok_or_else(|| NotifyError::InvalidTarget(redact(raw)))?;
                Ok(DeliveryTarget::Discord {
                    webhook_url: format!("{}/{}/{}", DISCORD_API, id, token),
                })
            }
            "pover" => {
                let (user_key, app_token) = rest
                    .trim_end_matches('/')
                    .split_once('@')
                    .filter(|(user, token)| !user.is_empty() && !token.is_empty())
                    .ok_or_else(|| NotifyError::InvalidTarget(redact(raw)))?;
                Ok(DeliveryTarget::Pushover {
                    user_key: user_key.to_string(),
                    app_token: app_token.to_string(),
                })
            }
            "ntfy" | "ntfys" => {
                let http_scheme = if scheme.eq_ignore_ascii_case("ntfy") {
                    "http"
                } else {
                    "https"
                };
                let rest = rest.trim_matches('/');
                if rest.is_empty() {
                    return Err(NotifyError::InvalidTarget(redact(raw)));
                }
                let url = match rest.split_once('/') {
                    Some((host, topic)) if !topic.is_empty() => {
                        format!("{}://{}/{}", http_scheme, host, topic)
                    }
                    // A bare topic goes to the public server
                    _ => format!("https://{}/{}", NTFY_DEFAULT_HOST, rest),
                };
                Ok(DeliveryTarget::Ntfy {
                    url: checked_url(&url)?,
                })
            }
            other => Err(NotifyError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Endpoint the request is sent to
    pub fn endpoint(&self) -> &str {
        match self {
            DeliveryTarget::Webhook { url } => url,
            DeliveryTarget::Discord { webhook_url } => webhook_url,
            DeliveryTarget::Pushover { .. } => PUSHOVER_API,
            DeliveryTarget::Ntfy { url } => url,
        }
    }

    /// Short label safe to log
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryTarget::Webhook { .. } => "webhook",
            DeliveryTarget::Discord { .. } => "discord",
            DeliveryTarget::Pushover { .. } => "pushover",
            DeliveryTarget::Ntfy { .. } => "ntfy",
        }
    }
}

fn checked_url(raw: &str) -> Result<String, NotifyError> {
    Url::parse(raw)
        .map(|u| u.to_string())
        .map_err(|e| NotifyError::InvalidTarget(format!("{}: {}", redact(raw), e)))
}

/// Keep only the scheme; target URLs carry secrets
pub fn redact(raw: &str) -> String {
    match raw.split_once("://") {
        Some((scheme, _)) => format!("{}://***", scheme),
        None => "***".to_string(),
    }
}
