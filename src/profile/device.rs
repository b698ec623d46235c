use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use super::{DeviceInfo, LoginInfo};

pub const UNKNOWN_IP: &str = "Unknown";
const IPIFY_URL: &str = "https://api.ipify.org?format=json";

// Checked in order; the first match wins.
static BROWSERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("Chrome", r"Chrome/([0-9.]+)"),
        ("Firefox", r"Firefox/([0-9.]+)"),
        ("Safari", r"Safari/([0-9.]+)"),
        ("Edge", r"Edge?/([0-9.]+)"),
        ("Opera", r"OPR/([0-9.]+)"),
        ("IE", r"Trident/([0-9.]+)"),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
    .collect()
});

pub fn detect_browser(user_agent: &str) -> String {
    BROWSERS
        .iter()
        .find_map(|(name, re)| {
            re.captures(user_agent).map(|caps| {
                let version = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                format!("{name} {version}")
            })
        })
        .unwrap_or_else(|| "Unknown Browser".to_string())
}

pub fn detect_os(user_agent: &str) -> String {
    let os = if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Macintosh") || user_agent.contains("Mac OS X") {
        "macOS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else if user_agent.contains("Android") {
        "Android"
    } else if ["iPhone", "iPad", "iPod"]
        .iter()
        .any(|needle| user_agent.contains(needle))
    {
        "iOS"
    } else {
        "Unknown OS"
    };
    os.to_string()
}

pub fn detect_device(user_agent: &str) -> String {
    let device = if user_agent.contains("Mobile") {
        "Mobile"
    } else if user_agent.contains("Tablet") || user_agent.contains("iPad") {
        "Tablet"
    } else {
        "Desktop"
    };
    device.to_string()
}

#[async_trait]
pub trait IpLookup: Send + Sync {
    /// Public address of this client. Never fails: lookups that go wrong
    /// report [`UNKNOWN_IP`].
    async fn public_ip(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct PublicIpLookup {
    client: Client,
}

impl PublicIpLookup {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .user_agent(format!("yoostream/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build IP lookup HTTP client")?;
        Ok(Self { client })
    }

    async fn fetch(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct IpResponse {
            ip: String,
        }

        let res = self
            .client
            .get(IPIFY_URL)
            .send()
            .await
            .context("IP lookup request failed")?
            .error_for_status()
            .context("IP lookup returned an error status")?;
        let body: IpResponse = res.json().await.context("Failed to parse IP lookup JSON")?;
        Ok(body.ip)
    }
}

#[async_trait]
impl IpLookup for PublicIpLookup {
    async fn public_ip(&self) -> String {
        match self.fetch().await {
            Ok(ip) => ip,
            Err(err) => {
                warn!("Error getting IP address: {:#}", err);
                UNKNOWN_IP.to_string()
            }
        }
    }
}

/// Fixed answer, for tests and for deployments that already know the address.
#[derive(Debug, Clone)]
pub struct StaticIpLookup(pub String);

#[async_trait]
impl IpLookup for StaticIpLookup {
    async fn public_ip(&self) -> String {
        self.0.clone()
    }
}

pub struct DeviceCollector {
    user_agent: String,
    ip: Box<dyn IpLookup>,
}

impl DeviceCollector {
    pub fn new(user_agent: impl Into<String>, ip: Box<dyn IpLookup>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ip,
        }
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            browser: detect_browser(&self.user_agent),
            os: detect_os(&self.user_agent),
            device: detect_device(&self.user_agent),
            user_agent: self.user_agent.clone(),
        }
    }

    pub async fn collect(&self) -> LoginInfo {
        LoginInfo {
            device_info: self.device_info(),
            ip_address: self.ip.public_ip().await,
        }
    }
}
