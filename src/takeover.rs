// src/takeover.rs
use crate::error::Result;
use crate::types::{SubcollectorError, SubdomainResult};
use reqwest::Client;
use std::time::Duration;

/// Response-body fingerprints of deprovisioned services, checked in this
/// order. The first hit wins, so more specific patterns must come before
/// broader ones that share text with them.
pub const TAKEOVER_FINGERPRINTS: &[(&str, &str)] = &[
    // Cloud storage. S3-compatible stores (Google Cloud Storage, DigitalOcean
    // Spaces, Alibaba OSS, Tencent COS, IBM COS) answer with the same two
    // bodies and are reported as aws/aws_s3.
    ("aws", "NoSuchBucket"),
    ("aws_s3", "The specified bucket does not exist"),
    ("azure_blob", "404 The specified container does not exist"),
    ("azure", "The specified container does not exist"),
    ("backblaze_b2", "No such bucket"),
    ("oracle_cloud", "The bucket does not exist."),
    // Hosting platforms
    ("github", "There isn't a GitHub Pages site here"),
    ("github_pages", "Page not found"),
    ("heroku", "No such app"),
    ("pantheon", "The gods are wise, but do not know of this site"),
    ("acquia", "The site you were looking for couldn't be found"),
    ("ghost", "The thing you were looking for is no longer here, or never was"),
    ("netlify", "Not found - Request ID"),
    ("vercel", "The deployment could not be found"),
    ("firebase", "This site is not currently connected to Firebase"),
    // E-commerce
    ("shopify", "Sorry, this shop is currently unavailable"),
    ("bigcommerce", "This store is unavailable"),
    ("wix", "This domain is registered, but the owner hasn't connected it to a Wix site yet"),
    ("squarespace", "You're in the right place, but we can't find the page you're looking for"),
    // CDNs
    ("fastly", "Fastly error: unknown domain"),
    ("cloudfront", "The request could not be satisfied"),
    ("akamai", "Reference"),
    ("cloudflare", "DNS points to prohibited IP"),
    // CMS
    ("wordpress", "Do you want to register"),
    ("drupal", "The requested page could not be found"),
    ("joomla", "It looks like there's a server configuration issue"),
    // Productivity and support
    ("teamwork", "Oops - We didn't find your site"),
    ("helpjuice", "We could not find what you're looking for"),
    ("helpscout", "No settings were found for this company"),
    ("zendesk", "Help Center Closed"),
    ("freshdesk", "Oops, this help center doesn't exist"),
    ("intercom", "This page is reserved for"),
    // Miscellaneous
    ("cargo", "The specified Cargo site could not be found"),
    ("feedpress", "The feed has not been found"),
    ("surge", "project not found"),
    ("webflow", "The page you are looking for doesn't exist or has been moved"),
    ("jazzhr", "This account no longer active"),
    ("statuspage", "You are being redirected"),
    ("uservoice", "This UserVoice subdomain is currently available"),
    ("thinkific", "You may have typed the address incorrectly"),
    ("canny", "Company Not Found"),
    ("pingdom", "Sorry, couldn't find the status page"),
    ("tilda", "Please renew your subscription"),
    ("unbounce", "The requested URL was not found on this server"),
    ("smartjob", "Job Board Is Unavailable"),
    ("readme", "Project doesnt exist... yet!"),
    ("getresponse", "This landing page is unavailable or doesn't exist"),
];

/// First service whose fingerprint appears in `body`.
pub fn match_fingerprint(body: &str) -> Option<&'static str> {
    TAKEOVER_FINGERPRINTS
        .iter()
        .find(|(_, pattern)| body.contains(pattern))
        .map(|(service, _)| *service)
}

#[derive(Debug, Clone)]
pub struct TakeoverDetector {
    client: Client,
}

impl TakeoverDetector {
    pub const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(proxy: Option<&str>, user_agent: &str) -> Result<Self> {
        Self::with_timeout(proxy, user_agent, Self::TIMEOUT)
    }

    pub fn with_timeout(proxy: Option<&str>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .deflate(true);

        if let Some(proxy_url) = proxy.filter(|p| !p.trim().is_empty()) {
            url::Url::parse(proxy_url)
                .map_err(|e| SubcollectorError::ProxyConfig(format!("{}: {}", proxy_url, e)))?;
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| SubcollectorError::ProxyConfig(format!("{}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            SubcollectorError::ConfigError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self { client })
    }

    /// Fetches `http://<subdomain>` once and records the first matching
    /// service. Transport or body errors leave the result untouched.
    pub async fn check(&self, result: &mut SubdomainResult) {
        let url = format!("http://{}", result.subdomain);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(_) => return,
        };
        let body = match response.text().await {
            Ok(body) => body,
            Err(_) => return,
        };

        if let Some(service) = match_fingerprint(&body) {
            result.takeover = Some(service.to_string());
        }
    }
}
