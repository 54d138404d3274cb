use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::error::RepurposeError;

/// HTTP client restricted to the oracle hosts the pipeline talks to.
///
/// Every oracle client goes through this so a prompt-injected or malformed
/// URL can never reach an arbitrary host. Per-call timeouts are set by the
/// caller on the returned builder; the client-wide timeout is a ceiling.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

const DEFAULT_ALLOWLIST: &[&str] = &[
    "export.arxiv.org",          // arXiv
    "www.ebi.ac.uk",             // Europe PMC
    "search.rcsb.org",           // PDB search
    "data.rcsb.org",             // PDB metadata
    "files.rcsb.org",            // PDB downloads
    "pubchem.ncbi.nlm.nih.gov",  // PubChem
    "api.runpod.ai",             // docking
    "api.perplexity.ai",
    "api.openai.com",
    "api.anthropic.com",
    "localhost",
    "127.0.0.1",
];

impl SandboxClient {
    pub fn new() -> Result<Self, RepurposeError> {
        Self::with_timeout(Duration::from_secs(120))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, RepurposeError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("repurpose/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepurposeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            allowlist: DEFAULT_ALLOWLIST.iter().map(|d| d.to_string()).collect(),
        })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Allow the host of `url`, e.g. a configured OpenAI-compatible base URL.
    pub fn allow_url_host(&mut self, url: &str) -> Result<(), RepurposeError> {
        let parsed = Url::parse(url)
            .map_err(|e| RepurposeError::Config(format!("Invalid URL {url}: {e}")))?;
        match parsed.host_str() {
            Some(host) => {
                self.allow_domain(host);
                Ok(())
            }
            None => Err(RepurposeError::Config(format!("URL has no host: {url}"))),
        }
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    fn check(&self, url: &str) -> Result<(), RepurposeError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            Err(RepurposeError::SecurityError(format!(
                "Host not in allowlist for URL {}",
                url
            )))
        }
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, RepurposeError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, RepurposeError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist() {
        let client = SandboxClient::new().unwrap();
        assert!(client.is_allowed("https://pubchem.ncbi.nlm.nih.gov/rest/pug/compound/cid/1/JSON"));
        assert!(client.is_allowed("https://api.runpod.ai/v2/abc/run"));
        assert!(!client.is_allowed("https://evil.example.com/"));
        assert!(!client.is_allowed("not a url"));
        assert!(client.get("https://evil.example.com/").is_err());
    }

    #[test]
    fn test_allow_url_host() {
        let mut client = SandboxClient::new().unwrap();
        client.allow_url_host("https://llm.internal.test/v1").unwrap();
        assert!(client.is_allowed("https://llm.internal.test/v1/chat/completions"));
        assert!(client.allow_url_host("::nope").is_err());
    }
}
