//! Europe PMC REST API client.
//!
//! Endpoint: https://www.ebi.ac.uk/europepmc/webservices/rest/search

use std::time::Duration;

use async_trait::async_trait;
use repurpose_common::SandboxClient as Client;
use tracing::{debug, instrument};

use crate::models::{Paper, PaperSource};
use super::LiteratureSource;

const EPMC_SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EuropePmcClient {
    client: Client,
}

impl EuropePmcClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LiteratureSource for EuropePmcClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<Paper>> {
        let page_size = max_results.to_string();
        let params = [
            ("query", query),
            ("resultType", "core"),
            ("pageSize", page_size.as_str()),
            ("format", "json"),
        ];

        let resp = self.client
            .get(EPMC_SEARCH_URL)?
            .query(&params)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        let papers = parse_results(&resp);
        debug!(count = papers.len(), "Europe PMC search returned results");
        Ok(papers)
    }

    fn name(&self) -> &'static str {
        "europepmc"
    }
}

fn parse_results(resp: &serde_json::Value) -> Vec<Paper> {
    let Some(results) = resp["resultList"]["result"].as_array() else {
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|r| {
            let id = r["pmcid"].as_str()
                .or_else(|| r["pmid"].as_str())
                .or_else(|| r["doi"].as_str())
                .or_else(|| r["id"].as_str())?
                .to_string();
            let title = r["title"].as_str().unwrap_or("").trim().to_string();
            if title.is_empty() {
                return None;
            }
            let authors = r["authorList"]["author"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(|a| a["fullName"].as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();

            Some(Paper {
                link: r["doi"].as_str().map(|doi| format!("https://doi.org/{doi}")),
                id,
                title,
                summary: r["abstractText"].as_str().unwrap_or("").to_string(),
                authors,
                published: r["firstPublicationDate"].as_str().map(String::from),
                source: PaperSource::EuropePmc,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results() {
        let resp = serde_json::json!({
            "resultList": {"result": [
                {
                    "pmid": "38000001",
                    "doi": "10.1000/xyz",
                    "title": "Metformin and AMPK in glioma",
                    "abstractText": "Abstract text.",
                    "firstPublicationDate": "2023-11-20",
                    "authorList": {"author": [{"fullName": "Doe J"}, {"fullName": "Roe R"}]}
                },
                {"pmid": "38000002", "title": ""}
            ]}
        });
        let papers = parse_results(&resp);
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].id, "38000001");
        assert_eq!(papers[0].authors, ["Doe J", "Roe R"]);
        assert_eq!(papers[0].link.as_deref(), Some("https://doi.org/10.1000/xyz"));
    }

    #[test]
    fn test_missing_result_list() {
        assert!(parse_results(&serde_json::json!({"hitCount": 0})).is_empty());
    }
}
