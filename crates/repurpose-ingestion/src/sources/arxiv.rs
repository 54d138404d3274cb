//! arXiv API client.
//!
//! Endpoint: https://export.arxiv.org/api/query (Atom feed)

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use repurpose_common::SandboxClient as Client;
use tracing::{debug, instrument, warn};

use crate::models::{Paper, PaperSource};
use super::LiteratureSource;

const ARXIV_QUERY_URL: &str = "https://export.arxiv.org/api/query";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ArxivClient {
    client: Client,
}

impl ArxivClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LiteratureSource for ArxivClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<Paper>> {
        let max = max_results.to_string();
        let params = [
            ("search_query", query),
            ("start", "0"),
            ("max_results", max.as_str()),
            ("sortBy", "relevance"),
            ("sortOrder", "descending"),
        ];

        let resp = self.client
            .get(ARXIV_QUERY_URL)?
            .query(&params)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let xml = resp.text().await?;

        let papers = parse_atom_feed(&xml);
        debug!(count = papers.len(), "arXiv search returned results");
        Ok(papers)
    }

    fn name(&self) -> &'static str {
        "arxiv"
    }

    fn scope(&self, expr: String) -> String {
        format!("all:{expr}")
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an arXiv Atom feed into papers. Malformed trailing XML ends the
/// parse but keeps the entries read so far.
fn parse_atom_feed(xml: &str) -> Vec<Paper> {
    let mut papers = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_entry = false;
    let mut in_author = false;
    let mut field = Field::None;
    let mut text = String::new();

    let mut id = String::new();
    let mut title = String::new();
    let mut summary = String::new();
    let mut published = String::new();
    let mut authors: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                match e.local_name().as_ref() {
                    b"entry" => {
                        in_entry = true;
                        id.clear();
                        title.clear();
                        summary.clear();
                        published.clear();
                        authors.clear();
                    }
                    b"author" if in_entry => in_author = true,
                    b"name" if in_author => field = Field::AuthorName,
                    b"id" if in_entry => field = Field::Id,
                    b"title" if in_entry => field = Field::Title,
                    b"summary" if in_entry => field = Field::Summary,
                    b"published" if in_entry => field = Field::Published,
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Text(ref e)) => {
                if field != Field::None {
                    match e.unescape() {
                        Ok(t) => text.push_str(&t),
                        Err(err) => warn!("arXiv feed text unescape failed: {}", err),
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                match e.local_name().as_ref() {
                    b"entry" => {
                        in_entry = false;
                        if title.is_empty() {
                            warn!("Skipping arXiv entry with empty title");
                            continue;
                        }
                        let arxiv_id = id.rsplit("/abs/").next().unwrap_or(&id).to_string();
                        papers.push(Paper {
                            id: arxiv_id,
                            title: collapse_whitespace(&title),
                            summary: collapse_whitespace(&summary),
                            authors: std::mem::take(&mut authors),
                            published: (!published.is_empty())
                                .then(|| published.chars().take(10).collect()),
                            link: (!id.is_empty()).then(|| id.clone()),
                            source: PaperSource::Arxiv,
                        });
                    }
                    b"author" => in_author = false,
                    _ => {
                        match field {
                            Field::Id => id = text.trim().to_string(),
                            Field::Title => title = text.trim().to_string(),
                            Field::Summary => summary = text.trim().to_string(),
                            Field::Published => published = text.trim().to_string(),
                            Field::AuthorName => authors.push(text.trim().to_string()),
                            Field::None => {}
                        }
                        field = Field::None;
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("arXiv XML parse error: {}", e);
                break;
            }
            _ => {}
        }
    }

    papers
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:KRAS</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2401.01234v2</id>
    <published>2024-01-03T18:00:00Z</published>
    <title>Docking screens of
      KRAS G12D inhibitors</title>
    <summary>  We screen approved drugs &amp; natural products.
    </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2312.99999v1</id>
    <published>2023-12-30T00:00:00Z</published>
    <title>Second paper</title>
    <summary>Short.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_atom_feed() {
        let papers = parse_atom_feed(FEED);
        assert_eq!(papers.len(), 2);
        let p = &papers[0];
        assert_eq!(p.id, "2401.01234v2");
        assert_eq!(p.title, "Docking screens of KRAS G12D inhibitors");
        assert_eq!(p.summary, "We screen approved drugs & natural products.");
        assert_eq!(p.published.as_deref(), Some("2024-01-03"));
        assert_eq!(p.authors, ["Ada Lovelace", "Alan Turing"]);
        assert!(papers[1].authors.is_empty());
    }

    #[test]
    fn test_feed_title_is_not_an_entry() {
        let papers = parse_atom_feed(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>Empty</title></feed>"#,
        );
        assert!(papers.is_empty());
    }

    #[test]
    fn test_queries_are_field_scoped() {
        let client = ArxivClient::new(Client::new().unwrap());
        let q = client.background_query("Glioblastoma");
        assert!(q.starts_with("all:(\"Glioblastoma\" AND (treatment OR therapy"));
    }

    #[tokio::test]
    #[ignore] // requires network
    async fn test_live_search() {
        let client = ArxivClient::new(Client::new().unwrap());
        let papers = client.search(&client.background_query("glioblastoma"), 3).await.unwrap();
        assert!(papers.len() <= 3);
    }
}
