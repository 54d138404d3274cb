use std::sync::Mutex;

use async_trait::async_trait;
use repurpose_ingestion::{LiteratureSource, Paper, PaperSource};

pub fn paper(id: &str, title: &str) -> Paper {
    Paper {
        id: id.into(),
        title: title.into(),
        summary: format!("Abstract of {title}."),
        authors: vec!["A. Author".into()],
        published: Some("2024-01-01".into()),
        link: None,
        source: PaperSource::Arxiv,
    }
}

/// Literature source returning canned papers for queries containing a keyword.
#[derive(Default)]
pub struct MockLiterature {
    rules: Vec<(String, Vec<Paper>)>,
    failing: bool,
    queries: Mutex<Vec<String>>,
}

impl MockLiterature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every search fails.
    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub fn on(mut self, keyword: &str, papers: Vec<Paper>) -> Self {
        self.rules.push((keyword.to_lowercase(), papers));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiteratureSource for MockLiterature {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<Paper>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing {
            anyhow::bail!("literature service unreachable");
        }
        let q = query.to_lowercase();
        Ok(self
            .rules
            .iter()
            .find(|(k, _)| q.contains(k))
            .map(|(_, papers)| papers.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
