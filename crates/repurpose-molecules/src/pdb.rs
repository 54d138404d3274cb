//! RCSB PDB structure search, metadata and download.

use std::cmp::Ordering;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine as _;
use futures::future::join_all;
use repurpose_common::SandboxClient as Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

const PDB_SEARCH_URL: &str = "https://search.rcsb.org/rcsbsearch/v2/query";
const PDB_DATA_URL: &str = "https://data.rcsb.org/rest/v1/core/entry";
const PDB_DOWNLOAD_URL: &str = "https://files.rcsb.org/download";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const METADATA_TIMEOUT: Duration = Duration::from_secs(15);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_SEARCH_ROWS: usize = 10;
/// Only this many raw hits are enriched with metadata before ranking.
pub const ENRICHED_HITS: usize = 5;
/// Sort key for entries without a reported resolution.
const UNKNOWN_RESOLUTION: f64 = 999.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureHit {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureMetadata {
    /// Ångström; lower is sharper.
    pub resolution: Option<f64>,
    /// The entry contains at least one bound small molecule.
    pub has_ligands: bool,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedStructure {
    pub hit: StructureHit,
    pub metadata: StructureMetadata,
}

/// Protein-structure database.
#[async_trait]
pub trait StructureSource: Send + Sync {
    async fn search(&self, protein: &str, max_results: usize) -> Result<Vec<StructureHit>>;
    async fn metadata(&self, id: &str) -> Result<StructureMetadata>;
    /// Base64-encoded structure file, or `None` if no format could be fetched.
    async fn download(&self, id: &str) -> Result<Option<String>>;
}

// ── Selection ─────────────────────────────────────────────────────────────────

fn compare_candidates(a: &RankedStructure, b: &RankedStructure) -> Ordering {
    b.metadata.has_ligands
        .cmp(&a.metadata.has_ligands)
        .then_with(|| {
            let ra = a.metadata.resolution.unwrap_or(UNKNOWN_RESOLUTION);
            let rb = b.metadata.resolution.unwrap_or(UNKNOWN_RESOLUTION);
            ra.total_cmp(&rb)
        })
}

/// Ligand-bound entries first, then lowest resolution. Stable.
pub fn rank_candidates(candidates: &mut [RankedStructure]) {
    candidates.sort_by(compare_candidates);
}

/// Enrich the first [`ENRICHED_HITS`] hits with metadata and return the best.
///
/// A failed metadata lookup leaves that hit with empty metadata; it can
/// still win if nothing better is available.
pub async fn pick_best(source: &dyn StructureSource, hits: &[StructureHit]) -> Option<RankedStructure> {
    let lookups = hits.iter().take(ENRICHED_HITS).map(|hit| async move {
        let metadata = match source.metadata(&hit.id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(id = %hit.id, error = %e, "PDB metadata lookup failed");
                StructureMetadata::default()
            }
        };
        RankedStructure { hit: hit.clone(), metadata }
    });
    let mut enriched = join_all(lookups).await;
    rank_candidates(&mut enriched);
    enriched.into_iter().next()
}

/// Search by full protein name, falling back to the first whitespace token.
pub async fn search_with_fallback(source: &dyn StructureSource, protein: &str) -> Vec<StructureHit> {
    let hits = search_or_empty(source, protein).await;
    if !hits.is_empty() {
        return hits;
    }
    match protein.split_whitespace().next() {
        Some(gene) if gene != protein.trim() => {
            debug!(protein, gene, "No PDB hits for full name, retrying with first token");
            search_or_empty(source, gene).await
        }
        _ => hits,
    }
}

async fn search_or_empty(source: &dyn StructureSource, query: &str) -> Vec<StructureHit> {
    match source.search(query, DEFAULT_SEARCH_ROWS).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(query, error = %e, "PDB search failed");
            Vec::new()
        }
    }
}

// ── RCSB client ───────────────────────────────────────────────────────────────

pub struct RcsbClient {
    client: Client,
}

impl RcsbClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn search_body(protein: &str, rows: usize) -> serde_json::Value {
    serde_json::json!({
        "query": {
            "type": "group",
            "logical_operator": "and",
            "nodes": [
                {
                    "type": "terminal",
                    "service": "full_text",
                    "parameters": { "value": protein }
                },
                {
                    "type": "terminal",
                    "service": "text",
                    "parameters": {
                        "attribute": "rcsb_entity_source_organism.ncbi_scientific_name",
                        "operator": "exact_match",
                        "value": "Homo sapiens"
                    }
                },
                {
                    "type": "terminal",
                    "service": "text",
                    "parameters": {
                        "attribute": "exptl.method",
                        "operator": "exact_match",
                        "value": "X-RAY DIFFRACTION"
                    }
                },
                {
                    "type": "terminal",
                    "service": "text",
                    "parameters": {
                        "attribute": "rcsb_entry_info.resolution_combined",
                        "operator": "less",
                        "value": 3.0
                    }
                }
            ]
        },
        "return_type": "entry",
        "request_options": {
            "sort": [{ "sort_by": "rcsb_entry_info.resolution_combined", "direction": "asc" }],
            "results_content_type": ["experimental"],
            "paginate": { "start": 0, "rows": rows }
        }
    })
}

fn parse_search(json: &serde_json::Value) -> Vec<StructureHit> {
    json["result_set"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|r| {
                    Some(StructureHit {
                        id: r["identifier"].as_str()?.to_string(),
                        score: r["score"].as_f64().unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_metadata(json: &serde_json::Value) -> StructureMetadata {
    let info = &json["rcsb_entry_info"];
    StructureMetadata {
        resolution: info["resolution_combined"][0].as_f64(),
        has_ligands: info["nonpolymer_entity_count"].as_u64().unwrap_or(0) > 0,
        title: json["struct"]["title"].as_str().unwrap_or("").to_string(),
    }
}

#[async_trait]
impl StructureSource for RcsbClient {
    #[instrument(skip(self))]
    async fn search(&self, protein: &str, max_results: usize) -> Result<Vec<StructureHit>> {
        let resp = self.client
            .post(PDB_SEARCH_URL)?
            .timeout(SEARCH_TIMEOUT)
            .json(&search_body(protein, max_results))
            .send()
            .await?;
        // RCSB answers 204 No Content when nothing matches
        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let json: serde_json::Value = resp.error_for_status()?.json().await?;
        let hits = parse_search(&json);
        debug!(count = hits.len(), "PDB search returned hits");
        Ok(hits)
    }

    #[instrument(skip(self))]
    async fn metadata(&self, id: &str) -> Result<StructureMetadata> {
        let url = format!("{}/{}", PDB_DATA_URL, id);
        let json: serde_json::Value = self.client
            .get(&url)?
            .timeout(METADATA_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_metadata(&json))
    }

    #[instrument(skip(self))]
    async fn download(&self, id: &str) -> Result<Option<String>> {
        let upper = id.to_uppercase();
        for ext in ["pdb", "cif"] {
            let url = format!("{}/{}.{}", PDB_DOWNLOAD_URL, upper, ext);
            let resp = match self.client.get(&url)?.timeout(DOWNLOAD_TIMEOUT).send().await {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    debug!(url = %url, status = %r.status(), "PDB download format unavailable");
                    continue;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "PDB download failed");
                    continue;
                }
            };
            let bytes = resp.bytes().await?;
            info!(id = %upper, format = ext, bytes = bytes.len(), "Downloaded structure");
            return Ok(Some(base64::engine::general_purpose::STANDARD.encode(&bytes)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(id: &str, has_ligands: bool, resolution: Option<f64>) -> RankedStructure {
        RankedStructure {
            hit: StructureHit { id: id.into(), score: 1.0 },
            metadata: StructureMetadata { resolution, has_ligands, title: String::new() },
        }
    }

    #[test]
    fn test_ligand_bound_beats_sharper_apo() {
        let mut c = vec![
            ranked("APO", false, Some(1.1)),
            ranked("HOLO_LOW", true, Some(2.4)),
            ranked("HOLO_HIGH", true, Some(1.8)),
            ranked("HOLO_UNKNOWN", true, None),
        ];
        rank_candidates(&mut c);
        let ids: Vec<_> = c.iter().map(|r| r.hit.id.as_str()).collect();
        assert_eq!(ids, ["HOLO_HIGH", "HOLO_LOW", "HOLO_UNKNOWN", "APO"]);
    }

    #[test]
    fn test_parse_search_and_metadata() {
        let hits = parse_search(&serde_json::json!({
            "result_set": [{"identifier": "1M17", "score": 1.0}, {"score": 0.5}]
        }));
        assert_eq!(hits, vec![StructureHit { id: "1M17".into(), score: 1.0 }]);

        let meta = parse_metadata(&serde_json::json!({
            "rcsb_entry_info": {"resolution_combined": [2.6], "nonpolymer_entity_count": 2},
            "struct": {"title": "EGFR kinase domain with erlotinib"}
        }));
        assert_eq!(meta.resolution, Some(2.6));
        assert!(meta.has_ligands);

        assert_eq!(parse_metadata(&serde_json::json!({})), StructureMetadata::default());
    }

    #[test]
    fn test_search_body_filters() {
        let body = search_body("KRAS", 10);
        assert_eq!(body["request_options"]["paginate"]["rows"], 10);
        assert_eq!(body["query"]["nodes"][0]["parameters"]["value"], "KRAS");
        assert_eq!(body["query"]["nodes"][3]["parameters"]["value"], 3.0);
    }

    #[tokio::test]
    #[ignore] // requires network
    async fn test_live_download() {
        let client = RcsbClient::new(Client::new().unwrap());
        let blob = client.download("1CRN").await.unwrap();
        assert!(blob.is_some());
    }
}
