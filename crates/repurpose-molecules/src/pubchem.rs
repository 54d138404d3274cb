//! PubChem small-molecule lookup and 3-D similarity search.
//!
//! Endpoint: https://pubchem.ncbi.nlm.nih.gov/rest/pug

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use repurpose_common::SandboxClient as Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

const PUBCHEM_BASE: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";
const PROPERTIES: &str = "IsomericSMILES,CanonicalSMILES,IUPACName,MolecularFormula";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);
const SIMILARITY_TIMEOUT: Duration = Duration::from_secs(60);
const BATCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between consecutive requests, per PubChem's usage policy.
const PUBCHEM_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    pub cid: u64,
    pub smiles: String,
    pub iupac_name: String,
    pub molecular_formula: String,
}

/// Small-molecule database.
#[async_trait]
pub trait CompoundSource: Send + Sync {
    /// Look up one exact name. `Ok(None)` when the name is unknown.
    async fn lookup_name(&self, name: &str) -> Result<Option<Compound>>;

    async fn lookup_cid(&self, cid: u64) -> Result<Option<Compound>>;

    /// Compounds 3-D-similar to `cid`, at most `max_results`.
    async fn similar_3d(&self, cid: u64, max_results: usize) -> Result<Vec<Compound>>;

    /// Delay between consecutive name variants.
    fn pacing(&self) -> Duration {
        Duration::ZERO
    }
}

// ── Name resolution ───────────────────────────────────────────────────────────

fn parenthetical_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(.*?\)\s*").unwrap())
}

fn parenthetical_content_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^)]+)\)").unwrap())
}

fn first_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s,;(/-]+").unwrap())
}

fn cid_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^CID_(\d+)$").unwrap())
}

/// Name variants tried in order: full name, parentheticals stripped,
/// first parenthetical's content, first token (only if longer than 3 chars).
pub fn name_variants(name: &str) -> Vec<String> {
    let name = name.trim();
    let mut variants = vec![name.to_string()];
    let mut push = |v: String| {
        if !v.is_empty() && !variants.contains(&v) {
            variants.push(v);
        }
    };

    push(parenthetical_regex().replace_all(name, " ").trim().to_string());

    if let Some(inner) = parenthetical_content_regex().captures(name).and_then(|c| c.get(1)) {
        push(inner.as_str().trim().to_string());
    }

    if let Some(first) = first_token_regex().split(name).next() {
        if first.chars().count() > 3 {
            push(first.to_string());
        }
    }

    variants
}

/// `CID_<n>` names refer to a compound id directly.
pub fn parse_cid_name(name: &str) -> Option<u64> {
    cid_name_regex()
        .captures(name.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Resolve a drug name to a compound, stopping at the first variant that
/// succeeds. Lookup errors count as misses.
pub async fn resolve_name(source: &dyn CompoundSource, name: &str) -> Option<Compound> {
    if name.trim().is_empty() {
        return None;
    }
    if let Some(cid) = parse_cid_name(name) {
        return match source.lookup_cid(cid).await {
            Ok(found) => found,
            Err(e) => {
                warn!(cid, error = %e, "PubChem CID lookup failed");
                None
            }
        };
    }

    let variants = name_variants(name);
    for (i, variant) in variants.iter().enumerate() {
        if i > 0 && !source.pacing().is_zero() {
            tokio::time::sleep(source.pacing()).await;
        }
        match source.lookup_name(variant).await {
            Ok(Some(compound)) => {
                debug!(drug = name, variant = %variant, cid = compound.cid, "Resolved compound");
                return Some(compound);
            }
            Ok(None) => {}
            Err(e) => warn!(variant = %variant, error = %e, "PubChem lookup failed"),
        }
    }
    debug!(drug = name, tried = variants.len(), "No compound found");
    None
}

// ── PubChem client ────────────────────────────────────────────────────────────

pub struct PubChemClient {
    client: Client,
}

impl PubChemClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// GET a property table; 404 means "no such compound".
    async fn properties(&self, url: &str, timeout: Duration) -> Result<Vec<Compound>> {
        let resp = self.client.get(url)?.timeout(timeout).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let json: serde_json::Value = resp.error_for_status()?.json().await?;
        Ok(parse_property_table(&json))
    }
}

fn smiles_of(props: &serde_json::Value) -> String {
    ["CanonicalSMILES", "IsomericSMILES", "ConnectivitySMILES", "SMILES"]
        .iter()
        .find_map(|k| props[*k].as_str().filter(|s| !s.is_empty()))
        .unwrap_or("")
        .to_string()
}

/// Rows without a structure string are dropped.
fn parse_property_table(json: &serde_json::Value) -> Vec<Compound> {
    json["PropertyTable"]["Properties"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|p| {
                    let smiles = smiles_of(p);
                    if smiles.is_empty() {
                        return None;
                    }
                    Some(Compound {
                        cid: p["CID"].as_u64()?,
                        smiles,
                        iupac_name: p["IUPACName"].as_str().unwrap_or("").to_string(),
                        molecular_formula: p["MolecularFormula"].as_str().unwrap_or("").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn name_url(name: &str) -> Result<String> {
    let mut url = url::Url::parse(PUBCHEM_BASE)?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("PubChem base URL cannot take path segments"))?
        .extend(["compound", "name", name.trim(), "property", PROPERTIES, "JSON"]);
    Ok(url.to_string())
}

#[async_trait]
impl CompoundSource for PubChemClient {
    #[instrument(skip(self))]
    async fn lookup_name(&self, name: &str) -> Result<Option<Compound>> {
        let url = name_url(name)?;
        Ok(self.properties(&url, LOOKUP_TIMEOUT).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn lookup_cid(&self, cid: u64) -> Result<Option<Compound>> {
        let url = format!("{PUBCHEM_BASE}/compound/cid/{cid}/property/{PROPERTIES}/JSON");
        Ok(self.properties(&url, LOOKUP_TIMEOUT).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn similar_3d(&self, cid: u64, max_results: usize) -> Result<Vec<Compound>> {
        let url = format!("{PUBCHEM_BASE}/compound/fastsimilarity_3d/cid/{cid}/cids/JSON");
        let resp = self.client.get(&url)?.timeout(SIMILARITY_TIMEOUT).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let json: serde_json::Value = resp.error_for_status()?.json().await?;
        let cids: Vec<String> = json["IdentifierList"]["CID"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_u64())
                    .take(max_results)
                    .map(|c| c.to_string())
                    .collect()
            })
            .unwrap_or_default();
        if cids.is_empty() {
            return Ok(Vec::new());
        }

        tokio::time::sleep(PUBCHEM_DELAY).await;
        let url = format!("{PUBCHEM_BASE}/compound/cid/{}/property/{PROPERTIES}/JSON", cids.join(","));
        let compounds = self.properties(&url, BATCH_TIMEOUT).await?;
        debug!(seed = cid, count = compounds.len(), "3-D similarity search returned compounds");
        Ok(compounds)
    }

    fn pacing(&self) -> Duration {
        PUBCHEM_DELAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_variants_parenthetical() {
        assert_eq!(
            name_variants("Sotorasib (AMG 510)"),
            ["Sotorasib (AMG 510)", "Sotorasib", "AMG 510"]
        );
    }

    #[test]
    fn test_name_variants_first_token() {
        assert_eq!(
            name_variants("Erlotinib hydrochloride"),
            ["Erlotinib hydrochloride", "Erlotinib"]
        );
        // Short first tokens are not tried on their own
        assert_eq!(name_variants("5-FU prodrug"), ["5-FU prodrug"]);
        assert_eq!(name_variants("Metformin"), ["Metformin"]);
    }

    #[test]
    fn test_parse_cid_name() {
        assert_eq!(parse_cid_name("CID_2244"), Some(2244));
        assert_eq!(parse_cid_name("CID_abc"), None);
        assert_eq!(parse_cid_name("Aspirin"), None);
    }

    #[test]
    fn test_smiles_key_precedence() {
        let table = serde_json::json!({"PropertyTable": {"Properties": [
            {"CID": 1, "IsomericSMILES": "C[C@H]O", "ConnectivitySMILES": "CCO"},
            {"CID": 2, "SMILES": "CCN", "IUPACName": "ethanamine"},
            {"CID": 3, "IUPACName": "nothing"}
        ]}});
        let compounds = parse_property_table(&table);
        assert_eq!(compounds.len(), 2);
        assert_eq!(compounds[0].smiles, "C[C@H]O");
        assert_eq!(compounds[1].smiles, "CCN");
        assert_eq!(compounds[1].iupac_name, "ethanamine");
    }

    #[test]
    fn test_name_url_encodes_segments() {
        let url = name_url("Drug/With Space").unwrap();
        assert!(url.contains("/compound/name/Drug%2FWith%20Space/property/"));
    }
}
