//! Supply-chain exposure: intersect known per-country risks with the
//! countries and regions a supply chain touches, then ask the model for
//! mitigation options.
//!
//! A known risk applies to the chain when its country names one of the
//! chain's locations directly, or names the geographic region one of those
//! locations belongs to ("Europe" matches a chain running through Germany).

use crate::llm::{ChatBackend, LlmError};
use crate::models::ActionTable;
use crate::utils::strip_code_fence;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum SupplyError {
    #[error("failed to read input table: {0}")]
    Io(#[from] std::io::Error),
    #[error("input table is not valid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("mitigation reply was not a delimited table")]
    ReplyShape,
}

/// One site of the supply chain; only the location column is consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct SupplySite {
    pub location: String,
}

/// One known risk, keyed by country or region name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KnownRisk {
    pub country: String,
    pub risk: String,
}

/// UN geoscheme region for the countries that show up in supply chains.
static COUNTRY_REGIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("austria", "Europe"),
        ("belgium", "Europe"),
        ("czechia", "Europe"),
        ("denmark", "Europe"),
        ("finland", "Europe"),
        ("france", "Europe"),
        ("germany", "Europe"),
        ("greece", "Europe"),
        ("hungary", "Europe"),
        ("ireland", "Europe"),
        ("italy", "Europe"),
        ("netherlands", "Europe"),
        ("norway", "Europe"),
        ("poland", "Europe"),
        ("portugal", "Europe"),
        ("romania", "Europe"),
        ("slovakia", "Europe"),
        ("spain", "Europe"),
        ("sweden", "Europe"),
        ("switzerland", "Europe"),
        ("ukraine", "Europe"),
        ("united kingdom", "Europe"),
        ("bangladesh", "Asia"),
        ("china", "Asia"),
        ("india", "Asia"),
        ("indonesia", "Asia"),
        ("israel", "Asia"),
        ("japan", "Asia"),
        ("malaysia", "Asia"),
        ("philippines", "Asia"),
        ("saudi arabia", "Asia"),
        ("singapore", "Asia"),
        ("south korea", "Asia"),
        ("taiwan", "Asia"),
        ("thailand", "Asia"),
        ("turkey", "Asia"),
        ("vietnam", "Asia"),
        ("egypt", "Africa"),
        ("ethiopia", "Africa"),
        ("kenya", "Africa"),
        ("morocco", "Africa"),
        ("nigeria", "Africa"),
        ("south africa", "Africa"),
        ("argentina", "Americas"),
        ("brazil", "Americas"),
        ("canada", "Americas"),
        ("chile", "Americas"),
        ("colombia", "Americas"),
        ("mexico", "Americas"),
        ("peru", "Americas"),
        ("united states", "Americas"),
        ("australia", "Oceania"),
        ("new zealand", "Oceania"),
    ])
});

/// Look up the region a country belongs to. Case-insensitive.
pub fn region_of(country: &str) -> Option<&'static str> {
    COUNTRY_REGIONS.get(country.to_lowercase().as_str()).copied()
}

/// Read the supply-chain table (`location` column required).
pub fn read_supply_chain(path: &Path) -> Result<Vec<SupplySite>, SupplyError> {
    let mut reader = csv::Reader::from_path(path)?;
    let sites = reader
        .deserialize::<SupplySite>()
        .collect::<Result<Vec<SupplySite>, csv::Error>>()?;
    info!(count = sites.len(), "Read supply chain table");
    Ok(sites)
}

/// Read the known-risks table (`country` and `risk` columns required).
pub fn read_known_risks(path: &Path) -> Result<Vec<KnownRisk>, SupplyError> {
    let mut reader = csv::Reader::from_path(path)?;
    let risks = reader
        .deserialize::<KnownRisk>()
        .collect::<Result<Vec<KnownRisk>, csv::Error>>()?;
    info!(count = risks.len(), "Read known risks table");
    Ok(risks)
}

/// Keep the known risks whose country matches a chain location directly or
/// names the region one of those locations belongs to.
#[instrument(level = "info", skip_all)]
pub fn intersect_risks(sites: &[SupplySite], known_risks: &[KnownRisk]) -> Vec<KnownRisk> {
    let countries: HashSet<String> = sites
        .iter()
        .map(|site| site.location.to_lowercase())
        .collect();
    let regions: HashSet<String> = countries
        .iter()
        .filter_map(|country| region_of(country))
        .map(str::to_lowercase)
        .collect();

    let matched: Vec<KnownRisk> = known_risks
        .iter()
        .filter(|known| {
            let key = known.country.to_lowercase();
            countries.contains(&key) || regions.contains(&key)
        })
        .cloned()
        .collect();
    info!(
        matched = matched.len(),
        out_of = known_risks.len(),
        "Intersected known risks with supply chain"
    );
    matched
}

fn mitigation_prompt(risks: &[KnownRisk]) -> String {
    let mut listing = String::from("country;risk\n");
    for known in risks {
        listing.push_str(&known.country);
        listing.push(';');
        listing.push_str(&known.risk);
        listing.push('\n');
    }
    format!(
        "Based on the following list of risk factors per country in a supply chain, \
         suggest [alternative routes, explanations] for all countries mentioned in the \
         list. Only mention countries that are near to the countries that are mentioned. \
         suggest alternative trade routes and countries per risk element and explain why. \
         respond only in csv format with ; as separator. \n {listing}"
    )
}

/// Parse a `;`-delimited reply into a header row plus data rows.
pub fn parse_action_table(reply: &str) -> Result<ActionTable, SupplyError> {
    let cleaned = strip_code_fence(reply);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(cleaned.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|_| SupplyError::ReplyShape)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.len() < 2 {
        return Err(SupplyError::ReplyShape);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|_| SupplyError::ReplyShape)?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    if rows.is_empty() {
        return Err(SupplyError::ReplyShape);
    }
    Ok(ActionTable { headers, rows })
}

/// Ask the model for mitigation options for the matched risks.
#[instrument(level = "info", skip_all, fields(risks = risks.len()))]
pub async fn action_items<B>(backend: &B, risks: &[KnownRisk]) -> Result<ActionTable, SupplyError>
where
    B: ChatBackend<Response = String>,
{
    let prompt = mitigation_prompt(risks);
    let reply = backend.complete(&prompt).await?;
    let table = parse_action_table(&reply);
    if table.is_err() {
        warn!("Mitigation reply did not parse as a delimited table");
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn site(location: &str) -> SupplySite {
        SupplySite {
            location: location.to_string(),
        }
    }

    fn known(country: &str, risk: &str) -> KnownRisk {
        KnownRisk {
            country: country.to_string(),
            risk: risk.to_string(),
        }
    }

    #[test]
    fn test_region_lookup_is_case_insensitive() {
        assert_eq!(region_of("Germany"), Some("Europe"));
        assert_eq!(region_of("taiwan"), Some("Asia"));
        assert_eq!(region_of("Atlantis"), None);
    }

    #[test]
    fn test_intersect_matches_direct_country() {
        let sites = [site("Germany"), site("Taiwan")];
        let risks = [known("Germany", "sanctions"), known("Brazil", "flooding")];
        let matched = intersect_risks(&sites, &risks);
        assert_eq!(matched, vec![known("Germany", "sanctions")]);
    }

    #[test]
    fn test_intersect_matches_region_of_a_site() {
        let sites = [site("Germany")];
        let risks = [known("Europe", "regulatory changes"), known("Asia", "conflicts")];
        let matched = intersect_risks(&sites, &risks);
        assert_eq!(matched, vec![known("Europe", "regulatory changes")]);
    }

    #[test]
    fn test_intersect_keeps_nothing_on_miss() {
        let sites = [site("Chile")];
        let risks = [known("Asia", "conflicts"), known("Norway", "strikes")];
        assert!(intersect_risks(&sites, &risks).is_empty());
    }

    #[test]
    fn test_parse_action_table_reads_headers_and_rows() {
        let reply = "country;alternative;why\nGermany;Rotterdam reroute;port capacity\n";
        let table = parse_action_table(reply).unwrap();
        assert_eq!(table.headers, vec!["country", "alternative", "why"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][1], "Rotterdam reroute");
    }

    #[test]
    fn test_parse_action_table_tolerates_code_fences() {
        let reply = "```csv\ncountry;alternative\nGermany;Rail via Poland\n```";
        let table = parse_action_table(reply).unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_parse_action_table_rejects_prose() {
        assert!(parse_action_table("Sorry, I cannot produce a table.").is_err());
    }

    #[derive(Debug)]
    struct ScriptedBackend {
        replies: Mutex<Vec<String>>,
    }

    impl ChatBackend for ScriptedBackend {
        type Response = String;

        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            let mut replies = self.replies.lock().unwrap();
            Ok(replies.remove(0))
        }
    }

    #[tokio::test]
    async fn test_action_items_end_to_end() {
        let backend = ScriptedBackend {
            replies: Mutex::new(vec![
                "country;alternative\nGermany;Route via Rotterdam\n".to_string(),
            ]),
        };
        let risks = [known("Germany", "sanctions")];
        let table = action_items(&backend, &risks).await.unwrap();
        assert_eq!(table.headers, vec!["country", "alternative"]);
        assert_eq!(table.rows[0][0], "Germany");
    }

    #[test]
    fn test_mitigation_prompt_embeds_the_risk_listing() {
        let prompt = mitigation_prompt(&[known("Germany", "sanctions")]);
        assert!(prompt.contains("country;risk"));
        assert!(prompt.contains("Germany;sanctions"));
    }
}
