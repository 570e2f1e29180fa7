//! Acronym expansion applied to questions before retrieval

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crag_core::{Error, Result};

const DEFAULT_ACRONYMS: [(&str, &str); 14] = [
    ("bnpl", "buy now pay later"),
    ("apr", "annual percentage rate"),
    ("apy", "annual percentage yield"),
    ("cfpb", "consumer financial protection bureau"),
    ("atm", "automated teller machine"),
    ("ach", "automated clearing house"),
    ("p2p", "peer to peer"),
    ("fico", "fair isaac credit score"),
    ("ssn", "social security number"),
    ("eft", "electronic funds transfer"),
    ("kyc", "know your customer"),
    ("heloc", "home equity line of credit"),
    ("cd", "certificate of deposit"),
    ("id", "identification"),
];

/// Mapping from acronym to the phrase it stands for
///
/// Keys are matched case-insensitively. No expansion may contain a key, so
/// expanding an already expanded question changes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcronymTable {
    entries: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(transparent)]
struct AcronymFile(BTreeMap<String, String>);

impl AcronymTable {
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = BTreeMap::new();
        for (acronym, expansion) in entries {
            let key = acronym.as_ref().trim().to_lowercase();
            if key.is_empty() || key.split_whitespace().count() != 1 || peel(&key).1 != key {
                return Err(Error::InvalidInput(format!(
                    "acronym {:?} must be a single word without surrounding punctuation",
                    acronym.as_ref()
                )));
            }
            let expansion = expansion.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
            if expansion.is_empty() {
                return Err(Error::InvalidInput(format!("acronym {:?} has an empty expansion", key)));
            }
            table.insert(key, expansion);
        }

        for (key, expansion) in &table {
            if let Some(word) = expansion
                .split_whitespace()
                .map(|word| peel(word).1.to_lowercase())
                .find(|word| table.contains_key(word))
            {
                return Err(Error::InvalidInput(format!(
                    "expansion of {:?} contains the acronym {:?}",
                    key, word
                )));
            }
        }

        Ok(Self { entries: table })
    }

    /// Load a vocabulary from a JSON object of `"acronym": "expansion"` pairs
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read acronym table {}: {}", path.display(), e))
        })?;
        let AcronymFile(entries) = serde_json::from_str(&content)?;
        Self::new(entries)
    }

    pub fn get(&self, word: &str) -> Option<&str> {
        self.entries.get(&word.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AcronymTable {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ACRONYMS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Rewrites known acronyms in a question into their expanded phrases
#[derive(Debug, Clone, Default)]
pub struct QueryExpander {
    table: AcronymTable,
}

impl QueryExpander {
    pub fn new(table: AcronymTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &AcronymTable {
        &self.table
    }

    /// Replace every known acronym token; other tokens pass through
    ///
    /// Tokens are whitespace-delimited and re-joined with single spaces.
    /// Punctuation around a matched acronym is kept around its expansion.
    pub fn expand(&self, text: &str) -> String {
        text.split_whitespace()
            .map(|token| {
                let (prefix, core, suffix) = peel(token);
                match self.table.get(core) {
                    Some(expansion) if !core.is_empty() => {
                        format!("{}{}{}", prefix, expansion, suffix)
                    }
                    _ => token.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Split a token into leading punctuation, alphanumeric core and trailing punctuation
fn peel(token: &str) -> (&str, &str, &str) {
    let start = token
        .find(|c: char| c.is_alphanumeric())
        .unwrap_or(token.len());
    let end = token
        .rfind(|c: char| c.is_alphanumeric())
        .map(|i| i + token[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(start);
    (&token[..start], &token[start..end], &token[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_expands_known_acronyms_case_insensitively() {
        let expander = QueryExpander::default();
        assert_eq!(
            expander.expand("Any BNPL complaints about apr?"),
            "Any buy now pay later complaints about annual percentage rate?"
        );
    }

    #[test]
    fn test_keeps_surrounding_punctuation() {
        let expander = QueryExpander::default();
        assert_eq!(
            expander.expand("Buy Now Pay Later (BNPL), or P2P."),
            "Buy Now Pay Later (buy now pay later), or peer to peer."
        );
    }

    #[test]
    fn test_unknown_tokens_pass_through_and_whitespace_collapses() {
        let expander = QueryExpander::default();
        assert_eq!(
            expander.expand("  my   card\twas charged  "),
            "my card was charged"
        );
        assert_eq!(expander.expand(""), "");
        assert_eq!(expander.expand("?!"), "?!");
    }

    #[test]
    fn test_expansion_is_idempotent() {
        let expander = QueryExpander::default();
        for question in [
            "Does the data contain any Buy Now Pay Later (BNPL) complaints?",
            "ATM fees and ACH transfers, CFPB says",
            "my ssn and ID were stolen; FICO dropped",
            "plain question with nothing to expand",
        ] {
            let once = expander.expand(question);
            assert_eq!(expander.expand(&once), once);
        }
    }

    #[test]
    fn test_table_rejects_self_referencing_expansion() {
        let result = AcronymTable::new([("cc", "credit card"), ("od", "overdraft")]);
        assert!(result.is_ok());

        let result = AcronymTable::new([("cc", "credit card"), ("card", "plastic")]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let result = AcronymTable::new([("cc", "cc card")]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let result = AcronymTable::new([("atm", "automated teller machine"), ("machine", "device")]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_table_rejects_malformed_keys() {
        assert!(AcronymTable::new([("two words", "x")]).is_err());
        assert!(AcronymTable::new([("(atm)", "x")]).is_err());
        assert!(AcronymTable::new([("atm", "   ")]).is_err());
    }

    #[test]
    fn test_load_table_from_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"OD": "overdraft", "nsf": "non sufficient funds"}}"#).unwrap();

        let table = AcronymTable::from_json_file(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("od"), Some("overdraft"));

        let expander = QueryExpander::new(table);
        assert_eq!(expander.expand("NSF and OD fees"), "non sufficient funds and overdraft fees");
    }

    #[test]
    fn test_default_table_is_consistent() {
        let default = AcronymTable::default();
        let validated = AcronymTable::new(DEFAULT_ACRONYMS).unwrap();
        assert_eq!(default, validated);
    }

    #[test]
    fn test_peel() {
        assert_eq!(peel("(BNPL),"), ("(", "BNPL", "),"));
        assert_eq!(peel("plain"), ("", "plain", ""));
        assert_eq!(peel("..."), ("...", "", ""));
        assert_eq!(peel("«é»"), ("«", "é", "»"));
    }
}
