//! Fuzzy ticker lookup over a static directory of instruments.

use anyhow::Context;
use std::collections::HashSet;
use std::path::Path;

use ticker_core::TickerInfo;

const BUILTIN_DIRECTORY: &str = include_str!("../data/tickers.json");

/// Results scoring at or below this are dropped
const MIN_SCORE: f64 = 0.2;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;

pub struct TickerDirectory {
    entries: Vec<TickerInfo>,
}

impl TickerDirectory {
    pub fn new(entries: Vec<TickerInfo>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> anyhow::Result<Self> {
        let entries: Vec<TickerInfo> =
            serde_json::from_str(BUILTIN_DIRECTORY).context("Built-in ticker directory is invalid")?;
        Ok(Self::new(entries))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ticker directory {}", path.display()))?;
        let entries: Vec<TickerInfo> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse ticker directory {}", path.display()))?;
        Ok(Self::new(entries))
    }

    /// File at `path` when given, otherwise the built-in list
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let directory = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::builtin()?,
        };
        tracing::info!("Ticker directory loaded with {} instruments", directory.len());
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best matches for `query` by symbol or name, highest score first.
    /// An exact symbol match always ranks first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<TickerInfo> {
        let needle = normalize_text(query);
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(bool, f64, &TickerInfo)> = self
            .entries
            .iter()
            .map(|info| {
                let exact = normalize_text(&info.symbol) == needle;
                let score = similarity(&needle, &info.symbol).max(similarity(&needle, &info.name));
                (exact, score, info)
            })
            .filter(|(exact, score, _)| *exact || *score > MIN_SCORE)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.total_cmp(&a.1)));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, score, info)| TickerInfo {
                score: Some(score),
                ..info.clone()
            })
            .collect()
    }
}

fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Weighted blend of Jaro-Winkler, normalized Levenshtein, token Jaccard and
/// bigram Dice, clamped to [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let lev = 1.0 - levenshtein(&a, &b) as f64 / a.len().max(b.len()) as f64;
    let combined = 0.40 * jaro_winkler(&a, &b)
        + 0.30 * lev
        + 0.20 * token_jaccard(&a, &b)
        + 0.10 * bigram_dice(&a, &b);

    combined.clamp(0.0, 1.0)
}

fn jaro_winkler(s1: &[char], s2: &[char]) -> f64 {
    let match_distance = (s1.len().max(s2.len()) / 2).saturating_sub(1);
    let mut s1_matches = vec![false; s1.len()];
    let mut s2_matches = vec![false; s2.len()];
    let mut matches = 0usize;

    for (i, c) in s1.iter().enumerate() {
        let start = i.saturating_sub(match_distance);
        let end = (i + match_distance + 1).min(s2.len());
        for j in start..end {
            if s2_matches[j] || s2[j] != *c {
                continue;
            }
            s1_matches[i] = true;
            s2_matches[j] = true;
            matches += 1;
            break;
        }
    }
    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for (i, c) in s1.iter().enumerate() {
        if !s1_matches[i] {
            continue;
        }
        while !s2_matches[k] {
            k += 1;
        }
        if *c != s2[k] {
            transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    let jaro = (m / s1.len() as f64 + m / s2.len() as f64 + (m - transpositions as f64 / 2.0) / m) / 3.0;

    let prefix = s1.iter().zip(s2).take_while(|(x, y)| x == y).count().min(4);
    jaro + prefix as f64 * 0.1 * (1.0 - jaro)
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn token_jaccard(a: &[char], b: &[char]) -> f64 {
    let a: String = a.iter().collect();
    let b: String = b.iter().collect();
    let ta: HashSet<&str> = a.split(' ').collect();
    let tb: HashSet<&str> = b.split(' ').collect();
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / union as f64
}

fn bigram_dice(a: &[char], b: &[char]) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        // single characters: plain character-set Jaccard
        let sa: HashSet<char> = a.iter().copied().collect();
        let sb: HashSet<char> = b.iter().copied().collect();
        let union = sa.union(&sb).count();
        if union == 0 {
            return 0.0;
        }
        return sa.intersection(&sb).count() as f64 / union as f64;
    }

    let grams = |s: &[char]| -> HashSet<(char, char)> { s.windows(2).map(|w| (w[0], w[1])).collect() };
    let ga = grams(a);
    let gb = grams(b);
    2.0 * ga.intersection(&gb).count() as f64 / (ga.len() + gb.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(symbol: &str, name: &str) -> TickerInfo {
        TickerInfo {
            name: name.into(),
            symbol: symbol.into(),
            exchange: "NASDAQ".into(),
            yf: symbol.into(),
            tv: format!("NASDAQ:{}", symbol),
            score: None,
        }
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("Apple", "  apple "), 1.0);
        assert_eq!(similarity("", "apple"), 0.0);
        let s = similarity("appl", "apple inc.");
        assert!(s > 0.0 && s < 1.0);
        assert!(similarity("xyz", "apple") < similarity("app", "apple"));
    }

    #[test]
    fn test_levenshtein() {
        let k: Vec<char> = "kitten".chars().collect();
        let s: Vec<char> = "sitting".chars().collect();
        assert_eq!(levenshtein(&k, &s), 3);
        assert_eq!(levenshtein(&k, &[]), 6);
    }

    #[test]
    fn test_jaro_winkler_reference() {
        let a: Vec<char> = "martha".chars().collect();
        let b: Vec<char> = "marhta".chars().collect();
        assert!((jaro_winkler(&a, &b) - 0.9611).abs() < 1e-3);
    }

    #[test]
    fn test_exact_symbol_ranks_first() {
        let directory = TickerDirectory::new(vec![
            info("GOOGL", "Alphabet Inc. (Class A)"),
            info("GOOG", "Alphabet Inc. (Class C)"),
            info("AAPL", "Apple Inc."),
        ]);

        let results = directory.search("goog", 10);
        assert_eq!(results[0].symbol, "GOOG");
        assert_eq!(results[0].score, Some(1.0));
        assert!(results.iter().any(|r| r.symbol == "GOOGL"));
    }

    #[test]
    fn test_name_match_and_limit() {
        let directory = TickerDirectory::new(vec![
            info("AAPL", "Apple Inc."),
            info("MSFT", "Microsoft Corp."),
            info("AMZN", "Amazon.com Inc."),
        ]);

        let results = directory.search("microsoft", 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol, "MSFT");
        assert!(directory.search("   ", 5).is_empty());
    }

    #[test]
    fn test_builtin_directory_loads() {
        let directory = TickerDirectory::builtin().unwrap();
        assert!(directory.len() > 100);
        assert_eq!(directory.search("NVDA", 3)[0].symbol, "NVDA");
    }
}
