//! Cross-lingual entity normalization.
//!
//! Turns a free-form question into a canonical metadata filter value. The
//! rules are script-aware: a contiguous run of Hangul is always captured as
//! a single token (splitting inside a non-space-delimited script breaks the
//! token and must never happen), then common trailing particles are
//! stripped before the alias lookup. Localized names map to canonical
//! metadata values through a bidirectional alias table; unresolved tokens
//! fall back to literal filtering.

use std::collections::HashMap;

use regex::Regex;

use crate::models::AliasEntry;

/// Outcome of alias resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityMatch {
    /// Token resolved through the alias table.
    Canonical(String),
    /// Unresolved token, used for literal metadata filtering.
    Literal(String),
}

impl EntityMatch {
    pub fn value(&self) -> &str {
        match self {
            EntityMatch::Canonical(v) | EntityMatch::Literal(v) => v,
        }
    }
}

/// Bidirectional mapping between localized entity names and canonical
/// metadata values.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    /// lowercased name -> canonical value
    forward: HashMap<String, String>,
    /// lowercased canonical value -> localized names
    reverse: HashMap<String, Vec<String>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in table covering the merchants the corpus ships with; config
    /// entries extend or override it.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert("Costco Wholesale", &["코스트코", "costco"]);
        table.insert("NOFRILLS", &["노프릴스", "nofrills", "no frills"]);
        table.insert("Walmart", &["월마트", "walmart"]);
        table
    }

    pub fn insert(&mut self, canonical: &str, names: &[&str]) {
        for name in names {
            self.forward
                .insert(name.to_lowercase(), canonical.to_string());
            self.reverse
                .entry(canonical.to_lowercase())
                .or_default()
                .push(name.to_string());
        }
        // The canonical value resolves to itself
        self.forward
            .insert(canonical.to_lowercase(), canonical.to_string());
    }

    pub fn extend_from(&mut self, entries: &[AliasEntry]) {
        for entry in entries {
            let names: Vec<&str> = entry.names.iter().map(String::as_str).collect();
            self.insert(&entry.canonical, &names);
        }
    }

    /// Localized name (any language) -> canonical metadata value.
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.forward.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Canonical metadata value -> localized names.
    pub fn localized(&self, canonical: &str) -> &[String] {
        self.reverse
            .get(&canonical.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Trailing Korean particles stripped before alias lookup, longest first.
const HANGUL_PARTICLES: &[&str] = &[
    "에서는", "에서도", "에서", "에게", "한테", "으로", "부터", "까지", "로", "은", "는", "이",
    "가", "을", "를", "와", "과", "도", "의", "만",
];

/// Hangul query words that are never entity candidates.
const HANGUL_STOPWORDS: &[&str] = &[
    "얼마", "얼마나", "총", "전체", "합계", "모두", "전부", "돈", "금액", "지출", "사용", "결제",
    "썼어", "썼어요", "썼는지", "쓴", "했어", "했어요", "언제", "어디", "뭐", "무엇",
];

const LATIN_STOPWORDS: &[&str] = &[
    "a", "an", "and", "all", "at", "did", "do", "for", "from", "how", "i", "in", "is", "it",
    "money", "much", "my", "of", "on", "or", "spend", "spent", "sum", "the", "to", "total",
    "was", "we", "what", "when", "where", "you",
];

/// Script-aware entity normalizer.
pub struct EntityNormalizer {
    aliases: AliasTable,
    hangul_run: Regex,
    latin_token: Regex,
    iso_date: Regex,
    month_day: Regex,
}

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sept", 9),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

impl EntityNormalizer {
    pub fn new(aliases: AliasTable) -> Self {
        Self {
            aliases,
            hangul_run: Regex::new(r"[\x{AC00}-\x{D7A3}]+").expect("valid hangul regex"),
            latin_token: Regex::new(r"[A-Za-z][A-Za-z&']*").expect("valid latin regex"),
            iso_date: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid date regex"),
            month_day: Regex::new(r"(?i)\b([a-z]+)\s+(\d{1,2})(?:,?\s+(\d{4}))?\b")
                .expect("valid month-day regex"),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(AliasTable::with_defaults())
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Does the question ask for an aggregate (sum/total)?
    pub fn wants_aggregation(&self, question: &str) -> bool {
        let lower = question.to_lowercase();
        const EN: &[&str] = &["total", "sum", "how much", "altogether", "spent", "spend"];
        const KO: &[&str] = &["얼마", "총", "전체", "합계", "모두", "전부"];
        EN.iter().any(|kw| lower.contains(kw)) || KO.iter().any(|kw| question.contains(kw))
    }

    /// Extract the candidate entity token from the question.
    ///
    /// A contiguous Hangul run is one token; trailing particles are stripped
    /// afterwards, never by splitting the run itself.
    pub fn extract_entity(&self, question: &str) -> Option<String> {
        for m in self.hangul_run.find_iter(question) {
            let token = strip_particles(m.as_str());
            if token.chars().count() >= 2 && !HANGUL_STOPWORDS.contains(&token) {
                return Some(token.to_string());
            }
        }

        for m in self.latin_token.find_iter(question) {
            let token = m.as_str();
            if token.chars().count() >= 2 && !LATIN_STOPWORDS.contains(&token.to_lowercase().as_str())
            {
                return Some(token.to_string());
            }
        }

        None
    }

    /// Extract and resolve the entity in one step.
    pub fn resolve_entity(&self, question: &str) -> Option<EntityMatch> {
        let token = self.extract_entity(question)?;
        Some(self.resolve_token(&token))
    }

    /// Resolve a single token through the alias table, falling back to the
    /// literal token.
    pub fn resolve_token(&self, token: &str) -> EntityMatch {
        match self.aliases.canonical(token) {
            Some(canonical) => EntityMatch::Canonical(canonical.to_string()),
            None => EntityMatch::Literal(token.to_string()),
        }
    }

    /// Canonical grouping key for a stored metadata value: alias-resolved
    /// when known, the stored value otherwise.
    pub fn canonical_value(&self, stored: &str) -> String {
        self.aliases
            .canonical(stored)
            .map(str::to_string)
            .unwrap_or_else(|| stored.to_string())
    }

    /// Extract a date mentioned in the question as `(YYYY-MM-DD, ambiguous)`
    /// where `ambiguous` marks an inferred year.
    pub fn extract_date(&self, question: &str) -> Option<(String, bool)> {
        if let Some(cap) = self.iso_date.captures(question) {
            let year: i32 = cap[1].parse().ok()?;
            let month: u32 = cap[2].parse().ok()?;
            let day: u32 = cap[3].parse().ok()?;
            return Some((format!("{year:04}-{month:02}-{day:02}"), false));
        }

        for cap in self.month_day.captures_iter(question) {
            let name = cap[1].to_lowercase();
            let Some(&(_, month)) = MONTHS.iter().find(|(n, _)| *n == name) else {
                continue;
            };
            let day: u32 = cap[2].parse().ok()?;
            if !(1..=31).contains(&day) {
                continue;
            }
            return match cap.get(3) {
                Some(year) => {
                    let year: i32 = year.as_str().parse().ok()?;
                    Some((format!("{year:04}-{month:02}-{day:02}"), false))
                }
                None => {
                    let year = chrono::Utc::now().format("%Y");
                    Some((format!("{year}-{month:02}-{day:02}"), true))
                }
            };
        }

        None
    }
}

fn strip_particles(run: &str) -> &str {
    for particle in HANGUL_PARTICLES {
        if let Some(stem) = run.strip_suffix(particle)
            && stem.chars().count() >= 2
        {
            return stem;
        }
    }
    run
}

/// True if the text contains any Hangul syllable or jamo.
pub fn contains_hangul(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c, '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hangul_run_is_never_split() {
        let normalizer = EntityNormalizer::with_defaults();
        let token = normalizer.extract_entity("코스트코에서 얼마나 썼어?").unwrap();
        assert_eq!(token, "코스트코");
        assert!(!token.contains(char::is_whitespace));
    }

    #[test]
    fn test_hangul_token_resolves_to_canonical() {
        let normalizer = EntityNormalizer::with_defaults();
        let resolved = normalizer.resolve_entity("코스트코에서 얼마나 썼어?").unwrap();
        assert_eq!(
            resolved,
            EntityMatch::Canonical("Costco Wholesale".to_string())
        );
    }

    #[test]
    fn test_latin_entity_extraction() {
        let normalizer = EntityNormalizer::with_defaults();
        let resolved = normalizer.resolve_entity("how much did I spend at Costco?").unwrap();
        assert_eq!(
            resolved,
            EntityMatch::Canonical("Costco Wholesale".to_string())
        );

        let resolved = normalizer.resolve_entity("total at Costco").unwrap();
        assert_eq!(
            resolved,
            EntityMatch::Canonical("Costco Wholesale".to_string())
        );
    }

    #[test]
    fn test_unresolved_token_falls_back_to_literal() {
        let normalizer = EntityNormalizer::with_defaults();
        let resolved = normalizer.resolve_entity("total at Safeway").unwrap();
        assert_eq!(resolved, EntityMatch::Literal("Safeway".to_string()));
    }

    #[test]
    fn test_no_entity_in_generic_question() {
        let normalizer = EntityNormalizer::with_defaults();
        assert!(normalizer.extract_entity("how much did I spend?").is_none());
    }

    #[test]
    fn test_particle_stripping_variants() {
        assert_eq!(strip_particles("코스트코에서"), "코스트코");
        assert_eq!(strip_particles("코스트코는"), "코스트코");
        assert_eq!(strip_particles("코스트코"), "코스트코");
        // Stem too short to strip
        assert_eq!(strip_particles("나는"), "나는");
    }

    #[test]
    fn test_aggregation_intent() {
        let normalizer = EntityNormalizer::with_defaults();
        assert!(normalizer.wants_aggregation("total at Costco"));
        assert!(normalizer.wants_aggregation("how much did I spend?"));
        assert!(normalizer.wants_aggregation("코스트코에서 얼마나 썼어?"));
        assert!(!normalizer.wants_aggregation("when did I visit Costco?"));
    }

    #[test]
    fn test_alias_table_is_bidirectional() {
        let table = AliasTable::with_defaults();
        assert_eq!(table.canonical("코스트코"), Some("Costco Wholesale"));
        assert_eq!(table.canonical("COSTCO"), Some("Costco Wholesale"));
        assert!(
            table
                .localized("Costco Wholesale")
                .contains(&"코스트코".to_string())
        );
    }

    #[test]
    fn test_alias_table_config_extension() {
        let mut table = AliasTable::with_defaults();
        table.extend_from(&[AliasEntry {
            canonical: "H Mart".to_string(),
            names: vec!["한아름".to_string(), "hmart".to_string()],
        }]);
        assert_eq!(table.canonical("한아름"), Some("H Mart"));
    }

    #[test]
    fn test_date_extraction() {
        let normalizer = EntityNormalizer::with_defaults();
        assert_eq!(
            normalizer.extract_date("what did I buy on 2026-02-11?"),
            Some(("2026-02-11".to_string(), false))
        );
        assert_eq!(
            normalizer.extract_date("receipts from feb 11, 2026 please"),
            Some(("2026-02-11".to_string(), false))
        );

        let (date, ambiguous) = normalizer.extract_date("what about feb 11?").unwrap();
        assert!(ambiguous);
        assert!(date.ends_with("-02-11"));

        assert!(normalizer.extract_date("no dates here").is_none());
    }

    #[test]
    fn test_contains_hangul() {
        assert!(contains_hangul("코스트코"));
        assert!(!contains_hangul("costco"));
        assert!(contains_hangul("total at 코스트코"));
    }
}
