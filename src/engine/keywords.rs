// Keyword auto-reply matching. Rules are evaluated highest priority first
// and the first hit wins; comparisons are case-insensitive over trimmed
// input. An invalid regex pattern never matches, it does not error.

use crate::atoms::error::Result;
use crate::atoms::types::{Keyword, MatchType};
use crate::engine::store::Store;
use log::debug;

/// Find the first active rule matching `message`, if any.
pub fn find_matching(store: &Store, user_id: &str, message: &str) -> Result<Option<Keyword>> {
    let normalized = message.to_lowercase();
    let normalized = normalized.trim();

    for keyword in store.list_active_keywords(user_id)? {
        if matches(&keyword, normalized) {
            debug!("[keywords] '{}' matched rule '{}'", normalized, keyword.keyword);
            return Ok(Some(keyword));
        }
    }
    Ok(None)
}

fn matches(keyword: &Keyword, message: &str) -> bool {
    let pattern = keyword.keyword.to_lowercase();
    let pattern = pattern.trim();

    match keyword.match_type {
        MatchType::Exact => message == pattern,
        MatchType::Contains => message.contains(pattern),
        MatchType::StartsWith => message.starts_with(pattern),
        MatchType::Regex => regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match(message))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(word: &str, match_type: MatchType, priority: i64) -> Keyword {
        Keyword {
            id: uuid::Uuid::new_v4().to_string(),
            keyword: word.to_string(),
            match_type,
            response: format!("reply to {word}"),
            priority,
            is_active: true,
            user_id: "u1".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_match_types() {
        assert!(matches(&rule("Oi", MatchType::Exact, 0), "oi"));
        assert!(!matches(&rule("oi", MatchType::Exact, 0), "oi tudo bem"));
        assert!(matches(&rule("preço", MatchType::Contains, 0), "qual o preço disso?"));
        assert!(matches(&rule("bom dia", MatchType::StartsWith, 0), "bom dia, tudo bem?"));
        assert!(!matches(&rule("bom dia", MatchType::StartsWith, 0), "oi, bom dia"));
        assert!(matches(&rule(r"pedido\s+\d+", MatchType::Regex, 0), "status do pedido 1234"));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        assert!(!matches(&rule(r"pedido(", MatchType::Regex, 0), "pedido("));
    }

    #[test]
    fn test_priority_order_first_hit_wins() {
        let store = Store::in_memory().unwrap();
        store
            .insert_keyword("u1", "pedido", MatchType::Contains, "generic", 1)
            .unwrap();
        store
            .insert_keyword("u1", "pedido urgente", MatchType::Contains, "urgent", 10)
            .unwrap();

        let hit = find_matching(&store, "u1", "meu PEDIDO URGENTE sumiu")
            .unwrap()
            .unwrap();
        assert_eq!(hit.response, "urgent");

        let hit = find_matching(&store, "u1", "cadê meu pedido?").unwrap().unwrap();
        assert_eq!(hit.response, "generic");
        assert!(find_matching(&store, "u1", "oi").unwrap().is_none());
    }
}
