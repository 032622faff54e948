//! Search condition builder.
//!
//! Turns a token list plus optional attribute filters into a
//! [`SearchCondition`] that every [`Store`](crate::store::Store) knows how to
//! execute. No filters are applied unless asked for.

/// Document attributes that can be matched exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    Repository,
    Rev,
    ContentType,
}

impl Attr {
    pub fn column(self) -> &'static str {
        match self {
            Attr::Repository => "repository",
            Attr::Rev => "rev",
            Attr::ContentType => "content_type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrFilter {
    pub attr: Attr,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCondition {
    pub tokens: Vec<String>,
    pub all_words: bool,
    pub filters: Vec<AttrFilter>,
}

impl SearchCondition {
    /// Tokens joined with `AND` (all words) or `OR` (any word).
    pub fn phrase(&self) -> String {
        self.tokens.join(self.operator())
    }

    /// The phrase in FTS5 syntax: each token quoted so punctuation in a
    /// token is matched literally instead of parsed as query syntax.
    pub fn fts_expression(&self) -> String {
        self.tokens
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(self.operator())
    }

    pub fn filter(&self, attr: Attr) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.attr == attr)
            .map(|f| f.value.as_str())
    }

    fn operator(&self) -> &'static str {
        if self.all_words {
            " AND "
        } else {
            " OR "
        }
    }
}

/// Build a condition, or `None` when there is nothing to search for.
pub fn build_query(
    tokens: &[String],
    repository: Option<&str>,
    rev: Option<&str>,
    content_type: Option<&str>,
    all_words: bool,
) -> Option<SearchCondition> {
    let tokens: Vec<String> = tokens
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return None;
    }

    let filters = [
        (Attr::Repository, repository),
        (Attr::Rev, rev),
        (Attr::ContentType, content_type),
    ]
    .into_iter()
    .filter_map(|(attr, value)| {
        value.map(|v| AttrFilter {
            attr,
            value: v.to_string(),
        })
    })
    .collect();

    Some(SearchCondition {
        tokens,
        all_words,
        filters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_empty_tokens_build_nothing() {
        assert!(build_query(&[], Some("api"), None, None, true).is_none());
        assert!(build_query(&tokens(&["  ", ""]), None, None, None, true).is_none());
    }

    #[test]
    fn test_all_words_joins_with_and() {
        let c = build_query(&tokens(&["fn", "main"]), None, None, None, true).unwrap();
        assert_eq!(c.phrase(), "fn AND main");
        assert!(c.filters.is_empty());
    }

    #[test]
    fn test_any_word_joins_with_or() {
        let c = build_query(&tokens(&["fn", "main"]), None, None, None, false).unwrap();
        assert_eq!(c.phrase(), "fn OR main");
    }

    #[test]
    fn test_filters_only_for_given_arguments() {
        let c = build_query(&tokens(&["x"]), Some("api"), None, Some("text/x-rust"), true).unwrap();
        assert_eq!(c.filter(Attr::Repository), Some("api"));
        assert_eq!(c.filter(Attr::Rev), None);
        assert_eq!(c.filter(Attr::ContentType), Some("text/x-rust"));
        assert_eq!(c.filters.len(), 2);
    }

    #[test]
    fn test_fts_expression_quotes_tokens() {
        let c = build_query(&tokens(&["say\"hi", "a-b"]), None, None, None, false).unwrap();
        assert_eq!(c.fts_expression(), "\"say\"\"hi\" OR \"a-b\"");
    }
}
