use crate::types::FROM_USERS_PLACEHOLDER;
use std::collections::BTreeSet;

/// Lower-case `text` and remove every `#tag` occurrence for the whitelisted tags.
///
/// Plain substring removal: `#apple` also disappears from `#applepie`.
pub fn strip_whitelisted<S: AsRef<str>>(text: &str, whitelist: &[S]) -> String {
    let mut text = text.to_lowercase();
    for tag in whitelist {
        let needle = format!("#{}", tag.as_ref());
        text = text.replace(&needle, "");
    }
    text
}

/// Topics mentioned in `text` as `#topic` or `$topic`, compared case-insensitively.
pub fn matched_topics<I, S>(text: &str, topics: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let text_lower = text.to_lowercase();
    topics
        .into_iter()
        .filter(|topic| {
            let topic_lower = topic.as_ref().to_lowercase();
            if topic_lower.is_empty() {
                return false;
            }
            text_lower.contains(&format!("#{}", topic_lower))
                || text_lower.contains(&format!("${}", topic_lower))
        })
        .map(|topic| topic.as_ref().to_string())
        .collect()
}

/// Key a topic filter is matched by: the filter without the author placeholder.
pub fn match_key(filter: &str) -> String {
    filter.replace(FROM_USERS_PLACEHOLDER, "").trim().to_string()
}
