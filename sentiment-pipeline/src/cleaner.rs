use once_cell::sync::OnceCell;
use regex::Regex;

/// Normalize raw item text into the canonical classification input.
///
/// Tags, mentions and cashtags, digit runs, `&gt;`/`&lt;` escapes and links
/// are removed first; every remaining run of characters outside `A-Za-z`
/// then collapses to a single space and leading whitespace is dropped.
/// An empty result means the item carries no meaningful text.
pub fn clean(raw: &str) -> String {
    static TOKEN_RE: OnceCell<Regex> = OnceCell::new();
    let token_re = TOKEN_RE.get_or_init(|| {
        Regex::new(r"(#\w+)|(@\w+)|(\$\w+)|(\d+)|(&gt;)|(&lt;)").expect("valid token regex")
    });
    let without_tokens = token_re.replace_all(raw, "");

    static LINK_RE: OnceCell<Regex> = OnceCell::new();
    let link_re = LINK_RE.get_or_init(|| Regex::new(r"http\S+").expect("valid link regex"));
    let without_links = link_re.replace_all(&without_tokens, "");

    static NON_ALPHA_RE: OnceCell<Regex> = OnceCell::new();
    let non_alpha_re =
        NON_ALPHA_RE.get_or_init(|| Regex::new(r"[^A-Za-z]+").expect("valid alphabet regex"));
    let collapsed = non_alpha_re.replace_all(&without_links, " ");

    collapsed.trim_start().to_string()
}
