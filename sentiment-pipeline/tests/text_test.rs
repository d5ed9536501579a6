use sentiment_pipeline::cleaner::clean;
use sentiment_pipeline::topics::{match_key, matched_topics, strip_whitelisted};
use sentiment_pipeline::vote::resolve;
use sentiment_pipeline::Label;
use std::collections::BTreeSet;

fn labels(names: &[&str]) -> Vec<Label> {
    names.iter().map(|name| Label::new(*name)).collect()
}

#[test]
fn test_clean_strips_tokens_links_and_digits() {
    assert_eq!(
        clean("Check $AAPL now! http://x.co #great 123"),
        "Check now "
    );
}

#[test]
fn test_clean_collapses_punctuation_and_newlines() {
    assert_eq!(clean("  Wow...\n\nreally?? @bob"), "Wow really ");
    assert_eq!(clean("rates &gt; expectations &lt;3"), "rates expectations ");
}

#[test]
fn test_clean_of_only_noise_is_empty() {
    assert_eq!(clean("#tag @user $TSLA 2024 https://t.co/abc"), "");
    assert_eq!(clean(""), "");
}

#[test]
fn test_strip_whitelisted_is_plain_substring_removal() {
    let whitelist = vec!["apple".to_string()];
    assert_eq!(strip_whitelisted("I like #Apple", &whitelist), "i like ");
    assert_eq!(strip_whitelisted("#ApplePie time", &whitelist), "pie time");

    let none: Vec<String> = Vec::new();
    assert_eq!(strip_whitelisted("Keep #This", &none), "keep #this");
}

#[test]
fn test_matched_topics_is_case_insensitive() {
    let found = matched_topics("love $aapl and #AAPL", ["aapl"]);
    assert_eq!(found, BTreeSet::from(["aapl".to_string()]));

    let found = matched_topics("Long $Tsla, short #goog", ["TSLA", "goog", "msft"]);
    assert_eq!(
        found,
        BTreeSet::from(["TSLA".to_string(), "goog".to_string()])
    );
}

#[test]
fn test_matched_topics_needs_a_tag_prefix() {
    assert!(matched_topics("aapl is up", ["aapl"]).is_empty());
    assert!(matched_topics("#anything", [""]).is_empty());
}

#[test]
fn test_match_key_drops_author_placeholder() {
    assert_eq!(match_key("aapl $FROM_USERS$"), "aapl");
    assert_eq!(match_key("$FROM_USERS$"), "");
    assert_eq!(match_key(" tsla "), "tsla");
}

#[test]
fn test_vote_without_majority_falls_back_to_default() {
    let neutral = Label::neutral();
    let votes = labels(&["positive", "negative", "neutral"]);
    assert_eq!(resolve(&votes, &neutral, 2), neutral);
}

#[test]
fn test_vote_with_majority() {
    let neutral = Label::neutral();
    let votes = labels(&["positive", "negative", "positive"]);
    assert_eq!(resolve(&votes, &neutral, 2), Label::new("positive"));
}

#[test]
fn test_vote_on_no_votes_is_default() {
    assert_eq!(resolve(&[], &Label::neutral(), 2), Label::neutral());
}

#[test]
fn test_vote_tie_goes_to_first_label_reaching_the_count() {
    let default = Label::new("unknown");
    let votes = labels(&["negative", "positive", "positive", "negative"]);
    assert_eq!(resolve(&votes, &default, 2), Label::new("positive"));

    let votes = labels(&["negative", "negative", "positive", "positive"]);
    assert_eq!(resolve(&votes, &default, 2), Label::new("negative"));
}
