//! Intent classifiers: pure predicates over the newest user message.

/// Closing phrases that end a conversation without retrieval or generation.
const CLOSING_PHRASES: &[&str] = &[
    "thanks",
    "thank you",
    "got it",
    "ok",
    "okay",
    "great",
    "perfect",
    "sounds good",
    "appreciate it",
    "that helps",
    "cool",
    "bye",
    "goodbye",
    "no thanks",
];

/// Inputs longer than this never affix-match a closing phrase.
const ACK_AFFIX_MAX_CHARS: usize = 30;

/// Canned closings returned by the acknowledgment short-circuit.
const CANNED_CLOSINGS: &[&str] = &[
    "You're welcome! Happy to help anytime.",
    "Glad that helped. Come back whenever you have more questions.",
    "Anytime! Ask me about the collection whenever you like.",
    "You're welcome. Happy reading!",
];

/// Keywords that mark a request for a social-media post.
const SOCIAL_MEDIA_KEYWORDS: &[&str] = &[
    "tweet",
    "twitter",
    "post",
    "social media",
    "linkedin",
    "facebook",
    "instagram",
    "thread",
    "threads",
    "make a post",
    "create a post",
];

/// True when the message is a closing acknowledgment: an exact match against
/// the fixed vocabulary, or (for inputs of at most 30 characters) a prefix or
/// suffix match.
pub fn is_acknowledgment(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    if CLOSING_PHRASES.contains(&normalized.as_str()) {
        return true;
    }
    if normalized.chars().count() <= ACK_AFFIX_MAX_CHARS {
        return CLOSING_PHRASES
            .iter()
            .any(|phrase| normalized.starts_with(phrase) || normalized.ends_with(phrase));
    }
    false
}

/// A canned closing for an acknowledgment, rotated by input length so repeated
/// goodbyes don't always read identically.
pub fn closing_reply(text: &str) -> &'static str {
    CANNED_CLOSINGS[text.chars().count() % CANNED_CLOSINGS.len()]
}

/// True when the query asks for a social-media post rather than an answer.
pub fn is_social_media_request(query: &str) -> bool {
    let query = query.to_lowercase();
    SOCIAL_MEDIA_KEYWORDS
        .iter()
        .any(|keyword| query.contains(keyword))
}

/// Coarse shape of a query, used to pick a prompt variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// "How do I ..." / "how to ..." procedural questions.
    HowTo,
    /// "Top 5 ...", "3 ways to ..." enumeration requests.
    ListRequest(usize),
    General,
}

/// Classifies the query shape. List detection looks for "top N" or a count
/// followed by an enumerable noun; how-to detection wins only when no count is
/// asked for.
pub fn query_shape(query: &str) -> QueryShape {
    let lower = query.to_lowercase();

    if let Some(count) = requested_item_count(&lower) {
        return QueryShape::ListRequest(count);
    }
    if ["how do i", "how to", "how can i", "how should i"]
        .iter()
        .any(|pattern| lower.contains(pattern))
    {
        return QueryShape::HowTo;
    }
    QueryShape::General
}

const LIST_NOUNS: &[&str] = &[
    "things", "ways", "tips", "steps", "examples", "ideas", "items", "points", "traits",
    "qualities", "habits", "reasons",
];

fn requested_item_count(lower: &str) -> Option<usize> {
    let words: Vec<&str> = lower.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        if *word == "top" {
            if let Some(n) = words.get(i + 1).and_then(|w| parse_count(w)) {
                return Some(n);
            }
        }
        if let Some(n) = parse_count(word) {
            if let Some(next) = words.get(i + 1) {
                let next = next.trim_matches(|c: char| !c.is_alphanumeric());
                if LIST_NOUNS.contains(&next) {
                    return Some(n);
                }
            }
        }
    }
    None
}

fn parse_count(word: &str) -> Option<usize> {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .parse::<usize>()
        .ok()
        .filter(|&n| n > 0 && n <= 50)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_acknowledgments() {
        for text in ["thanks", "Thank you", "got it", "OK", "ok"] {
            assert!(is_acknowledgment(text), "{text:?} should be an ack");
        }
    }

    #[test]
    fn affix_acknowledgments_within_limit() {
        assert!(is_acknowledgment("thanks!"));
        assert!(is_acknowledgment("ok, great"));
        assert!(is_acknowledgment("that was perfect"));
    }

    #[test]
    fn long_messages_are_not_acknowledgments() {
        let long = "thanks for that, but can you also explain how trust is built in teams?";
        assert!(!is_acknowledgment(long));
        assert!(!is_acknowledgment("what is leadership?"));
    }

    #[test]
    fn closing_reply_is_from_fixed_set() {
        assert!(CANNED_CLOSINGS.contains(&closing_reply("thanks!")));
    }

    #[test]
    fn social_media_detection() {
        assert!(is_social_media_request("Write a tweet about servant leadership"));
        assert!(is_social_media_request("Make a post for LinkedIn on trust"));
        assert!(!is_social_media_request("What is servant leadership?"));
    }

    #[test]
    fn query_shapes() {
        assert_eq!(query_shape("What are the top 5 leadership traits?"), QueryShape::ListRequest(5));
        assert_eq!(query_shape("Give me 3 ways to build trust"), QueryShape::ListRequest(3));
        assert_eq!(query_shape("How do I run a retrospective?"), QueryShape::HowTo);
        assert_eq!(query_shape("What is psychological safety?"), QueryShape::General);
    }
}
