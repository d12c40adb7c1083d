use regex::Regex;

/// Which pattern class fired, in priority order: Act-specific ambiguity
/// first, then general clarification requests, then a sentence-level
/// indicator scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationKind {
    Act,
    General,
    Indicator,
}

#[derive(Debug, Clone)]
pub struct ClarificationMatch {
    pub clarification_question: String,
    pub original_context: String,
    pub kind: ClarificationKind,
}

/// Decide whether a generated answer is itself a disambiguating question
/// back to the user rather than a final answer. First matching pattern
/// class wins.
pub fn detect_clarification(response: &str) -> Option<ClarificationMatch> {
    if response.trim().is_empty() {
        return None;
    }

    let act_patterns = [
        r"(?i)section\s+\d+\S*\s+exists\s+in\s+multiple\s+gst\s+acts[^?]*\?",
        r"(?i)which\s+act\s+(?:are\s+you\s+)?referring\s+to\??",
        r"(?i)which\s+gst\s+act[^?]*\??",
        r"(?i)please\s+specify\s+(?:which\s+)?(?:act|gst\s+act)[^?]*\??",
    ];
    for pattern in act_patterns {
        if let Some(found) = find_pattern(pattern, response) {
            return Some(ClarificationMatch {
                clarification_question: extract_clarification_question(response, found),
                original_context: response.to_string(),
                kind: ClarificationKind::Act,
            });
        }
    }

    let general_patterns = [
        r"(?i)please\s+clarify[^?]*\??",
        r"(?i)could\s+you\s+(?:please\s+)?(?:clarify|specify)[^?]*\??",
        r"(?i)would\s+you\s+(?:please\s+)?(?:clarify|specify)[^?]*\??",
        r"(?i)i\s+need\s+(?:more\s+)?(?:information|clarification)[^?]*\??",
        r"(?i)which\s+(?:one|option|act|version)[^?]*\??",
    ];
    for pattern in general_patterns {
        if let Some(found) = find_pattern(pattern, response) {
            return Some(ClarificationMatch {
                clarification_question: extract_clarification_question(response, found),
                original_context: response.to_string(),
                kind: ClarificationKind::General,
            });
        }
    }

    // Last resort: any sentence ending in "?" that carries a clarification
    // keyword.
    let indicators = [
        "which act",
        "which gst act",
        "please clarify",
        "could you specify",
        "which one",
    ];
    let splitter =
        Regex::new(r"[.!?]\s+").unwrap_or_else(|_| Regex::new("^$").unwrap());
    for sentence in splitter.split(response) {
        let sentence = sentence.trim();
        if !sentence.ends_with('?') {
            continue;
        }
        let lower = sentence.to_lowercase();
        if indicators.iter().any(|needle| lower.contains(needle)) {
            return Some(ClarificationMatch {
                clarification_question: sentence.to_string(),
                original_context: response.to_string(),
                kind: ClarificationKind::Indicator,
            });
        }
    }

    None
}

fn find_pattern(pattern: &str, text: &str) -> Option<std::ops::Range<usize>> {
    let re = Regex::new(pattern).unwrap_or_else(|_| Regex::new("^$").unwrap());
    re.find(text).map(|m| m.start()..m.end())
}

/// Pull the sentence containing the match out of the response, extending to
/// the closing question mark and, for short questions, prepending the
/// previous sentence when it carries statutory context. Best effort.
fn extract_clarification_question(response: &str, found: std::ops::Range<usize>) -> String {
    let sentence_start = sentence_start_before(response, found.start);
    let sentence_end = sentence_end_after(response, found.end);

    let mut question = response[sentence_start..sentence_end].trim().to_string();
    if !question.ends_with('?') {
        if let Some(next_q) = response[sentence_end..].find('?') {
            question = response[sentence_start..sentence_end + next_q + 1]
                .trim()
                .to_string();
        }
    }

    if question.len() < 100 && sentence_start > 0 {
        let prev_start = sentence_start_before(response, sentence_start - 1);
        let prev_sentence = response[prev_start..sentence_start].trim();
        if !prev_sentence.is_empty() {
            let lower = prev_sentence.to_lowercase();
            let statutory = ["section", "act", "gst", "cgst", "igst", "utgst"];
            if statutory.iter().any(|k| lower.contains(k)) {
                question = format!("{prev_sentence} {question}");
            }
        }
    }

    if question.is_empty() {
        response[found].trim().to_string()
    } else {
        question
    }
}

fn sentence_start_before(text: &str, pos: usize) -> usize {
    let prefix = &text[..pos];
    ['.', '!', '?']
        .iter()
        .filter_map(|&c| prefix.rfind(c))
        .max()
        .map(|i| i + 1)
        .unwrap_or(0)
}

fn sentence_end_after(text: &str, pos: usize) -> usize {
    let suffix = &text[pos..];
    ['.', '!', '?']
        .iter()
        .filter_map(|&c| suffix.find(c))
        .min()
        .map(|i| pos + i + 1)
        .unwrap_or(text.len())
}

/// Merge the user's clarifying reply back into the original question.
/// Recognizes an Act name in the reply and rewrites the question around it;
/// otherwise appends the reply verbatim. Heuristic, best effort.
pub fn combine_question_with_clarification(
    original_question: &str,
    clarification_response: &str,
) -> String {
    let original_lower = original_question.to_lowercase();
    let reply_lower = clarification_response.trim().to_lowercase();

    let act_name = if reply_lower.contains("cgst") {
        Some("CGST Act")
    } else if reply_lower.contains("igst") {
        Some("IGST Act")
    } else if reply_lower.contains("utgst") {
        Some("UTGST Act")
    } else if reply_lower.contains("central") && reply_lower.contains("gst") {
        Some("CGST Act")
    } else if reply_lower.contains("integrated") && reply_lower.contains("gst") {
        Some("IGST Act")
    } else if reply_lower.contains("union") && reply_lower.contains("gst") {
        Some("UTGST Act")
    } else {
        None
    };

    if let Some(act_name) = act_name {
        if original_lower.contains("cgst")
            || original_lower.contains("igst")
            || original_lower.contains("utgst")
        {
            let re = Regex::new(
                r"(?i)\b(cgst|igst|utgst|central\s+gst|integrated\s+gst|union\s+territory\s+gst)\s+act\b",
            )
            .unwrap_or_else(|_| Regex::new("^$").unwrap());
            return re.replace_all(original_question, act_name).to_string();
        }

        if original_lower.contains("of gst act") || original_lower.contains("of the gst act") {
            let re = Regex::new(r"(?i)\bof\s+(?:the\s+)?gst\s+act\b")
                .unwrap_or_else(|_| Regex::new("^$").unwrap());
            return re
                .replace_all(original_question, format!("of {act_name}").as_str())
                .to_string();
        }

        return format!("{original_question} ({act_name})");
    }

    if clarification_response.len() < 50 {
        return format!("{original_question} - {clarification_response}");
    }

    format!("{original_question}\n\nUser clarification: {clarification_response}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_multiple_acts_ambiguity() {
        let answer = "Section 17(5) exists in multiple GST Acts (CGST Act, IGST Act, UTGST Act). \
                      Which Act are you referring to?";

        let found = detect_clarification(answer).expect("should detect");
        assert_eq!(found.kind, ClarificationKind::Act);
        assert!(found
            .clarification_question
            .contains("Which Act are you referring to?"));
    }

    #[test]
    fn detects_general_clarification_request() {
        let answer = "The provision differs by notification. Could you specify the period you mean?";
        let found = detect_clarification(answer).expect("should detect");
        assert_eq!(found.kind, ClarificationKind::General);
        assert!(found.clarification_question.ends_with('?'));
    }

    #[test]
    fn which_one_question_is_detected() {
        let answer = "Both readings are defensible under the rules. \
                      Do you mean the first proviso or which one applies to you?";
        let found = detect_clarification(answer).expect("should detect");
        assert!(found.clarification_question.to_lowercase().contains("which one"));
    }

    #[test]
    fn plain_answers_do_not_trigger() {
        let answer = "Section 22(1) requires registration above the threshold. \
                      The act defines aggregate turnover in section 2(6).";
        assert!(detect_clarification(answer).is_none());
    }

    #[test]
    fn short_question_pulls_in_statutory_context_sentence() {
        let answer = "Section 16 appears in more than one statute here. Which one do you mean?";
        let found = detect_clarification(answer).expect("should detect");
        assert!(found.clarification_question.contains("Section 16"));
        assert!(found.clarification_question.contains("Which one do you mean?"));
    }

    #[test]
    fn merge_rewrites_generic_gst_act_reference() {
        let merged = combine_question_with_clarification(
            "What is section 17(5) of GST act",
            "CGST",
        );
        assert!(merged.contains("CGST Act"));
        assert!(!merged.to_lowercase().contains("of gst act"));
    }

    #[test]
    fn merge_replaces_existing_act_mention() {
        let merged = combine_question_with_clarification(
            "What is section 5 of the IGST Act?",
            "I meant the central GST one",
        );
        assert!(merged.contains("CGST Act"));
        assert!(!merged.contains("IGST Act"));
    }

    #[test]
    fn merge_appends_act_when_question_never_named_one() {
        let merged =
            combine_question_with_clarification("What is the registration threshold?", "UTGST");
        assert_eq!(merged, "What is the registration threshold? (UTGST Act)");
    }

    #[test]
    fn merge_appends_short_reply_inline() {
        let merged = combine_question_with_clarification(
            "What is the late fee for GSTR-3B?",
            "for July 2024",
        );
        assert_eq!(merged, "What is the late fee for GSTR-3B? - for July 2024");
    }

    #[test]
    fn merge_labels_long_reply_as_block() {
        let reply = "I am asking about a composition taxpayer in Maharashtra who files quarterly \
                     and missed two return periods.";
        let merged = combine_question_with_clarification("What is the late fee?", reply);
        assert!(merged.starts_with("What is the late fee?\n\nUser clarification:"));
        assert!(merged.contains(reply));
    }
}
