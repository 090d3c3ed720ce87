// ========================================================================================
//
//                     Lab report text -> raw antigen tokens
//
// ========================================================================================
//
// Reads pasted lab-report text of the shape `Locus: value value, value` one locus per
// line and turns each value into a raw antigen token. Tokens are NOT normalized here;
// the caller runs every one through `normalize` before scoring.

use log::debug;
use std::collections::BTreeSet;

/// One recognized line of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    /// The uppercased locus as written, after the `DQ`/`DP` aliases are applied.
    pub locus: String,
    /// Raw tokens, in the order they appear on the line.
    pub tokens: Vec<String>,
}

const ASTERISK_LOCI: [&str; 4] = ["DQB1", "DQA1", "DPB1", "DPA1"];
const KNOWN_LOCI: [&str; 15] = [
    "A", "B", "C", "CW", "DR", "DRB1", "DRB3", "DRB4", "DRB5", "DQ", "DQB1", "DQA1", "DP",
    "DPB1", "DPA1",
];
const DR_ASSOCIATIONS: [&str; 3] = ["51", "52", "53"];

fn format_token(locus: &str, value: &str) -> String {
    let value = value.to_ascii_uppercase();

    if locus == "DR" && DR_ASSOCIATIONS.contains(&value.as_str()) {
        return format!("DR{value}");
    }
    if value.starts_with(locus) {
        return value;
    }
    if value.contains(':') || value.contains('*') {
        let suffix = value.trim_start_matches('*');
        return format!("{locus}*{suffix}");
    }
    if ASTERISK_LOCI.contains(&locus) {
        // Serologic spellings such as `DQ4` keep only their number.
        let digits = value.trim_start_matches(|c: char| !c.is_ascii_digit());
        return format!("{locus}*{digits}");
    }
    format!("{locus}{value}")
}

/// Parses one `Locus[:|-] v1 v2, v3; ...` line. Returns `None` when the line does not
/// start with a known HLA locus or carries no values.
pub fn parse_report_line(line: &str) -> Option<ReportLine> {
    let trimmed = line.trim();
    let trimmed = match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("HLA-") => &trimmed[4..],
        _ => trimmed,
    };
    let locus_len = trimmed
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(trimmed.len());
    if locus_len == 0 {
        return None;
    }

    let (locus, rest) = trimmed.split_at(locus_len);
    let rest = rest.trim_start();
    let values = match rest.strip_prefix([':', '|', '-']) {
        Some(after_separator) => after_separator,
        // Without a separator, at least some whitespace has to divide locus and values.
        None if rest.len() < trimmed.len() - locus_len => rest,
        None => return None,
    };

    let locus = match locus.to_ascii_uppercase().as_str() {
        "DQ" => "DQB1".to_string(),
        "DP" => "DPB1".to_string(),
        other if KNOWN_LOCI.contains(&other) => other.to_string(),
        _ => return None,
    };

    let tokens: Vec<String> = values
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|v| !v.is_empty())
        .map(|v| format_token(&locus, v))
        .collect();

    if tokens.is_empty() {
        return None;
    }
    Some(ReportLine { locus, tokens })
}

/// Collects the raw antigen tokens of every recognized line. Unrecognized lines are skipped.
pub fn parse_report_text(text: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_report_line(line) {
            Some(parsed) => tokens.extend(parsed.tokens),
            None => debug!("skipping report line {}: {:?}", i + 1, line.trim()),
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    #[test]
    fn class_one_line_splits_on_whitespace_and_punctuation() {
        let line = parse_report_line("B: 18 39, 41;44").unwrap();
        assert_eq!(line.locus, "B");
        assert_eq!(line.tokens, ["B18", "B39", "B41", "B44"]);
    }

    #[test]
    fn separators_are_optional() {
        assert_eq!(parse_report_line("A 2 24").unwrap().tokens, ["A2", "A24"]);
        assert_eq!(parse_report_line("C|7").unwrap().tokens, ["C7"]);
        assert_eq!(parse_report_line("DR - 4").unwrap().tokens, ["DR4"]);
    }

    #[test]
    fn molecular_values_get_an_asterisk() {
        assert_eq!(
            parse_report_line("DR: 01:03 15").unwrap().tokens,
            ["DR*01:03", "DR15"]
        );
        assert_eq!(
            parse_report_line("DQB1: 4 05:01 *06").unwrap().tokens,
            ["DQB1*4", "DQB1*05:01", "DQB1*06"]
        );
    }

    #[test]
    fn serologic_values_under_asterisk_loci_keep_their_number() {
        assert_eq!(parse_report_line("DQB1: DQ4").unwrap().tokens, ["DQB1*4"]);
        assert_eq!(
            parse_report_line("DPB1: DP4, 2").unwrap().tokens,
            ["DPB1*4", "DPB1*2"]
        );
        assert_eq!(normalize("DQB1*4").as_str(), "DQB1*04");
    }

    #[test]
    fn hla_prefix_on_the_locus_is_accepted() {
        assert_eq!(parse_report_line("HLA-A: 2").unwrap().tokens, ["A2"]);
    }

    #[test]
    fn dq_and_dp_aliases_map_to_beta_chains() {
        let dq = parse_report_line("dq: 7").unwrap();
        assert_eq!(dq.locus, "DQB1");
        assert_eq!(dq.tokens, ["DQB1*7"]);
        assert_eq!(parse_report_line("DP: 4").unwrap().tokens, ["DPB1*4"]);
    }

    #[test]
    fn dr_associations_and_prefixed_values() {
        assert_eq!(
            parse_report_line("DR: 51 52 53 DR17").unwrap().tokens,
            ["DR51", "DR52", "DR53", "DR17"]
        );
    }

    #[test]
    fn lines_without_values_are_rejected() {
        assert_eq!(parse_report_line("B:"), None);
        assert_eq!(parse_report_line("B44"), None);
        assert_eq!(parse_report_line(": 18"), None);
        assert_eq!(parse_report_line("   "), None);
        assert_eq!(parse_report_line("Patient: Candidate 1042"), None);
    }

    #[test]
    fn report_text_collects_tokens_across_lines() {
        let text = "B: 18 39 41\nDR: 01:03 15\n\nnot an antigen line\nDQB1: 4 5 6\nB: 18\n";
        let tokens = parse_report_text(text);
        let expected: BTreeSet<String> = [
            "B18", "B39", "B41", "DR*01:03", "DR15", "DQB1*4", "DQB1*5", "DQB1*6",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn parsed_tokens_normalize_to_table_keys() {
        let keys: Vec<String> = parse_report_text("DQB1: 4\nDR: 01:03\nDQ: 2")
            .iter()
            .map(|t| normalize(t).as_str().to_string())
            .collect();
        assert_eq!(keys, ["DQB1*02", "DQB1*04", "DR1"]);
    }
}
