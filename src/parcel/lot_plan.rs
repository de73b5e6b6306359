use std::sync::OnceLock;

use regex::Regex;

use super::region::Region;

/// A normalised parcel identifier, e.g. `3RP123456` (QLD) or `43/1/DP12345` (NSW).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParcelQuery {
    pub region: Region,
    pub lot: String,
    pub section: Option<String>,
    pub plan: String,
}

fn lot_plan_regex() -> &'static Regex {
    static LOT_PLAN: OnceLock<Regex> = OnceLock::new();
    // e.g. 3RP123456, 12SP789, 101CP1234
    LOT_PLAN.get_or_init(|| Regex::new(r"^(\d+)([A-Z]{1,3}[0-9]+)$").unwrap())
}

/// Split raw multi-line user input into trimmed, non-empty identifiers.
pub fn split_inputs(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse whatever the user typed into a parcel query. Returns `None` for unrecognised input.
///
/// Accepted forms:
/// - `lot/plan` and `lot/section/plan` are NSW identifiers, the plan label keeps its prefix (`DP`).
/// - `{lot}{plan}` without separators is a QLD lot-plan.
pub fn parse_user_input(input: &str) -> Option<ParcelQuery> {
    let input = input.trim().to_uppercase();
    if input.is_empty() {
        return None;
    }

    if input.contains('/') {
        let parts: Vec<&str> = input.split('/').map(str::trim).collect();
        if parts.iter().any(|part| part.is_empty()) {
            return None;
        }
        return match parts.as_slice() {
            [lot, section, plan] => Some(ParcelQuery {
                region: Region::Nsw,
                lot: lot.to_string(),
                section: Some(section.to_string()),
                plan: plan.to_string(),
            }),
            [lot, plan] => Some(ParcelQuery {
                region: Region::Nsw,
                lot: lot.to_string(),
                section: None,
                plan: plan.to_string(),
            }),
            _ => None,
        };
    }

    let captures = lot_plan_regex().captures(&input)?;
    Some(ParcelQuery {
        region: Region::Qld,
        lot: captures[1].to_string(),
        section: None,
        plan: captures[2].to_string(),
    })
}
