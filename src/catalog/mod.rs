/// Reason Catalog / Breakdown Builder (C17)
///
/// Maps every reason code a detector or the orchestrator can emit to
/// (reference_points, category, description). Reference points are a
/// *weight* used to proportionally distribute an aggregate score delta
/// across the codes that produced it — they are not necessarily what ends
/// up in a given evaluation's breakdown, which carries each code's actual
/// contribution for that request.
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub reference_points: i32,
    pub category: &'static str,
    pub description: &'static str,
    /// Hidden codes exist only to keep breakdown sums honest (the
    /// `__*_BASE__` pseudo-codes); they must never reach analyst-facing UI.
    pub hidden: bool,
}

const fn e(reference_points: i32, category: &'static str, description: &'static str) -> CatalogEntry {
    CatalogEntry {
        reference_points,
        category,
        description,
        hidden: false,
    }
}

const fn hidden(category: &'static str, description: &'static str) -> CatalogEntry {
    CatalogEntry {
        reference_points: 0,
        category,
        description,
        hidden: true,
    }
}

macro_rules! exact_catalog {
    ($($code:literal => $entry:expr),+ $(,)?) => {
        &[$(($code, $entry)),+]
    };
}

static EXACT_CATALOG: &[(&str, CatalogEntry)] = exact_catalog! {
    "BLACKLIST_USER_HIT" => e(100, "blacklist", "User is on the fraud blacklist"),
    "BLACKLIST_DEVICE_HIT" => e(100, "blacklist", "Device is on the fraud blacklist"),
    "BLACKLIST_IP_HIT" => e(100, "blacklist", "IP address is on the fraud blacklist"),
    "BLACKLIST_BIN_HIT" => e(100, "blacklist", "Card BIN is on the fraud blacklist"),
    "BLACKLIST_EMAIL_HIT" => e(100, "blacklist", "Email is on the fraud blacklist"),
    "BLACKLIST_PHONE_HIT" => e(100, "blacklist", "Phone number is on the fraud blacklist"),

    "__VELOCITY_BASE__" => hidden("velocity", "Velocity baseline adjustment"),
    "VELOCITY_HIGH_TX_COUNT_10MIN" => e(40, "velocity", "More than three transactions in ten minutes"),
    "VELOCITY_MULTIPLE_BINS_24H" => e(50, "velocity", "More than two distinct card BINs used in 24 hours"),
    "VELOCITY_DAILY_LIMIT_EXCEEDED" => e(30, "velocity", "Daily transaction volume exceeds the soft limit"),
    "VELOCITY_TIER_HIGH" => e(0, "velocity", "Velocity score crossed the high-velocity tier"),

    "__DEVICE_BASE__" => hidden("device", "Device baseline adjustment"),
    "DEVICE_EMULATOR_DECLARED" => e(90, "device", "Client declared it is running on an emulator"),
    "DEVICE_ROOTED" => e(50, "device", "Device reports a rooted or jailbroken state"),
    "DEVICE_OS_UA_SDK_MISMATCH" => e(45, "device", "Declared SDK version contradicts the user-agent platform"),
    "DEVICE_UA_EMULATOR_SIGNATURE" => e(90, "device", "User-agent matches a known emulator signature"),
    "DEVICE_UA_TOO_SHORT" => e(35, "device", "User-agent string is implausibly short"),
    "DEVICE_OS_UA_MISMATCH" => e(40, "device", "Declared device OS contradicts the user-agent platform"),
    "DEVICE_BATTERY_FULL_MOBILE" => e(20, "device", "Battery reported at 100% on a mobile OS, typical of emulators"),
    "DEVICE_NETWORK_VPN_DECLARED" => e(15, "device", "Client declared it is connected over a VPN"),
    "DEVICE_SESSION_TOO_SHORT" => e(25, "device", "Session lasted under five seconds before submission"),
    "DEVICE_UNKNOWN_DEVICE" => e(20, "device", "Device has not been seen for this user before"),
    "DEVICE_MULTI_ACCOUNT_2" => e(20, "device", "Device has been used by two distinct users in 24 hours"),
    "DEVICE_MULTI_ACCOUNT_3PLUS" => e(65, "device", "Device has been used by three or more users in 24 hours"),
    "DEVICE_CARD_CHURN_10MIN" => e(70, "device", "Three or more distinct card BINs swiped on this device in ten minutes"),
    "DEVICE_TIER_EMULATOR_ROOT" => e(0, "device", "Device score crossed the emulator/root tier"),
    "DEVICE_TIER_SUSPICIOUS" => e(0, "device", "Device score crossed the suspicious-device tier"),

    "GPS_OBFUSCATED_ZERO_COORDS" => e(50, "geo", "GPS coordinates are exactly (0, 0)"),
    "TRAVELER_MODE_ACTIVE_REDUCTION" => e(-30, "geo", "User has declared travel to this country"),
    "COUNTRY_MISMATCH_TRIPLE" => e(25, "geo", "IP, GPS and card country all disagree"),
    "COUNTRY_MISMATCH_DUAL" => e(15, "geo", "IP and card country disagree"),
    "GPS_IP_DISTANCE_HIGH" => e(10, "geo", "GPS and IP locations are more than 500 km apart"),
    "IMPOSSIBLE_TRAVEL_DETECTED" => e(40, "geo", "Distance from the last transaction exceeds plausible travel speed"),
    "OVERRIDE_IMPOSSIBLE_TRAVEL" => e(0, "geo", "Impossible travel forces a minimum block-review score"),

    "BEHAVIOR_LEARNING_PERIOD" => e(-5, "behavior", "Account is within its profile learning period"),
    "PROFILE_CHANGED_LAST_24H" => e(25, "behavior", "User profile was changed in the last 24 hours"),
    "LOGIN_JUST_BEFORE_TX" => e(15, "behavior", "User logged in less than 30 seconds before this transaction"),
    "BEHAVIOR_HOUR_ATYPICAL" => e(15, "behavior", "Transaction hour is outside the user's typical hours"),
    "AMOUNT_10X_AVERAGE" => e(35, "behavior", "Amount is more than ten times the user's average"),
    "AMOUNT_3X_AVERAGE" => e(20, "behavior", "Amount is three to ten times the user's average"),
    "AMOUNT_3X_AVERAGE_PAYDAY_REDUCTION" => e(-10, "behavior", "Elevated amount coincides with a typical payday"),
    "CURRENCY_MISMATCH" => e(12, "behavior", "Currency differs from the user's primary currency"),
    "ACCOUNT_AGE_UNDER_7D" => e(10, "behavior", "Account is less than seven days old"),
    "NEW_RECIPIENT_NO_HISTORY" => e(10, "behavior", "No prior successful transfers to this recipient"),
    "FAMILIAR_RECIPIENT_REDUCTION" => e(-12, "behavior", "Recipient has a well-established transfer history"),

    "P2P_NEW_RECIPIENT_ACCOUNT" => e(20, "p2p", "Recipient account is less than 48 hours old"),
    "P2P_RECIPIENT_HIGH_RISK" => e(15, "p2p", "Recipient has an elevated accumulated risk score"),
    "P2P_FANOUT_1H_HIGH" => e(30, "p2p", "Sender has paid more than five distinct recipients in one hour"),
    "P2P_FANOUT_24H_HIGH" => e(15, "p2p", "Sender has paid more than fifteen distinct recipients in 24 hours"),
    "P2P_FANIN_1H_HIGH" => e(25, "p2p", "Recipient has received from more than five distinct senders in one hour"),
    "P2P_FANIN_24H_HIGH" => e(12, "p2p", "Recipient has received from more than ten distinct senders in 24 hours"),
    "P2P_RAPID_DRAIN" => e(40, "p2p", "Recipient drained most of a recent deposit within two hours"),
    "OVERRIDE_CONFIRMED_MULE" => e(0, "p2p", "Confirmed mule pattern forces a minimum block-permanent score"),

    "RATE_LIMIT_IP_EXTREME" => e(45, "rate_limit", "IP has made an extreme number of requests in one minute"),
    "RATE_LIMIT_IP_HIGH" => e(25, "rate_limit", "IP has made a high number of requests in one minute"),
    "RATE_LIMIT_IP_ELEVATED" => e(10, "rate_limit", "IP has an elevated request rate in one minute"),
    "RATE_LIMIT_USER_EXTREME" => e(40, "rate_limit", "User has made an extreme number of requests in five minutes"),
    "RATE_LIMIT_USER_HIGH" => e(20, "rate_limit", "User has made a high number of requests in five minutes"),
    "RATE_LIMIT_USER_ELEVATED" => e(8, "rate_limit", "User has an elevated request rate in five minutes"),

    "IMPOSSIBLE_IP_JUMP_5MIN" => e(50, "ip_history", "IP country changed within five minutes of the prior transaction"),
    "IP_COUNTRY_CHANGE_30MIN" => e(25, "ip_history", "IP country changed within thirty minutes of the prior transaction"),

    "GPS_IP_COUNTRY_MISMATCH" => e(20, "geo", "Bounding-box country from GPS disagrees with the IP country"),
    "GPS_COORDS_UNRESOLVED" => e(10, "geo", "GPS coordinates do not fall within any known country's bounding box"),

    "SESSION_REPLAY_ATTACK" => e(40, "session", "Session id was reused by its original owner"),
    "SESSION_HIJACK_DETECTED" => e(0, "session", "Session id was reused by a different user"),

    "FORM_FILL_TOO_FAST" => e(30, "device", "Form was filled in under three seconds"),
    "FORM_FILL_FAST" => e(15, "device", "Form was filled in three to eight seconds"),
    "FORM_FILL_SUSPICIOUSLY_SLOW" => e(10, "device", "Form took more than fifteen minutes to fill"),

    "ACCOUNT_AGE_BRACKET_LOW" => e(15, "history", "Account age falls in a higher-risk bracket"),
    "AMOUNT_ABOVE_HISTORICAL_AVG" => e(15, "history", "Amount exceeds the account's historical average"),
    "FAILED_TX_RECENT_HIGH" => e(15, "history", "Several failed transactions in the last seven days"),
    "NO_KYC_HIGH_AMOUNT" => e(25, "history", "High amount submitted without completed KYC"),
    "INTERNATIONAL_CARD_USED" => e(10, "history", "Card is issued internationally relative to the account"),

    "__EXTERNAL_BASE__" => hidden("external", "External reputation baseline adjustment"),
};

macro_rules! prefix_catalog {
    ($($code:literal => $entry:expr),+ $(,)?) => {
        &[$(($code, $entry)),+]
    };
}

static PREFIX_CATALOG: &[(&str, CatalogEntry)] = prefix_catalog! {
    "HIGH_RISK_COUNTRY_" => e(20, "geo", "Transaction touches a FATF-monitored high-risk country"),
    "NEW_COUNTRY_" => e(15, "geo", "First transaction ever observed from this country"),
    "KNOWN_COUNTRY_REDUCTION_" => e(-10, "geo", "Country has been seen before for this user"),
    "TRUST_REDUCTION_" => e(-1, "trust", "Positive account history reduces the score"),
    "SMURFING_DAILY_VOL_" => e(35, "p2p", "Small transfer pattern consistent with structuring"),
    "RAPID_BIN_PROBE_" => e(35, "card_testing", "Same card BIN probed rapidly across devices"),
    "CARD_TESTING_PATTERN_" => e(40, "card_testing", "Series of small probe amounts preceded a large charge"),
    "UNUSUAL_HOUR_" => e(15, "time_pattern", "User has never transacted at this hour before"),
};

pub struct Catalog;

impl Catalog {
    pub fn lookup(code: &str) -> Option<CatalogEntry> {
        if let Some((_, entry)) = EXACT_CATALOG.iter().find(|(k, _)| *k == code) {
            return Some(*entry);
        }
        PREFIX_CATALOG
            .iter()
            .find(|(prefix, _)| code.starts_with(prefix))
            .map(|(_, entry)| *entry)
    }

    pub fn category(code: &str) -> String {
        Self::lookup(code)
            .map(|e| e.category.to_string())
            .unwrap_or_else(|| "uncategorized".to_string())
    }

    pub fn description(code: &str) -> String {
        Self::lookup(code)
            .map(|e| e.description.to_string())
            .unwrap_or_else(|| code.to_string())
    }

    /// Validates, at start-up, that every code a detector can ever emit
    /// resolves via exact or prefix match. Called with a fixed sample of
    /// representative (including parameterized) codes; a configuration
    /// error here is fatal per §7.
    pub fn validate_completeness(sample_codes: &[String]) -> Result<(), String> {
        for code in sample_codes {
            if Self::lookup(code).is_none() {
                return Err(format!("reason code '{code}' has no catalog entry"));
            }
        }
        Ok(())
    }
}

/// Proportionally distributes `total` across `codes` by catalog reference
/// weight (clamped to ≥0, defaulting to 1 for an unresolved code).
/// Zero-weight (informational) codes always receive 0. The last code with
/// positive weight absorbs the exact remainder so the sum always equals
/// `total` exactly, not merely approximately.
pub fn distribute_to_contributions(total: i32, codes: &[String]) -> Vec<(String, i32)> {
    let weights: Vec<i32> = codes
        .iter()
        .map(|c| {
            Catalog::lookup(c)
                .map(|entry| entry.reference_points.max(0))
                .unwrap_or(1)
        })
        .collect();

    let total_weight: i32 = weights.iter().sum();

    if codes.is_empty() || total_weight == 0 || total == 0 {
        return codes.iter().map(|c| (c.clone(), 0)).collect();
    }

    let last_positive = weights.iter().rposition(|&w| w > 0);
    let mut remainder = total;
    let mut out = Vec::with_capacity(codes.len());

    for (i, code) in codes.iter().enumerate() {
        if weights[i] == 0 {
            out.push((code.clone(), 0));
            continue;
        }
        if Some(i) == last_positive {
            out.push((code.clone(), remainder));
        } else {
            let share =
                (total as f64 * weights[i] as f64 / total_weight as f64).round() as i32;
            remainder -= share;
            out.push((code.clone(), share));
        }
    }
    out
}

/// Builds the analyst-facing breakdown from (code, actual_points) pairs,
/// sorted by signed points descending (reductions sort to the bottom, not
/// just low-impact codes).
pub fn build_breakdown(
    contributions: &[(String, i32)],
) -> Vec<crate::domain::BreakdownEntry> {
    let mut out: Vec<crate::domain::BreakdownEntry> = contributions
        .iter()
        .filter(|(code, _)| !Catalog::lookup(code).map(|e| e.hidden).unwrap_or(false))
        .map(|(code, points)| crate::domain::BreakdownEntry {
            code: code.clone(),
            points: *points,
            category: Catalog::category(code),
            description: Catalog::description(code),
        })
        .collect();
    out.sort_by(|a, b| b.points.cmp(&a.points));
    out
}

/// Removes duplicate reason codes, keeping first-seen order.
pub fn dedup_preserve_order(codes: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut out = Vec::with_capacity(codes.len());
    for code in codes {
        if seen.insert(code.clone(), ()).is_none() {
            out.push(code);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_prefix_codes_resolve() {
        assert!(Catalog::lookup("BLACKLIST_DEVICE_HIT").is_some());
        assert!(Catalog::lookup("NEW_COUNTRY_MX").is_some());
        assert!(Catalog::lookup("TRUST_REDUCTION_15PTS").is_some());
        assert!(Catalog::lookup("CARD_TESTING_PATTERN_3_PROBES").is_some());
        assert!(Catalog::lookup("TOTALLY_UNKNOWN_CODE").is_none());
    }

    #[test]
    fn hidden_codes_are_excluded_from_breakdown() {
        let contributions = vec![
            ("__VELOCITY_BASE__".to_string(), 0),
            ("VELOCITY_HIGH_TX_COUNT_10MIN".to_string(), 40),
        ];
        let breakdown = build_breakdown(&contributions);
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].code, "VELOCITY_HIGH_TX_COUNT_10MIN");
    }

    #[test]
    fn distribution_sums_exactly_to_total() {
        let codes = vec![
            "VELOCITY_HIGH_TX_COUNT_10MIN".to_string(),
            "VELOCITY_MULTIPLE_BINS_24H".to_string(),
            "VELOCITY_DAILY_LIMIT_EXCEEDED".to_string(),
        ];
        let contributions = distribute_to_contributions(77, &codes);
        let sum: i32 = contributions.iter().map(|(_, p)| p).sum();
        assert_eq!(sum, 77);
    }

    #[test]
    fn breakdown_sorts_by_signed_points_descending() {
        let contributions = vec![
            ("KNOWN_COUNTRY_REDUCTION_MX".to_string(), -10),
            ("VELOCITY_HIGH_TX_COUNT_10MIN".to_string(), 40),
            ("TRUST_REDUCTION_15PTS".to_string(), -15),
        ];
        let breakdown = build_breakdown(&contributions);
        assert_eq!(breakdown[0].points, 40);
        assert_eq!(breakdown[2].points, -15);
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let codes = vec!["A".to_string(), "B".to_string(), "A".to_string()];
        assert_eq!(dedup_preserve_order(codes), vec!["A".to_string(), "B".to_string()]);
    }
}
