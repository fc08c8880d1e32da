/// GPS/IP Mismatch (C11)
///
/// A narrower, standalone check against the same bounding-box table the geo
/// analyzer uses for its own triple/dual mismatch signal (see DESIGN.md for
/// why the two tables were unified rather than kept as separate copies).
use crate::detectors::geo::country_from_coords;

#[derive(Debug, Clone, Default)]
pub struct GpsIpMismatchResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
}

pub fn evaluate(lat: f64, lon: f64, ip_country: &str) -> GpsIpMismatchResult {
    let gps_country = country_from_coords(lat, lon);

    match gps_country {
        Some(country) if country != ip_country => GpsIpMismatchResult {
            score: 20.0,
            reason_codes: vec!["GPS_IP_COUNTRY_MISMATCH".to_string()],
        },
        None => GpsIpMismatchResult {
            score: 10.0,
            reason_codes: vec!["GPS_COORDS_UNRESOLVED".to_string()],
        },
        _ => GpsIpMismatchResult::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_between_mexico_coords_and_russia_ip() {
        let result = evaluate(19.43, -99.13, "RU");
        assert_eq!(result.score, 20.0);
        assert_eq!(result.reason_codes, vec!["GPS_IP_COUNTRY_MISMATCH"]);
    }

    #[test]
    fn matching_country_scores_zero() {
        let result = evaluate(19.43, -99.13, "MX");
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn unresolved_coords_score_low() {
        let result = evaluate(0.1, 0.1, "MX");
        assert_eq!(result.score, 10.0);
    }
}
