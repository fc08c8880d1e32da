/// Geo Analyzer (C5)
///
/// Country triangulation across IP, GPS and card BIN, impossible-travel
/// detection, country history and traveler mode. Checks run sequentially
/// and some short-circuit the rest, mirroring the source's early-return
/// structure rather than accumulating every possible penalty unconditionally.
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::CounterCache;
use crate::core::config::EngineConfig;
use crate::core::errors::EngineResult;
use crate::domain::request::EnrichedRequest;
use crate::storage::redis_cache::keys;

const EARTH_RADIUS_KM: f64 = 6371.0;
const MAX_FLIGHT_SPEED_KMH: f64 = 900.0;
const AIRPORT_BUFFER_HOURS: f64 = 3.0;
const MIN_DISTANCE_FOR_CHECK_KM: f64 = 100.0;
const GPS_IP_DISTANCE_THRESHOLD_KM: f64 = 500.0;
const LAST_TX_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
const HISTORY_TTL: Duration = Duration::from_secs(90 * 24 * 3600);
const HISTORY_MAX_COUNTRIES: usize = 20;

/// Bounding boxes used both here (GPS→country inference for the triple/dual
/// mismatch check) and by the GPS/IP mismatch detector (C11). The source
/// kept two separate, differently-sized tables for these two call sites;
/// this re-expression unifies them into one (see DESIGN.md).
pub const COUNTRY_BBOXES: &[(&str, f64, f64, f64, f64)] = &[
    // (country, min_lat, max_lat, min_lon, max_lon)
    ("MX", 14.5, 32.7, -118.4, -86.7),
    ("US", 24.5, 49.4, -125.0, -66.9),
    ("ES", 36.0, 43.8, -9.3, 3.3),
    ("CA", 41.7, 83.1, -141.0, -52.6),
    ("BR", -33.7, 5.3, -73.9, -34.8),
    ("AR", -55.1, -21.8, -73.6, -53.6),
    ("CO", -4.2, 12.5, -81.8, -66.9),
    ("CL", -55.9, -17.5, -75.6, -66.4),
    ("PE", -18.4, -0.0, -81.3, -68.7),
    ("GB", 49.9, 58.7, -8.2, 1.8),
    ("FR", 41.3, 51.1, -5.1, 9.6),
    ("DE", 47.3, 55.1, 5.9, 15.0),
    ("IT", 36.6, 47.1, 6.6, 18.5),
    ("PT", 36.9, 42.2, -9.5, -6.2),
    ("RU", 41.2, 81.9, 19.6, 180.0),
    ("CN", 18.2, 53.6, 73.5, 134.8),
    ("JP", 24.0, 45.6, 122.9, 145.8),
    ("IN", 6.7, 35.5, 68.1, 97.4),
    ("AU", -43.6, -10.7, 113.3, 153.6),
    ("ZA", -34.8, -22.1, 16.5, 32.9),
    ("NG", 4.3, 13.9, 2.7, 14.7),
    ("AE", 22.6, 26.1, 51.5, 56.4),
    ("TR", 36.0, 42.1, 26.0, 44.8),
    ("VE", 0.7, 12.2, -73.4, -59.8),
];

const COUNTRY_CENTROIDS: &[(&str, f64, f64)] = &[
    ("MX", 23.6, -102.5),
    ("US", 37.1, -95.7),
    ("ES", 40.5, -3.7),
    ("CA", 56.1, -106.3),
    ("BR", -14.2, -51.9),
    ("AR", -38.4, -63.6),
    ("CO", 4.6, -74.3),
    ("GB", 55.4, -3.4),
    ("FR", 46.2, 2.2),
    ("DE", 51.2, 10.4),
    ("RU", 61.5, 105.3),
    ("CN", 35.9, 104.2),
    ("JP", 36.2, 138.3),
    ("AU", -25.3, 133.8),
];

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

pub fn country_from_coords(lat: f64, lon: f64) -> Option<&'static str> {
    COUNTRY_BBOXES
        .iter()
        .find(|(_, min_lat, max_lat, min_lon, max_lon)| {
            lat >= *min_lat && lat <= *max_lat && lon >= *min_lon && lon <= *max_lon
        })
        .map(|(code, ..)| *code)
}

fn centroid(country: &str) -> Option<(f64, f64)> {
    COUNTRY_CENTROIDS
        .iter()
        .find(|(code, ..)| *code == country)
        .map(|(_, lat, lon)| (*lat, *lon))
}

#[derive(Debug, Clone, Default)]
pub struct GeoResult {
    pub score: f64,
    pub reason_codes: Vec<String>,
    pub impossible_travel_detected: bool,
}

struct LastTx {
    lat: f64,
    lon: f64,
    country: String,
    ts: DateTime<Utc>,
}

fn parse_last_tx(raw: &str) -> Option<LastTx> {
    let mut parts = raw.splitn(4, '|');
    let lat: f64 = parts.next()?.parse().ok()?;
    let lon: f64 = parts.next()?.parse().ok()?;
    let country = parts.next()?.to_string();
    let ts = parts.next()?.parse::<i64>().ok()?;
    Some(LastTx {
        lat,
        lon,
        country,
        ts: DateTime::from_timestamp(ts, 0)?,
    })
}

fn format_last_tx(lat: f64, lon: f64, country: &str, ts: DateTime<Utc>) -> String {
    format!("{lat}|{lon}|{country}|{}", ts.timestamp())
}

async fn update_last_location(
    cache: &dyn CounterCache,
    uid: &str,
    lat: f64,
    lon: f64,
    country: &str,
) -> EngineResult<()> {
    cache
        .set_ex(
            &keys::geo_last_tx(uid),
            &format_last_tx(lat, lon, country, Utc::now()),
            LAST_TX_TTL,
        )
        .await
}

/// Rewrites the bounded (≤20) country history as a true-LRU, order
/// preserving list. The source converts a Python `set()` to a list and
/// slices it, which has no defined order; this re-expression keeps the
/// list explicit so eviction is always deterministic.
async fn touch_country_history(
    cache: &dyn CounterCache,
    uid: &str,
    country: &str,
) -> EngineResult<bool> {
    let key = keys::geo_country_history(uid);
    let mut history = cache.lrange_all(&key).await?;
    let is_new = !history.iter().any(|c| c == country);
    history.retain(|c| c != country);
    history.insert(0, country.to_string());
    history.truncate(HISTORY_MAX_COUNTRIES);

    cache.delete(&key).await?;
    for c in history.iter().rev() {
        cache.lpush_capped(&key, c, HISTORY_MAX_COUNTRIES, HISTORY_TTL).await?;
    }
    Ok(is_new)
}

async fn traveler_mode_destinations(
    cache: &dyn CounterCache,
    uid: &str,
) -> EngineResult<Option<Vec<String>>> {
    Ok(cache
        .get(&keys::geo_traveler_mode(uid))
        .await?
        .map(|v| v.split(',').map(|s| s.to_string()).collect()))
}

pub async fn set_traveler_mode(
    cache: &dyn CounterCache,
    uid: &str,
    countries: &[String],
    duration: Duration,
) -> EngineResult<()> {
    cache
        .set_ex(&keys::geo_traveler_mode(uid), &countries.join(","), duration)
        .await
}

pub async fn cancel_traveler_mode(cache: &dyn CounterCache, uid: &str) -> EngineResult<()> {
    cache.delete(&keys::geo_traveler_mode(uid)).await
}

pub async fn evaluate(
    cache: &dyn CounterCache,
    cfg: &EngineConfig,
    req: &EnrichedRequest,
) -> EngineResult<GeoResult> {
    let r = &req.request;
    let uid = r.user_id.to_string();
    let ip_country = req.enrichment.ip_country.clone();
    let bin_country = req.enrichment.bin_country.clone();

    if r.latitude == 0.0 && r.longitude == 0.0 {
        update_last_location(cache, &uid, r.latitude, r.longitude, &ip_country).await?;
        return Ok(GeoResult {
            score: 50.0,
            reason_codes: vec!["GPS_OBFUSCATED_ZERO_COORDS".to_string()],
            impossible_travel_detected: false,
        });
    }

    if let Some(destinations) = traveler_mode_destinations(cache, &uid).await? {
        if destinations.iter().any(|c| c == &ip_country) {
            update_last_location(cache, &uid, r.latitude, r.longitude, &ip_country).await?;
            touch_country_history(cache, &uid, &ip_country).await?;
            return Ok(GeoResult {
                score: -30.0,
                reason_codes: vec!["TRAVELER_MODE_ACTIVE_REDUCTION".to_string()],
                impossible_travel_detected: false,
            });
        }
    }

    let mut score = 0.0;
    let mut codes = Vec::new();

    let gps_country = country_from_coords(r.latitude, r.longitude).map(|s| s.to_string());

    let mut distinct: Vec<&str> = Vec::new();
    for candidate in [Some(ip_country.as_str()), gps_country.as_deref(), Some(bin_country.as_str())]
        .into_iter()
        .flatten()
    {
        if !candidate.is_empty() && !distinct.contains(&candidate) {
            distinct.push(candidate);
        }
    }
    if distinct.len() == 3 {
        score += 25.0;
        codes.push("COUNTRY_MISMATCH_TRIPLE".to_string());
    } else if distinct.len() == 2 && ip_country != bin_country {
        score += 15.0;
        codes.push("COUNTRY_MISMATCH_DUAL".to_string());
    }

    let high_risk_match = [ip_country.as_str(), gps_country.as_deref().unwrap_or("")]
        .into_iter()
        .find(|c| cfg.fatf_high_risk_countries.iter().any(|hr| hr == c));
    if let Some(country) = high_risk_match {
        if !country.is_empty() {
            score += 20.0;
            codes.push(format!("HIGH_RISK_COUNTRY_{country}"));
        }
    }

    if let Some((clat, clon)) = centroid(&ip_country) {
        if haversine_km(r.latitude, r.longitude, clat, clon) > GPS_IP_DISTANCE_THRESHOLD_KM {
            score += 10.0;
            codes.push("GPS_IP_DISTANCE_HIGH".to_string());
        }
    }

    let mut impossible_travel_detected = false;
    if let Some(raw) = cache.get(&keys::geo_last_tx(&uid)).await? {
        if let Some(last) = parse_last_tx(&raw) {
            let distance = haversine_km(last.lat, last.lon, r.latitude, r.longitude);
            if last.country != ip_country && distance >= MIN_DISTANCE_FOR_CHECK_KM {
                let elapsed_hours = (r.timestamp - last.ts).num_seconds() as f64 / 3600.0;
                let required_hours = distance / MAX_FLIGHT_SPEED_KMH + AIRPORT_BUFFER_HOURS;
                if elapsed_hours < required_hours {
                    score += 40.0;
                    codes.push("IMPOSSIBLE_TRAVEL_DETECTED".to_string());
                    impossible_travel_detected = true;
                }
            }
        }
    }

    let is_new_country = touch_country_history(cache, &uid, &ip_country).await?;
    if is_new_country {
        score += 15.0;
        codes.push(format!("NEW_COUNTRY_{ip_country}"));
    } else {
        score -= 10.0;
        codes.push(format!("KNOWN_COUNTRY_REDUCTION_{ip_country}"));
    }

    update_last_location(cache, &uid, r.latitude, r.longitude, &ip_country).await?;

    Ok(GeoResult {
        score: score.clamp(0.0, 100.0),
        reason_codes: codes,
        impossible_travel_detected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::core::config::EngineConfig;
    use crate::domain::request::*;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn cfg() -> EngineConfig {
        EngineConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            redis_url: String::new(),
            hmac_secret: "secret".to_string(),
            weights: crate::core::config::Weights::default(),
            fan_out_deadline_ms: 200,
            external_reputation_timeout_ms: 80,
            cache_op_timeout_ms: 500,
            fatf_high_risk_countries: vec!["RU".to_string(), "KP".to_string()],
            api_keys: vec![],
            enable_auth: false,
            rate_limit_per_minute: 60,
        }
    }

    fn request_at(lat: f64, lon: f64, ip_country: &str, ts: DateTime<Utc>) -> EnrichedRequest {
        EnrichedRequest::new(
            TransactionRequest {
                user_id: Uuid::new_v4(),
                device_id: "dev".to_string(),
                card_bin: "411111".to_string(),
                amount: 80.0,
                currency: "USD".to_string(),
                ip_address: "1.1.1.1".to_string(),
                latitude: lat,
                longitude: lon,
                transaction_type: TransactionType::Payment,
                recipient_id: None,
                session_id: Uuid::new_v4(),
                timestamp: ts,
                user_agent: "Mozilla/5.0 (Linux; Android 13)".to_string(),
                sdk_version: "android-2.3.0".to_string(),
                device: DeviceContext {
                    os: DeviceOs::Android,
                    model: "Pixel".to_string(),
                    rooted: false,
                    emulator: false,
                    network_type: NetworkType::Wifi,
                    battery_level: 50,
                },
                history: UserHistoryHints {
                    account_age_days: 400,
                    avg_monthly_amount: 1000.0,
                    tx_count_30d: 10,
                    failed_tx_7d: 0,
                    time_since_last_tx_minutes: None,
                    kyc_level: KycLevel::Full,
                    session_duration_seconds: 120,
                    form_fill_time_seconds: 20,
                    card_last4: "1111".to_string(),
                    is_international_card: false,
                    merchant_category: None,
                },
            },
            EnrichmentContext {
                ip_country: ip_country.to_string(),
                bin_country: ip_country.to_string(),
                is_vpn: false,
                ip_city: None,
                card_type: None,
                card_brand: None,
            },
        )
    }

    #[tokio::test]
    async fn zero_coords_short_circuits() {
        let cache = MemoryCache::new();
        let cfg = cfg();
        let req = request_at(0.0, 0.0, "MX", Utc::now());
        let result = evaluate(&cache, &cfg, &req).await.unwrap();
        assert_eq!(result.score, 50.0);
        assert_eq!(result.reason_codes, vec!["GPS_OBFUSCATED_ZERO_COORDS"]);
    }

    #[tokio::test]
    async fn impossible_travel_is_detected() {
        let cache = MemoryCache::new();
        let cfg = cfg();
        let t0 = Utc::now() - ChronoDuration::hours(10);
        let first = request_at(19.43, -99.13, "MX", t0);
        evaluate(&cache, &cfg, &first).await.unwrap();

        let second = request_at(55.75, 37.62, "RU", t0 + ChronoDuration::minutes(30));
        let result = evaluate(&cache, &cfg, &second).await.unwrap();
        assert!(result.impossible_travel_detected);
        assert!(result.reason_codes.contains(&"IMPOSSIBLE_TRAVEL_DETECTED".to_string()));
    }

    #[tokio::test]
    async fn known_country_reduces_score() {
        let cache = MemoryCache::new();
        let cfg = cfg();
        let t0 = Utc::now();
        let first = request_at(19.43, -99.13, "MX", t0);
        evaluate(&cache, &cfg, &first).await.unwrap();
        let second = request_at(19.43, -99.13, "MX", t0 + ChronoDuration::hours(1));
        let result = evaluate(&cache, &cfg, &second).await.unwrap();
        assert!(result.reason_codes.iter().any(|c| c.starts_with("KNOWN_COUNTRY_REDUCTION_")));
    }
}
