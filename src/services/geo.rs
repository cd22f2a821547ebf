//! Geographic calculations

use crate::types::{Coordinates, NearbyCandidate, NearbyJob};

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate Haversine distance between two points in kilometers
pub fn haversine_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lng - from.lng).to_radians();

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Filter candidate requests to those within `radius_km` of `origin`,
/// nearest first. Candidates without stored coordinates cannot be placed
/// on the map and are dropped.
pub fn filter_nearby(
    origin: &Coordinates,
    candidates: Vec<NearbyCandidate>,
    radius_km: f64,
) -> Vec<NearbyJob> {
    let mut jobs: Vec<NearbyJob> = candidates
        .into_iter()
        .filter_map(|c| {
            let target = match (c.lat, c.lng) {
                (Some(lat), Some(lng)) => Coordinates { lat, lng },
                _ => return None,
            };
            let distance_km = haversine_distance(origin, &target);
            if distance_km > radius_km {
                return None;
            }
            Some(NearbyJob {
                service_request_id: c.service_request_id,
                service_id: c.service_id,
                service_name: c.service_name,
                city: c.city,
                appointment_at: c.appointment_at,
                quantity: c.quantity,
                total_price: c.total_price,
                distance_km,
            })
        })
        .collect();

    jobs.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn candidate(lat: Option<f64>, lng: Option<f64>) -> NearbyCandidate {
        NearbyCandidate {
            service_request_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            service_name: "Aircon cleaning".to_string(),
            city: "Bangkok".to_string(),
            appointment_at: Utc::now(),
            quantity: 1,
            total_price: 500.0,
            lat,
            lng,
        }
    }

    #[test]
    fn test_haversine_prague_brno() {
        let prague = Coordinates { lat: 50.0755, lng: 14.4378 };
        let brno = Coordinates { lat: 49.1951, lng: 16.6068 };

        let distance = haversine_distance(&prague, &brno);

        // Prague to Brno is approximately 185 km
        assert!((distance - 185.0).abs() < 5.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let point = Coordinates { lat: 50.0, lng: 14.0 };
        let distance = haversine_distance(&point, &point);
        assert!((distance - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_filter_includes_same_point() {
        let origin = Coordinates { lat: 13.75, lng: 100.50 };
        let jobs = filter_nearby(&origin, vec![candidate(Some(13.75), Some(100.50))], 10.0);
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].distance_km < 0.001);
    }

    #[test]
    fn test_filter_excludes_far_candidate() {
        let origin = Coordinates { lat: 13.75, lng: 100.50 };
        // ~50 km due north
        let jobs = filter_nearby(&origin, vec![candidate(Some(14.20), Some(100.50))], 10.0);
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_filter_drops_missing_coordinates() {
        let origin = Coordinates { lat: 13.75, lng: 100.50 };
        let jobs = filter_nearby(
            &origin,
            vec![candidate(None, None), candidate(Some(13.75), None)],
            10.0,
        );
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_filter_sorts_nearest_first() {
        let origin = Coordinates { lat: 13.75, lng: 100.50 };
        let far = candidate(Some(13.80), Some(100.50));
        let near = candidate(Some(13.76), Some(100.50));
        let near_id = near.service_request_id;

        let jobs = filter_nearby(&origin, vec![far, near], 10.0);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].service_request_id, near_id);
        assert!(jobs[0].distance_km <= jobs[1].distance_km);
    }
}
