//! Randomized checks of cache-key derivation.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, Utc};
use rand::{Rng, seq::IndexedRandom};
use weather_core::{Location, WeatherRequest, cache::derive_key};

const PAIRS: usize = 10_000;

/// Days kept clear of both ends of the accepted window, so a run that crosses UTC midnight
/// never builds a request on the boundary.
const EDGE_MARGIN: i64 = 3;

const CITIES: &[&str] = &[
    "London", "Paris", "New-York", "O'Fallon", "São Paulo", "Saint Louis", "Saint-Louis",
    "Zürich", "Kraków", "Los Angeles", "Reykjavik", "Ho Chi Minh",
];
const COUNTRIES: &[&str] = &["UK", "France", "USA", "Brazil", "Switzerland", "Poland", "Vietnam"];

fn random_date(rng: &mut impl Rng, today: NaiveDate) -> NaiveDate {
    // the changed-date request steps one day back, so keep one more day of margin there
    today + Duration::days(rng.random_range(-365 + EDGE_MARGIN + 1..=30 - EDGE_MARGIN))
}

fn random_location(rng: &mut impl Rng) -> Location {
    if rng.random_bool(0.5) {
        let lat = rng.random_range(-89.0..89.0);
        let lon = rng.random_range(-179.0..179.0);
        Location::from_coordinates(lat, lon).unwrap()
    } else {
        let city = CITIES.choose(rng).unwrap();
        let country = COUNTRIES.choose(rng).unwrap();
        Location::from_city(city, country).unwrap()
    }
}

/// A location guaranteed to have a different identity than `base`.
fn different_location(rng: &mut impl Rng, base: &Location) -> Location {
    if base.has_coordinates() {
        // shift by at least 0.001 degrees, well above key precision
        let delta = rng.random_range(0.001..0.5);
        let lat = if base.latitude() > 0.0 {
            base.latitude() - delta
        } else {
            base.latitude() + delta
        };
        Location::from_coordinates(lat, base.longitude()).unwrap()
    } else {
        let city = base.city().unwrap();
        let country = base.country().unwrap();
        let other_city = CITIES
            .iter()
            .copied()
            .filter(|c| *c != city)
            .collect::<Vec<_>>();
        Location::from_city(other_city.choose(rng).unwrap(), country).unwrap()
    }
}

#[test]
fn single_field_changes_never_collide() {
    let mut rng = rand::rng();
    let today = Utc::now().date_naive();

    for _ in 0..PAIRS {
        let location = random_location(&mut rng);
        let date = random_date(&mut rng, today);
        let hourly = rng.random_bool(0.5);
        let base = WeatherRequest::new(location.clone(), date, hourly).unwrap();
        let base_key = derive_key(&base);

        assert_eq!(base_key, derive_key(&base.clone()));

        let other_date = date - Duration::days(1);
        let changed = [
            WeatherRequest::new(location.clone(), other_date, hourly).unwrap(),
            WeatherRequest::new(location.clone(), date, !hourly).unwrap(),
            WeatherRequest::new(different_location(&mut rng, &location), date, hourly).unwrap(),
        ];

        for request in &changed {
            assert_ne!(base_key, derive_key(request), "collision for {request:?}");
        }
    }
}

#[test]
fn distinct_requests_yield_distinct_keys() {
    let today = Utc::now().date_naive();
    let mut seen = HashSet::new();
    let mut requests = 0;

    for city in CITIES {
        for country in COUNTRIES {
            for offset in -3..=3 {
                for hourly in [false, true] {
                    let location = Location::from_city(city, country).unwrap();
                    let request =
                        WeatherRequest::new(location, today + Duration::days(offset), hourly)
                            .unwrap();
                    seen.insert(derive_key(&request));
                    requests += 1;
                }
            }
        }
    }

    assert_eq!(seen.len(), requests);
}
