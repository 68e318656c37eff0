//! Time-dependent values shared by all conditions of an update cycle
//!
//! The environment is captured once at the start of every cycle so that
//! every condition sees the same time, sun position and random number.

use autostate_config::Location;
use autostate_core::Clock;
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc};
use rand::Rng;
use std::f64::consts::PI;
use tracing::trace;

/// Snapshot of the time-dependent values of one update cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub now: DateTime<FixedOffset>,
    /// Local time of day
    pub time: NaiveTime,
    /// 0 = Monday
    pub weekday: u32,
    /// 1 = January
    pub month: u32,
    /// Degrees clockwise from north
    pub sun_azimut: f64,
    /// Degrees above the horizon
    pub sun_altitude: f64,
    /// Random number in `0..=100`
    pub random: u32,
}

impl Environment {
    /// Capture the current values
    pub fn capture(clock: &dyn Clock, location: Option<Location>) -> Self {
        let now = clock.now();
        let (sun_azimut, sun_altitude) = match location {
            Some(location) => sun_position(now.with_timezone(&Utc), location),
            None => (0.0, 0.0),
        };
        let environment = Self {
            now,
            time: now.time(),
            weekday: now.weekday().num_days_from_monday(),
            month: now.month(),
            sun_azimut,
            sun_altitude,
            random: rand::thread_rng().gen_range(0..=100),
        };
        trace!(?environment, "Captured environment");
        environment
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.now.with_timezone(&Utc)
    }
}

/// Solar position (azimuth, altitude) in degrees
///
/// Low precision formulas of the Astronomical Almanac, accurate to about
/// 0.01 degrees between 1950 and 2050.
pub fn sun_position(at: DateTime<Utc>, location: Location) -> (f64, f64) {
    let rad = PI / 180.0;
    let julian_day = at.timestamp() as f64 / 86_400.0 + 2_440_587.5;
    let n = julian_day - 2_451_545.0;

    let mean_longitude = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let mean_anomaly = ((357.528 + 0.985_600_3 * n).rem_euclid(360.0)) * rad;
    let ecliptic_longitude = (mean_longitude
        + 1.915 * mean_anomaly.sin()
        + 0.020 * (2.0 * mean_anomaly).sin())
        * rad;
    let obliquity = (23.439 - 0.000_000_4 * n) * rad;

    let right_ascension = (obliquity.cos() * ecliptic_longitude.sin()).atan2(ecliptic_longitude.cos());
    let declination = (obliquity.sin() * ecliptic_longitude.sin()).asin();

    let sidereal_hours = (18.697_374_558 + 24.065_709_824_419_08 * n).rem_euclid(24.0);
    let local_sidereal = (sidereal_hours * 15.0 + location.longitude) * rad;
    let hour_angle = local_sidereal - right_ascension;

    let latitude = location.latitude * rad;
    let altitude = (latitude.sin() * declination.sin()
        + latitude.cos() * declination.cos() * hour_angle.cos())
    .asin();
    let azimuth = hour_angle
        .sin()
        .atan2(hour_angle.cos() * latitude.sin() - declination.tan() * latitude.cos())
        + PI;

    (azimuth / rad, altitude / rad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autostate_core::FixedClock;
    use chrono::{Duration, TimeZone};

    const MUNICH: Location = Location {
        latitude: 48.14,
        longitude: 11.58,
    };

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::at(23, 0);
        let environment = Environment::capture(&clock, None);
        assert_eq!(environment.time, NaiveTime::from_hms_opt(23, 0, 0).unwrap());
        assert_eq!(environment.weekday, 0);
        assert_eq!(environment.month, 6);
        assert!(environment.random <= 100);

        clock.advance(Duration::hours(2));
        let environment = Environment::capture(&clock, None);
        assert_eq!(environment.weekday, 1);
    }

    #[test]
    fn test_sun_at_noon_and_midnight() {
        let noon = Utc.with_ymd_and_hms(2024, 6, 21, 11, 15, 0).unwrap();
        let (azimuth, altitude) = sun_position(noon, MUNICH);
        assert!(altitude > 60.0 && altitude < 66.0, "altitude {}", altitude);
        assert!((azimuth - 180.0).abs() < 10.0, "azimuth {}", azimuth);

        let midnight = Utc.with_ymd_and_hms(2024, 6, 21, 23, 15, 0).unwrap();
        let (_, altitude) = sun_position(midnight, MUNICH);
        assert!(altitude < 0.0);
    }

    #[test]
    fn test_sun_rises_in_the_east() {
        let morning = Utc.with_ymd_and_hms(2024, 3, 20, 6, 0, 0).unwrap();
        let (azimuth, _) = sun_position(morning, MUNICH);
        assert!(azimuth > 60.0 && azimuth < 120.0, "azimuth {}", azimuth);
    }
}
