//! Global functions available in autostate expressions

use minijinja::value::Value;
use minijinja::{Error, ErrorKind, State};
use rand::Rng;
use tracing::debug;

use crate::filters::value_to_f64;

/// Context key of the mapping holding every variable by its full name
pub const VARIABLES: &str = "variables";

fn lookup_variable(state: &State, name: &str) -> Option<Value> {
    let value = state
        .lookup(VARIABLES)?
        .get_item(&Value::from(name))
        .ok()?;
    (!value.is_undefined()).then_some(value)
}

/// Get an engine variable by dotted name
///
/// Unknown variables yield a descriptive text instead of an error so a
/// misspelled name shows up in the log output of the action using it.
pub fn get_variable(state: &State, name: &str) -> Value {
    lookup_variable(state, name)
        .unwrap_or_else(|| Value::from(format!("(Unknown variable '{}'!)", name)))
}

/// Random integer in `[min, max]` (defaults 0 and 255)
pub fn random_int(min: Option<i64>, max: Option<i64>) -> Result<i64, Error> {
    let min = min.unwrap_or(0);
    let max = max.unwrap_or(255);
    debug!(min, max, "Executing random_int");
    if min > max {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("random_int: min {} is greater than max {}", min, max),
        ));
    }
    Ok(rand::thread_rng().gen_range(min..=max))
}

/// Lamella angle for sun tracking: blinds at right angle to the sun
///
/// Uses `current.sun_altitude` from the cycle's environment snapshot.
pub fn sun_tracking(state: &State) -> Result<f64, Error> {
    let altitude = lookup_variable(state, "current.sun_altitude")
        .as_ref()
        .and_then(value_to_f64)
        .ok_or_else(|| {
            Error::new(
                ErrorKind::UndefinedError,
                "sun_tracking: current.sun_altitude is not available",
            )
        })?;
    let value = 90.0 - altitude;
    debug!(altitude, value, "Executing sun_tracking");
    Ok(value)
}
