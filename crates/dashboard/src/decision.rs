//! Client-side irrigation decision rule.  Used for `/api/simulate` and as
//! the answer to `/api/predict` when the remote model is unreachable.

use serde::Serialize;

use crate::models::Action;

/// Moisture (percent) below which the rule irrigates.
pub const IRRIGATE_BELOW: f64 = 35.0;

/// Expected moisture gain from one irrigation run.
const IRRIGATE_GAIN: f64 = 8.0;

/// Expected moisture loss while waiting.
const WAIT_LOSS: f64 = 1.0;

/// Valve-open duration recommended when irrigating.
const IRRIGATE_SECONDS: u32 = 120;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub predicted_moisture: f64,
    pub duration_seconds: u32,
}

/// Map the current soil moisture to an action, the moisture expected after
/// it, and a valve duration.  Total over all inputs: NaN compares false and
/// falls through to `Wait`.
pub fn decide(current_moisture: f64) -> Decision {
    if current_moisture < IRRIGATE_BELOW {
        Decision {
            action: Action::Irrigate,
            predicted_moisture: current_moisture + IRRIGATE_GAIN,
            duration_seconds: IRRIGATE_SECONDS,
        }
    } else {
        Decision {
            action: Action::Wait,
            predicted_moisture: current_moisture - WAIT_LOSS,
            duration_seconds: 0,
        }
    }
}
