//! Turning untrusted structured model output into in-bounds time ranges.

use crate::error::{Result, VidqueryError};
use crate::media::TimeRange;
use crate::model::{ModelGateway, OutputSchema, Part, RawTimestamp};
use tracing::{debug, info, warn};

/// Message surfaced when every attempt came back malformed.
pub const FORMAT_FAILURE_MESSAGE: &str =
    "There is an error with parsing due to incorrect formatting from the model. Try again!";

/// Parse `HH:MM:SS`, `MM:SS` or bare seconds into whole seconds.
pub fn parse_timestamp(value: &str) -> std::result::Result<u64, String> {
    let fields = value
        .trim()
        .split(':')
        .map(|f| {
            f.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid timestamp {value:?}: {e}"))
        })
        .collect::<std::result::Result<Vec<u64>, String>>()?;

    if fields.len() > 3 {
        return Err(format!("invalid timestamp {value:?}: too many fields"));
    }

    fields
        .iter()
        .try_fold(0u64, |total, &field| {
            total.checked_mul(60)?.checked_add(field)
        })
        .ok_or_else(|| format!("invalid timestamp {value:?}: out of range"))
}

/// What one attempt's candidates amount to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The model reported no matching segment.
    NothingFound,
    /// Every candidate was valid; zero-length ones were dropped.
    Accepted(Vec<TimeRange>),
    /// At least one candidate was unusable; the whole attempt is discarded.
    Malformed(String),
}

/// Validate candidates in order against the known video duration.
///
/// The first bad candidate makes the attempt malformed and nothing from it
/// is kept.
pub fn validate_candidates(candidates: &[RawTimestamp], video_duration: f64) -> AttemptOutcome {
    if candidates.is_empty() {
        return AttemptOutcome::NothingFound;
    }

    let mut accepted = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        debug!("Validating {:?}", candidate);

        let (start, end) = match (
            parse_timestamp(&candidate.start_time),
            parse_timestamp(&candidate.end_time),
        ) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(reason), _) | (_, Err(reason)) => return AttemptOutcome::Malformed(reason),
        };

        if start as f64 >= video_duration || end as f64 >= video_duration {
            return AttemptOutcome::Malformed(format!(
                "{}-{} is outside the video ({video_duration:.2}s)",
                candidate.start_time, candidate.end_time
            ));
        }

        if start == end {
            debug!("Dropping zero-length segment at {}s", start);
            continue;
        }

        match TimeRange::new(start, end) {
            Some(range) => accepted.push(range),
            None => {
                return AttemptOutcome::Malformed(format!(
                    "{}-{} ends before it starts",
                    candidate.start_time, candidate.end_time
                ))
            }
        }
    }

    AttemptOutcome::Accepted(accepted)
}

/// Ask the model for timestamps and retry until a well-formed answer arrives.
///
/// An empty answer is a success. Transport errors propagate at once; only
/// malformed output is retried, up to `max_retries` attempts in total.
pub async fn get_validated_ranges(
    gateway: &mut ModelGateway,
    parts: &[Part],
    system_instruction: &str,
    schema: OutputSchema,
    max_retries: u32,
    video_duration: f64,
) -> Result<Vec<TimeRange>> {
    for attempt in 1..=max_retries {
        info!("Timestamp attempt {}/{}", attempt, max_retries);

        let candidates = match gateway
            .generate_structured(parts.to_vec(), system_instruction, schema)
            .await
        {
            Ok(result) => result.into_candidates(),
            Err(VidqueryError::MalformedOutput(reason)) => {
                warn!("Attempt {} malformed: {}", attempt, reason);
                continue;
            }
            Err(e) => return Err(e),
        };

        match validate_candidates(&candidates, video_duration) {
            AttemptOutcome::NothingFound => {
                info!("Model found no matching segment");
                return Ok(Vec::new());
            }
            AttemptOutcome::Accepted(ranges) => {
                info!("Attempt {} accepted {} segment(s)", attempt, ranges.len());
                return Ok(ranges);
            }
            AttemptOutcome::Malformed(reason) => {
                warn!("Attempt {} malformed: {}", attempt, reason);
            }
        }
    }

    Err(VidqueryError::FormatValidation(
        FORMAT_FAILURE_MESSAGE.to_string(),
    ))
}
