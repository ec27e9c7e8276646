//! Tag-set construction for trial runs.
//!
//! Tags come from an ordered list of sources folded left to right, so a key
//! present in a later source replaces the earlier value:
//!
//! 1. trial metadata (`number`, timestamps, `state`, `direction`)
//! 2. trial user attributes
//! 3. `<param>_distribution` descriptions
//! 4. study user attributes (opt-in)

use std::collections::BTreeMap;

use tracing::warn;

use crate::study::{float_text, Study, Trial};

/// Appended to a shortened tag value.
const PLACEHOLDER: &str = " [...]";

/// A flat mapping of tag key to tag text.
pub type TagMap = BTreeMap<String, String>;

/// Build the ordered tag sources for a trial.
#[must_use]
pub fn tag_sources(study: &Study, trial: &Trial, include_study_attrs: bool) -> Vec<TagMap> {
    let mut sources = vec![
        metadata_tags(study, trial),
        attr_tags(trial.user_attrs()),
        distribution_tags(trial),
    ];
    if include_study_attrs {
        sources.push(attr_tags(study.user_attrs()));
    }
    sources
}

/// Fold sources into one map; later sources win on conflicting keys.
#[must_use]
pub fn fold_sources<I>(sources: I) -> TagMap
where
    I: IntoIterator<Item = TagMap>,
{
    sources.into_iter().fold(TagMap::new(), |mut acc, source| {
        acc.extend(source);
        acc
    })
}

/// Full tag set for a trial, with every value fitted to `max_len` characters.
#[must_use]
pub fn trial_tags(study: &Study, trial: &Trial, include_study_attrs: bool, max_len: usize) -> TagMap {
    let mut tags = fold_sources(tag_sources(study, trial, include_study_attrs));
    for (key, value) in &mut tags {
        let len = value.chars().count();
        if len > max_len {
            warn!(tag = %key, len, max_len, "shortening tag value");
            *value = shorten(value, max_len);
        }
    }
    tags
}

fn metadata_tags(study: &Study, trial: &Trial) -> TagMap {
    let mut tags = TagMap::new();
    tags.insert("number".to_string(), trial.number().to_string());
    tags.insert(
        "datetime_start".to_string(),
        timestamp_text(trial.datetime_start()),
    );
    tags.insert(
        "datetime_complete".to_string(),
        timestamp_text(trial.datetime_complete()),
    );
    if trial.state().is_finished() {
        tags.insert("state".to_string(), trial.state().as_str().to_string());
    }
    tags.insert(
        "direction".to_string(),
        study.direction().as_str().to_string(),
    );
    tags
}

/// `2024-01-02 03:04:05.123456`; the fraction is dropped when it is zero.
fn timestamp_text(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    ts.map_or_else(
        || "None".to_string(),
        |t| {
            let seconds = t.format("%Y-%m-%d %H:%M:%S");
            match t.timestamp_subsec_micros() {
                0 => seconds.to_string(),
                micros => format!("{seconds}.{micros:06}"),
            }
        },
    )
}

fn attr_tags(attrs: &BTreeMap<String, serde_json::Value>) -> TagMap {
    attrs
        .iter()
        .map(|(key, value)| (key.clone(), attr_text(value)))
        .collect()
}

fn distribution_tags(trial: &Trial) -> TagMap {
    trial
        .distributions()
        .iter()
        .map(|(name, dist)| (format!("{name}_distribution"), dist.to_string()))
        .collect()
}

/// Text form of an attribute.
///
/// Strings are used as-is. Scalars use the same spelling as params
/// (`True`, `None`, `1e-06`); arrays and objects become compact JSON.
#[must_use]
pub fn attr_text(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) if n.is_f64() => n.as_f64().map_or_else(|| n.to_string(), float_text),
        other => other.to_string(),
    }
}

/// Shorten `text` to at most `width` characters.
///
/// Whitespace runs collapse to single spaces and whole words are kept
/// while they fit alongside the ` [...]` placeholder. If not even the first
/// word fits, the result is the bare placeholder `[...]`. Widths too small
/// for the placeholder fall back to a hard cut.
#[must_use]
pub fn shorten(text: &str, width: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let collapsed = words.join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(PLACEHOLDER.len());
    let mut out = String::new();
    let mut len = 0;
    for word in words {
        let word_len = word.chars().count();
        let next = if out.is_empty() {
            word_len
        } else {
            len + 1 + word_len
        };
        if next > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        len = next;
    }

    if !out.is_empty() {
        out.push_str(PLACEHOLDER);
        return out;
    }

    let bare = PLACEHOLDER.trim_start();
    if bare.len() <= width {
        bare.to_string()
    } else {
        collapsed.chars().take(width).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::study::{Distribution, StudyDirection};

    fn finished_trial() -> Trial {
        let mut trial = Trial::new(3).with_param(
            "x",
            1.5,
            Distribution::Uniform {
                low: -10.0,
                high: 10.0,
            },
        );
        trial.complete(4.0);
        trial
    }

    #[test]
    fn test_metadata_tags() {
        let study = Study::new("s1", StudyDirection::Minimize);
        let tags = trial_tags(&study, &finished_trial(), false, 5000);

        assert_eq!(tags["number"], "3");
        assert_eq!(tags["state"], "COMPLETE");
        assert_eq!(tags["direction"], "MINIMIZE");
        assert_eq!(
            tags["x_distribution"],
            "UniformDistribution(high=10.0, low=-10.0)"
        );
        assert_ne!(tags["datetime_complete"], "None");
    }

    #[test]
    fn test_timestamp_tags_use_microseconds() {
        use chrono::{Duration, TimeZone, Utc};

        let study = Study::new("s1", StudyDirection::Minimize);
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let trial = Trial::new(0)
            .with_datetime_start(Some(start + Duration::nanoseconds(123_456_789)));
        let tags = trial_tags(&study, &trial, false, 5000);
        assert_eq!(tags["datetime_start"], "2024-01-02 03:04:05.123456");

        let trial = Trial::new(0).with_datetime_start(Some(start));
        let tags = trial_tags(&study, &trial, false, 5000);
        assert_eq!(tags["datetime_start"], "2024-01-02 03:04:05");
    }

    #[test]
    fn test_state_omitted_for_running_trial() {
        let study = Study::new("s1", StudyDirection::Maximize);
        let trial = Trial::new(0).with_datetime_start(None);
        let tags = trial_tags(&study, &trial, false, 5000);

        assert!(!tags.contains_key("state"));
        assert_eq!(tags["datetime_start"], "None");
        assert_eq!(tags["datetime_complete"], "None");
        assert_eq!(tags["direction"], "MAXIMIZE");
    }

    #[test]
    fn test_user_attrs_override_metadata() {
        let study = Study::new("s1", StudyDirection::Minimize);
        let mut trial = finished_trial();
        trial.set_user_attr("direction", "sideways");
        trial.set_user_attr("layers", serde_json::json!([64, 32]));

        let tags = trial_tags(&study, &trial, false, 5000);
        assert_eq!(tags["direction"], "sideways");
        assert_eq!(tags["layers"], "[64,32]");
    }

    #[test]
    fn test_distribution_overrides_user_attr() {
        let study = Study::new("s1", StudyDirection::Minimize);
        let mut trial = finished_trial();
        trial.set_user_attr("x_distribution", "mine");

        let tags = trial_tags(&study, &trial, false, 5000);
        assert!(tags["x_distribution"].starts_with("UniformDistribution"));
    }

    #[test]
    fn test_study_attrs_only_when_enabled() {
        let study =
            Study::new("s1", StudyDirection::Minimize).with_user_attr("x_distribution", "study");
        let trial = finished_trial();

        let without = trial_tags(&study, &trial, false, 5000);
        assert!(without["x_distribution"].starts_with("UniformDistribution"));

        let with = trial_tags(&study, &trial, true, 5000);
        assert_eq!(with["x_distribution"], "study");
    }

    #[test]
    fn test_fold_sources_order() {
        let a = TagMap::from([("k".to_string(), "a".to_string())]);
        let b = TagMap::from([("k".to_string(), "b".to_string())]);
        assert_eq!(fold_sources(vec![a.clone(), b.clone()])["k"], "b");
        assert_eq!(fold_sources(vec![b, a])["k"], "a");
    }

    #[test]
    fn test_attr_text() {
        assert_eq!(attr_text(&serde_json::json!("plain")), "plain");
        assert_eq!(attr_text(&serde_json::json!(1.5)), "1.5");
        assert_eq!(attr_text(&serde_json::json!(1e-6)), "1e-06");
        assert_eq!(attr_text(&serde_json::json!(42)), "42");
        assert_eq!(attr_text(&serde_json::json!(true)), "True");
        assert_eq!(attr_text(&serde_json::json!(null)), "None");
        assert_eq!(attr_text(&serde_json::json!({"a": [1, 2]})), "{\"a\":[1,2]}");
    }

    #[test]
    fn test_shorten_keeps_whole_words() {
        assert_eq!(shorten("Hello  world!", 12), "Hello world!");
        assert_eq!(shorten("Hello world!", 11), "Hello [...]");
        assert_eq!(shorten("one two three four", 15), "one two [...]");
    }

    #[test]
    fn test_shorten_long_single_word() {
        let text = "x".repeat(20);
        assert_eq!(shorten(&text, 10), "[...]");
        assert_eq!(shorten(&text, 3), "xxx");
    }

    #[test]
    fn test_shorten_counts_characters() {
        let text = "é".repeat(8) + " tail end";
        let out = shorten(&text, 15);
        assert_eq!(out, format!("{} [...]", "é".repeat(8)));
        assert_eq!(out.chars().count(), 14);
    }

    #[test]
    fn test_long_tag_values_truncated() {
        let study = Study::new("s1", StudyDirection::Minimize);
        let mut trial = finished_trial();
        trial.set_user_attr("note", "word ".repeat(50));

        let tags = trial_tags(&study, &trial, false, 40);
        assert!(tags["note"].chars().count() <= 40);
        assert!(tags["note"].ends_with("[...]"));
    }
}
