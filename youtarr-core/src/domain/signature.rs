//! Filter signatures used as grouping keys.
//!
//! Two channels can share one download invocation only if their duration,
//! title and audio settings are identical. [`FilterSignature`] captures exactly
//! those fields in a fixed-order struct so the serialized key never depends on
//! field insertion order.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::database::models::ChannelDbModel;

/// Canonical filter settings of a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSignature {
    #[serde(rename = "min")]
    pub min_duration_secs: Option<i64>,
    #[serde(rename = "max")]
    pub max_duration_secs: Option<i64>,
    #[serde(rename = "regex")]
    pub title_filter_regex: Option<String>,
    #[serde(rename = "audio")]
    pub audio_format: Option<String>,
}

impl FilterSignature {
    pub fn new(
        min_duration_secs: Option<i64>,
        max_duration_secs: Option<i64>,
        title_filter_regex: Option<String>,
        audio_format: Option<String>,
    ) -> Self {
        Self {
            min_duration_secs,
            max_duration_secs,
            title_filter_regex,
            audio_format,
        }
    }

    pub fn from_channel(channel: &ChannelDbModel) -> Self {
        Self::new(
            channel.min_duration_secs,
            channel.max_duration_secs,
            channel.title_filter_regex.clone(),
            channel.audio_format.clone(),
        )
    }

    /// Stable string form, e.g. `{"min":null,"max":600,"regex":null,"audio":null}`.
    ///
    /// Null and absent are the same thing here: every field is always written.
    pub fn key(&self) -> String {
        // Serializing a struct of options and strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// True if a duration bound or title pattern is set.
    ///
    /// The audio format changes what gets downloaded, not which videos, so it
    /// does not count as a filter.
    pub fn has_filters(&self) -> bool {
        self.min_duration_secs.is_some()
            || self.max_duration_secs.is_some()
            || self.title_filter_regex.is_some()
    }

    /// Evaluate the filters against a candidate video.
    ///
    /// Duration bounds are inclusive. A video with unknown duration passes the
    /// duration checks. Returns an error if the title pattern does not compile.
    pub fn matches(&self, duration_secs: Option<i64>, title: &str) -> Result<bool> {
        if let Some(duration) = duration_secs {
            if self.min_duration_secs.is_some_and(|min| duration < min) {
                return Ok(false);
            }
            if self.max_duration_secs.is_some_and(|max| duration > max) {
                return Ok(false);
            }
        }

        if let Some(pattern) = &self.title_filter_regex {
            let regex = Regex::new(pattern)?;
            if !regex.is_match(title) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_key_is_stable_for_equal_fields() {
        let a = FilterSignature::new(Some(60), None, Some("^Live".into()), None);
        let b = FilterSignature::new(Some(60), None, Some("^Live".into()), None);
        assert_eq!(a.key(), b.key());
        assert_eq!(
            a.key(),
            r#"{"min":60,"max":null,"regex":"^Live","audio":null}"#
        );
    }

    #[test]
    fn test_key_differs_per_field() {
        let base = FilterSignature::default();
        let variants = [
            FilterSignature::new(Some(1), None, None, None),
            FilterSignature::new(None, Some(1), None, None),
            FilterSignature::new(None, None, Some("x".into()), None),
            FilterSignature::new(None, None, None, Some("mp3_only".into())),
        ];
        for variant in variants {
            assert_ne!(base.key(), variant.key());
        }
    }

    #[test]
    fn test_regex_text_cannot_collide_with_separators() {
        let a = FilterSignature::new(None, None, Some(r#"a","audio":"b"#.into()), None);
        let b = FilterSignature::new(None, None, Some("a".into()), Some("b".into()));
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_has_filters() {
        assert!(!FilterSignature::default().has_filters());
        assert!(!FilterSignature::new(None, None, None, Some("mp3_only".into())).has_filters());
        assert!(FilterSignature::new(Some(0), None, None, None).has_filters());
        assert!(FilterSignature::new(None, Some(300), None, None).has_filters());
        assert!(FilterSignature::new(None, None, Some(".*".into()), None).has_filters());
    }

    #[test]
    fn test_from_channel() {
        let mut channel = ChannelDbModel::new("UC1", "One");
        channel.max_duration_secs = Some(900);
        channel.audio_format = Some("video_mp3".into());

        let sig = FilterSignature::from_channel(&channel);
        assert_eq!(sig.max_duration_secs, Some(900));
        assert_eq!(sig.audio_format.as_deref(), Some("video_mp3"));
        assert_eq!(sig.min_duration_secs, None);
    }

    #[test]
    fn test_matches_duration_bounds_inclusive() {
        let sig = FilterSignature::new(Some(60), Some(600), None, None);
        assert!(sig.matches(Some(60), "t").unwrap());
        assert!(sig.matches(Some(600), "t").unwrap());
        assert!(!sig.matches(Some(59), "t").unwrap());
        assert!(!sig.matches(Some(601), "t").unwrap());
        assert!(sig.matches(None, "t").unwrap());
    }

    #[test]
    fn test_matches_title_pattern() {
        let sig = FilterSignature::new(None, None, Some("(?i)podcast".into()), None);
        assert!(sig.matches(Some(10), "Weekly Podcast #4").unwrap());
        assert!(!sig.matches(Some(10), "Vlog").unwrap());
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let sig = FilterSignature::new(None, None, Some("(unclosed".into()), None);
        assert!(matches!(
            sig.matches(None, "anything"),
            Err(Error::InvalidPattern(_))
        ));
    }
}
