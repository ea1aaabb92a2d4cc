//! Channel download grouping.
//!
//! Channels whose quality, subfolder and filter settings are identical can be
//! fetched by a single download-tool invocation sharing one output template.
//! This module partitions the enabled channels into such groups and attaches
//! the templates each group needs.

pub mod template;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Result;
use crate::config::CoreConfig;
use crate::database::models::ChannelDbModel;
use crate::database::repositories::ChannelRepository;
use crate::domain::FilterSignature;
use crate::utils::path::resolve_effective_subfolder;

pub use template::{build_output_template, build_thumbnail_template};

/// Quality used when neither an override, the channel, nor the preferred
/// setting provides one.
pub const DEFAULT_QUALITY: &str = "1080";

/// A set of channels that share one download invocation.
#[derive(Debug, Clone)]
pub struct DownloadGroup {
    pub quality: String,
    /// Normalized subfolder, `None` for the root bucket.
    pub subfolder: Option<String>,
    pub filter: FilterSignature,
    pub output_path_template: String,
    pub thumbnail_path_template: String,
    pub channels: Vec<ChannelDbModel>,
}

impl DownloadGroup {
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_ids(&self) -> Vec<&str> {
        self.channels
            .iter()
            .map(|c| c.channel_id.as_str())
            .collect()
    }
}

/// A group before templates are attached.
///
/// `quality` is `None` when grouping by subfolder only.
#[derive(Debug, Clone)]
pub struct ChannelGroup {
    pub quality: Option<String>,
    pub subfolder: Option<String>,
    pub filter: FilterSignature,
    pub channels: Vec<ChannelDbModel>,
}

impl ChannelGroup {
    fn new(quality: Option<String>, subfolder: Option<String>, filter: FilterSignature) -> Self {
        Self {
            quality,
            subfolder,
            filter,
            channels: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn add(&mut self, channel: ChannelDbModel) {
        self.channels.push(channel);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    quality: Option<String>,
    subfolder: Option<String>,
    filter_key: String,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `override ?? channel ?? preferred ?? DEFAULT_QUALITY`, skipping blank values.
pub fn effective_quality(
    channel: &ChannelDbModel,
    override_quality: Option<&str>,
    preferred_quality: Option<&str>,
) -> String {
    non_blank(override_quality)
        .or_else(|| non_blank(channel.video_quality.as_deref()))
        .or_else(|| non_blank(preferred_quality))
        .unwrap_or(DEFAULT_QUALITY)
        .to_string()
}

/// Builds download groups and their output templates.
#[derive(Debug, Clone)]
pub struct ChannelGrouper {
    output_root: PathBuf,
    default_subfolder: Option<String>,
    preferred_quality: Option<String>,
}

impl ChannelGrouper {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            default_subfolder: None,
            preferred_quality: None,
        }
    }

    /// Grouper for the configured output root, default subfolder and
    /// preferred quality.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.output_dir.clone())
            .with_default_subfolder(config.default_subfolder.clone())
            .with_preferred_quality(Some(config.preferred_quality.clone()))
    }

    /// Subfolder used by channels stored with the global-default sentinel.
    pub fn with_default_subfolder(mut self, subfolder: Option<String>) -> Self {
        self.default_subfolder = subfolder;
        self
    }

    /// Quality used when a call passes no preferred quality of its own.
    pub fn with_preferred_quality(mut self, quality: Option<String>) -> Self {
        self.preferred_quality = quality;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    fn subfolder_for(&self, channel: &ChannelDbModel) -> Option<String> {
        resolve_effective_subfolder(
            channel.sub_folder.as_deref(),
            self.default_subfolder.as_deref(),
        )
    }

    fn partition<I, F>(&self, channels: I, quality_of: F) -> Vec<ChannelGroup>
    where
        I: IntoIterator<Item = ChannelDbModel>,
        F: Fn(&ChannelDbModel) -> Option<String>,
    {
        let mut groups: Vec<ChannelGroup> = Vec::new();
        let mut index: HashMap<GroupKey, usize> = HashMap::new();

        for channel in channels {
            let quality = quality_of(&channel);
            let subfolder = self.subfolder_for(&channel);
            let filter = FilterSignature::from_channel(&channel);
            let key = GroupKey {
                quality: quality.clone(),
                subfolder: subfolder.clone(),
                filter_key: filter.key(),
            };

            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(ChannelGroup::new(quality, subfolder, filter));
                groups.len() - 1
            });
            groups[slot].add(channel);
        }

        groups
    }

    /// Group by (effective quality, subfolder, filter signature).
    ///
    /// Groups come back in the order their first member appeared.
    pub fn group_channels(
        &self,
        channels: impl IntoIterator<Item = ChannelDbModel>,
        override_quality: Option<&str>,
        preferred_quality: Option<&str>,
    ) -> Vec<ChannelGroup> {
        let preferred_quality = preferred_quality.or(self.preferred_quality.as_deref());
        self.partition(channels, |channel| {
            Some(effective_quality(
                channel,
                override_quality,
                preferred_quality,
            ))
        })
    }

    /// Group by (subfolder, filter signature), ignoring quality.
    ///
    /// Used where quality does not change where files land. Filters still
    /// separate channels since they change which videos are fetched.
    pub fn group_channels_by_subfolder(
        &self,
        channels: impl IntoIterator<Item = ChannelDbModel>,
    ) -> Vec<ChannelGroup> {
        self.partition(channels, |_| None)
    }

    pub fn build_output_path_template(&self, subfolder: Option<&str>) -> String {
        build_output_template(&self.output_root, subfolder)
    }

    pub fn build_thumbnail_path_template(&self, subfolder: Option<&str>) -> String {
        build_thumbnail_template(&self.output_root, subfolder)
    }

    fn finish(&self, group: ChannelGroup, quality: String) -> DownloadGroup {
        let subfolder = group.subfolder.as_deref();
        DownloadGroup {
            output_path_template: self.build_output_path_template(subfolder),
            thumbnail_path_template: self.build_thumbnail_path_template(subfolder),
            quality,
            subfolder: group.subfolder,
            filter: group.filter,
            channels: group.channels,
        }
    }

    /// Partition `channels` into download groups with templates attached.
    ///
    /// With an `override_quality` every channel downloads at that quality, so
    /// channels are grouped by subfolder and filters only.
    pub fn build_groups(
        &self,
        channels: impl IntoIterator<Item = ChannelDbModel>,
        override_quality: Option<&str>,
        preferred_quality: Option<&str>,
    ) -> Vec<DownloadGroup> {
        let groups: Vec<DownloadGroup> = match non_blank(override_quality) {
            Some(quality) => self
                .group_channels_by_subfolder(channels)
                .into_iter()
                .map(|group| self.finish(group, quality.to_string()))
                .collect(),
            None => self
                .group_channels(channels, None, preferred_quality)
                .into_iter()
                .map(|group| {
                    let quality = group
                        .quality
                        .clone()
                        .unwrap_or_else(|| DEFAULT_QUALITY.to_string());
                    self.finish(group, quality)
                })
                .collect(),
        };

        for group in &groups {
            debug!(
                quality = %group.quality,
                subfolder = ?group.subfolder,
                filters = group.filter.has_filters(),
                channels = group.len(),
                "Built download group"
            );
        }

        groups
    }

    /// Load enabled channels from the catalog and build their download groups.
    pub async fn generate_download_groups(
        &self,
        channels: &dyn ChannelRepository,
        override_quality: Option<&str>,
        preferred_quality: Option<&str>,
    ) -> Result<Vec<DownloadGroup>> {
        let enabled = channels.list_enabled_channels().await?;
        Ok(self.build_groups(enabled, override_quality, preferred_quality))
    }
}
