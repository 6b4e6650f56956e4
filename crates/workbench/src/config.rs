use crate::watermark::WatermarkDefaults;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THUMBNAIL_WIDTH_PX: u32 = 220;

/// What happens to the page left behind in its origin document after a
/// cross-group drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Rewrite the origin without the moved page right away.
    #[default]
    DeleteImmediately,
    /// Leave the origin untouched until [`crate::Workbench::purge_orphans`]
    /// or a page deletion touching it runs.
    Defer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    pub thumbnail_width_px: u32,
    pub orphan_policy: OrphanPolicy,
    pub watermark: WatermarkDefaults,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            thumbnail_width_px: DEFAULT_THUMBNAIL_WIDTH_PX,
            orphan_policy: OrphanPolicy::default(),
            watermark: WatermarkDefaults::default(),
        }
    }
}
