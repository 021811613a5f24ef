use common::{CleanupMode, CleanupReport};
use tracing::info;

use crate::duplicates::{find_duplicates, resolve_duplicates};
use crate::files::StorageLayout;
use crate::orphans::{remove_orphans, scan_orphans};
use crate::{Catalog, CatalogError};

pub const DEFAULT_PREVIEW_LIMIT: usize = 20;

#[derive(Clone, Copy, Debug)]
pub struct CleanupOptions {
    pub mode: CleanupMode,
    /// Maximum number of orphan paths echoed back in the report.
    pub preview_limit: usize,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            mode: CleanupMode::DryRun,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

/// Removes duplicate songs, then files no remaining song references.
///
/// A dry run reports the counts a full run would produce and leaves both the
/// catalog and the upload directories untouched.
pub fn run_cleanup(
    catalog: &Catalog,
    layout: &StorageLayout,
    options: CleanupOptions,
) -> Result<CleanupReport, CatalogError> {
    let dry_run = options.mode.is_dry_run();
    info!("Cleanup started (dry_run: {})", dry_run);

    let groups = find_duplicates(catalog)?;
    info!("Found {} duplicate groups", groups.len());
    let duplicates = resolve_duplicates(catalog, layout, &groups, dry_run)?;

    let orphans = scan_orphans(catalog, layout)?;
    let mut report = CleanupReport {
        dry_run,
        duplicates_removed: duplicates.removed,
        duplicate_details: duplicates.details,
        orphaned_files: orphans.preview(options.preview_limit),
        removal_failures: duplicates.failures,
        ..CleanupReport::default()
    };

    if dry_run {
        report.orphaned_audio_removed = orphans.audio.len();
        report.orphaned_artwork_removed = orphans.artwork.len();
        report.space_saved = duplicates.bytes_reclaimed + orphans.total_bytes();
    } else {
        let removal = remove_orphans(&orphans);
        report.orphaned_audio_removed = removal.audio_removed;
        report.orphaned_artwork_removed = removal.artwork_removed;
        report.space_saved = duplicates.bytes_reclaimed + removal.bytes_reclaimed;
        report.removal_failures += removal.failures;
    }

    info!(
        "Cleanup finished: {} duplicates, {} orphaned audio, {} orphaned artwork, {} bytes",
        report.duplicates_removed,
        report.orphaned_audio_removed,
        report.orphaned_artwork_removed,
        report.space_saved
    );
    Ok(report)
}
