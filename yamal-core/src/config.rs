//! Configuration for opening a yamal file.

use crate::error::{Result, YamalError};
use crate::record::RECORD_HEADER_SIZE;
use crate::storage::{HEADER_SIZE, validate_page_size};
use std::time::Duration;

/// Default page size: 8 MB.
pub const DEFAULT_PAGE_SIZE: u64 = 8 * 1024 * 1024;

/// Default maximum file size: 64 GB.
pub const DEFAULT_MAX_SIZE: u64 = 64 * 1024 * 1024 * 1024;

/// Default distance the maintenance thread keeps mapped ahead of the
/// reservation cursor: 3 MB.
pub const DEFAULT_PREALLOCATE: u64 = 3 * 1024 * 1024;

/// Configuration for opening a yamal file.
#[derive(Debug, Clone)]
pub struct YamalConfig {
    /// Size of each mapped page. Only used when creating a file; existing
    /// files keep the page size recorded in their header.
    pub page_size: u64,
    /// Upper bound on the file size.
    pub max_size: u64,
    /// Largest accepted payload. `None` means as large as a page allows.
    pub max_record_size: Option<u64>,
    /// Map the file read-only.
    pub read_only: bool,
    /// Whether lists in this file can be closed.
    ///
    /// Recorded on creation; reopening a writable handle with a different
    /// value fails.
    pub closable: bool,
    /// Background preallocation and flushing. Ignored for read-only handles.
    pub maintenance: Option<MaintenanceConfig>,
    /// Flush mapped pages to disk when the handle is closed.
    pub sync_on_close: bool,
}

/// Configuration for the background maintenance thread.
///
/// Every `interval` the thread maps pages up to `preallocate` bytes past the
/// reservation cursor, so writers rarely pay for growth on the hot path, and
/// optionally flushes mapped pages.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceConfig {
    /// Time between maintenance passes.
    pub interval: Duration,
    /// Bytes to keep mapped past the reservation cursor.
    pub preallocate: u64,
    /// Whether each pass flushes mapped pages to disk.
    pub sync: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            preallocate: DEFAULT_PREALLOCATE,
            sync: true,
        }
    }
}

impl Default for YamalConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            max_record_size: None,
            read_only: false,
            closable: false,
            maintenance: Some(MaintenanceConfig::default()),
            sync_on_close: true,
        }
    }
}

impl YamalConfig {
    /// Configuration for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            maintenance: None,
            sync_on_close: false,
            ..Self::default()
        }
    }

    /// Small, quiet configuration for tests: 64 KB pages, no background
    /// thread, no flushing.
    pub fn for_testing() -> Self {
        Self {
            page_size: 64 * 1024,
            max_size: 256 * 1024 * 1024,
            max_record_size: None,
            read_only: false,
            closable: true,
            maintenance: None,
            sync_on_close: false,
        }
    }

    /// Overlay settings from environment variables.
    ///
    /// Recognized variables: `YAMAL_PAGE_SIZE`, `YAMAL_MAX_SIZE`,
    /// `YAMAL_MAX_RECORD_SIZE`, `YAMAL_MAINTENANCE_INTERVAL_MS` (0 disables
    /// the maintenance thread) and `YAMAL_PREALLOCATE`.
    pub fn from_env(self) -> Result<Self> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = get("YAMAL_PAGE_SIZE") {
            self.page_size = parse_u64("YAMAL_PAGE_SIZE", &value)?;
        }
        if let Some(value) = get("YAMAL_MAX_SIZE") {
            self.max_size = parse_u64("YAMAL_MAX_SIZE", &value)?;
        }
        if let Some(value) = get("YAMAL_MAX_RECORD_SIZE") {
            self.max_record_size = Some(parse_u64("YAMAL_MAX_RECORD_SIZE", &value)?);
        }
        if let Some(value) = get("YAMAL_MAINTENANCE_INTERVAL_MS") {
            let ms = parse_u64("YAMAL_MAINTENANCE_INTERVAL_MS", &value)?;
            self.maintenance = match ms {
                0 => None,
                ms => Some(MaintenanceConfig {
                    interval: Duration::from_millis(ms),
                    ..self.maintenance.unwrap_or_default()
                }),
            };
        }
        if let Some(value) = get("YAMAL_PREALLOCATE") {
            let preallocate = parse_u64("YAMAL_PREALLOCATE", &value)?;
            if let Some(maintenance) = self.maintenance.as_mut() {
                maintenance.preallocate = preallocate;
            }
        }
        Ok(self)
    }

    /// Set the page size used when creating a file.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the maximum file size.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Limit the payload size accepted by `reserve`.
    pub fn with_max_record_size(mut self, max_record_size: u64) -> Self {
        self.max_record_size = Some(max_record_size);
        self
    }

    /// Map the file read-only.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Create the file as closable or unclosable.
    pub fn with_closable(mut self, closable: bool) -> Self {
        self.closable = closable;
        self
    }

    /// Enable or disable background maintenance.
    pub fn with_maintenance(mut self, maintenance: Option<MaintenanceConfig>) -> Self {
        self.maintenance = maintenance;
        self
    }

    /// Flush on close.
    pub fn with_sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    /// Largest payload accepted for a given page size.
    pub(crate) fn max_payload(&self, page_size: u64) -> u64 {
        let page_limit = page_size - RECORD_HEADER_SIZE;
        self.max_record_size
            .map_or(page_limit, |limit| limit.min(page_limit))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size).map_err(|cause| YamalError::Config {
            field: "page_size",
            cause: cause.to_string(),
        })?;

        if self.page_size <= HEADER_SIZE {
            return Err(YamalError::Config {
                field: "page_size",
                cause: format!("must be larger than the {HEADER_SIZE} byte header"),
            });
        }

        if self.max_size < self.page_size {
            return Err(YamalError::Config {
                field: "max_size",
                cause: format!(
                    "{} is smaller than one page ({} bytes)",
                    self.max_size, self.page_size
                ),
            });
        }

        if self.max_record_size == Some(0) {
            return Err(YamalError::Config {
                field: "max_record_size",
                cause: "must be greater than zero".to_string(),
            });
        }

        if let Some(maintenance) = &self.maintenance
            && maintenance.interval.is_zero()
        {
            return Err(YamalError::Config {
                field: "maintenance.interval",
                cause: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|e| YamalError::Config {
        field,
        cause: format!("'{value}' is not a valid number: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = YamalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.maintenance.is_some());
        assert!(!config.read_only);
    }

    #[test]
    fn read_only_disables_maintenance() {
        let config = YamalConfig::read_only();
        assert!(config.read_only);
        assert!(config.maintenance.is_none());
        assert!(!config.sync_on_close);
    }

    #[test]
    fn rejects_bad_page_sizes() {
        assert!(YamalConfig::default().with_page_size(3 * 65536).validate().is_err());
        assert!(YamalConfig::default().with_page_size(4096).validate().is_err());
        assert!(
            YamalConfig::default()
                .with_page_size(1 << 20)
                .with_max_size(1 << 19)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn max_payload_is_bounded_by_page() {
        let config = YamalConfig::for_testing();
        assert_eq!(config.max_payload(65536), 65536 - RECORD_HEADER_SIZE);

        let config = config.with_max_record_size(100);
        assert_eq!(config.max_payload(65536), 100);
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("YAMAL_PAGE_SIZE", "1048576"),
            ("YAMAL_MAINTENANCE_INTERVAL_MS", "25"),
            ("YAMAL_PREALLOCATE", "4096"),
        ]);

        let config = YamalConfig::default()
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.page_size, 1 << 20);
        let maintenance = config.maintenance.unwrap();
        assert_eq!(maintenance.interval, Duration::from_millis(25));
        assert_eq!(maintenance.preallocate, 4096);
    }

    #[test]
    fn env_zero_interval_disables_maintenance() {
        let config = YamalConfig::default()
            .apply_env(|key| (key == "YAMAL_MAINTENANCE_INTERVAL_MS").then(|| "0".to_string()))
            .unwrap();
        assert!(config.maintenance.is_none());
    }

    #[test]
    fn env_rejects_garbage() {
        let err = YamalConfig::default()
            .apply_env(|key| (key == "YAMAL_MAX_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert_eq!(err.code(), "E902");
    }
}
