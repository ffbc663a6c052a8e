use rollcall_core::EnrollConfig;
use std::path::PathBuf;

/// Engine configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Cosine similarity threshold for a positive identification.
    pub similarity_threshold: f32,
    /// QR token validity window in seconds.
    pub qr_ttl_secs: u64,
    /// Enrollment stops accepting after this many samples.
    pub target_samples: usize,
    /// Enrollment fails below this many samples.
    pub min_samples: usize,
}

impl EngineConfig {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("rollcall.db"));

        Self {
            db_path,
            similarity_threshold: env_f32(
                "ROLLCALL_SIMILARITY_THRESHOLD",
                rollcall_core::recognize::DEFAULT_THRESHOLD,
            ),
            qr_ttl_secs: env_u64("ROLLCALL_QR_TTL_SECS", 15 * 60),
            target_samples: env_usize("ROLLCALL_TARGET_SAMPLES", 30),
            min_samples: env_usize("ROLLCALL_MIN_SAMPLES", 10),
        }
    }

    pub fn enroll_config(&self) -> EnrollConfig {
        EnrollConfig {
            target_samples: self.target_samples,
            min_samples: self.min_samples,
        }
    }

    pub fn qr_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.qr_ttl_secs as i64)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("rollcall.db"),
            similarity_threshold: rollcall_core::recognize::DEFAULT_THRESHOLD,
            qr_ttl_secs: 15 * 60,
            target_samples: 30,
            min_samples: 10,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.qr_ttl(), chrono::Duration::minutes(15));
        assert_eq!(cfg.enroll_config().target_samples, 30);
        assert_eq!(cfg.enroll_config().min_samples, 10);
        assert!((cfg.similarity_threshold - 0.65).abs() < 1e-6);
    }
}
