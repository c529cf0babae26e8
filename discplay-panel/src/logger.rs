use std::io::Write;

use env_logger::{Builder, Env};

/// Filter variable that takes precedence over `RUST_LOG`.
const FILTER_VAR: &str = "DISCPLAY_LOG";

/// Install the process logger: `[HH:MM:SS][LEVEL][target] message` on
/// stderr, `info` unless `DISCPLAY_LOG` or `RUST_LOG` says otherwise.
pub fn setup_logging() {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Ok(filter) = std::env::var(FILTER_VAR) {
        builder.parse_filters(&filter);
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}][{}][{}] {}",
            local_time(),
            record.level(),
            record.target(),
            record.args()
        )
    });

    // A second init (tests, re-exec) keeps the first logger.
    let _ = builder.try_init();
}

/// Wall-clock time of day in the appliance's local zone.
fn local_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn stamp_is_local_time_of_day() {
        let before = chrono::Local::now();
        let stamp = local_time();
        let after = chrono::Local::now();

        let parts: Vec<u32> = stamp.split(':').map(|p| p.parse().unwrap()).collect();
        assert_eq!(stamp.len(), 8);
        assert_eq!(parts.len(), 3);
        let seconds = parts[0] * 3600 + parts[1] * 60 + parts[2];
        let bounds = [before, after].map(|t| t.num_seconds_from_midnight());
        assert!(
            seconds == bounds[0] || seconds == bounds[1],
            "{} not between {:?}",
            stamp,
            bounds
        );
    }
}
