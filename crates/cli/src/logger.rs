// stderr logging for the `log` facade used by every crate.

use log::LevelFilter;

/// Level from the `-v` count, overridden by `SHEETWISE_LOG` when it parses.
pub fn level_for(verbosity: u8, env: Option<&str>) -> LevelFilter {
    if let Some(level) = env.and_then(|s| s.trim().parse::<LevelFilter>().ok()) {
        return level;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn builder(verbosity: u8) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level_for(verbosity, None))
        .parse_env("SHEETWISE_LOG")
        .format_timestamp(None)
        .target(env_logger::Target::Stderr);
    builder
}

pub fn init(verbosity: u8) {
    if let Err(e) = builder(verbosity).try_init() {
        eprintln!("warning: logger already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(0, None), LevelFilter::Warn);
        assert_eq!(level_for(2, None), LevelFilter::Debug);
        assert_eq!(level_for(7, None), LevelFilter::Trace);
        assert_eq!(level_for(0, Some("debug")), LevelFilter::Debug);
        assert_eq!(level_for(1, Some("nonsense")), LevelFilter::Info);
    }

    #[test]
    fn test_builder_filters_by_verbosity() {
        if std::env::var_os("SHEETWISE_LOG").is_some() {
            return;
        }
        assert_eq!(builder(0).build().filter(), LevelFilter::Warn);
        assert_eq!(builder(1).build().filter(), LevelFilter::Info);
        assert_eq!(builder(3).build().filter(), LevelFilter::Trace);
    }
}
