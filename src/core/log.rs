use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directives applied when `RUST_LOG` is not set.
fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "off,sleeve=debug"
    } else {
        "off,sleeve=warn"
    }
}

fn build_filter(verbose: bool, env: Option<&str>) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(verbose)))
}

/// Logs go to stderr so tables on stdout stay clean. Provider warnings about
/// unpriced holdings are shown by default, everything else needs `--verbose`
/// or `RUST_LOG`.
pub fn init_logging(verbose: bool) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(verbose, env.as_deref());

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .without_time(),
        )
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_default_filter() {
        assert_eq!(
            build_filter(false, None).max_level_hint(),
            Some(LevelFilter::WARN)
        );
        assert_eq!(
            build_filter(true, None).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn test_env_overrides_verbose() {
        let filter = build_filter(false, Some("sleeve::core::chain=trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_invalid_env_falls_back() {
        let filter = build_filter(true, Some("sleeve=notalevel"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
