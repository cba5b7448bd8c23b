use tracing_subscriber::{fmt, EnvFilter};

use crate::Result;

/// Initialize logging/tracing for the bot.
///
/// Default: info. Can be overridden with `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init();

    Ok(())
}

fn default_directives(service_name: &str) -> String {
    format!("info,curfew=info,curfew_core=info,curfew_telegram=info,{service_name}=info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_info() {
        let directives = default_directives("curfew");
        assert!(directives.starts_with("info,"));
        assert!(directives.parse::<EnvFilter>().is_ok());
    }
}
