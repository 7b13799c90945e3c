use hb_domain::config::{Config, ConfigSeverity};

/// Parse and validate the config, printing any issues.
///
/// Returns false when at least one error was found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    print!("{}", render(config)?);
    Ok(())
}

pub fn render(config: &Config) -> anyhow::Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serializing config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::load_config_from;
    use std::io::Write;

    #[test]
    fn file_overrides_merge_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [server]
            port = 9100

            [turn]
            max_rounds = 3
            "#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.turn.max_rounds, 3);
        assert_eq!(config.memory.cooldown_secs, 300);
        assert!(validate(&config, &path));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config_from(&path.to_string_lossy()).unwrap();
        assert_eq!(config.server.port, 8787);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = Config::default();
        config.turn.max_rounds = 0;
        assert!(!validate(&config, "inline"));
    }

    #[test]
    fn rendered_config_parses_back() {
        let config = Config::default();
        let text = render(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.turn.max_rounds, config.turn.max_rounds);
    }
}
