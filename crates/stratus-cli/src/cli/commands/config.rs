//! `stratus config` – show where the config lives and what it says.

use anyhow::Result;
use stratus_core::config::{self, StratusConfig};

pub fn run_config(cfg: &StratusConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", render(cfg)?);
    Ok(())
}

/// The config as TOML with the SAS token masked.
pub(crate) fn render(cfg: &StratusConfig) -> Result<String> {
    let mut shown = cfg.clone();
    if shown.sas_token.is_some() {
        shown.sas_token = Some("<redacted>".to_string());
    }
    Ok(toml::to_string_pretty(&shown)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sas_token_is_masked() {
        let cfg = StratusConfig {
            sas_token: Some("sv=2015-04-05&sig=secret".into()),
            ..StratusConfig::default()
        };
        let out = render(&cfg).unwrap();
        assert!(out.contains("<redacted>"));
        assert!(!out.contains("secret"));
    }
}
