use std::path::PathBuf;

use satchel_core::config::Config;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CliConfig {
    #[serde(flatten)]
    pub core: Config,

    /// YAML file holding the accounts served by the fixture ledger
    #[serde(default = "default_fixture")]
    pub fixture: PathBuf,
}

fn default_fixture() -> PathBuf {
    PathBuf::from("ledger.yaml")
}

impl CliConfig {
    /// Same sources as [`Config::load`], plus the CLI-only keys.
    pub(crate) fn load() -> Result<Self, figment::Error> {
        Config::figment().extract()
    }
}
