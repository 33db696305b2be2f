use std::time::Duration;

use color_eyre::eyre::{self, Context as _};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{amount::DecimalAmount, ledger::AccountId, workflow::TransferPolicy};

pub const CONFIG_FILE: &str = "satchel.yaml";
pub const ENV_PREFIX: &str = "SATCHEL_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Account activated on startup
    pub account: String,

    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Largest amount a single transfer may move, in whole units. Quoted or bare numbers.
    #[serde(default = "default_max_transfer_amount")]
    pub max_transfer_amount: DecimalAmount,

    /// Humantime duration, e.g. "30s". Unset waits indefinitely.
    #[serde(default)]
    pub submission_timeout: Option<String>,
}

fn default_max_transfer_amount() -> DecimalAmount {
    TransferPolicy::default().max_transfer_amount
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_transfer_amount: default_max_transfer_amount(),
            submission_timeout: None,
        }
    }
}

impl Config {
    /// Load configuration from `satchel.yaml` and `SATCHEL_` prefixed environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_figment(Self::figment())
    }

    /// Sources layered by [`Config::load`], for callers extracting a larger config.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Yaml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    pub fn account_id(&self) -> AccountId {
        AccountId::from(self.account.as_str())
    }

    pub fn transfer_policy(&self) -> eyre::Result<TransferPolicy> {
        self.policy.transfer_policy()
    }
}

impl PolicyConfig {
    pub fn transfer_policy(&self) -> eyre::Result<TransferPolicy> {
        let submission_timeout = self
            .submission_timeout
            .as_deref()
            .map(parse_timeout)
            .transpose()?;

        Ok(TransferPolicy {
            max_transfer_amount: self.max_transfer_amount.clone(),
            submission_timeout,
        })
    }
}

fn parse_timeout(raw: &str) -> eyre::Result<Duration> {
    humantime::parse_duration(raw)
        .wrap_err_with(|| format!("invalid submission_timeout {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        Config::from_figment(Figment::new().merge(Yaml::string(yaml))).unwrap()
    }

    #[test]
    fn policy_defaults_when_omitted() {
        let config = parse("account: acct-1");

        assert_eq!(config.account_id(), AccountId::from("acct-1"));
        assert_eq!(config.policy, PolicyConfig::default());
        assert_eq!(config.transfer_policy().unwrap(), TransferPolicy::default());
    }

    #[test]
    fn policy_overrides() {
        let config = parse(
            r#"
account: acct-1
policy:
  max_transfer_amount: "250.5"
  submission_timeout: 1m 30s
"#,
        );

        let policy = config.transfer_policy().unwrap();
        assert_eq!(
            policy.max_transfer_amount,
            "250.5".parse::<DecimalAmount>().unwrap()
        );
        assert_eq!(policy.submission_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn bare_numbers_are_accepted() {
        let config = parse(
            r#"
account: acct-1
policy:
  max_transfer_amount: 500
"#,
        );
        assert_eq!(config.policy.max_transfer_amount, DecimalAmount::from(500));

        let config = parse(
            r#"
account: acct-1
policy:
  max_transfer_amount: 12.25
"#,
        );
        assert_eq!(
            config.policy.max_transfer_amount,
            "12.25".parse::<DecimalAmount>().unwrap()
        );
    }

    #[test]
    fn env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
account: acct-1
policy:
  max_transfer_amount: 100
  submission_timeout: 5s
"#,
            )?;
            jail.set_env("SATCHEL_ACCOUNT", "acct-9");
            jail.set_env("SATCHEL_POLICY__MAX_TRANSFER_AMOUNT", "5000");

            let config = Config::load()?;
            assert_eq!(config.account_id(), AccountId::from("acct-9"));

            let policy = config.transfer_policy().map_err(|e| e.to_string())?;
            assert_eq!(policy.max_transfer_amount, DecimalAmount::from(5000));
            assert_eq!(policy.submission_timeout, Some(Duration::from_secs(5)));
            Ok(())
        });
    }

    #[test]
    fn bad_values_are_reported() {
        let config = parse(
            r#"
account: acct-1
policy:
  submission_timeout: soon
"#,
        );
        let err = config.transfer_policy().unwrap_err();
        assert!(err.to_string().contains("submission_timeout"));

        let err = Config::from_figment(Figment::new().merge(Yaml::string(
            r#"
account: acct-1
policy:
  max_transfer_amount: "-5"
"#,
        )))
        .unwrap_err();
        assert_eq!(err.path, ["policy", "max_transfer_amount"]);
    }

    #[test]
    fn missing_account_fails_extraction() {
        let result = Config::from_figment(Figment::new().merge(Yaml::string("policy: {}")));
        assert!(result.is_err());
    }
}
