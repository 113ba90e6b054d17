use crate::{constants::*, error::anyhow};
use bbr_lib::ProcessorConfig;
use serde::Deserialize;
use std::fs;

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct ConfigToml {
  pub listen_port: Option<u16>,
  pub listen_ipv6: Option<bool>,
  pub max_concurrent_streams: Option<u32>,
  pub max_clients: Option<u32>,
  pub tcp_keepalive: Option<bool>,
}

impl TryInto<ProcessorConfig> for &ConfigToml {
  type Error = anyhow::Error;

  fn try_into(self) -> std::result::Result<ProcessorConfig, Self::Error> {
    let mut processor_config = ProcessorConfig::default();

    // listen port and socket
    let listen_port = self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT);

    // NOTE: when [::]:xx is bound, both v4 and v6 listeners are enabled.
    let listen_addresses: Vec<&str> = if let Some(true) = self.listen_ipv6 {
      LISTEN_ADDRESSES_V6.to_vec()
    } else {
      LISTEN_ADDRESSES_V4.to_vec()
    };
    processor_config.listen_sockets = listen_addresses
      .iter()
      .map(|addr| format!("{addr}:{listen_port}").parse().unwrap())
      .collect();

    // max values
    if let Some(c) = self.max_clients {
      processor_config.max_clients = c as usize;
    }
    if let Some(c) = self.max_concurrent_streams {
      processor_config.max_concurrent_streams = c;
    }

    // keepalive
    if let Some(keepalive) = self.tcp_keepalive {
      processor_config.keepalive = keepalive;
    }

    Ok(processor_config)
  }
}

impl ConfigToml {
  pub fn new(config_file: &str) -> std::result::Result<Self, anyhow::Error> {
    let config_str = fs::read_to_string(config_file)?;

    toml::from_str(&config_str).map_err(|e| anyhow!(e))
  }
}
