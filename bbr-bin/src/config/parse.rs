use super::toml::ConfigToml;
use crate::error::ensure;
use bbr_lib::ProcessorConfig;
use clap::{Arg, ArgAction};

/// Parsed options
pub struct Opts {
  pub config_file_path: String,
  pub watch: bool,
}

/// Parse arg values passed from cli
pub fn parse_opts() -> Result<Opts, anyhow::Error> {
  let _ = include_str!("../../Cargo.toml");
  let options = clap::command!()
    .arg(
      Arg::new("config_file")
        .long("config")
        .short('c')
        .value_name("FILE")
        .required(true)
        .help("Configuration file path like ./config.toml"),
    )
    .arg(
      Arg::new("watch")
        .long("watch")
        .short('w')
        .action(ArgAction::SetTrue)
        .help("Activate dynamic reloading of the config file via continuous monitoring"),
    );
  let matches = options.get_matches();

  ///////////////////////////////////
  let config_file_path = matches.get_one::<String>("config_file").unwrap().to_owned();
  let watch = matches.get_one::<bool>("watch").unwrap().to_owned();

  Ok(Opts { config_file_path, watch })
}

pub fn build_settings(config: &ConfigToml) -> std::result::Result<ProcessorConfig, anyhow::Error> {
  // build processor config
  let processor_config: ProcessorConfig = config.try_into()?;

  // assertions for the grpc endpoint
  ensure!(!processor_config.listen_sockets.is_empty(), "No listen socket");
  ensure!(processor_config.max_clients > 0, "max_clients must be positive");
  ensure!(
    processor_config.max_concurrent_streams > 0,
    "max_concurrent_streams must be positive"
  );

  Ok(processor_config)
}
