#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod constants;
mod error;
mod log;

use crate::{
  config::{build_settings, parse_opts, ConfigToml, ConfigTomlReloader},
  constants::CONFIG_WATCH_DELAY_SECS,
  log::*,
};
use bbr_lib::entrypoint;
use hot_reload::{ReloaderReceiver, ReloaderService};

fn main() {
  init_logger();

  let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
  runtime_builder.enable_all();
  runtime_builder.thread_name("bbr");
  let runtime = runtime_builder.build().unwrap();

  runtime.block_on(async {
    // Initially load options
    let Ok(parsed_opts) = parse_opts() else {
      error!("Invalid toml file");
      std::process::exit(1);
    };

    if !parsed_opts.watch {
      if let Err(e) = bbr_service_without_watcher(&parsed_opts.config_file_path, runtime.handle().clone()).await {
        error!("bbr service exited: {e}");
        std::process::exit(1);
      }
    } else {
      let (config_service, config_rx) = ReloaderService::<ConfigTomlReloader, ConfigToml>::new(
        &parsed_opts.config_file_path,
        CONFIG_WATCH_DELAY_SECS,
        false,
      )
      .await
      .unwrap();

      tokio::select! {
        Err(e) = config_service.start() => {
          error!("config reloader service exited: {e}");
          std::process::exit(1);
        }
        Err(e) = bbr_service_with_watcher(config_rx, runtime.handle().clone()) => {
          error!("bbr service exited: {e}");
          std::process::exit(1);
        }
      }
    }
  });
}

async fn bbr_service_without_watcher(
  config_file_path: &str,
  runtime_handle: tokio::runtime::Handle,
) -> Result<(), anyhow::Error> {
  info!("Start bbr external processor");
  let config_toml = match ConfigToml::new(config_file_path) {
    Ok(v) => v,
    Err(e) => {
      error!("Invalid toml file: {e}");
      std::process::exit(1);
    }
  };
  let processor_config = match build_settings(&config_toml) {
    Ok(v) => v,
    Err(e) => {
      error!("Invalid configuration: {e}");
      return Err(anyhow::anyhow!(e));
    }
  };
  entrypoint(&processor_config, &runtime_handle, None)
    .await
    .map_err(|e| anyhow::anyhow!(e))
}

async fn bbr_service_with_watcher(
  mut config_rx: ReloaderReceiver<ConfigToml>,
  runtime_handle: tokio::runtime::Handle,
) -> Result<(), anyhow::Error> {
  info!("Start bbr external processor with dynamic config reloader");
  // Initial loading
  config_rx.changed().await?;
  let config_toml = config_rx.borrow().clone().unwrap();
  let mut processor_config = match build_settings(&config_toml) {
    Ok(v) => v,
    Err(e) => {
      error!("Invalid configuration: {e}");
      return Err(anyhow::anyhow!(e));
    }
  };

  // Notifier for endpoint service termination
  let term_notify = std::sync::Arc::new(tokio::sync::Notify::new());

  // Continuous monitoring
  loop {
    tokio::select! {
      _ = entrypoint(&processor_config, &runtime_handle, Some(term_notify.clone())) => {
        error!("bbr entrypoint exited");
        break;
      }
      _ = config_rx.changed() => {
        if config_rx.borrow().is_none() {
          error!("Something wrong in config reloader receiver");
          break;
        }
        let config_toml = config_rx.borrow().clone().unwrap();
        match build_settings(&config_toml) {
          Ok(p) => processor_config = p,
          Err(e) => {
            error!("Invalid configuration. Configuration does not updated: {e}");
            continue;
          }
        };
        info!("Configuration updated. Terminate all spawned ext_proc endpoints and force to re-bind sockets");
        term_notify.notify_waiters();
      }
      else => break
    }
  }

  Err(anyhow::anyhow!("bbr or continuous monitoring service exited"))
}
