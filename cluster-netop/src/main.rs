use std::process::exit;

use cluster_netop_core::{kubernetes::operations::install_crds, resources::release::OperatorRelease};
use controller::main_controller;
use kube::Client;
use log::{error, info};
use settings::OperatorSettings;
use tokio_util::sync::CancellationToken;

mod controller;
mod helpers;
mod namespace_sweeper;
mod settings;

const INSTALL_CRDS_COMMAND: &str = "install-crds";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configure_logger();

    let client = create_client().await;

    if std::env::args().nth(1).as_deref() == Some(INSTALL_CRDS_COMMAND) {
        return install_crds(&client).await;
    }

    let release = get_release();
    let settings = get_settings();

    info!(
        "Starting network operator {} in '{}' namespace...",
        release.release_version, release.namespace
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    main_controller(client, release, settings, cancel).await;

    info!("Network operator stopped.");

    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("Couldn't listen for shutdown signal! {error:?}");
        return;
    }

    info!("Shutdown requested, cancelling in-flight work...");
    cancel.cancel();
}

async fn create_client() -> Client {
    match Client::try_default().await {
        Ok(client) => client,
        Err(error) => {
            error!("Couldn't create client! {error:?}");
            exit(6)
        }
    }
}

fn get_release() -> OperatorRelease {
    match OperatorRelease::from_env() {
        Ok(release) => release,
        Err(error) => {
            error!("Couldn't retrieve release info! {error:?}");
            exit(7)
        }
    }
}

fn get_settings() -> OperatorSettings {
    match OperatorSettings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            error!("Invalid operator settings! {error:?}");
            exit(8)
        }
    }
}

fn configure_logger() {
    env_logger::builder()
        .default_format()
        .format_module_path(false)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init()
}
