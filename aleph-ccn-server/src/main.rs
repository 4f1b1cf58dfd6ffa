use aleph_ccn_server::{run, Settings};
use blockscout_service_launcher::launcher::ConfigSettings;

const SERVICE_NAME: &str = "aleph_ccn";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().expect("failed to read config");

    blockscout_service_launcher::tracing::init_logs(
        SERVICE_NAME,
        &settings.tracing,
        &settings.jaeger,
    )?;

    run(settings).await
}
