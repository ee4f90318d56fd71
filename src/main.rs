use anyhow::Context;
use taskdb_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load taskdb settings")?;
    taskdb_telemetry::init(&settings.telemetry)?;

    tracing::info!(
        env = ?settings.environment,
        database = %settings.database.name,
        "taskdb-init starting"
    );

    let report = taskdb_app::run(&settings).await?;

    println!("{}", report.completion_message());
    Ok(())
}
