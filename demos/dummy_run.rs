use std::time::Duration;

use evacuator::{Config, Supervisor};

/// Runs the whole pipeline against the dummy provider: a synthetic
/// termination fires after two seconds, the log action echoes it, and the
/// supervisor shuts down cleanly.
///
/// ```sh
/// cargo run --example dummy_run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::default();
    config.log.format = "text".to_string();
    config.provider.name = "dummy".to_string();
    config.provider.dummy.detection_wait = Duration::from_secs(2);
    config.validate()?;

    evacuator::init_logging(&config.log)?;

    Supervisor::new(config).run().await?;
    println!("evacuation pipeline completed");
    Ok(())
}
