use anyhow::Result;

use crate::config::Config;
use crate::paths;
use crate::publish;

pub async fn cmd_publish(config: &Config) -> Result<()> {
    publish::sync(&paths::publish_dir(&config.base_dir), &config.publish).await?;
    publish::prune(
        &paths::nightly_dir(&config.base_dir),
        config.publish.retention,
    )
    .await?;
    Ok(())
}
