use crate::cli::actions::Action;
use crate::exporter;
use anyhow::Result;

/// Handle the run action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run {
            port,
            listen,
            config,
        } => {
            exporter::new(port, listen, config).await?;
        }
    }

    Ok(())
}
